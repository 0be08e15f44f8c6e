//! Stack - Simulated execution stack with overflow fencepost
//!
//! The emulated machine runs user code on a bounded word array owned by the
//! thread. The lowest word holds [`STACK_FENCEPOST`]; it is validated before
//! every transfer away from the thread.

use crate::scheduler::core::error::{SchedulerError, SchedulerResult};
use crate::scheduler::thread::Pid;

/// Sentinel stored at the logical end of every stack
pub const STACK_FENCEPOST: u32 = 0xdead_beef;

/// Default simulated stack size (words)
pub const DEFAULT_STACK_WORDS: usize = 1024;

/// Default host stack size for the backing OS thread (256KB)
pub const DEFAULT_HOST_STACK_SIZE: usize = 256 * 1024;

/// Thread stack
pub struct ThreadStack {
    words: Box<[u32]>,
}

impl ThreadStack {
    /// Allocate a zeroed stack of `words` words with the fencepost in place
    pub fn new(words: usize) -> Self {
        let mut words = vec![0u32; words.max(1)].into_boxed_slice();
        words[0] = STACK_FENCEPOST;
        Self { words }
    }

    /// Stack size in words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Raw stack memory, for the machine emulator
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.words
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.words
    }

    /// Check for stack overflow
    pub fn check_overflow(&self, pid: Pid) -> SchedulerResult<()> {
        if self.words[0] == STACK_FENCEPOST {
            Ok(())
        } else {
            Err(SchedulerError::StackOverflow { pid })
        }
    }
}

/// Stack allocator
pub struct StackAllocator {
    stack_words: usize,
    host_stack_size: usize,
}

impl StackAllocator {
    pub const fn new(stack_words: usize, host_stack_size: usize) -> Self {
        Self {
            stack_words,
            host_stack_size,
        }
    }

    /// Allocate a simulated stack
    pub fn alloc(&self) -> ThreadStack {
        ThreadStack::new(self.stack_words)
    }

    /// Stack size handed to the host thread builder
    pub fn host_stack_size(&self) -> usize {
        self.host_stack_size
    }
}

impl Default for StackAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_WORDS, DEFAULT_HOST_STACK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_stack_has_fencepost() {
        let stack = ThreadStack::new(16);
        assert_eq!(stack.len(), 16);
        assert_eq!(stack.as_slice()[0], STACK_FENCEPOST);
        assert!(stack.check_overflow(1).is_ok());
    }

    #[test]
    fn test_overwritten_fencepost_detected() {
        let mut stack = StackAllocator::default().alloc();
        stack.as_mut_slice()[0] = 0;
        assert_eq!(
            stack.check_overflow(9),
            Err(SchedulerError::StackOverflow { pid: 9 })
        );
    }

    #[test]
    fn test_writes_above_fencepost_are_fine() {
        let mut stack = ThreadStack::new(8);
        for word in stack.as_mut_slice()[1..].iter_mut() {
            *word = 0x1234;
        }
        assert!(stack.check_overflow(2).is_ok());
    }

    #[test]
    fn test_zero_sized_request_still_guarded() {
        let stack = ThreadStack::new(0);
        assert_eq!(stack.len(), 1);
        assert!(stack.check_overflow(0).is_ok());
    }
}
