//! Context switch implementation
//!
//! Every simulated thread runs on its own host thread, parked on a [`Baton`].
//! A transfer hands the baton to the next thread and parks the caller on its
//! own, so exactly one host thread executes simulated code at any time.

use core::sync::atomic::{AtomicU8, Ordering};
use std::thread::Thread as HostThread;

use spin::Once;

const EMPTY: u8 = 0;
const RUN: u8 = 1;
const TERMINATE: u8 = 2;

/// What a parked thread is told when it wakes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Continue executing as the running thread
    Run,
    /// The thread was destroyed or the simulation halted; unwind
    Terminate,
}

/// Single-permit hand-off signal owned by one host thread
pub struct Baton {
    state: AtomicU8,
    owner: Once<HostThread>,
}

impl Baton {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            owner: Once::new(),
        }
    }

    /// Bind the baton to the host thread that will wait on it
    pub fn bind(&self, owner: HostThread) {
        self.owner.call_once(|| owner);
    }

    /// Hand a token to the owner. `Terminate` overrides a pending `Run`.
    pub fn pass(&self, token: Token) {
        match token {
            Token::Run => {
                let _ = self
                    .state
                    .compare_exchange(EMPTY, RUN, Ordering::AcqRel, Ordering::Acquire);
            }
            Token::Terminate => self.state.store(TERMINATE, Ordering::Release),
        }
        if let Some(owner) = self.owner.get() {
            owner.unpark();
        }
    }

    /// Park the calling (owner) thread until a token arrives
    pub fn wait(&self) -> Token {
        loop {
            match self.state.swap(EMPTY, Ordering::AcqRel) {
                RUN => return Token::Run,
                TERMINATE => return Token::Terminate,
                _ => std::thread::park(),
            }
        }
    }
}

impl Default for Baton {
    fn default() -> Self {
        Self::new()
    }
}

/// Transfer the CPU from `from` to `to`.
///
/// Returns when some thread transfers back to `from`; after that point the
/// caller is the continuation of the resumed thread.
pub fn transfer(from: &Baton, to: &Baton) -> Token {
    to.pass(Token::Run);
    from.wait()
}
