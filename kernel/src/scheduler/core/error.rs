//! Scheduler Error Handling
//!
//! Typed errors for every invariant the threading core enforces.
//!
//! Invariant violations are fatal: they are raised through [`fatal`] (or the
//! [`sched_assert!`](crate::sched_assert) macro), which unwinds the offending
//! thread with the error as payload. The thread trampoline turns that payload
//! into a halt of the whole simulation.

use core::fmt;

use crate::scheduler::thread::{Pid, ThreadState};

/// Scheduler error types with detailed context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    // ═══════════════════════════════════════════════════════════════
    // Capacity Errors
    // ═══════════════════════════════════════════════════════════════
    /// Maximum number of concurrently live threads reached
    ThreadLimitReached { current: usize, max: usize },

    /// Child table of a thread is full
    ChildLimitReached { pid: Pid, max: usize },

    // ═══════════════════════════════════════════════════════════════
    // Thread Errors
    // ═══════════════════════════════════════════════════════════════
    /// Thread not found in the thread table
    ThreadNotFound { pid: Pid },

    /// Child slot is not registered on this thread
    NotAChild { pid: Pid, index: usize },

    /// Child already recorded an exit code
    ChildAlreadyExited { pid: Pid, child: Pid },

    /// Invalid thread state transition
    InvalidStateTransition {
        pid: Pid,
        from: ThreadState,
        to: ThreadState,
    },

    /// Stack fencepost was overwritten
    StackOverflow { pid: Pid },

    /// Thread body panicked
    ThreadPanicked { pid: Pid },

    /// Backing host thread could not be spawned
    SpawnFailed { pid: Pid },

    // ═══════════════════════════════════════════════════════════════
    // Scheduling Discipline Errors
    // ═══════════════════════════════════════════════════════════════
    /// Queue mutation attempted with interrupts enabled
    NotInAtomicRegion { operation: &'static str },

    /// Operation issued by a thread that does not own the CPU
    NotCurrentThread { operation: &'static str },

    /// Attempt to destroy the thread that is still running
    DestroyCurrent { pid: Pid },

    /// Thread queued twice or queued while running
    QueueCorrupted { pid: Pid, reason: &'static str },

    // ═══════════════════════════════════════════════════════════════
    // Kernel Errors
    // ═══════════════════════════════════════════════════════════════
    /// Invalid kernel configuration
    InvalidConfig { reason: &'static str },

    /// `Kernel::run` called twice
    AlreadyRunning,

    /// Internal invariant violated
    InternalError { reason: &'static str },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadLimitReached { current, max } => {
                write!(f, "Thread limit reached: {}/{}", current, max)
            }
            Self::ChildLimitReached { pid, max } => {
                write!(f, "Thread {} child limit reached: {}", pid, max)
            }
            Self::ThreadNotFound { pid } => write!(f, "Thread {} not found", pid),
            Self::NotAChild { pid, index } => {
                write!(f, "Thread {} has no child in slot {}", pid, index)
            }
            Self::ChildAlreadyExited { pid, child } => {
                write!(f, "Thread {} already recorded exit of child {}", pid, child)
            }
            Self::InvalidStateTransition { pid, from, to } => {
                write!(f, "Thread {}: invalid transition {} -> {}", pid, from, to)
            }
            Self::StackOverflow { pid } => write!(f, "Thread {} overflowed its stack", pid),
            Self::ThreadPanicked { pid } => write!(f, "Thread {} panicked", pid),
            Self::SpawnFailed { pid } => write!(f, "Could not spawn host thread for {}", pid),
            Self::NotInAtomicRegion { operation } => {
                write!(f, "{} called with interrupts enabled", operation)
            }
            Self::NotCurrentThread { operation } => {
                write!(f, "{} called by a thread that is not running", operation)
            }
            Self::DestroyCurrent { pid } => write!(f, "Thread {} destroyed while running", pid),
            Self::QueueCorrupted { pid, reason } => {
                write!(f, "Queue corrupted by thread {}: {}", pid, reason)
            }
            Self::InvalidConfig { reason } => write!(f, "Invalid configuration: {}", reason),
            Self::AlreadyRunning => write!(f, "Kernel already running"),
            Self::InternalError { reason } => write!(f, "Internal error: {}", reason),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Is this error one the simulation can continue from?
    ///
    /// Only configuration errors are reported before anything runs; everything
    /// else means a scheduler or thread invariant is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::AlreadyRunning)
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Abort the simulation on an invariant violation.
///
/// Unwinds the calling thread with `err` as payload; the thread trampoline
/// catches it and halts the kernel.
#[track_caller]
pub fn fatal(err: SchedulerError) -> ! {
    log::error!("[SCHED CRITICAL] Invariant violated: {}", err);
    std::panic::panic_any(err)
}

/// Escalate an invariant check result to [`fatal`]
pub trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for SchedulerResult<T> {
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }
}

/// Macro for critical scheduler assertions
#[macro_export]
macro_rules! sched_assert {
    ($cond:expr, $err:expr) => {
        if !$cond {
            $crate::scheduler::core::error::fatal($err);
        }
    };
}
