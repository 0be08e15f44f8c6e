//! Scheduler subsystem
//!
//! Cooperative uniprocessor threading: TCBs, ready/sleeping/timed queues,
//! pluggable selection policies with burst feedback, and baton-based
//! context transfer between host threads.

pub mod core;
pub mod idle;
pub mod lifecycle;
pub mod prediction;
pub mod switch;
pub mod thread;

// Re-exports
pub use self::core::{
    ExitSummary, IntLevel, InterruptGuard, SchedulerError, SchedulerResult, SchedulingPolicy,
    SystemStats,
};
pub use self::thread::{Pid, ThreadState};
