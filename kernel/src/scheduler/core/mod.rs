//! Scheduler core module
//!
//! Queues, selection policies, the atomic-region primitive, statistics and
//! the error taxonomy.

pub mod error;
pub mod interrupt;
pub mod policy;
pub mod queues;
pub mod scheduler;
pub mod statistics;

pub use error::{fatal, OrFatal, SchedulerError, SchedulerResult};
pub use interrupt::{IntLevel, InterruptController, InterruptGuard};
pub use policy::{SchedulingPolicy, SelectionOrder, DEFAULT_QUANTUM};
pub use queues::{ReadyQueue, SleepingSet, TimeSortedWaitQueue, WaitQueueEntry};
pub use scheduler::Scheduler;
pub use statistics::{ExitSummary, SystemStats};
