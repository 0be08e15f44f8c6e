// src/lib.rs
// Cooperative threading core of the simulated kernel

extern crate alloc;

pub mod config;
pub mod kernel;
pub mod logger;
pub mod machine;
pub mod scheduler;

pub use config::KernelConfig;
pub use kernel::{HaltReason, Kernel, RunReport};
pub use machine::{ExecutionImage, InterruptHandler, Machine, SimMachine};
pub use scheduler::{
    ExitSummary, IntLevel, Pid, SchedulerError, SchedulerResult, SchedulingPolicy, SystemStats,
    ThreadState,
};
