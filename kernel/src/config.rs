//! Kernel configuration
//!
//! Scheduling policy, capacities and the feedback constants of the
//! prediction and decay policies.

use crate::scheduler::core::error::{SchedulerError, SchedulerResult};
use crate::scheduler::core::policy::SchedulingPolicy;
use crate::scheduler::prediction::{
    BurstPredictor, DecayParams, DEFAULT_DECAY_DIVISOR, DEFAULT_PREDICTION_RATIO,
};
use crate::scheduler::thread::stack::{DEFAULT_HOST_STACK_SIZE, DEFAULT_STACK_WORDS};

/// Maximum number of concurrently live threads
pub const MAX_THREAD_COUNT: usize = 1000;

/// Maximum number of children tracked per thread
pub const MAX_CHILD_COUNT: usize = 1000;

/// Base priority given to threads forked without an explicit one
pub const DEFAULT_BASE_PRIORITY: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelConfig {
    pub policy: SchedulingPolicy,
    pub max_threads: usize,
    pub max_children: usize,
    /// Simulated stack size, in words
    pub stack_words: usize,
    /// Stack size of each backing host thread, in bytes
    pub host_stack_size: usize,
    pub base_priority: u64,
    pub prediction: BurstPredictor,
    pub decay: DecayParams,
    /// Record every dispatched pid in [`SystemStats::dispatch_trace`](crate::scheduler::core::statistics::SystemStats)
    pub trace_dispatches: bool,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            policy: SchedulingPolicy::Fcfs,
            max_threads: MAX_THREAD_COUNT,
            max_children: MAX_CHILD_COUNT,
            stack_words: DEFAULT_STACK_WORDS,
            host_stack_size: DEFAULT_HOST_STACK_SIZE,
            base_priority: DEFAULT_BASE_PRIORITY,
            prediction: BurstPredictor::new(DEFAULT_PREDICTION_RATIO),
            decay: DecayParams::new(DEFAULT_DECAY_DIVISOR, DEFAULT_DECAY_DIVISOR),
            trace_dispatches: true,
        }
    }

    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    pub fn with_stack_words(mut self, stack_words: usize) -> Self {
        self.stack_words = stack_words;
        self
    }

    pub fn with_host_stack_size(mut self, host_stack_size: usize) -> Self {
        self.host_stack_size = host_stack_size;
        self
    }

    pub fn with_base_priority(mut self, base_priority: u64) -> Self {
        self.base_priority = base_priority;
        self
    }

    pub fn with_prediction_ratio(mut self, ratio: f64) -> Self {
        self.prediction = BurstPredictor::new(ratio);
        self
    }

    pub fn with_decay(mut self, cpu_divisor: u64, priority_divisor: u64) -> Self {
        self.decay = DecayParams::new(cpu_divisor, priority_divisor);
        self
    }

    pub fn with_dispatch_trace(mut self, enabled: bool) -> Self {
        self.trace_dispatches = enabled;
        self
    }

    /// Reject configurations the kernel cannot run with
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_threads == 0 {
            return Err(SchedulerError::InvalidConfig {
                reason: "max_threads must be at least 1",
            });
        }
        if self.stack_words == 0 {
            return Err(SchedulerError::InvalidConfig {
                reason: "stack_words must be at least 1",
            });
        }
        if self.host_stack_size == 0 {
            return Err(SchedulerError::InvalidConfig {
                reason: "host_stack_size must be non-zero",
            });
        }
        if let Some(0) = self.policy.time_slice() {
            return Err(SchedulerError::InvalidConfig {
                reason: "quantum must be non-zero",
            });
        }
        if !self.prediction.is_valid() {
            return Err(SchedulerError::InvalidConfig {
                reason: "prediction ratio must lie in (0, 1]",
            });
        }
        if !self.decay.is_valid() {
            return Err(SchedulerError::InvalidConfig {
                reason: "decay divisors must be non-zero",
            });
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
