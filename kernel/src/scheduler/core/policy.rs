//! Scheduling Policies
//!
//! - FCFS: first come first served, runs until yield/block
//! - RoundRobin: FCFS with a timer-enforced quantum
//! - ShortestPrediction: smallest predicted burst first (EMA)
//! - StaticPriority: smallest base priority first
//! - UnixDecay: smallest decayed priority first, with a quantum
//!
//! Insertion into the ready queue is always FIFO; a policy only decides which
//! entry selection removes. Ties go to the earliest enqueued thread.

use core::fmt;

use crate::scheduler::thread::Thread;

/// Default time slice of the preemptive policies (ticks)
pub const DEFAULT_QUANTUM: u64 = 100;

/// Scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// First come first served
    Fcfs,
    /// FIFO with preemption every `quantum` ticks
    RoundRobin { quantum: u64 },
    /// Shortest predicted burst first
    ShortestPrediction,
    /// Static base priority, numerically smallest first
    StaticPriority,
    /// UNIX-style decayed priority with preemption every `quantum` ticks
    UnixDecay { quantum: u64 },
}

/// How the ready queue is searched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Head of the queue
    Fifo,
    /// First minimum of [`SchedulingPolicy::selection_key`]
    MinKey,
}

impl SchedulingPolicy {
    /// Create from the numeric selector used on the command line (1..=5)
    pub fn from_raw(value: u32, quantum: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Fcfs),
            2 => Some(Self::RoundRobin { quantum }),
            3 => Some(Self::ShortestPrediction),
            4 => Some(Self::StaticPriority),
            5 => Some(Self::UnixDecay { quantum }),
            _ => None,
        }
    }

    /// Numeric selector, inverse of [`from_raw`](Self::from_raw)
    pub fn as_raw(&self) -> u32 {
        match self {
            Self::Fcfs => 1,
            Self::RoundRobin { .. } => 2,
            Self::ShortestPrediction => 3,
            Self::StaticPriority => 4,
            Self::UnixDecay { .. } => 5,
        }
    }

    /// Timer quantum, `None` for non-preemptive policies
    pub fn time_slice(&self) -> Option<u64> {
        match self {
            Self::RoundRobin { quantum } | Self::UnixDecay { quantum } => Some(*quantum),
            _ => None,
        }
    }

    /// Does the timer interrupt force yields under this policy?
    pub fn is_preemptive(&self) -> bool {
        self.time_slice().is_some()
    }

    /// Are priorities recomputed from decayed CPU usage?
    pub fn uses_decay(&self) -> bool {
        matches!(self, Self::UnixDecay { .. })
    }

    /// Are burst lengths predicted?
    pub fn uses_prediction(&self) -> bool {
        matches!(self, Self::ShortestPrediction)
    }

    pub fn selection_order(&self) -> SelectionOrder {
        match self {
            Self::Fcfs | Self::RoundRobin { .. } => SelectionOrder::Fifo,
            _ => SelectionOrder::MinKey,
        }
    }

    /// Ordering key of a ready thread; smaller is preferred
    pub fn selection_key(&self, thread: &Thread) -> f64 {
        match self {
            Self::ShortestPrediction => thread.predicted_burst(),
            Self::StaticPriority => thread.base_priority() as f64,
            Self::UnixDecay { .. } => thread.current_priority() as f64,
            Self::Fcfs | Self::RoundRobin { .. } => 0.0,
        }
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::Fcfs
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fcfs => write!(f, "FCFS"),
            Self::RoundRobin { quantum } => write!(f, "Round-Robin (quantum {})", quantum),
            Self::ShortestPrediction => write!(f, "Shortest-Job-Prediction"),
            Self::StaticPriority => write!(f, "Static Priority"),
            Self::UnixDecay { quantum } => write!(f, "UNIX Decay (quantum {})", quantum),
        }
    }
}
