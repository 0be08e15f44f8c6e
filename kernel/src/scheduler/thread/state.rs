//! State - Thread state machine
//!
//! `Created -> Ready -> Running -> {Ready, Blocked} -> Running -> ... -> Blocked(exiting)`

use core::fmt;

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadState {
    /// TCB allocated, never queued
    Created = 0,

    /// Thread is on the ready queue
    Ready = 1,

    /// Thread owns the CPU
    Running = 2,

    /// Thread is waiting (sleeping set, time-sorted queue, child join, or exiting)
    Blocked = 3,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Ready => write!(f, "Ready"),
            Self::Running => write!(f, "Running"),
            Self::Blocked => write!(f, "Blocked"),
        }
    }
}

/// Validate state transition
pub fn validate_transition(from: ThreadState, to: ThreadState) -> bool {
    use ThreadState::*;

    match (from, to) {
        // Fork
        (Created, Ready) => true,

        // Dispatch
        (Ready, Running) => true,

        // Yield
        (Running, Ready) => true,

        // Sleep / Finish / Exit / Join
        (Running, Blocked) => true,

        // Wake-up
        (Blocked, Ready) => true,

        // All other transitions invalid
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ThreadState::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(validate_transition(Created, Ready));
        assert!(validate_transition(Ready, Running));
        assert!(validate_transition(Running, Ready));
        assert!(validate_transition(Running, Blocked));
        assert!(validate_transition(Blocked, Ready));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!validate_transition(Created, Running));
        assert!(!validate_transition(Blocked, Running));
        assert!(!validate_transition(Ready, Blocked));
        assert!(!validate_transition(Ready, Ready));
    }
}
