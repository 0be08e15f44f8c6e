//! Interrupt level and the atomic-region guard
//!
//! The simulated CPU has one interrupt-enable flag. Disabling it is the only
//! synchronization the scheduler uses: queue mutation, the running pid and
//! cross-thread writes all happen with interrupts off.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// Interrupt level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    Off,
    On,
}

impl fmt::Display for IntLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::On => write!(f, "on"),
        }
    }
}

/// The interrupt-enable flag of the simulated CPU
pub struct InterruptController {
    enabled: AtomicBool,
}

impl InterruptController {
    /// Interrupts start disabled, as at boot
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
        }
    }

    pub fn level(&self) -> IntLevel {
        if self.enabled.load(Ordering::Acquire) {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    /// Set the level and return the previous one
    pub fn set_level(&self, level: IntLevel) -> IntLevel {
        let previous = self.enabled.swap(level == IntLevel::On, Ordering::AcqRel);
        if previous {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    /// Are we inside an atomic region?
    pub fn is_atomic(&self) -> bool {
        self.level() == IntLevel::Off
    }

    /// Enter an atomic region; the previous level is restored on drop
    pub fn disable(&self) -> InterruptGuard<'_> {
        InterruptGuard {
            controller: self,
            previous: self.set_level(IntLevel::Off),
        }
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII atomic region
///
/// A thread unwinding out of the simulation (destroyed or halted) leaves the
/// level alone; it belongs to whichever thread runs next.
pub struct InterruptGuard<'a> {
    controller: &'a InterruptController,
    previous: IntLevel,
}

impl InterruptGuard<'_> {
    /// Level in effect before the guard was taken
    pub fn previous(&self) -> IntLevel {
        self.previous
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.controller.set_level(self.previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disabled() {
        let ctrl = InterruptController::new();
        assert_eq!(ctrl.level(), IntLevel::Off);
        assert!(ctrl.is_atomic());
    }

    #[test]
    fn test_guard_restores_previous_level() {
        let ctrl = InterruptController::new();
        ctrl.set_level(IntLevel::On);
        {
            let guard = ctrl.disable();
            assert_eq!(guard.previous(), IntLevel::On);
            assert!(ctrl.is_atomic());
            {
                let inner = ctrl.disable();
                assert_eq!(inner.previous(), IntLevel::Off);
            }
            // nested guard keeps the region atomic
            assert!(ctrl.is_atomic());
        }
        assert_eq!(ctrl.level(), IntLevel::On);
    }

    #[test]
    fn test_unwinding_guard_leaves_level() {
        let ctrl = InterruptController::new();
        ctrl.set_level(IntLevel::On);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ctrl.disable();
            std::panic::resume_unwind(Box::new(()));
        }));
        assert!(result.is_err());
        assert_eq!(ctrl.level(), IntLevel::Off);
    }
}
