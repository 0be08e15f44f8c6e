//! Simulated machine
//!
//! The threading core only needs three things from the hardware below it: a
//! monotonic tick counter, a way to idle until the next interrupt, and the
//! interrupts that became due. [`SimMachine`] provides them with a one-shot
//! device interrupt list; handlers run on the kernel inside an atomic region.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::kernel::Kernel;

/// Device interrupt handler, run once when its tick is reached
pub type InterruptHandler = Box<dyn FnOnce(&Kernel) + Send>;

/// Interrupt/timer subsystem seen by the scheduler
pub trait Machine: Send + Sync {
    /// Current simulated time
    fn total_ticks(&self) -> u64;

    /// Advance the clock (one tick per emulated instruction)
    fn advance(&self, ticks: u64);

    /// Idle the CPU until the next pending event.
    ///
    /// `timer_deadline` is the earliest wake deadline of the time-sorted wait
    /// queue. Returns `false` when nothing at all is pending; the simulation
    /// must then halt.
    fn idle(&self, timer_deadline: Option<u64>) -> bool;

    /// Remove and return every device interrupt that is due
    fn take_due(&self) -> Vec<InterruptHandler>;
}

/// Attached user-mode execution image (address space, registers)
pub trait ExecutionImage: Send {
    /// Save volatile state before the owning thread is switched out
    fn save_state(&mut self);

    /// Restore volatile state after the owning thread is switched back in
    fn restore_state(&mut self);
}

struct PendingInterrupt {
    when: u64,
    handler: InterruptHandler,
}

/// Default machine: tick counter plus a time-ordered interrupt list
pub struct SimMachine {
    ticks: AtomicU64,
    pending: Mutex<Vec<PendingInterrupt>>,
}

impl SimMachine {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Raise `handler` at tick `when`; equal ticks fire in scheduling order
    pub fn schedule<F>(&self, when: u64, handler: F)
    where
        F: FnOnce(&Kernel) + Send + 'static,
    {
        let mut pending = self.pending.lock();
        let index = pending.partition_point(|p| p.when <= when);
        pending.insert(
            index,
            PendingInterrupt {
                when,
                handler: Box::new(handler),
            },
        );
    }

    /// Raise `handler` `delay` ticks from now
    pub fn schedule_in<F>(&self, delay: u64, handler: F)
    where
        F: FnOnce(&Kernel) + Send + 'static,
    {
        self.schedule(self.total_ticks().saturating_add(delay), handler);
    }

    /// Number of interrupts not yet delivered
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn next_interrupt(&self) -> Option<u64> {
        self.pending.lock().first().map(|p| p.when)
    }
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for SimMachine {
    fn total_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    fn idle(&self, timer_deadline: Option<u64>) -> bool {
        let next = match (timer_deadline, self.next_interrupt()) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return false,
        };
        // jump straight to the event; the clock never moves backwards
        self.ticks.fetch_max(next, Ordering::AcqRel);
        true
    }

    fn take_due(&self) -> Vec<InterruptHandler> {
        let now = self.total_ticks();
        let mut pending = self.pending.lock();
        let count = pending.partition_point(|p| p.when <= now);
        pending.drain(..count).map(|p| p.handler).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_without_events_halts() {
        let machine = SimMachine::new();
        assert!(!machine.idle(None));
        assert_eq!(machine.total_ticks(), 0);
    }

    #[test]
    fn test_idle_jumps_to_earliest_event() {
        let machine = SimMachine::new();
        machine.schedule(40, |_| {});
        assert!(machine.idle(Some(25)));
        assert_eq!(machine.total_ticks(), 25);
        assert!(machine.take_due().is_empty());

        assert!(machine.idle(None));
        assert_eq!(machine.total_ticks(), 40);
        assert_eq!(machine.take_due().len(), 1);
        assert_eq!(machine.pending_count(), 0);
    }

    #[test]
    fn test_idle_never_rewinds_clock() {
        let machine = SimMachine::new();
        machine.advance(50);
        assert!(machine.idle(Some(10)));
        assert_eq!(machine.total_ticks(), 50);
    }

    #[test]
    fn test_due_interrupts_in_order() {
        let machine = SimMachine::new();
        machine.schedule(5, |_| {});
        machine.schedule(3, |_| {});
        machine.schedule_in(9, |_| {});
        machine.advance(5);
        assert_eq!(machine.take_due().len(), 2);
        assert_eq!(machine.pending_count(), 1);
    }
}
