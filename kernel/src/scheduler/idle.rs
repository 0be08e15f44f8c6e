//! Idle loop
//!
//! Runs on whichever thread found the ready queue empty. The machine jumps
//! its clock to the next pending event (timed wake or device interrupt); if
//! there is none the simulation is over.

use crate::kernel::{HaltReason, Kernel};

impl Kernel {
    /// Idle the CPU until the next interrupt, then service it
    pub(crate) fn idle(&self) {
        let (deadline, blocked) = {
            let state = self.lock();
            (state.scheduler.next_deadline(), state.threads.live_count())
        };

        let before = self.now();
        if !self.inner.machine.idle(deadline) {
            if blocked > 0 {
                log::warn!("[IDLE] Machine idle with {} blocked thread(s) and no pending interrupts", blocked);
            } else {
                log::info!("[IDLE] No threads ready or runnable, and no pending interrupts");
            }
            self.halt(HaltReason::NoPendingWork);
        }

        let idle_ticks = self.now().saturating_sub(before);
        if idle_ticks > 0 {
            log::debug!("[IDLE] Idled {} ticks until tick {}", idle_ticks, self.now());
            self.lock().stats.record_idle(idle_ticks);
        }
        self.service_interrupts();
    }
}
