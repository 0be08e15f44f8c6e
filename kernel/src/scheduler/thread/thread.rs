//! Thread Structure and Management
//!
//! The Thread Control Block: identity, lifecycle state, execution context,
//! scheduling attributes, CPU-burst statistics and parent/child bookkeeping.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use super::stack::ThreadStack;
use super::state::{validate_transition, ThreadState};
use crate::machine::ExecutionImage;
use crate::scheduler::core::error::{SchedulerError, SchedulerResult};
use crate::scheduler::core::statistics::ExitSummary;
use crate::scheduler::prediction::{BurstPredictor, DecayParams};
use crate::scheduler::switch::Baton;

/// Thread ID type. Dense, assigned at creation, never reused during a run.
pub type Pid = u64;

/// One entry of a parent's child table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
    pub pid: Pid,
    pub exited: bool,
    pub exit_code: i32,
}

/// Per-thread CPU accounting, all values in ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BurstStats {
    pub start_time: u64,
    pub burst_start: u64,
    pub total_burst: u64,
    pub min_burst: Option<u64>,
    pub max_burst: u64,
    pub burst_count: u64,
    pub sleep_time: u64,
    pub sleep_start: u64,
    pub instruction_count: u64,
}

impl BurstStats {
    fn new(now: u64) -> Self {
        Self {
            start_time: now,
            burst_start: now,
            ..Self::default()
        }
    }

    /// Average burst length, 0 if the thread never completed one
    pub fn average_burst(&self) -> u64 {
        if self.burst_count > 0 {
            self.total_burst / self.burst_count
        } else {
            0
        }
    }
}

/// Thread Control Block (TCB)
pub struct Thread {
    pid: Pid,
    ppid: Option<Pid>,
    name: Box<str>,
    state: ThreadState,

    /// Hand-off signal of the backing host thread
    baton: Arc<Baton>,
    /// Simulated stack; the root thread runs on the host stack and has none
    stack: Option<ThreadStack>,
    /// Attached user-mode image, saved/restored around each transfer
    image: Option<Box<dyn ExecutionImage>>,

    // Scheduling attributes
    base_priority: u64,
    current_priority: u64,
    cpu_count: u64,
    last_burst: u64,
    predicted_burst: f64,

    stats: BurstStats,

    children: Vec<ChildSlot>,
    waiting_on_child: Option<usize>,
}

impl Thread {
    /// Create a TCB in the `Created` state
    pub fn new(
        pid: Pid,
        ppid: Option<Pid>,
        name: &str,
        base_priority: u64,
        now: u64,
        stack: Option<ThreadStack>,
        baton: Arc<Baton>,
    ) -> Self {
        Self {
            pid,
            ppid,
            name: name.into(),
            state: ThreadState::Created,
            baton,
            stack,
            image: None,
            base_priority,
            current_priority: base_priority,
            cpu_count: 0,
            last_burst: 0,
            predicted_burst: 0.0,
            stats: BurstStats::new(now),
            children: Vec::new(),
            waiting_on_child: None,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn ppid(&self) -> Option<Pid> {
        self.ppid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Move to `state`, rejecting transitions outside the lifecycle graph
    pub fn set_state(&mut self, state: ThreadState) -> SchedulerResult<()> {
        if !validate_transition(self.state, state) {
            return Err(SchedulerError::InvalidStateTransition {
                pid: self.pid,
                from: self.state,
                to: state,
            });
        }
        self.state = state;
        Ok(())
    }

    pub fn baton(&self) -> &Arc<Baton> {
        &self.baton
    }

    pub fn stack(&self) -> Option<&ThreadStack> {
        self.stack.as_ref()
    }

    pub fn stack_mut(&mut self) -> Option<&mut ThreadStack> {
        self.stack.as_mut()
    }

    /// Validate the stack fencepost; threads without a simulated stack pass
    pub fn check_overflow(&self) -> SchedulerResult<()> {
        match &self.stack {
            Some(stack) => stack.check_overflow(self.pid),
            None => Ok(()),
        }
    }

    pub fn attach_image(&mut self, image: Box<dyn ExecutionImage>) {
        self.image = Some(image);
    }

    /// Save the volatile state of the attached image, if any
    pub fn save_user_state(&mut self) {
        if let Some(image) = self.image.as_mut() {
            image.save_state();
        }
    }

    /// Restore the volatile state of the attached image, if any
    pub fn restore_user_state(&mut self) {
        if let Some(image) = self.image.as_mut() {
            image.restore_state();
        }
    }

    // Scheduling attributes

    pub fn base_priority(&self) -> u64 {
        self.base_priority
    }

    pub fn current_priority(&self) -> u64 {
        self.current_priority
    }

    pub fn cpu_count(&self) -> u64 {
        self.cpu_count
    }

    pub fn predicted_burst(&self) -> f64 {
        self.predicted_burst
    }

    /// Fold the pending burst into the CPU usage estimate and recompute
    /// the dynamic priority.
    pub fn fold_cpu_usage(&mut self, decay: &DecayParams) {
        self.cpu_count = decay.fold(self.cpu_count, self.last_burst);
        self.current_priority = decay.priority(self.base_priority, self.cpu_count);
        self.last_burst = 0;
    }

    /// Feed an observed burst to the predictor; returns the estimation error
    pub fn update_prediction(&mut self, predictor: &BurstPredictor, burst: u64) -> f64 {
        let error = predictor.error(self.predicted_burst, burst);
        self.predicted_burst = predictor.predict(self.predicted_burst, burst);
        error
    }

    // Statistics

    pub fn stats(&self) -> &BurstStats {
        &self.stats
    }

    /// Mark the start of a run segment
    pub fn begin_burst(&mut self, now: u64) {
        self.stats.burst_start = now;
    }

    /// Close the current run segment and return its length.
    ///
    /// Zero-length segments are not counted as bursts.
    pub fn close_burst(&mut self, now: u64) -> u64 {
        let burst = now.saturating_sub(self.stats.burst_start);
        self.stats.burst_start = now;
        if burst > 0 {
            self.last_burst = burst;
            self.stats.burst_count += 1;
            self.stats.total_burst += burst;
            self.stats.max_burst = self.stats.max_burst.max(burst);
            self.stats.min_burst = Some(self.stats.min_burst.map_or(burst, |m| m.min(burst)));
        }
        burst
    }

    pub fn begin_sleep(&mut self, now: u64) {
        self.stats.sleep_start = now;
    }

    /// Account the time spent blocked since [`begin_sleep`](Self::begin_sleep)
    pub fn end_sleep(&mut self, now: u64) {
        self.stats.sleep_time += now.saturating_sub(self.stats.sleep_start);
    }

    pub fn inc_instruction_count(&mut self) {
        self.stats.instruction_count += 1;
    }

    pub fn instruction_count(&self) -> u64 {
        self.stats.instruction_count
    }

    /// Final accounting record for an exiting thread
    pub fn exit_summary(&self, now: u64, exit_code: i32) -> ExitSummary {
        let lifetime = now.saturating_sub(self.stats.start_time);
        let utilization = if lifetime > 0 {
            100 * self.stats.total_burst / lifetime
        } else {
            0
        };
        ExitSummary {
            pid: self.pid,
            exit_code,
            instructions: self.stats.instruction_count,
            start_tick: self.stats.start_time,
            exit_tick: now,
            max_burst: self.stats.max_burst,
            min_burst: self.stats.min_burst.unwrap_or(0),
            total_burst: self.stats.total_burst,
            bursts: self.stats.burst_count,
            sleep_time: self.stats.sleep_time,
            wait_time: lifetime
                .saturating_sub(self.stats.total_burst)
                .saturating_sub(self.stats.sleep_time),
            utilization,
        }
    }

    // Parent-child tracking

    /// Register a newly forked child; returns its slot index
    pub fn register_child(&mut self, child: Pid, max_children: usize) -> SchedulerResult<usize> {
        if self.children.len() >= max_children {
            return Err(SchedulerError::ChildLimitReached {
                pid: self.pid,
                max: max_children,
            });
        }
        self.children.push(ChildSlot {
            pid: child,
            exited: false,
            exit_code: 0,
        });
        Ok(self.children.len() - 1)
    }

    /// Slot index of `pid` if it is a child of this thread
    pub fn check_if_child(&self, pid: Pid) -> Option<usize> {
        self.children.iter().position(|slot| slot.pid == pid)
    }

    pub fn child(&self, index: usize) -> Option<&ChildSlot> {
        self.children.get(index)
    }

    pub fn children(&self) -> &[ChildSlot] {
        &self.children
    }

    pub fn waiting_on_child(&self) -> Option<usize> {
        self.waiting_on_child
    }

    pub fn set_waiting_on_child(&mut self, index: Option<usize>) {
        self.waiting_on_child = index;
    }

    /// Record the exit code of `child`.
    ///
    /// Returns `true` when this thread was blocked joining exactly that child
    /// and must be made ready.
    pub fn set_child_exit_code(&mut self, child: Pid, exit_code: i32) -> SchedulerResult<bool> {
        let index = self
            .check_if_child(child)
            .ok_or(SchedulerError::ThreadNotFound { pid: child })?;
        let slot = &mut self.children[index];
        if slot.exited {
            return Err(SchedulerError::ChildAlreadyExited {
                pid: self.pid,
                child,
            });
        }
        slot.exited = true;
        slot.exit_code = exit_code;

        if self.waiting_on_child == Some(index) {
            self.waiting_on_child = None;
            return Ok(true);
        }
        Ok(false)
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[pid {}] {} state={} base={} prio={} cpu={} predicted={:.1}",
            self.pid,
            self.name,
            self.state,
            self.base_priority,
            self.current_priority,
            self.cpu_count,
            self.predicted_burst
        )
    }
}
