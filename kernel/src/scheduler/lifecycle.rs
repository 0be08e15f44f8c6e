//! Thread lifecycle operations
//!
//! Fork, yield, sleep, finish, exit and join, plus the timed-wait and wake
//! primitives. Every operation that suspends the caller must be issued by
//! the running thread; queue and state mutation happens with interrupts off.

use alloc::boxed::Box;

use crate::kernel::{HaltReason, Kernel};
use crate::machine::ExecutionImage;
use crate::scheduler::core::error::{fatal, OrFatal, SchedulerError};
use crate::scheduler::core::interrupt::IntLevel;
use crate::scheduler::thread::{Pid, ThreadState};

impl Kernel {
    /// Create a thread running `entry(arg)` at the default base priority.
    ///
    /// The child is registered with the caller and made ready; when `entry`
    /// returns the child finishes.
    pub fn fork<F, A>(&self, name: &str, entry: F, arg: A) -> Pid
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        self.fork_with_priority(name, self.inner.config.base_priority, entry, arg)
    }

    pub fn fork_with_priority<F, A>(&self, name: &str, priority: u64, entry: F, arg: A) -> Pid
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        let parent = self.assert_current("fork");
        let stack = self.inner.stacks.alloc();
        let pid = self
            .spawn(Some(parent), name, priority, Some(stack), Box::new(move || entry(arg)))
            .or_fatal();

        let _guard = self.disable_interrupts();
        let now = self.now();
        self.lock().mark_ready(pid, now).or_fatal();
        log::info!("[pid {}] Forked pid {} \"{}\" (priority {})", parent, pid, name, priority);
        pid
    }

    /// Give up the CPU to the next thread the policy picks.
    ///
    /// The caller re-enters the ready queue at the tail before the selection,
    /// so it competes with the other ready threads. If it is picked again it
    /// keeps running without a switch; the run segment is still accounted.
    pub fn yield_now(&self) {
        let pid = self.assert_current("yield");
        let _guard = self.disable_interrupts();
        self.update_stats(pid);

        let now = self.now();
        let next = {
            let mut state = self.lock();
            state.mark_ready(pid, now).or_fatal();
            let next = state.select_next().unwrap_or_else(|| {
                fatal(SchedulerError::InternalError {
                    reason: "ready queue empty after yield",
                })
            });
            if next == pid {
                state
                    .threads
                    .expect_mut(pid)
                    .or_fatal()
                    .set_state(ThreadState::Running)
                    .or_fatal();
            }
            next
        };
        if next != pid {
            self.dispatch(next);
        }
    }

    /// Block the running thread until something makes it ready again.
    ///
    /// Must be called with interrupts disabled, after the caller has put
    /// itself on whatever wait structure will wake it.
    pub fn sleep(&self) {
        let pid = self.assert_current("sleep");
        self.assert_atomic("sleep");
        self.update_stats(pid);

        let now = self.now();
        {
            let mut state = self.lock();
            let thread = state.threads.expect_mut(pid).or_fatal();
            thread.set_state(ThreadState::Blocked).or_fatal();
            thread.begin_sleep(now);
        }
        let next = self.next_runnable(false);
        self.dispatch(next);
    }

    /// Terminate the running thread without reporting an exit code
    pub fn finish(&self) -> ! {
        let pid = self.assert_current("finish");
        let _guard = self.disable_interrupts();
        log::debug!("[pid {}] Finishing", pid);
        {
            let mut state = self.lock();
            state.scheduler.set_to_be_destroyed(pid).or_fatal();
            state.threads.mark_exited(pid);
        }
        self.sleep();
        fatal(SchedulerError::InternalError {
            reason: "finished thread resumed",
        })
    }

    /// Terminate the running thread with `exit_code`.
    ///
    /// The code is recorded in the parent unless the parent is gone; a
    /// parent joining this thread is made ready. When nothing is ready and
    /// `terminate_if_last` holds, the simulation halts; otherwise the CPU
    /// idles until an interrupt produces work.
    pub fn exit(&self, terminate_if_last: bool, exit_code: i32) -> ! {
        let pid = self.assert_current("exit");
        let _guard = self.disable_interrupts();
        self.update_stats(pid);

        let now = self.now();
        {
            let mut state = self.lock();
            let thread = state.threads.expect_mut(pid).or_fatal();
            let summary = thread.exit_summary(now, exit_code);
            let ppid = thread.ppid();
            thread.set_state(ThreadState::Blocked).or_fatal();
            log::info!("{}", summary);

            if pid != 0 {
                state.stats.record_exit(&summary);
            }
            state.exits.push(summary);
            state.threads.mark_exited(pid);
            state.scheduler.set_to_be_destroyed(pid).or_fatal();

            if let Some(ppid) = ppid.filter(|&ppid| !state.threads.has_exited(ppid)) {
                let wake = match state.threads.get_mut(ppid) {
                    Some(parent) => parent.set_child_exit_code(pid, exit_code).or_fatal(),
                    None => false,
                };
                if wake {
                    state.mark_ready(ppid, now).or_fatal();
                }
            }
        }

        let next = self.next_runnable(terminate_if_last);
        self.dispatch(next);
        fatal(SchedulerError::InternalError {
            reason: "exited thread resumed",
        })
    }

    /// Wait for the child in slot `index` and return its exit code.
    ///
    /// Returns at once if the child already exited.
    pub fn join_with_child(&self, index: usize) -> i32 {
        let pid = self.assert_current("join");
        let _guard = self.disable_interrupts();
        let slot = {
            let mut state = self.lock();
            let thread = state.threads.expect_mut(pid).or_fatal();
            let slot = *thread
                .child(index)
                .ok_or(SchedulerError::NotAChild { pid, index })
                .or_fatal();
            if !slot.exited {
                thread.set_waiting_on_child(Some(index));
            }
            slot
        };
        if slot.exited {
            return slot.exit_code;
        }

        self.sleep();
        let state = self.lock();
        let thread = state.threads.expect(pid).or_fatal();
        thread
            .child(index)
            .map(|slot| slot.exit_code)
            .ok_or(SchedulerError::NotAChild { pid, index })
            .or_fatal()
    }

    /// Join by pid; `None` if `child` is not a child of the caller
    pub fn join(&self, child: Pid) -> Option<i32> {
        let index = self.check_if_child(child)?;
        Some(self.join_with_child(index))
    }

    /// Child slot of `pid` in the running thread, if it is a child
    pub fn check_if_child(&self, pid: Pid) -> Option<usize> {
        let me = self.assert_current("check_if_child");
        self.lock().threads.get(me)?.check_if_child(pid)
    }

    /// Block the running thread until tick `deadline`
    pub fn sleep_until(&self, deadline: u64) {
        let pid = self.assert_current("sleep_until");
        let _guard = self.disable_interrupts();
        self.lock().scheduler.sorted_insert(pid, deadline).or_fatal();
        log::debug!("[pid {}] Waiting until tick {}", pid, deadline);
        self.sleep();
    }

    /// Block the running thread for `ticks` ticks
    pub fn sleep_for(&self, ticks: u64) {
        self.sleep_until(self.now().saturating_add(ticks));
    }

    /// Move `pid` from the sleeping set to the ready queue.
    ///
    /// Returns `false` if it was not sleeping.
    pub fn wake(&self, pid: Pid) -> bool {
        let _guard = self.disable_interrupts();
        let now = self.now();
        let mut state = self.lock();
        match state.scheduler.remove_sleeping(pid) {
            Some(pid) => {
                state.mark_ready(pid, now).or_fatal();
                true
            }
            None => false,
        }
    }

    /// Append `pid` to the ready queue. Requires an atomic region.
    pub fn mark_ready(&self, pid: Pid) {
        self.assert_atomic("mark_ready");
        let now = self.now();
        self.lock().mark_ready(pid, now).or_fatal();
    }

    /// Add `pid` to the sleeping set. Requires an atomic region.
    pub fn insert_sleeping(&self, pid: Pid) {
        self.assert_atomic("insert_sleeping");
        self.lock().scheduler.insert_sleeping(pid).or_fatal();
    }

    /// Remove `pid` from the sleeping set; `None` if it is not there.
    /// Requires an atomic region.
    pub fn remove_sleeping(&self, pid: Pid) -> Option<Pid> {
        self.assert_atomic("remove_sleeping");
        self.lock().scheduler.remove_sleeping(pid)
    }

    pub fn is_sleeping_set_empty(&self) -> bool {
        self.lock().scheduler.is_sleeping_set_empty()
    }

    /// Dump the ready queue to the log
    pub fn print(&self) {
        let state = self.lock();
        state.scheduler.print(&state.threads);
    }

    pub fn current_pid(&self) -> Pid {
        self.assert_current("current_pid")
    }

    /// Is every thread other than the caller gone?
    pub fn others_all_exited(&self) -> bool {
        let me = self.assert_current("others_all_exited");
        self.lock()
            .threads
            .live_pids()
            .into_iter()
            .all(|pid| pid == me)
    }

    pub fn instruction_count(&self) -> u64 {
        let pid = self.assert_current("instruction_count");
        self.lock()
            .threads
            .expect(pid)
            .map(|thread| thread.instruction_count())
            .or_fatal()
    }

    pub fn inc_instruction_count(&self) {
        let pid = self.assert_current("inc_instruction_count");
        self.lock()
            .threads
            .expect_mut(pid)
            .map(|thread| thread.inc_instruction_count())
            .or_fatal();
    }

    /// Attach a user-mode image to the running thread
    pub fn attach_image(&self, image: Box<dyn ExecutionImage>) {
        let pid = self.assert_current("attach_image");
        self.lock()
            .threads
            .expect_mut(pid)
            .map(|thread| thread.attach_image(image))
            .or_fatal();
    }

    /// Run `f` on the simulated stack of the running thread.
    ///
    /// `None` for the root thread, which has no simulated stack.
    pub fn with_current_stack_mut<R>(&self, f: impl FnOnce(&mut [u32]) -> R) -> Option<R> {
        let pid = self.assert_current("with_current_stack_mut");
        let mut state = self.lock();
        let stack = state.threads.expect_mut(pid).or_fatal().stack_mut()?;
        Some(f(stack.as_mut_slice()))
    }

    /// Emulate `instructions` instructions of the running thread.
    ///
    /// Each one advances the clock a tick. With interrupts enabled the timer
    /// fires after every tick and preempts the thread once its quantum is
    /// used up.
    pub fn execute(&self, instructions: u64) {
        let pid = self.assert_current("execute");
        for _ in 0..instructions {
            self.inner.machine.advance(1);
            self.lock()
                .threads
                .expect_mut(pid)
                .map(|thread| thread.inc_instruction_count())
                .or_fatal();

            if self.interrupt_level() == IntLevel::On {
                self.service_interrupts();
                if self.quantum_expired(pid) {
                    log::debug!("[pid {}] Quantum expired at tick {}", pid, self.now());
                    self.yield_now();
                }
            }
        }
    }

    /// Timer interrupt: wake expired timed waiters, then deliver the
    /// machine's due device interrupts.
    pub(crate) fn service_interrupts(&self) {
        let _guard = self.disable_interrupts();
        let now = self.now();
        {
            let mut state = self.lock();
            for entry in state.scheduler.pop_expired(now) {
                log::debug!("[SCHED] Timer wake: pid {} (deadline {})", entry.pid, entry.deadline);
                state.mark_ready(entry.pid, now).or_fatal();
            }
        }
        for handler in self.inner.machine.take_due() {
            handler(self);
        }
    }

    fn quantum_expired(&self, pid: Pid) -> bool {
        let Some(quantum) = self.inner.config.policy.time_slice() else {
            return false;
        };
        let now = self.now();
        self.lock()
            .threads
            .get(pid)
            .map_or(false, |thread| now.saturating_sub(thread.stats().burst_start) >= quantum)
    }

    /// Close the run segment of `pid` and feed the active policy
    pub(crate) fn update_stats(&self, pid: Pid) {
        let policy = self.inner.config.policy;
        let now = self.now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let thread = state.threads.expect_mut(pid).or_fatal();
        let burst = thread.close_burst(now);
        if burst > 0 && policy.uses_prediction() {
            let error = thread.update_prediction(&self.inner.config.prediction, burst);
            state.stats.record_estimation_error(error);
        }
        if policy.uses_decay() {
            let decay = self.inner.config.decay;
            state.threads.for_each_live_mut(|thread| thread.fold_cpu_usage(&decay));
        }
    }

    /// Next thread to dispatch, idling the CPU while none is ready
    pub(crate) fn next_runnable(&self, terminate_if_last: bool) -> Pid {
        loop {
            if let Some(next) = self.lock().select_next() {
                return next;
            }
            if terminate_if_last {
                self.halt(HaltReason::AllThreadsExited);
            }
            self.idle();
        }
    }
}
