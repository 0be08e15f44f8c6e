//! Kernel instance
//!
//! One [`Kernel`] owns the scheduler, the thread table and the statistics of
//! a simulation. It is cheap to clone; every simulated thread holds a handle.
//!
//! [`Kernel::run`] turns the calling host thread into the machine: it
//! dispatches the root thread and parks until the simulation halts.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use hashbrown::HashMap;
use spin::{Mutex, MutexGuard, Once};

use crate::config::KernelConfig;
use crate::machine::{Machine, SimMachine};
use crate::scheduler::core::error::{fatal, OrFatal, SchedulerError, SchedulerResult};
use crate::scheduler::core::interrupt::{IntLevel, InterruptController, InterruptGuard};
use crate::scheduler::core::scheduler::Scheduler;
use crate::scheduler::core::statistics::{ExitSummary, SystemStats};
use crate::scheduler::switch::{self, Baton, Token};
use crate::scheduler::thread::{
    Pid, StackAllocator, Thread, ThreadStack, ThreadState, ThreadTable,
};

/// Body of a simulated thread, invoked once at first dispatch
pub(crate) type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Why the simulation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The last thread exited with `terminate_if_last`
    AllThreadsExited,
    /// No thread is ready and the machine has nothing pending
    NoPendingWork,
    /// A scheduler or thread invariant was violated
    Fatal(SchedulerError),
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllThreadsExited => write!(f, "all threads exited"),
            Self::NoPendingWork => write!(f, "no threads ready or runnable, and no pending interrupts"),
            Self::Fatal(err) => write!(f, "fatal: {}", err),
        }
    }
}

/// Outcome of [`Kernel::run`]
#[derive(Debug, Clone)]
pub struct RunReport {
    pub reason: HaltReason,
    /// Exit summaries in exit order, root included
    pub exits: Vec<ExitSummary>,
    pub stats: SystemStats,
    pub total_ticks: u64,
}

impl RunReport {
    pub fn exit_of(&self, pid: Pid) -> Option<&ExitSummary> {
        self.exits.iter().find(|summary| summary.pid == pid)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Halted at tick {}: {}", self.total_ticks, self.reason)?;
        write!(f, "{}", self.stats)
    }
}

/// Unwind payload of a thread leaving the simulation quietly
pub(crate) struct ThreadExit;

thread_local! {
    /// Pid simulated by this host thread
    static CURRENT: Cell<Option<Pid>> = Cell::new(None);
}

/// Scheduler state, only touched inside an atomic region
pub(crate) struct KernelState {
    pub scheduler: Scheduler,
    pub threads: ThreadTable,
    pub stats: SystemStats,
    pub exits: Vec<ExitSummary>,
}

impl KernelState {
    pub fn mark_ready(&mut self, pid: Pid, now: u64) -> SchedulerResult<()> {
        self.scheduler.mark_ready(&mut self.threads, pid, now)
    }

    pub fn select_next(&mut self) -> Option<Pid> {
        self.scheduler.select_next(&self.threads)
    }
}

pub(crate) struct Inner {
    pub config: KernelConfig,
    pub machine: Arc<dyn Machine>,
    pub interrupts: InterruptController,
    pub stacks: StackAllocator,
    pub state: Mutex<KernelState>,
    /// Backing host threads not yet reaped, by pid
    os_threads: Mutex<HashMap<Pid, JoinHandle<()>>>,
    halt: Once<HaltReason>,
    host: Once<std::thread::Thread>,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct Kernel {
    pub(crate) inner: Arc<Inner>,
}

impl Kernel {
    /// Kernel on a fresh [`SimMachine`]
    pub fn new(config: KernelConfig) -> Self {
        Self::with_machine(config, Arc::new(SimMachine::new()))
    }

    pub fn with_machine(config: KernelConfig, machine: Arc<dyn Machine>) -> Self {
        let state = KernelState {
            scheduler: Scheduler::new(config.policy),
            threads: ThreadTable::new(config.max_threads),
            stats: SystemStats::new(),
            exits: Vec::new(),
        };
        Self {
            inner: Arc::new(Inner {
                stacks: StackAllocator::new(config.stack_words, config.host_stack_size),
                config,
                machine,
                interrupts: InterruptController::new(),
                state: Mutex::new(state),
                os_threads: Mutex::new(HashMap::new()),
                halt: Once::new(),
                host: Once::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    pub fn machine(&self) -> &Arc<dyn Machine> {
        &self.inner.machine
    }

    /// Current simulated tick
    pub fn total_ticks(&self) -> u64 {
        self.inner.machine.total_ticks()
    }

    pub fn interrupt_level(&self) -> IntLevel {
        self.inner.interrupts.level()
    }

    /// Set the interrupt level, returning the previous one
    pub fn set_interrupt_level(&self, level: IntLevel) -> IntLevel {
        self.inner.interrupts.set_level(level)
    }

    /// Enter an atomic region for the lifetime of the guard
    pub fn disable_interrupts(&self) -> InterruptGuard<'_> {
        self.inner.interrupts.disable()
    }

    /// Snapshot of the system statistics
    pub fn stats(&self) -> SystemStats {
        self.lock().stats.clone()
    }

    /// Inspect a live thread
    pub fn with_thread<R>(&self, pid: Pid, f: impl FnOnce(&Thread) -> R) -> Option<R> {
        self.lock().threads.get(pid).map(f)
    }

    /// Run the simulation with `main` as the root thread (pid 0).
    ///
    /// Blocks the calling host thread until the simulation halts. A fatal
    /// invariant violation is returned as the error.
    pub fn run<F>(&self, main: F) -> SchedulerResult<RunReport>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.config.validate()?;
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.inner.host.call_once(std::thread::current);
        log::info!("[KERNEL] Starting simulation, policy {}", self.inner.config.policy);

        let root = self.spawn(None, "main", self.inner.config.base_priority, None, Box::new(main))?;
        let baton = {
            let _guard = self.disable_interrupts();
            let now = self.now();
            let mut state = self.lock();
            state.mark_ready(root, now)?;
            let first = state
                .select_next()
                .ok_or(SchedulerError::InternalError { reason: "root not ready" })?;
            self.activate(&mut state, first, now)?;
            state.threads.expect(first)?.baton().clone()
        };
        baton.pass(Token::Run);

        while self.inner.halt.get().is_none() {
            std::thread::park();
        }
        loop {
            let handles: Vec<JoinHandle<()>> = self
                .inner
                .os_threads
                .lock()
                .drain()
                .map(|(_, handle)| handle)
                .collect();
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                let _ = handle.join();
            }
        }

        let reason = self
            .inner
            .halt
            .get()
            .copied()
            .unwrap_or(HaltReason::NoPendingWork);
        if let HaltReason::Fatal(err) = reason {
            return Err(err);
        }

        let total_ticks = self.now();
        let state = self.lock();
        let report = RunReport {
            reason,
            exits: state.exits.clone(),
            stats: state.stats.clone(),
            total_ticks,
        };
        log::info!("[KERNEL] {}", report);
        Ok(report)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.inner.state.lock()
    }

    pub(crate) fn now(&self) -> u64 {
        self.inner.machine.total_ticks()
    }

    /// Pid simulated by the calling host thread
    pub(crate) fn host_pid() -> Option<Pid> {
        CURRENT.with(|current| current.get())
    }

    /// Fatal unless interrupts are disabled
    #[track_caller]
    pub(crate) fn assert_atomic(&self, operation: &'static str) {
        crate::sched_assert!(
            self.inner.interrupts.is_atomic(),
            SchedulerError::NotInAtomicRegion { operation }
        );
    }

    /// Fatal unless the caller is the running thread; returns its pid
    #[track_caller]
    pub(crate) fn assert_current(&self, operation: &'static str) -> Pid {
        let pid = Self::host_pid();
        let running = self.lock().scheduler.current();
        match pid {
            Some(pid) if running == Some(pid) => pid,
            _ => fatal(SchedulerError::NotCurrentThread { operation }),
        }
    }

    /// Create the TCB and backing host thread of a new simulated thread.
    ///
    /// The host thread parks on its baton until first dispatch.
    pub(crate) fn spawn(
        &self,
        parent: Option<Pid>,
        name: &str,
        priority: u64,
        stack: Option<ThreadStack>,
        body: ThreadBody,
    ) -> SchedulerResult<Pid> {
        let now = self.now();
        let pid = {
            let _guard = self.disable_interrupts();
            let mut state = self.lock();
            let pid = state.threads.allocate_pid()?;
            if let Some(ppid) = parent {
                let max_children = self.inner.config.max_children;
                state.threads.expect_mut(ppid)?.register_child(pid, max_children)?;
            }
            pid
        };

        let baton = Arc::new(Baton::new());
        let kernel = self.clone();
        let thread_baton = baton.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", name, pid))
            .stack_size(self.inner.stacks.host_stack_size())
            .spawn(move || trampoline(kernel, pid, thread_baton, body))
            .map_err(|_| SchedulerError::SpawnFailed { pid })?;
        baton.bind(handle.thread().clone());
        self.inner.os_threads.lock().insert(pid, handle);

        let thread = Thread::new(pid, parent, name, priority, now, stack, baton);
        let _guard = self.disable_interrupts();
        self.lock().threads.insert(thread);
        Ok(pid)
    }

    /// Make `next` the running thread
    fn activate(&self, state: &mut KernelState, next: Pid, now: u64) -> SchedulerResult<()> {
        state.scheduler.set_current(next);
        let thread = state.threads.expect_mut(next)?;
        thread.set_state(ThreadState::Running)?;
        thread.begin_burst(now);
        state
            .stats
            .record_dispatch(next, self.inner.config.trace_dispatches);
        Ok(())
    }

    /// Transfer the CPU to `next`.
    ///
    /// Returns once the calling thread is dispatched again. A thread told to
    /// terminate while parked unwinds out of the simulation instead.
    pub(crate) fn dispatch(&self, next: Pid) {
        self.assert_atomic("dispatch");
        let now = self.now();
        let transfer = {
            let mut state = self.lock();
            let old = state.scheduler.current().unwrap_or_else(|| {
                fatal(SchedulerError::InternalError {
                    reason: "dispatch without a running thread",
                })
            });
            let outgoing = state.threads.expect_mut(old).or_fatal();
            outgoing.save_user_state();
            outgoing.check_overflow().or_fatal();
            let from = outgoing.baton().clone();

            self.activate(&mut state, next, now).or_fatal();
            log::debug!("[SCHED] Switch: {} -> {} at tick {}", old, next, now);
            if old == next {
                None
            } else {
                let to = state.threads.expect(next).or_fatal().baton().clone();
                Some((from, to))
            }
        };

        if let Some((from, to)) = transfer {
            if switch::transfer(&from, &to) == Token::Terminate {
                panic::resume_unwind(Box::new(ThreadExit));
            }
        }
        self.schedule_tail();
    }

    /// First thing a thread does after gaining the CPU: destroy the thread
    /// that exited on the way here and restore the attached image.
    pub(crate) fn schedule_tail(&self) {
        let destroyed = {
            let mut state = self.lock();
            let destroyed = state
                .scheduler
                .take_to_be_destroyed()
                .or_fatal()
                .and_then(|pid| state.threads.remove(pid));
            if let Some(current) = state.scheduler.current() {
                if let Some(thread) = state.threads.get_mut(current) {
                    thread.restore_user_state();
                }
            }
            destroyed
        };
        if let Some(thread) = destroyed {
            let pid = thread.pid();
            thread.baton().pass(Token::Terminate);
            self.reap(pid);
            log::debug!("[SCHED] Destroyed pid {}", pid);
        }
    }

    /// Join the backing host thread of a destroyed thread
    fn reap(&self, pid: Pid) {
        let handle = self.inner.os_threads.lock().remove(&pid);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("[SCHED] Host thread of pid {} ended abnormally", pid);
            }
        }
    }

    /// Backing host threads still alive or not yet reaped
    pub fn host_thread_count(&self) -> usize {
        self.inner.os_threads.lock().len()
    }

    /// Stop the simulation: release every parked thread and wake the host
    pub(crate) fn shutdown(&self, reason: HaltReason) {
        let mut first = false;
        self.inner.halt.call_once(|| {
            first = true;
            reason
        });
        if first {
            match reason {
                HaltReason::Fatal(err) => log::error!("[KERNEL] Halting: {}", err),
                _ => log::info!("[KERNEL] Halting: {}", reason),
            }
            let me = Self::host_pid();
            let batons: Vec<Arc<Baton>> = self
                .lock()
                .threads
                .iter()
                .filter(|thread| Some(thread.pid()) != me)
                .map(|thread| thread.baton().clone())
                .collect();
            for baton in batons {
                baton.pass(Token::Terminate);
            }
        }
        if let Some(host) = self.inner.host.get() {
            host.unpark();
        }
    }

    /// Halt the simulation from the running thread
    pub(crate) fn halt(&self, reason: HaltReason) -> ! {
        self.shutdown(reason);
        panic::resume_unwind(Box::new(ThreadExit))
    }
}

/// Entry of every backing host thread: wait for the first dispatch, run the
/// body, then finish. Unwinds out of the body end here.
fn trampoline(kernel: Kernel, pid: Pid, baton: Arc<Baton>, body: ThreadBody) {
    if baton.wait() == Token::Terminate {
        return;
    }
    CURRENT.with(|current| current.set(Some(pid)));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        kernel.schedule_tail();
        kernel.set_interrupt_level(IntLevel::On);
        body();
        kernel.finish()
    }));

    if let Err(payload) = result {
        if payload.is::<ThreadExit>() {
            return;
        }
        let err = match payload.downcast::<SchedulerError>() {
            Ok(err) => *err,
            Err(_) => SchedulerError::ThreadPanicked { pid },
        };
        kernel.shutdown(HaltReason::Fatal(err));
    }
}
