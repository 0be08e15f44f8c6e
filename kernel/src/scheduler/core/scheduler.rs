//! Scheduler - queue ownership and next-thread selection
//!
//! Owns the ready queue, the sleeping set and the time-sorted wait queue, the
//! running pid and the pid pending destruction. Every method here mutates
//! scheduler state and must be reached from inside an atomic region; the
//! kernel asserts that before delegating.

use alloc::vec::Vec;

use super::error::{SchedulerError, SchedulerResult};
use super::policy::{SchedulingPolicy, SelectionOrder};
use super::queues::{ReadyQueue, SleepingSet, TimeSortedWaitQueue, WaitQueueEntry};
use crate::scheduler::thread::{Pid, ThreadState, ThreadTable};

pub struct Scheduler {
    policy: SchedulingPolicy,
    ready: ReadyQueue,
    sleeping: SleepingSet,
    waiting: TimeSortedWaitQueue,
    current: Option<Pid>,
    to_be_destroyed: Option<Pid>,
}

impl Scheduler {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self {
            policy,
            ready: ReadyQueue::new(),
            sleeping: SleepingSet::new(),
            waiting: TimeSortedWaitQueue::new(),
            current: None,
            to_be_destroyed: None,
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Running thread
    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn set_current(&mut self, pid: Pid) {
        self.current = Some(pid);
    }

    /// Is `pid` in any of the three queues?
    pub fn is_queued(&self, pid: Pid) -> bool {
        self.ready.contains(pid) || self.sleeping.contains(pid) || self.waiting.contains(pid)
    }

    /// Make `pid` Ready and append it to the tail of the ready queue.
    ///
    /// A thread leaving `Blocked` is credited the time it slept.
    pub fn mark_ready(&mut self, threads: &mut ThreadTable, pid: Pid, now: u64) -> SchedulerResult<()> {
        if self.is_queued(pid) {
            return Err(SchedulerError::QueueCorrupted {
                pid,
                reason: "made ready while queued",
            });
        }
        let thread = threads.expect_mut(pid)?;
        if thread.state() == ThreadState::Blocked {
            thread.end_sleep(now);
        }
        thread.set_state(ThreadState::Ready)?;
        self.ready.push_back(pid);

        log::debug!("[SCHED] Ready: pid {}", pid);
        Ok(())
    }

    /// Remove the next thread to run according to the active policy
    pub fn select_next(&mut self, threads: &ThreadTable) -> Option<Pid> {
        match self.policy.selection_order() {
            SelectionOrder::Fifo => self.ready.pop_front(),
            SelectionOrder::MinKey => {
                let policy = self.policy;
                self.ready.remove_first_min_by(|pid| {
                    threads
                        .get(pid)
                        .map_or(f64::INFINITY, |thread| policy.selection_key(thread))
                })
            }
        }
    }

    /// Add to the sleeping set
    pub fn insert_sleeping(&mut self, pid: Pid) -> SchedulerResult<()> {
        if self.is_queued(pid) {
            return Err(SchedulerError::QueueCorrupted {
                pid,
                reason: "put to sleep while queued",
            });
        }
        self.sleeping.insert(pid);
        Ok(())
    }

    /// Remove from the sleeping set; `None` if it is not a member
    pub fn remove_sleeping(&mut self, pid: Pid) -> Option<Pid> {
        self.sleeping.remove(pid)
    }

    pub fn is_sleeping_set_empty(&self) -> bool {
        self.sleeping.is_empty()
    }

    /// Queue `pid` until `deadline`, after any entries with the same deadline
    pub fn sorted_insert(&mut self, pid: Pid, deadline: u64) -> SchedulerResult<()> {
        if self.is_queued(pid) {
            return Err(SchedulerError::QueueCorrupted {
                pid,
                reason: "timed wait while queued",
            });
        }
        self.waiting.insert(pid, deadline);
        Ok(())
    }

    /// Dequeue every timed waiter whose deadline has passed
    pub fn pop_expired(&mut self, now: u64) -> Vec<WaitQueueEntry> {
        self.waiting.pop_expired(now)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.waiting.next_deadline()
    }

    /// Defer destruction of `pid` until after the next transfer
    pub fn set_to_be_destroyed(&mut self, pid: Pid) -> SchedulerResult<()> {
        if let Some(pending) = self.to_be_destroyed {
            return Err(SchedulerError::QueueCorrupted {
                pid: pending,
                reason: "destruction still pending",
            });
        }
        self.to_be_destroyed = Some(pid);
        Ok(())
    }

    /// Hand out the pid pending destruction, unless it is still running
    pub fn take_to_be_destroyed(&mut self) -> SchedulerResult<Option<Pid>> {
        match self.to_be_destroyed {
            Some(pid) if self.current == Some(pid) => Err(SchedulerError::DestroyCurrent { pid }),
            _ => Ok(self.to_be_destroyed.take()),
        }
    }

    /// Dump the ready queue
    pub fn print(&self, threads: &ThreadTable) {
        log::info!("[SCHED] Ready list ({}):", self.policy);
        for line in self.ready_listing(threads) {
            log::info!("  {}", line);
        }
    }

    /// One line per ready thread, in queue order
    fn ready_listing(&self, threads: &ThreadTable) -> Vec<String> {
        self.ready
            .iter()
            .map(|pid| match threads.get(pid) {
                Some(thread) => format!("{}", thread),
                None => format!("[pid {}] <missing>", pid),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::switch::Baton;
    use crate::scheduler::thread::Thread;
    use alloc::sync::Arc;

    fn table_with(count: usize) -> ThreadTable {
        let mut table = ThreadTable::new(16);
        for _ in 0..count {
            let pid = table.allocate_pid().unwrap();
            table.insert(Thread::new(pid, None, "t", 50, 0, None, Arc::new(Baton::new())));
        }
        table
    }

    #[test]
    fn test_fcfs_preserves_insertion_order() {
        let mut threads = table_with(3);
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        for pid in [2, 0, 1] {
            sched.mark_ready(&mut threads, pid, 0).unwrap();
        }
        assert_eq!(sched.select_next(&threads), Some(2));
        assert_eq!(sched.select_next(&threads), Some(0));
        assert_eq!(sched.select_next(&threads), Some(1));
        assert_eq!(sched.select_next(&threads), None);
    }

    #[test]
    fn test_ready_listing_follows_queue_order() {
        let mut threads = table_with(3);
        let mut sched = Scheduler::new(SchedulingPolicy::StaticPriority);
        for pid in [1, 2] {
            sched.mark_ready(&mut threads, pid, 0).unwrap();
        }
        threads.remove(2);

        let listing = sched.ready_listing(&threads);
        assert_eq!(listing.len(), 2);
        assert!(listing[0].starts_with("[pid 1] t state=Ready"));
        assert_eq!(listing[1], "[pid 2] <missing>");
        // listing leaves the queue alone
        assert!(sched.is_queued(1) && sched.is_queued(2));
        sched.print(&threads);
    }

    #[test]
    fn test_double_ready_is_corruption() {
        let mut threads = table_with(1);
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        sched.mark_ready(&mut threads, 0, 0).unwrap();
        assert!(matches!(
            sched.mark_ready(&mut threads, 0, 0),
            Err(SchedulerError::QueueCorrupted { pid: 0, .. })
        ));
    }

    #[test]
    fn test_blocked_thread_credited_sleep_time() {
        let mut threads = table_with(1);
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        sched.mark_ready(&mut threads, 0, 0).unwrap();
        sched.select_next(&threads);

        let thread = threads.get_mut(0).unwrap();
        thread.set_state(ThreadState::Running).unwrap();
        thread.begin_sleep(10);
        thread.set_state(ThreadState::Blocked).unwrap();
        sched.insert_sleeping(0).unwrap();

        assert_eq!(sched.remove_sleeping(0), Some(0));
        sched.mark_ready(&mut threads, 0, 35).unwrap();
        assert_eq!(threads.get(0).unwrap().stats().sleep_time, 25);
    }

    #[test]
    fn test_static_priority_ties_go_to_first_enqueued() {
        let mut threads = ThreadTable::new(8);
        for priority in [9, 3, 7, 3] {
            let pid = threads.allocate_pid().unwrap();
            threads.insert(Thread::new(pid, None, "t", priority, 0, None, Arc::new(Baton::new())));
        }
        let mut sched = Scheduler::new(SchedulingPolicy::StaticPriority);
        for pid in 0..4 {
            sched.mark_ready(&mut threads, pid, 0).unwrap();
        }
        assert_eq!(sched.select_next(&threads), Some(1));
        assert_eq!(sched.select_next(&threads), Some(3));
        assert_eq!(sched.select_next(&threads), Some(2));
        assert_eq!(sched.select_next(&threads), Some(0));
    }

    #[test]
    fn test_remove_sleeping_absent_is_not_found() {
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        assert_eq!(sched.remove_sleeping(4), None);
        assert!(sched.is_sleeping_set_empty());

        sched.insert_sleeping(1).unwrap();
        assert_eq!(sched.remove_sleeping(4), None);
        assert!(!sched.is_sleeping_set_empty());
    }

    #[test]
    fn test_sleeping_thread_cannot_wait_on_timer() {
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        sched.insert_sleeping(1).unwrap();
        assert!(sched.sorted_insert(1, 10).is_err());
        sched.sorted_insert(2, 10).unwrap();
        assert_eq!(sched.next_deadline(), Some(10));
        assert_eq!(sched.pop_expired(10).len(), 1);
    }

    #[test]
    fn test_running_thread_never_destroyed() {
        let mut sched = Scheduler::new(SchedulingPolicy::Fcfs);
        sched.set_current(3);
        sched.set_to_be_destroyed(3).unwrap();
        assert_eq!(
            sched.take_to_be_destroyed(),
            Err(SchedulerError::DestroyCurrent { pid: 3 })
        );
        sched.set_current(4);
        assert_eq!(sched.take_to_be_destroyed(), Ok(Some(3)));
        assert_eq!(sched.take_to_be_destroyed(), Ok(None));
    }
}
