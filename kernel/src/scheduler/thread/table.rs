//! Thread table - arena of live TCBs indexed by pid
//!
//! Parent/child links are pids into this table, never ownership. A TCB leaves
//! the table only when the scheduler destroys it after its final transfer.

use hashbrown::{HashMap, HashSet};

use super::thread::{Pid, Thread};
use crate::scheduler::core::error::{SchedulerError, SchedulerResult};

pub struct ThreadTable {
    threads: HashMap<Pid, Thread>,
    exited: HashSet<Pid>,
    next_pid: Pid,
    capacity: usize,
}

impl ThreadTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            threads: HashMap::new(),
            exited: HashSet::new(),
            next_pid: 0,
            capacity,
        }
    }

    /// Reserve the next pid; fails once `capacity` TCBs are live
    pub fn allocate_pid(&mut self) -> SchedulerResult<Pid> {
        let live = self.live_count();
        if live >= self.capacity {
            return Err(SchedulerError::ThreadLimitReached {
                current: live,
                max: self.capacity,
            });
        }
        let pid = self.next_pid;
        self.next_pid += 1;
        Ok(pid)
    }

    pub fn insert(&mut self, thread: Thread) {
        self.threads.insert(thread.pid(), thread);
    }

    pub fn get(&self, pid: Pid) -> Option<&Thread> {
        self.threads.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Thread> {
        self.threads.get_mut(&pid)
    }

    /// Look up a TCB that must exist
    pub fn expect(&self, pid: Pid) -> SchedulerResult<&Thread> {
        self.threads.get(&pid).ok_or(SchedulerError::ThreadNotFound { pid })
    }

    pub fn expect_mut(&mut self, pid: Pid) -> SchedulerResult<&mut Thread> {
        self.threads
            .get_mut(&pid)
            .ok_or(SchedulerError::ThreadNotFound { pid })
    }

    /// Drop the TCB of `pid`. Its exited mark goes with it: a destroyed
    /// parent is already invisible to [`get_mut`](Self::get_mut).
    pub fn remove(&mut self, pid: Pid) -> Option<Thread> {
        self.exited.remove(&pid);
        self.threads.remove(&pid)
    }

    /// Record that `pid` ran its exit path
    pub fn mark_exited(&mut self, pid: Pid) {
        self.exited.insert(pid);
    }

    pub fn has_exited(&self, pid: Pid) -> bool {
        self.exited.contains(&pid)
    }

    /// TCBs still in the table that have not exited
    pub fn live_count(&self) -> usize {
        self.threads
            .keys()
            .filter(|pid| !self.exited.contains(*pid))
            .count()
    }

    /// Pids of all threads that have not exited, in ascending order
    pub fn live_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self
            .threads
            .keys()
            .copied()
            .filter(|pid| !self.exited.contains(pid))
            .collect();
        pids.sort_unstable();
        pids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Apply `f` to every thread that has not exited
    pub fn for_each_live_mut<F: FnMut(&mut Thread)>(&mut self, mut f: F) {
        let exited = &self.exited;
        self.threads
            .values_mut()
            .filter(|thread| !exited.contains(&thread.pid()))
            .for_each(|thread| f(thread));
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
