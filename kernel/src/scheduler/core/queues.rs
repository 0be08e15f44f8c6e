//! Scheduler queues
//!
//! - [`ReadyQueue`]: FIFO substrate; policies order the *selection*, never
//!   the insertion.
//! - [`SleepingSet`]: unordered membership of threads blocked on a
//!   synchronization event.
//! - [`TimeSortedWaitQueue`]: threads blocked until a deadline, ascending and
//!   stable on equal deadlines.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::scheduler::thread::Pid;

/// Ready queue
#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: VecDeque<Pid>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail
    pub fn push_back(&mut self, pid: Pid) {
        self.queue.push_back(pid);
    }

    pub fn pop_front(&mut self) -> Option<Pid> {
        self.queue.pop_front()
    }

    /// Remove the first entry whose key is minimal.
    ///
    /// Equal keys keep their insertion order, so the earliest enqueued wins.
    pub fn remove_first_min_by<K, F>(&mut self, mut key: F) -> Option<Pid>
    where
        K: PartialOrd,
        F: FnMut(Pid) -> K,
    {
        let mut best: Option<(usize, K)> = None;
        for (index, &pid) in self.queue.iter().enumerate() {
            let k = key(pid);
            match &best {
                Some((_, current)) if !(k < *current) => {}
                _ => best = Some((index, k)),
            }
        }
        let (index, _) = best?;
        self.queue.remove(index)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.queue.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.queue.iter().copied()
    }
}

/// Sleeping set
#[derive(Debug, Default)]
pub struct SleepingSet {
    members: HashSet<Pid>,
}

impl SleepingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the thread was already a member
    pub fn insert(&mut self, pid: Pid) -> bool {
        self.members.insert(pid)
    }

    /// Keyed removal; `None` when `pid` is not a member
    pub fn remove(&mut self, pid: Pid) -> Option<Pid> {
        self.members.take(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.members.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Time-sorted wait queue node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitQueueEntry {
    pub pid: Pid,
    pub deadline: u64,
}

/// Time-sorted wait queue
#[derive(Debug, Default)]
pub struct TimeSortedWaitQueue {
    entries: VecDeque<WaitQueueEntry>,
}

impl TimeSortedWaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every entry with a deadline `<= deadline`
    pub fn insert(&mut self, pid: Pid, deadline: u64) {
        let index = self.entries.partition_point(|entry| entry.deadline <= deadline);
        self.entries.insert(index, WaitQueueEntry { pid, deadline });
    }

    /// Dequeue every entry whose deadline has elapsed, head first
    pub fn pop_expired(&mut self, now: u64) -> Vec<WaitQueueEntry> {
        let count = self.entries.partition_point(|entry| entry.deadline <= now);
        self.entries.drain(..count).collect()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.deadline)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.iter().any(|entry| entry.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitQueueEntry> {
        self.entries.iter()
    }
}
