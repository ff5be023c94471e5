//! Deadline-ordered ledger behind `Scheduler::later`.
//!
//! All pending deadlines share one host timeout, armed for the earliest
//! entry. The ledger itself only keeps order; the scheduler owns the host
//! timer calls.

use std::time::Duration;

use crate::platform::HostTimer;
use crate::task::Action;

/// Handle returned by `Scheduler::later`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct TimerEntry {
    deadline: Duration,
    handle: TimerHandle,
    action: Action,
}

#[derive(Default)]
pub(crate) struct TimerLedger {
    entries: Vec<TimerEntry>,
    next_id: u64,
    host: Option<HostTimer>,
}

impl TimerLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert after every entry with an equal or earlier deadline. Returns
    /// the handle and whether the entry became the earliest.
    pub(crate) fn insert(&mut self, deadline: Duration, action: Action) -> (TimerHandle, bool) {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let index = self.entries.partition_point(|entry| entry.deadline <= deadline);
        self.entries.insert(
            index,
            TimerEntry {
                deadline,
                handle,
                action,
            },
        );
        (handle, index == 0)
    }

    /// Remove an entry. `Some(true)` means it was the earliest.
    pub(crate) fn remove(&mut self, handle: TimerHandle) -> Option<bool> {
        let index = self.entries.iter().position(|entry| entry.handle == handle)?;
        self.entries.remove(index);
        Some(index == 0)
    }

    /// Detach every entry due at `now`, earliest first.
    pub(crate) fn take_expired(&mut self, now: Duration) -> Vec<Action> {
        let due = self.entries.partition_point(|entry| entry.deadline <= now);
        self.entries.drain(..due).map(|entry| entry.action).collect()
    }

    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.entries.first().map(|entry| entry.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn take_host(&mut self) -> Option<HostTimer> {
        self.host.take()
    }

    pub(crate) fn set_host(&mut self, timer: HostTimer) {
        self.host = Some(timer);
    }
}
