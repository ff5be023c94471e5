use std::cell::{Cell, RefCell};
use std::time::Duration;

use super::{HostCallback, HostTimer, Platform};

struct Pending {
    due: Duration,
    timer: HostTimer,
    callback: HostCallback,
}

/// A virtual clock driven by hand.
///
/// Nothing fires until [`advance`](Self::advance) is called. Due callbacks
/// run in deadline order, ties in the order they were armed, and the clock
/// reads each callback's deadline while it runs.
#[derive(Default)]
pub struct ManualPlatform {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    pending: RefCell<Vec<Pending>>,
}

impl ManualPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`, firing everything that comes due,
    /// including callbacks armed by callbacks along the way.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        while let Some(next) = self.take_due(target) {
            if next.due > self.now.get() {
                self.now.set(next.due);
            }
            (next.callback)();
        }
        self.now.set(target);
    }

    /// Fire callbacks that are already due without moving the clock.
    pub fn run_due(&self) {
        self.advance(Duration::ZERO);
    }

    /// Number of armed callbacks.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn take_due(&self, target: Duration) -> Option<Pending> {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= target)
            .min_by_key(|(_, p)| (p.due, p.timer.id()))
            .map(|(index, _)| index)?;
        Some(pending.remove(index))
    }
}

impl Platform for ManualPlatform {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn set_timeout(&self, callback: HostCallback, wait: Duration) -> HostTimer {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let timer = HostTimer::new(id);
        self.pending.borrow_mut().push(Pending {
            due: self.now.get() + wait,
            timer,
            callback,
        });
        timer
    }

    fn clear_timeout(&self, timer: HostTimer) {
        self.pending.borrow_mut().retain(|p| p.timer != timer);
    }
}
