use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{HostCallback, HostTimer, Platform};

/// Host timers backed by tokio.
///
/// Every armed callback is a `spawn_local` task that sleeps and then runs,
/// so the scheduler must be driven from inside a [`tokio::task::LocalSet`].
///
/// # Panics
///
/// `set_timeout` panics when called outside a `LocalSet`.
pub struct TokioPlatform {
    origin: Instant,
    next_id: Cell<u64>,
    tasks: Rc<RefCell<HashMap<u64, JoinHandle<()>>>>,
}

impl Default for TokioPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioPlatform {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            next_id: Cell::new(0),
            tasks: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Number of callbacks still waiting to fire.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl Platform for TokioPlatform {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn set_timeout(&self, callback: HostCallback, wait: Duration) -> HostTimer {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        let tasks = Rc::clone(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(wait).await;
            tasks.borrow_mut().remove(&id);
            callback();
        });
        self.tasks.borrow_mut().insert(id, handle);
        HostTimer::new(id)
    }

    fn clear_timeout(&self, timer: HostTimer) {
        if let Some(handle) = self.tasks.borrow_mut().remove(&timer.id()) {
            handle.abort();
        }
    }
}
