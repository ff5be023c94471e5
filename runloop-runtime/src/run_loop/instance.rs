use std::fmt;
use std::rc::Rc;

use crate::environment::Environment;
use crate::error::{Result, SchedulerError, TaskResult};
use crate::queue::{FlushMode, Queue, TaskHandle};
use crate::task::{Action, DebugStack};

/// One run-loop instance: a queue per configured name, flushed in name
/// order.
pub struct QueueSet {
    id: u64,
    queues: Vec<Rc<Queue>>,
}

impl QueueSet {
    pub(crate) fn new(id: u64, names: &[String], env: &Rc<Environment>) -> Self {
        let queues = names
            .iter()
            .map(|name| Rc::new(Queue::new(name, Rc::clone(env))))
            .collect();
        Self { id, queues }
    }

    /// Distinguishes instances in `begin`/`end` notifications.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue(&self, name: &str) -> Option<&Rc<Queue>> {
        self.queues.iter().find(|queue| queue.name() == name)
    }

    /// Records waiting across all queues.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(|queue| queue.len()).sum()
    }

    pub(crate) fn schedule(
        &self,
        name: &str,
        action: Action,
        once: bool,
        stack: Option<DebugStack>,
    ) -> Result<TaskHandle> {
        let queue = self
            .queue(name)
            .ok_or_else(|| SchedulerError::NoSuchQueue(name.to_string()))?;
        action.validate(name)?;

        Ok(if once {
            queue.push_unique(action, stack)
        } else {
            queue.push(action, stack)
        })
    }

    /// Flush one batch of the first non-empty queue, then start over from
    /// the first queue, until every queue is empty. Work scheduled into an
    /// earlier queue always runs before the next batch of a later one.
    pub(crate) fn flush(&self) -> TaskResult {
        let mut index = 0;
        while index < self.queues.len() {
            let queue = &self.queues[index];
            if queue.has_tasks() {
                queue.flush(FlushMode::SingleBatch)?;
                index = 0;
            } else {
                index += 1;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for QueueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSet")
            .field("id", &self.id)
            .field("queues", &self.queues)
            .finish()
    }
}
