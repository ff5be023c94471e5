//! One named lane of deferred work.

mod flush;

pub use flush::{Flush, FlushMode, Step};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::environment::Environment;
use crate::error::TaskResult;
use crate::identity::Guid;
use crate::task::{same_target, Action, Args, DebugStack, Method, TargetRef};

/// One queued record. `method` is `None` once cancelled mid-flush.
#[derive(Clone)]
pub(crate) struct Task {
    pub(crate) id: u64,
    pub(crate) target: Option<TargetRef>,
    pub(crate) method: Option<Method>,
    pub(crate) args: Args,
    pub(crate) stack: Option<DebugStack>,
}

impl Task {
    fn matches(&self, target: Option<&TargetRef>, method: &Method) -> bool {
        self.method.as_ref().is_some_and(|m| m.same(method))
            && same_target(self.target.as_ref(), target)
    }
}

/// A popped snapshot being flushed. `cursor` is the next record to run.
pub(crate) struct Batch {
    pub(crate) tasks: RefCell<Vec<Task>>,
    pub(crate) cursor: Cell<usize>,
}

/// Handle to a queued task, accepted by `Scheduler::cancel`.
#[derive(Clone)]
pub struct TaskHandle {
    queue: Weak<Queue>,
    id: u64,
    target: Option<TargetRef>,
    method: Method,
}

impl TaskHandle {
    /// Name of the queue the task went into, if that queue still exists.
    pub fn queue_name(&self) -> Option<String> {
        self.queue.upgrade().map(|queue| queue.name.clone())
    }

    pub(crate) fn cancel(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|queue| queue.cancel(self))
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("queue", &self.queue_name())
            .field("id", &self.id)
            .field("has_target", &self.target.is_some())
            .field("method", &self.method)
            .finish()
    }
}

pub struct Queue {
    name: String,
    env: Rc<Environment>,
    tasks: RefCell<Vec<Task>>,
    /// guid -> [(method, position in `tasks`)], only for `push_unique`.
    target_queues: RefCell<HashMap<Guid, Vec<(Method, usize)>>>,
    being_flushed: RefCell<Option<Rc<Batch>>>,
    next_id: Cell<u64>,
}

impl Queue {
    pub(crate) fn new(name: &str, env: Rc<Environment>) -> Self {
        Self {
            name: name.to_string(),
            env,
            tasks: RefCell::new(Vec::new()),
            target_queues: RefCell::new(HashMap::new()),
            being_flushed: RefCell::new(None),
            next_id: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Number of records waiting for the next flush.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_tasks()
    }

    fn handle(self: &Rc<Self>, id: u64, target: Option<TargetRef>, method: Method) -> TaskHandle {
        TaskHandle {
            queue: Rc::downgrade(self),
            id,
            target,
            method,
        }
    }

    fn next_task_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn new_task(&self, action: Action, stack: Option<DebugStack>) -> Task {
        Task {
            id: self.next_task_id(),
            target: action.target,
            method: Some(action.method),
            args: action.args,
            stack,
        }
    }

    /// Append unconditionally.
    pub(crate) fn push(self: &Rc<Self>, action: Action, stack: Option<DebugStack>) -> TaskHandle {
        let (target, method) = (action.target.clone(), action.method.clone());
        let task = self.new_task(action, stack);
        let handle = self.handle(task.id, target, method);
        self.tasks.borrow_mut().push(task);
        handle
    }

    /// Append unless a record with the same `(target, method)` is queued, in
    /// which case that record takes the new args and keeps its position.
    pub(crate) fn push_unique(
        self: &Rc<Self>,
        action: Action,
        stack: Option<DebugStack>,
    ) -> TaskHandle {
        let (target, method) = (action.target.clone(), action.method.clone());
        let guid = match (&self.env.identity, &action.target) {
            (Some(identity), Some(target)) => identity.guid_for(target),
            _ => None,
        };
        let id = match guid {
            Some(guid) => self.push_unique_with_guid(guid, action, stack),
            None => self.push_unique_without_guid(action, stack),
        };
        self.handle(id, target, method)
    }

    /// Returns the id of the record that now holds the action.
    fn push_unique_without_guid(&self, action: Action, stack: Option<DebugStack>) -> u64 {
        let mut tasks = self.tasks.borrow_mut();
        let existing = tasks
            .iter_mut()
            .find(|task| task.matches(action.target.as_ref(), &action.method));
        match existing {
            Some(task) => {
                task.args = action.args;
                task.stack = stack;
                task.id
            }
            None => {
                let task = self.new_task(action, stack);
                let id = task.id;
                tasks.push(task);
                id
            }
        }
    }

    fn push_unique_with_guid(&self, guid: Guid, action: Action, stack: Option<DebugStack>) -> u64 {
        let mut tasks = self.tasks.borrow_mut();
        let mut target_queues = self.target_queues.borrow_mut();
        let index = target_queues.entry(guid).or_default();

        if let Some(&(_, position)) = index.iter().find(|(m, _)| m.same(&action.method)) {
            let task = &mut tasks[position];
            task.args = action.args;
            task.stack = stack;
            return task.id;
        }

        index.push((action.method.clone(), tasks.len()));
        let task = self.new_task(action, stack);
        let id = task.id;
        tasks.push(task);
        id
    }

    /// Detach everything queued so far. Work scheduled from here on lands in
    /// a fresh store.
    pub(crate) fn pop_tasks(&self) -> Vec<Task> {
        self.target_queues.borrow_mut().clear();
        std::mem::take(&mut *self.tasks.borrow_mut())
    }

    /// Remove the handle's pending record, or null it while it waits in the
    /// batch currently being flushed.
    pub(crate) fn cancel(&self, handle: &TaskHandle) -> bool {
        let removed = {
            let mut tasks = self.tasks.borrow_mut();
            let found = tasks.iter().position(|task| task.id == handle.id);
            found.map(|position| {
                tasks.remove(position);
                position
            })
        };

        if let Some(position) = removed {
            let mut target_queues = self.target_queues.borrow_mut();
            for index in target_queues.values_mut() {
                index.retain(|(_, p)| *p != position);
                for (_, p) in index.iter_mut() {
                    if *p > position {
                        *p -= 1;
                    }
                }
            }
            target_queues.retain(|_, index| !index.is_empty());
            trace!(queue = %self.name, position, "cancelled pending task");
            return true;
        }

        let batch = self.being_flushed.borrow().clone();
        if let Some(batch) = batch {
            let start = batch.cursor.get();
            let mut tasks = batch.tasks.borrow_mut();
            if let Some(task) = tasks
                .iter_mut()
                .skip(start)
                .find(|task| task.id == handle.id && task.method.is_some())
            {
                task.method = None;
                trace!(queue = %self.name, "cancelled task in flight");
                return true;
            }
        }

        false
    }

    /// Flush this queue on its own. `Drain` keeps going until the queue is
    /// observed empty.
    pub fn flush(self: &Rc<Self>, mode: FlushMode) -> TaskResult {
        Flush::new(Rc::clone(self), mode).flush()
    }

    pub(crate) fn begin_batch(&self, batch: Rc<Batch>) -> Option<Rc<Batch>> {
        self.being_flushed.borrow_mut().replace(batch)
    }

    pub(crate) fn end_batch(&self, previous: Option<Rc<Batch>>) {
        *self.being_flushed.borrow_mut() = previous;
    }

    pub(crate) fn env(&self) -> &Environment {
        &self.env
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("pending", &self.len())
            .finish()
    }
}
