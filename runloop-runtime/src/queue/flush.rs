use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use super::{Batch, Queue, Task};
use crate::error::{TaskError, TaskResult};

/// Whether a flush returns after one popped batch or keeps popping until the
/// queue is observed empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Drain,
    SingleBatch,
}

/// Outcome of one [`Flush::next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Done,
}

enum FlushState {
    Initial,
    Flushing(MicroTask),
    Done,
    Return,
}

/// Resumable flush of one queue.
///
/// ```text
/// Initial --tasks--> Flushing --batch done--> Done --Drain--> Initial
///    |                                          |
///    +--empty--> Return <------SingleBatch------+
/// ```
///
/// `before`/`after` queue hooks run once per flush, not once per batch.
pub struct Flush {
    queue: Rc<Queue>,
    mode: FlushMode,
    state: FlushState,
    announced: bool,
}

impl Flush {
    pub fn new(queue: Rc<Queue>, mode: FlushMode) -> Self {
        Self {
            queue,
            mode,
            state: FlushState::Initial,
            announced: false,
        }
    }

    /// Advance by one state transition or one task.
    pub fn next(&mut self) -> Result<Step, TaskError> {
        match std::mem::replace(&mut self.state, FlushState::Return) {
            FlushState::Initial => {
                if !self.announced {
                    self.announced = true;
                    if let Some(before) = self.queue.env().options_for(self.queue.name()).before {
                        before();
                    }
                }
                self.state = if self.queue.has_tasks() {
                    let tasks = self.queue.pop_tasks();
                    trace!(queue = %self.queue.name(), size = tasks.len(), "flushing batch");
                    FlushState::Flushing(MicroTask::new(Rc::clone(&self.queue), tasks))
                } else {
                    FlushState::Return
                };
                Ok(Step::Next)
            }
            FlushState::Flushing(mut micro_task) => {
                // On error the micro task is dropped and the flush ends in
                // `Return`; the rest of the batch is abandoned.
                if micro_task.next()? == Step::Done {
                    self.state = FlushState::Done;
                } else {
                    self.state = FlushState::Flushing(micro_task);
                }
                Ok(Step::Next)
            }
            FlushState::Done => {
                self.state = match self.mode {
                    FlushMode::Drain => FlushState::Initial,
                    FlushMode::SingleBatch => FlushState::Return,
                };
                Ok(Step::Next)
            }
            FlushState::Return => {
                if self.announced {
                    self.announced = false;
                    if let Some(after) = self.queue.env().options_for(self.queue.name()).after {
                        after();
                    }
                }
                self.state = FlushState::Initial;
                Ok(Step::Done)
            }
        }
    }

    /// Drive to completion.
    pub fn flush(&mut self) -> TaskResult {
        while self.next()? != Step::Done {}
        Ok(())
    }
}

/// Runs one popped batch, one record per step.
struct MicroTask {
    queue: Rc<Queue>,
    batch: Rc<Batch>,
    previous: Option<Rc<Batch>>,
}

impl MicroTask {
    fn new(queue: Rc<Queue>, tasks: Vec<Task>) -> Self {
        let batch = Rc::new(Batch {
            tasks: RefCell::new(tasks),
            cursor: Cell::new(0),
        });
        let previous = queue.begin_batch(Rc::clone(&batch));
        Self {
            queue,
            batch,
            previous,
        }
    }

    fn next(&mut self) -> Result<Step, TaskError> {
        let position = self.batch.cursor.get();
        let task = match self.batch.tasks.borrow().get(position) {
            Some(task) => task.clone(),
            None => return Ok(Step::Done),
        };
        self.batch.cursor.set(position + 1);

        // A `None` method was cancelled after the batch was popped.
        if let Some(method) = &task.method {
            self.queue.env().on_error.invoke(
                task.target.as_ref(),
                method,
                &task.args,
                task.stack.as_ref(),
            )?;
        }
        Ok(Step::Next)
    }
}

impl Drop for MicroTask {
    fn drop(&mut self) {
        self.queue.end_batch(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, FnHandler, QueueOptions};
    use crate::queue::tests::test_env;
    use crate::task::{Action, Method};

    fn logger() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Action) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &str| {
            let sink = sink.clone();
            let label = label.to_string();
            Action::func(move |_| {
                sink.borrow_mut().push(label.clone());
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_flush_runs_in_order() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        let (log, make) = logger();
        queue.push(make("a"), None);
        queue.push(make("b"), None);
        queue.flush(FlushMode::Drain).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_picks_up_tasks_scheduled_during_flush() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        let (log, make) = logger();
        let inner = Rc::downgrade(&queue);
        let follow_up = make("follow-up");
        let sink = log.clone();
        queue.push(
            Action::func(move |_| {
                sink.borrow_mut().push("first".to_string());
                if let Some(queue) = inner.upgrade() {
                    queue.push(follow_up.clone(), None);
                }
                Ok(())
            }),
            None,
        );

        queue.flush(FlushMode::Drain).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "follow-up"]);
    }

    #[test]
    fn test_single_batch_leaves_new_work_queued() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        let inner = Rc::downgrade(&queue);
        queue.push(
            Action::func(move |_| {
                if let Some(queue) = inner.upgrade() {
                    queue.push(Action::func(|_| Ok(())), None);
                }
                Ok(())
            }),
            None,
        );

        queue.flush(FlushMode::SingleBatch).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_in_flight_cancel_skips_task() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        let (log, make) = logger();
        let doomed = make("doomed");
        let cancel_me = Rc::new(RefCell::new(None));
        let slot = cancel_me.clone();
        queue.push(
            Action::func(move |_| {
                if let Some(handle) = slot.borrow().as_ref() {
                    assert!(crate::queue::TaskHandle::cancel(handle));
                }
                Ok(())
            }),
            None,
        );
        *cancel_me.borrow_mut() = Some(queue.push(doomed, None));
        queue.push(make("survivor"), None);

        queue.flush(FlushMode::Drain).unwrap();
        assert_eq!(*log.borrow(), vec!["survivor"]);
    }

    #[test]
    fn test_next_steps_one_task_at_a_time() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        let (log, make) = logger();
        queue.push(make("a"), None);
        queue.push(make("b"), None);

        let mut flush = Flush::new(queue.clone(), FlushMode::Drain);
        assert_eq!(flush.next().unwrap(), Step::Next); // pop
        assert_eq!(flush.next().unwrap(), Step::Next); // a
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(flush.next().unwrap(), Step::Next); // b
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        flush.flush().unwrap();
        assert_eq!(flush.next().unwrap(), Step::Next);
    }

    #[test]
    fn test_error_propagates_without_handler() {
        let queue = Rc::new(Queue::new("actions", test_env(None)));
        queue.push(Action::new(Method::func(|_| Err("boom".into()))), None);
        let err = queue.flush(FlushMode::Drain).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_handler_keeps_flushing_and_hooks_run_once() {
        let (log, make) = logger();
        let errors = Rc::new(Cell::new(0));
        let counter = errors.clone();
        let hook_log = log.clone();
        let after_log = log.clone();
        let mut queue_options = std::collections::HashMap::new();
        queue_options.insert(
            "actions".to_string(),
            QueueOptions::new()
                .before(move || hook_log.borrow_mut().push("before".to_string()))
                .after(move || after_log.borrow_mut().push("after".to_string())),
        );
        let base = test_env(None);
        let env = Rc::new(Environment {
            on_error: Rc::new(FnHandler::new(move |_, _| counter.set(counter.get() + 1))),
            default_queue: base.default_queue.clone(),
            platform: base.platform.clone(),
            on_begin: None,
            on_end: None,
            identity: None,
            queue_options,
            debug: false,
        });
        let queue = Rc::new(Queue::new("actions", env));
        queue.push(Action::func(|_| Err("boom".into())), None);
        queue.push(make("after-error"), None);

        queue.flush(FlushMode::Drain).unwrap();
        assert_eq!(errors.get(), 1);
        assert_eq!(*log.borrow(), vec!["before", "after-error", "after"]);
    }
}
