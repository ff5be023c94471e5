use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{TaskError, TaskResult};
use crate::events::Listener;
use crate::identity::IdentityMap;
use crate::platform::Platform;
use crate::task::{call, Args, DebugStack, Method, TargetRef};

/// The single boundary where scheduled work is invoked and its errors are
/// caught.
pub trait ErrorStrategy {
    /// Route an error raised by scheduled work. Returning `Err` propagates it
    /// to whoever is flushing.
    fn handle_error(&self, error: TaskError, stack: Option<&DebugStack>) -> TaskResult;

    fn invoke(
        &self,
        target: Option<&TargetRef>,
        method: &Method,
        args: &Args,
        stack: Option<&DebugStack>,
    ) -> TaskResult {
        call(target, method, args).or_else(|error| self.handle_error(error, stack))
    }
}

/// No handler configured: errors surface to the caller of `end`/`run`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Propagate;

impl ErrorStrategy for Propagate {
    fn handle_error(&self, error: TaskError, _stack: Option<&DebugStack>) -> TaskResult {
        Err(error)
    }
}

/// Hands every error to a closure and keeps flushing.
pub struct FnHandler {
    func: Box<dyn Fn(TaskError, Option<&DebugStack>)>,
}

impl FnHandler {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(TaskError, Option<&DebugStack>) + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl ErrorStrategy for FnHandler {
    fn handle_error(&self, error: TaskError, stack: Option<&DebugStack>) -> TaskResult {
        (self.func)(error, stack);
        Ok(())
    }
}

/// Hands every error to a named method on a target.
///
/// The method receives the error as argument 0 and, in debug mode, the
/// captured stack as argument 1.
pub struct TargetHandler {
    target: TargetRef,
    method: Cow<'static, str>,
}

impl TargetHandler {
    pub fn new(target: TargetRef, method: impl Into<Cow<'static, str>>) -> Self {
        Self {
            target,
            method: method.into(),
        }
    }
}

impl ErrorStrategy for TargetHandler {
    fn handle_error(&self, error: TaskError, stack: Option<&DebugStack>) -> TaskResult {
        let mut args = Args::new().with(error);
        if let Some(stack) = stack {
            args = args.with(Rc::clone(stack));
        }
        self.target.perform(&self.method, &args)
    }
}

/// Hooks run once around every flush of one queue.
#[derive(Clone, Default)]
pub struct QueueOptions {
    pub(crate) before: Option<Rc<dyn Fn()>>,
    pub(crate) after: Option<Rc<dyn Fn()>>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before<F: Fn() + 'static>(mut self, f: F) -> Self {
        self.before = Some(Rc::new(f));
        self
    }

    pub fn after<F: Fn() + 'static>(mut self, f: F) -> Self {
        self.after = Some(Rc::new(f));
        self
    }
}

/// Everything a scheduler and its queues share, fixed at build time.
pub(crate) struct Environment {
    pub(crate) on_error: Rc<dyn ErrorStrategy>,
    pub(crate) default_queue: String,
    pub(crate) platform: Rc<dyn Platform>,
    pub(crate) on_begin: Option<Listener>,
    pub(crate) on_end: Option<Listener>,
    pub(crate) identity: Option<Rc<dyn IdentityMap>>,
    pub(crate) queue_options: HashMap<String, QueueOptions>,
    pub(crate) debug: bool,
}

impl Environment {
    pub(crate) fn options_for(&self, queue: &str) -> QueueOptions {
        self.queue_options.get(queue).cloned().unwrap_or_default()
    }
}
