use std::any::Any;
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::error::{Result, SchedulerError, TaskResult};

/// Stack captured when a task was scheduled with debug mode on.
pub type DebugStack = Rc<Backtrace>;

pub(crate) fn capture_stack() -> DebugStack {
    Rc::new(Backtrace::force_capture())
}

/// Type-erased argument list handed to a method when it runs.
///
/// Values are shared, so cloning an `Args` (or a task holding one) is cheap.
#[derive(Clone, Default)]
pub struct Args(Vec<Rc<dyn Any>>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a value.
    pub fn with<T: Any>(mut self, value: T) -> Self {
        self.0.push(Rc::new(value));
        self
    }

    /// Borrow the argument at `index` if it exists and has type `T`.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.0.get(index)?.downcast_ref::<T>()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args(len={})", self.0.len())
    }
}

/// Build an [`Args`] list: `args![1, "two", 3.0]`.
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Args::new()$(.with($value))+
    };
}

/// Something that owns named methods a task can call.
///
/// Targets also give tasks an identity: two actions with the same target
/// (by `Rc` pointer) and the same method coalesce under `defer_once`,
/// `debounce` and `throttle`.
pub trait Target {
    /// Whether `method` names a method this target can perform.
    fn respond_to(&self, method: &str) -> bool;

    /// Run the named method.
    fn perform(&self, method: &str, args: &Args) -> TaskResult;
}

pub type TargetRef = Rc<dyn Target>;

pub type MethodFn = dyn Fn(&Args) -> TaskResult;

/// The work half of an action: a shared callable or a method name looked up
/// on the target when the task runs.
#[derive(Clone)]
pub enum Method {
    Func(Rc<MethodFn>),
    Named(Cow<'static, str>),
}

impl Method {
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Args) -> TaskResult + 'static,
    {
        Method::Func(Rc::new(f))
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Method::Named(name.into())
    }

    /// Identity comparison: callables by pointer, names by value.
    pub fn same(&self, other: &Method) -> bool {
        match (self, other) {
            (Method::Func(a), Method::Func(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Method::Named(a), Method::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Func(func) => write!(f, "Func({:p})", Rc::as_ptr(func) as *const ()),
            Method::Named(name) => write!(f, "Named({name})"),
        }
    }
}

pub(crate) fn same_target(a: Option<&TargetRef>, b: Option<&TargetRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
        (None, None) => true,
        _ => false,
    }
}

/// Call `method` with `args`, resolving a named method on `target`.
pub(crate) fn call(target: Option<&TargetRef>, method: &Method, args: &Args) -> TaskResult {
    match method {
        Method::Func(func) => func(args),
        Method::Named(name) => match target {
            Some(target) => target.perform(name, args),
            None => Err(format!("method `{name}` has no target to run on").into()),
        },
    }
}

/// A unit of schedulable work: optional target, method and arguments.
///
/// Each scheduling entry point takes an `Action`, so the call shape is
/// chosen by the constructor used rather than by the argument count.
#[derive(Clone)]
pub struct Action {
    pub(crate) target: Option<TargetRef>,
    pub(crate) method: Method,
    pub(crate) args: Args,
}

impl Action {
    pub fn new(method: Method) -> Self {
        Self {
            target: None,
            method,
            args: Args::new(),
        }
    }

    /// A free function with no target.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Args) -> TaskResult + 'static,
    {
        Self::new(Method::func(f))
    }

    /// `method` bound to `target`; the target supplies identity.
    pub fn on(target: TargetRef, method: Method) -> Self {
        Self {
            target: Some(target),
            method,
            args: Args::new(),
        }
    }

    /// A named method performed on `target`.
    pub fn send(target: TargetRef, method: impl Into<Cow<'static, str>>) -> Self {
        Self::on(target, Method::named(method))
    }

    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    pub fn target(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Same `(target, method)` identity as `other`.
    pub fn same_identity(&self, other: &Action) -> bool {
        same_target(self.target.as_ref(), other.target.as_ref()) && self.method.same(&other.method)
    }

    /// Reject named methods the target cannot perform. `queue` names the
    /// destination in the error message.
    pub(crate) fn validate(&self, queue: &str) -> Result<()> {
        if let Method::Named(name) = &self.method {
            let responds = self
                .target
                .as_ref()
                .is_some_and(|target| target.respond_to(name));
            if !responds {
                return Err(SchedulerError::NoSuchMethod(queue.to_string()));
            }
        }
        Ok(())
    }

    pub(crate) fn invoke(&self) -> TaskResult {
        call(self.target.as_ref(), &self.method, &self.args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("has_target", &self.target.is_some())
            .field("method", &self.method)
            .field("args", &self.args)
            .finish()
    }
}
