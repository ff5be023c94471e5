use super::handle::Cancellable;
use super::instance::QueueSet;
use crate::coalesce::{CoalesceHandle, CoalesceKind, Coalescer};
use crate::environment::Environment;
use crate::error::{Result, SchedulerError, TaskError};
use crate::events::{ListenerId, Listeners, RunLoopEvent};
use crate::platform::HostTimer;
use crate::queue::TaskHandle;
use crate::task::{capture_stack, Action};
use crate::timers::{TimerHandle, TimerLedger};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Cooperative run loop: named queues flushed in priority order, plus timers,
/// debounce and throttle.
///
/// Built by [`SchedulerBuilder`](super::SchedulerBuilder). All state is owned
/// by this value, so independent schedulers never see each other's work.
pub struct Scheduler {
    me: Weak<Scheduler>,
    queue_names: Vec<String>,
    env: Rc<Environment>,
    current: RefCell<Option<Rc<QueueSet>>>,
    instance_stack: RefCell<Vec<Rc<QueueSet>>>,
    next_instance_id: Cell<u64>,
    listeners: RefCell<Listeners>,
    timers: RefCell<TimerLedger>,
    debouncees: RefCell<Coalescer>,
    throttlers: RefCell<Coalescer>,
    next_coalesce_id: Cell<u64>,
    autorun: Cell<Option<HostTimer>>,
}

/// Pops back to the suspended instance when dropped while armed: after
/// every flush in `end`, and when a `run` closure unwinds.
struct RestoreInstance<'a> {
    scheduler: &'a Scheduler,
    armed: bool,
}

impl<'a> RestoreInstance<'a> {
    fn new(scheduler: &'a Scheduler) -> Self {
        Self {
            scheduler,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RestoreInstance<'_> {
    fn drop(&mut self) {
        if self.armed {
            let previous = self.scheduler.instance_stack.borrow_mut().pop();
            *self.scheduler.current.borrow_mut() = previous;
        }
    }
}

impl Scheduler {
    pub(crate) fn new(queue_names: Vec<String>, env: Environment) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            queue_names,
            env: Rc::new(env),
            current: RefCell::new(None),
            instance_stack: RefCell::new(Vec::new()),
            next_instance_id: Cell::new(0),
            listeners: RefCell::new(Listeners::default()),
            timers: RefCell::new(TimerLedger::new()),
            debouncees: RefCell::new(Coalescer::default()),
            throttlers: RefCell::new(Coalescer::default()),
            next_coalesce_id: Cell::new(0),
            autorun: Cell::new(None),
        })
    }

    pub fn queue_names(&self) -> &[String] {
        &self.queue_names
    }

    pub fn default_queue(&self) -> &str {
        &self.env.default_queue
    }

    pub fn is_debug(&self) -> bool {
        self.env.debug
    }

    /// The instance scheduling calls currently land in.
    pub fn current_instance(&self) -> Option<Rc<QueueSet>> {
        self.current.borrow().clone()
    }

    /// Open instances: the current one plus every suspended one.
    pub fn depth(&self) -> usize {
        let open = usize::from(self.current.borrow().is_some());
        self.instance_stack.borrow().len() + open
    }

    // ---------------------------------------------------------------------
    // Run-loop stack
    // ---------------------------------------------------------------------

    /// Open a new instance, suspending the current one.
    pub fn begin(&self) {
        self.begin_instance();
    }

    fn begin_instance(&self) -> Rc<QueueSet> {
        let previous = self.current.borrow_mut().take();
        if let Some(previous) = &previous {
            self.instance_stack.borrow_mut().push(Rc::clone(previous));
        }

        let id = self.next_instance_id.get() + 1;
        self.next_instance_id.set(id);
        let instance = Rc::new(QueueSet::new(id, &self.queue_names, &self.env));
        *self.current.borrow_mut() = Some(Rc::clone(&instance));

        trace!(instance = id, depth = self.depth(), "run loop begin");
        self.notify(RunLoopEvent::Begin, Some(&*instance), previous.as_deref());
        instance
    }

    /// Flush the current instance to completion and restore the one it
    /// suspended. The restore happens even when the flush fails.
    pub fn end(&self) -> Result<()> {
        let instance = self
            .current
            .borrow()
            .clone()
            .ok_or(SchedulerError::NoCurrentInstance)?;

        let flushed = {
            let _restore = RestoreInstance::new(self);
            instance.flush()
        };
        flushed.map_err(SchedulerError::Task)?;

        let next = self.current_instance();
        trace!(instance = instance.id(), depth = self.depth(), "run loop end");
        self.notify(RunLoopEvent::End, Some(&*instance), next.as_deref());
        Ok(())
    }

    fn notify(&self, event: RunLoopEvent, first: Option<&QueueSet>, second: Option<&QueueSet>) {
        let listeners = self.listeners.borrow_mut().snapshot(event);
        for listener in listeners {
            listener(first, second);
        }
        let hook = match event {
            RunLoopEvent::Begin => self.env.on_begin.as_ref(),
            RunLoopEvent::End => self.env.on_end.as_ref(),
        };
        if let Some(hook) = hook {
            hook(first, second);
        }
    }

    pub fn on<F>(&self, event: RunLoopEvent, listener: F) -> ListenerId
    where
        F: Fn(Option<&QueueSet>, Option<&QueueSet>) + 'static,
    {
        self.listeners.borrow_mut().add(event, Rc::new(listener))
    }

    pub fn off(&self, event: RunLoopEvent, id: ListenerId) -> Result<()> {
        self.listeners.borrow_mut().remove(event, id)
    }

    // ---------------------------------------------------------------------
    // Entry points
    // ---------------------------------------------------------------------

    /// Run `f` inside a fresh instance and flush it.
    ///
    /// An error from `f` goes to the error strategy; if that swallows it the
    /// result is `Ok(None)`. A flush error wins over an error from `f`. If
    /// `f` panics the instance is discarded unflushed.
    pub fn run<R, F>(&self, f: F) -> Result<Option<R>>
    where
        F: FnOnce() -> std::result::Result<R, TaskError>,
    {
        self.begin();
        let unwind = RestoreInstance::new(self);
        let outcome = match f() {
            Ok(value) => Ok(Some(value)),
            Err(error) => self.env.on_error.handle_error(error, None).map(|()| None),
        };
        unwind.disarm();
        self.end()?;
        outcome.map_err(SchedulerError::Task)
    }

    pub fn run_action(&self, action: Action) -> Result<()> {
        action.validate("run")?;
        self.run(|| action.invoke()).map(|_| ())
    }

    /// Call `f` inline when an instance is open, otherwise behave like
    /// [`run`](Self::run).
    pub fn join<R, F>(&self, f: F) -> Result<Option<R>>
    where
        F: FnOnce() -> std::result::Result<R, TaskError>,
    {
        if self.current.borrow().is_none() {
            return self.run(f);
        }
        f().map(Some).map_err(SchedulerError::Task)
    }

    pub fn join_action(&self, action: Action) -> Result<()> {
        action.validate("join")?;
        self.join(|| action.invoke()).map(|_| ())
    }

    /// Queue `action` on `queue` of the current instance, opening an
    /// autorun instance when none is open.
    pub fn defer(&self, queue: &str, action: Action) -> Result<TaskHandle> {
        self.schedule(queue, action, false)
    }

    /// Like [`defer`](Self::defer), but a second action with the same
    /// `(target, method)` before the flush only replaces the arguments of the
    /// first.
    pub fn defer_once(&self, queue: &str, action: Action) -> Result<TaskHandle> {
        self.schedule(queue, action, true)
    }

    fn schedule(&self, queue: &str, action: Action, once: bool) -> Result<TaskHandle> {
        if !self.queue_names.iter().any(|name| name == queue) {
            return Err(SchedulerError::NoSuchQueue(queue.to_string()));
        }
        action.validate(queue)?;

        let stack = self.env.debug.then(capture_stack);
        let instance = match self.current_instance() {
            Some(instance) => instance,
            None => self.create_autorun(),
        };
        instance.schedule(queue, action, once, stack)
    }

    fn create_autorun(&self) -> Rc<QueueSet> {
        let instance = self.begin_instance();
        let me = self.me.clone();
        let timer = self.env.platform.set_timeout(
            Box::new(move || {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.autorun.set(None);
                    if let Err(err) = scheduler.end() {
                        error!(%err, "autorun flush failed");
                    }
                }
            }),
            Duration::ZERO,
        );
        self.autorun.set(Some(timer));
        debug!(instance = instance.id(), "autorun scheduled");
        instance
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Run `action` in the default queue once `wait` has elapsed.
    pub fn later(&self, action: Action, wait: Duration) -> Result<TimerHandle> {
        action.validate("later")?;
        let deadline = self.env.platform.now() + wait;
        let (handle, earliest) = self.timers.borrow_mut().insert(deadline, action);
        if earliest {
            self.reinstall_timer_timeout();
        }
        trace!(?deadline, ?handle, "timer scheduled");
        Ok(handle)
    }

    fn clear_timer_timeout(&self) {
        let host = self.timers.borrow_mut().take_host();
        if let Some(host) = host {
            self.env.platform.clear_timeout(host);
        }
    }

    fn install_timer_timeout(&self) {
        let Some(deadline) = self.timers.borrow().next_deadline() else {
            return;
        };
        let wait = deadline.saturating_sub(self.env.platform.now());
        let me = self.me.clone();
        let host = self.env.platform.set_timeout(
            Box::new(move || {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.run_expired_timers();
                }
            }),
            wait,
        );
        self.timers.borrow_mut().set_host(host);
    }

    fn reinstall_timer_timeout(&self) {
        self.clear_timer_timeout();
        self.install_timer_timeout();
    }

    fn run_expired_timers(&self) {
        self.timers.borrow_mut().take_host();
        let outcome = self.run(|| {
            self.schedule_expired_timers();
            Ok(())
        });
        if let Err(err) = outcome {
            error!(%err, "expired timers failed");
        }
    }

    /// Move every due action into the default queue and re-arm for the next
    /// deadline. An action that can no longer be scheduled is logged and
    /// skipped; the rest of the harvest still goes ahead.
    fn schedule_expired_timers(&self) {
        let now = self.env.platform.now();
        let expired = self.timers.borrow_mut().take_expired(now);
        trace!(count = expired.len(), ?now, "harvesting expired timers");
        for action in expired {
            if let Err(err) = self.defer(&self.env.default_queue, action) {
                error!(%err, "dropping expired timer");
            }
        }
        self.install_timer_timeout();
    }

    // ---------------------------------------------------------------------
    // Debounce / throttle
    // ---------------------------------------------------------------------

    /// Run `action` once `wait` has passed without another call for the same
    /// `(target, method)`; each call restarts the window and supplies the
    /// arguments. With `immediate`, the first call of a window runs right
    /// away and the window closes silently.
    pub fn debounce(&self, action: Action, wait: Duration, immediate: bool) -> Result<CoalesceHandle> {
        action.validate("debounce")?;
        let existing = self
            .debouncees
            .borrow_mut()
            .take(action.target.as_ref(), &action.method);
        if let Some(existing) = &existing {
            self.env.platform.clear_timeout(existing.timer);
        }

        let record = self.arm_coalesced(CoalesceKind::Debounce, &action, wait, !immediate);
        self.debouncees.borrow_mut().push(record.clone());

        if immediate && existing.is_none() {
            self.run_action(action)?;
        }
        Ok(record)
    }

    /// Run `action` at most once per `wait` for the same `(target, method)`.
    /// Calls inside an open window are dropped. With `immediate` the call
    /// that opens the window runs right away, otherwise it runs when the
    /// window closes.
    pub fn throttle(&self, action: Action, wait: Duration, immediate: bool) -> Result<CoalesceHandle> {
        action.validate("throttle")?;
        if let Some(existing) = self
            .throttlers
            .borrow()
            .find(action.target.as_ref(), &action.method)
        {
            return Ok(existing.clone());
        }

        let record = self.arm_coalesced(CoalesceKind::Throttle, &action, wait, !immediate);
        self.throttlers.borrow_mut().push(record.clone());

        if immediate {
            self.run_action(action)?;
        }
        Ok(record)
    }

    fn coalescer(&self, kind: CoalesceKind) -> &RefCell<Coalescer> {
        match kind {
            CoalesceKind::Debounce => &self.debouncees,
            CoalesceKind::Throttle => &self.throttlers,
        }
    }

    fn arm_coalesced(
        &self,
        kind: CoalesceKind,
        action: &Action,
        wait: Duration,
        run_on_fire: bool,
    ) -> CoalesceHandle {
        let id = self.next_coalesce_id.get() + 1;
        self.next_coalesce_id.set(id);

        let me = self.me.clone();
        let deferred = run_on_fire.then(|| action.clone());
        let timer = self.env.platform.set_timeout(
            Box::new(move || {
                if let Some(scheduler) = me.upgrade() {
                    scheduler.fire_coalesced(kind, id, deferred);
                }
            }),
            wait,
        );

        CoalesceHandle {
            id,
            kind,
            target: action.target.clone(),
            method: action.method.clone(),
            timer,
        }
    }

    fn fire_coalesced(&self, kind: CoalesceKind, id: u64, deferred: Option<Action>) {
        self.coalescer(kind).borrow_mut().remove(id);
        if let Some(action) = deferred {
            if let Err(err) = self.run_action(action) {
                error!(%err, ?kind, "coalesced call failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Cancellation
    // ---------------------------------------------------------------------

    /// Cancel a task, timer, debounce or throttle. Returns whether anything
    /// was still pending; unknown or spent handles are a no-op.
    pub fn cancel(&self, handle: impl Into<Cancellable>) -> bool {
        match handle.into() {
            Cancellable::Task(handle) => handle.cancel(),
            Cancellable::Timer(handle) => self.cancel_timer(handle),
            Cancellable::Coalesced(handle) => self.cancel_coalesced(&handle),
        }
    }

    fn cancel_timer(&self, handle: TimerHandle) -> bool {
        let removed = self.timers.borrow_mut().remove(handle);
        match removed {
            Some(was_earliest) => {
                if was_earliest {
                    self.reinstall_timer_timeout();
                }
                true
            }
            None => false,
        }
    }

    fn cancel_coalesced(&self, handle: &CoalesceHandle) -> bool {
        let removed = self.coalescer(handle.kind).borrow_mut().remove(handle.id);
        match removed {
            Some(record) => {
                self.env.platform.clear_timeout(record.timer);
                true
            }
            None => false,
        }
    }

    /// Whether any timer, debounce, throttle or autorun is pending.
    pub fn has_timers(&self) -> bool {
        !self.timers.borrow().is_empty()
            || !self.debouncees.borrow().is_empty()
            || !self.throttlers.borrow().is_empty()
            || self.autorun.get().is_some()
    }

    /// Number of deadlines waiting in the timer ledger.
    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Drop every pending timer, debounce and throttle, and disarm the
    /// autorun timeout. An autorun instance that is still open stays current
    /// until [`end`](Self::end) is called.
    pub fn cancel_timers(&self) {
        let mut host_timers = self.throttlers.borrow_mut().drain();
        host_timers.extend(self.debouncees.borrow_mut().drain());
        for timer in host_timers {
            self.env.platform.clear_timeout(timer);
        }

        self.clear_timer_timeout();
        self.timers.borrow_mut().clear();

        if let Some(autorun) = self.autorun.take() {
            self.env.platform.clear_timeout(autorun);
        }
        debug!("cancelled all timers");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue_names", &self.queue_names)
            .field("default_queue", &self.env.default_queue)
            .field("depth", &self.depth())
            .field("timers", &self.timers.borrow().len())
            .field("debouncees", &self.debouncees.borrow().len())
            .field("throttlers", &self.throttlers.borrow().len())
            .finish()
    }
}
