use super::instance::QueueSet;
use super::scheduler::Scheduler;
use crate::config::{load_settings, load_toml_config, load_yaml_config, Settings};
use crate::environment::{
    Environment, ErrorStrategy, FnHandler, Propagate, QueueOptions, TargetHandler,
};
use crate::error::{Result, SchedulerError, TaskError};
use crate::events::Listener;
use crate::identity::IdentityMap;
use crate::platform::{Platform, TokioPlatform};
use crate::task::{DebugStack, TargetRef};
use config::Config;
use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::info;

/// Builder for the scheduler
pub struct SchedulerBuilder {
    queue_names: Vec<String>,
    default_queue: Option<String>,
    on_error: Option<Rc<dyn ErrorStrategy>>,
    on_begin: Option<Listener>,
    on_end: Option<Listener>,
    platform: Option<Rc<dyn Platform>>,
    identity: Option<Rc<dyn IdentityMap>>,
    queue_options: HashMap<String, QueueOptions>,
    debug: bool,
}

impl SchedulerBuilder {
    /// Start a builder for the given queues, highest priority first.
    pub fn new<I, S>(queue_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue_names: queue_names.into_iter().map(Into::into).collect(),
            default_queue: None,
            on_error: None,
            on_begin: None,
            on_end: None,
            platform: None,
            identity: None,
            queue_options: HashMap::new(),
            debug: false,
        }
    }

    /// Create from loaded [`Settings`]
    pub fn with_settings(settings: Settings) -> Self {
        let mut builder = Self::new(settings.queues);
        builder.default_queue = settings.default_queue;
        builder.debug = settings.debug;
        builder
    }

    /// Create with TOML config file
    pub fn with_toml(path: &str) -> Result<Self> {
        Ok(Self::with_settings(load_toml_config(path)?))
    }

    /// Create with YAML config file
    pub fn with_yaml(path: &str) -> Result<Self> {
        Ok(Self::with_settings(load_yaml_config(path)?))
    }

    /// Create with custom config
    pub fn with_config(config: &Config) -> Result<Self> {
        Ok(Self::with_settings(load_settings(config)?))
    }

    /// Queue that expired timers are flushed into. Defaults to the first
    /// queue.
    pub fn default_queue(mut self, name: impl Into<String>) -> Self {
        self.default_queue = Some(name.into());
        self
    }

    /// Route task errors to `handler` instead of failing the flush.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskError, Option<&DebugStack>) + 'static,
    {
        self.on_error = Some(Rc::new(FnHandler::new(handler)));
        self
    }

    /// Route task errors to a named method on `target`.
    pub fn on_error_target(mut self, target: TargetRef, method: impl Into<Cow<'static, str>>) -> Self {
        self.on_error = Some(Rc::new(TargetHandler::new(target, method)));
        self
    }

    pub fn error_strategy(mut self, strategy: Rc<dyn ErrorStrategy>) -> Self {
        self.on_error = Some(strategy);
        self
    }

    pub fn on_begin<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&QueueSet>, Option<&QueueSet>) + 'static,
    {
        self.on_begin = Some(Rc::new(hook));
        self
    }

    pub fn on_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&QueueSet>, Option<&QueueSet>) + 'static,
    {
        self.on_end = Some(Rc::new(hook));
        self
    }

    /// Host timers to use. Defaults to [`TokioPlatform`], which needs a
    /// tokio [`LocalSet`](tokio::task::LocalSet); outside one, pass a
    /// [`ManualPlatform`](crate::platform::ManualPlatform) or another
    /// [`Platform`].
    pub fn platform(mut self, platform: Rc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Identity tags for the `defer_once` fast path.
    pub fn identity_map(mut self, identity: Rc<dyn IdentityMap>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Hooks around every flush of queue `name`.
    pub fn queue_options(mut self, name: impl Into<String>, options: QueueOptions) -> Self {
        self.queue_options.insert(name.into(), options);
        self
    }

    /// Capture a backtrace whenever work is scheduled. Slow; for debugging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build the scheduler
    ///
    /// Fails when no queues were given or the default queue is not one of
    /// them.
    ///
    /// # Panics
    ///
    /// Without an explicit [`platform`](Self::platform), the scheduler arms
    /// host timers with `tokio::task::spawn_local`. Any call that arms one
    /// (`defer` outside a run loop, `later`, `debounce`, `throttle`) then
    /// panics unless it runs inside a `LocalSet`.
    pub fn build(self) -> Result<Rc<Scheduler>> {
        let first = self.queue_names.first().cloned().ok_or(SchedulerError::NoQueues)?;
        let default_queue = self.default_queue.unwrap_or(first);
        if !self.queue_names.contains(&default_queue) {
            return Err(SchedulerError::UnknownDefaultQueue(default_queue));
        }

        info!(
            queues = ?self.queue_names,
            default_queue = %default_queue,
            debug = self.debug,
            "Building scheduler"
        );

        let env = Environment {
            on_error: self.on_error.unwrap_or_else(|| Rc::new(Propagate) as Rc<dyn ErrorStrategy>),
            default_queue,
            platform: self
                .platform
                .unwrap_or_else(|| Rc::new(TokioPlatform::new()) as Rc<dyn Platform>),
            on_begin: self.on_begin,
            on_end: self.on_end,
            identity: self.identity,
            queue_options: self.queue_options,
            debug: self.debug,
        };

        Ok(Scheduler::new(self.queue_names, env))
    }
}
