//! Runloop Runtime - Core runtime for cooperative run-loop scheduling
//!
//! This crate provides the queues, flush engine, run-loop stack, timer
//! ledger and debounce/throttle bookkeeping behind the `runloop` crate.
//! Everything is single threaded: schedulers are `Rc` values driven by a
//! [`Platform`] that hands out fire-once host timers.

mod coalesce;
mod config;
mod environment;
mod error;
mod events;
mod identity;
pub mod platform;
pub mod queue;
pub mod run_loop;
pub mod task;
mod timers;

// Re-export public API
pub use coalesce::{CoalesceHandle, CoalesceKind};
pub use config::{load_settings, load_toml_config, load_yaml_config, settings_from_str, Settings};
pub use environment::{ErrorStrategy, FnHandler, Propagate, QueueOptions, TargetHandler};
pub use error::{Result, SchedulerError, TaskError, TaskResult};
pub use events::{Listener, ListenerId, RunLoopEvent};
pub use identity::{Guid, GuidRegistry, IdentityMap};
pub use platform::{HostTimer, ManualPlatform, Platform, TokioPlatform};
pub use queue::{Flush, FlushMode, Queue, Step, TaskHandle};
pub use run_loop::{Cancellable, QueueSet, Scheduler, SchedulerBuilder};
pub use task::{Action, Args, DebugStack, Method, Target, TargetRef};
pub use timers::TimerHandle;

pub use ::config::FileFormat;
