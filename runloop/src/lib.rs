//! # Runloop - Cooperative Run-Loop Scheduling for Rust
//!
//! This library batches work into named, priority-ordered queues and flushes
//! them together, so that everything scheduled while handling one event
//! settles before control returns to the host.
//!
//! ## Features
//!
//! - **Ordered queues**: Work in an earlier queue always runs before the next
//!   batch of a later queue
//! - **Deduplication**: `defer_once` keeps one record per `(target, method)`
//!   and updates its arguments
//! - **Nested run loops**: `begin`/`end` form a stack; `run` and `join` wrap
//!   a closure
//! - **Autorun**: Scheduling outside a run loop opens one and flushes it on
//!   the next host tick
//! - **Timers**: `later` keeps every deadline behind a single host timeout
//! - **Debounce / throttle**: Coalesce repeated calls per `(target, method)`
//! - **Config support**: Queue names and defaults from TOML, YAML or
//!   `RUNLOOP_` environment variables
//!
//! ## Quick Start with SchedulerBuilder
//!
//! ```rust
//! use runloop::{Action, Args, ManualPlatform, SchedulerBuilder};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let platform = Rc::new(ManualPlatform::new());
//!     let scheduler = SchedulerBuilder::new(["sync", "actions", "render"])
//!         .default_queue("actions")
//!         .platform(platform.clone())
//!         .build()?;
//!
//!     let log = Rc::new(RefCell::new(Vec::new()));
//!     let sink = log.clone();
//!     let greet = Action::func(move |args: &Args| {
//!         sink.borrow_mut().push(*args.get::<i32>(0).unwrap_or(&0));
//!         Ok(())
//!     })
//!     .with_args(Args::new().with(42));
//!
//!     scheduler.run(|| {
//!         scheduler.defer("render", greet)?;
//!         Ok(())
//!     })?;
//!
//!     assert_eq!(*log.borrow(), vec![42]);
//!     Ok(())
//! }
//! ```
//!
//! ## Host timers
//!
//! The default platform is [`TokioPlatform`], which arms timers with
//! `spawn_local` and therefore has to run inside a [`LocalSet`]:
//!
//! ```rust,no_run
//! use runloop::{Action, LocalSet, SchedulerBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = LocalSet::new();
//!     local
//!         .run_until(async {
//!             let scheduler = SchedulerBuilder::with_toml("config/runloop.toml")?.build()?;
//!             scheduler.later(Action::func(|_| Ok(())), Duration::from_millis(30))?;
//!             tokio::time::sleep(Duration::from_millis(50)).await;
//!             Ok::<_, Box<dyn std::error::Error>>(())
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! Create `config/runloop.toml`:
//!
//! ```toml
//! queues = ["sync", "actions", "render", "destroy"]
//! default_queue = "actions"
//! debug = false
//! ```
//!
//! Or `config/runloop.yaml`:
//!
//! ```yaml
//! queues:
//!   - sync
//!   - actions
//! default_queue: actions
//! ```
//!
//! You can also use environment variables with `RUNLOOP_` prefix:
//!
//! ```bash
//! export RUNLOOP_DEFAULT_QUEUE=render
//! export RUNLOOP_QUEUES=sync,actions,render
//! ```

// Re-export core types
pub use runloop_runtime::{
    args, Action, Args, Cancellable, CoalesceHandle, CoalesceKind, DebugStack, ErrorStrategy,
    FileFormat, FnHandler, GuidRegistry, HostTimer, IdentityMap, ListenerId, ManualPlatform,
    Method, Platform, Propagate, QueueOptions, QueueSet, Result, RunLoopEvent, Scheduler,
    SchedulerBuilder, SchedulerError, Settings, Target, TargetHandler, TargetRef, TaskError,
    TaskHandle, TaskResult, TimerHandle, TokioPlatform,
};

// Full runtime API, including the queue and flush internals
pub use runloop_runtime;

// Needed to drive `TokioPlatform`
pub use tokio::task::LocalSet;
