//! Scheduler error types.

use thiserror::Error;

/// Error returned by a task body.
pub type TaskError = Box<dyn std::error::Error>;

/// Result of running one task.
pub type TaskResult = std::result::Result<(), TaskError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("you attempted to schedule an action in a queue ({0}) that doesn't exist")]
    NoSuchQueue(String),

    #[error("you attempted to schedule an action ({0}) for a method that doesn't exist")]
    NoSuchMethod(String),

    #[error("end() called with no open run loop")]
    NoCurrentInstance,

    #[error("cannot off() a listener that does not exist")]
    ListenerNotFound,

    #[error("unknown run loop event: {0}")]
    UnknownEvent(String),

    #[error("default queue ({0}) is not one of the configured queues")]
    UnknownDefaultQueue(String),

    #[error("at least one queue name is required")]
    NoQueues,

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("task failed: {0}")]
    Task(TaskError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
