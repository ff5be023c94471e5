mod builder;
mod handle;
mod instance;
mod scheduler;

pub use builder::SchedulerBuilder;
pub use handle::Cancellable;
pub use instance::QueueSet;
pub use scheduler::Scheduler;
