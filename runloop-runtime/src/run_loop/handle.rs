use crate::coalesce::CoalesceHandle;
use crate::queue::TaskHandle;
use crate::timers::TimerHandle;

/// Anything `Scheduler::cancel` accepts.
#[derive(Debug, Clone)]
pub enum Cancellable {
    Task(TaskHandle),
    Timer(TimerHandle),
    Coalesced(CoalesceHandle),
}

impl From<TaskHandle> for Cancellable {
    fn from(handle: TaskHandle) -> Self {
        Cancellable::Task(handle)
    }
}

impl From<&TaskHandle> for Cancellable {
    fn from(handle: &TaskHandle) -> Self {
        Cancellable::Task(handle.clone())
    }
}

impl From<TimerHandle> for Cancellable {
    fn from(handle: TimerHandle) -> Self {
        Cancellable::Timer(handle)
    }
}

impl From<&TimerHandle> for Cancellable {
    fn from(handle: &TimerHandle) -> Self {
        Cancellable::Timer(*handle)
    }
}

impl From<CoalesceHandle> for Cancellable {
    fn from(handle: CoalesceHandle) -> Self {
        Cancellable::Coalesced(handle)
    }
}

impl From<&CoalesceHandle> for Cancellable {
    fn from(handle: &CoalesceHandle) -> Self {
        Cancellable::Coalesced(handle.clone())
    }
}
