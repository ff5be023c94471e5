//! Host timer primitives.
//!
//! The scheduler never sleeps or spawns on its own; it asks a [`Platform`]
//! for one fire-once callback at a time.

mod manual;
mod tokio_host;

pub use manual::ManualPlatform;
pub use tokio_host::TokioPlatform;

use std::time::Duration;

/// Opaque id of a callback armed on a [`Platform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTimer(u64);

impl HostTimer {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

pub type HostCallback = Box<dyn FnOnce()>;

pub trait Platform {
    /// Time elapsed since the platform's origin.
    fn now(&self) -> Duration;

    /// Arm `callback` to run once after `wait`.
    fn set_timeout(&self, callback: HostCallback, wait: Duration) -> HostTimer;

    /// Disarm a callback. Unknown or already fired timers are ignored.
    fn clear_timeout(&self, timer: HostTimer);
}
