//! Bookkeeping for debounce and throttle: at most one pending record per
//! `(target, method)` in each set.

use std::fmt;

use crate::platform::HostTimer;
use crate::task::{same_target, Method, TargetRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoalesceKind {
    Debounce,
    Throttle,
}

/// A pending debounce or throttle, returned as its cancellation handle.
#[derive(Clone)]
pub struct CoalesceHandle {
    pub(crate) id: u64,
    pub(crate) kind: CoalesceKind,
    pub(crate) target: Option<TargetRef>,
    pub(crate) method: Method,
    pub(crate) timer: HostTimer,
}

impl CoalesceHandle {
    pub fn kind(&self) -> CoalesceKind {
        self.kind
    }

    fn matches(&self, target: Option<&TargetRef>, method: &Method) -> bool {
        same_target(self.target.as_ref(), target) && self.method.same(method)
    }
}

impl fmt::Debug for CoalesceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalesceHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("timer", &self.timer)
            .finish()
    }
}

/// Linear set of records; these stay small.
#[derive(Default)]
pub(crate) struct Coalescer {
    records: Vec<CoalesceHandle>,
}

impl Coalescer {
    pub(crate) fn find(&self, target: Option<&TargetRef>, method: &Method) -> Option<&CoalesceHandle> {
        self.records.iter().find(|record| record.matches(target, method))
    }

    pub(crate) fn take(&mut self, target: Option<&TargetRef>, method: &Method) -> Option<CoalesceHandle> {
        let index = self
            .records
            .iter()
            .position(|record| record.matches(target, method))?;
        Some(self.records.remove(index))
    }

    pub(crate) fn push(&mut self, record: CoalesceHandle) {
        self.records.push(record);
    }

    /// Remove the record with this id, if it is still pending.
    pub(crate) fn remove(&mut self, id: u64) -> Option<CoalesceHandle> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    pub(crate) fn drain(&mut self) -> Vec<HostTimer> {
        self.records.drain(..).map(|record| record.timer).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
