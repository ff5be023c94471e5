//! Stable identity tags for targets.
//!
//! `defer_once` uses a tag, when one is available, to find an already queued
//! record for the same target in constant time instead of scanning the queue.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::task::{Target, TargetRef};

pub type Guid = u64;

/// Looks up the identity tag of a target.
pub trait IdentityMap {
    fn guid_for(&self, target: &TargetRef) -> Option<Guid>;
}

/// An [`IdentityMap`] that hands out tags to explicitly registered targets.
///
/// Entries hold a weak reference, so registering a target does not keep it
/// alive. A dead entry keeps its address reserved until it is pruned.
#[derive(Default)]
pub struct GuidRegistry {
    next: Cell<Guid>,
    entries: RefCell<HashMap<usize, (Weak<dyn Target>, Guid)>>,
}

fn address_of(target: &TargetRef) -> usize {
    Rc::as_ptr(target) as *const () as usize
}

impl GuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `target`, returning its existing tag if it already has one.
    pub fn register(&self, target: &TargetRef) -> Guid {
        let key = address_of(target);
        let mut entries = self.entries.borrow_mut();
        if let Some((weak, guid)) = entries.get(&key) {
            if weak.strong_count() > 0 {
                return *guid;
            }
        }
        let guid = self.next.get() + 1;
        self.next.set(guid);
        entries.insert(key, (Rc::downgrade(target), guid));
        guid
    }

    pub fn forget(&self, target: &TargetRef) -> bool {
        self.entries.borrow_mut().remove(&address_of(target)).is_some()
    }

    /// Drop entries whose targets are gone.
    pub fn prune(&self) {
        self.entries
            .borrow_mut()
            .retain(|_, (weak, _)| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl IdentityMap for GuidRegistry {
    fn guid_for(&self, target: &TargetRef) -> Option<Guid> {
        let entries = self.entries.borrow();
        let (weak, guid) = entries.get(&address_of(target))?;
        (weak.strong_count() > 0).then_some(*guid)
    }
}
