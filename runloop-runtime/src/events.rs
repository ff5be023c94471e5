use std::rc::Rc;
use std::str::FromStr;

use crate::error::{Result, SchedulerError};
use crate::run_loop::QueueSet;

/// Run-loop transitions listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunLoopEvent {
    /// `(new instance, previous instance)`
    Begin,
    /// `(flushed instance, instance now current)`
    End,
}

impl FromStr for RunLoopEvent {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "begin" => Ok(RunLoopEvent::Begin),
            "end" => Ok(RunLoopEvent::End),
            other => Err(SchedulerError::UnknownEvent(other.to_string())),
        }
    }
}

pub type Listener = Rc<dyn Fn(Option<&QueueSet>, Option<&QueueSet>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    begin: Vec<(ListenerId, Listener)>,
    end: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    fn slot(&mut self, event: RunLoopEvent) -> &mut Vec<(ListenerId, Listener)> {
        match event {
            RunLoopEvent::Begin => &mut self.begin,
            RunLoopEvent::End => &mut self.end,
        }
    }

    pub(crate) fn add(&mut self, event: RunLoopEvent, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.slot(event).push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, event: RunLoopEvent, id: ListenerId) -> Result<()> {
        let slot = self.slot(event);
        let before = slot.len();
        slot.retain(|(existing, _)| *existing != id);
        if slot.len() == before {
            return Err(SchedulerError::ListenerNotFound);
        }
        Ok(())
    }

    /// Snapshot, so listeners may subscribe or unsubscribe while being
    /// notified.
    pub(crate) fn snapshot(&mut self, event: RunLoopEvent) -> Vec<Listener> {
        self.slot(event)
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }
}
