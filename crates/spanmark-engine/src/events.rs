//! Outbound notifications
//!
//! The engine never calls back into the host. Everything observable is queued here
//! and handed over by [`crate::Highlighter::drain_events`]. The queue is bounded:
//! once full, the oldest event is dropped for each new one.

use std::collections::VecDeque;

use crate::registry::HighlightId;

pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorEvent {
    /// `index` is 0-based among the highlights the cursor may visit
    Update { index: usize, total: usize },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A highlight was created, or its query set was enabled/disabled
    Highlight { id: HighlightId, enabled: bool },
    Unhighlight { id: HighlightId },
    /// The tree was normalized and the text index rebuilt
    Refresh,
    Cursor(CursorEvent),
    RenderCompleted { query_set: String, count: usize },
    ReserveExceeded { query_set: String, reserve: usize },
    SubjectRejected { query_set: String, reason: String },
    JobAborted { query_set: String },
}

impl From<CursorEvent> for EngineEvent {
    fn from(event: CursorEvent) -> Self {
        EngineEvent::Cursor(event)
    }
}

#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<EngineEvent>,
    capacity: usize,
    /// Events lost since the last drain
    dropped: usize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventQueue {
    /// A queue holding at most `capacity` events (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        EventQueue {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, event: impl Into<EngineEvent>) {
        let event = event.into();
        log::trace!("event {event:?}");
        if self.events.len() == self.capacity {
            if self.dropped == 0 {
                log::warn!(
                    "event queue full ({} events), dropping oldest until drained",
                    self.capacity
                );
            }
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.dropped = 0;
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events discarded since the last drain
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn unhighlight(id: u64) -> EngineEvent {
        EngineEvent::Unhighlight {
            id: HighlightId(id),
        }
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let mut queue = EventQueue::with_capacity(3);
        for id in 1..=5 {
            queue.push(unhighlight(id));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.drain(), vec![unhighlight(3), unhighlight(4), unhighlight(5)]);
        assert_eq!(queue.dropped(), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_latest_event() {
        let mut queue = EventQueue::with_capacity(0);
        queue.push(EngineEvent::Refresh);
        queue.push(CursorEvent::Clear);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.drain(), vec![EngineEvent::Cursor(CursorEvent::Clear)]);
    }
}
