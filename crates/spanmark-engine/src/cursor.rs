//! Cursor over the highlight registry
//!
//! Position is an ordinal among the highlights the cursor may visit: those of
//! enabled query sets, optionally restricted to a set of names, that the host
//! reports visible.

use std::collections::HashSet;

use crate::events::CursorEvent;
use crate::registry::HighlightId;

/// What the cursor needs from the engine
pub trait CursorHost {
    /// Highlights available for traversal
    fn count(&self, iterable: Option<&HashSet<String>>) -> usize;

    /// The `ordinal`th available highlight in document order
    fn highlight_at(&self, ordinal: usize, iterable: Option<&HashSet<String>>)
    -> Option<HighlightId>;

    /// Ordinal of `id` among the available highlights, `None` if it is not one of them
    fn ordinal_of(&self, id: HighlightId, iterable: Option<&HashSet<String>>) -> Option<usize>;

    fn set_active(&mut self, id: HighlightId, active: bool);

    /// Ask the host to bring a highlight into view
    fn reveal(&mut self, id: HighlightId);
}

#[derive(Debug, Default, Clone)]
pub struct Cursor {
    index: Option<usize>,
    iterable: Option<HashSet<String>>,
    total: usize,
    active: Option<HighlightId>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn active(&self) -> Option<HighlightId> {
        self.active
    }

    pub fn iterable(&self) -> Option<&HashSet<String>> {
        self.iterable.as_ref()
    }

    /// Restrict traversal to `names` (`None` lifts the restriction)
    pub fn set_iterable_queries(
        &mut self,
        host: &mut impl CursorHost,
        names: Option<HashSet<String>>,
    ) -> CursorEvent {
        self.iterable = names;
        self.reset(host)
    }

    /// Drop the selection and recount
    pub fn reset(&mut self, host: &mut impl CursorHost) -> CursorEvent {
        self.deactivate(host);
        self.index = None;
        self.total = host.count(self.iterable.as_ref());
        CursorEvent::Clear
    }

    /// Re-derive position and total after the available highlights changed.
    ///
    /// The cursor follows its active highlight to that highlight's new ordinal. If
    /// the highlight is no longer available it is deactivated and the cursor clears.
    /// `None` when nothing observable changed.
    pub fn sync(&mut self, host: &mut impl CursorHost) -> Option<CursorEvent> {
        let previous = (self.index, self.total);
        self.total = host.count(self.iterable.as_ref());
        let Some(id) = self.active else {
            self.index = None;
            return (previous != (None, self.total)).then_some(CursorEvent::Clear);
        };
        match host.ordinal_of(id, self.iterable.as_ref()) {
            Some(index) => {
                self.index = Some(index);
                (previous != (Some(index), self.total)).then_some(CursorEvent::Update {
                    index,
                    total: self.total,
                })
            }
            None => {
                log::debug!("highlight {id} left the cursor's range");
                Some(self.clear(host))
            }
        }
    }

    pub fn next(&mut self, host: &mut impl CursorHost) -> Option<CursorEvent> {
        if self.total == 0 {
            return None;
        }
        let index = match self.index {
            Some(i) => (i + 1) % self.total,
            None => 0,
        };
        Some(self.set(host, index))
    }

    pub fn prev(&mut self, host: &mut impl CursorHost) -> Option<CursorEvent> {
        if self.total == 0 {
            return None;
        }
        let index = match self.index {
            Some(0) | None => self.total - 1,
            Some(i) => i - 1,
        };
        Some(self.set(host, index))
    }

    /// Move to `index`, activating the highlight it resolves to
    pub fn set(&mut self, host: &mut impl CursorHost, index: usize) -> CursorEvent {
        self.deactivate(host);
        match host.highlight_at(index, self.iterable.as_ref()) {
            Some(id) => {
                host.set_active(id, true);
                host.reveal(id);
                self.active = Some(id);
                self.index = Some(index);
                CursorEvent::Update {
                    index,
                    total: self.total,
                }
            }
            None => {
                log::debug!("cursor position {index} resolves to no highlight");
                self.index = None;
                CursorEvent::Clear
            }
        }
    }

    pub fn clear(&mut self, host: &mut impl CursorHost) -> CursorEvent {
        self.deactivate(host);
        self.index = None;
        CursorEvent::Clear
    }

    fn deactivate(&mut self, host: &mut impl CursorHost) {
        if let Some(previous) = self.active.take() {
            host.set_active(previous, false);
        }
    }
}
