//! Engine state shared by the renderer, the cursor and the façade
//!
//! One [`HighlightContext`] per engine instance owns the tree, its text index, the
//! highlight registry, every query set and the rolling id/group counters.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::adapter::TreeAdapter;
use crate::cursor::CursorHost;
use crate::dom::NodeId;
use crate::events::{DEFAULT_EVENT_CAPACITY, EngineEvent, EventQueue};
use crate::index::{IndexError, TextIndex};
use crate::range::{Range, RangeError};
use crate::registry::{HighlightEntry, HighlightId, HighlightRegistry};
use crate::render::{RenderError, RenderMode};

pub const DEFAULT_GROUP_CLASS_PREFIX: &str = "spanmark-group";
pub const DEFAULT_ACTIVE_CLASS: &str = "spanmark-active";
pub const DEFAULT_DISABLED_CLASS: &str = "spanmark-disabled";
pub const DEFAULT_MAX_QUERY_GROUPS: usize = 10;
pub const DEFAULT_SLICE: Duration = Duration::from_millis(50);

/// Engine options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Group classes are `{prefix}-{group}`
    pub group_class_prefix: String,
    /// Query groups roll over to 0 after this many
    pub max_query_groups: usize,
    pub active_class: String,
    pub disabled_class: String,
    pub render_mode: RenderMode,
    /// Verify index and registry invariants after every job
    pub debug_checks: bool,
    /// Undrained events kept before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            group_class_prefix: DEFAULT_GROUP_CLASS_PREFIX.to_string(),
            max_query_groups: DEFAULT_MAX_QUERY_GROUPS,
            active_class: DEFAULT_ACTIVE_CLASS.to_string(),
            disabled_class: DEFAULT_DISABLED_CLASS.to_string(),
            render_mode: RenderMode::TimeSliced {
                slice: DEFAULT_SLICE,
            },
            debug_checks: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// A named group of search subjects and the highlights they produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySet {
    pub name: String,
    pub enabled: bool,
    pub query_group: usize,
    pub first_highlight_id: Option<HighlightId>,
    pub match_count: usize,
    pub reserve: Option<usize>,
    pub highlight_ids: Vec<HighlightId>,
}

impl QuerySet {
    pub(crate) fn new(
        name: &str,
        enabled: bool,
        query_group: usize,
        reserve: Option<usize>,
    ) -> Self {
        QuerySet {
            name: name.to_string(),
            enabled,
            query_group,
            first_highlight_id: None,
            match_count: 0,
            reserve,
            highlight_ids: Vec::new(),
        }
    }
}

/// One wrapped match
#[derive(Debug, Clone)]
pub(crate) struct Highlight {
    pub query_set: String,
    pub containers: Vec<NodeId>,
    /// Global offset of the first character
    pub offset: usize,
    pub len: usize,
}

pub struct HighlightContext<T: TreeAdapter> {
    pub(crate) tree: T,
    pub(crate) root: NodeId,
    pub(crate) index: TextIndex,
    pub(crate) registry: HighlightRegistry,
    /// In creation order
    pub(crate) query_sets: Vec<QuerySet>,
    pub(crate) highlights: HashMap<HighlightId, Highlight>,
    pub(crate) options: Options,
    pub(crate) events: EventQueue,
    next_highlight_id: u64,
    next_group: usize,
}

impl<T: TreeAdapter> HighlightContext<T> {
    pub fn new(tree: T, root: NodeId, options: Options) -> Result<Self, IndexError> {
        let index = TextIndex::build(&tree, root)?;
        Ok(HighlightContext {
            tree,
            root,
            index,
            registry: HighlightRegistry::new(),
            query_sets: Vec::new(),
            highlights: HashMap::new(),
            events: EventQueue::with_capacity(options.event_capacity),
            options,
            next_highlight_id: 1,
            next_group: 0,
        })
    }

    pub fn query_set(&self, name: &str) -> Option<&QuerySet> {
        self.query_sets.iter().find(|s| s.name == name)
    }

    pub(crate) fn query_set_mut(&mut self, name: &str) -> Option<&mut QuerySet> {
        self.query_sets.iter_mut().find(|s| s.name == name)
    }

    /// Create an empty query set with the next rolling group
    pub(crate) fn create_query_set(&mut self, name: &str, enabled: bool, reserve: Option<usize>) {
        let group = self.next_group;
        self.next_group = (self.next_group + 1) % self.options.max_query_groups.max(1);
        self.query_sets.push(QuerySet::new(name, enabled, group, reserve));
    }

    pub(crate) fn group_class(&self, group: usize) -> String {
        format!("{}-{group}", self.options.group_class_prefix)
    }

    /// Wrap `range` as a new highlight of `query_set`
    pub(crate) fn highlight(
        &mut self,
        query_set: &str,
        mut range: Range,
    ) -> Result<HighlightId, RangeError> {
        let Some(set) = self.query_set(query_set) else {
            return Err(RangeError::Invalid(format!("no query set {query_set}")));
        };
        let enabled = set.enabled;
        let mut classes = vec![self.group_class(set.query_group)];
        if !enabled {
            classes.push(self.options.disabled_class.clone());
        }

        let offset = range.start_offset(&self.index)?;
        let len = range.end_offset(&self.index)? - offset + 1;
        let containers = range.surround(&mut self.index, &mut self.tree, self.root, &classes)?;

        let id = HighlightId(self.next_highlight_id);
        self.next_highlight_id += 1;
        log::trace!("highlight {id} of {query_set} at {offset}+{len}");

        self.registry.add(query_set, id, offset);
        self.highlights.insert(
            id,
            Highlight {
                query_set: query_set.to_string(),
                containers,
                offset,
                len,
            },
        );
        if let Some(set) = self.query_set_mut(query_set) {
            set.first_highlight_id.get_or_insert(id);
            set.match_count += 1;
            set.highlight_ids.push(id);
        }
        self.events.push(EngineEvent::Highlight { id, enabled });
        Ok(id)
    }

    /// Toggle the disabled class on every highlight of `name`; `false` if unknown
    pub(crate) fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(set) = self.query_set_mut(name) else {
            return false;
        };
        set.enabled = enabled;
        let ids = set.highlight_ids.clone();
        for id in ids {
            let Some(highlight) = self.highlights.get(&id) else {
                continue;
            };
            for &container in &highlight.containers {
                if enabled {
                    self.tree.remove_class(container, &self.options.disabled_class);
                } else {
                    self.tree.add_class(container, &self.options.disabled_class);
                }
            }
            self.events.push(EngineEvent::Highlight { id, enabled });
        }
        true
    }

    /// Unwrap every highlight of `name`, normalize and rebuild the index.
    /// Returns the removed set, `None` if it did not exist.
    pub(crate) fn remove_query_set(&mut self, name: &str) -> Result<Option<QuerySet>, IndexError> {
        let Some(position) = self.query_sets.iter().position(|s| s.name == name) else {
            return Ok(None);
        };
        let set = self.query_sets.remove(position);
        self.registry.remove_all(name);

        let mut parents = Vec::new();
        for id in &set.highlight_ids {
            let Some(highlight) = self.highlights.remove(id) else {
                continue;
            };
            for container in highlight.containers {
                if let Some(parent) = self.tree.parent(container) {
                    parents.push(parent);
                }
                self.tree.unwrap(container);
            }
        }
        parents.sort_unstable();
        parents.dedup();
        for parent in parents {
            self.tree.normalize(parent);
        }
        self.index.refresh(&self.tree, self.root)?;

        for id in &set.highlight_ids {
            self.events.push(EngineEvent::Unhighlight { id: *id });
        }
        self.events.push(EngineEvent::Refresh);
        log::debug!("removed query set {name} ({} highlights)", set.match_count);
        Ok(Some(set))
    }

    /// Verify index contiguity and registry order/count
    pub fn check(&self) -> Result<(), RenderError> {
        self.index.check(&self.tree)?;
        let expected = self.query_sets.iter().map(|s| s.match_count).sum();
        self.registry.check(expected)?;
        Ok(())
    }

    pub(crate) fn highlight_text(&self, id: HighlightId) -> Option<String> {
        let highlight = self.highlights.get(&id)?;
        Some(
            self.index
                .text()
                .chars()
                .skip(highlight.offset)
                .take(highlight.len)
                .collect(),
        )
    }

    fn accepts(&self, entry: &HighlightEntry, iterable: Option<&HashSet<String>>) -> bool {
        let enabled = self.query_set(&entry.query_set).is_some_and(|s| s.enabled);
        let wanted = iterable.is_none_or(|names| names.contains(&entry.query_set));
        let visible = self
            .highlights
            .get(&entry.id)
            .and_then(|h| h.containers.first())
            .is_some_and(|&c| self.tree.is_visible(c));
        enabled && wanted && visible
    }
}

impl<T: TreeAdapter> CursorHost for HighlightContext<T> {
    fn count(&self, iterable: Option<&HashSet<String>>) -> usize {
        self.registry.count(&|e| self.accepts(e, iterable))
    }

    fn highlight_at(
        &self,
        ordinal: usize,
        iterable: Option<&HashSet<String>>,
    ) -> Option<HighlightId> {
        self.registry
            .find_ordinal(ordinal, &|e| self.accepts(e, iterable))
            .map(|e| e.id)
    }

    fn ordinal_of(&self, id: HighlightId, iterable: Option<&HashSet<String>>) -> Option<usize> {
        self.registry
            .ordinal_of(id, &|e| self.accepts(e, iterable))
    }

    fn set_active(&mut self, id: HighlightId, active: bool) {
        let Some(highlight) = self.highlights.get(&id) else {
            return;
        };
        for &container in &highlight.containers {
            if active {
                self.tree.add_class(container, &self.options.active_class);
            } else {
                self.tree.remove_class(container, &self.options.active_class);
            }
        }
    }

    fn reveal(&mut self, id: HighlightId) {
        if let Some(&container) = self.highlights.get(&id).and_then(|h| h.containers.first()) {
            self.tree.scroll_into_view(container);
        }
    }
}
