use std::collections::HashSet;

use crate::adapter::TreeAdapter;
use crate::address::{AddressError, AddressRange};
use crate::context::{HighlightContext, Options, QuerySet};
use crate::cursor::{Cursor, CursorHost};
use crate::dom::NodeId;
use crate::events::{EngineEvent, EventQueue};
use crate::finder::QuerySubject;
use crate::index::IndexError;
use crate::range::{Range, RangeError};
use crate::registry::{HighlightEntry, HighlightId};
use crate::render::{Pump, RenderError, RenderJob, Renderer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HighlightError {
    #[error("Unknown query set {0}")]
    UnknownQuerySet(String),
    #[error("Unknown highlight {0}")]
    UnknownHighlight(HighlightId),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// How a new query set starts out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySettings {
    pub enabled: bool,
    /// Highest number of highlights the set may hold
    pub reserve: Option<usize>,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            enabled: true,
            reserve: None,
        }
    }
}

/// Query-set highlighting over a tree
///
/// Owns the tree for its whole lifetime and keeps it in step with:
///
/// ## Text index
/// - Flattened text of every text node below `root`, one marker per node
/// - Maintained in place while highlights are wrapped, rebuilt after removals
///
/// ## Query sets and highlights
/// - `add`/`append` queue render jobs; nothing touches the tree until [`pump`]
/// - Highlight ids are unique for the life of the highlighter, starting at 1
/// - The registry keeps every highlight in document order for the cursor
///
/// ## Events
/// - Every visible effect is queued as an [`EngineEvent`]; read them with
///   [`drain_events`]
/// - The queue holds at most `Options::event_capacity` events. Hosts that never
///   drain lose the oldest ones, counted by [`EventQueue::dropped`]
///
/// ## Usage Pattern
///
/// ```rust
/// # use spanmark_engine::{Document, Highlighter, Options, QuerySettings, QuerySubject};
/// let doc = Document::parse_markup("<p>the cat the dog</p>").unwrap();
/// let root = doc.root();
/// let mut highlighter = Highlighter::new(doc, root, Options::default()).unwrap();
///
/// highlighter
///     .add("articles", vec![QuerySubject::from("the")], QuerySettings::default())
///     .unwrap();
/// highlighter.render_all().unwrap();
///
/// assert_eq!(highlighter.query_set("articles").unwrap().match_count, 2);
/// assert_eq!(highlighter.cursor_next(), Some(0));
/// # assert!(highlighter.tree().to_markup().contains("spanmark-active"));
/// ```
///
/// [`pump`]: Highlighter::pump
/// [`drain_events`]: Highlighter::drain_events
pub struct Highlighter<T: TreeAdapter> {
    ctx: HighlightContext<T>,
    renderer: Renderer,
    cursor: Cursor,
}

impl<T: TreeAdapter> Highlighter<T> {
    pub fn new(tree: T, root: NodeId, options: Options) -> Result<Self, HighlightError> {
        let renderer = Renderer::new(options.render_mode);
        let ctx = HighlightContext::new(tree, root, options)?;
        Ok(Highlighter {
            ctx,
            renderer,
            cursor: Cursor::new(),
        })
    }

    pub fn tree(&self) -> &T {
        &self.ctx.tree
    }

    pub fn into_tree(self) -> T {
        self.ctx.tree
    }

    pub fn root(&self) -> NodeId {
        self.ctx.root
    }

    pub fn options(&self) -> &Options {
        &self.ctx.options
    }

    /// Flattened text of the tree
    pub fn text(&self) -> &str {
        self.ctx.index.text()
    }

    /// Queue a job creating query set `name`
    pub fn add(
        &mut self,
        name: impl Into<String>,
        subjects: Vec<QuerySubject>,
        settings: QuerySettings,
    ) -> Result<(), HighlightError> {
        let job = RenderJob::add(name, subjects, settings.enabled, settings.reserve);
        self.renderer.enqueue(job)?;
        Ok(())
    }

    /// Queue a job adding subjects to an existing query set
    pub fn append(
        &mut self,
        name: &str,
        subjects: Vec<QuerySubject>,
    ) -> Result<(), HighlightError> {
        if self.ctx.query_set(name).is_none() && !self.renderer.is_pending(name) {
            return Err(HighlightError::UnknownQuerySet(name.to_string()));
        }
        self.renderer.enqueue(RenderJob::append(name, subjects))?;
        Ok(())
    }

    /// Remove query set `name` with its highlights, or cancel its queued job.
    /// `Ok(false)` when there was nothing to remove.
    pub fn remove(&mut self, name: &str) -> Result<bool, HighlightError> {
        let aborted = self.renderer.abort(name)?;
        if aborted {
            self.ctx.events.push(EngineEvent::JobAborted {
                query_set: name.to_string(),
            });
        }
        let removed = self.ctx.remove_query_set(name)?.is_some();
        if removed {
            self.sync_cursor();
        }
        Ok(aborted || removed)
    }

    pub fn enable(&mut self, name: &str) -> Result<(), HighlightError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&mut self, name: &str) -> Result<(), HighlightError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), HighlightError> {
        if !self.ctx.set_enabled(name, enabled) {
            return Err(HighlightError::UnknownQuerySet(name.to_string()));
        }
        log::debug!("query set {name} enabled={enabled}");
        self.sync_cursor();
        Ok(())
    }

    /// Cancel queued jobs and remove every query set. Fails while a job is running.
    pub fn clear(&mut self) -> Result<(), HighlightError> {
        if let Some(job) = self.renderer.running() {
            return Err(RenderError::InProgress(job.query_set().to_string()).into());
        }
        for name in self.renderer.abort_all() {
            self.ctx.events.push(EngineEvent::JobAborted { query_set: name });
        }
        let names: Vec<String> = self.ctx.query_sets.iter().map(|s| s.name.clone()).collect();
        for name in names {
            self.ctx.remove_query_set(&name)?;
        }
        let event = self.cursor.reset(&mut self.ctx);
        self.ctx.events.push(event);
        Ok(())
    }

    /// Enabled state of the query set owning highlight `id`
    pub fn get_state(&self, id: HighlightId) -> Option<bool> {
        let highlight = self.ctx.highlights.get(&id)?;
        self.ctx
            .query_set(&highlight.query_set)
            .map(|set| set.enabled)
    }

    pub fn query_set(&self, name: &str) -> Option<&QuerySet> {
        self.ctx.query_set(name)
    }

    /// Query sets in creation order
    pub fn query_sets(&self) -> &[QuerySet] {
        &self.ctx.query_sets
    }

    /// Every highlight in document order
    pub fn highlights(&self) -> &[HighlightEntry] {
        self.ctx.registry.entries()
    }

    /// One scheduling opportunity for the renderer
    pub fn pump(&mut self) -> Result<Pump, HighlightError> {
        let pump = self.renderer.pump(&mut self.ctx)?;
        self.sync_cursor();
        Ok(pump)
    }

    /// Pump until every queued job has completed
    pub fn render_all(&mut self) -> Result<(), HighlightError> {
        while self.pump()? == Pump::Yielded {}
        Ok(())
    }

    pub fn is_idle(&self) -> bool {
        self.renderer.is_idle()
    }

    /// Advance the cursor, returning the new position
    pub fn cursor_next(&mut self) -> Option<usize> {
        let event = self.cursor.next(&mut self.ctx)?;
        self.ctx.events.push(event);
        self.cursor.index()
    }

    pub fn cursor_prev(&mut self) -> Option<usize> {
        let event = self.cursor.prev(&mut self.ctx)?;
        self.ctx.events.push(event);
        self.cursor.index()
    }

    pub fn cursor_set(&mut self, index: usize) -> Option<HighlightId> {
        let event = self.cursor.set(&mut self.ctx, index);
        self.ctx.events.push(event);
        self.cursor.active()
    }

    pub fn cursor_clear(&mut self) {
        let event = self.cursor.clear(&mut self.ctx);
        self.ctx.events.push(event);
    }

    /// Restrict the cursor to the named query sets (`None` for all of them)
    pub fn set_iterable_queries<I, S>(&mut self, names: Option<I>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Option<HashSet<String>> =
            names.map(|n| n.into_iter().map(Into::into).collect());
        let event = self.cursor.set_iterable_queries(&mut self.ctx, names);
        self.ctx.events.push(event);
    }

    pub fn cursor_position(&self) -> Option<usize> {
        self.cursor.index()
    }

    pub fn cursor_total(&self) -> usize {
        self.cursor.total()
    }

    pub fn active_highlight(&self) -> Option<HighlightId> {
        self.cursor.active()
    }

    /// The highlight the cursor would land on at `ordinal`
    pub fn highlight_at(&self, ordinal: usize) -> Option<HighlightId> {
        self.ctx.highlight_at(ordinal, self.cursor.iterable())
    }

    /// Mutation-independent address of a highlight
    pub fn address_of_highlight(&self, id: HighlightId) -> Result<AddressRange, HighlightError> {
        let highlight = self
            .ctx
            .highlights
            .get(&id)
            .ok_or(HighlightError::UnknownHighlight(id))?;
        let range = Range::from_offsets(
            &self.ctx.index,
            highlight.offset,
            highlight.offset + highlight.len - 1,
        )?;
        Ok(range.compute_address(&self.ctx.index, &self.ctx.tree, self.ctx.root)?)
    }

    pub fn highlight_text(&self, id: HighlightId) -> Option<String> {
        self.ctx.highlight_text(id)
    }

    /// Address range of a selection given as text node positions, `end_offset`
    /// exclusive
    pub fn range_from_selection(
        &self,
        start_node: NodeId,
        start_offset: usize,
        end_node: NodeId,
        end_offset: usize,
    ) -> Result<AddressRange, HighlightError> {
        let index = &self.ctx.index;
        let global = |node: NodeId, offset: usize| -> Result<usize, HighlightError> {
            let marker = index.find(node, 0).ok_or(IndexError::NotText(node))?;
            Ok(index.at(marker)?.offset + offset)
        };
        let start = global(start_node, start_offset)?;
        let end = global(end_node, end_offset)?;
        if start >= end {
            return Err(RangeError::Invalid(format!("empty selection [{start}, {end})")).into());
        }
        let range = Range::from_offsets(index, start, end - 1)?;
        Ok(range.compute_address(index, &self.ctx.tree, self.ctx.root)?)
    }

    /// Rebuild the text index after the tree changed outside the highlighter
    pub fn refresh(&mut self) -> Result<(), HighlightError> {
        self.ctx.index.refresh(&self.ctx.tree, self.ctx.root)?;
        self.ctx.events.push(EngineEvent::Refresh);
        Ok(())
    }

    /// Verify index and registry invariants
    pub fn check(&self) -> Result<(), HighlightError> {
        Ok(self.ctx.check()?)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.ctx.events.drain()
    }

    pub fn events(&self) -> &EventQueue {
        &self.ctx.events
    }

    fn sync_cursor(&mut self) {
        if let Some(event) = self.cursor.sync(&mut self.ctx) {
            self.ctx.events.push(event);
        }
    }
}
