//! Renderer - single-flight FIFO queue of query set jobs
//!
//! Each job drives the finders of one query set and wraps every hit. Jobs are
//! resumable: in time-sliced mode [`Renderer::pump`] returns [`Pump::Yielded`]
//! after a hit once the slice has elapsed, keeping the live finder and counts in
//! the job, and the host calls `pump` again when it sees fit.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::adapter::TreeAdapter;
use crate::context::HighlightContext;
use crate::events::EngineEvent;
use crate::finder::{Finder, QuerySubject, build_finder};
use crate::index::IndexError;
use crate::range::RangeError;
use crate::registry::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("A job for query set {0} is already queued or running")]
    Duplicate(String),
    #[error("Query set {0} is being rendered")]
    InProgress(String),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Yield after a hit once `slice` has elapsed since the pump began
    TimeSliced { slice: Duration },
    RunToCompletion,
}

/// Outcome of one scheduling opportunity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// Work remains; call again
    Yielded,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Create the query set; aborted if it already exists when the job begins
    Add,
    /// Extend an existing query set
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Running,
}

enum Step {
    Hit,
    Done,
}

pub struct RenderJob {
    query_set: String,
    kind: JobKind,
    subjects: VecDeque<QuerySubject>,
    enabled: bool,
    reserve: Option<usize>,
    phase: Phase,
    finder: Option<Box<dyn Finder>>,
    count: usize,
    reserve_reported: bool,
}

impl RenderJob {
    pub fn add(
        query_set: impl Into<String>,
        subjects: Vec<QuerySubject>,
        enabled: bool,
        reserve: Option<usize>,
    ) -> Self {
        Self::new(query_set.into(), JobKind::Add, subjects, enabled, reserve)
    }

    pub fn append(query_set: impl Into<String>, subjects: Vec<QuerySubject>) -> Self {
        Self::new(query_set.into(), JobKind::Append, subjects, true, None)
    }

    fn new(
        query_set: String,
        kind: JobKind,
        subjects: Vec<QuerySubject>,
        enabled: bool,
        reserve: Option<usize>,
    ) -> Self {
        RenderJob {
            query_set,
            kind,
            subjects: subjects.into(),
            enabled,
            reserve,
            phase: Phase::Init,
            finder: None,
            count: 0,
            reserve_reported: false,
        }
    }

    pub fn query_set(&self) -> &str {
        &self.query_set
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Hits wrapped by this job so far
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Move from init to running; `false` means the job must be aborted
    fn begin<T: TreeAdapter>(&mut self, ctx: &mut HighlightContext<T>) -> bool {
        let existing_reserve = ctx.query_set(&self.query_set).map(|set| set.reserve);
        match (self.kind, existing_reserve) {
            (JobKind::Add, Some(_)) => {
                log::debug!("query set {} already exists, aborting add", self.query_set);
                return false;
            }
            (JobKind::Add, None) => {
                ctx.create_query_set(&self.query_set, self.enabled, self.reserve);
            }
            (JobKind::Append, Some(reserve)) => {
                self.reserve = reserve;
            }
            (JobKind::Append, None) => {
                log::debug!("query set {} is gone, aborting append", self.query_set);
                return false;
            }
        }
        log::debug!(
            "rendering {} ({} subjects)",
            self.query_set,
            self.subjects.len()
        );
        self.phase = Phase::Running;
        true
    }

    /// Advance to the next wrapped hit, or report the job exhausted
    fn step<T: TreeAdapter>(&mut self, ctx: &mut HighlightContext<T>) -> Result<Step, RenderError> {
        loop {
            if self.finder.is_none() {
                let Some(subject) = self.subjects.pop_front() else {
                    return Ok(Step::Done);
                };
                match build_finder(&subject, &ctx.index, &ctx.tree, ctx.root) {
                    Ok(finder) => self.finder = Some(finder),
                    Err(e) => {
                        log::warn!("rejected subject {subject:?} of {}: {e}", self.query_set);
                        ctx.events.push(EngineEvent::SubjectRejected {
                            query_set: self.query_set.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }

            let Some(range) = self.finder.as_mut().and_then(|f| f.next(&ctx.index)) else {
                self.finder = None;
                continue;
            };

            let matched = ctx
                .query_set(&self.query_set)
                .map_or(0, |set| set.match_count);
            if let Some(reserve) = self.reserve
                && matched >= reserve
            {
                if !self.reserve_reported {
                    log::warn!("query set {} reached its reserve of {reserve}", self.query_set);
                    ctx.events.push(EngineEvent::ReserveExceeded {
                        query_set: self.query_set.clone(),
                        reserve,
                    });
                    self.reserve_reported = true;
                }
                self.finder = None;
                continue;
            }

            ctx.highlight(&self.query_set, range)?;
            self.count += 1;
            return Ok(Step::Hit);
        }
    }

    fn finish<T: TreeAdapter>(self, ctx: &mut HighlightContext<T>) -> Result<(), RenderError> {
        let count = ctx
            .query_set(&self.query_set)
            .map_or(self.count, |set| set.match_count);
        log::debug!("rendered {}: {count} highlights", self.query_set);
        if ctx.options.debug_checks {
            ctx.check()?;
        }
        ctx.events.push(EngineEvent::RenderCompleted {
            query_set: self.query_set,
            count,
        });
        Ok(())
    }
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderJob")
            .field("query_set", &self.query_set)
            .field("kind", &self.kind)
            .field("subjects", &self.subjects.len())
            .field("phase", &self.phase)
            .field("count", &self.count)
            .finish()
    }
}

#[derive(Debug)]
pub struct Renderer {
    queue: VecDeque<RenderJob>,
    mode: RenderMode,
}

impl Renderer {
    pub fn new(mode: RenderMode) -> Self {
        Renderer {
            queue: VecDeque::new(),
            mode,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Names of queued jobs, the active one first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(RenderJob::query_set)
    }

    pub fn is_pending(&self, query_set: &str) -> bool {
        self.pending().any(|name| name == query_set)
    }

    /// The job currently being processed, if it has begun
    pub fn running(&self) -> Option<&RenderJob> {
        self.queue.front().filter(|job| job.is_running())
    }

    pub fn enqueue(&mut self, job: RenderJob) -> Result<(), RenderError> {
        if self.is_pending(&job.query_set) {
            return Err(RenderError::Duplicate(job.query_set));
        }
        log::debug!("queued {:?} job for {}", job.kind, job.query_set);
        self.queue.push_back(job);
        Ok(())
    }

    /// Cancel a job that has not begun. `Ok(false)` if no job targets `query_set`.
    pub fn abort(&mut self, query_set: &str) -> Result<bool, RenderError> {
        let Some(position) = self.queue.iter().position(|j| j.query_set == query_set) else {
            return Ok(false);
        };
        if self.queue[position].is_running() {
            return Err(RenderError::InProgress(query_set.to_string()));
        }
        self.queue.remove(position);
        log::debug!("aborted job for {query_set}");
        Ok(true)
    }

    /// Drop every job that has not begun, returning their query set names
    pub fn abort_all(&mut self) -> Vec<String> {
        let (running, waiting): (VecDeque<_>, VecDeque<_>) =
            self.queue.drain(..).partition(RenderJob::is_running);
        self.queue = running;
        waiting.into_iter().map(|job| job.query_set).collect()
    }

    /// Process queued jobs until idle or, when time-sliced, the slice runs out
    pub fn pump<T: TreeAdapter>(
        &mut self,
        ctx: &mut HighlightContext<T>,
    ) -> Result<Pump, RenderError> {
        let started = Instant::now();
        loop {
            let Some(job) = self.queue.front_mut() else {
                return Ok(Pump::Idle);
            };

            if job.phase == Phase::Init && !job.begin(ctx) {
                if let Some(job) = self.queue.pop_front() {
                    ctx.events.push(EngineEvent::JobAborted {
                        query_set: job.query_set,
                    });
                }
                continue;
            }

            match job.step(ctx)? {
                Step::Hit => {
                    if let RenderMode::TimeSliced { slice } = self.mode
                        && started.elapsed() >= slice
                    {
                        return Ok(Pump::Yielded);
                    }
                }
                Step::Done => {
                    if let Some(job) = self.queue.pop_front() {
                        job.finish(ctx)?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Options;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    fn context(markup: &str) -> HighlightContext<Document> {
        let doc = Document::parse_markup(markup).unwrap();
        let root = doc.root();
        HighlightContext::new(doc, root, Options::default()).unwrap()
    }

    fn literal(text: &str) -> Vec<QuerySubject> {
        vec![QuerySubject::from(text)]
    }

    fn completions(ctx: &mut HighlightContext<Document>) -> Vec<(String, usize)> {
        ctx.events
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::RenderCompleted { query_set, count } => Some((query_set, count)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_enqueue_rejects_duplicates() {
        let mut renderer = Renderer::new(RenderMode::RunToCompletion);
        renderer.enqueue(RenderJob::add("a", literal("x"), true, None)).unwrap();
        let err = renderer
            .enqueue(RenderJob::append("a", literal("y")))
            .unwrap_err();
        assert_eq!(err, RenderError::Duplicate("a".to_string()));
    }

    #[test]
    fn test_run_to_completion_processes_fifo() {
        let mut ctx = context("<p>aa bbb</p>");
        let mut renderer = Renderer::new(RenderMode::RunToCompletion);
        renderer.enqueue(RenderJob::add("b", literal("b"), true, None)).unwrap();
        renderer.enqueue(RenderJob::add("a", literal("a"), true, None)).unwrap();

        assert_eq!(renderer.pump(&mut ctx).unwrap(), Pump::Idle);
        assert_eq!(
            completions(&mut ctx),
            vec![("b".to_string(), 3), ("a".to_string(), 2)]
        );
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_zero_slice_yields_after_every_hit() {
        let mut ctx = context("<p>x x x</p>");
        let mut renderer = Renderer::new(RenderMode::TimeSliced {
            slice: Duration::ZERO,
        });
        renderer.enqueue(RenderJob::add("x", literal("x"), true, None)).unwrap();

        let mut yields = 0;
        while renderer.pump(&mut ctx).unwrap() == Pump::Yielded {
            yields += 1;
            assert!(renderer.running().is_some());
        }
        assert_eq!(yields, 3);
        assert_eq!(ctx.query_set("x").unwrap().match_count, 3);
    }

    #[test]
    fn test_add_for_existing_query_set_is_aborted() {
        let mut ctx = context("<p>x</p>");
        let mut renderer = Renderer::new(RenderMode::RunToCompletion);
        renderer.enqueue(RenderJob::add("x", literal("x"), true, None)).unwrap();
        renderer.pump(&mut ctx).unwrap();
        ctx.events.drain();

        renderer.enqueue(RenderJob::add("x", literal("x"), true, None)).unwrap();
        renderer.pump(&mut ctx).unwrap();
        assert_eq!(
            ctx.events.drain(),
            vec![EngineEvent::JobAborted {
                query_set: "x".to_string()
            }]
        );
        assert_eq!(ctx.query_set("x").unwrap().match_count, 1);
    }

    #[test]
    fn test_abort_before_start_and_in_progress() {
        let mut ctx = context("<p>x x</p>");
        let mut renderer = Renderer::new(RenderMode::TimeSliced {
            slice: Duration::ZERO,
        });
        renderer.enqueue(RenderJob::add("a", literal("x"), true, None)).unwrap();
        renderer.enqueue(RenderJob::add("b", literal("x"), true, None)).unwrap();
        assert_eq!(renderer.pump(&mut ctx).unwrap(), Pump::Yielded);

        assert_eq!(
            renderer.abort("a"),
            Err(RenderError::InProgress("a".to_string()))
        );
        assert_eq!(renderer.abort("b"), Ok(true));
        assert_eq!(renderer.abort("missing"), Ok(false));
        assert_eq!(renderer.pending().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_append_uses_existing_reserve() {
        let mut ctx = context("<p>x x x y y</p>");
        let mut renderer = Renderer::new(RenderMode::RunToCompletion);
        renderer.enqueue(RenderJob::add("s", literal("x"), true, Some(4))).unwrap();
        renderer.pump(&mut ctx).unwrap();
        renderer.enqueue(RenderJob::append("s", literal("y"))).unwrap();
        renderer.pump(&mut ctx).unwrap();

        let events = ctx.events.drain();
        assert_eq!(ctx.query_set("s").unwrap().match_count, 4);
        assert!(events.contains(&EngineEvent::ReserveExceeded {
            query_set: "s".to_string(),
            reserve: 4
        }));
    }

    #[test]
    fn test_invalid_subject_does_not_stop_the_job() {
        use crate::address::{AddressPoint, AddressRange};

        let mut ctx = context("<p>abc abc</p>");
        let mut renderer = Renderer::new(RenderMode::RunToCompletion);
        let backwards = AddressRange {
            start: AddressPoint::new("/p[1]/text()[1]", 3),
            end: AddressPoint::new("/p[1]/text()[1]", 1),
        };
        let subjects = vec![QuerySubject::Range(backwards), QuerySubject::from("abc")];
        renderer.enqueue(RenderJob::add("s", subjects, true, None)).unwrap();
        renderer.pump(&mut ctx).unwrap();

        let events = ctx.events.drain();
        assert!(matches!(events[0], EngineEvent::SubjectRejected { .. }));
        assert_eq!(ctx.query_set("s").unwrap().match_count, 2);
    }
}
