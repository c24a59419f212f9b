//! Range attribution: binds thread ids to text spans through the text
//! engine's mark primitive, and reads them back.
//!
//! The document only ever holds the id; the store is the source of truth for
//! thread content. Keeping the two consistent is the caller's job.

use serde::Serialize;

use crate::comments::ThreadId;
use crate::error::Result;
use crate::selection::{Anchor, SelectionRange};

/// A run of characters inside a range sharing the same thread mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkSegment {
    pub thread_id: Option<ThreadId>,
    pub chars: usize,
}

/// Text-engine boundary. All calls are synchronous.
pub trait MarkEngine {
    fn selection(&self) -> SelectionRange;

    /// Mark every position in `range`, replacing any previous thread id.
    fn set_thread_mark(&mut self, range: SelectionRange, id: &ThreadId) -> Result<()>;

    /// Mark on the character right after `at`; none at block end or out of range.
    fn thread_mark_at(&self, at: Anchor) -> Option<ThreadId>;

    fn unset_thread_mark(&mut self, range: SelectionRange) -> Result<()>;

    /// Remove every mark carrying `id`. Returns whether anything changed.
    fn unset_thread_everywhere(&mut self, id: &ThreadId) -> bool;

    fn mark_segments(&self, range: SelectionRange) -> Result<Vec<MarkSegment>>;

    fn range_text(&self, range: SelectionRange) -> Result<String>;

    /// Distinct thread ids present anywhere in the document.
    fn thread_ids(&self) -> Vec<ThreadId>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "threadId", rename_all = "camelCase")]
pub enum ThreadLookup {
    Found(ThreadId),
    Absent,
}

impl ThreadLookup {
    pub fn id(&self) -> Option<&ThreadId> {
        match self {
            ThreadLookup::Found(id) => Some(id),
            ThreadLookup::Absent => None,
        }
    }
}

impl From<Option<ThreadId>> for ThreadLookup {
    fn from(id: Option<ThreadId>) -> Self {
        id.map_or(ThreadLookup::Absent, ThreadLookup::Found)
    }
}

/// Result of `attach`. `Overwrote` is the advisory attachment conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Fresh,
    Overwrote { previous: Vec<ThreadId> },
}

/// How a range is covered by thread marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RangeMarks {
    Unmarked,
    Uniform {
        #[serde(rename = "threadId")]
        thread_id: ThreadId,
    },
    /// Mixed ids, or marked and unmarked positions together.
    Ambiguous { start: ThreadLookup, ids: Vec<ThreadId> },
}

pub struct RangeAttribution<'a, E: MarkEngine + ?Sized> {
    engine: &'a mut E,
}

impl<'a, E: MarkEngine + ?Sized> RangeAttribution<'a, E> {
    pub fn new(engine: &'a mut E) -> Self { Self { engine } }

    pub fn attach(&mut self, range: SelectionRange, id: &ThreadId) -> Result<Attachment> {
        let previous: Vec<ThreadId> = distinct_ids(&self.engine.mark_segments(range)?)
            .into_iter()
            .filter(|p| p != id)
            .collect();
        self.engine.set_thread_mark(range, id)?;
        if previous.is_empty() {
            return Ok(Attachment::Fresh);
        }
        tracing::warn!(thread = %id, ?previous, "attach replaced existing thread marks");
        Ok(Attachment::Overwrote { previous })
    }

    pub fn read_thread_id(&self, at: Anchor) -> ThreadLookup { self.engine.thread_mark_at(at).into() }

    /// No-op when nothing in `range` is marked.
    pub fn detach(&mut self, range: SelectionRange) -> Result<()> { self.engine.unset_thread_mark(range) }

    /// True when every position carries some thread mark; a collapsed range
    /// never does.
    pub fn is_marked(&self, range: SelectionRange) -> Result<bool> {
        let segs = self.engine.mark_segments(range)?;
        Ok(!segs.is_empty() && segs.iter().all(|s| s.thread_id.is_some()))
    }

    pub fn classify(&self, range: SelectionRange) -> Result<RangeMarks> {
        let mut range = range;
        range.normalize();
        let segs = self.engine.mark_segments(range)?;
        let ids = distinct_ids(&segs);
        let any_unmarked = segs.iter().any(|s| s.thread_id.is_none());
        if ids.is_empty() {
            return Ok(RangeMarks::Unmarked);
        }
        if ids.len() == 1 && !any_unmarked {
            return Ok(RangeMarks::Uniform { thread_id: ids[0].clone() });
        }
        Ok(RangeMarks::Ambiguous { start: self.read_thread_id(range.start), ids })
    }
}

fn distinct_ids(segs: &[MarkSegment]) -> Vec<ThreadId> {
    let mut ids: Vec<ThreadId> = Vec::new();
    for id in segs.iter().filter_map(|s| s.thread_id.as_ref()) {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}
