pub mod comments;
pub mod config;
pub mod doc;
pub mod error;
pub mod history;
pub mod import_export;
pub mod marks;
pub mod selection;
pub mod store;

use serde::Serialize;

use comments::{Author, CommentThread, ThreadId};
use config::{AmbiguityPolicy, SessionConfig};
use doc::Doc;
use error::{Result, ThreadmarkError};
use history::History;
use marks::{MarkEngine, RangeAttribution, RangeMarks, ThreadLookup};
use selection::{Anchor, SelectionRange};
use store::{ThreadSnapshot, ThreadStore};

/// What a comment action did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "threadId", rename_all = "camelCase")]
pub enum CommentOutcome {
    /// New thread created and its mark attached to the range.
    Created(ThreadId),
    /// Comment appended to the thread already marked at the range start.
    Appended(ThreadId),
}

impl CommentOutcome {
    pub fn thread_id(&self) -> &ThreadId {
        match self {
            CommentOutcome::Created(id) | CommentOutcome::Appended(id) => id,
        }
    }
}

/// One editing session: the text engine, the thread store that owns thread
/// content, and undo history for mark changes. The store is passed around by
/// reference from here rather than living in a global.
#[derive(Debug)]
pub struct CommentSession<E: MarkEngine + Clone = Doc> {
    pub engine: E,
    pub store: ThreadStore,
    pub history: History<E>,
    config: SessionConfig,
}

impl CommentSession<Doc> {
    pub fn new_empty() -> Self { Self::new(Doc::default(), ThreadStore::new(), SessionConfig::default()) }

    pub fn from_text(text: &str) -> Self { Self::new(Doc::from_text(text), ThreadStore::new(), SessionConfig::default()) }

    pub fn select(&mut self, range: SelectionRange) -> Result<()> { self.engine.set_selection(range) }

    pub fn to_html(&self) -> String { import_export::to_html(&self.engine, &self.store) }

    pub fn to_delta(&self) -> String {
        let v = import_export::to_delta(&self.engine);
        serde_json::to_string(&v).unwrap_or_else(|_| "{\"ops\":[]}".to_string())
    }

    pub fn load_delta(&mut self, delta_json: &str) -> Result<()> {
        let v: serde_json::Value = serde_json::from_str(delta_json)?;
        self.history.record_before_change(&self.engine);
        self.engine = import_export::from_delta(&v);
        Ok(())
    }

    /// Replace the document with parsed HTML; `data-thread-id` spans become marks.
    pub fn load_html(&mut self, html: &str) -> Result<()> {
        let doc = import_export::from_html(html)?;
        self.history.record_before_change(&self.engine);
        self.engine = doc;
        Ok(())
    }
}

impl<E: MarkEngine + Clone> CommentSession<E> {
    pub fn new(engine: E, store: ThreadStore, config: SessionConfig) -> Self {
        Self { engine, store, history: History::new(), config }
    }

    pub fn config(&self) -> &SessionConfig { &self.config }

    pub fn set_config(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn comment_on_selection(&mut self, text: &str, author: &Author) -> Result<CommentOutcome> {
        let range = self.engine.selection();
        self.comment_on_range(range, text, author)
    }

    /// Unmarked range: new thread plus mark. Range starting on a mark: append
    /// to that thread, no re-attach. Mixed ranges follow the ambiguity policy.
    pub fn comment_on_range(&mut self, range: SelectionRange, text: &str, author: &Author) -> Result<CommentOutcome> {
        let mut range = range;
        range.normalize();
        if range.is_collapsed() {
            return Err(ThreadmarkError::EmptySelection);
        }
        // A range across a block boundary can hold no characters at all.
        let covered: usize = self.engine.mark_segments(range)?.iter().map(|s| s.chars).sum();
        if covered == 0 {
            return Err(ThreadmarkError::EmptySelection);
        }
        let text = self.config.prepare(text)?;

        let target = match RangeAttribution::new(&mut self.engine).classify(range)? {
            RangeMarks::Unmarked => None,
            RangeMarks::Uniform { thread_id } => Some(thread_id),
            RangeMarks::Ambiguous { start, ids } => match self.config.ambiguity {
                AmbiguityPolicy::Reject => return Err(ThreadmarkError::AmbiguousSelection { ids }),
                AmbiguityPolicy::UseStart => start.id().cloned(),
            },
        };

        if let Some(id) = target {
            self.store.add_comment_to_thread(&id, text, &author.id, &author.name)?;
            return Ok(CommentOutcome::Appended(id));
        }

        let anchor_text = self.engine.range_text(range)?;
        let id = self.store.add_thread(&anchor_text, text, &author.id, &author.name)?;
        self.history.record_before_change(&self.engine);
        if let Err(e) = RangeAttribution::new(&mut self.engine).attach(range, &id) {
            self.history.discard_last();
            self.store.delete_thread(&id);
            return Err(e);
        }
        Ok(CommentOutcome::Created(id))
    }

    pub fn lookup(&self, at: Anchor) -> ThreadLookup { self.engine.thread_mark_at(at).into() }

    /// Mark to store by key lookup. `None` if unmarked or the thread is gone.
    pub fn thread_at(&self, at: Anchor) -> Option<&CommentThread> {
        self.engine.thread_mark_at(at).and_then(|id| self.store.get_thread(&id))
    }

    /// Detach the mark from `range` and mark the thread resolved. The store
    /// records the resolution even when detaching fails; that error is
    /// returned afterwards. Unknown ids fail before the document is touched.
    pub fn resolve_thread(&mut self, id: &ThreadId, range: SelectionRange) -> Result<()> {
        if !self.store.contains(id) {
            return Err(ThreadmarkError::not_found(id));
        }
        let detached = self.detach_recorded(range);
        self.store.resolve_thread(id)?;
        if let Err(e) = detached {
            tracing::warn!(thread = %id, error = %e, "thread resolved but its mark could not be detached");
            return Err(e);
        }
        Ok(())
    }

    /// Resolve the thread marked at the selection start and clear all of its
    /// marks. Returns the resolved id, or `None` when nothing is marked there.
    pub fn resolve_at_selection(&mut self) -> Result<Option<ThreadId>> {
        let Some(id) = self.engine.thread_mark_at(self.engine.selection().start) else {
            return Ok(None);
        };
        self.store.resolve_thread(&id)?;
        self.clear_marks(&id);
        Ok(Some(id))
    }

    /// Store-side only; marks carrying `id` stay in the document.
    pub fn delete_thread(&mut self, id: &ThreadId) { self.store.delete_thread(id); }

    pub fn delete_thread_and_marks(&mut self, id: &ThreadId) {
        self.clear_marks(id);
        self.store.delete_thread(id);
    }

    /// Only takes an undo snapshot when some of `range` is marked.
    fn detach_recorded(&mut self, range: SelectionRange) -> Result<()> {
        if self.engine.mark_segments(range)?.iter().all(|s| s.thread_id.is_none()) {
            return Ok(());
        }
        self.history.record_before_change(&self.engine);
        let detached = RangeAttribution::new(&mut self.engine).detach(range);
        if detached.is_err() {
            self.history.discard_last();
        }
        detached
    }

    fn clear_marks(&mut self, id: &ThreadId) {
        if !self.engine.thread_ids().contains(id) {
            return;
        }
        self.history.record_before_change(&self.engine);
        if !self.engine.unset_thread_everywhere(id) {
            self.history.discard_last();
        }
    }

    /// Ids marked in the document whose thread is missing or resolved.
    pub fn inconsistent_marks(&self) -> Vec<ThreadId> {
        self.engine
            .thread_ids()
            .into_iter()
            .filter(|id| self.store.get_thread(id).map_or(true, |t| t.resolved))
            .collect()
    }

    /// Undo the last mark change. Thread store state is not rewound.
    pub fn undo(&mut self) -> bool { self.history.undo(&mut self.engine) }
    pub fn redo(&mut self) -> bool { self.history.redo(&mut self.engine) }

    pub fn threads_json(&self) -> Result<String> { self.store.snapshot().to_json() }

    pub fn load_threads_json(&mut self, json: &str) -> Result<()> {
        let snapshot = ThreadSnapshot::from_json(json)?;
        self.store.load(snapshot.threads)
    }
}
