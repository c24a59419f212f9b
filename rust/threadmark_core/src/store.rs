//! In-memory registry of comment threads, owned by a single editing session.

use std::collections::HashSet;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::comments::{Comment, CommentId, CommentThread, ThreadId};
use crate::error::{Result, ThreadmarkError};

/// Draws before the store gives up on an injected source and falls back to UUIDs.
const MAX_ID_DRAWS: usize = 16;

/// Mints raw identifiers for threads and comments.
pub trait IdSource: Send {
    fn next_id(&mut self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&mut self) -> String { Uuid::new_v4().to_string() }
}

type Listener = Box<dyn FnMut(&[CommentThread]) + Send>;

/// Persisted layout: `{ "threads": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    #[serde(default)]
    pub threads: Vec<CommentThread>,
}

impl ThreadSnapshot {
    pub fn from_json(json: &str) -> Result<Self> { Ok(serde_json::from_str(json)?) }
    pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string(self)?) }
}

pub struct ThreadStore {
    /// Creation order.
    threads: Vec<CommentThread>,
    /// Every thread id this store has issued or been seeded with, deleted or not.
    retired: HashSet<ThreadId>,
    ids: Box<dyn IdSource>,
    listeners: Vec<Listener>,
}

impl fmt::Debug for ThreadStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadStore")
            .field("threads", &self.threads)
            .field("retired", &self.retired.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for ThreadStore {
    fn default() -> Self { Self::new() }
}

impl ThreadStore {
    pub fn new() -> Self { Self::with_id_source(UuidSource) }

    pub fn with_id_source(ids: impl IdSource + 'static) -> Self {
        Self { threads: Vec::new(), retired: HashSet::new(), ids: Box::new(ids), listeners: Vec::new() }
    }

    /// Seed from persisted threads. Seeded ids are retired up front so fresh
    /// threads can never collide with them.
    pub fn with_threads(threads: Vec<CommentThread>) -> Result<Self> {
        let mut store = Self::new();
        store.load(threads)?;
        Ok(store)
    }

    pub fn from_snapshot(snapshot: ThreadSnapshot) -> Result<Self> { Self::with_threads(snapshot.threads) }

    pub fn snapshot(&self) -> ThreadSnapshot { ThreadSnapshot { threads: self.threads.clone() } }

    /// Replace the contents with persisted threads, keeping the id source,
    /// listeners and previously retired ids.
    pub fn load(&mut self, threads: Vec<CommentThread>) -> Result<()> {
        let mut seen = HashSet::new();
        for t in &threads {
            if t.is_empty() {
                return Err(ThreadmarkError::InvalidSnapshot(format!("thread {} has no comments", t.id)));
            }
            if !seen.insert(t.id.clone()) {
                return Err(ThreadmarkError::InvalidSnapshot(format!("duplicate thread id {}", t.id)));
            }
        }
        self.retired.extend(seen);
        self.threads = threads;
        tracing::info!(threads = self.threads.len(), "loaded comment threads");
        self.notify();
        Ok(())
    }

    /// Register a callback that receives every thread after each effective mutation.
    pub fn subscribe(&mut self, listener: impl FnMut(&[CommentThread]) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn add_thread(&mut self, anchor_text: &str, comment_text: &str, author_id: &str, author_name: &str) -> Result<ThreadId> {
        validate_text(comment_text)?;
        let id = self.mint_thread_id();
        let first = self.new_comment(comment_text, author_id, author_name);
        self.threads.push(CommentThread::new(id.clone(), anchor_text.to_string(), first));
        tracing::debug!(thread = %id, "created comment thread");
        self.notify();
        Ok(id)
    }

    pub fn add_comment_to_thread(&mut self, thread_id: &ThreadId, comment_text: &str, author_id: &str, author_name: &str) -> Result<()> {
        let idx = self.position(thread_id).ok_or_else(|| ThreadmarkError::not_found(thread_id))?;
        validate_text(comment_text)?;
        let comment = self.new_comment(comment_text, author_id, author_name);
        self.threads[idx].push(comment);
        tracing::debug!(thread = %thread_id, count = self.threads[idx].len(), "appended comment");
        self.notify();
        Ok(())
    }

    pub fn get_thread(&self, thread_id: &ThreadId) -> Option<&CommentThread> {
        self.threads.iter().find(|t| &t.id == thread_id)
    }

    /// Idempotent: resolving an already-resolved thread is a silent no-op.
    pub fn resolve_thread(&mut self, thread_id: &ThreadId) -> Result<()> {
        let idx = self.position(thread_id).ok_or_else(|| ThreadmarkError::not_found(thread_id))?;
        if self.threads[idx].resolve() {
            tracing::debug!(thread = %thread_id, "resolved thread");
            self.notify();
        }
        Ok(())
    }

    /// Idempotent. Does not touch document marks; the id stays retired.
    pub fn delete_thread(&mut self, thread_id: &ThreadId) {
        if let Some(idx) = self.position(thread_id) {
            self.threads.remove(idx);
            tracing::debug!(thread = %thread_id, "deleted thread");
            self.notify();
        }
    }

    pub fn get_comment_count(&self, thread_id: &ThreadId) -> usize {
        self.get_thread(thread_id).map_or(0, CommentThread::len)
    }

    /// Snapshot in creation order.
    pub fn get_all_threads(&self) -> Vec<CommentThread> { self.threads.clone() }

    pub fn unresolved_threads(&self) -> impl Iterator<Item = &CommentThread> {
        self.threads.iter().filter(|t| !t.resolved)
    }

    pub fn contains(&self, thread_id: &ThreadId) -> bool { self.position(thread_id).is_some() }

    pub fn len(&self) -> usize { self.threads.len() }
    pub fn is_empty(&self) -> bool { self.threads.is_empty() }

    fn position(&self, thread_id: &ThreadId) -> Option<usize> {
        self.threads.iter().position(|t| &t.id == thread_id)
    }

    fn mint_thread_id(&mut self) -> ThreadId {
        for _ in 0..MAX_ID_DRAWS {
            let id = ThreadId::new(self.ids.next_id());
            if self.retired.insert(id.clone()) {
                return id;
            }
            tracing::warn!(thread = %id, "id source returned a retired thread id, drawing again");
        }
        loop {
            let id = ThreadId::new(UuidSource.next_id());
            if self.retired.insert(id.clone()) {
                return id;
            }
        }
    }

    fn new_comment(&mut self, text: &str, author_id: &str, author_name: &str) -> Comment {
        Comment {
            id: CommentId::new(self.ids.next_id()),
            text: text.to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            created_at: Utc::now(),
        }
    }

    fn notify(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener(&self.threads);
        }
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ThreadmarkError::blank_comment());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Counter-based ids, optionally replaying a fixed prefix first.
    struct SeqSource {
        replay: Vec<String>,
        next: u32,
    }

    impl IdSource for SeqSource {
        fn next_id(&mut self) -> String {
            if !self.replay.is_empty() {
                return self.replay.remove(0);
            }
            self.next += 1;
            format!("id-{}", self.next)
        }
    }

    fn seq() -> SeqSource { SeqSource { replay: Vec::new(), next: 0 } }

    #[test]
    fn add_thread_creates_single_unresolved_comment() {
        let mut store = ThreadStore::new();
        let id = store.add_thread("hello", "nice point", "u1", "Alice").unwrap();
        let t = store.get_thread(&id).unwrap();
        assert_eq!(t.comments.len(), 1);
        assert_eq!(t.anchor_text, "hello");
        assert_eq!(t.comments[0].author_name, "Alice");
        assert!(!t.resolved);
    }

    #[test]
    fn blank_comment_is_rejected_without_side_effects() {
        let mut store = ThreadStore::new();
        assert!(matches!(store.add_thread("a", "   ", "u1", "A"), Err(ThreadmarkError::InvalidCommentText { .. })));
        assert!(store.is_empty());

        let id = store.add_thread("a", "first", "u1", "A").unwrap();
        assert!(matches!(store.add_comment_to_thread(&id, "\n\t", "u1", "A"), Err(ThreadmarkError::InvalidCommentText { .. })));
        assert_eq!(store.get_comment_count(&id), 1);
    }

    #[test]
    fn append_preserves_order_and_state() {
        let mut store = ThreadStore::new();
        let id = store.add_thread("anchor", "one", "u1", "A").unwrap();
        store.resolve_thread(&id).unwrap();
        store.add_comment_to_thread(&id, "two", "u2", "B").unwrap();
        store.add_comment_to_thread(&id, "three", "u1", "A").unwrap();
        let t = store.get_thread(&id).unwrap();
        let texts: Vec<_> = t.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["one", "two", "three"]);
        assert!(t.resolved);
        assert_eq!(t.anchor_text, "anchor");
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut store = ThreadStore::new();
        let id = store.add_thread("a", "x", "u1", "A").unwrap();
        store.resolve_thread(&id).unwrap();
        let once = store.get_thread(&id).cloned();
        store.resolve_thread(&id).unwrap();
        assert_eq!(store.get_thread(&id).cloned(), once);
    }

    #[test]
    fn deleted_thread_is_gone_for_every_operation() {
        let mut store = ThreadStore::new();
        let id = store.add_thread("a", "x", "u1", "A").unwrap();
        store.delete_thread(&id);
        store.delete_thread(&id);
        assert!(store.get_thread(&id).is_none());
        assert_eq!(store.get_comment_count(&id), 0);
        assert!(matches!(store.add_comment_to_thread(&id, "y", "u1", "A"), Err(ThreadmarkError::ThreadNotFound { .. })));
        assert!(matches!(store.resolve_thread(&id), Err(ThreadmarkError::ThreadNotFound { .. })));
    }

    #[test]
    fn deleted_ids_are_never_reissued() {
        // Source replays "dup" after it was used and deleted.
        let mut store = ThreadStore::with_id_source(SeqSource { replay: vec!["dup".into(), "c1".into(), "dup".into()], next: 0 });
        let first = store.add_thread("a", "x", "u1", "A").unwrap();
        assert_eq!(first.as_str(), "dup");
        store.delete_thread(&first);
        let second = store.add_thread("b", "y", "u1", "A").unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn seeded_ids_are_retired() {
        let mut seed = ThreadStore::with_id_source(seq());
        let id = seed.add_thread("a", "x", "u1", "A").unwrap();
        let mut store = ThreadStore::with_threads(seed.get_all_threads()).unwrap();
        store.ids = Box::new(seq());
        let fresh = store.add_thread("b", "y", "u1", "A").unwrap();
        assert_ne!(fresh, id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn seeding_rejects_duplicates_and_empty_threads() {
        let mut store = ThreadStore::new();
        store.add_thread("a", "x", "u1", "A").unwrap();
        let t = store.get_all_threads().remove(0);
        assert!(matches!(ThreadStore::with_threads(vec![t.clone(), t.clone()]), Err(ThreadmarkError::InvalidSnapshot(_))));

        let mut empty = t;
        empty.comments.clear();
        assert!(matches!(ThreadStore::with_threads(vec![empty]), Err(ThreadmarkError::InvalidSnapshot(_))));
    }

    #[test]
    fn listeners_fire_once_per_effective_mutation() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let mut store = ThreadStore::new();
        store.subscribe(move |threads| sink.lock().unwrap().push(threads.len()));

        let id = store.add_thread("a", "x", "u1", "A").unwrap();
        store.add_comment_to_thread(&id, "y", "u1", "A").unwrap();
        store.resolve_thread(&id).unwrap();
        store.resolve_thread(&id).unwrap();
        store.delete_thread(&id);
        store.delete_thread(&id);
        let _ = store.add_thread("a", "", "u1", "A");

        assert_eq!(*calls.lock().unwrap(), vec![1, 1, 1, 0]);
    }

    #[test]
    fn store_is_shareable_behind_a_mutex() {
        fn assert_send<T: Send>() {}
        assert_send::<ThreadStore>();

        let shared = Arc::new(Mutex::new(ThreadStore::new()));
        let id = shared.lock().unwrap().add_thread("a", "first", "u1", "A").unwrap();
        thread::scope(|scope| {
            for i in 0..4 {
                let shared = Arc::clone(&shared);
                let id = id.clone();
                scope.spawn(move || {
                    shared.lock().unwrap().add_comment_to_thread(&id, &format!("reply {i}"), "u2", "B").unwrap();
                });
            }
        });
        assert_eq!(shared.lock().unwrap().get_comment_count(&id), 5);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut store = ThreadStore::new();
        let id = store.add_thread("hello", "nice point", "u1", "Alice").unwrap();
        store.add_comment_to_thread(&id, "agreed", "u2", "Bob").unwrap();
        store.resolve_thread(&id).unwrap();

        let json = store.snapshot().to_json().unwrap();
        let restored = ThreadStore::from_snapshot(ThreadSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.get_all_threads(), store.get_all_threads());
    }

    #[test]
    fn unresolved_filters_resolved_threads() {
        let mut store = ThreadStore::new();
        let a = store.add_thread("a", "x", "u1", "A").unwrap();
        let b = store.add_thread("b", "y", "u1", "A").unwrap();
        store.resolve_thread(&a).unwrap();
        let open: Vec<_> = store.unresolved_threads().map(|t| t.id.clone()).collect();
        assert_eq!(open, vec![b]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn issued_ids_are_unique(n in 1..64usize) {
                let mut store = ThreadStore::new();
                let mut seen = HashSet::new();
                for i in 0..n {
                    let id = store.add_thread("a", &format!("c{i}"), "u", "U").unwrap();
                    prop_assert!(seen.insert(id));
                }
            }

            #[test]
            fn each_append_adds_exactly_one(texts in proptest::collection::vec("[a-z]{1,8}", 0..32)) {
                let mut store = ThreadStore::new();
                let id = store.add_thread("a", "first", "u", "U").unwrap();
                for (i, text) in texts.iter().enumerate() {
                    store.add_comment_to_thread(&id, text, "u", "U").unwrap();
                    prop_assert_eq!(store.get_comment_count(&id), i + 2);
                }
                let t = store.get_thread(&id).unwrap();
                let got: Vec<_> = t.comments.iter().skip(1).map(|c| c.text.clone()).collect();
                prop_assert_eq!(got, texts);
            }
        }
    }
}
