//! Comment thread model anchored to marked text ranges.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque thread key. Embedded in the document as the `threadId` mark
/// attribute and looked up in the store; never a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
}

/// Who wrote a comment. Both fields are opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub id: ThreadId,
    /// Chronological, append-only. Never empty once the store hands it out.
    pub comments: Vec<Comment>,
    /// Selected text when the thread was created. Not re-synced on edits.
    pub anchor_text: String,
    #[serde(default)]
    pub resolved: bool,
}

impl CommentThread {
    pub(crate) fn new(id: ThreadId, anchor_text: String, first: Comment) -> Self {
        Self { id, comments: vec![first], anchor_text, resolved: false }
    }

    pub(crate) fn push(&mut self, comment: Comment) { self.comments.push(comment); }

    /// Returns true if this call flipped the flag.
    pub(crate) fn resolve(&mut self) -> bool {
        let changed = !self.resolved;
        self.resolved = true;
        changed
    }

    pub fn len(&self) -> usize { self.comments.len() }
    pub fn is_empty(&self) -> bool { self.comments.is_empty() }
}
