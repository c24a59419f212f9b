//! Error types for thread store, mark adapter and session operations.

use thiserror::Error;

use crate::comments::ThreadId;
use crate::selection::Anchor;

/// Errors surfaced to the immediate caller. None of them are fatal; the UI
/// decides whether to re-prompt, show an inline message, or ignore.
#[derive(Debug, Error)]
pub enum ThreadmarkError {
    /// Comment body was empty, whitespace-only, or over the configured limit.
    #[error("invalid comment text: {reason}")]
    InvalidCommentText { reason: String },

    /// The referenced thread was deleted or never existed.
    #[error("thread not found: {id}")]
    ThreadNotFound { id: ThreadId },

    /// A position or range points outside the document.
    #[error("invalid range: {anchor:?} is outside the document")]
    InvalidRange { anchor: Anchor },

    /// The comment action needs a non-collapsed selection.
    #[error("selection is empty")]
    EmptySelection,

    /// The selection carries mixed thread marks and the policy rejects it.
    #[error("selection spans {} differing thread marks", .ids.len())]
    AmbiguousSelection { ids: Vec<ThreadId> },

    /// Persisted thread data failed validation.
    #[error("invalid thread snapshot: {0}")]
    InvalidSnapshot(String),

    /// HTML import could not be parsed.
    #[error("html error: {0}")]
    Html(String),

    /// Session configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ThreadmarkError {
    pub(crate) fn blank_comment() -> Self {
        Self::InvalidCommentText { reason: "comment text is empty".into() }
    }

    pub(crate) fn not_found(id: &ThreadId) -> Self {
        Self::ThreadNotFound { id: id.clone() }
    }
}

pub type Result<T> = std::result::Result<T, ThreadmarkError>;
