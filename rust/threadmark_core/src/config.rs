//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadmarkError};

/// What to do when a selection carries mixed thread marks, or marked and
/// unmarked text together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Use the mark at the selection start: append when present, otherwise
    /// create a thread over the whole selection.
    #[default]
    UseStart,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ambiguity: AmbiguityPolicy,
    /// Upper bound on comment length in chars; `None` means unlimited.
    pub max_comment_chars: Option<usize>,
    /// Strip leading/trailing whitespace before storing.
    pub trim_comments: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ambiguity: AmbiguityPolicy::UseStart, max_comment_chars: None, trim_comments: true }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_comment_chars == Some(0) {
            return Err(ThreadmarkError::Config("max_comment_chars must be at least 1".into()));
        }
        Ok(())
    }

    /// Apply trimming and the length limit. Blank text is left for the
    /// store to reject.
    pub(crate) fn prepare<'t>(&self, text: &'t str) -> Result<&'t str> {
        let text = if self.trim_comments { text.trim() } else { text };
        if let Some(max) = self.max_comment_chars {
            let len = text.chars().count();
            if len > max {
                return Err(ThreadmarkError::InvalidCommentText {
                    reason: format!("comment is {len} chars, limit is {max}"),
                });
            }
        }
        Ok(text)
    }
}
