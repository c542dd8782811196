//! Transport seam
//!
//! Platform-neutral message and reply types plus the outbound sink trait.
//! The Telegram adapter feeds `InboundMessage`s into the dispatch loop and
//! implements `ReplySink`; tests drive the same seam directly.

use async_trait::async_trait;
use chrono::Utc;

/// Errors on the outbound path.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// A normalized inbound chat message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Platform message id, used by the reducer to tag in-flight work.
    pub id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    /// Absent for non-text updates (photos, stickers, ...).
    pub text: Option<String>,
    pub timestamp: i64,
}

impl InboundMessage {
    /// Convenience constructor for a plain text message.
    pub fn text(id: i64, chat_id: i64, user_id: i64, text: &str) -> Self {
        Self {
            id,
            chat_id,
            user_id,
            text: Some(text.to_string()),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// A reply plus optional suggested answers (rendered as a reply keyboard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub suggestions: Vec<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Outbound half of a transport.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<(), TransportError>;
}
