//! Error taxonomy
//!
//! Every failure a request can hit maps to one of these variants. The error
//! boundary middleware is the single place that turns them into user-facing
//! text; everything below it propagates the typed value unchanged.

use thiserror::Error;

/// Request-level errors.
#[derive(Debug, Error)]
pub enum BotError {
    /// The inbound message carried no text (photo, sticker, ...).
    #[error("inbound message has no text payload")]
    EmptyMessage,

    /// A questionnaire operation was called while the conversation is in
    /// `Normal` state.
    #[error("conversation is not in a questioning state")]
    NotQuestioning,

    /// The conversation is in a questioning state but no questionnaire is
    /// installed. Violates the state invariant.
    #[error("questioning state has no questionnaire installed")]
    MissingQuestionnaire,

    /// A follow-up questionnaire was started with an empty question list.
    #[error("follow-up question list is empty")]
    NoQuestions,

    /// The question index already reached the end of the questionnaire.
    #[error("no more questions to ask")]
    NoMoreQuestions,

    /// Results were requested before every question was answered.
    #[error("questionnaire is not complete")]
    Incomplete,

    /// An answer failed its validator. Carries the human-readable reason;
    /// the same question is re-asked.
    #[error("{0}")]
    InvalidAnswer(String),

    #[error("message is too long ({length} characters, limit {limit})")]
    TextTooLong { length: usize, limit: usize },

    #[error("hourly request limit reached")]
    HourlyLimitExceeded,

    #[error("daily request limit reached")]
    DailyLimitExceeded,

    /// The request's context was canceled while waiting or working.
    #[error("request was canceled")]
    Canceled,

    /// Model or persistence failure, wrapped with operation context.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl BotError {
    /// Programming errors that must never be converted into a chat reply.
    /// The error boundary re-raises these to the caller.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessage
                | Self::NotQuestioning
                | Self::MissingQuestionnaire
                | Self::NoQuestions
        )
    }

    /// Validation failures re-ask the current question instead of replacing
    /// the reply.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidAnswer(_) | Self::TextTooLong { .. })
    }
}
