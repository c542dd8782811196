//! Error boundary middleware
//!
//! The outermost wrapper: converts any handler failure into a localized
//! user-facing reply, logging the original cause. Precondition failures are
//! programming errors and are re-raised instead of masked.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::BotError;
use crate::i18n::Localizer;
use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, Reply};

pub struct ErrorBoundary {
    localizer: Arc<Localizer>,
    inner: Arc<dyn MessageHandler>,
}

impl ErrorBoundary {
    pub fn new(localizer: Arc<Localizer>, inner: Arc<dyn MessageHandler>) -> Self {
        Self { localizer, inner }
    }
}

#[async_trait]
impl MessageHandler for ErrorBoundary {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        match self.inner.handle(ctx, msg).await {
            Ok(reply) => Ok(reply),
            Err(err) if err.is_precondition() => Err(err),
            Err(err) => {
                warn!(
                    request_id = %ctx.request_id,
                    chat_id = msg.chat_id,
                    error = %err,
                    "request failed; replying with localized error"
                );
                let lang = self.localizer.lang_for(msg.user_id);
                Ok(Reply::text(self.localizer.error_text(lang, &err)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::{Lang, MessageKey};
    use tokio_util::sync::CancellationToken;

    struct FailingHandler {
        error: fn() -> BotError,
    }

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(
            &self,
            _ctx: &RequestContext,
            _msg: &InboundMessage,
        ) -> Result<Reply, BotError> {
            Err((self.error)())
        }
    }

    fn boundary(error: fn() -> BotError) -> (ErrorBoundary, Arc<Localizer>) {
        let localizer = Arc::new(Localizer::new(Lang::En));
        let inner = Arc::new(FailingHandler { error });
        (ErrorBoundary::new(Arc::clone(&localizer), inner), localizer)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(CancellationToken::new())
    }

    #[tokio::test]
    async fn test_rate_limit_error_becomes_localized_reply() {
        let (boundary, localizer) = boundary(|| BotError::HourlyLimitExceeded);
        let msg = InboundMessage::text(1, 10, 20, "hi");

        let reply = boundary.handle(&ctx(), &msg).await.unwrap();
        assert_eq!(reply.text, localizer.text(Lang::En, MessageKey::HourlyLimit));
    }

    #[tokio::test]
    async fn test_cancellation_becomes_generic_reply() {
        let (boundary, localizer) = boundary(|| BotError::Canceled);
        let msg = InboundMessage::text(1, 10, 20, "hi");

        let reply = boundary.handle(&ctx(), &msg).await.unwrap();
        assert_eq!(reply.text, localizer.text(Lang::En, MessageKey::GenericError));
    }

    #[tokio::test]
    async fn test_precondition_propagates() {
        let (boundary, _) = boundary(|| BotError::EmptyMessage);
        let msg = InboundMessage {
            id: 1,
            chat_id: 10,
            user_id: 20,
            text: None,
            timestamp: 0,
        };

        let result = boundary.handle(&ctx(), &msg).await;
        assert!(matches!(result, Err(BotError::EmptyMessage)));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        struct OkHandler;

        #[async_trait]
        impl MessageHandler for OkHandler {
            async fn handle(
                &self,
                _ctx: &RequestContext,
                _msg: &InboundMessage,
            ) -> Result<Reply, BotError> {
                Ok(Reply::text("fine"))
            }
        }

        let localizer = Arc::new(Localizer::new(Lang::En));
        let boundary = ErrorBoundary::new(localizer, Arc::new(OkHandler));
        let msg = InboundMessage::text(1, 10, 20, "hi");
        let reply = boundary.handle(&ctx(), &msg).await.unwrap();
        assert_eq!(reply.text, "fine");
    }
}
