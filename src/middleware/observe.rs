//! Localization and metrics middleware
//!
//! Both are pure pass-throughs with side effects: `Localize` stamps the
//! request context with the user's resolved language, `Observe` measures
//! handler latency and outcome.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::BotError;
use crate::i18n::Localizer;
use crate::metrics::{HandlerMetrics, Outcome};
use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, Reply};

/// Resolves the user's language before the rest of the stack runs.
pub struct Localize {
    localizer: Arc<Localizer>,
    inner: Arc<dyn MessageHandler>,
}

impl Localize {
    pub fn new(localizer: Arc<Localizer>, inner: Arc<dyn MessageHandler>) -> Self {
        Self { localizer, inner }
    }
}

#[async_trait]
impl MessageHandler for Localize {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let lang = self.localizer.lang_for(msg.user_id);
        self.inner.handle(&ctx.with_lang(lang), msg).await
    }
}

/// Latency and outcome recording. No control-flow impact.
pub struct Observe {
    metrics: Arc<HandlerMetrics>,
    inner: Arc<dyn MessageHandler>,
}

impl Observe {
    pub fn new(metrics: Arc<HandlerMetrics>, inner: Arc<dyn MessageHandler>) -> Self {
        Self { metrics, inner }
    }
}

#[async_trait]
impl MessageHandler for Observe {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let start = Instant::now();
        let result = self.inner.handle(ctx, msg).await;
        let latency = start.elapsed();

        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(BotError::Canceled) => Outcome::Canceled,
            Err(_) => Outcome::Failed,
        };
        self.metrics.record(latency, outcome);
        debug!(
            request_id = %ctx.request_id,
            chat_id = msg.chat_id,
            latency_ms = latency.as_millis() as u64,
            ok = result.is_ok(),
            "request handled"
        );

        result
    }
}
