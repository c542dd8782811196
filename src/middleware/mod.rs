//! Concurrency middleware stack
//!
//! Composable wrappers around a single message-handling entry point. Each
//! middleware owns its registry and wraps an `Arc<dyn MessageHandler>`;
//! composition order is behavior order.
//!
//! Production composition, outermost first:
//! error boundary -> localization -> metrics -> throttle -> per-chat reducer
//! -> per-user sequencer -> core handler.
//!
//! The throttle sits outside the reducer and sequencer so queued requests do
//! not hold per-user turn slots, and the boundary is outermost so every
//! failure path - including cancellation while waiting - still produces a
//! well-formed reply.
//!
//! Load-bearing invariant: every wait in this stack is a `tokio::select!`
//! against the request's cancellation token. A canceled request must never
//! keep a semaphore permit or a sequencer turn.

pub mod boundary;
pub mod observe;
pub mod reducer;
pub mod sequencer;
pub mod throttle;

pub use boundary::ErrorBoundary;
pub use observe::{Localize, Observe};
pub use reducer::ChatReducer;
pub use sequencer::UserSequencer;
pub use throttle::Throttle;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BotError;
use crate::i18n::{Lang, Localizer};
use crate::metrics::HandlerMetrics;
use crate::transport::{InboundMessage, Reply};

/// Per-request context threaded through the stack.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates log lines across middleware layers.
    pub request_id: Uuid,
    pub cancel: CancellationToken,
    pub lang: Lang,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancel,
            lang: Lang::default(),
        }
    }

    /// Same request, narrower cancellation scope.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn with_lang(&self, lang: Lang) -> Self {
        Self {
            lang,
            ..self.clone()
        }
    }
}

/// The single message-handling entry point every middleware wraps.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError>;
}

/// Builds the production middleware composition around a core handler.
pub fn production_stack(
    core: Arc<dyn MessageHandler>,
    localizer: Arc<Localizer>,
    metrics: Arc<HandlerMetrics>,
    max_in_flight: usize,
) -> Arc<dyn MessageHandler> {
    let sequencer = Arc::new(UserSequencer::new(core));
    let reducer = Arc::new(ChatReducer::new(sequencer));
    let throttle = Arc::new(Throttle::new(max_in_flight, reducer));
    let observe = Arc::new(Observe::new(metrics, throttle));
    let localize = Arc::new(Localize::new(Arc::clone(&localizer), observe));
    Arc::new(ErrorBoundary::new(localizer, localize))
}
