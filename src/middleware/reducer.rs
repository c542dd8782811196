//! Per-chat request reducer
//!
//! At most one request per chat is allowed to finish uncontested: a new
//! request cancels and replaces the chat's in-flight entry before it starts.
//! Cleanup compares generations under the registry lock, so a lagging
//! completion can never evict a newer request's entry.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BotError;
use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, Reply};

/// In-flight request state for one chat.
struct InFlight {
    generation: u64,
    cancel: CancellationToken,
    message_id: i64,
}

/// Owned registry: the map and its lock live here, not in a closure.
struct ReducerRegistry {
    entries: Mutex<HashMap<i64, InFlight>>,
    next_generation: AtomicU64,
}

pub struct ChatReducer {
    registry: ReducerRegistry,
    inner: Arc<dyn MessageHandler>,
}

impl ChatReducer {
    pub fn new(inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            registry: ReducerRegistry {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            },
            inner,
        }
    }

    #[cfg(test)]
    fn entry_generation(&self, chat_id: i64) -> Option<u64> {
        self.registry
            .entries
            .lock()
            .get(&chat_id)
            .map(|e| e.generation)
    }
}

#[async_trait]
impl MessageHandler for ChatReducer {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let scoped_token = ctx.cancel.child_token();

        let superseded = {
            let mut entries = self.registry.entries.lock();
            entries.insert(
                msg.chat_id,
                InFlight {
                    generation,
                    cancel: scoped_token.clone(),
                    message_id: msg.id,
                },
            )
        };
        if let Some(previous) = superseded {
            debug!(
                request_id = %ctx.request_id,
                chat_id = msg.chat_id,
                superseded_message_id = previous.message_id,
                "superseding in-flight request for chat"
            );
            previous.cancel.cancel();
        }

        let scoped = ctx.with_cancel(scoped_token);
        let result = self.inner.handle(&scoped, msg).await;

        // Remove our entry only if a newer request has not replaced it.
        let mut entries = self.registry.entries.lock();
        if entries
            .get(&msg.chat_id)
            .map(|entry| entry.generation == generation)
            .unwrap_or(false)
        {
            entries.remove(&msg.chat_id);
        }

        result
    }
}
