//! Per-user request sequencer
//!
//! Guarantees that one user's requests never execute their handler bodies
//! concurrently, even across different chats. Each request registers its own
//! done-signal and waits on the predecessor's before running; the wait is a
//! select against the request's cancellation token, and a canceled waiter
//! still signals its successor on the way out.
//!
//! The guarantee is non-overlap, not delivery order: tasks may reach their
//! wait positions in any order.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::error::BotError;
use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, Reply};

/// The turn slot a successor waits on.
struct TurnSlot {
    generation: u64,
    done: watch::Receiver<bool>,
}

/// Owned registry of per-user turn slots.
struct SequencerRegistry {
    slots: Mutex<HashMap<i64, TurnSlot>>,
    next_generation: AtomicU64,
}

pub struct UserSequencer {
    registry: SequencerRegistry,
    inner: Arc<dyn MessageHandler>,
}

impl UserSequencer {
    pub fn new(inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            registry: SequencerRegistry {
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            },
            inner,
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.registry.slots.lock().len()
    }
}

/// Resolves when the predecessor signals done or drops its sender.
async fn predecessor_done(mut done: watch::Receiver<bool>) {
    loop {
        if *done.borrow() {
            return;
        }
        if done.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl MessageHandler for UserSequencer {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = watch::channel(false);

        // Register our own slot, taking over the predecessor's.
        let predecessor = {
            let mut slots = self.registry.slots.lock();
            slots.insert(
                msg.user_id,
                TurnSlot {
                    generation,
                    done: done_rx,
                },
            )
        };

        let admitted = match predecessor {
            None => true,
            Some(previous) => {
                trace!(
                    request_id = %ctx.request_id,
                    user_id = msg.user_id,
                    "waiting for previous request of user"
                );
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => false,
                    _ = predecessor_done(previous.done) => true,
                }
            }
        };

        let result = if admitted {
            self.inner.handle(ctx, msg).await
        } else {
            Err(BotError::Canceled)
        };

        // Wake our successor (if any), then drop our slot if it is still
        // ours. A successor that already replaced it owns the entry now.
        let _ = done_tx.send(true);
        let mut slots = self.registry.slots.lock();
        if slots
            .get(&msg.user_id)
            .map(|slot| slot.generation == generation)
            .unwrap_or(false)
        {
            slots.remove(&msg.user_id);
        }

        result
    }
}
