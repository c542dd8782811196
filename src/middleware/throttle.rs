//! Throttle middleware
//!
//! A counting semaphore bounding total concurrent in-flight handler
//! executions across all chats. Waiting for a slot is cancellable; a
//! canceled request returns `Canceled` and never holds a permit.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::BotError;
use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, Reply};

pub struct Throttle {
    permits: Arc<Semaphore>,
    inner: Arc<dyn MessageHandler>,
}

impl Throttle {
    pub fn new(max_in_flight: usize, inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
            inner,
        }
    }
}

#[async_trait]
impl MessageHandler for Throttle {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(BotError::Canceled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| BotError::Canceled)?
            }
        };
        trace!(request_id = %ctx.request_id, "throttle slot acquired");

        let result = self.inner.handle(ctx, msg).await;
        drop(permit);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Counts how many handler bodies run at once.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    struct SlowHandler {
        probe: Arc<ConcurrencyProbe>,
    }

    #[async_trait]
    impl MessageHandler for SlowHandler {
        async fn handle(
            &self,
            _ctx: &RequestContext,
            _msg: &InboundMessage,
        ) -> Result<Reply, BotError> {
            let running = self.probe.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.probe.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Reply::text("done"))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_n_in_flight() {
        const N: usize = 4;
        let probe = ConcurrencyProbe::new();
        let throttle = Arc::new(Throttle::new(
            N,
            Arc::new(SlowHandler {
                probe: Arc::clone(&probe),
            }),
        ));

        let tasks: Vec<_> = (0..2 * N as i64)
            .map(|i| {
                let throttle = Arc::clone(&throttle);
                tokio::spawn(async move {
                    let ctx = RequestContext::new(CancellationToken::new());
                    throttle
                        .handle(&ctx, &InboundMessage::text(i, i, i, "hi"))
                        .await
                })
            })
            .collect();

        for result in join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        assert!(probe.peak.load(Ordering::SeqCst) <= N);
        assert_eq!(probe.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_while_waiting_for_slot() {
        let probe = ConcurrencyProbe::new();
        let throttle = Arc::new(Throttle::new(
            1,
            Arc::new(SlowHandler {
                probe: Arc::clone(&probe),
            }),
        ));

        // Occupy the only slot.
        let first = {
            let throttle = Arc::clone(&throttle);
            tokio::spawn(async move {
                let ctx = RequestContext::new(CancellationToken::new());
                throttle.handle(&ctx, &InboundMessage::text(1, 1, 1, "hi")).await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        // The second request is canceled while queued.
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.clone());
        let waiting = {
            let throttle = Arc::clone(&throttle);
            tokio::spawn(async move {
                throttle.handle(&ctx, &InboundMessage::text(2, 2, 2, "hi")).await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();

        assert!(matches!(waiting.await.unwrap(), Err(BotError::Canceled)));
        assert!(first.await.unwrap().is_ok());

        // The canceled waiter did not leak a permit.
        let ctx = RequestContext::new(CancellationToken::new());
        assert!(throttle
            .handle(&ctx, &InboundMessage::text(3, 3, 3, "hi"))
            .await
            .is_ok());
    }
}
