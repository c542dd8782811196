//! Dispatch loop
//!
//! Reads inbound messages and spawns one handling task per message,
//! fire-and-forget. Each task gets a child cancellation context derived from
//! the loop's shutdown token, so shutdown propagates into every wait inside
//! the middleware stack.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::middleware::{MessageHandler, RequestContext};
use crate::transport::{InboundMessage, ReplySink};

pub struct Dispatcher {
    inbound: mpsc::Receiver<InboundMessage>,
    sink: Arc<dyn ReplySink>,
    handler: Arc<dyn MessageHandler>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        inbound: mpsc::Receiver<InboundMessage>,
        sink: Arc<dyn ReplySink>,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inbound,
            sink,
            handler,
            shutdown,
        }
    }

    /// Runs until shutdown is requested or the transport closes. Spawned
    /// tasks observe shutdown through their child tokens and unwind on
    /// their own.
    pub async fn run(mut self) {
        info!("dispatch loop started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("dispatch loop stopping: shutdown requested");
                    break;
                }
                inbound = self.inbound.recv() => {
                    let Some(msg) = inbound else {
                        info!("dispatch loop stopping: transport closed");
                        break;
                    };
                    let handler = Arc::clone(&self.handler);
                    let sink = Arc::clone(&self.sink);
                    let ctx = RequestContext::new(self.shutdown.child_token());
                    tokio::spawn(async move {
                        match handler.handle(&ctx, &msg).await {
                            Ok(reply) => {
                                if let Err(err) = sink.send(msg.chat_id, &reply).await {
                                    warn!(chat_id = msg.chat_id, error = %err, "failed to send reply");
                                }
                            }
                            // Only precondition failures make it past the
                            // error boundary; there is nothing to tell the
                            // user.
                            Err(err) => {
                                warn!(chat_id = msg.chat_id, error = %err, "request dropped");
                            }
                        }
                    });
                }
            }
        }
    }
}
