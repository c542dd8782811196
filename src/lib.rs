//! Petcare Bot
//!
//! Conversational pet-care assistant backend bridging Telegram and the
//! Claude API, with per-conversation state across turns.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Dispatch loop ──► Middleware stack ──► Processor ──► Claude API
//!  (teloxide)    (task per msg)      │                    │
//!                                    ├── Error boundary   ├── Conversation
//!                                    ├── Localization     │    state machine
//!                                    ├── Metrics          ├── Questionnaires
//!                                    ├── Throttle         │    (follow-up, profile)
//!                                    ├── Chat reducer     ├── Rate limiter
//!                                    └── User sequencer   └── Repository
//!                                                              (memory / Redis)
//! ```

pub mod config;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod i18n;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod processor;
pub mod profile;
pub mod questionnaire;
pub mod rate_limit;
pub mod repository;
pub mod telegram;
pub mod transport;

pub use config::Config;
pub use conversation::{ChatMessage, Conversation, State};
pub use dispatcher::Dispatcher;
pub use error::BotError;
pub use i18n::{Lang, Localizer, MessageKey};
pub use metrics::{HandlerMetrics, MetricsSnapshot};
pub use middleware::{production_stack, MessageHandler, RequestContext};
pub use model::{AnthropicClient, ModelProvider, ModelReply};
pub use processor::MessageProcessor;
pub use questionnaire::{FollowUpQuestion, QuestionAnswer, Questionnaire};
pub use rate_limit::{LimiterConfig, RequestLimiter};
pub use repository::{ConversationRepository, InMemoryRepository, RedisRepository};
pub use transport::{InboundMessage, Reply, ReplySink};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wires every component from config and runs the dispatch loop until
/// ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let repository: Arc<dyn ConversationRepository> = match &config.redis_url {
        Some(url) => Arc::new(
            repository::RedisRepository::connect(url, config.conversation_ttl_secs).await?,
        ),
        None => {
            info!("REDIS_URL not set; using in-memory conversations");
            Arc::new(repository::InMemoryRepository::new(
                10_000,
                Duration::from_secs(config.conversation_ttl_secs),
            ))
        }
    };

    let model: Arc<dyn ModelProvider> = Arc::new(AnthropicClient::new(
        &config.anthropic_api_key,
        &config.model,
        config.model_max_tokens,
    ));
    let limiter = Arc::new(RequestLimiter::new(LimiterConfig {
        hourly_limit: config.hourly_limit,
        daily_limit: config.daily_limit,
        whitelist: config.whitelist.clone(),
    }));
    let localizer = Arc::new(Localizer::new(config.default_lang));
    let metrics = Arc::new(HandlerMetrics::new(1024));

    let processor = MessageProcessor::new(
        repository,
        model,
        limiter,
        Arc::clone(&localizer),
    )
    .with_max_message_chars(config.max_message_chars);

    let stack = production_stack(
        Arc::new(processor),
        localizer,
        metrics,
        config.max_in_flight,
    );

    let transport = telegram::connect(&config.telegram_token, config.queue_capacity).await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    Dispatcher::new(transport.inbound, transport.sink, stack, shutdown)
        .run()
        .await;

    Ok(())
}
