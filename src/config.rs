//! Configuration management

use anyhow::{Context, Result};

use crate::i18n::Lang;

/// Bot configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// Anthropic API key
    pub anthropic_api_key: String,

    /// Claude model id
    pub model: String,

    /// Max tokens per model response
    pub model_max_tokens: usize,

    /// Redis URL; in-memory conversations when unset
    pub redis_url: Option<String>,

    /// Questions allowed per user per hour
    pub hourly_limit: u32,

    /// Questions allowed per user per day
    pub daily_limit: u32,

    /// User ids exempt from rate limiting
    pub whitelist: Vec<i64>,

    /// Global cap on concurrently processed messages
    pub max_in_flight: usize,

    /// Longest accepted inbound message, in characters
    pub max_message_chars: usize,

    /// Conversation TTL in seconds (both backends)
    pub conversation_ttl_secs: u64,

    /// Inbound queue capacity between transport and dispatch loop
    pub queue_capacity: usize,

    /// Default reply language
    pub default_lang: Lang,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let telegram_token =
            std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let anthropic_api_key =
            std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY must be set")?;

        let model = std::env::var("PETCARE_MODEL")
            .unwrap_or_else(|_| "claude-3-5-haiku-20241022".to_string());

        let model_max_tokens = parse_env("PETCARE_MODEL_MAX_TOKENS", 1024);
        let redis_url = std::env::var("REDIS_URL").ok();

        let hourly_limit = parse_env("PETCARE_HOURLY_LIMIT", 10);
        let daily_limit = parse_env("PETCARE_DAILY_LIMIT", 50);

        let whitelist: Vec<i64> = std::env::var("PETCARE_WHITELIST")
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        let max_in_flight = parse_env("PETCARE_MAX_IN_FLIGHT", 16);
        let max_message_chars = parse_env("PETCARE_MAX_MESSAGE_CHARS", 2000);
        let conversation_ttl_secs = parse_env("PETCARE_CONVERSATION_TTL_SECS", 7 * 24 * 3600);
        let queue_capacity = parse_env("PETCARE_QUEUE_CAPACITY", 128);

        let default_lang = match std::env::var("PETCARE_DEFAULT_LANG").as_deref() {
            Ok("ru") => Lang::Ru,
            _ => Lang::En,
        };

        Ok(Self {
            telegram_token,
            anthropic_api_key,
            model,
            model_max_tokens,
            redis_url,
            hourly_limit,
            daily_limit,
            whitelist,
            max_in_flight,
            max_message_chars,
            conversation_ttl_secs,
            queue_capacity,
            default_lang,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
