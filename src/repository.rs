//! Conversation persistence
//!
//! Find-or-create repositories the processor talks to. Two backends: an
//! in-memory cache with TTL and capacity eviction, and Redis for deployments
//! that survive restarts. Conversation state (including the active
//! questionnaire) round-trips losslessly as JSON.

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

use crate::conversation::Conversation;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find(&self, chat_id: i64) -> Result<Option<Conversation>>;

    /// Returns the stored conversation or a fresh one for this chat. The
    /// fresh one is not persisted until `save`.
    async fn find_or_create(&self, chat_id: i64) -> Result<Conversation>;

    async fn save(&self, conversation: &Conversation) -> Result<()>;

    async fn delete(&self, chat_id: i64) -> Result<()>;
}

/// In-memory repository with TTL and capacity eviction.
pub struct InMemoryRepository {
    cache: Cache<i64, Conversation>,
}

impl InMemoryRepository {
    pub fn new(max_conversations: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_conversations)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn find(&self, chat_id: i64) -> Result<Option<Conversation>> {
        Ok(self.cache.get(&chat_id).await)
    }

    async fn find_or_create(&self, chat_id: i64) -> Result<Conversation> {
        Ok(self
            .cache
            .get(&chat_id)
            .await
            .unwrap_or_else(|| Conversation::new(chat_id)))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.cache
            .insert(conversation.chat_id, conversation.clone())
            .await;
        Ok(())
    }

    async fn delete(&self, chat_id: i64) -> Result<()> {
        self.cache.invalidate(&chat_id).await;
        Ok(())
    }
}

/// Redis-backed repository: one JSON value per chat with a TTL.
pub struct RedisRepository {
    conn: redis::aio::ConnectionManager,
    ttl_secs: u64,
}

impl RedisRepository {
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        info!("Redis conversation repository connected");
        Ok(Self { conn, ttl_secs })
    }

    fn key(chat_id: i64) -> String {
        format!("petcare:conversation:{}", chat_id)
    }
}

#[async_trait]
impl ConversationRepository for RedisRepository {
    async fn find(&self, chat_id: i64) -> Result<Option<Conversation>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::key(chat_id))
            .await
            .context("failed to load conversation")?;
        raw.map(|payload| {
            serde_json::from_str(&payload).context("failed to decode stored conversation")
        })
        .transpose()
    }

    async fn find_or_create(&self, chat_id: i64) -> Result<Conversation> {
        Ok(self
            .find(chat_id)
            .await?
            .unwrap_or_else(|| Conversation::new(chat_id)))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let payload =
            serde_json::to_string(conversation).context("failed to encode conversation")?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(conversation.chat_id), payload, self.ttl_secs)
            .await
            .context("failed to save conversation")?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(chat_id))
            .await
            .context("failed to delete conversation")?;
        Ok(())
    }
}
