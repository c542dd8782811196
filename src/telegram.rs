//! Telegram transport adapter
//!
//! Bridges teloxide long polling to the dispatch loop: every incoming
//! message is normalized into an `InboundMessage` and pushed onto the
//! inbound queue; replies go back through `TelegramSink`, rendering
//! suggested answers as a one-time reply keyboard.
//!
//! Uses the explicit Dispatcher pattern for reliable message polling.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::transport::{InboundMessage, Reply, ReplySink, TransportError};

/// Connected Telegram transport: the inbound queue plus the outbound sink.
pub struct TelegramTransport {
    pub inbound: mpsc::Receiver<InboundMessage>,
    pub sink: Arc<TelegramSink>,
}

/// Outbound half: sends replies with an optional suggestions keyboard.
pub struct TelegramSink {
    bot: Bot,
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<(), TransportError> {
        let markup = if reply.suggestions.is_empty() {
            ReplyMarkup::KeyboardRemove(KeyboardRemove::new())
        } else {
            let rows: Vec<Vec<KeyboardButton>> = reply
                .suggestions
                .iter()
                .map(|s| vec![KeyboardButton::new(s.clone())])
                .collect();
            let mut keyboard = KeyboardMarkup::new(rows);
            keyboard.resize_keyboard = true;
            keyboard.one_time_keyboard = true;
            ReplyMarkup::Keyboard(keyboard)
        };

        self.bot
            .send_message(ChatId(chat_id), reply.text.clone())
            .reply_markup(markup)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Connects the bot, verifies the token, and starts the polling dispatcher
/// in the background.
pub async fn connect(token: &str, queue_capacity: usize) -> Result<TelegramTransport> {
    let bot = Bot::new(token);

    let me = bot
        .get_me()
        .await
        .context("telegram bot authentication failed")?;
    info!(
        "Bot authenticated: @{} (ID: {})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );

    // Polling will not receive updates while a webhook is registered.
    if let Err(e) = bot.delete_webhook().await {
        warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let (tx, rx) = mpsc::channel(queue_capacity);

    let handler = dptree::entry().branch(Update::filter_message().endpoint(enqueue_message));
    let polling_bot = bot.clone();
    tokio::spawn(async move {
        Dispatcher::builder(polling_bot, handler)
            .dependencies(dptree::deps![tx])
            .default_handler(|_| async { tracing::trace!("ignoring non-message update") })
            .build()
            .dispatch()
            .await;
        warn!("telegram polling dispatcher stopped");
    });

    Ok(TelegramTransport {
        inbound: rx,
        sink: Arc::new(TelegramSink { bot }),
    })
}

async fn enqueue_message(
    msg: Message,
    tx: mpsc::Sender<InboundMessage>,
) -> ResponseResult<()> {
    let inbound = InboundMessage {
        id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        user_id: msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0),
        text: msg.text().map(str::to_owned),
        timestamp: msg.date.timestamp(),
    };
    if tx.send(inbound).await.is_err() {
        warn!("dispatch queue closed; dropping update");
    }
    Ok(())
}
