//! Core message handler
//!
//! The innermost handler of the middleware stack: command dispatch, the
//! state-dependent turn logic, rate limiting for new questions, prompt
//! assembly, model calls, and persistence. Everything above this layer is
//! concurrency plumbing; everything below is I/O.

use anyhow::Context as _;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::conversation::{Conversation, State};
use crate::error::BotError;
use crate::i18n::{Lang, Localizer, MessageKey};
use crate::middleware::{MessageHandler, RequestContext};
use crate::model::{ModelProvider, ModelReply};
use crate::questionnaire::QuestionPrompt;
use crate::rate_limit::RequestLimiter;
use crate::repository::ConversationRepository;
use crate::transport::{InboundMessage, Reply};

/// Upper bound on inbound text, keeps prompts and storage sane.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

pub struct MessageProcessor {
    repository: Arc<dyn ConversationRepository>,
    model: Arc<dyn ModelProvider>,
    limiter: Arc<RequestLimiter>,
    localizer: Arc<Localizer>,
    max_message_chars: usize,
}

impl MessageProcessor {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        model: Arc<dyn ModelProvider>,
        limiter: Arc<RequestLimiter>,
        localizer: Arc<Localizer>,
    ) -> Self {
        Self {
            repository,
            model,
            limiter,
            localizer,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    pub fn with_max_message_chars(mut self, max_message_chars: usize) -> Self {
        self.max_message_chars = max_message_chars;
        self
    }

    async fn handle_command(
        &self,
        msg: &InboundMessage,
        command: &str,
        lang: Lang,
    ) -> Result<Reply, BotError> {
        debug!(chat_id = msg.chat_id, command, "handling command");
        match command {
            "start" => Ok(Reply::text(self.localizer.text(lang, MessageKey::Welcome))),
            "help" => Ok(Reply::text(self.localizer.text(lang, MessageKey::Help))),
            "terms" => Ok(Reply::text(self.localizer.text(lang, MessageKey::Terms))),
            "cancel" => {
                let existing = self
                    .repository
                    .find(msg.chat_id)
                    .await
                    .context("failed to load conversation")?;
                match existing {
                    Some(mut conversation) if conversation.is_questioning() => {
                        conversation.cancel_questionnaire();
                        self.save(&conversation).await?;
                        Ok(Reply::text(
                            self.localizer.text(lang, MessageKey::QuestionnaireCanceled),
                        ))
                    }
                    _ => Ok(Reply::text(
                        self.localizer.text(lang, MessageKey::NothingToCancel),
                    )),
                }
            }
            "editprofile" => {
                let mut conversation = self
                    .repository
                    .find_or_create(msg.chat_id)
                    .await
                    .context("failed to load conversation")?;
                // The profile sequence replaces whatever was in progress.
                if conversation.is_questioning() {
                    conversation.cancel_questionnaire();
                }
                conversation.start_profile_questions();
                let question = conversation.current_question()?;
                self.save(&conversation).await?;
                let intro = self.localizer.text(lang, MessageKey::ProfileIntro);
                Ok(ask_with_prefix(intro, question))
            }
            _ => Ok(Reply::text(
                self.localizer.text(lang, MessageKey::UnknownCommand),
            )),
        }
    }

    /// Normal-state turn: rate limit, model call, optional questionnaire
    /// installation.
    async fn answer_question(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, BotError> {
        self.limiter.is_allowed(msg.user_id)?;

        conversation.add_message("user", text);
        let reply = self.call_model(ctx, &build_prompt(conversation)).await?;
        self.limiter.record_access(msg.user_id);

        if reply.follow_up_questions.is_empty() {
            conversation.add_message("assistant", &reply.text);
            self.save(conversation).await?;
            return Ok(Reply::text(reply.text));
        }

        info!(
            chat_id = msg.chat_id,
            questions = reply.follow_up_questions.len(),
            "starting follow-up questionnaire"
        );
        conversation.start_follow_up_questions(&reply.text, reply.follow_up_questions)?;
        let question = conversation.current_question()?;
        self.save(conversation).await?;
        Ok(ask(question))
    }

    /// FollowUpQuestioning turn: record the answer, then either re-ask, ask
    /// the next question, or fetch the model's concluding answer.
    async fn continue_follow_up(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, BotError> {
        match conversation.add_question_answer(text) {
            Err(BotError::InvalidAnswer(reason)) => {
                let question = conversation.current_question()?;
                Ok(ask_with_prefix(&reason, question))
            }
            Err(err) => Err(err),
            Ok(false) => {
                let question = conversation.current_question()?;
                self.save(conversation).await?;
                Ok(ask(question))
            }
            Ok(true) => {
                // The consolidated Q/A message is already in history; the
                // concluding call consumes the regular rate budget of the
                // question that started the questionnaire, so no extra check.
                debug!(chat_id = msg.chat_id, "follow-up questionnaire complete");
                let reply = self.call_model(ctx, &build_prompt(conversation)).await?;
                conversation.add_message("assistant", &reply.text);
                self.save(conversation).await?;
                Ok(Reply::text(reply.text))
            }
        }
    }

    /// ProfileQuestioning turn: validator-driven, no model involvement.
    async fn continue_profile(
        &self,
        conversation: &mut Conversation,
        text: &str,
        lang: Lang,
    ) -> Result<Reply, BotError> {
        match conversation.add_question_answer(text) {
            Err(BotError::InvalidAnswer(reason)) => {
                let question = conversation.current_question()?;
                Ok(ask_with_prefix(&reason, question))
            }
            Err(err) => Err(err),
            Ok(false) => {
                let question = conversation.current_question()?;
                self.save(conversation).await?;
                Ok(ask(question))
            }
            Ok(true) => {
                info!(chat_id = conversation.chat_id, "pet profile completed");
                self.save(conversation).await?;
                Ok(Reply::text(self.localizer.text(lang, MessageKey::ProfileSaved)))
            }
        }
    }

    /// Model call raced against the request's cancellation token; a
    /// superseded request gives up here instead of wasting the upstream
    /// round-trip.
    async fn call_model(
        &self,
        ctx: &RequestContext,
        prompt: &str,
    ) -> Result<ModelReply, BotError> {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(BotError::Canceled),
            result = self.model.call(prompt) => {
                result.map_err(|e| BotError::Upstream(e.context("model request failed")))
            }
        }
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), BotError> {
        self.repository
            .save(conversation)
            .await
            .context("failed to save conversation")?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for MessageProcessor {
    async fn handle(
        &self,
        ctx: &RequestContext,
        msg: &InboundMessage,
    ) -> Result<Reply, BotError> {
        let text = msg.text.as_deref().ok_or(BotError::EmptyMessage)?.trim();
        if text.is_empty() {
            return Err(BotError::EmptyMessage);
        }
        let length = text.chars().count();
        if length > self.max_message_chars {
            return Err(BotError::TextTooLong {
                length,
                limit: self.max_message_chars,
            });
        }

        if let Some(rest) = text.strip_prefix('/') {
            // "/cancel@petcare_bot" in group chats.
            let command = rest
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('@')
                .next()
                .unwrap_or("");
            return self.handle_command(msg, command, ctx.lang).await;
        }

        let mut conversation = self
            .repository
            .find_or_create(msg.chat_id)
            .await
            .context("failed to load conversation")?;

        match conversation.state() {
            State::Normal => self.answer_question(ctx, msg, &mut conversation, text).await,
            State::FollowUpQuestioning => {
                self.continue_follow_up(ctx, msg, &mut conversation, text).await
            }
            State::ProfileQuestioning => {
                self.continue_profile(&mut conversation, text, ctx.lang).await
            }
        }
    }
}

fn ask(question: QuestionPrompt) -> Reply {
    Reply::text(question.text).with_suggestions(question.options)
}

/// Re-asks a question under a validator reason or an intro line.
fn ask_with_prefix(prefix: &str, question: QuestionPrompt) -> Reply {
    Reply::text(format!("{}\n\n{}", prefix, question.text)).with_suggestions(question.options)
}

/// Flattens the bounded history into a labeled transcript for the model.
fn build_prompt(conversation: &Conversation) -> String {
    let mut prompt = String::new();
    for message in conversation.messages() {
        let label = match message.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            "questionnaire" => "Clarifications",
            "pet-profile" => "Pet profile",
            other => other,
        };
        prompt.push_str(&format!("{}: {}\n", label, message.content));
    }
    prompt
}
