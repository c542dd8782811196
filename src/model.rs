//! Claude API client
//!
//! Anthropic Messages API client for the assistant's answers. The system
//! prompt asks the model to append a fenced JSON block when it needs
//! clarification; the block is parsed into follow-up questions and stripped
//! from the user-visible text. A missing or malformed block simply means no
//! questions.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::questionnaire::FollowUpQuestion;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const FOLLOW_UP_FENCE: &str = "```json";

const SYSTEM_PROMPT: &str = "You are a friendly pet-care assistant. Give practical, \
cautious guidance and recommend a veterinarian for anything urgent. If you need \
clarification before answering properly, end your reply with a fenced ```json block \
containing {\"follow_up_questions\": [{\"question\": \"...\", \"options\": [\"...\"]}]} \
with at most three questions. Otherwise do not emit any JSON.";

/// What the core needs back from a model call.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub follow_up_questions: Vec<FollowUpQuestion>,
}

/// Model provider seam; the core never sees HTTP.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn call(&self, prompt: &str) -> Result<ModelReply>;
}

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: usize,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct FollowUpPayload {
    #[serde(default)]
    follow_up_questions: Vec<FollowUpQuestion>,
}

/// Claude API client.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl AnthropicClient {
    pub fn new(api_key: &str, model: &str, max_tokens: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicClient {
    async fn call(&self, prompt: &str) -> Result<ModelReply> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!("Calling Claude API: model={}, prompt_len={}", self.model, prompt.len());

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            anyhow::bail!("Claude API error {}: {}", status, text);
        }

        let result: MessageResponse = response.json().await?;
        let content = result
            .content
            .into_iter()
            .filter_map(|b| if b.r#type == "text" { b.text } else { None })
            .collect::<Vec<_>>()
            .join("\n");

        let (text, follow_up_questions) = extract_follow_ups(&content);

        info!(
            "Claude response: model={}, in={}, out={}, follow_ups={}",
            self.model,
            result.usage.input_tokens,
            result.usage.output_tokens,
            follow_up_questions.len()
        );

        Ok(ModelReply {
            text,
            follow_up_questions,
        })
    }
}

/// Splits the model output into user-visible text and follow-up questions.
/// Anything that does not parse cleanly is treated as plain text.
fn extract_follow_ups(content: &str) -> (String, Vec<FollowUpQuestion>) {
    let Some(fence_start) = content.rfind(FOLLOW_UP_FENCE) else {
        return (content.trim().to_string(), Vec::new());
    };

    let after_fence = &content[fence_start + FOLLOW_UP_FENCE.len()..];
    let Some(fence_end) = after_fence.find("```") else {
        return (content.trim().to_string(), Vec::new());
    };

    let block = &after_fence[..fence_end];
    match serde_json::from_str::<FollowUpPayload>(block.trim()) {
        Ok(payload) => {
            let mut text = content[..fence_start].trim().to_string();
            let tail = after_fence[fence_end + 3..].trim();
            if !tail.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(tail);
            }
            (text, payload.follow_up_questions)
        }
        Err(e) => {
            debug!("Ignoring unparseable follow-up block: {}", e);
            (content.trim().to_string(), Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_has_no_follow_ups() {
        let (text, questions) = extract_follow_ups("Feed adult cats twice a day.");
        assert_eq!(text, "Feed adult cats twice a day.");
        assert!(questions.is_empty());
    }

    #[test]
    fn test_fenced_block_is_parsed_and_stripped() {
        let content = "I need a bit more detail first.\n\n```json\n{\"follow_up_questions\":[\
            {\"question\":\"How old is your cat?\",\"options\":[\"Under 1\",\"1-7\",\"Over 7\"]},\
            {\"question\":\"Indoor or outdoor?\",\"options\":[\"Indoor\",\"Outdoor\"]}]}\n```";

        let (text, questions) = extract_follow_ups(content);
        assert_eq!(text, "I need a bit more detail first.");
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].question, "How old is your cat?");
        assert_eq!(questions[0].options.len(), 3);
    }

    #[test]
    fn test_malformed_block_treated_as_text() {
        let content = "Answer.\n```json\n{not json}\n```";
        let (text, questions) = extract_follow_ups(content);
        assert_eq!(text, content.trim());
        assert!(questions.is_empty());
    }

    #[test]
    fn test_unterminated_fence_treated_as_text() {
        let content = "Answer.\n```json\n{\"follow_up_questions\": []}";
        let (text, questions) = extract_follow_ups(content);
        assert_eq!(text, content.trim());
        assert!(questions.is_empty());
    }

    #[test]
    fn test_empty_question_list_means_no_questionnaire() {
        let content = "All good.\n```json\n{\"follow_up_questions\": []}\n```";
        let (text, questions) = extract_follow_ups(content);
        assert_eq!(text, "All good.");
        assert!(questions.is_empty());
    }
}
