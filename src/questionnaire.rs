//! Questionnaire variants
//!
//! An explicit sum type over the two finite-answer-sequence engines: model
//! supplied follow-up questions, and the fixed pet-profile schema. Both share
//! the same capability set (current question, process answer, results) and
//! the same invariant: the index advances by exactly one per validated
//! answer and never on failure.

use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::profile::PROFILE_FIELDS;

/// Free-text answers are bounded to keep prompts sane.
pub const MAX_ANSWER_CHARS: usize = 500;

/// A question as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub text: String,
    /// Predefined answers rendered as suggested replies. May be empty.
    pub options: Vec<String>,
}

/// One answered (or pending) follow-up question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpItem {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// A follow-up question as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A completed (question, answer) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// Model-driven clarification questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpQuestionnaire {
    /// The model's preliminary text from the turn that started the
    /// questionnaire.
    pub initial_prompt: String,
    items: Vec<FollowUpItem>,
    current: usize,
}

impl FollowUpQuestionnaire {
    pub fn new(initial_prompt: &str, questions: Vec<FollowUpQuestion>) -> Self {
        let items = questions
            .into_iter()
            .map(|q| FollowUpItem {
                question: q.question,
                options: q.options,
                answer: None,
            })
            .collect();
        Self {
            initial_prompt: initial_prompt.to_string(),
            items,
            current: 0,
        }
    }

    fn process_answer(&mut self, text: &str) -> Result<(), BotError> {
        let answer = text.trim();
        if answer.is_empty() {
            return Err(BotError::InvalidAnswer(
                "Please answer with a short text message.".to_string(),
            ));
        }
        if answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(BotError::InvalidAnswer(format!(
                "Please keep the answer under {} characters.",
                MAX_ANSWER_CHARS
            )));
        }
        let item = self
            .items
            .get_mut(self.current)
            .ok_or(BotError::NoMoreQuestions)?;
        item.answer = Some(answer.to_string());
        self.current += 1;
        Ok(())
    }
}

/// The fixed pet-profile sequence; questions and validators come from the
/// static schema, only the answers and the cursor are state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileQuestionnaire {
    answers: Vec<Option<String>>,
    current: usize,
}

impl ProfileQuestionnaire {
    pub fn new() -> Self {
        Self {
            answers: vec![None; PROFILE_FIELDS.len()],
            current: 0,
        }
    }

    fn process_answer(&mut self, text: &str) -> Result<(), BotError> {
        let field = PROFILE_FIELDS
            .get(self.current)
            .ok_or(BotError::NoMoreQuestions)?;
        let normalized = (field.validate)(text)?;
        self.answers[self.current] = Some(normalized);
        self.current += 1;
        Ok(())
    }
}

impl Default for ProfileQuestionnaire {
    fn default() -> Self {
        Self::new()
    }
}

/// The active questionnaire of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Questionnaire {
    FollowUp(FollowUpQuestionnaire),
    Profile(ProfileQuestionnaire),
}

impl Questionnaire {
    pub fn len(&self) -> usize {
        match self {
            Self::FollowUp(q) => q.items.len(),
            Self::Profile(q) => q.answers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_index(&self) -> usize {
        match self {
            Self::FollowUp(q) => q.current,
            Self::Profile(q) => q.current,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_index() == self.len()
    }

    /// Role string of the consolidated history message.
    pub fn marker_role(&self) -> &'static str {
        match self {
            Self::FollowUp(_) => "questionnaire",
            Self::Profile(_) => "pet-profile",
        }
    }

    /// The next unanswered question, or `NoMoreQuestions` past the end.
    pub fn current_question(&self) -> Result<QuestionPrompt, BotError> {
        match self {
            Self::FollowUp(q) => {
                let item = q.items.get(q.current).ok_or(BotError::NoMoreQuestions)?;
                Ok(QuestionPrompt {
                    text: item.question.clone(),
                    options: item.options.clone(),
                })
            }
            Self::Profile(q) => {
                let field = PROFILE_FIELDS.get(q.current).ok_or(BotError::NoMoreQuestions)?;
                Ok(QuestionPrompt {
                    text: field.prompt.to_string(),
                    options: field.options.iter().map(|s| s.to_string()).collect(),
                })
            }
        }
    }

    /// Validates and records an answer. The index advances only on success.
    /// Returns whether the questionnaire is now complete.
    pub fn process_answer(&mut self, text: &str) -> Result<bool, BotError> {
        match self {
            Self::FollowUp(q) => q.process_answer(text)?,
            Self::Profile(q) => q.process_answer(text)?,
        }
        Ok(self.is_complete())
    }

    /// The full ordered (question, answer) sequence. Fails with `Incomplete`
    /// while any question is unanswered.
    pub fn results(&self) -> Result<Vec<QuestionAnswer>, BotError> {
        if !self.is_complete() {
            return Err(BotError::Incomplete);
        }
        match self {
            Self::FollowUp(q) => Ok(q
                .items
                .iter()
                .map(|item| QuestionAnswer {
                    question: item.question.clone(),
                    answer: item.answer.clone().unwrap_or_default(),
                })
                .collect()),
            Self::Profile(q) => Ok(PROFILE_FIELDS
                .iter()
                .zip(q.answers.iter())
                .map(|(field, answer)| QuestionAnswer {
                    question: field.prompt.to_string(),
                    answer: answer.clone().unwrap_or_default(),
                })
                .collect()),
        }
    }
}
