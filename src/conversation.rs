//! Conversation state machine
//!
//! Per-chat state: a bounded message history, the questioning mode, and the
//! active questionnaire. The invariant that holds after every public
//! operation: `state == Normal` exactly when no questionnaire is installed.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::questionnaire::{
    FollowUpQuestion, FollowUpQuestionnaire, ProfileQuestionnaire, QuestionAnswer, QuestionPrompt,
    Questionnaire,
};

/// Maximum messages kept per conversation (rolling window).
pub const MAX_HISTORY_MESSAGES: usize = 50;

/// Conversation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Normal,
    FollowUpQuestioning,
    ProfileQuestioning,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "user", "assistant", "questionnaire", "pet-profile"
    pub content: String,
    pub timestamp: i64, // Unix millis
}

fn default_max_history() -> usize {
    MAX_HISTORY_MESSAGES
}

/// Per-chat conversation state. Created on first contact, mutated by every
/// turn, evicted only by repository TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub chat_id: i64,
    state: State,
    messages: Vec<ChatMessage>,
    questionnaire: Option<Questionnaire>,
    #[serde(default = "default_max_history")]
    max_history: usize,
}

impl Conversation {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            state: State::Normal,
            messages: Vec::new(),
            questionnaire: None,
            max_history: MAX_HISTORY_MESSAGES,
        }
    }

    /// Test hook: smaller rolling window.
    pub fn with_max_history(chat_id: i64, max_history: usize) -> Self {
        let mut conversation = Self::new(chat_id);
        conversation.max_history = max_history;
        conversation
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_questioning(&self) -> bool {
        self.state != State::Normal
    }

    /// Appends a message and trims the history to the rolling window,
    /// oldest first.
    pub fn add_message(&mut self, role: &str, content: &str) {
        self.messages.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
        if self.messages.len() > self.max_history {
            let excess = self.messages.len() - self.max_history;
            self.messages.drain(..excess);
        }
    }

    /// Installs a follow-up questionnaire from model output and switches to
    /// `FollowUpQuestioning`. An empty question list is a caller bug.
    pub fn start_follow_up_questions(
        &mut self,
        initial_prompt: &str,
        questions: Vec<FollowUpQuestion>,
    ) -> Result<(), BotError> {
        if questions.is_empty() {
            return Err(BotError::NoQuestions);
        }
        self.questionnaire = Some(Questionnaire::FollowUp(FollowUpQuestionnaire::new(
            initial_prompt,
            questions,
        )));
        self.state = State::FollowUpQuestioning;
        Ok(())
    }

    /// Installs the fixed profile questionnaire and switches to
    /// `ProfileQuestioning`.
    pub fn start_profile_questions(&mut self) {
        self.questionnaire = Some(Questionnaire::Profile(ProfileQuestionnaire::new()));
        self.state = State::ProfileQuestioning;
    }

    /// The next unanswered question of the active questionnaire.
    pub fn current_question(&self) -> Result<QuestionPrompt, BotError> {
        self.active()?.current_question()
    }

    /// Delegates the answer to the active questionnaire. Validator failures
    /// pass through unchanged and nothing advances. On the final answer the
    /// conversation appends one consolidated history message under the
    /// questionnaire's marker role and resets to `Normal`.
    ///
    /// Returns whether the questionnaire completed on this answer.
    pub fn add_question_answer(&mut self, text: &str) -> Result<bool, BotError> {
        if self.state == State::Normal {
            return Err(BotError::NotQuestioning);
        }
        let questionnaire = self
            .questionnaire
            .as_mut()
            .ok_or(BotError::MissingQuestionnaire)?;

        let complete = questionnaire.process_answer(text)?;
        if !complete {
            return Ok(false);
        }

        let role = questionnaire.marker_role();
        let summary = Self::consolidate(&questionnaire.results()?);
        self.add_message(role, &summary);
        self.questionnaire = None;
        self.state = State::Normal;
        Ok(true)
    }

    /// The full (question, answer) sequence of the active questionnaire.
    pub fn questionnaire_result(&self) -> Result<Vec<QuestionAnswer>, BotError> {
        self.active()?.results()
    }

    /// Unconditionally discards the active questionnaire and returns to
    /// `Normal`. Used for explicit /cancel.
    pub fn cancel_questionnaire(&mut self) {
        self.questionnaire = None;
        self.state = State::Normal;
    }

    fn active(&self) -> Result<&Questionnaire, BotError> {
        if self.state == State::Normal {
            return Err(BotError::NotQuestioning);
        }
        self.questionnaire
            .as_ref()
            .ok_or(BotError::MissingQuestionnaire)
    }

    fn consolidate(results: &[QuestionAnswer]) -> String {
        let mut summary = String::new();
        for pair in results {
            summary.push_str(&format!("Q: {}\nA: {}\n\n", pair.question, pair.answer));
        }
        summary
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        (self.state == State::Normal) == self.questionnaire.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_questions() -> Vec<FollowUpQuestion> {
        vec![
            FollowUpQuestion {
                question: "How old is your cat?".to_string(),
                options: vec!["Under 1".to_string(), "1-7".to_string(), "Over 7".to_string()],
            },
            FollowUpQuestion {
                question: "Any known allergies?".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
            },
        ]
    }

    #[test]
    fn test_invariant_after_every_operation() {
        let mut conv = Conversation::new(1);
        assert!(conv.invariant_holds());

        conv.add_message("user", "hello");
        assert!(conv.invariant_holds());

        conv.start_follow_up_questions("ctx", two_questions()).unwrap();
        assert!(conv.invariant_holds());
        assert_eq!(conv.state(), State::FollowUpQuestioning);

        conv.add_question_answer("1-7").unwrap();
        assert!(conv.invariant_holds());

        conv.add_question_answer("No").unwrap();
        assert!(conv.invariant_holds());
        assert_eq!(conv.state(), State::Normal);

        conv.start_profile_questions();
        assert!(conv.invariant_holds());
        assert_eq!(conv.state(), State::ProfileQuestioning);

        conv.cancel_questionnaire();
        assert!(conv.invariant_holds());
        assert_eq!(conv.state(), State::Normal);
    }

    #[test]
    fn test_history_rolling_window() {
        let mut conv = Conversation::with_max_history(1, 5);
        for i in 0..9 {
            conv.add_message("user", &format!("Message {}", i));
        }
        assert_eq!(conv.messages().len(), 5);
        assert_eq!(conv.messages()[0].content, "Message 4");
        assert_eq!(conv.messages()[4].content, "Message 8");
    }

    #[test]
    fn test_question_access_in_normal_state() {
        let conv = Conversation::new(1);
        assert!(matches!(conv.current_question(), Err(BotError::NotQuestioning)));
        assert!(matches!(
            conv.questionnaire_result(),
            Err(BotError::NotQuestioning)
        ));

        let mut conv = Conversation::new(1);
        assert!(matches!(
            conv.add_question_answer("answer"),
            Err(BotError::NotQuestioning)
        ));
    }

    #[test]
    fn test_empty_follow_ups_rejected() {
        let mut conv = Conversation::new(1);
        assert!(matches!(
            conv.start_follow_up_questions("ctx", Vec::new()),
            Err(BotError::NoQuestions)
        ));
        assert_eq!(conv.state(), State::Normal);
    }

    #[test]
    fn test_completion_synthesizes_marker_message() {
        let mut conv = Conversation::new(1);
        conv.add_message("user", "What food is good for cats?");
        conv.start_follow_up_questions("need details", two_questions()).unwrap();

        assert!(!conv.add_question_answer("1-7").unwrap());
        assert!(conv.add_question_answer("No").unwrap());

        let last = conv.messages().last().unwrap();
        assert_eq!(last.role, "questionnaire");
        assert!(last.content.contains("Q: How old is your cat?"));
        assert!(last.content.contains("A: 1-7"));
        assert!(last.content.contains("Q: Any known allergies?"));
        assert!(last.content.contains("A: No"));
    }

    #[test]
    fn test_profile_completion_uses_profile_role() {
        let mut conv = Conversation::new(1);
        conv.start_profile_questions();

        for answer in ["Rex", "dog", "Labrador", "2019-03-02", "male", "28"] {
            conv.add_question_answer(answer).unwrap();
        }

        assert_eq!(conv.state(), State::Normal);
        let last = conv.messages().last().unwrap();
        assert_eq!(last.role, "pet-profile");
        assert!(last.content.contains("A: Rex"));
    }

    #[test]
    fn test_validator_failure_keeps_question() {
        let mut conv = Conversation::new(1);
        conv.start_profile_questions();

        let before = conv.current_question().unwrap();
        assert!(matches!(
            conv.add_question_answer("   "),
            Err(BotError::InvalidAnswer(_))
        ));
        let after = conv.current_question().unwrap();
        assert_eq!(before, after);
        assert_eq!(conv.state(), State::ProfileQuestioning);
    }

    #[test]
    fn test_result_incomplete_mid_flight() {
        let mut conv = Conversation::new(1);
        conv.start_follow_up_questions("ctx", two_questions()).unwrap();
        conv.add_question_answer("1-7").unwrap();
        assert!(matches!(conv.questionnaire_result(), Err(BotError::Incomplete)));
    }

    #[test]
    fn test_cancel_discards_progress() {
        let mut conv = Conversation::new(1);
        conv.start_follow_up_questions("ctx", two_questions()).unwrap();
        conv.add_question_answer("1-7").unwrap();

        conv.cancel_questionnaire();
        assert_eq!(conv.state(), State::Normal);
        // No consolidated message was written.
        assert!(conv.messages().iter().all(|m| m.role != "questionnaire"));
    }

    #[test]
    fn test_serde_round_trip_preserves_state() {
        let mut conv = Conversation::new(42);
        conv.add_message("user", "What food is good for cats?");
        conv.start_follow_up_questions("need details", two_questions()).unwrap();
        conv.add_question_answer("1-7").unwrap();

        let encoded = serde_json::to_string(&conv).unwrap();
        let decoded: Conversation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(conv, decoded);
        assert_eq!(decoded.state(), State::FollowUpQuestioning);
        assert_eq!(decoded.current_question().unwrap().text, "Any known allergies?");
    }
}
