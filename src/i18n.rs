//! Message catalog
//!
//! User-facing strings keyed by language and message key. Per-user language
//! preferences live here too so the error boundary and the command handlers
//! resolve text the same way.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::BotError;

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lang {
    #[default]
    En,
    Ru,
}

/// Keys for every user-visible template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Welcome,
    Help,
    Terms,
    QuestionnaireCanceled,
    NothingToCancel,
    ProfileIntro,
    ProfileSaved,
    UnknownCommand,
    HourlyLimit,
    DailyLimit,
    MessageTooLong,
    GenericError,
}

static CATALOGS: Lazy<HashMap<Lang, HashMap<MessageKey, &'static str>>> = Lazy::new(|| {
    use MessageKey::*;

    let en: HashMap<MessageKey, &'static str> = [
        (Welcome, "Hi! I'm your pet-care assistant. Ask me anything about your pet, or use /editprofile to tell me about them."),
        (Help, "Send me a question about your pet and I'll do my best to help.\n\n/editprofile - set up your pet's profile\n/cancel - abort the current questionnaire\n/terms - terms of use"),
        (Terms, "I give general pet-care guidance, not veterinary diagnoses. For anything urgent, contact a veterinarian."),
        (QuestionnaireCanceled, "Okay, canceled. Ask me anything."),
        (NothingToCancel, "There is nothing to cancel right now."),
        (ProfileIntro, "Let's set up your pet's profile."),
        (ProfileSaved, "All set! Your pet's profile is saved."),
        (UnknownCommand, "I don't know that command. Try /help."),
        (HourlyLimit, "You've reached the hourly question limit. Please try again a bit later."),
        (DailyLimit, "You've reached the daily question limit. Please come back tomorrow."),
        (MessageTooLong, "That message is too long for me. Could you shorten it?"),
        (GenericError, "Something went wrong on my side. Please try again."),
    ]
    .into_iter()
    .collect();

    let ru: HashMap<MessageKey, &'static str> = [
        (Welcome, "Привет! Я помощник по уходу за питомцами. Задайте вопрос или настройте профиль питомца через /editprofile."),
        (Help, "Отправьте вопрос о вашем питомце, и я постараюсь помочь.\n\n/editprofile - профиль питомца\n/cancel - отменить текущий опрос\n/terms - условия использования"),
        (Terms, "Я даю общие советы по уходу, а не ветеринарные диагнозы. В срочных случаях обратитесь к ветеринару."),
        (QuestionnaireCanceled, "Хорошо, отменил. Задайте любой вопрос."),
        (NothingToCancel, "Сейчас нечего отменять."),
        (ProfileIntro, "Давайте заполним профиль питомца."),
        (ProfileSaved, "Готово! Профиль питомца сохранён."),
        (UnknownCommand, "Я не знаю такой команды. Попробуйте /help."),
        (HourlyLimit, "Достигнут лимит вопросов в час. Попробуйте чуть позже."),
        (DailyLimit, "Достигнут дневной лимит вопросов. Возвращайтесь завтра."),
        (MessageTooLong, "Сообщение слишком длинное. Сократите его, пожалуйста."),
        (GenericError, "Что-то пошло не так. Попробуйте ещё раз."),
    ]
    .into_iter()
    .collect();

    HashMap::from([(Lang::En, en), (Lang::Ru, ru)])
});

/// Message catalog plus per-user language preferences.
pub struct Localizer {
    default_lang: Lang,
    prefs: Mutex<HashMap<i64, Lang>>,
}

impl Localizer {
    pub fn new(default_lang: Lang) -> Self {
        Self {
            default_lang,
            prefs: Mutex::new(HashMap::new()),
        }
    }

    /// Resolved language for a user (preference, then default).
    pub fn lang_for(&self, user_id: i64) -> Lang {
        self.prefs
            .lock()
            .get(&user_id)
            .copied()
            .unwrap_or(self.default_lang)
    }

    pub fn set_lang(&self, user_id: i64, lang: Lang) {
        self.prefs.lock().insert(user_id, lang);
    }

    /// Catalog lookup with English fallback.
    pub fn text(&self, lang: Lang, key: MessageKey) -> &'static str {
        CATALOGS
            .get(&lang)
            .and_then(|catalog| catalog.get(&key))
            .or_else(|| CATALOGS.get(&Lang::En).and_then(|catalog| catalog.get(&key)))
            .copied()
            .unwrap_or("")
    }

    /// User-facing text for a failed request, selected by error kind.
    pub fn error_text(&self, lang: Lang, err: &BotError) -> String {
        match err {
            BotError::HourlyLimitExceeded => self.text(lang, MessageKey::HourlyLimit).to_string(),
            BotError::DailyLimitExceeded => self.text(lang, MessageKey::DailyLimit).to_string(),
            BotError::TextTooLong { .. } => self.text(lang, MessageKey::MessageTooLong).to_string(),
            // Validator reasons are already written for the user.
            BotError::InvalidAnswer(reason) => reason.clone(),
            _ => self.text(lang, MessageKey::GenericError).to_string(),
        }
    }
}
