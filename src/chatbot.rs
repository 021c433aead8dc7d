//! Question answering: language model first, FAQ keyword match as fallback.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llm::{LanguageModel, OpenAiClient};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for SHA health services in Kisumu. \
Keep answers short and local-language friendly.";

pub const NO_ANSWER: &str = "Sorry, I don't have an answer for that yet.";

pub const FAQS: &[(&str, &str)] = &[
    (
        "What is SHA?",
        "SHA stands for Social Health Authority, which provides health services and benefits.",
    ),
    (
        "How can I register for SHA?",
        "You can register at your nearest health center or via the SHA portal.",
    ),
    (
        "Which services are covered?",
        "SHA covers preventive care, maternal care, and essential treatments.",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    LanguageModel,
    Faq,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// First FAQ whose question or answer contains `question`, ignoring case.
/// A blank question is contained in everything and gets the first answer.
pub fn faq_answer(question: &str) -> Reply {
    let needle = question.trim().to_lowercase();
    let hit = FAQS
        .iter()
        .find(|(q, a)| q.to_lowercase().contains(&needle) || a.to_lowercase().contains(&needle));
    match hit {
        Some((_, answer)) => Reply { text: answer.to_string(), source: ReplySource::Faq },
        None => Reply { text: NO_ANSWER.to_string(), source: ReplySource::NoMatch },
    }
}

/// Stateless responder; every call stands alone.
pub struct Chatbot {
    model: Option<Box<dyn LanguageModel>>,
}

impl Chatbot {
    pub fn new(model: Option<Box<dyn LanguageModel>>) -> Self {
        Self { model }
    }

    pub fn from_config(config: &Config) -> Self {
        let model = config.openai.as_ref().and_then(|settings| {
            match OpenAiClient::new(settings.api_key.clone(), settings.model.clone(), config.http_timeout) {
                Ok(client) => {
                    info!("Chatbot using {}", client.model());
                    Some(Box::new(client) as Box<dyn LanguageModel>)
                }
                Err(e) => {
                    warn!("Language model disabled: {e}");
                    None
                }
            }
        });
        Self { model }
    }

    pub fn configured(&self) -> bool {
        self.model.is_some()
    }

    pub async fn answer(&self, question: &str) -> Reply {
        match &self.model {
            Some(model) => match model.complete(SYSTEM_PROMPT, question).await {
                Ok(text) => {
                    return Reply { text, source: ReplySource::LanguageModel };
                }
                Err(e) => warn!("Language model failed, falling back to FAQ: {e}"),
            },
            None => debug!("No language model, answering from FAQ"),
        }
        faq_answer(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    struct FixedModel(Result<&'static str, &'static str>);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn complete(&self, system_prompt: &str, _user_text: &str) -> Result<String, Error> {
            assert_eq!(system_prompt, SYSTEM_PROMPT);
            self.0.map(str::to_string).map_err(|e| Error::Transport(e.to_string()))
        }
    }

    #[tokio::test]
    async fn test_fallback_without_model() {
        let bot = Chatbot::new(None);
        let reply = bot.answer("How can I register for SHA?").await;
        assert_eq!(reply.text, "You can register at your nearest health center or via the SHA portal.");
        assert_eq!(reply.source, ReplySource::Faq);
    }

    #[tokio::test]
    async fn test_model_reply_preferred() {
        let bot = Chatbot::new(Some(Box::new(FixedModel(Ok("Visit Kisumu County Referral.")))));
        let reply = bot.answer("What is SHA?").await;
        assert_eq!(reply.text, "Visit Kisumu County Referral.");
        assert_eq!(reply.source, ReplySource::LanguageModel);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let bot = Chatbot::new(Some(Box::new(FixedModel(Err("timeout")))));
        let reply = bot.answer("maternal").await;
        assert_eq!(reply.text, FAQS[2].1);
        assert_eq!(reply.source, ReplySource::Faq);
    }

    #[test]
    fn test_substring_matches_answer_text_case_insensitively() {
        assert_eq!(faq_answer("SOCIAL HEALTH").text, FAQS[0].1);
        assert_eq!(faq_answer("portal").text, FAQS[1].1);
    }

    #[test]
    fn test_no_match() {
        let reply = faq_answer("where is the pharmacy?");
        assert_eq!(reply.text, NO_ANSWER);
        assert_eq!(reply.source, ReplySource::NoMatch);
    }

    #[test]
    fn test_blank_question_gets_first_faq() {
        for blank in ["", "   "] {
            let reply = faq_answer(blank);
            assert_eq!(reply.text, FAQS[0].1);
            assert_eq!(reply.source, ReplySource::Faq);
        }
    }
}
