//! Integration tests against the real messaging, language model and
//! translation services.
//!
//! Credentials come from the same environment variables the app reads.
//! Each test skips itself when its service is not configured.
//!
//! Run with: cargo test --features integ_test --test live_providers

#[cfg(feature = "integ_test")]
mod tests {
    use sha_connect::chatbot::{Chatbot, ReplySource};
    use sha_connect::config::Config;
    use sha_connect::gateway::MessagingGateway;
    use sha_connect::translate::Translator;

    fn config() -> Config {
        Config::load("/nonexistent/sha_connect.json").expect("config from environment")
    }

    /// Sends a real SMS to LIVE_TEST_RECIPIENT.
    #[tokio::test]
    async fn test_twilio_sms() {
        let config = config();
        let Ok(to) = std::env::var("LIVE_TEST_RECIPIENT") else {
            eprintln!("Skipping test: LIVE_TEST_RECIPIENT not set");
            return;
        };
        let gateway = MessagingGateway::from_config(&config);
        if !gateway.configured() {
            eprintln!("Skipping test: Twilio credentials not set");
            return;
        }

        let sid = gateway.send_sms(&to, "SHA Connect live test").await;
        assert!(sid.is_ok(), "send failed: {:?}", sid.err());
        assert!(sid.unwrap().starts_with("SM"));
    }

    #[tokio::test]
    async fn test_openai_answer() {
        let config = config();
        let chatbot = Chatbot::from_config(&config);
        if !chatbot.configured() {
            eprintln!("Skipping test: OPENAI_API_KEY not set");
            return;
        }

        let reply = chatbot.answer("What does SHA cover?").await;
        assert_eq!(reply.source, ReplySource::LanguageModel);
        assert!(!reply.text.trim().is_empty());
    }

    #[tokio::test]
    async fn test_swahili_translation() {
        let config = config();
        let translator = Translator::from_config(&config);
        if !translator.configured() {
            eprintln!("Skipping test: TRANSLATE_ENDPOINT not set");
            return;
        }

        let text = translator.translate("Good morning", "Swahili").await.expect("translation");
        assert!(!text.is_empty());
        assert_ne!(text, "Good morning");
    }
}
