//! SMS and voice dispatch through Twilio.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::records::MessageKind;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// The third-party transport. Each call returns the provider's reference id.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn create_message(&self, body: &str, from: &str, to: &str) -> Result<String, Error>;
    async fn create_call(&self, twiml: &str, from: &str, to: &str) -> Result<String, Error>;
}

#[derive(Deserialize)]
struct ResourceResponse {
    sid: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
    code: Option<i64>,
}

/// Twilio REST client (Messages and Calls resources).
pub struct TwilioClient {
    account_sid: String,
    auth_token: String,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { account_sid, auth_token, http })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/Accounts/{}/{}.json",
            TWILIO_API_BASE,
            urlencoding::encode(&self.account_sid),
            resource
        )
    }

    async fn create(&self, resource: &str, form: &[(&str, &str)]) -> Result<String, Error> {
        let response = self
            .http
            .post(self.resource_url(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP error: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(ApiErrorBody { message, code: Some(code) }) => format!("{message} (code {code})"),
                Ok(ApiErrorBody { message, code: None }) => message,
                Err(_) => body,
            };
            return Err(Error::Transport(format!("Twilio error {status}: {detail}")));
        }

        let parsed: ResourceResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Transport(format!("Failed to parse response: {e}")))?;
        debug!("Twilio {} created: {}", resource, parsed.sid);
        Ok(parsed.sid)
    }
}

#[async_trait]
impl MessagingProvider for TwilioClient {
    async fn create_message(&self, body: &str, from: &str, to: &str) -> Result<String, Error> {
        self.create("Messages", &[("To", to), ("From", from), ("Body", body)]).await
    }

    async fn create_call(&self, twiml: &str, from: &str, to: &str) -> Result<String, Error> {
        self.create("Calls", &[("To", to), ("From", from), ("Twiml", twiml)]).await
    }
}

/// TwiML that reads `text` aloud.
pub fn say_twiml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    format!("<Response><Say>{escaped}</Say></Response>")
}

/// Sends SMS and places calls when credentials are available.
///
/// There is no dedup key: calling twice sends twice.
pub struct MessagingGateway {
    provider: Option<(Box<dyn MessagingProvider>, String)>,
}

impl MessagingGateway {
    pub fn new(provider: Box<dyn MessagingProvider>, from_number: String) -> Self {
        Self { provider: Some((provider, from_number)) }
    }

    pub fn unconfigured() -> Self {
        Self { provider: None }
    }

    pub fn from_config(config: &Config) -> Self {
        let Some(creds) = &config.twilio else {
            info!("Messaging not configured, sends will be queued");
            return Self::unconfigured();
        };
        match TwilioClient::new(creds.account_sid.clone(), creds.auth_token.clone(), config.http_timeout) {
            Ok(client) => {
                info!("Messaging via Twilio from {}", creds.from_number);
                Self::new(Box::new(client), creds.from_number.clone())
            }
            Err(e) => {
                warn!("Messaging disabled: {e}");
                Self::unconfigured()
            }
        }
    }

    pub fn configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String, Error> {
        let (provider, from) = self.provider.as_ref().ok_or(Error::Unconfigured("messaging"))?;
        let sid = provider.create_message(body, from, to).await?;
        info!("📨 SMS to {to}: {sid}");
        Ok(sid)
    }

    pub async fn make_call(&self, to: &str, spoken_text: &str) -> Result<String, Error> {
        let (provider, from) = self.provider.as_ref().ok_or(Error::Unconfigured("messaging"))?;
        let sid = provider.create_call(&say_twiml(spoken_text), from, to).await?;
        info!("📞 Call to {to}: {sid}");
        Ok(sid)
    }

    pub async fn dispatch(&self, kind: MessageKind, to: &str, body: &str) -> Result<String, Error> {
        match kind {
            MessageKind::Sms => self.send_sms(to, body).await,
            MessageKind::Voice => self.make_call(to, body).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{gateway, MockProvider};
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_never_calls_out() {
        let gw = MessagingGateway::unconfigured();
        assert!(!gw.configured());
        let err = gw.send_sms("+254700000001", "hi").await.unwrap_err();
        assert!(err.is_unconfigured());
        assert_eq!(err.to_string(), "messaging not configured");
        assert!(gw.make_call("+254700000001", "hi").await.unwrap_err().is_unconfigured());
    }

    #[tokio::test]
    async fn test_send_sms_returns_reference() {
        let provider = MockProvider::new();
        let gw = gateway(&provider);
        let sid = gw.send_sms("+254700000001", "Jisajili SHA").await.unwrap();
        assert_eq!(sid, "SM0001");

        let sent = provider.sent();
        assert_eq!(sent[0].resource, "Messages");
        assert_eq!(sent[0].content, "Jisajili SHA");
        assert_eq!(sent[0].from, "+15550000");
        assert_eq!(sent[0].to, "+254700000001");
    }

    #[tokio::test]
    async fn test_call_wraps_text_in_twiml() {
        let provider = MockProvider::new();
        let gw = gateway(&provider);
        gw.dispatch(MessageKind::Voice, "+254700000001", "Clinic <today> & tomorrow").await.unwrap();
        assert_eq!(
            provider.sent()[0].content,
            "<Response><Say>Clinic &lt;today&gt; &amp; tomorrow</Say></Response>"
        );
        assert_eq!(provider.sent()[0].resource, "Calls");
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let provider = MockProvider::failing("401 Unauthorized");
        let gw = gateway(&provider);
        match gw.send_sms("+254700000001", "hi").await {
            Err(Error::Transport(msg)) => assert!(msg.contains("401")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn test_resource_url_encodes_sid() {
        let client = TwilioClient::new("AC 1/2".to_string(), "t".to_string(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.resource_url("Messages"),
            "https://api.twilio.com/2010-04-01/Accounts/AC%201%2F2/Messages.json"
        );
    }
}
