//! Translation of outreach text into the campaign languages.
//!
//! Luo and Luhya use a fixed phrase table (exact match only). Swahili goes to
//! an external LibreTranslate-compatible service when one is configured.
//! English is the source language and passes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    English,
    Swahili,
    Luo,
    Luhya,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::English, Language::Swahili, Language::Luo, Language::Luhya];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Swahili => "Swahili",
            Language::Luo => "Luo",
            Language::Luhya => "Luhya",
        }
    }

    /// Case-insensitive name lookup.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|l| l.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const LUO: &[(&str, &str)] = &[
    ("What is SHA?", "SHA en Social Health Authority, ma orit gi dhok yi mondo giko gi bedo mag dhok."),
    ("How can I register for SHA?", "Inyalo registr kendo e health center maduong' gi e SHA portal."),
    ("Which services are covered?", "SHA en giko mag preventive care, maternal care, kod treatments ma nyaka."),
    ("Thank you for your feedback!", "Awuoyo gi nyalo walo!"),
];

const LUHYA: &[(&str, &str)] = &[
    ("What is SHA?", "SHA ni Social Health Authority, ebuya amagara netaweire."),
    ("How can I register for SHA?", "Olwikhilire kuhealth center oba e SHA portal."),
    ("Which services are covered?", "SHA ibuyire preventive care, maternal care, ne essential treatments."),
    ("Thank you for your feedback!", "Webale muno okhu"),
];

fn phrase(language: Language, text: &str) -> Option<&'static str> {
    let table = match language {
        Language::Luo => LUO,
        Language::Luhya => LUHYA,
        _ => return None,
    };
    table.iter().find(|(source, _)| *source == text).map(|(_, target)| *target)
}

/// External machine translation.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate English `text` into the language with code `target`.
    async fn translate(&self, text: &str, target: &str) -> Result<String, Error>;
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'static str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Deserialize)]
struct TranslateErrorBody {
    error: String,
}

/// Client for a LibreTranslate-compatible `/translate` endpoint.
pub struct HttpTranslator {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTranslator {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: std::time::Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl TranslationService for HttpTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String, Error> {
        let request = TranslateRequest {
            q: text,
            source: "en",
            target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("HTTP error: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TranslateErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(Error::Transport(format!("Translation error {status}: {detail}")));
        }

        let parsed: TranslateResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Transport(format!("Failed to parse response: {e}")))?;
        Ok(parsed.translated_text)
    }
}

/// Resolves (text, language) to translated text.
pub struct Translator {
    service: Option<Box<dyn TranslationService>>,
}

impl Translator {
    pub fn new(service: Option<Box<dyn TranslationService>>) -> Self {
        Self { service }
    }

    pub fn from_config(config: &Config) -> Self {
        let service = config.translation.as_ref().and_then(|settings| {
            match HttpTranslator::new(settings.endpoint.clone(), settings.api_key.clone(), config.http_timeout) {
                Ok(client) => {
                    info!("Translation service: {}", settings.endpoint);
                    Some(Box::new(client) as Box<dyn TranslationService>)
                }
                Err(e) => {
                    warn!("Translation service disabled: {e}");
                    None
                }
            }
        });
        Self { service }
    }

    pub fn configured(&self) -> bool {
        self.service.is_some()
    }

    /// Translate `text` into `language`.
    ///
    /// English, unknown languages and phrases missing from the Luo/Luhya
    /// tables come back unchanged as `Ok`. Only the Swahili path can fail.
    pub async fn translate(&self, text: &str, language: &str) -> Result<String, Error> {
        if text.is_empty() {
            return Ok(String::new());
        }
        match Language::parse(language) {
            Some(lang @ (Language::Luo | Language::Luhya)) => {
                Ok(phrase(lang, text).unwrap_or(text).to_string())
            }
            Some(Language::Swahili) => match &self.service {
                Some(service) => service.translate(text, "sw").await,
                None => Err(Error::Unconfigured("translation service")),
            },
            Some(Language::English) | None => Ok(text.to_string()),
        }
    }

    /// [`Translator::translate`], degrading to the input text on any failure.
    pub async fn translate_or_identity(&self, text: &str, language: &str) -> String {
        match self.translate(text, language).await {
            Ok(translated) => translated,
            Err(e) if e.is_unconfigured() => {
                debug!("Not translating to {language}: {e}");
                text.to_string()
            }
            Err(e) => {
                warn!("Translation to {language} failed: {e}");
                text.to_string()
            }
        }
    }
}
