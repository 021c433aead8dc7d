//! Application state shared across interactions.
//!
//! Tables are loaded once at startup and written back at the end of every
//! interaction. Only one process may use a data directory at a time: there is
//! no file locking and the last writer wins.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::chatbot::{Chatbot, Reply};
use crate::config::{Capabilities, Config};
use crate::error::Error;
use crate::gateway::MessagingGateway;
use crate::outbox::{DrainReport, Outbox};
use crate::records::{self, FeedbackEntry, MessageKind, MessageLogEntry, Partner, Reminder};
use crate::store::{Dataset, Record, StoreError};
use crate::translate::{Language, Translator};

static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{6,14}$").unwrap());

/// What happened to a send-now request.
#[derive(Debug)]
pub enum SendOutcome {
    /// Delivered; carries the provider reference.
    Sent(String),
    /// Not delivered; queued to the outbox with the reason.
    Queued(Error),
}

#[derive(Debug)]
pub enum SendError {
    Missing(&'static str),
    InvalidRecipient(String),
    /// Queuing the failed message did not reach disk.
    Storage(StoreError),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Missing(field) => write!(f, "{field} is required"),
            SendError::InvalidRecipient(to) => {
                write!(f, "'{to}' is not a phone number (use country code, e.g. +2547...)")
            }
            SendError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SendError {}

pub struct App {
    pub config: Config,
    pub partners: Dataset<Partner>,
    pub message_log: Dataset<MessageLogEntry>,
    pub feedback: Dataset<FeedbackEntry>,
    pub reminders: Dataset<Reminder>,
    pub outbox: Outbox,
    pub gateway: MessagingGateway,
    pub translator: Translator,
    pub chatbot: Chatbot,
    /// Display language for FAQ and chatbot output.
    pub language: Language,
}

impl App {
    /// Build services from `config` and load all tables.
    pub fn open(config: Config) -> Self {
        let gateway = MessagingGateway::from_config(&config);
        let translator = Translator::from_config(&config);
        let chatbot = Chatbot::from_config(&config);
        Self::with_services(config, gateway, translator, chatbot)
    }

    pub fn with_services(
        config: Config,
        gateway: MessagingGateway,
        translator: Translator,
        chatbot: Chatbot,
    ) -> Self {
        let dir = config.data_dir.clone();
        let tz = config.timezone;
        let app = Self {
            partners: load_or_quarantine(&dir, tz),
            message_log: load_or_quarantine(&dir, tz),
            feedback: load_or_quarantine(&dir, tz),
            reminders: load_or_quarantine(&dir, tz),
            outbox: Outbox::new(load_or_quarantine(&dir, tz), tz),
            gateway,
            translator,
            chatbot,
            language: Language::English,
            config,
        };
        info!(
            "Loaded {} partners, {} messages, {} feedback, {} reminders, {} queued",
            app.partners.len(),
            app.message_log.len(),
            app.feedback.len(),
            app.reminders.len(),
            app.outbox.len()
        );
        app
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            messaging: self.gateway.configured(),
            language_model: self.chatbot.configured(),
            translation: self.translator.configured(),
        }
    }

    pub fn now(&self) -> String {
        records::timestamp(self.config.timezone)
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.timezone).date_naive()
    }

    /// Write every table. All writes are attempted; the first failure is returned.
    pub fn persist_all(&self) -> Result<(), StoreError> {
        let results = [
            self.partners.persist(),
            self.message_log.persist(),
            self.feedback.persist(),
            self.reminders.persist(),
            self.outbox.persist(),
        ];
        let mut first = None;
        for result in results {
            if let Err(e) = result {
                error!("Persist failed: {e}");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Translate and send a message right away, queuing it on any failure.
    pub async fn send_now(
        &mut self,
        recipient: &str,
        text: &str,
        language: Language,
        kind: MessageKind,
    ) -> Result<SendOutcome, SendError> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(SendError::Missing("recipient"));
        }
        if text.trim().is_empty() {
            return Err(SendError::Missing("message"));
        }
        let compact: String = recipient.chars().filter(|c| !matches!(c, ' ' | '-')).collect();
        if !PHONE.is_match(&compact) {
            return Err(SendError::InvalidRecipient(recipient.to_string()));
        }

        let translated = self.translator.translate_or_identity(text, language.as_str()).await;

        match self.gateway.dispatch(kind, &compact, &translated).await {
            Ok(reference) => {
                let entry = MessageLogEntry::sent(&compact, &translated, language.as_str(), kind, self.now());
                self.message_log.push(entry);
                if let Err(e) = self.message_log.persist() {
                    // The send already happened; the end-of-cycle flush retries the write.
                    warn!("Message log not saved: {e}");
                }
                Ok(SendOutcome::Sent(reference))
            }
            Err(reason) => {
                self.outbox
                    .enqueue(&compact, &translated, language.as_str(), kind)
                    .map_err(SendError::Storage)?;
                Ok(SendOutcome::Queued(reason))
            }
        }
    }

    pub async fn drain_outbox(&mut self) -> DrainReport {
        let max_attempts = self.config.max_attempts;
        self.outbox.drain(&self.gateway, &mut self.message_log, max_attempts).await
    }

    /// Chatbot reply rendered in the display language.
    pub async fn ask(&self, question: &str) -> Reply {
        let mut reply = self.chatbot.answer(question).await;
        reply.text = self.translator.translate_or_identity(&reply.text, self.language.as_str()).await;
        reply
    }

    /// FAQ question/answer pairs rendered in the display language.
    pub async fn faqs(&self) -> Vec<(String, String)> {
        let lang = self.language.as_str();
        let mut out = Vec::with_capacity(crate::chatbot::FAQS.len());
        for (q, a) in crate::chatbot::FAQS {
            out.push((
                self.translator.translate_or_identity(q, lang).await,
                self.translator.translate_or_identity(a, lang).await,
            ));
        }
        out
    }
}

/// Load a dataset; an unreadable file is moved aside and the table starts empty.
fn load_or_quarantine<R: Record>(data_dir: &Path, tz: chrono_tz::Tz) -> Dataset<R> {
    match Dataset::load(data_dir) {
        Ok(dataset) => dataset,
        Err(e) => {
            let path = data_dir.join(R::FILE_NAME);
            let stamp = Utc::now().with_timezone(&tz).format("%Y%m%d%H%M%S");
            let aside = data_dir.join(format!("{}.corrupt-{}", R::FILE_NAME, stamp));
            match std::fs::rename(&path, &aside) {
                Ok(()) => warn!("{e}; moved to {} and starting empty", aside.display()),
                Err(re) => error!("{e}; could not move it aside ({re}), starting empty"),
            }
            Dataset::empty(data_dir)
        }
    }
}
