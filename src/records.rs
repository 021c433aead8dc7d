//! Typed rows for the five persisted datasets.
//!
//! Cells written by older versions or edited by hand may hold numbers where
//! text is expected, or `""` where a count is expected, so every field is
//! decoded leniently.

use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::store::Record;

pub const STATUS_SENT: &str = "Sent";

/// Current wall-clock time in `tz`, as stored in the tables.
pub fn timestamp(tz: Tz) -> String {
    Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f.max(0.0) as u32).unwrap_or(0),
        _ => 0,
    })
}

/// SMS or voice call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Sms,
    Voice,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Sms => "sms",
            MessageKind::Voice => "voice",
        }
    }

    /// Anything other than `voice` is treated as an SMS.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("voice") {
            MessageKind::Voice
        } else {
            MessageKind::Sms
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        lenient_string(d).map(|s| MessageKind::parse(&s))
    }
}

/// Reminder lifecycle. Only `Pending -> Completed` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReminderStatus {
    #[default]
    Pending,
    Completed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "Pending",
            ReminderStatus::Completed => "Completed",
        }
    }
}

impl Serialize for ReminderStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReminderStatus {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = lenient_string(d)?;
        Ok(if s.trim().eq_ignore_ascii_case("completed") {
            ReminderStatus::Completed
        } else {
            ReminderStatus::Pending
        })
    }
}

/// An outreach partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    #[serde(rename = "Name", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "Role", deserialize_with = "lenient_string")]
    pub role: String,
    /// Comma-separated language names.
    #[serde(rename = "Language", deserialize_with = "lenient_string")]
    pub languages: String,
    #[serde(rename = "Contact", deserialize_with = "lenient_string")]
    pub contact: String,
    #[serde(rename = "CampaignAssigned", deserialize_with = "lenient_string")]
    pub campaign: String,
}

impl Record for Partner {
    const COLUMNS: &'static [&'static str] =
        &["Name", "Role", "Language", "Contact", "CampaignAssigned"];
    const FILE_NAME: &'static str = "partners.json";
}

/// A delivered message. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    #[serde(rename = "Recipient", deserialize_with = "lenient_string")]
    pub recipient: String,
    #[serde(rename = "Message", deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(rename = "Language", deserialize_with = "lenient_string")]
    pub language: String,
    #[serde(rename = "DateSent", deserialize_with = "lenient_string")]
    pub date_sent: String,
    #[serde(rename = "Type")]
    pub kind: MessageKind,
    #[serde(rename = "Status", deserialize_with = "lenient_string")]
    pub status: String,
}

impl MessageLogEntry {
    pub fn sent(recipient: &str, message: &str, language: &str, kind: MessageKind, date_sent: String) -> Self {
        Self {
            recipient: recipient.to_string(),
            message: message.to_string(),
            language: language.to_string(),
            date_sent,
            kind,
            status: STATUS_SENT.to_string(),
        }
    }
}

impl Record for MessageLogEntry {
    const COLUMNS: &'static [&'static str] =
        &["Recipient", "Message", "Language", "DateSent", "Type", "Status"];
    const FILE_NAME: &'static str = "message_logs.json";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(rename = "Name", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "Message", deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(rename = "Language", deserialize_with = "lenient_string")]
    pub language: String,
    #[serde(rename = "DateSubmitted", deserialize_with = "lenient_string")]
    pub date_submitted: String,
}

impl Record for FeedbackEntry {
    const COLUMNS: &'static [&'static str] = &["Name", "Message", "Language", "DateSubmitted"];
    const FILE_NAME: &'static str = "feedback.json";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    #[serde(rename = "Task", deserialize_with = "lenient_string")]
    pub task: String,
    /// `YYYY-MM-DD`
    #[serde(rename = "DueDate", deserialize_with = "lenient_string")]
    pub due_date: String,
    #[serde(rename = "AssignedTo", deserialize_with = "lenient_string")]
    pub assigned_to: String,
    #[serde(rename = "Status")]
    pub status: ReminderStatus,
}

impl Record for Reminder {
    const COLUMNS: &'static [&'static str] = &["Task", "DueDate", "AssignedTo", "Status"];
    const FILE_NAME: &'static str = "reminders.json";
}

/// A message waiting for a successful send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    #[serde(rename = "Recipient", deserialize_with = "lenient_string")]
    pub recipient: String,
    #[serde(rename = "Message", deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(rename = "Language", deserialize_with = "lenient_string")]
    pub language: String,
    #[serde(rename = "DateCreated", deserialize_with = "lenient_string")]
    pub date_created: String,
    #[serde(rename = "Type")]
    pub kind: MessageKind,
    #[serde(rename = "Attempts", deserialize_with = "lenient_count")]
    pub attempts: u32,
}

impl Record for OutboxEntry {
    const COLUMNS: &'static [&'static str] =
        &["Recipient", "Message", "Language", "DateCreated", "Type", "Attempts"];
    const FILE_NAME: &'static str = "outbox.json";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use serde_json::json;

    fn decode<R: Record>(value: Value) -> R {
        let mut table = Table::new(R::COLUMNS);
        match value {
            Value::Object(row) => table.push(row),
            _ => panic!("expected object"),
        }
        table.to_records::<R>().unwrap().remove(0)
    }

    #[test]
    fn test_backfilled_outbox_row_decodes() {
        let entry: OutboxEntry = decode(json!({"Recipient": 254700000001u64, "Message": "Karibu"}));
        assert_eq!(entry.recipient, "254700000001");
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.kind, MessageKind::Sms);
        assert_eq!(entry.language, "");
    }

    #[test]
    fn test_attempts_accept_strings_and_floats() {
        let entry: OutboxEntry = decode(json!({"Attempts": "2", "Type": "voice"}));
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.kind, MessageKind::Voice);

        let entry: OutboxEntry = decode(json!({"Attempts": 3.0}));
        assert_eq!(entry.attempts, 3);

        let entry: OutboxEntry = decode(json!({"Attempts": -4}));
        assert_eq!(entry.attempts, 0);
    }

    #[test]
    fn test_reminder_status_decoding() {
        let r: Reminder = decode(json!({"Task": "Visit Nyalenda", "Status": "Completed"}));
        assert_eq!(r.status, ReminderStatus::Completed);
        let r: Reminder = decode(json!({"Task": "Visit Manyatta"}));
        assert_eq!(r.status, ReminderStatus::Pending);
    }

    #[test]
    fn test_serializes_declared_column_names() {
        let table = Table::from_records(&[MessageLogEntry::sent(
            "+254700000001",
            "Hello",
            "English",
            MessageKind::Voice,
            "2026-01-05 09:00:00".to_string(),
        )])
        .unwrap();
        let keys: Vec<&String> = table.rows()[0].keys().collect();
        assert_eq!(keys, MessageLogEntry::COLUMNS);
        assert_eq!(table.rows()[0]["Type"], json!("voice"));
        assert_eq!(table.rows()[0]["Status"], json!("Sent"));
    }
}
