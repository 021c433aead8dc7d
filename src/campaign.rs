//! Partners, feedback, reminders and dashboard counts.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use crate::records::{FeedbackEntry, MessageLogEntry, Partner, Reminder, ReminderStatus};
use crate::store::{Dataset, StoreError};
use crate::translate::Language;

pub const ROLES: [&str; 3] = ["Community Leader", "Influencer", "Volunteer"];

#[derive(Debug)]
pub enum CampaignError {
    /// A required field was empty.
    Missing(&'static str),
    UnknownRole(String),
    UnknownLanguage(String),
    InvalidDueDate(String),
    NoSuchReminder(usize),
    Storage(StoreError),
}

impl fmt::Display for CampaignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "{field} is required"),
            Self::UnknownRole(role) => {
                write!(f, "unknown role '{role}' (expected one of: {})", ROLES.join(", "))
            }
            Self::UnknownLanguage(lang) => write!(f, "unknown language '{lang}'"),
            Self::InvalidDueDate(msg) => write!(f, "{msg}"),
            Self::NoSuchReminder(id) => write!(f, "no reminder #{id}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CampaignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for CampaignError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e)
    }
}

fn required(value: &str, field: &'static str) -> Result<String, CampaignError> {
    let value = value.trim();
    if value.is_empty() {
        Err(CampaignError::Missing(field))
    } else {
        Ok(value.to_string())
    }
}

fn language(name: &str) -> Result<Language, CampaignError> {
    Language::parse(name).ok_or_else(|| CampaignError::UnknownLanguage(name.trim().to_string()))
}

// ==================== PARTNERS ====================

#[derive(Debug, Clone, Default)]
pub struct NewPartner {
    pub name: String,
    pub role: String,
    pub languages: Vec<String>,
    pub contact: String,
    pub campaign: String,
}

pub fn add_partner(partners: &mut Dataset<Partner>, input: NewPartner) -> Result<(), CampaignError> {
    let name = required(&input.name, "partner name")?;
    let role = ROLES
        .iter()
        .find(|r| r.eq_ignore_ascii_case(input.role.trim()))
        .ok_or_else(|| CampaignError::UnknownRole(input.role.trim().to_string()))?;
    let languages = input
        .languages
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| language(l).map(|l| l.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    partners.push(Partner {
        name: name.clone(),
        role: role.to_string(),
        languages: languages.join(", "),
        contact: input.contact.trim().to_string(),
        campaign: input.campaign.trim().to_string(),
    });
    partners.persist()?;
    info!("🤝 Partner {name} added");
    Ok(())
}

/// Partners whose name contains `query`, ignoring case.
pub fn search_partners<'a>(partners: &'a [Partner], query: &str) -> Vec<&'a Partner> {
    let query = query.trim().to_lowercase();
    partners
        .iter()
        .filter(|p| p.name.to_lowercase().contains(&query))
        .collect()
}

// ==================== FEEDBACK ====================

pub fn submit_feedback(
    feedback: &mut Dataset<FeedbackEntry>,
    name: &str,
    message: &str,
    lang: &str,
    submitted_at: String,
) -> Result<(), CampaignError> {
    let name = required(name, "name")?;
    let message = required(message, "feedback")?;
    let lang = language(lang)?;

    feedback.push(FeedbackEntry {
        name,
        message,
        language: lang.as_str().to_string(),
        date_submitted: submitted_at,
    });
    feedback.persist()?;
    info!("💬 Feedback received ({})", lang);
    Ok(())
}

pub fn feedback_newest_first(feedback: &[FeedbackEntry]) -> Vec<&FeedbackEntry> {
    let mut sorted: Vec<&FeedbackEntry> = feedback.iter().collect();
    sorted.sort_by(|a, b| b.date_submitted.cmp(&a.date_submitted));
    sorted
}

// ==================== REMINDERS ====================

/// Parse a due date: "+3d", "+2w" relative to `today`, or absolute "2026-01-25".
pub fn parse_due_date(input: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let input = input.trim();

    if let Some(rest) = input.strip_prefix('+') {
        let unit_start = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if unit_start == 0 {
            return Err(format!("Invalid number in '{}'", input));
        }

        let num: i64 = rest[..unit_start]
            .parse()
            .map_err(|_| format!("Invalid number in '{}'", input))?;

        let duration = match &rest[unit_start..] {
            "" | "d" | "day" | "days" => Duration::try_days(num),
            "w" | "week" | "weeks" => Duration::try_weeks(num),
            unit => return Err(format!("Unknown unit '{}'. Use d/w", unit)),
        };
        return duration
            .and_then(|d| today.checked_add_signed(d))
            .ok_or_else(|| format!("Date out of range: '{}'", input));
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{}': {}. Use YYYY-MM-DD", input, e))
}

pub fn add_reminder(
    reminders: &mut Dataset<Reminder>,
    task: &str,
    due: &str,
    assigned_to: &str,
    today: NaiveDate,
) -> Result<(), CampaignError> {
    let task = required(task, "task")?;
    let assigned_to = required(assigned_to, "assignee")?;
    let due_date = if due.trim().is_empty() {
        today
    } else {
        parse_due_date(due, today).map_err(CampaignError::InvalidDueDate)?
    };

    reminders.push(Reminder {
        task: task.clone(),
        due_date: due_date.format("%Y-%m-%d").to_string(),
        assigned_to,
        status: ReminderStatus::Pending,
    });
    reminders.persist()?;
    info!("⏰ Reminder '{task}' due {due_date}");
    Ok(())
}

/// Mark reminder `id` completed. Returns `false` if it already was.
pub fn complete_reminder(reminders: &mut Dataset<Reminder>, id: usize) -> Result<bool, CampaignError> {
    let reminder = reminders
        .records_mut()
        .get_mut(id)
        .ok_or(CampaignError::NoSuchReminder(id))?;
    if reminder.status == ReminderStatus::Completed {
        return Ok(false);
    }
    reminder.status = ReminderStatus::Completed;
    info!("✅ Reminder '{}' completed", reminder.task);
    reminders.persist()?;
    Ok(true)
}

// ==================== DASHBOARD ====================

/// Occurrences of each key, blank keys grouped as "(none)".
pub fn count_by<T>(items: &[T], key: impl Fn(&T) -> &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        let k = key(item).trim();
        let k = if k.is_empty() { "(none)" } else { k };
        *counts.entry(k.to_string()).or_insert(0) += 1;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub messages_total: usize,
    pub messages_by_language: BTreeMap<String, usize>,
    pub partners_total: usize,
    pub partners_by_role: BTreeMap<String, usize>,
    pub feedback_total: usize,
    pub feedback_by_language: BTreeMap<String, usize>,
    pub reminders_pending: usize,
    pub reminders_completed: usize,
}

impl Dashboard {
    pub fn build(
        messages: &[MessageLogEntry],
        partners: &[Partner],
        feedback: &[FeedbackEntry],
        reminders: &[Reminder],
    ) -> Self {
        let pending = reminders.iter().filter(|r| r.status == ReminderStatus::Pending).count();
        Self {
            messages_total: messages.len(),
            messages_by_language: count_by(messages, |m| &m.language),
            partners_total: partners.len(),
            partners_by_role: count_by(partners, |p| &p.role),
            feedback_total: feedback.len(),
            feedback_by_language: count_by(feedback, |f| &f.language),
            reminders_pending: pending,
            reminders_completed: reminders.len() - pending,
        }
    }
}

/// The `n` most recent log rows, newest first.
pub fn recent_messages(log: &[MessageLogEntry], n: usize) -> Vec<&MessageLogEntry> {
    let mut sorted: Vec<&MessageLogEntry> = log.iter().collect();
    sorted.sort_by(|a, b| b.date_sent.cmp(&a.date_sent));
    sorted.truncate(n);
    sorted
}

/// Horizontal text bars, scaled so the largest count is `width` wide.
pub fn render_bars(counts: &BTreeMap<String, usize>, width: usize) -> String {
    let max = counts.values().copied().max().unwrap_or(0);
    let label_width = counts.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    counts
        .iter()
        .map(|(label, &count)| {
            let len = if max == 0 { 0 } else { (count * width).div_ceil(max) };
            format!("{label:<label_width$} | {} {count}", "█".repeat(len))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
