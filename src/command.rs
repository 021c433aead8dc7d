//! Line-oriented commands, one per user interaction.
//!
//! Fields of multi-field commands are separated by `|`.

use std::fmt::Write;

use crate::app::{App, SendOutcome};
use crate::campaign::{self, Dashboard, NewPartner};
use crate::records::{MessageKind, ReminderStatus};
use crate::translate::Language;

pub const HELP: &str = "\
Commands:
  lang <English|Swahili|Luo|Luhya>        set display language
  faq                                      list FAQs
  ask <question>                           ask the chatbot
  send <sms|voice> <recipient> <text>      send now (queued on failure)
  messages                                 recent sent messages
  outbox                                   list queued messages
  drain                                    retry every queued message once
  retry <id> / discard <id>                reset attempts / remove a queued message
  partner <name> | <role> | <langs,...> | <contact> | <campaign>
  partners [search]                        list or search partners
  feedback <name> | <message>              submit feedback in the display language
  feedback                                 list feedback
  reminder <task> | <due> | <assignee>     due: YYYY-MM-DD, +Nd or +Nw
  reminders                                list reminders
  done <id>                                mark a reminder completed
  dashboard                                campaign totals
  settings                                 show configured services
  save                                     write all tables now
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Lang(Language),
    Faq,
    Ask(String),
    Send { kind: MessageKind, recipient: String, text: String },
    Messages,
    Outbox,
    Drain,
    Retry(usize),
    Discard(usize),
    AddPartner(Vec<String>),
    Partners(Option<String>),
    AddFeedback { name: String, message: String },
    Feedback,
    AddReminder { task: String, due: String, assigned_to: String },
    Reminders,
    Done(usize),
    Dashboard,
    Settings,
    Save,
    Quit,
}

fn fields(args: &str, expected: usize, usage: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = args.split('|').map(|p| p.trim().to_string()).collect();
    if parts.len() != expected {
        return Err(format!("expected {expected} fields separated by '|': {usage}"));
    }
    Ok(parts)
}

/// Split off the first word, skipping any run of leading whitespace.
fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    s.split_once(char::is_whitespace).unwrap_or((s, ""))
}

fn id(args: &str) -> Result<usize, String> {
    args.trim()
        .parse()
        .map_err(|_| format!("expected a numeric id, got '{}'", args.trim()))
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match word.to_lowercase().as_str() {
            "" | "help" | "?" => Command::Help,
            "lang" => Command::Lang(
                Language::parse(rest).ok_or_else(|| format!("unknown language '{rest}'"))?,
            ),
            "faq" => Command::Faq,
            "ask" if rest.is_empty() => return Err("Please enter a question.".to_string()),
            "ask" => Command::Ask(rest.to_string()),
            "send" => {
                let (kind, after) = next_word(rest);
                let (recipient, text) = next_word(after);
                if kind.is_empty() || recipient.is_empty() || text.trim().is_empty() {
                    return Err("usage: send <sms|voice> <recipient> <text>".to_string());
                }
                let kind = match kind.to_lowercase().as_str() {
                    "sms" => MessageKind::Sms,
                    "voice" => MessageKind::Voice,
                    other => return Err(format!("unknown message type '{other}'")),
                };
                Command::Send {
                    kind,
                    recipient: recipient.to_string(),
                    text: text.trim().to_string(),
                }
            }
            "messages" => Command::Messages,
            "outbox" => Command::Outbox,
            "drain" => Command::Drain,
            "retry" => Command::Retry(id(rest)?),
            "discard" => Command::Discard(id(rest)?),
            "partner" => Command::AddPartner(fields(
                rest,
                5,
                "partner <name> | <role> | <langs> | <contact> | <campaign>",
            )?),
            "partners" => Command::Partners(Some(rest.to_string()).filter(|s| !s.is_empty())),
            "feedback" if rest.is_empty() => Command::Feedback,
            "feedback" => {
                let mut f = fields(rest, 2, "feedback <name> | <message>")?.into_iter();
                Command::AddFeedback {
                    name: f.next().unwrap_or_default(),
                    message: f.next().unwrap_or_default(),
                }
            }
            "reminder" => {
                let mut f = fields(rest, 3, "reminder <task> | <due> | <assignee>")?.into_iter();
                Command::AddReminder {
                    task: f.next().unwrap_or_default(),
                    due: f.next().unwrap_or_default(),
                    assigned_to: f.next().unwrap_or_default(),
                }
            }
            "reminders" => Command::Reminders,
            "done" => Command::Done(id(rest)?),
            "dashboard" => Command::Dashboard,
            "settings" => Command::Settings,
            "save" => Command::Save,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(command)
    }
}

/// Run one command and return what to show the user.
pub async fn run(app: &mut App, command: Command) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = render(app, command, &mut out).await;
    out.trim_end().to_string()
}

async fn render(app: &mut App, command: Command, out: &mut String) -> std::fmt::Result {
    match command {
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Quit => {}
        Command::Lang(lang) => {
            app.language = lang;
            writeln!(out, "Display language: {lang}")?;
        }
        Command::Faq => {
            for (q, a) in app.faqs().await {
                writeln!(out, "Q: {q}\nA: {a}\n")?;
            }
        }
        Command::Ask(question) => {
            let reply = app.ask(&question).await;
            writeln!(out, "Chatbot: {}", reply.text)?;
        }
        Command::Send { kind, recipient, text } => {
            if !app.gateway.configured() {
                writeln!(out, "Messaging is not configured; the message will be queued to the outbox.")?;
            }
            let lang = app.language;
            match app.send_now(&recipient, &text, lang, kind).await {
                Ok(SendOutcome::Sent(reference)) => writeln!(out, "{kind} sent: {reference}")?,
                Ok(SendOutcome::Queued(reason)) => {
                    writeln!(out, "Send failed: {reason} (queued to outbox)")?
                }
                Err(e) => writeln!(out, "Not sent: {e}")?,
            }
        }
        Command::Messages => {
            let recent = campaign::recent_messages(app.message_log.records(), 15);
            if recent.is_empty() {
                writeln!(out, "No messages logged yet.")?;
            }
            for m in recent {
                writeln!(out, "{}  {:<5} {:<15} [{}] {}", m.date_sent, m.kind, m.recipient, m.language, m.message)?;
            }
        }
        Command::Outbox => {
            if app.outbox.is_empty() {
                writeln!(out, "Outbox is empty.")?;
            }
            let max = app.config.max_attempts;
            for (id, e) in app.outbox.entries().iter().enumerate() {
                let flag = if e.attempts >= max { "  (max attempts reached)" } else { "" };
                writeln!(
                    out,
                    "#{id} {} {:<5} {} attempts {}/{}{flag}: {}",
                    e.date_created, e.kind, e.recipient, e.attempts, max, e.message
                )?;
            }
        }
        Command::Drain => {
            let report = app.drain_outbox().await;
            if report.outcomes.is_empty() {
                writeln!(out, "No messages processed.")?;
            }
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(info) => writeln!(out, "Outbox item {} sent: {info}", outcome.entry_id)?,
                    Err(e) => writeln!(out, "Outbox item {} NOT sent: {e}", outcome.entry_id)?,
                }
            }
            if let Err(e) = &report.persisted {
                writeln!(out, "Warning: results not saved: {e}")?;
            }
        }
        Command::Retry(id) => match app.outbox.reset_attempts(id) {
            Ok(true) => writeln!(out, "Outbox item {id} will be retried on the next drain.")?,
            Ok(false) => writeln!(out, "No outbox item {id}.")?,
            Err(e) => writeln!(out, "Error: {e}")?,
        },
        Command::Discard(id) => match app.outbox.discard(id) {
            Ok(Some(entry)) => writeln!(out, "Discarded message to {}.", entry.recipient)?,
            Ok(None) => writeln!(out, "No outbox item {id}.")?,
            Err(e) => writeln!(out, "Error: {e}")?,
        },
        Command::AddPartner(f) => {
            let input = NewPartner {
                name: f[0].clone(),
                role: f[1].clone(),
                languages: f[2].split(',').map(|l| l.trim().to_string()).collect(),
                contact: f[3].clone(),
                campaign: f[4].clone(),
            };
            let name = input.name.clone();
            match campaign::add_partner(&mut app.partners, input) {
                Ok(()) => writeln!(out, "Partner {name} added.")?,
                Err(e) => writeln!(out, "Not added: {e}")?,
            }
        }
        Command::Partners(query) => {
            let list = match &query {
                Some(q) => campaign::search_partners(app.partners.records(), q),
                None => app.partners.records().iter().collect(),
            };
            if list.is_empty() {
                writeln!(out, "No partners found.")?;
            }
            for p in list {
                writeln!(out, "{} ({}) [{}] {} - {}", p.name, p.role, p.languages, p.contact, p.campaign)?;
            }
        }
        Command::AddFeedback { name, message } => {
            let lang = app.language;
            let now = app.now();
            match campaign::submit_feedback(&mut app.feedback, &name, &message, lang.as_str(), now) {
                Ok(()) => {
                    let thanks = app
                        .translator
                        .translate_or_identity("Thank you for your feedback!", lang.as_str())
                        .await;
                    writeln!(out, "{thanks}")?;
                }
                Err(e) => writeln!(out, "Not submitted: {e}")?,
            }
        }
        Command::Feedback => {
            let feedback = app.feedback.records();
            if feedback.is_empty() {
                writeln!(out, "No feedback yet.")?;
                return Ok(());
            }
            for f in campaign::feedback_newest_first(feedback) {
                writeln!(out, "{} {} [{}]: {}", f.date_submitted, f.name, f.language, f.message)?;
            }
            let counts = campaign::count_by(feedback, |f| &f.language);
            writeln!(out, "\nBy language:\n{}", campaign::render_bars(&counts, 30))?;
        }
        Command::AddReminder { task, due, assigned_to } => {
            let today = app.today();
            match campaign::add_reminder(&mut app.reminders, &task, &due, &assigned_to, today) {
                Ok(()) => writeln!(out, "Reminder for '{}' added.", task.trim())?,
                Err(e) => writeln!(out, "Not added: {e}")?,
            }
        }
        Command::Reminders => {
            if app.reminders.is_empty() {
                writeln!(out, "No reminders yet.")?;
            }
            for (id, r) in app.reminders.records().iter().enumerate() {
                writeln!(out, "#{id} [{}] {} due {} ({})", r.status.as_str(), r.task, r.due_date, r.assigned_to)?;
            }
        }
        Command::Done(id) => match campaign::complete_reminder(&mut app.reminders, id) {
            Ok(true) => writeln!(out, "Reminder {id} marked completed.")?,
            Ok(false) => writeln!(out, "Reminder {id} was already completed.")?,
            Err(e) => writeln!(out, "Error: {e}")?,
        },
        Command::Dashboard => {
            let d = Dashboard::build(
                app.message_log.records(),
                app.partners.records(),
                app.feedback.records(),
                app.reminders.records(),
            );
            writeln!(out, "Messages sent: {}", d.messages_total)?;
            writeln!(out, "{}\n", campaign::render_bars(&d.messages_by_language, 30))?;
            writeln!(out, "Partners: {}", d.partners_total)?;
            writeln!(out, "{}\n", campaign::render_bars(&d.partners_by_role, 30))?;
            writeln!(out, "Feedback received: {}", d.feedback_total)?;
            writeln!(out, "{}\n", campaign::render_bars(&d.feedback_by_language, 30))?;
            writeln!(out, "Reminders: {} pending, {} completed", d.reminders_pending, d.reminders_completed)?;
            for r in app.reminders.records().iter().filter(|r| r.status == ReminderStatus::Pending) {
                writeln!(out, "  {} due {} ({})", r.task, r.due_date, r.assigned_to)?;
            }
        }
        Command::Settings => {
            let caps = app.capabilities();
            writeln!(out, "Messaging (Twilio) configured: {}", caps.messaging)?;
            writeln!(out, "Language model configured: {}", caps.language_model)?;
            writeln!(out, "Translation service configured: {}", caps.translation)?;
            writeln!(out, "Max send attempts: {}", app.config.max_attempts)?;
            writeln!(out, "Data directory: {}", app.config.data_dir.display())?;
        }
        Command::Save => match app.persist_all() {
            Ok(()) => writeln!(out, "All data saved.")?,
            Err(e) => writeln!(out, "Save failed: {e}")?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatbot::Chatbot;
    use crate::config::Config;
    use crate::gateway::MessagingGateway;
    use crate::gateway::mock::{gateway, MockProvider};
    use crate::translate::Translator;
    use tempfile::TempDir;

    fn app(dir: &TempDir, gw: MessagingGateway) -> App {
        let mut config = Config::load_with_env("/nonexistent/sha_connect.json", |_| None).unwrap();
        config.data_dir = dir.path().to_path_buf();
        App::with_services(config, gw, Translator::new(None), Chatbot::new(None))
    }

    #[test]
    fn test_parse_send() {
        assert_eq!(
            Command::parse("send voice +254700000001 Clinic opens at 8").unwrap(),
            Command::Send {
                kind: MessageKind::Voice,
                recipient: "+254700000001".to_string(),
                text: "Clinic opens at 8".to_string(),
            }
        );
        assert_eq!(
            Command::parse("send  sms   +254700000001   Karibu  Kisumu").unwrap(),
            Command::Send {
                kind: MessageKind::Sms,
                recipient: "+254700000001".to_string(),
                text: "Karibu  Kisumu".to_string(),
            }
        );
        assert!(Command::parse("send fax +254700000001 hi").is_err());
        assert!(Command::parse("send sms +254700000001").is_err());
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(
            Command::parse("reminder Print flyers | +2d | Achieng").unwrap(),
            Command::AddReminder {
                task: "Print flyers".to_string(),
                due: "+2d".to_string(),
                assigned_to: "Achieng".to_string(),
            }
        );
        assert!(Command::parse("feedback only-one-field").is_err());
        assert_eq!(Command::parse("feedback").unwrap(), Command::Feedback);
        assert_eq!(Command::parse("  LANG luo ").unwrap(), Command::Lang(Language::Luo));
        assert_eq!(Command::parse("partners").unwrap(), Command::Partners(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("retry x").is_err());
        assert!(Command::parse("ask").is_err());
        assert!(Command::parse("teleport").unwrap_err().contains("unknown command"));
    }

    #[tokio::test]
    async fn test_send_then_drain_session() {
        let dir = TempDir::new().unwrap();
        let provider = MockProvider::new().script(vec![Err("offline".to_string())]);
        let mut app = app(&dir, gateway(&provider));

        let out = run(&mut app, Command::parse("send sms +254700000001 Karibu").unwrap()).await;
        assert!(out.contains("queued to outbox"));

        let out = run(&mut app, Command::Outbox).await;
        assert!(out.starts_with("#0 "));
        assert!(out.contains("attempts 0/3"));

        let out = run(&mut app, Command::Drain).await;
        assert_eq!(out, "Outbox item 0 sent: SM0001");

        let out = run(&mut app, Command::Messages).await;
        assert!(out.contains("+254700000001"));
    }

    #[tokio::test]
    async fn test_feedback_thanks_in_language() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, MessagingGateway::unconfigured());
        run(&mut app, Command::Lang(Language::Luhya)).await;
        let out = run(&mut app, Command::parse("feedback Wafula | Great outreach").unwrap()).await;
        assert_eq!(out, "Webale muno okhu");
        assert_eq!(app.feedback.records()[0].language, "Luhya");
    }

    #[tokio::test]
    async fn test_reminder_done_flow() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir, MessagingGateway::unconfigured());
        run(&mut app, Command::parse("reminder Radio slot | 2026-05-01 | Barasa").unwrap()).await;
        assert!(run(&mut app, Command::Reminders).await.contains("[Pending] Radio slot"));
        assert_eq!(run(&mut app, Command::Done(0)).await, "Reminder 0 marked completed.");
        assert_eq!(run(&mut app, Command::Done(0)).await, "Reminder 0 was already completed.");
        assert!(run(&mut app, Command::Dashboard).await.contains("0 pending, 1 completed"));
    }
}
