//! Queue of messages that failed immediate delivery.
//!
//! A drain is one sequential pass over the queue. Each entry gets at most one
//! send per pass and the counter only goes up, so an entry that reaches
//! `max_attempts` stays queued until someone resets or discards it by hand.

use chrono_tz::Tz;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::gateway::MessagingGateway;
use crate::records::{self, MessageKind, MessageLogEntry, OutboxEntry};
use crate::store::{Dataset, StoreError};

/// Result of one entry in a drain. `entry_id` is the entry's position when
/// the drain started.
#[derive(Debug)]
pub struct DrainOutcome {
    pub entry_id: usize,
    pub result: Result<String, Error>,
}

#[derive(Debug)]
pub struct DrainReport {
    pub outcomes: Vec<DrainOutcome>,
    /// Outcome of writing the outbox and message log after the pass.
    pub persisted: Result<(), Error>,
}

impl DrainReport {
    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn exhausted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(Error::Exhausted { .. })))
            .count()
    }
}

pub struct Outbox {
    queue: Dataset<OutboxEntry>,
    timezone: Tz,
}

impl Outbox {
    pub fn new(queue: Dataset<OutboxEntry>, timezone: Tz) -> Self {
        Self { queue, timezone }
    }

    pub fn empty(data_dir: &Path, timezone: Tz) -> Self {
        Self::new(Dataset::empty(data_dir), timezone)
    }

    pub fn entries(&self) -> &[OutboxEntry] {
        self.queue.records()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        self.queue.persist()
    }

    /// Queue a message with zero attempts and write the outbox file.
    pub fn enqueue(
        &mut self,
        recipient: &str,
        message: &str,
        language: &str,
        kind: MessageKind,
    ) -> Result<(), StoreError> {
        self.queue.push(OutboxEntry {
            recipient: recipient.to_string(),
            message: message.to_string(),
            language: language.to_string(),
            date_created: records::timestamp(self.timezone),
            kind,
            attempts: 0,
        });
        info!("📥 Queued {} to {} ({} in outbox)", kind, recipient, self.queue.len());
        self.queue.persist()
    }

    /// Try every queued entry once, in order.
    ///
    /// Delivered entries move to `log` with status "Sent". Both files are
    /// written once at the end of the pass.
    pub async fn drain(
        &mut self,
        gateway: &MessagingGateway,
        log: &mut Dataset<MessageLogEntry>,
        max_attempts: u32,
    ) -> DrainReport {
        if self.queue.is_empty() {
            debug!("Outbox is empty");
            return DrainReport { outcomes: Vec::new(), persisted: Ok(()) };
        }

        info!("Draining outbox ({} entries)", self.queue.len());
        let mut outcomes = Vec::with_capacity(self.queue.len());
        let mut delivered = Vec::new();

        for (entry_id, entry) in self.queue.records_mut().iter_mut().enumerate() {
            if entry.attempts >= max_attempts {
                debug!("Outbox #{entry_id} skipped after {} attempts", entry.attempts);
                outcomes.push(DrainOutcome {
                    entry_id,
                    result: Err(Error::Exhausted { attempts: entry.attempts }),
                });
                continue;
            }

            let result = gateway.dispatch(entry.kind, &entry.recipient, &entry.message).await;
            entry.attempts += 1;

            match &result {
                Ok(reference) => {
                    log.push(MessageLogEntry::sent(
                        &entry.recipient,
                        &entry.message,
                        &entry.language,
                        entry.kind,
                        records::timestamp(self.timezone),
                    ));
                    delivered.push(entry_id);
                    info!("Outbox #{entry_id} sent: {reference}");
                }
                Err(e) if e.is_unconfigured() => {
                    debug!("Outbox #{entry_id} not sent: {e}");
                }
                Err(e) => {
                    warn!("Outbox #{entry_id} failed (attempt {}/{}): {e}", entry.attempts, max_attempts);
                }
            }
            outcomes.push(DrainOutcome { entry_id, result });
        }

        let mut position = 0;
        self.queue.records_mut().retain(|_| {
            let keep = !delivered.contains(&position);
            position += 1;
            keep
        });

        let outbox_saved = self.queue.persist();
        let log_saved = log.persist();
        DrainReport {
            outcomes,
            persisted: outbox_saved.and(log_saved).map_err(Error::from),
        }
    }

    /// Set an entry's attempt count back to zero so the next drain retries it.
    /// Returns `false` when there is no such entry.
    pub fn reset_attempts(&mut self, entry_id: usize) -> Result<bool, StoreError> {
        let Some(entry) = self.queue.records_mut().get_mut(entry_id) else {
            return Ok(false);
        };
        info!("Outbox #{entry_id} reset after {} attempts", entry.attempts);
        entry.attempts = 0;
        self.queue.persist()?;
        Ok(true)
    }

    /// Remove an entry without sending it.
    pub fn discard(&mut self, entry_id: usize) -> Result<Option<OutboxEntry>, StoreError> {
        if entry_id >= self.queue.len() {
            return Ok(None);
        }
        let entry = self.queue.records_mut().remove(entry_id);
        info!("Outbox #{entry_id} to {} discarded", entry.recipient);
        self.queue.persist()?;
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{gateway, MockProvider};
    use crate::store::Dataset;
    use tempfile::TempDir;

    const TZ: Tz = chrono_tz::Africa::Nairobi;

    fn setup() -> (TempDir, Outbox, Dataset<MessageLogEntry>) {
        let dir = TempDir::new().unwrap();
        let outbox = Outbox::empty(dir.path(), TZ);
        let log = Dataset::empty(dir.path());
        (dir, outbox, log)
    }

    #[tokio::test]
    async fn test_enqueue_persists_immediately() {
        let (dir, mut outbox, _) = setup();
        outbox.enqueue("+254700000001", "Karibu", "Swahili", MessageKind::Sms).unwrap();

        let reloaded: Dataset<OutboxEntry> = Dataset::load(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.records()[0].attempts, 0);
        assert_eq!(reloaded.records()[0].message, "Karibu");
    }

    #[tokio::test]
    async fn test_successful_drain_moves_entry_to_log() {
        let (dir, mut outbox, mut log) = setup();
        let provider = MockProvider::new();
        outbox.enqueue("+254700000001", "Karibu", "Swahili", MessageKind::Sms).unwrap();

        let report = outbox.drain(&gateway(&provider), &mut log, 3).await;

        assert!(report.persisted.is_ok());
        assert_eq!(report.sent(), 1);
        assert_eq!(report.outcomes[0].entry_id, 0);
        assert_eq!(report.outcomes[0].result.as_ref().unwrap(), "SM0001");
        assert!(outbox.is_empty());
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].status, "Sent");
        assert_eq!(log.records()[0].language, "Swahili");

        let on_disk: Dataset<MessageLogEntry> = Dataset::load(dir.path()).unwrap();
        assert_eq!(on_disk.len(), 1);
        let queued: Dataset<OutboxEntry> = Dataset::load(dir.path()).unwrap();
        assert!(queued.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_entry_is_not_dispatched() {
        let (_dir, mut outbox, mut log) = setup();
        let provider = MockProvider::new();
        outbox.enqueue("+254700000001", "Karibu", "English", MessageKind::Sms).unwrap();
        outbox.queue.records_mut()[0].attempts = 3;

        let report = outbox.drain(&gateway(&provider), &mut log, 3).await;

        assert!(matches!(report.outcomes[0].result, Err(Error::Exhausted { attempts: 3 })));
        assert_eq!(report.exhausted(), 1);
        assert!(provider.sent().is_empty());
        assert_eq!(outbox.entries()[0].attempts, 3);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_failures_count_attempts_until_exhausted() {
        let (_dir, mut outbox, mut log) = setup();
        let provider = MockProvider::failing("network unreachable");
        let gw = gateway(&provider);
        outbox.enqueue("+254700000001", "Karibu", "English", MessageKind::Voice).unwrap();

        for n in 1..=2 {
            let report = outbox.drain(&gw, &mut log, 3).await;
            assert!(matches!(report.outcomes[0].result, Err(Error::Transport(_))));
            assert_eq!(outbox.entries()[0].attempts, n);
            assert_eq!(outbox.len(), 1);
        }

        outbox.drain(&gw, &mut log, 3).await;
        let report = outbox.drain(&gw, &mut log, 3).await;
        assert!(matches!(report.outcomes[0].result, Err(Error::Exhausted { .. })));
        assert_eq!(outbox.entries()[0].attempts, 3);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_still_counts_attempt() {
        let (_dir, mut outbox, mut log) = setup();
        outbox.enqueue("+254700000001", "Karibu", "English", MessageKind::Sms).unwrap();

        let report = outbox.drain(&MessagingGateway::unconfigured(), &mut log, 3).await;
        assert!(report.outcomes[0].result.as_ref().unwrap_err().is_unconfigured());
        assert_eq!(outbox.entries()[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_mixed_pass_keeps_order_and_ids() {
        let (_dir, mut outbox, mut log) = setup();
        let provider = MockProvider::new().script(vec![Ok(()), Err("busy".to_string()), Ok(())]);
        for to in ["+254700000001", "+254700000002", "+254700000003"] {
            outbox.enqueue(to, "Karibu", "English", MessageKind::Sms).unwrap();
        }

        let report = outbox.drain(&gateway(&provider), &mut log, 3).await;

        let ids: Vec<usize> = report.outcomes.iter().map(|o| o.entry_id).collect();
        assert_eq!(ids, [0, 1, 2]);
        assert_eq!(report.sent(), 2);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.entries()[0].recipient, "+254700000002");
        assert_eq!(outbox.entries()[0].attempts, 1);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_reported_as_storage_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let mut outbox = Outbox::empty(&blocker, TZ);
        let mut log = Dataset::empty(&blocker);

        assert!(outbox.enqueue("+254700000001", "Karibu", "English", MessageKind::Sms).is_err());
        assert_eq!(outbox.len(), 1);

        let provider = MockProvider::new();
        let report = outbox.drain(&gateway(&provider), &mut log, 3).await;
        assert_eq!(report.sent(), 1);
        assert!(matches!(report.persisted, Err(Error::Storage(StoreError::Write { .. }))));
    }

    #[tokio::test]
    async fn test_reset_and_discard() {
        let (_dir, mut outbox, mut log) = setup();
        outbox.enqueue("+254700000001", "one", "English", MessageKind::Sms).unwrap();
        outbox.enqueue("+254700000002", "two", "English", MessageKind::Sms).unwrap();
        outbox.queue.records_mut()[0].attempts = 3;

        assert!(outbox.reset_attempts(0).unwrap());
        assert_eq!(outbox.entries()[0].attempts, 0);
        assert!(!outbox.reset_attempts(9).unwrap());

        let removed = outbox.discard(1).unwrap().unwrap();
        assert_eq!(removed.message, "two");
        assert!(outbox.discard(1).unwrap().is_none());

        let provider = MockProvider::new();
        let report = outbox.drain(&gateway(&provider), &mut log, 3).await;
        assert_eq!(report.sent(), 1);
        assert!(outbox.is_empty());
    }
}
