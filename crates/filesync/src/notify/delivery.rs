//! DeliveryDriver: render and send one message per routing entry

use super::router::RoutingEntry;
use crate::cancel::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub name: String,
    pub email: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.email)
        } else {
            write!(f, "{} <{}>", self.name, self.email)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub subject: String,
    pub from: String,
    pub to: Mailbox,
    pub html_body: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Hands a message to whatever actually delivers mail.
pub trait MailTransport: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), TransportError>;
}

/// Writes every message as `<uuid>.json` into an outbox directory.
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MailTransport for OutboxTransport {
    fn send(&self, message: &Message) -> Result<(), TransportError> {
        fs::create_dir_all(&self.dir)?;
        let id = Uuid::new_v4();
        let tmp = self.dir.join(format!(".{}.json.tmp", id));
        let target = self.dir.join(format!("{}.json", id));
        fs::write(&tmp, serde_json::to_vec_pretty(message)?)?;
        fs::rename(&tmp, &target)?;
        debug!(path = %target.display(), "Queued message in outbox");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed(String),
    Skipped(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub recipient: Mailbox,
    pub status: DeliveryStatus,
}

/// Outcomes in routing table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    fn count(&self, pred: impl Fn(&DeliveryStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn sent(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Sent))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Skipped(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, DeliveryStatus::Cancelled))
    }
}

pub struct DeliveryDriver<'a> {
    transport: &'a dyn MailTransport,
    concurrency: usize,
    cancel: CancellationToken,
    default_sender: Option<String>,
}

impl<'a> DeliveryDriver<'a> {
    pub fn new(transport: &'a dyn MailTransport) -> Self {
        Self {
            transport,
            concurrency: 1,
            cancel: CancellationToken::new(),
            default_sender: None,
        }
    }

    /// Number of messages in flight at once (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sender for templates that do not name one.
    pub fn with_default_sender(mut self, sender: Option<String>) -> Self {
        self.default_sender = sender;
        self
    }

    /// Render the message for an entry, or the reason it is not sent.
    pub fn compose(&self, entry: &RoutingEntry) -> Result<Message, String> {
        let template = entry
            .template
            .as_ref()
            .ok_or_else(|| "no template".to_string())?;
        if entry.files.is_empty() {
            return Err("no files".to_string());
        }
        let from = Some(template.from_address.as_str())
            .filter(|s| !s.is_empty())
            .or(self.default_sender.as_deref())
            .ok_or_else(|| "template has no sender".to_string())?;

        Ok(Message {
            subject: template.subject.clone(),
            from: from.to_string(),
            to: mailbox(entry),
            html_body: template.render(&entry.files),
        })
    }

    /// Send every entry once. Failures are reported, never retried.
    ///
    /// A worker that panics loses only the entry it was sending; that entry is
    /// reported as failed and the other workers carry on with the rest.
    pub fn deliver(&self, entries: &[RoutingEntry]) -> DeliveryReport {
        let start = Instant::now();
        let workers = self.concurrency.min(entries.len()).max(1);
        let cursor = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<DeliveryStatus>>> = Mutex::new(vec![None; entries.len()]);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| scope.spawn(|| self.drain(entries, &cursor, &slots)))
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    warn!("Delivery worker panicked");
                }
            }
        });

        let statuses = slots.into_inner().unwrap_or_else(PoisonError::into_inner);
        let outcomes = entries
            .iter()
            .zip(statuses)
            .map(|(entry, status)| DeliveryOutcome {
                recipient: mailbox(entry),
                status: status
                    .unwrap_or_else(|| DeliveryStatus::Failed("delivery worker panicked".to_string())),
            })
            .collect();

        let report = DeliveryReport { outcomes };
        info!(
            sent = report.sent(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = report.cancelled(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Delivery finished"
        );
        report
    }

    /// Take entries off the shared cursor until none are left, recording each
    /// status as soon as it is known.
    fn drain(
        &self,
        entries: &[RoutingEntry],
        cursor: &AtomicUsize,
        slots: &Mutex<Vec<Option<DeliveryStatus>>>,
    ) {
        loop {
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(entry) = entries.get(index) else {
                return;
            };
            let status = self.deliver_one(entry);
            slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(status);
        }
    }

    fn deliver_one(&self, entry: &RoutingEntry) -> DeliveryStatus {
        if self.cancel.is_cancelled() {
            return DeliveryStatus::Cancelled;
        }
        let message = match self.compose(entry) {
            Ok(message) => message,
            Err(reason) => {
                debug!(recipient = %entry.recipient.email, reason = %reason, "Skipping notification");
                return DeliveryStatus::Skipped(reason);
            }
        };
        match self.transport.send(&message) {
            Ok(()) => {
                info!("E-Mail notification sent to \"{}\"", message.to);
                DeliveryStatus::Sent
            }
            Err(e) => {
                warn!(recipient = %message.to, error = %e, "E-Mail notification failed");
                DeliveryStatus::Failed(e.to_string())
            }
        }
    }
}

fn mailbox(entry: &RoutingEntry) -> Mailbox {
    Mailbox {
        name: entry.recipient.display_name.clone(),
        email: entry.recipient.email.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{FormId, Template, User, UserId};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Message>>,
        reject: Option<String>,
        crash_on: Option<String>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl MailTransport for RecordingTransport {
        fn send(&self, message: &Message) -> Result<(), TransportError> {
            if self.crash_on.as_deref() == Some(message.to.email.as_str()) {
                panic!("transport crashed on {}", message.to.email);
            }
            if self.reject.as_deref() == Some(message.to.email.as_str()) {
                return Err(TransportError::Rejected("mailbox unavailable".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            Ok(())
        }
    }

    fn template() -> Template {
        Template {
            id: FormId::new(1),
            subject: "New files".to_string(),
            from_address: "cms@example.org".to_string(),
            body: "Changed:<br>[[files]]".to_string(),
        }
    }

    fn entry(id: i64, files: &[&str]) -> RoutingEntry {
        RoutingEntry {
            recipient: User {
                id: UserId::new(id),
                display_name: format!("User {}", id),
                email: format!("u{}@example.org", id),
                group_ids: BTreeSet::new(),
                home_dir: None,
                notifications_enabled: true,
                active: true,
            },
            files: files.iter().map(|f| f.to_string()).collect(),
            template: Some(template()),
        }
    }

    #[test]
    fn test_message_rendering() {
        let transport = RecordingTransport::default();
        let report = DeliveryDriver::new(&transport).deliver(&[entry(1, &["a.pdf", "b/c.pdf"])]);
        assert_eq!(report.sent(), 1);

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "New files");
        assert_eq!(sent[0].from, "cms@example.org");
        assert_eq!(sent[0].to.to_string(), "User 1 <u1@example.org>");
        assert_eq!(sent[0].html_body, "Changed:<br>a.pdf<br>b/c.pdf");
    }

    #[test]
    fn test_failure_does_not_stop_the_run() {
        let transport = RecordingTransport {
            reject: Some("u1@example.org".to_string()),
            ..Default::default()
        };
        let report = DeliveryDriver::new(&transport).deliver(&[entry(1, &["a.pdf"]), entry(2, &["a.pdf"])]);

        assert!(matches!(report.outcomes[0].status, DeliveryStatus::Failed(_)));
        assert_eq!(report.outcomes[1].status, DeliveryStatus::Sent);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_without_template_or_sender_are_skipped() {
        let transport = RecordingTransport::default();
        let mut untemplated = entry(1, &["a.pdf"]);
        untemplated.template = None;
        let mut senderless = entry(2, &["a.pdf"]);
        if let Some(t) = senderless.template.as_mut() {
            t.from_address.clear();
        }

        let report = DeliveryDriver::new(&transport).deliver(&[untemplated, senderless.clone()]);
        assert_eq!(report.skipped(), 2);
        assert!(transport.sent.lock().unwrap().is_empty());

        let report = DeliveryDriver::new(&transport)
            .with_default_sender(Some("noreply@example.org".to_string()))
            .deliver(&[senderless]);
        assert_eq!(report.sent(), 1);
        assert_eq!(transport.sent.lock().unwrap()[0].from, "noreply@example.org");
    }

    #[test]
    fn test_cancellation_stops_remaining_deliveries() {
        let token = CancellationToken::new();
        let transport = RecordingTransport {
            cancel_after_first: Some(token.clone()),
            ..Default::default()
        };
        let entries: Vec<_> = (1..=3).map(|id| entry(id, &["a.pdf"])).collect();

        let report = DeliveryDriver::new(&transport)
            .with_cancellation(token)
            .deliver(&entries);
        assert_eq!(report.sent(), 1);
        assert_eq!(report.cancelled(), 2);
    }

    #[test]
    fn test_parallel_delivery_sends_each_entry_once() {
        let transport = RecordingTransport::default();
        let entries: Vec<_> = (1..=20).map(|id| entry(id, &["a.pdf"])).collect();

        let report = DeliveryDriver::new(&transport)
            .with_concurrency(4)
            .deliver(&entries);
        assert_eq!(report.sent(), 20);
        let recipients: Vec<_> = report.outcomes.iter().map(|o| o.recipient.email.clone()).collect();
        let expected: Vec<_> = (1..=20).map(|id| format!("u{}@example.org", id)).collect();
        assert_eq!(recipients, expected);

        let unique: BTreeSet<_> = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.email.clone())
            .collect();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn test_crashing_send_keeps_other_outcomes() {
        let transport = RecordingTransport {
            crash_on: Some("u3@example.org".to_string()),
            ..Default::default()
        };
        let entries: Vec<_> = (1..=8).map(|id| entry(id, &["a.pdf"])).collect();

        let report = DeliveryDriver::new(&transport)
            .with_concurrency(2)
            .deliver(&entries);

        assert_eq!(report.outcomes.len(), 8);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.sent(), 7);
        assert!(matches!(
            &report.outcomes[2].status,
            DeliveryStatus::Failed(reason) if reason == "delivery worker panicked"
        ));
        assert_eq!(transport.sent.lock().unwrap().len(), 7);
    }

    #[test]
    fn test_crash_with_single_worker_reports_finished_entries() {
        let transport = RecordingTransport {
            crash_on: Some("u2@example.org".to_string()),
            ..Default::default()
        };
        let entries: Vec<_> = (1..=3).map(|id| entry(id, &["a.pdf"])).collect();

        let report = DeliveryDriver::new(&transport).deliver(&entries);

        assert_eq!(report.outcomes[0].status, DeliveryStatus::Sent);
        assert!(matches!(report.outcomes[1].status, DeliveryStatus::Failed(_)));
        assert_eq!(report.outcomes[2].status, DeliveryStatus::Failed("delivery worker panicked".to_string()));
    }

    #[test]
    fn test_outbox_writes_one_file_per_message() {
        let dir = TempDir::new().unwrap();
        let transport = OutboxTransport::new(dir.path().join("outbox"));

        let report = DeliveryDriver::new(&transport).deliver(&[entry(1, &["a.pdf"]), entry(2, &["b.pdf"])]);
        assert_eq!(report.sent(), 2);

        let files: Vec<_> = fs::read_dir(transport.dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 2);
        let message: Message = serde_json::from_slice(&fs::read(&files[0]).unwrap()).unwrap();
        assert_eq!(message.subject, "New files");
    }
}
