//! Filesync: one synchronization run from diff to delivery

use crate::cancel::CancellationToken;
use crate::config::FilesyncConfig;
use crate::dbafs::{ChangeSet, MetadataStore};
use crate::directory::{resolve_users, TemplateStore, UserDirectory};
use crate::error::{FilesyncError, Result};
use crate::notify::{DeliveryDriver, DeliveryReport, MailTransport, NotificationRouter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub upload_path: String,
    /// Route and deliver notifications after the diff
    pub notify: bool,
    pub concurrency: usize,
    pub default_sender: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            upload_path: "files".to_string(),
            notify: true,
            concurrency: 1,
            default_sender: None,
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &FilesyncConfig) -> Self {
        Self {
            upload_path: config.upload_path.clone(),
            notify: config.notify.enabled,
            concurrency: config.notify.concurrency,
            default_sender: config.notify.default_sender.clone(),
        }
    }
}

/// Everything one run produced
#[derive(Debug)]
pub struct SyncOutcome {
    pub change_set: ChangeSet,
    /// Skipped groups and recipients, and recovered lookup failures
    pub notices: Vec<FilesyncError>,
    pub delivery: DeliveryReport,
    pub duration: Duration,
}

impl SyncOutcome {
    pub fn notifications_sent(&self) -> usize {
        self.delivery.sent()
    }
}

pub struct Filesync {
    store: Box<dyn MetadataStore>,
    directory: Arc<dyn UserDirectory>,
    templates: Arc<dyn TemplateStore>,
    transport: Box<dyn MailTransport>,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl Filesync {
    pub fn new(
        store: Box<dyn MetadataStore>,
        directory: Arc<dyn UserDirectory>,
        templates: Arc<dyn TemplateStore>,
        transport: Box<dyn MailTransport>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            directory,
            templates,
            transport,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops outstanding deliveries of the current run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Synchronize `root_paths` (the whole upload directory when empty) and
    /// notify owners of what changed.
    ///
    /// Only a failing diff is an error. Routing and delivery problems end up
    /// in the outcome.
    pub fn synchronize(&mut self, root_paths: &[String]) -> Result<SyncOutcome> {
        let start = Instant::now();
        info!(roots = ?root_paths, "Synchronizing");

        let change_set = self.store.sync(root_paths)?;
        let mut outcome = SyncOutcome {
            change_set,
            notices: Vec::new(),
            delivery: DeliveryReport::default(),
            duration: Duration::ZERO,
        };

        if outcome.change_set.is_empty() {
            info!("No changes");
        } else if self.options.notify {
            match self.notify(&outcome.change_set) {
                Ok((notices, delivery)) => {
                    outcome.notices = notices;
                    outcome.delivery = delivery;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping notifications for this run");
                    outcome.notices.push(e);
                }
            }
        }

        outcome.duration = start.elapsed();
        info!(
            changes = outcome.change_set.len(),
            notifications_sent = outcome.notifications_sent(),
            duration_ms = outcome.duration.as_millis() as u64,
            "Synchronization complete"
        );
        Ok(outcome)
    }

    fn notify(&self, change_set: &ChangeSet) -> Result<(Vec<FilesyncError>, DeliveryReport)> {
        let resolved = resolve_users(self.directory.as_ref())?;
        let groups = self.directory.find_all_groups()?;

        let table = NotificationRouter::new(&self.options.upload_path, self.templates.as_ref())
            .route(change_set, &resolved.users, &groups)?;

        let mut notices = resolved.notices;
        notices.extend(table.notices);

        let delivery = DeliveryDriver::new(self.transport.as_ref())
            .with_concurrency(self.options.concurrency)
            .with_cancellation(self.cancel.clone())
            .with_default_sender(self.options.default_sender.clone())
            .deliver(&table.entries);
        Ok((notices, delivery))
    }
}
