//! Backup activity log and outbound webhook delivery.
//!
//! [`NotificationCenter`] sits behind the scheduler's notifier seam: every
//! settled backup attempt becomes a stored [`Notification`] (the newest
//! [`MAX_STORED`] are kept) and, when an endpoint is configured, an
//! HMAC-signed webhook POST.

pub mod db;
pub mod error;
pub mod store;
pub mod types;
pub mod webhook;

pub use error::{NotifyError, Result};
pub use store::{NotificationStore, MAX_STORED};
pub use types::{Notification, NotificationKind};
pub use webhook::WebhookNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use medikeep_scheduler::{JobOutcome, Notifier, Trigger};
use tracing::warn;

/// Fans a settled outcome out to the activity log and the optional webhook.
pub struct NotificationCenter {
    store: Arc<NotificationStore>,
    webhook: Option<WebhookNotifier>,
}

impl NotificationCenter {
    pub fn new(store: Arc<NotificationStore>, webhook: Option<WebhookNotifier>) -> Self {
        Self { store, webhook }
    }
}

#[async_trait]
impl Notifier for NotificationCenter {
    async fn record(&self, outcome: &JobOutcome) {
        let trigger = match outcome.trigger {
            Trigger::Scheduled => "Scheduled",
            Trigger::Manual => "Manual",
        };
        let (kind, subject, message) = if outcome.success {
            let message = match &outcome.artifact {
                Some(artifact) => format!(
                    "{trigger} backup uploaded as {} ({} bytes).",
                    artifact.filename, artifact.size
                ),
                None => format!("{trigger} backup finished."),
            };
            (NotificationKind::Success, "Backup completed", message)
        } else {
            let reason = outcome.error.as_deref().unwrap_or("unknown error");
            let message = format!("{trigger} backup failed: {reason}");
            (NotificationKind::Failure, "Backup failed", message)
        };

        if let Err(e) = self
            .store
            .record(kind, subject, &message, outcome.artifact.as_ref())
        {
            warn!("failed to record backup notification: {e}");
        }
        if let Some(webhook) = &self.webhook {
            webhook.send(outcome).await;
        }
    }
}
