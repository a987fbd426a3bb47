use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor of one uploaded backup payload, surfaced in notifications and
/// the manual-run response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    pub filename: String,
    pub size: u64,
    pub download_url: String,
}

/// What triggered a backup attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
        })
    }
}

/// Settled result of one backup attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub trigger: Trigger,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BackupArtifact>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One backup attempt end to end, exported data through uploaded artifact.
///
/// The scheduler treats this as opaque: no partial progress, no cancellation,
/// only the settled result. Timeouts belong to the implementation.
#[async_trait]
pub trait BackupJob: Send + Sync {
    async fn run(&self) -> anyhow::Result<BackupArtifact>;
}

/// Sink for settled outcomes. Implementations swallow their own failures;
/// the scheduler never depends on notification success.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn record(&self, outcome: &JobOutcome);
}
