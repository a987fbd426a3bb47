//! Daily backup scheduler with JSON-file persistence.
//!
//! # Overview
//!
//! [`engine::AutoScheduler`] polls the clock at a fixed interval and fires the
//! registered [`job::BackupJob`] at most once per calendar day, at the
//! configured fire time in the configured timezone. Run bookkeeping survives
//! restarts via [`state::FileStateStore`]; outcomes flow to an optional
//! [`job::Notifier`].
//!
//! # Operations
//!
//! | Operation         | Behaviour                                              |
//! |-------------------|--------------------------------------------------------|
//! | `start`           | Begin periodic checks (idempotent)                     |
//! | `stop`            | Cancel periodic checks                                 |
//! | `update_schedule` | Merge changes, recompute the next run, persist         |
//! | `run_now`         | Fire immediately, bypassing the time and enabled gates |
//! | `status`          | Computed snapshot for "next backup in …" displays      |

pub mod engine;
pub mod error;
pub mod job;
pub mod schedule;
pub mod state;
pub mod types;

pub use engine::AutoScheduler;
pub use error::{Result, SchedulerError};
pub use job::{BackupArtifact, BackupJob, JobOutcome, Notifier, Trigger};
pub use schedule::next_occurrence_of;
pub use state::{FileStateStore, StateStore};
pub use types::{FireTime, SchedulePatch, ScheduleState, StatusSnapshot, Timezone};
