use thiserror::Error;

/// Errors that can occur within the backup scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The requested fire time / timezone combination is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing the persisted schedule state failed.
    #[error("State store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
