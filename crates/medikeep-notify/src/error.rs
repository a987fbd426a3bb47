use thiserror::Error;

/// Errors from the notification subsystem.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
