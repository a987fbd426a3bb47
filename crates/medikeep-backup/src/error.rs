use thiserror::Error;

/// Errors from the export and upload steps of a backup attempt.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("clinic API returned {status} for '{resource}'")]
    Resource {
        resource: String,
        status: reqwest::StatusCode,
    },

    #[error("GitHub upload returned {status}: {detail}")]
    Upload {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error("unexpected GitHub response: {0}")]
    MalformedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
