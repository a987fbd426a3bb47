//! Clinic data export and GitHub upload.
//!
//! [`BackupPipeline`] is the job the scheduler invokes: pull every configured
//! record collection from the dashboard backend, assemble one JSON payload,
//! and commit it to a GitHub repository via the contents API.

pub mod error;
pub mod export;
pub mod github;
pub mod pipeline;

pub use error::{BackupError, Result};
pub use export::ExportClient;
pub use github::GithubUploader;
pub use pipeline::BackupPipeline;
