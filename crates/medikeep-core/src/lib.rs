//! Configuration and shared error type for the medikeep backup service.

pub mod config;
pub mod error;

pub use config::MedikeepConfig;
pub use error::{MedikeepError, Result};
