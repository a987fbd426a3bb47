use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18620;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Scheduler poll cadence. Must stay below 60s so a minute-granularity
/// fire-time match can never fall between two checks.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;

/// Top-level config (medikeep.toml + MEDIKEEP_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedikeepConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Clinic REST backend the export job reads from. When absent no backup
    /// job is registered and manual runs report "not configured".
    pub clinic: Option<ClinicConfig>,
    /// GitHub repository backups are uploaded to. Same opt-out semantics as
    /// `clinic`.
    pub github: Option<GithubConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Default for MedikeepConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            clinic: None,
            github: None,
            notify: NotifyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, all API routes except /api/health require
    /// `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Where the schedule state JSON lives across restarts.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

/// Clinic dashboard REST backend the export job pulls records from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicConfig {
    /// Base URL without trailing slash, e.g. "https://api.clinic.example".
    pub base_url: String,
    /// Bearer token for the export endpoints.
    pub token: Option<String>,
    /// Resource collections included in each backup payload.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    pub token: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Directory inside the repo backups are written under.
    #[serde(default = "default_backup_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Optional webhook POSTed after every backup attempt.
    pub webhook_url: Option<String>,
    /// When set, webhook bodies are signed with HMAC-SHA256.
    pub webhook_secret: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_backup_dir() -> String {
    "backups".to_string()
}
fn default_resources() -> Vec<String> {
    vec![
        "patients".to_string(),
        "doctors".to_string(),
        "fees".to_string(),
    ]
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.medikeep/medikeep.db", home)
}
fn default_state_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.medikeep/schedule.json", home)
}

impl MedikeepConfig {
    /// Load config from a TOML file with MEDIKEEP_* env var overrides.
    ///
    /// Env keys nest on every underscore: `MEDIKEEP_SERVER_PORT` maps to
    /// `server.port`. Snake_case leaves (`auth_token`, `webhook_url`,
    /// `check_interval_secs`) therefore have no env spelling and can only be
    /// set in the file.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: MedikeepConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("MEDIKEEP_").split("_"))
            .extract()
            .map_err(|e| crate::error::MedikeepError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.medikeep/medikeep.toml", home)
}

/// Create the directory a data file lives in, if it doesn't exist yet.
pub fn ensure_parent_dir(path: &str) -> crate::error::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
