use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use chrono::{DateTime, Utc};
use medikeep_core::config::GithubConfig;
use medikeep_scheduler::BackupArtifact;
use tracing::info;

use crate::error::{BackupError, Result};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "medikeep-backup";
const UPLOAD_TIMEOUT_SECS: u64 = 60;

/// Writes backup payloads into a GitHub repository through the contents API.
pub struct GithubUploader {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
    branch: String,
    dir: String,
}

impl GithubUploader {
    pub fn new(config: &GithubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            api_base: GITHUB_API.to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            branch: config.branch.clone(),
            dir: config.dir.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Timestamped filename so successive uploads never collide.
    pub fn filename_for(at: DateTime<Utc>) -> String {
        format!("backup-{}.json", at.format("%Y%m%d-%H%M%S"))
    }

    /// PUT the payload as a new file; returns the created file's descriptor.
    pub async fn upload(&self, payload: &[u8], at: DateTime<Utc>) -> Result<BackupArtifact> {
        let filename = Self::filename_for(at);
        let url = format!(
            "{}/repos/{}/{}/contents/{}/{}",
            self.api_base, self.owner, self.repo, self.dir, filename
        );
        let body = serde_json::json!({
            "message": format!("clinic backup {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            "content": base64::engine::general_purpose::STANDARD.encode(payload),
            "branch": self.branch,
        });

        let response = self
            .client
            .put(&url)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(300)
                .collect();
            return Err(BackupError::Upload { status, detail });
        }

        let created: serde_json::Value = response.json().await?;
        let content = &created["content"];
        let download_url = content["download_url"]
            .as_str()
            .ok_or_else(|| BackupError::MalformedResponse("missing content.download_url".into()))?
            .to_string();
        let artifact = BackupArtifact {
            filename: content["name"].as_str().unwrap_or(&filename).to_string(),
            size: content["size"].as_u64().unwrap_or(payload.len() as u64),
            download_url,
        };
        info!(filename = %artifact.filename, size = artifact.size, "backup uploaded");
        Ok(artifact)
    }
}
