use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use medikeep_core::config::ClinicConfig;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};

const USER_AGENT: &str = "medikeep-backup";
const EXPORT_TIMEOUT_SECS: u64 = 30;

/// Pulls record collections out of the clinic dashboard's REST backend and
/// assembles them into a single backup payload.
pub struct ExportClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    resources: Vec<String>,
}

impl ExportClient {
    pub fn new(config: &ClinicConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(EXPORT_TIMEOUT_SECS))
            .build()
            .context("failed to build export HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            resources: config.resources.clone(),
        })
    }

    /// Fetch every configured resource and serialize the combined payload as
    /// pretty JSON. Any resource failing fails the whole export.
    pub async fn export(&self) -> Result<Vec<u8>> {
        let mut resources = Map::new();
        let mut record_count = 0u64;
        for resource in &self.resources {
            let records = self.fetch_resource(resource).await?;
            record_count += match &records {
                Value::Array(items) => items.len() as u64,
                _ => 1,
            };
            resources.insert(resource.clone(), records);
        }

        let payload = json!({
            "generatedAt": Utc::now(),
            "source": self.base_url,
            "resources": resources,
            "recordCount": record_count,
        });
        info!(record_count, "clinic export assembled");
        Ok(serde_json::to_vec_pretty(&payload)?)
    }

    /// GET one resource collection, retrying once on transport errors.
    /// HTTP error statuses are final; only connect/timeout failures retry.
    async fn fetch_resource(&self, resource: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, resource);
        let response = match self.request(&url).await {
            Ok(response) => response,
            Err(e) => {
                warn!(resource, "export request failed, retrying once: {e}");
                self.request(&url).await?
            }
        };
        if !response.status().is_success() {
            return Err(BackupError::Resource {
                resource: resource.to_string(),
                status: response.status(),
            });
        }
        let records = response.json().await?;
        debug!(resource, "resource fetched");
        Ok(records)
    }

    async fn request(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request.send().await
    }
}
