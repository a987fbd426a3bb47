use std::time::Duration;

use anyhow::Context;
use hmac::{Hmac, Mac};
use medikeep_scheduler::JobOutcome;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT: &str = "medikeep-notify";
const SIGNATURE_HEADER: &str = "x-medikeep-signature-256";
const DELIVERY_TIMEOUT_SECS: u64 = 15;

/// Pushes each settled backup outcome to a configured HTTP endpoint.
///
/// Payloads are signed GitHub-style when a secret is set: `sha256=<hex>` of
/// the HMAC-SHA256 over the raw body, in `X-Medikeep-Signature-256`.
/// Delivery is strictly best-effort; failures are logged and swallowed so the
/// scheduler never stalls on a dead endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// Deliver one outcome as a JSON POST.
    pub async fn send(&self, outcome: &JobOutcome) {
        let event = if outcome.success {
            "backup.completed"
        } else {
            "backup.failed"
        };
        let payload = json!({
            "event": event,
            "trigger": outcome.trigger,
            "error": outcome.error,
            "artifact": outcome.artifact,
            "startedAt": outcome.started_at,
            "finishedAt": outcome.finished_at,
        });
        let body = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("webhook payload serialization failed: {e}");
                return;
            }
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "application/json");
        if let Some(secret) = &self.secret {
            if let Some(signature) = sign(secret, &body) {
                request = request.header(SIGNATURE_HEADER, format!("sha256={signature}"));
            }
        }

        match request.body(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(event, "webhook delivered");
            }
            Ok(resp) => warn!(event, status = %resp.status(), "webhook endpoint rejected delivery"),
            Err(e) => warn!(event, "webhook delivery failed: {e}"),
        }
    }
}

/// Hex HMAC-SHA256 over the raw body bytes.
fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}
