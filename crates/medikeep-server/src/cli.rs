//! Client-side subcommands that talk to a running instance over its API.

use anyhow::{bail, Context};
use serde_json::Value;

const USER_AGENT: &str = "medikeep-cli";

/// `medikeep status`: print a human-readable schedule summary.
pub async fn status(url: &str, token: Option<&str>) -> anyhow::Result<()> {
    let snapshot = get_json(url, "/api/backup/status", token, 10).await?;

    let running = snapshot["running"].as_bool().unwrap_or(false);
    println!(
        "scheduler: {}",
        if running { "running" } else { "stopped" }
    );
    println!(
        "enabled:   {}",
        snapshot["enabled"].as_bool().unwrap_or(false)
    );
    println!(
        "next run:  {}",
        snapshot["nextRunAt"].as_str().unwrap_or("-")
    );
    println!(
        "last run:  {}",
        snapshot["lastRunAt"].as_str().unwrap_or("never")
    );
    let secs = snapshot["timeUntilNextSecs"].as_i64().unwrap_or(0);
    println!("due in:    {}", format_duration(secs));
    Ok(())
}

/// `medikeep run-now`: trigger a backup and report the outcome.
///
/// Exits nonzero when the backup itself failed, so this slots into cron
/// health checks.
pub async fn run_now(url: &str, token: Option<&str>) -> anyhow::Result<()> {
    println!("starting backup...");
    // Export plus upload can take a while on a slow clinic connection.
    let outcome = post_json(url, "/api/backup/run", token, 300).await?;

    if outcome["success"].as_bool().unwrap_or(false) {
        let filename = outcome["artifact"]["filename"].as_str().unwrap_or("?");
        let size = outcome["artifact"]["size"].as_u64().unwrap_or(0);
        println!("backup succeeded: {filename} ({size} bytes)");
        Ok(())
    } else {
        let reason = outcome["error"].as_str().unwrap_or("unknown error");
        bail!("backup failed: {reason}");
    }
}

async fn get_json(
    base: &str,
    route: &str,
    token: Option<&str>,
    timeout_secs: u64,
) -> anyhow::Result<Value> {
    let request = client(timeout_secs)?.get(endpoint(base, route));
    send(request, token, route).await
}

async fn post_json(
    base: &str,
    route: &str,
    token: Option<&str>,
    timeout_secs: u64,
) -> anyhow::Result<Value> {
    let request = client(timeout_secs)?.post(endpoint(base, route));
    send(request, token, route).await
}

async fn send(
    mut request: reqwest::RequestBuilder,
    token: Option<&str>,
    route: &str,
) -> anyhow::Result<Value> {
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("failed to reach the medikeep server at {route}"))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("{route} returned a non-JSON body"))?;
    if !status.is_success() {
        let detail = body["error"].as_str().unwrap_or("unknown error");
        bail!("{route} returned {status}: {detail}");
    }
    Ok(body)
}

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

fn endpoint(base: &str, route: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), route)
}

fn format_duration(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_render_at_the_right_granularity() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(65), "1m 05s");
        assert_eq!(format_duration(3600), "1h 00m");
        assert_eq!(format_duration(7265), "2h 01m");
        assert_eq!(format_duration(0), "0s");
    }

    #[test]
    fn endpoints_tolerate_trailing_slashes() {
        assert_eq!(
            endpoint("http://127.0.0.1:18620/", "/api/health"),
            "http://127.0.0.1:18620/api/health"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:18620", "/api/health"),
            "http://127.0.0.1:18620/api/health"
        );
    }
}
