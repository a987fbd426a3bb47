use axum::Json;
use serde_json::{json, Value};

/// GET /api/health. Liveness endpoint, never behind auth.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("MEDIKEEP_GIT_SHA"),
    }))
}
