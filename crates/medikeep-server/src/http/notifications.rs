//! Backup activity log endpoints.
//!
//! The dashboard polls `GET /api/notifications` for its bell menu and flips
//! entries read with `POST /api/notifications/{id}/read`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use medikeep_notify::{Notification, NotifyError, MAX_STORED};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::http::{check_auth, unauthorized, ApiError};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
pub struct ListResponse {
    pub notifications: Vec<Notification>,
    pub unread: u64,
}

/// GET /api/notifications?limit=20. Newest first.
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let limit = query.limit.min(MAX_STORED);
    let notifications = state.notifications.list(limit).map_err(internal)?;
    let unread = state.notifications.unread_count().map_err(internal)?;
    Ok(Json(ListResponse {
        notifications,
        unread,
    }))
}

/// POST /api/notifications/{id}/read.
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let updated = state.notifications.mark_read(&id).map_err(internal)?;
    if !updated {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: format!("no notification with id {id}"),
            }),
        ));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

fn internal(e: NotifyError) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: e.to_string(),
        }),
    )
}
