//! Schedule and manual-run endpoints for the backup scheduler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use medikeep_scheduler::{JobOutcome, SchedulePatch, ScheduleState, SchedulerError, StatusSnapshot};

use crate::app::AppState;
use crate::http::{check_auth, unauthorized, ApiError};

/// GET /api/backup/status. The dashboard polls this for its scheduler card.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusSnapshot>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(state.scheduler.status()))
}

/// POST /api/backup/run. Fires a manual backup and waits for it to settle.
///
/// A failed backup is still a 200: the outcome body carries `success: false`
/// and the reason. 500 is reserved for the scheduler failing to persist its
/// own bookkeeping.
pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<JobOutcome>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    match state.scheduler.run_now().await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: e.to_string(),
            }),
        )),
    }
}

/// GET /api/backup/schedule.
pub async fn get_schedule_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ScheduleState>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    Ok(Json(state.scheduler.schedule()))
}

/// PUT /api/backup/schedule. Merge-patch semantics: absent fields keep their
/// current values. Returns the full schedule after the update.
///
/// The patch is deserialized inside the handler: a bad `time` or `timezone`
/// must reject as 400 with the usual JSON error body, not the typed
/// extractor's plain-text 422.
pub async fn put_schedule_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ScheduleState>, (StatusCode, Json<ApiError>)> {
    if !check_auth(&state, &headers) {
        return Err(unauthorized());
    }
    let patch: SchedulePatch = serde_json::from_value(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: e.to_string(),
            }),
        )
    })?;
    match state.scheduler.update_schedule(patch) {
        Ok(_) => Ok(Json(state.scheduler.schedule())),
        Err(SchedulerError::Config(message)) => Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: message }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: e.to_string(),
            }),
        )),
    }
}
