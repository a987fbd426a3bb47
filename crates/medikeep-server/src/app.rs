use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use medikeep_core::config::MedikeepConfig;
use medikeep_notify::NotificationStore;
use medikeep_scheduler::AutoScheduler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Central shared state, passed as `Arc<AppState>` to all handlers.
pub struct AppState {
    pub config: MedikeepConfig,
    pub scheduler: Arc<AutoScheduler>,
    pub notifications: Arc<NotificationStore>,
}

/// Assemble the full router. CORS is wide open so the browser dashboard can
/// talk to the API from its own origin.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(crate::http::health::health_handler))
        .route("/api/backup/status", get(crate::http::backup::status_handler))
        .route("/api/backup/run", post(crate::http::backup::run_handler))
        .route(
            "/api/backup/schedule",
            get(crate::http::backup::get_schedule_handler)
                .put(crate::http::backup::put_schedule_handler),
        )
        .route(
            "/api/notifications",
            get(crate::http::notifications::list_handler),
        )
        .route(
            "/api/notifications/{id}/read",
            post(crate::http::notifications::mark_read_handler),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
