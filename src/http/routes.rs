use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Session control
        .route("/meetings", post(handlers::start_meeting))
        .route("/meetings/:meeting_id/stop", post(handlers::stop_meeting))
        .route("/meetings/:meeting_id/pause", post(handlers::pause_meeting))
        .route("/meetings/:meeting_id/resume", post(handlers::resume_meeting))
        // Session queries
        .route("/meetings/:meeting_id/status", get(handlers::get_meeting_status))
        .route(
            "/meetings/:meeting_id/transcript",
            get(handlers::get_meeting_transcript),
        )
        .route("/meetings/:meeting_id/result", get(handlers::get_meeting_result))
        .route("/meetings/:meeting_id", delete(handlers::delete_meeting))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
