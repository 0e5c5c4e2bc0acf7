//! HTTP API for submitting and controlling meeting sessions
//!
//! - POST /meetings - Join a meeting (the join runs in the background)
//! - GET /meetings/:id/status - Session snapshot
//! - GET /meetings/:id/transcript - Transcript accumulated so far
//! - POST /meetings/:id/pause, /meetings/:id/resume - Pause transcript capture
//! - POST /meetings/:id/stop - Stop the session and return its result
//! - GET /meetings/:id/result - Result of an ended session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StartMeetingRequest, StartMeetingResponse};
pub use routes::create_router;
pub use state::AppState;
