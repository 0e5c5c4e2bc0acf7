use super::state::AppState;
use crate::capture::StreamOverrides;
use crate::session::{MeetingSession, TranscriptEntry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, Instrument};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartMeetingRequest {
    /// Display name the bot joins with
    pub name: String,

    pub meeting_url: String,

    /// Caption language (default: en-US)
    pub language: Option<String>,

    /// Summarization credential
    pub api_key: Option<String>,

    pub prompt: Option<String>,

    /// Show the browser window
    #[serde(default)]
    pub debug: bool,

    /// Record the meeting (default: true)
    pub record_meeting: Option<bool>,

    /// Recording directory (default: the service's output_dir)
    pub output_dir: Option<String>,

    #[serde(default)]
    pub stream_config: StreamOverrides,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartMeetingResponse {
    pub meeting_id: String,
    pub status: String,
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_found(meeting_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Meeting {} not found", meeting_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /meetings
/// Create a session and join the meeting in the background
pub async fn start_meeting(
    State(state): State<AppState>,
    Json(req): Json<StartMeetingRequest>,
) -> impl IntoResponse {
    let mut config = state.defaults.session(req.name, req.meeting_url);
    if let Some(language) = req.language {
        config.language = language;
    }
    if let Some(record_meeting) = req.record_meeting {
        config.record_meeting = record_meeting;
    }
    if let Some(output_dir) = req.output_dir {
        config.recording_location = output_dir;
    }
    if req.prompt.is_some() {
        config.prompt = req.prompt;
    }
    config.api_key = req.api_key;
    config.debug = req.debug;
    config.stream_config = req.stream_config;

    let session = match MeetingSession::new(config, state.collaborators.create()) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create session: {}", e);
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let meeting_id = session.id().to_string();
    info!("Joining meeting {} as {}", session.config().meeting_url, meeting_id);

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(meeting_id.clone(), session.clone());
    }

    let joining = session.clone();
    tokio::spawn(
        async move {
            if let Err(e) = joining.start().await {
                error!("Session {} failed to join: {}", joining.id(), e);
            }
        }
        .in_current_span(),
    );

    (
        StatusCode::ACCEPTED,
        Json(StartMeetingResponse {
            meeting_id,
            status: session.status().to_string(),
            output_path: session.output_path(),
        }),
    )
        .into_response()
}

/// POST /meetings/:meeting_id/stop
/// Stop a session and return its result
pub async fn stop_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.session(&meeting_id).await else {
        return not_found(&meeting_id);
    };

    info!("Stopping meeting: {}", meeting_id);

    match session.stop().await {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is {}", meeting_id, session.status()),
        ),
    }
}

/// POST /meetings/:meeting_id/pause
pub async fn pause_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.session(&meeting_id).await else {
        return not_found(&meeting_id);
    };

    if session.pause() {
        (StatusCode::OK, Json(session.snapshot().await)).into_response()
    } else {
        error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is {}", meeting_id, session.status()),
        )
    }
}

/// POST /meetings/:meeting_id/resume
pub async fn resume_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.session(&meeting_id).await else {
        return not_found(&meeting_id);
    };

    if session.resume() {
        (StatusCode::OK, Json(session.snapshot().await)).into_response()
    } else {
        error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is {}", meeting_id, session.status()),
        )
    }
}

/// GET /meetings/:meeting_id/status
pub async fn get_meeting_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    match state.session(&meeting_id).await {
        Some(session) => (StatusCode::OK, Json(session.snapshot().await)).into_response(),
        None => not_found(&meeting_id),
    }
}

/// GET /meetings/:meeting_id/transcript
/// Transcript accumulated so far
pub async fn get_meeting_transcript(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    match state.session(&meeting_id).await {
        Some(session) => {
            let transcript: Vec<TranscriptEntry> = session.transcript().await;
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => not_found(&meeting_id),
    }
}

/// GET /meetings/:meeting_id/result
pub async fn get_meeting_result(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.session(&meeting_id).await else {
        return not_found(&meeting_id);
    };

    match session.result() {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} has not ended ({})", meeting_id, session.status()),
        ),
    }
}

/// DELETE /meetings/:meeting_id
/// Forget an ended session and its transcript
pub async fn delete_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.get(&meeting_id) else {
        return not_found(&meeting_id);
    };

    if !session.has_ended() {
        return error_response(
            StatusCode::CONFLICT,
            format!("Meeting {} is {}", meeting_id, session.status()),
        );
    }

    sessions.remove(&meeting_id);
    info!("Meeting {} removed", meeting_id);

    StatusCode::NO_CONTENT.into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
