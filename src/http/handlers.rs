use super::state::AppState;
use crate::catalog::LanguageResourceScope;
use crate::error::SpeechError;
use crate::participants::{Participant, ParticipantChange};
use crate::session::{
    OutputFormat, SessionConfig, SessionController, SessionMode, SessionState, SessionStats,
    TranscriptSegment,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Source language (default from config)
    pub language: Option<String>,

    pub output_format: Option<OutputFormat>,

    pub deployment_id: Option<String>,

    #[serde(default)]
    pub mode: SessionMode,

    /// Extra engine parameters
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub state: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantAction {
    #[default]
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    #[serde(default)]
    pub action: ParticipantAction,

    #[serde(flatten)]
    pub participant: Participant,
}

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub change: ParticipantChange,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Deserialize)]
pub struct LanguagesQuery {
    /// Comma-separated scopes: speech, text, tts (default: all)
    pub scopes: Option<String>,

    /// Locale for display names; falls back to the Accept-Language header
    pub accept: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn speech_error_response(e: &SpeechError) -> Response {
    let status = match e {
        SpeechError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SpeechError::InvalidState { .. } | SpeechError::Busy { .. } => StatusCode::CONFLICT,
        SpeechError::NotFound(_) => StatusCode::NOT_FOUND,
        SpeechError::Canceled(_) => StatusCode::BAD_GATEWAY,
        SpeechError::Disposed => StatusCode::GONE,
    };
    error_response(status, e.to_string())
}

fn session_not_found(session_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Session {} not found", session_id),
    )
}

async fn find_session(state: &AppState, session_id: &str) -> Option<Arc<SessionController>> {
    state.sessions.read().await.get(session_id).cloned()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Create a session and start continuous recognition
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Creating session: {}", session_id);

    // Held until the session is registered or the create fails
    let _reservation = match state.reserve(&session_id).await {
        Some(reservation) => reservation,
        None => {
            return error_response(
                StatusCode::CONFLICT,
                format!("Session {} already exists", session_id),
            );
        }
    };

    let config = SessionConfig {
        session_id: session_id.clone(),
        recognition_language: req
            .language
            .unwrap_or_else(|| state.defaults.recognition_language.clone()),
        output_format: req.output_format.unwrap_or(state.defaults.output_format),
        deployment_id: req.deployment_id,
        mode: req.mode,
        parameters: req.parameters,
    };

    if let Err(e) = config.validate() {
        return speech_error_response(&e);
    }

    let engine = match state.engines.create(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to create engine: {:#}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to create engine: {}", e),
            );
        }
    };

    let session = match SessionController::new(config, engine) {
        Ok(session) => Arc::new(session),
        Err(e) => return speech_error_response(&e),
    };

    if let Err(e) = session.start().await {
        error!("Failed to start session {}: {}", session_id, e);
        if let Err(e) = session.dispose().await {
            warn!("Failed to dispose session {}: {}", session_id, e);
        }
        return speech_error_response(&e);
    }

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), Arc::clone(&session));
    }

    info!("Session started: {}", session_id);

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session_id.clone(),
            state: session.state(),
            message: format!("Recognition started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/stop
/// Stop recognition; the session stays queryable until deleted
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping session: {}", session_id);

    let Some(session) = find_session(&state, &session_id).await else {
        return session_not_found(&session_id);
    };

    match session.stop().await {
        Ok(()) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                session_id: session_id.clone(),
                state: session.state(),
                message: "Recognition stopped".to_string(),
                stats: session.stats(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop session {}: {}", session_id, e);
            speech_error_response(&e)
        }
    }
}

/// DELETE /sessions/:session_id
/// Dispose a session and forget it
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    let Some(session) = session else {
        return session_not_found(&session_id);
    };

    let stats = session.stats();
    if let Err(e) = session.dispose().await {
        return speech_error_response(&e);
    }

    info!("Session disposed: {}", session_id);

    (
        StatusCode::OK,
        Json(StopSessionResponse {
            session_id,
            state: session.state(),
            message: "Session disposed".to_string(),
            stats,
        }),
    )
        .into_response()
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match find_session(&state, &session_id).await {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => session_not_found(&session_id),
    }
}

/// GET /sessions/:session_id/transcript
/// Recognized text accumulated so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match find_session(&state, &session_id).await {
        Some(session) => {
            let transcript: Vec<TranscriptSegment> = session.transcript();
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => session_not_found(&session_id),
    }
}

/// POST /sessions/:session_id/participants
/// Add or remove a conversation participant
pub async fn update_participant(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ParticipantRequest>,
) -> impl IntoResponse {
    let Some(session) = find_session(&state, &session_id).await else {
        return session_not_found(&session_id);
    };

    let add = matches!(req.action, ParticipantAction::Add);
    let user_id = req.participant.user_id.trim().to_string();

    match session.update_participant(add, req.participant) {
        Ok(change) => (
            StatusCode::OK,
            Json(ParticipantResponse {
                user_id,
                change,
                participants: session.participants(),
            }),
        )
            .into_response(),
        Err(e) => speech_error_response(&e),
    }
}

/// GET /languages?scopes=speech,text&accept=de
pub async fn get_languages(
    State(state): State<AppState>,
    Query(query): Query<LanguagesQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let scopes = match LanguageResourceScope::parse_list(query.scopes.as_deref().unwrap_or("")) {
        Ok(scopes) => scopes,
        Err(e) => return speech_error_response(&e),
    };

    let accept = query.accept.or_else(|| {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    match state
        .catalog
        .get_language_resource(scopes, accept.as_deref())
        .await
    {
        Ok(resource) => (StatusCode::OK, Json(resource)).into_response(),
        Err(e) => {
            error!("Failed to load language resources: {:#}", e);
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Language resources unavailable: {}", e),
            )
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
