//! Route handler functions for all API endpoints.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use cadence_chat::types::SessionSnapshot;
use cadence_chat::{TurnRequest, TurnResponse};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

// =============================================================================
// Chat
// =============================================================================

/// POST /api/chat - run one turn.
///
/// The body is parsed by hand so malformed JSON gets the same error shape
/// as every other failure.
pub async fn chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TurnResponse>, ApiError> {
    let request: TurnRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let response = state.orchestrator.handle_turn(request).await?;
    Ok(Json(response))
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /api/sessions/{id}/history - conversation and track history.
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let snapshot = state.orchestrator.history(id).await?;
    Ok(Json(snapshot))
}

/// DELETE /api/sessions/{id} - forget a session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Events and health
// =============================================================================

/// GET /api/events - live domain events as SSE.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.event_name()).data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.orchestrator.active_sessions(),
    })
}
