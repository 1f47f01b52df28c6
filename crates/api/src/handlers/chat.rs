//! Handlers for providers, sessions and chat turns.

use assistant_core::chat::ChatMessage;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::chat::ChatRequest;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body returned when a session is created.
#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub id: Uuid,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// GET /api/v1/providers
///
/// List every provider with its readiness.
pub async fn list_providers(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let providers = state.orchestrator.providers().await;
    Ok(Json(DataResponse { data: providers }))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// POST /api/v1/sessions
pub async fn create_session(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let id = state.sessions.create().await;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedSession { id },
        }),
    ))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    state.sessions.remove(id).await?;

    tracing::info!(session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/{id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let session = state.sessions.get(id).await?;
    let messages = session.lock().await.transcript.messages().to_vec();
    Ok(Json(DataResponse { data: messages }))
}

/// POST /api/v1/sessions/{id}/messages
///
/// Run one chat turn. The session lock is released while the provider
/// runs; the user message and the reply are appended together afterwards.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ChatRequest>,
) -> AppResult<impl IntoResponse> {
    let content = input.content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest("content must not be empty".into()));
    }

    let session = state.sessions.get(id).await?;
    let history = session.lock().await.transcript.messages().to_vec();

    let reply = state.orchestrator.respond(&history, &input).await?;

    {
        let mut session = session.lock().await;
        session.transcript.push(ChatMessage::user(content));
        session.transcript.push(reply.clone());
    }

    tracing::info!(
        session_id = %id,
        provider = ?input.provider,
        has_image = reply.image_url.is_some(),
        has_error = reply.error.is_some(),
        "Chat turn completed",
    );

    Ok(Json(DataResponse { data: reply }))
}

/// DELETE /api/v1/sessions/{id}/messages
pub async fn clear_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let session = state.sessions.get(id).await?;
    session.lock().await.transcript.clear();

    tracing::info!(session_id = %id, "Transcript cleared");
    Ok(StatusCode::NO_CONTENT)
}
