//! Route definitions for providers, sessions and chat turns.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::chat;
use crate::state::AppState;

/// Chat routes mounted under `/api/v1`.
///
/// ```text
/// GET    /providers                -> list_providers
/// POST   /sessions                 -> create_session
/// DELETE /sessions/{id}            -> delete_session
/// GET    /sessions/{id}/messages   -> list_messages
/// POST   /sessions/{id}/messages   -> send_message
/// DELETE /sessions/{id}/messages   -> clear_messages
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/providers", get(chat::list_providers))
        .route("/sessions", post(chat::create_session))
        .route("/sessions/{id}", delete(chat::delete_session))
        .route(
            "/sessions/{id}/messages",
            get(chat::list_messages)
                .post(chat::send_message)
                .delete(chat::clear_messages),
        )
}
