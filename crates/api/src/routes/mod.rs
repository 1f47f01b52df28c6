pub mod chat;
pub mod comfyui;
pub mod health;
pub mod ui;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /providers                         provider list with readiness
/// /sessions                          create session
/// /sessions/{id}/messages            transcript (GET, POST turn, DELETE clear)
/// /comfyui/test                      ComfyUI connectivity probe
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(chat::router())
        .nest("/comfyui", comfyui::router())
}
