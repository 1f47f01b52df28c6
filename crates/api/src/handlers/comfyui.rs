//! ComfyUI connectivity check.

use assistant_comfyui::api::ComfyUIApiError;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_CONNECT_ERROR_CHARS: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct TestConnectionRequest {
    /// Instance to probe; the configured default when absent.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
    pub url: String,
}

/// POST /api/v1/comfyui/test
///
/// Probe `GET {url}/system_stats`. An unreachable instance is reported in
/// the body, not as an HTTP error.
pub async fn test_connection(
    State(state): State<AppState>,
    Json(input): Json<TestConnectionRequest>,
) -> AppResult<impl IntoResponse> {
    let url = state.orchestrator.comfyui_url(input.url.as_deref()).to_string();

    let (connected, message) = match state.orchestrator.generation_client().probe(&url).await {
        Ok(_) => (true, "ComfyUI connected!".to_string()),
        Err(ComfyUIApiError::ApiError { status, .. }) => (false, format!("Error: {status}")),
        Err(ComfyUIApiError::Request(e)) => {
            let detail: String = e
                .without_url()
                .to_string()
                .chars()
                .take(MAX_CONNECT_ERROR_CHARS)
                .collect();
            (false, format!("Cannot connect: {detail}"))
        }
    };

    tracing::info!(comfyui_url = %url, connected, "ComfyUI connectivity probe");

    Ok(Json(DataResponse {
        data: ConnectionStatus {
            connected,
            message,
            url,
        },
    }))
}
