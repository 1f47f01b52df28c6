use axum::routing::post;
use axum::Router;

use crate::handlers::comfyui;
use crate::state::AppState;

/// ComfyUI routes mounted at `/api/v1/comfyui`.
///
/// ```text
/// POST /test  -> test_connection
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/test", post(comfyui::test_connection))
}
