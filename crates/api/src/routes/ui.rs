use axum::{routing::get, Router};

use crate::handlers::ui;
use crate::state::AppState;

/// Mount the single-page UI at `/`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(ui::index))
}
