use std::sync::Arc;

use crate::chat::ChatOrchestrator;
use crate::config::ServerConfig;
use crate::session::SessionStore;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live conversation sessions.
    pub sessions: Arc<SessionStore>,
    /// Provider dispatch for chat turns.
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Build the state and its collaborators from configuration.
    pub fn new(config: ServerConfig) -> Self {
        let orchestrator = ChatOrchestrator::from_config(&config);
        let sessions = SessionStore::with_limits(config.session_limits());
        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
