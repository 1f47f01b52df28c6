//! In-memory conversation sessions.
//!
//! Each session is guarded by its own mutex so turns in different sessions
//! never contend. Sessions idle for longer than [`SessionLimits::idle_ttl`]
//! are dropped, and the store never holds more than
//! [`SessionLimits::max_sessions`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assistant_core::chat::Transcript;
use assistant_core::error::CoreError;
use assistant_core::types::Timestamp;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One conversation.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub transcript: Transcript,
    pub created_at: Timestamp,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            transcript: Transcript::new(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Shared handle to a single session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Idle time after which a session is dropped.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Retention bounds for [`SessionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug)]
struct Entry {
    handle: SessionHandle,
    last_active: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_active) > ttl
    }
}

/// Registry of all live sessions.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared through
/// the application state.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: RwLock::default(),
            limits,
        }
    }

    /// Start a new, empty session and return its id.
    ///
    /// Expired sessions are dropped first. If the store is still full, the
    /// least recently used session makes room.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(now, self.limits.idle_ttl));
        let expired = before - sessions.len();

        let mut evicted = None;
        if sessions.len() >= self.limits.max_sessions {
            evicted = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_active)
                .map(|(id, _)| *id);
            if let Some(oldest) = evicted {
                sessions.remove(&oldest);
            }
        }

        sessions.insert(
            id,
            Entry {
                handle: Arc::new(Mutex::new(Session::new(id))),
                last_active: now,
            },
        );

        tracing::debug!(
            session_id = %id,
            expired,
            evicted = ?evicted,
            live = sessions.len(),
            "Session created",
        );
        id
    }

    /// Look up a session by id and mark it as active.
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, CoreError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let expired = match sessions.get_mut(&id) {
            Some(entry) if !entry.is_expired(now, self.limits.idle_ttl) => {
                entry.last_active = now;
                return Ok(Arc::clone(&entry.handle));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            sessions.remove(&id);
            tracing::debug!(session_id = %id, "Session expired");
        }
        Err(not_found(id))
    }

    /// Drop a session.
    pub async fn remove(&self, id: Uuid) -> Result<(), CoreError> {
        if self.sessions.write().await.remove(&id).is_none() {
            return Err(not_found(id));
        }
        tracing::debug!(session_id = %id, "Session removed");
        Ok(())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn not_found(id: Uuid) -> CoreError {
    CoreError::NotFound {
        entity: "Session",
        id: id.to_string(),
    }
}
