//! Per-session conversation state.
//!
//! Sessions are created on first use and torn down explicitly with
//! [`SessionStore::close`] or after going idle with
//! [`SessionStore::evict_idle`]. Each session's memory sits behind an async
//! mutex that the pipeline holds for a whole query, so queries within one
//! session run one at a time while different sessions proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use repolens_memory::{ConversationMemory, MemoryBound};
use tokio::sync::MutexGuard;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

pub struct Session {
    id: SessionId,
    memory: tokio::sync::Mutex<ConversationMemory>,
    last_used: Mutex<Instant>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(id: SessionId, bound: MemoryBound) -> Self {
        Self {
            id,
            memory: tokio::sync::Mutex::new(ConversationMemory::new(bound)),
            last_used: Mutex::new(Instant::now()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Exclusive access to the conversation memory. Waits for any query
    /// already running in this session.
    pub async fn lock(&self) -> MutexGuard<'_, ConversationMemory> {
        let guard = self.memory.lock().await;
        self.touch();
        guard
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    bound: MemoryBound,
    idle_ttl: Duration,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("bound", &self.bound)
            .field("idle_ttl", &self.idle_ttl)
            .finish()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(bound: MemoryBound, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            bound,
            idle_ttl,
        }
    }

    pub fn get_or_create(&self, id: &SessionId) -> Arc<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(session = %id, "session created");
            Arc::new(Session::new(id.clone(), self.bound))
        });
        session.touch();
        Arc::clone(session)
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drop a session and its memory. Returns whether it existed.
    pub fn close(&self, id: &SessionId) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            tracing::debug!(session = %id, "session closed");
        }
        removed
    }

    /// Drop sessions idle for at least the configured TTL. Sessions with a
    /// query in flight are kept. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, s| s.idle_for() < self.idle_ttl || s.memory.try_lock().is_err());
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
