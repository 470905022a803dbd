//! Shared session registry.
//!
//! A single concurrent mapping from session identifiers to live sessions,
//! accessed by every inbound request. Sessions are staged unregistered
//! and published only when the transport assigns an identifier, so a
//! partially-initialized session is never observable.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::Session;

/// Concurrent map of session id to session.
///
/// Uses DashMap for lock-free concurrent resolve/register/remove from
/// simultaneously handled requests.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session by identifier.
    pub fn resolve(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Publish a staged session under a freshly generated identifier.
    ///
    /// The identifier is an unguessable UUIDv4; once issued it maps to
    /// exactly this session for the session's lifetime.
    pub fn register(&self, session: Arc<Session>) -> String {
        let id = Uuid::new_v4().to_string();
        session.assign_id(id.clone());
        self.sessions.insert(id.clone(), session);
        info!(session_id = %id, active = self.sessions.len(), "session registered");
        id
    }

    /// Evict a session and release its resources.
    ///
    /// Idempotent: removing an absent identifier is a no-op and returns
    /// `false`.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id, active = self.sessions.len(), "session removed");
        } else {
            debug!(session_id, "remove for unknown session ignored");
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
