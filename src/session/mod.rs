//! Per-session state and the shared session registry.
//!
//! A [`Session`] represents one logical client conversation: it owns its
//! protocol-server instance, the last-applied auth overlay, and activity
//! timestamps. The [`registry::SessionRegistry`] is the single shared
//! mapping from session identifiers to live sessions.

pub mod registry;
pub mod server;

use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};

use crate::auth::overlay::AuthOverlay;
use crate::session::server::SessionServer;

pub use registry::SessionRegistry;
pub use server::{BackendDelegate, ToolDelegate};

/// One logical client conversation bound to a transport connection.
///
/// A session identifier is assigned only when the registry publishes the
/// session (after a successful initialize); until then `id()` is `None`
/// and the session is invisible to other requests.
pub struct Session {
    id: OnceLock<String>,
    server: SessionServer,
    state: Mutex<SessionState>,
    created_at: DateTime<Utc>,
}

struct SessionState {
    overlay: Option<AuthOverlay>,
    last_active: DateTime<Utc>,
}

impl Session {
    /// Stage a new, unregistered session around a protocol server.
    pub fn new(server: SessionServer) -> Self {
        let now = Utc::now();
        Self {
            id: OnceLock::new(),
            server,
            state: Mutex::new(SessionState {
                overlay: None,
                last_active: now,
            }),
            created_at: now,
        }
    }

    /// The assigned session identifier, once registered.
    pub fn id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    /// The owned protocol-server instance.
    pub fn server(&self) -> &SessionServer {
        &self.server
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-activity timestamp.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().expect("session state poisoned").last_active
    }

    /// Update the last-activity timestamp.
    pub fn mark_active(&self) {
        self.state.lock().expect("session state poisoned").last_active = Utc::now();
    }

    /// Resolve and record the effective overlay for one request.
    ///
    /// An empty incoming overlay is discarded and the previously recorded
    /// overlay (if any) applies unchanged. Otherwise the incoming overlay
    /// is merged over the recorded one (absent fields mean "no change")
    /// and written back so later scope-only requests inherit the last
    /// known credential.
    pub fn apply_overlay(&self, incoming: &AuthOverlay) -> AuthOverlay {
        let mut state = self.state.lock().expect("session state poisoned");
        if incoming.is_empty() {
            return state.overlay.clone().unwrap_or_default();
        }
        let prior = state.overlay.clone().unwrap_or_default();
        let effective = incoming.merged_over(&prior);
        state.overlay = Some(effective.clone());
        effective
    }

    /// The last overlay recorded on this session, if any.
    pub fn recorded_overlay(&self) -> Option<AuthOverlay> {
        self.state.lock().expect("session state poisoned").overlay.clone()
    }

    pub(crate) fn assign_id(&self, id: String) -> bool {
        self.id.set(id).is_ok()
    }
}
