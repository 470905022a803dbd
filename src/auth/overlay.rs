//! Credential/scope identity resolved per inbound request.
//!
//! # Header Precedence
//!
//! An explicit identity-token header wins over an explicit API-key header,
//! which wins over a generic `Authorization: Bearer` value. A bearer value
//! is sniffed by shape: three dot-separated non-empty segments mean an
//! identity token, anything else is treated as an opaque API key.
//! Workspace/project scope headers are read independently of which
//! credential form is used.

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue};

/// Explicit identity-token header.
pub const IDENTITY_TOKEN_HEADER: &str = "x-identity-token";
/// Explicit API-key header.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Workspace scope header.
pub const WORKSPACE_HEADER: &str = "x-workspace-id";
/// Project scope header.
pub const PROJECT_HEADER: &str = "x-project-id";

/// The caller's effective identity for one request.
///
/// At most one of `api_key` / `id_token` is populated: extraction resolves
/// a single primary credential. An overlay with neither credential but with
/// scope fields is a valid scope-only update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOverlay {
    /// Opaque API-key credential
    pub api_key: Option<String>,
    /// Bearer/identity-token credential
    pub id_token: Option<String>,
    /// Workspace scope identifier
    pub workspace: Option<String>,
    /// Project scope identifier
    pub project: Option<String>,
}

impl AuthOverlay {
    /// Resolve an overlay from inbound request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut overlay = Self {
            workspace: header_str(headers, WORKSPACE_HEADER),
            project: header_str(headers, PROJECT_HEADER),
            ..Self::default()
        };

        if let Some(token) = header_str(headers, IDENTITY_TOKEN_HEADER) {
            overlay.id_token = Some(token);
        } else if let Some(key) = header_str(headers, API_KEY_HEADER) {
            overlay.api_key = Some(key);
        } else if let Some(bearer) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            if looks_like_token(bearer) {
                overlay.id_token = Some(bearer.to_string());
            } else {
                overlay.api_key = Some(bearer.to_string());
            }
        }

        overlay
    }

    /// Whether the overlay carries a primary credential.
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some() || self.id_token.is_some()
    }

    /// Whether the overlay carries nothing at all.
    pub fn is_empty(&self) -> bool {
        !self.has_credential() && self.workspace.is_none() && self.project.is_none()
    }

    /// Merge this overlay over a previously recorded one.
    ///
    /// Absent fields mean "no change": a scope-only update keeps the prior
    /// credential, and absent scope fields keep the prior scope. When this
    /// overlay carries a credential it replaces the prior credential pair
    /// wholesale, so a session never accumulates two primary credentials.
    pub fn merged_over(&self, prior: &AuthOverlay) -> AuthOverlay {
        let (api_key, id_token) = if self.has_credential() {
            (self.api_key.clone(), self.id_token.clone())
        } else {
            (prior.api_key.clone(), prior.id_token.clone())
        };
        AuthOverlay {
            api_key,
            id_token,
            workspace: self.workspace.clone().or_else(|| prior.workspace.clone()),
            project: self.project.clone().or_else(|| prior.project.clone()),
        }
    }

    /// Identity headers to advertise on an outbound dispatch.
    ///
    /// The identity token travels as a bearer `Authorization` header, an
    /// API key as `x-api-key`. Scope identifiers are always attached when
    /// present. With no credential the request goes out unauthenticated.
    pub fn identity_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.id_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        } else if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
            }
        }
        if let Some(workspace) = &self.workspace {
            if let Ok(value) = HeaderValue::from_str(workspace) {
                headers.insert(HeaderName::from_static(WORKSPACE_HEADER), value);
            }
        }
        if let Some(project) = &self.project {
            if let Ok(value) = HeaderValue::from_str(project) {
                headers.insert(HeaderName::from_static(PROJECT_HEADER), value);
            }
        }
        headers
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Token-shaped means three dot-separated non-empty segments.
fn looks_like_token(value: &str) -> bool {
    let mut segments = 0;
    for segment in value.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}
