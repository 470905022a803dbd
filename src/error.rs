//! Error taxonomy for relaygate.
//!
//! Every failed outbound attempt is classified into a stable [`ErrorKind`]
//! by a pure function of the status signal. Retry eligibility and
//! client-facing messaging are both decided from that classification; no
//! other module re-interprets status codes.
//!
//! Gateway-level conditions (unknown session, missing credentials, caller
//! cancellation) have their own variants since retrying them cannot help.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::jsonrpc::{ErrorData, JsonRpcError};

/// Stable classification of a failed outbound attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received (connect failure, reset, attempt timeout).
    Network,
    /// HTTP 400.
    BadRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 403.
    Forbidden,
    /// HTTP 404.
    NotFound,
    /// HTTP 409.
    Conflict,
    /// HTTP 422.
    Validation,
    /// HTTP 429.
    RateLimited,
    /// HTTP 500.
    Internal,
    /// HTTP 502.
    BadGateway,
    /// HTTP 503.
    Unavailable,
    /// HTTP 504.
    GatewayTimeout,
    /// Any status with no mapping.
    Unknown,
}

impl ErrorKind {
    /// Classify a status signal. Absence of a response is a network failure.
    pub fn classify(status: Option<u16>) -> Self {
        match status {
            None => Self::Network,
            Some(400) => Self::BadRequest,
            Some(401) => Self::Unauthorized,
            Some(403) => Self::Forbidden,
            Some(404) => Self::NotFound,
            Some(409) => Self::Conflict,
            Some(422) => Self::Validation,
            Some(429) => Self::RateLimited,
            Some(500) => Self::Internal,
            Some(502) => Self::BadGateway,
            Some(503) => Self::Unavailable,
            Some(504) => Self::GatewayTimeout,
            Some(_) => Self::Unknown,
        }
    }

    /// Whether a failure of this kind is plausibly transient.
    ///
    /// Only these kinds are retried by the dispatcher; everything else
    /// terminates the logical call on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::RateLimited
                | Self::Internal
                | Self::BadGateway
                | Self::Unavailable
                | Self::GatewayTimeout
        )
    }

    /// Snake-case name for logs and error payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
            Self::BadGateway => "bad_gateway",
            Self::Unavailable => "unavailable",
            Self::GatewayTimeout => "gateway_timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All error conditions relaygate can surface to a caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Invalid JSON in the request body.
    #[error("Invalid JSON: {details}")]
    ParseError {
        /// Description of the parse error
        details: String,
    },

    /// Request is not a valid JSON-RPC 2.0 message.
    #[error("Invalid JSON-RPC request: {details}")]
    InvalidRequest {
        /// Description of what makes the request invalid
        details: String,
    },

    /// A backend call failed after retry policy was applied.
    #[error("Backend call failed ({kind}): {message}")]
    Backend {
        /// Classified failure kind
        kind: ErrorKind,
        /// Original HTTP status, if a response was received
        status: Option<u16>,
        /// Human-readable message (body-embedded message when present,
        /// protocol status text otherwise)
        message: String,
        /// Raw response body for diagnostics
        body: Option<String>,
        /// Server-supplied retry-after directive in seconds
        retry_after: Option<u64>,
    },

    /// The caller's cancellation signal aborted the in-flight dispatch.
    #[error("Call cancelled by caller")]
    Cancelled,

    /// Request referenced a session identifier the registry does not know.
    #[error("Unknown session '{session_id}'. Re-initialize to obtain a new session")]
    UnknownSession {
        /// The session identifier that failed to resolve
        session_id: String,
    },

    /// Authentication is required and no credential was presented.
    #[error("No credentials presented and authentication is required")]
    MissingCredentials,

    /// Internal gateway error - should not happen.
    #[error("Internal error: {details}")]
    InternalError {
        /// Description for debugging
        details: String,
    },
}

impl GatewayError {
    /// Build a [`GatewayError::Backend`] from a classified response.
    ///
    /// The message prefers a `message` field embedded in the response body
    /// (either top-level or under `error`), falling back to the canonical
    /// HTTP status text.
    pub fn from_response(status: u16, body: &[u8], retry_after: Option<u64>) -> Self {
        let kind = ErrorKind::classify(Some(status));
        let raw = String::from_utf8_lossy(body).into_owned();
        let message = embedded_message(&raw).unwrap_or_else(|| {
            http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(|r| format!("HTTP {status} {r}"))
                .unwrap_or_else(|| format!("HTTP {status}"))
        });
        Self::Backend {
            kind,
            status: Some(status),
            message,
            body: (!raw.is_empty()).then_some(raw),
            retry_after,
        }
    }

    /// Build a network-level [`GatewayError::Backend`] (no response received).
    pub fn network(message: impl Into<String>) -> Self {
        Self::Backend {
            kind: ErrorKind::Network,
            status: None,
            message: message.into(),
            body: None,
            retry_after: None,
        }
    }

    /// Whether the dispatcher may retry this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }

    /// Server-supplied retry-after directive, if the failure carried one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Backend { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Maps the error to a JSON-RPC 2.0 error code.
    ///
    /// Standard codes (-32700 to -32603) cover protocol errors; relaygate
    /// custom codes (-32000 to -32013, -32800) cover dispatch and session
    /// conditions.
    pub fn to_jsonrpc_code(&self) -> i32 {
        match self {
            Self::ParseError { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::InternalError { .. } => -32603,
            Self::Backend { kind, .. } => match kind {
                ErrorKind::Network => -32000,
                ErrorKind::GatewayTimeout => -32001,
                ErrorKind::RateLimited => -32009,
                ErrorKind::Unavailable => -32013,
                _ => -32002,
            },
            Self::UnknownSession { .. } => -32004,
            Self::MissingCredentials => -32005,
            Self::Cancelled => -32800,
        }
    }

    /// Returns the error type name for logging and error payloads.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Backend { kind, .. } => kind.as_str(),
            Self::Cancelled => "cancelled",
            Self::UnknownSession { .. } => "unknown_session",
            Self::MissingCredentials => "missing_credentials",
            Self::InternalError { .. } => "internal_error",
        }
    }

    /// Structured detail safe to return to the caller.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Backend { status, body, .. } => {
                let mut detail = serde_json::Map::new();
                if let Some(s) = status {
                    detail.insert("status".into(), Value::from(*s));
                }
                if let Some(b) = body {
                    detail.insert("body".into(), Value::from(b.clone()));
                }
                (!detail.is_empty()).then_some(Value::Object(detail))
            }
            Self::UnknownSession { session_id } => {
                Some(serde_json::json!({ "session_id": session_id }))
            }
            _ => None,
        }
    }

    /// Converts the error to a JSON-RPC error object.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.to_jsonrpc_code(),
            message: self.to_string(),
            data: Some(ErrorData {
                error_type: self.error_type_name().to_string(),
                details: self.details(),
                retry_after: self.retry_after(),
            }),
        }
    }

    /// HTTP status the gateway front door answers with for this error.
    ///
    /// JSON-RPC level errors still travel as HTTP 200; only the two
    /// pre-dispatch rejections get distinguishing HTTP statuses so a
    /// transport client can react without parsing the body.
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            Self::UnknownSession { .. } => http::StatusCode::NOT_FOUND,
            Self::MissingCredentials => http::StatusCode::UNAUTHORIZED,
            _ => http::StatusCode::OK,
        }
    }
}

/// Extract a `message` string embedded in a JSON error body.
///
/// Accepts both `{"message": "..."}` and `{"error": {"message": "..."}}`.
fn embedded_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = value
        .get("error")
        .and_then(|e| e.get("message"))
        .or_else(|| value.get("message"))?;
    message.as_str().map(str::to_owned)
}
