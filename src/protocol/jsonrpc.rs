//! JSON-RPC 2.0 types and parsing.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - Notifications are requests without `id`
//! - `id` type (string or integer) MUST be preserved in responses
//!
//! Batch arrays are rejected: the protocol revision this gateway speaks
//! delivers one request per transport exchange.
//!
//! # Security Note
//!
//! This module parses untrusted input. Size limits are enforced at the
//! HTTP layer before bodies reach the parser.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// JSON-RPC 2.0 request ID.
///
/// The spec allows string or integer IDs. The exact type is preserved so
/// responses use the same type as requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Integer ID (e.g., `"id": 1`)
    Number(i64),
    /// String ID (e.g., `"id": "abc-123"`)
    String(String),
    /// Explicit null ID (used in error responses when no ID is known)
    Null,
}

/// A parsed JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker, must be exactly "2.0"
    pub jsonrpc: String,
    /// Request ID; absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Parse a single request from a raw body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ParseError`] for malformed JSON and
    /// [`GatewayError::InvalidRequest`] for well-formed JSON that is not a
    /// valid single JSON-RPC 2.0 request (including batch arrays).
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body).map_err(|e| GatewayError::ParseError {
            details: e.to_string(),
        })?;

        if value.is_array() {
            return Err(GatewayError::InvalidRequest {
                details: "batch requests are not supported".to_string(),
            });
        }

        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|e| GatewayError::InvalidRequest {
                details: e.to_string(),
            })?;

        if request.jsonrpc != "2.0" {
            return Err(GatewayError::InvalidRequest {
                details: format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            });
        }
        if request.method.is_empty() {
            return Err(GatewayError::InvalidRequest {
                details: "method must not be empty".to_string(),
            });
        }

        Ok(request)
    }

    /// A request without an ID is a notification and produces no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 response, carrying either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version marker
    pub jsonrpc: String,
    /// ID echoed from the request (null when the request ID is unknown)
    pub id: JsonRpcId,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response echoing the request ID.
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(JsonRpcId::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response echoing the request ID when known.
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(JsonRpcId::Null),
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard or relaygate custom)
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Structured error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// Structured data attached to error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    /// Stable error type name (matches the taxonomy)
    pub error_type: String,
    /// Additional detail safe for client consumption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Seconds to wait before retrying, when the backend supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}
