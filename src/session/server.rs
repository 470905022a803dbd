//! Per-session protocol server.
//!
//! Handles the JSON-RPC traffic of one session. Lifecycle methods
//! (`initialize`, `ping`) are answered locally; everything else goes to
//! the [`ToolDelegate`] seam, whose default implementation forwards the
//! call to the remote backend through the resilient dispatcher. Tool
//! semantics live entirely behind that seam.
//!
//! Requests on one session are serialized in transport-delivery order by
//! the server's own lock; requests on different sessions proceed
//! independently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::backend::client::BackendClient;
use crate::error::GatewayError;
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

/// Protocol revision advertised in initialize results.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Seam to the tool-operation catalogue (external collaborator).
#[async_trait]
pub trait ToolDelegate: Send + Sync {
    /// Execute one protocol method with its params, returning the result
    /// payload.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, GatewayError>;
}

/// Default delegate: forwards every method to the remote backend.
pub struct BackendDelegate {
    client: Arc<BackendClient>,
}

impl BackendDelegate {
    /// Wrap a shared dispatch client.
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolDelegate for BackendDelegate {
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, GatewayError> {
        let path = format!("/rpc/{method}");
        self.client.dispatch(Method::POST, &path, params, None).await
    }
}

/// The protocol server owned by one session.
pub struct SessionServer {
    delegate: Arc<dyn ToolDelegate>,
    // Serializes requests for this session in delivery order
    serial: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
}

impl SessionServer {
    /// Create a server over a tool delegate.
    pub fn new(delegate: Arc<dyn ToolDelegate>) -> Self {
        Self {
            delegate,
            serial: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether this session has completed `initialize`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Handle one request; notifications produce `None`.
    ///
    /// Must run inside the request's auth overlay scope so delegate work
    /// observes the caller's identity.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let _serial = self.serial.lock().await;

        let id = request.id.clone();
        let is_notification = request.is_notification();
        debug!(method = %request.method, is_notification, "handling session request");

        let result = match request.method.as_str() {
            "initialize" => {
                self.initialized.store(true, Ordering::SeqCst);
                Ok(initialize_result())
            }
            "ping" => Ok(json!({})),
            method => self.delegate.call(method, request.params).await,
        };

        if is_notification {
            if let Err(e) = result {
                error!(kind = e.error_type_name(), error = %e, "notification processing failed");
            }
            return None;
        }

        Some(match result {
            Ok(payload) => JsonRpcResponse::success(id, payload),
            Err(e) => JsonRpcResponse::error(id, e.to_jsonrpc_error()),
        })
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": "relaygate",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": {}
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::jsonrpc::JsonRpcId;

    struct NoopDelegate;

    #[async_trait]
    impl ToolDelegate for NoopDelegate {
        async fn call(&self, _method: &str, _params: Option<Value>) -> Result<Value, GatewayError> {
            Ok(Value::Null)
        }
    }

    /// Delegate that answers nothing; shared by session and registry tests.
    pub(crate) fn noop_delegate() -> Arc<dyn ToolDelegate> {
        Arc::new(NoopDelegate)
    }

    struct EchoDelegate;

    #[async_trait]
    impl ToolDelegate for EchoDelegate {
        async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, GatewayError> {
            Ok(json!({ "method": method, "params": params }))
        }
    }

    struct FailingDelegate;

    #[async_trait]
    impl ToolDelegate for FailingDelegate {
        async fn call(&self, _method: &str, _params: Option<Value>) -> Result<Value, GatewayError> {
            Err(GatewayError::Backend {
                kind: ErrorKind::Unavailable,
                status: Some(503),
                message: "backend draining".into(),
                body: None,
                retry_after: None,
            })
        }
    }

    fn request(method: &str, id: Option<i64>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: id.map(JsonRpcId::Number),
            method: method.into(),
            params: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_answered_locally() {
        let server = SessionServer::new(noop_delegate());
        assert!(!server.is_initialized());

        let response = server
            .handle(request("initialize", Some(1)))
            .await
            .expect("initialize is not a notification");
        assert!(server.is_initialized());
        let result = response.result.expect("should succeed");
        assert_eq!(result["serverInfo"]["name"], "relaygate");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_unknown_methods_reach_delegate() {
        let server = SessionServer::new(Arc::new(EchoDelegate));
        let mut req = request("tools/call", Some(2));
        req.params = Some(json!({"name": "search"}));

        let response = server.handle(req).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["method"], "tools/call");
        assert_eq!(result["params"]["name"], "search");
    }

    #[tokio::test]
    async fn test_delegate_failure_becomes_error_response() {
        let server = SessionServer::new(Arc::new(FailingDelegate));
        let response = server.handle(request("tools/call", Some(3))).await.unwrap();
        let error = response.error.expect("should carry error");
        assert_eq!(error.code, -32013);
        assert_eq!(response.id, JsonRpcId::Number(3));
    }

    #[tokio::test]
    async fn test_notification_produces_no_response() {
        let server = SessionServer::new(Arc::new(FailingDelegate));
        let response = server.handle(request("notifications/progress", None)).await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_ping_answered_locally() {
        let server = SessionServer::new(Arc::new(FailingDelegate));
        let response = server.handle(request("ping", Some(4))).await.unwrap();
        assert_eq!(response.result, Some(json!({})));
    }
}
