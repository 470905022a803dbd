//! HTTP front door for the gateway.
//!
//! Exposes the streamable-HTTP endpoint pair: `POST /mcp` carries JSON-RPC
//! traffic, `DELETE /mcp` ends a session. Each request is resolved to its
//! session (or stages a fresh one), has its auth overlay extracted and
//! merged, and is then handled inside that overlay's ambient scope so all
//! downstream dispatch observes the caller's identity.
//!
//! # Request handling order
//!
//! Session resolution happens first: a request naming an unknown session
//! is rejected before its body is even parsed. The credential gate (when
//! enabled) also runs pre-parse, so unauthenticated callers learn nothing
//! about body validation.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, info};

use crate::auth::context::with_overlay;
use crate::auth::overlay::AuthOverlay;
use crate::backend::client::BackendClient;
use crate::error::GatewayError;
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::session::server::{BackendDelegate, SessionServer, ToolDelegate};
use crate::session::{Session, SessionRegistry};

/// Transport header carrying the session identifier.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Front-door configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address, e.g. "127.0.0.1:8080"
    pub listen: String,
    /// Reject requests that carry no credential and have none recorded
    pub require_auth: bool,
    /// Largest request body accepted, in bytes
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            require_auth: false,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELAYGATE_LISTEN` (default: 127.0.0.1:8080): Listen address
    /// - `RELAYGATE_REQUIRE_AUTH` (default: false): Credential gate
    /// - `RELAYGATE_MAX_REQUEST_BODY_BYTES` (default: 2 MiB): Body limit
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen: std::env::var("RELAYGATE_LISTEN").unwrap_or(defaults.listen),
            require_auth: std::env::var("RELAYGATE_REQUIRE_AUTH")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.require_auth),
            max_body_bytes: std::env::var("RELAYGATE_MAX_REQUEST_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
        }
    }
}

struct GatewayState {
    registry: SessionRegistry,
    delegate: Arc<dyn ToolDelegate>,
    require_auth: bool,
}

/// The assembled front door: session registry plus routing.
pub struct Gateway {
    state: Arc<GatewayState>,
    max_body_bytes: usize,
}

impl Gateway {
    /// Build a gateway that forwards tool methods through `client`.
    pub fn new(config: GatewayConfig, client: Arc<BackendClient>) -> Self {
        Self::with_delegate(config, Arc::new(BackendDelegate::new(client)))
    }

    /// Build a gateway over an arbitrary delegate (used by tests).
    pub fn with_delegate(config: GatewayConfig, delegate: Arc<dyn ToolDelegate>) -> Self {
        Self {
            state: Arc::new(GatewayState {
                registry: SessionRegistry::new(),
                delegate,
                require_auth: config.require_auth,
            }),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// The shared session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    /// Build the axum router for this gateway.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/mcp", post(handle_post).delete(handle_delete))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(self.state.clone())
    }
}

async fn handle_post(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = match session_id(&headers) {
        Some(id) => match state.registry.resolve(&id) {
            Some(session) => Some(session),
            None => {
                return reject(GatewayError::UnknownSession { session_id: id });
            }
        },
        None => None,
    };

    let incoming = AuthOverlay::from_headers(&headers);

    // Credential gate runs before body parsing. A previously recorded
    // session credential satisfies it, so scope-only follow-ups pass.
    if state.require_auth && !incoming.has_credential() {
        let recorded = session
            .as_ref()
            .and_then(|s| s.recorded_overlay())
            .is_some_and(|o| o.has_credential());
        if !recorded {
            return reject(GatewayError::MissingCredentials);
        }
    }

    let request = match JsonRpcRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => return reject(e),
    };

    match session {
        Some(session) => {
            let effective = session.apply_overlay(&incoming);
            session.mark_active();
            let response = with_overlay(effective, session.server().handle(request)).await;
            respond(response, None)
        }
        None => {
            // No session header: stage a fresh session. It only becomes
            // resolvable if this request is a successful initialize.
            let wants_session = request.method == "initialize";
            let staged = Arc::new(Session::new(SessionServer::new(state.delegate.clone())));
            let effective = staged.apply_overlay(&incoming);
            let response = with_overlay(effective, staged.server().handle(request)).await;

            let issued = match &response {
                Some(r) if wants_session && r.error.is_none() => {
                    Some(state.registry.register(staged))
                }
                _ => None,
            };
            if let Some(id) = &issued {
                info!(session_id = %id, "initialize completed, session issued");
            }
            respond(response, issued)
        }
    }
}

async fn handle_delete(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    match session_id(&headers) {
        None => (
            StatusCode::BAD_REQUEST,
            format!("missing {SESSION_ID_HEADER} header"),
        )
            .into_response(),
        Some(id) => {
            // Idempotent: deleting an already-gone session is still a 204
            state.registry.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn reject(error: GatewayError) -> Response {
    debug!(kind = error.error_type_name(), error = %error, "rejecting request");
    let status = error.http_status();
    let body = JsonRpcResponse::error(None, error.to_jsonrpc_error());
    (status, Json(body)).into_response()
}

fn respond(response: Option<JsonRpcResponse>, issued_session: Option<String>) -> Response {
    let mut http_response = match response {
        // Notifications produce no JSON-RPC response
        None => StatusCode::NO_CONTENT.into_response(),
        Some(body) => (StatusCode::OK, Json(body)).into_response(),
    };
    if let Some(id) = issued_session {
        if let Ok(value) = HeaderValue::from_str(&id) {
            http_response
                .headers_mut()
                .insert(SESSION_ID_HEADER, value);
        }
    }
    http_response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::auth::context::current_overlay;

    /// Delegate that reports the method and the ambient overlay it ran
    /// under, proving identity flows to dispatch without threading.
    struct ObservingDelegate;

    #[async_trait]
    impl ToolDelegate for ObservingDelegate {
        async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, GatewayError> {
            let overlay = current_overlay().unwrap_or_default();
            Ok(json!({
                "method": method,
                "params": params,
                "api_key": overlay.api_key,
                "id_token": overlay.id_token,
                "workspace": overlay.workspace,
            }))
        }
    }

    fn gateway(require_auth: bool) -> Gateway {
        Gateway::with_delegate(
            GatewayConfig {
                require_auth,
                ..Default::default()
            },
            Arc::new(ObservingDelegate),
        )
    }

    fn rpc_request(body: &str, extra_headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn initialize(gateway: &Gateway, extra_headers: &[(&str, &str)]) -> String {
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
                extra_headers,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(SESSION_ID_HEADER)
            .expect("initialize should issue a session id")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_initialize_issues_session() {
        let gateway = gateway(false);
        let id = initialize(&gateway, &[]).await;
        assert!(!id.is_empty());
        assert_eq!(gateway.registry().len(), 1);
        assert!(gateway.registry().resolve(&id).is_some());
    }

    #[tokio::test]
    async fn test_follow_up_request_uses_session() {
        let gateway = gateway(false);
        let id = initialize(&gateway, &[]).await;

        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
                &[(SESSION_ID_HEADER, id.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["result"]["method"], "tools/list");
    }

    #[tokio::test]
    async fn test_unknown_session_rejected_before_parse() {
        let gateway = gateway(false);
        let response = gateway
            .router()
            .oneshot(rpc_request(
                "this is not even json",
                &[(SESSION_ID_HEADER, "never-issued")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32004);
        assert_eq!(
            body["error"]["data"]["details"]["session_id"],
            "never-issued"
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_rpc_error() {
        let gateway = gateway(false);
        let response = gateway
            .router()
            .oneshot(rpc_request(r#"{"jsonrpc":"#, &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32700);
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_batch_rejected() {
        let gateway = gateway(false);
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"[{"jsonrpc":"2.0","id":1,"method":"a"}]"#,
                &[],
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_require_auth_rejects_unauthenticated() {
        let gateway = gateway(true);
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], -32005);
    }

    #[tokio::test]
    async fn test_recorded_credential_satisfies_auth_gate() {
        let gateway = gateway(true);
        let id = initialize(&gateway, &[("x-api-key", "sk-123")]).await;

        // Scope-only follow-up: no credential header, only workspace
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#,
                &[
                    (SESSION_ID_HEADER, id.as_str()),
                    ("x-workspace-id", "ws-1"),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        // Delegate observed the inherited credential plus the new scope
        assert_eq!(body["result"]["api_key"], "sk-123");
        assert_eq!(body["result"]["workspace"], "ws-1");
    }

    #[tokio::test]
    async fn test_credential_replacement_on_follow_up() {
        let gateway = gateway(false);
        let id = initialize(&gateway, &[("x-api-key", "sk-old")]).await;

        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#,
                &[
                    (SESSION_ID_HEADER, id.as_str()),
                    ("x-identity-token", "a.b.c"),
                ],
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["result"]["id_token"], "a.b.c");
        assert_eq!(body["result"]["api_key"], Value::Null);
    }

    #[tokio::test]
    async fn test_notification_returns_no_content() {
        let gateway = gateway(false);
        let id = initialize(&gateway, &[]).await;

        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                &[(SESSION_ID_HEADER, id.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_non_initialize_without_session_issues_none() {
        let gateway = gateway(false);
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SESSION_ID_HEADER).is_none());
        assert!(gateway.registry().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_session() {
        let gateway = gateway(false);
        let id = initialize(&gateway, &[]).await;

        let delete = Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_ID_HEADER, id.as_str())
            .body(Body::empty())
            .unwrap();
        let response = gateway.router().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(gateway.registry().is_empty());

        // Follow-up on the removed session is an unknown-session rejection
        let response = gateway
            .router()
            .oneshot(rpc_request(
                r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
                &[(SESSION_ID_HEADER, id.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_without_header_is_bad_request() {
        let gateway = gateway(false);
        let delete = Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .body(Body::empty())
            .unwrap();
        let response = gateway.router().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let gateway = gateway(false);
        let delete = Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_ID_HEADER, "already-gone")
            .body(Body::empty())
            .unwrap();
        let response = gateway.router().oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
