//! Resilient backend client.
//!
//! Issues one logical outbound call per [`BackendClient::dispatch`]
//! invocation: each attempt is bounded by its own timeout, transient
//! failures are retried with backoff (honoring a server retry-after
//! directive), and a caller-supplied cancellation token aborts the
//! in-flight attempt immediately. The caller never sees individual failed
//! attempts, only the final outcome.
//!
//! # Identity
//!
//! Every attempt advertises the ambient [`AuthOverlay`] for the current
//! request scope (see [`crate::auth::context`]); with no credential in
//! scope the request goes out unauthenticated.
//!
//! # Thread Safety
//!
//! The client holds no per-session state and is safe to share across all
//! sessions concurrently.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::RETRY_AFTER;
use http::{HeaderMap, Method};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::context::current_overlay;
use crate::backend::retry::RetryPolicy;
use crate::error::{ErrorKind, GatewayError};

/// Configuration for the backend dispatch client.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base URL of the remote backend (e.g., "https://api.example.com")
    pub base_url: String,
    /// Wall-clock budget per attempt, independent of retry count
    pub attempt_timeout: Duration,
    /// Connection timeout (TCP + TLS handshake)
    pub connect_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Retry policy applied across attempts
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            attempt_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_max_idle_per_host: 32,
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELAYGATE_BACKEND` (required): Base URL of the remote backend
    /// - `RELAYGATE_ATTEMPT_TIMEOUT_SECS` (default: 30): Per-attempt timeout
    /// - `RELAYGATE_CONNECT_TIMEOUT_SECS` (default: 5): Connection timeout
    /// - `RELAYGATE_MAX_RETRIES` (default: 3): Retries beyond the first attempt
    /// - `RELAYGATE_RETRY_BASE_MS` (default: 500): Base backoff delay
    ///
    /// # Errors
    ///
    /// Returns an error if `RELAYGATE_BACKEND` is not set.
    pub fn from_env() -> Result<Self, GatewayError> {
        let base_url =
            std::env::var("RELAYGATE_BACKEND").map_err(|_| GatewayError::InternalError {
                details: "RELAYGATE_BACKEND environment variable is required".to_string(),
            })?;

        let attempt_timeout_secs: u64 = std::env::var("RELAYGATE_ATTEMPT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let connect_timeout_secs: u64 = std::env::var("RELAYGATE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let max_retries: u32 = std::env::var("RELAYGATE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let retry_base_ms: u64 = std::env::var("RELAYGATE_RETRY_BASE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Ok(Self {
            base_url,
            attempt_timeout: Duration::from_secs(attempt_timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(retry_base_ms),
                ..RetryPolicy::default()
            },
            ..Default::default()
        })
    }

    /// Create a new config with the specified base URL and defaults elsewhere.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Raw outcome of one attempt that produced a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed `Retry-After` delta-seconds directive, when present
    pub retry_after: Option<u64>,
    /// Response body
    pub body: Bytes,
}

/// Network-level failure: no response was received.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct TransportError {
    /// What went wrong at the connection level
    pub reason: String,
}

/// Wire seam for the dispatcher (enables mocking in tests).
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Perform one HTTP exchange; a returned response (any status) is Ok.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        identity: HeaderMap,
    ) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport with connection pooling.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a pooled HTTP transport from config.
    pub fn new(config: &DispatchConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GatewayError::InternalError {
                details: format!("failed to build backend HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BackendTransport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        identity: HeaderMap,
    ) -> Result<RawResponse, TransportError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.request(method, &url).headers(identity);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| TransportError {
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        // Only the delta-seconds form of Retry-After is honored; an
        // HTTP-date value falls back to the exponential schedule.
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.bytes().await.map_err(|e| TransportError {
            reason: format!("failed to read response body: {e}"),
        })?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Resilient dispatcher toward the remote backend.
pub struct BackendClient {
    transport: Arc<dyn BackendTransport>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl BackendClient {
    /// Create a client with the real HTTP transport.
    pub fn new(config: DispatchConfig) -> Result<Self, GatewayError> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self {
            transport,
            retry: config.retry,
            attempt_timeout: config.attempt_timeout,
        })
    }

    /// Create a client over a custom transport (used by tests).
    pub fn with_transport(transport: Arc<dyn BackendTransport>, config: DispatchConfig) -> Self {
        Self {
            transport,
            retry: config.retry,
            attempt_timeout: config.attempt_timeout,
        }
    }

    /// Issue one logical call and return the decoded success payload or
    /// the final classified error, retry policy already applied.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Cancelled`] when `cancel` fires; no further
    ///   attempts are made.
    /// - [`GatewayError::Backend`] with the classification of the last
    ///   attempt once the failure is terminal or the retry budget is spent.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, GatewayError> {
        let identity = current_overlay().unwrap_or_default().identity_headers();
        let mut attempt: u32 = 0;

        loop {
            debug!(%method, path, attempt, "dispatching backend attempt");

            let error = match self
                .one_attempt(&method, path, body.as_ref(), identity.clone(), cancel)
                .await
            {
                Ok(raw) if (200..300).contains(&raw.status) => return decode_payload(raw),
                Ok(raw) => GatewayError::from_response(raw.status, &raw.body, raw.retry_after),
                Err(err @ GatewayError::Cancelled) => return Err(err),
                Err(err) => err,
            };

            if !error.is_retryable() || attempt >= self.retry.max_retries {
                return Err(error);
            }

            let delay = self.retry.delay_for(attempt, error.retry_after());
            warn!(
                path,
                attempt,
                max_retries = self.retry.max_retries,
                kind = error.error_type_name(),
                delay_ms = delay.as_millis() as u64,
                "retrying backend attempt"
            );

            match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(GatewayError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// Run one attempt under its own timeout, abortable by `cancel`.
    async fn one_attempt(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        identity: HeaderMap,
        cancel: Option<&CancellationToken>,
    ) -> Result<RawResponse, GatewayError> {
        let send = self.transport.send(method.clone(), path, body, identity);
        let bounded = tokio::time::timeout(self.attempt_timeout, send);

        let outcome = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(GatewayError::Cancelled),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };

        match outcome {
            Err(_) => Err(GatewayError::network(format!(
                "attempt timed out after {:?}",
                self.attempt_timeout
            ))),
            Ok(Err(transport)) => Err(GatewayError::network(transport.to_string())),
            Ok(Ok(raw)) => Ok(raw),
        }
    }
}

/// Decode a 2xx response body, treating an empty body as null.
fn decode_payload(raw: RawResponse) -> Result<Value, GatewayError> {
    if raw.body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&raw.body).map_err(|e| GatewayError::Backend {
        kind: ErrorKind::Unknown,
        status: Some(raw.status),
        message: format!("failed to decode backend response: {e}"),
        body: Some(String::from_utf8_lossy(&raw.body).into_owned()),
        retry_after: None,
    })
}
