//! Outbound dispatch toward the remote backend.
//!
//! [`client`] issues one logical call with per-attempt timeouts,
//! cancellation, and ambient identity headers; [`retry`] is the policy
//! table the client consults after the error taxonomy has classified a
//! failed attempt.

pub mod client;
pub mod retry;

pub use client::{BackendClient, BackendTransport, DispatchConfig, RawResponse, TransportError};
pub use retry::RetryPolicy;
