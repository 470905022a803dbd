//! Relaygate - session gateway and resilient dispatch layer for MCP traffic.
//!
//! This library provides the session registry, ambient auth overlay,
//! resilient backend dispatcher, and HTTP front door for the relaygate
//! sidecar.
//!
//! # Architecture
//!
//! - **Front door** ([`gateway`]): `POST /mcp` carries JSON-RPC requests,
//!   `DELETE /mcp` ends a session. Each request is resolved to its
//!   session and handled inside its auth overlay scope.
//! - **Sessions** ([`session`]): one protocol-server instance per logical
//!   client conversation, published in a shared concurrent registry only
//!   after a successful initialize.
//! - **Identity** ([`auth`]): credentials and scope extracted from
//!   request headers travel ambiently through the request's async call
//!   chain; dispatch code never threads them as parameters.
//! - **Dispatch** ([`backend`]): outbound calls with per-attempt
//!   timeouts, classified errors, and retry with backoff.

pub mod auth;
pub mod backend;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod session;
