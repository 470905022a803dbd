//! Protocol-level types shared by the gateway and the session servers.

pub mod jsonrpc;

pub use jsonrpc::{ErrorData, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
