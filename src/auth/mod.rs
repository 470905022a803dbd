//! Request identity handling.
//!
//! [`overlay`] resolves the effective credential/scope identity for one
//! inbound request from its headers; [`context`] makes that identity
//! ambiently readable by any code awaited within the request's scope.

pub mod context;
pub mod overlay;

pub use context::{current_overlay, with_overlay};
pub use overlay::AuthOverlay;
