//! Ambient, request-scoped auth overlay.
//!
//! [`with_overlay`] installs an overlay for the duration of one future;
//! any code transitively awaited inside it — however many call layers
//! deep, including code resumed after a suspension point — reads the same
//! overlay via [`current_overlay`]. Isolation between concurrent request
//! chains comes from `tokio::task_local!`: each scope carries its own
//! value, so interleaved chains can never observe each other's identity.
//! This is deliberately not a global: a shared mutable slot would leak
//! credentials between concurrently in-flight requests.

use std::future::Future;

use crate::auth::overlay::AuthOverlay;

tokio::task_local! {
    static ACTIVE_OVERLAY: AuthOverlay;
}

/// Run `fut` with `overlay` installed as the ambient identity.
///
/// Nested scopes shadow outer ones for their duration.
pub async fn with_overlay<F>(overlay: AuthOverlay, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE_OVERLAY.scope(overlay, fut).await
}

/// The innermost active overlay, or `None` outside any scope.
///
/// The value does not cross `tokio::spawn` boundaries; dispatch work for a
/// request must be awaited within the request's own chain.
pub fn current_overlay() -> Option<AuthOverlay> {
    ACTIVE_OVERLAY.try_with(Clone::clone).ok()
}
