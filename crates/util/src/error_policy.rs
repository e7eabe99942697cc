//! Error policy injected into each subsystem's configuration.
//!
//! Subsystems surface runtime errors through the handler installed in their
//! config. The node installs a fatal policy: every reported error is tagged
//! with the subsystem's name, logged and escalates to process abort. Nothing
//! is retried or suppressed at this level.

use std::sync::Arc;

use tracing::error;

/// Sink for unhandled errors reported by a running subsystem.
pub type ErrorHandler = Arc<dyn Fn(Box<dyn std::error::Error + Send + Sync>) + Send + Sync>;

/// Policy producing a per-subsystem [`ErrorHandler`] tagged with that
/// subsystem's human-readable name.
pub type ErrorPolicy = Arc<dyn Fn(&'static str) -> ErrorHandler + Send + Sync>;

/// Policy that treats any subsystem runtime error as fatal to the node.
#[must_use]
pub fn fatal_error_policy() -> ErrorPolicy {
    Arc::new(|subsystem: &'static str| {
        Arc::new(move |err| {
            error!(%subsystem, "fatal subsystem error: {err}");
            std::process::abort();
        })
    })
}
