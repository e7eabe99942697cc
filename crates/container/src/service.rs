//! Capability interface the container invokes on its hosted service.

use bytes::Bytes;

/// The application service hosted by a [`crate::ServiceContainer`].
///
/// The container delivers every replicated client message to
/// `on_session_message` and sends the returned payload back to the
/// originating session. After each message it asks the service whether its
/// accumulated state warrants a snapshot, and records the snapshot through
/// the archive when it does.
pub trait ClusteredService: Send + 'static {
    /// Handle one replicated client message, returning the response payload.
    fn on_session_message(&mut self, payload: &[u8]) -> Bytes;

    /// Whether accumulated state has grown past the service's threshold.
    fn should_snapshot(&self) -> bool;

    /// Serialize accumulated state, resetting the service's accounting.
    fn take_snapshot(&mut self) -> Bytes;
}
