//! Epoch clock shared across subsystems for consistent timestamping.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time as milliseconds since the Unix epoch.
pub trait EpochClock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn time_millis(&self) -> u64;
}

/// Shared handle to an epoch clock.
pub type SharedEpochClock = Arc<dyn EpochClock>;

/// Epoch clock backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn time_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
