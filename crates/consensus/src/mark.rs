//! Cluster mark files: on-disk identity and liveness records.
//!
//! One mark file exists per monitored component. It is created by the node
//! before the owning subsystem starts; the subsystem binds to it at startup
//! and keeps the heartbeat field fresh while it runs. External monitors read
//! the file to detect a hung or crashed component. Stale mark files are only
//! removed by the next run's cleanup, never by the run that wrote them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use replog_util::EpochClock;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Mark filename for the consensus module.
pub const MARK_FILENAME: &str = "cluster-mark.json";

/// Failure-detection window granted to a component before monitors may
/// consider it hung.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Mark filename for a container hosting the service with `service_id`.
#[must_use]
pub fn service_mark_filename(service_id: i64) -> String {
    format!("cluster-mark-service-{service_id}.json")
}

/// Kind of cluster component a mark file identifies.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ComponentType {
    /// The consensus module.
    ConsensusModule,
    /// A clustered service container.
    Container,
}

/// Contents of a mark file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LivenessRecord {
    /// Component the record identifies.
    pub component_type: ComponentType,

    /// Length of the component's error buffer, from its own config.
    pub error_buffer_length: usize,

    /// Clock reading at record creation, epoch milliseconds.
    pub start_timestamp_ms: u64,

    /// Failure-detection window in milliseconds.
    pub liveness_timeout_ms: u64,

    /// Last heartbeat written by the running component, epoch milliseconds.
    pub heartbeat_timestamp_ms: u64,
}

/// A mark file bound to its on-disk location.
pub struct MarkFile {
    path: PathBuf,
    record: LivenessRecord,
}

impl MarkFile {
    /// Create a new mark file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the target directory does not exist or is not writable.
    /// There is no recovery path; the node must not proceed to launch.
    pub fn create(
        path: &Path,
        component_type: ComponentType,
        error_buffer_length: usize,
        clock: &dyn EpochClock,
        liveness_timeout: Duration,
    ) -> Result<Self, Error> {
        let now = clock.time_millis();
        let record = LivenessRecord {
            component_type,
            error_buffer_length,
            start_timestamp_ms: now,
            liveness_timeout_ms: u64::try_from(liveness_timeout.as_millis()).unwrap_or(u64::MAX),
            heartbeat_timestamp_ms: now,
        };

        let mark = Self {
            path: path.to_path_buf(),
            record,
        };
        mark.persist()?;

        Ok(mark)
    }

    /// Bind to an existing mark file.
    ///
    /// # Errors
    ///
    /// A missing file is a fatal startup precondition failure for the owning
    /// subsystem.
    pub fn bind(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::MarkFileMissing(path.to_path_buf()));
        }

        let bytes =
            std::fs::read(path).map_err(|e| Error::Io("failed to read mark file", e))?;
        let record = serde_json::from_slice(&bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    /// Refresh the heartbeat field and rewrite the file.
    ///
    /// # Errors
    ///
    /// Fails if the file can no longer be written.
    pub fn update_heartbeat(&mut self, clock: &dyn EpochClock) -> Result<(), Error> {
        self.record.heartbeat_timestamp_ms = clock.time_millis();
        self.persist()
    }

    /// The record currently held in memory.
    #[must_use]
    pub const fn record(&self) -> &LivenessRecord {
        &self.record
    }

    /// Where this mark file lives.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(&self.record)?;
        std::fs::write(&self.path, json).map_err(|e| Error::Io("failed to write mark file", e))
    }
}
