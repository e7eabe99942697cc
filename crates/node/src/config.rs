//! Configuration composition for the three subsystems.
//!
//! All shared fields are derived from one [`SharedContext`] so the archive,
//! the consensus module and the service container can never disagree on the
//! archive control channel, the stream ids or the cluster directory. The
//! composer is a pure function over value objects; it performs no I/O.

use std::path::PathBuf;
use std::sync::Arc;

use replog_archive::ArchiveConfig;
use replog_consensus::{ConsensusConfig, service_mark_filename};
use replog_container::ContainerConfig;
use replog_util::{ErrorPolicy, SharedEpochClock, SystemEpochClock, fatal_error_policy};

use crate::properties::Properties;
use crate::properties::{
    CONTROL_CHANNEL_PROP_NAME, CONTROL_STREAM_ID_PROP_NAME, DEFAULT_SNAPSHOT_SIZE,
    SERVICE_ID_PROP_NAME, SNAPSHOT_SIZE_PROP_NAME,
};

/// Immutable context shared by every subsystem configuration.
#[derive(Clone)]
pub struct SharedContext {
    /// Root directory of the node's on-disk state.
    pub base_dir: PathBuf,

    /// Clock shared across subsystems for consistent timestamping.
    pub epoch_clock: SharedEpochClock,

    /// Policy producing the per-subsystem error handler.
    pub error_policy: ErrorPolicy,
}

impl SharedContext {
    /// Create a context rooted at `base_dir` with the system clock and the
    /// fatal error policy.
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            epoch_clock: Arc::new(SystemEpochClock),
            error_policy: fatal_error_policy(),
        }
    }
}

/// Node-level options sourced from the merged property set.
#[derive(Clone, Debug)]
pub struct NodeOptions {
    /// Archive control channel override.
    pub control_channel: String,

    /// Archive control stream id override.
    pub control_stream_id: i32,

    /// Service id of the hosted container instance.
    pub service_id: i64,

    /// Snapshot size threshold forwarded opaquely to the hosted service.
    pub snapshot_size: u64,
}

impl NodeOptions {
    /// Read options from `properties`, falling back to the documented
    /// defaults.
    #[must_use]
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            control_channel: properties.string_or(
                CONTROL_CHANNEL_PROP_NAME,
                replog_archive::DEFAULT_CONTROL_CHANNEL,
            ),
            control_stream_id: properties.i32_or(
                CONTROL_STREAM_ID_PROP_NAME,
                replog_archive::DEFAULT_CONTROL_STREAM_ID,
            ),
            service_id: properties.i64_or(SERVICE_ID_PROP_NAME, 0),
            snapshot_size: properties.size_or(SNAPSHOT_SIZE_PROP_NAME, DEFAULT_SNAPSHOT_SIZE),
        }
    }
}

/// The three subsystem configurations produced by the composer.
pub struct ComposedConfigs {
    /// Recording archive configuration.
    pub archive: ArchiveConfig,

    /// Consensus module configuration.
    pub consensus: ConsensusConfig,

    /// Service container configuration.
    pub container: ContainerConfig,
}

/// Build the three subsystem configurations from one shared context.
///
/// The archive's control channel and stream id are copied verbatim into the
/// consensus module's and the container's archive-client configs, and the
/// container reuses the cluster directory the consensus module resolved
/// rather than recomputing one. The archive is set up for a benchmark run:
/// it deletes its previous recordings on start and does not publish
/// recording-event notifications.
#[must_use]
pub fn compose_configs(shared: &SharedContext, options: &NodeOptions) -> ComposedConfigs {
    let mut archive = ArchiveConfig::new(
        &shared.base_dir,
        shared.epoch_clock.clone(),
        (shared.error_policy)("archive"),
    );
    archive.control_channel = options.control_channel.clone();
    archive.control_stream_id = options.control_stream_id;
    archive.delete_archive_on_start = true;
    archive.recording_events_enabled = false;

    let consensus = ConsensusConfig::new(
        &shared.base_dir,
        archive.client_config(),
        shared.epoch_clock.clone(),
        (shared.error_policy)("consensus-module"),
    );

    let mut container = ContainerConfig::new(
        &shared.base_dir,
        consensus.cluster_dir.clone(),
        archive.client_config(),
        shared.epoch_clock.clone(),
        (shared.error_policy)("service-container"),
    );
    container.service_id = options.service_id;
    container.mark_file_path = shared
        .base_dir
        .join(service_mark_filename(options.service_id));

    ComposedConfigs {
        archive,
        consensus,
        container,
    }
}
