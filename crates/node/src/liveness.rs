//! Creation of the liveness (mark) files before any subsystem launches.

use replog_consensus::{ComponentType, LIVENESS_TIMEOUT, MarkFile};
use tracing::debug;

use crate::config::{ComposedConfigs, SharedContext};
use crate::error::Result;

/// Write the consensus module's and the service container's mark files.
///
/// Both files must exist before launch; the subsystems bind to them at
/// startup and refuse to start otherwise. The records carry each component's
/// own error buffer length and the shared failure-detection window.
///
/// # Errors
///
/// Fails if either file cannot be written. The node must not proceed to
/// launch in that case.
pub fn write_liveness_records(shared: &SharedContext, configs: &ComposedConfigs) -> Result<()> {
    let consensus_mark = MarkFile::create(
        &configs.consensus.mark_file_path,
        ComponentType::ConsensusModule,
        configs.consensus.error_buffer_length,
        shared.epoch_clock.as_ref(),
        LIVENESS_TIMEOUT,
    )?;
    debug!(path = %consensus_mark.path().display(), "consensus module mark file created");

    let container_mark = MarkFile::create(
        &configs.container.mark_file_path,
        ComponentType::Container,
        configs.container.error_buffer_length,
        shared.epoch_clock.as_ref(),
        LIVENESS_TIMEOUT,
    )?;
    debug!(path = %container_mark.path().display(), "service container mark file created");

    Ok(())
}
