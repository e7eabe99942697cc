//! Ordered launch of the node's subsystems.
//!
//! Each step blocks until its subsystem reports ready before the next one
//! runs; a failed step unwinds everything already launched, in reverse
//! order, before the error is surfaced.

mod step_01_archive;
mod step_02_consensus_module;
mod step_03_service_container;

use replog_archive::ArchiveConfig;
use replog_bootable::Bootable;
use replog_consensus::ConsensusConfig;
use replog_container::{ClusteredService, ContainerConfig};
use tracing::error;

use crate::config::ComposedConfigs;
use crate::error::Result;
use crate::node::ClusterNode;

/// Launch coordinator for the three subsystems.
pub struct Bootstrap {
    archive_config: Option<ArchiveConfig>,
    consensus_config: Option<ConsensusConfig>,
    container_config: Option<ContainerConfig>,
    service: Option<Box<dyn ClusteredService>>,

    // added during initialization, in launch order
    bootables: Vec<Box<dyn Bootable>>,
}

impl Bootstrap {
    /// Prepare a launch from composed configs and the service to host.
    #[must_use]
    pub fn new(configs: ComposedConfigs, service: Box<dyn ClusteredService>) -> Self {
        Self {
            archive_config: Some(configs.archive),
            consensus_config: Some(configs.consensus),
            container_config: Some(configs.container),
            service: Some(service),
            bootables: Vec::new(),
        }
    }

    /// Launch archive, consensus module and service container, in that
    /// order, blocking on each subsystem's readiness.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error after everything already launched
    /// has been released in reverse order.
    pub async fn initialize(mut self) -> Result<ClusterNode> {
        match self.launch().await {
            Ok(()) => Ok(ClusterNode::new(self.bootables)),
            Err(e) => {
                error!("launch failed, unwinding: {e}");
                self.unwind().await;
                Err(e)
            }
        }
    }

    async fn launch(&mut self) -> Result<()> {
        step_01_archive::execute(self).await?;
        step_02_consensus_module::execute(self).await?;
        step_03_service_container::execute(self).await?;

        Ok(())
    }

    async fn unwind(&mut self) {
        while let Some(bootable) = self.bootables.pop() {
            if let Err(e) = bootable.shutdown().await {
                error!(subsystem = bootable.name(), "failed to release during unwind: {e}");
            }
        }
    }

    fn add_bootable(&mut self, bootable: Box<dyn Bootable>) {
        self.bootables.push(bootable);
    }
}
