//! Bootstrap step 2: consensus module.
//!
//! Launches the consensus module and blocks until its ingress and service
//! endpoints are published in the cluster directory. The archive must be
//! accepting sessions already; the module opens its log recording during
//! startup.

use replog_consensus::ConsensusModule;
use tracing::info;

use super::Bootstrap;
use crate::error::Result;

pub async fn execute(bootstrap: &mut Bootstrap) -> Result<()> {
    let config = bootstrap.consensus_config.take().unwrap_or_else(|| {
        panic!("consensus config not set before consensus module step");
    });

    let module = ConsensusModule::new(config);
    module.start().await?;

    info!("consensus module started");
    bootstrap.add_bootable(Box::new(module));

    Ok(())
}
