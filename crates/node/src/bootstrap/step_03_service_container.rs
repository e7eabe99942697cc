//! Bootstrap step 3: clustered service container.
//!
//! Launches the container hosting the configured service and blocks until it
//! has attached to the consensus module and opened its snapshot recording.

use replog_container::ServiceContainer;
use tracing::info;

use super::Bootstrap;
use crate::error::Result;

pub async fn execute(bootstrap: &mut Bootstrap) -> Result<()> {
    let config = bootstrap.container_config.take().unwrap_or_else(|| {
        panic!("container config not set before service container step");
    });
    let service = bootstrap.service.take().unwrap_or_else(|| {
        panic!("service not set before service container step");
    });

    let container = ServiceContainer::new(config, service);
    container.start().await?;

    info!("service container started");
    bootstrap.add_bootable(Box::new(container));

    Ok(())
}
