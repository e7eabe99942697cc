//! Bootstrap step 1: recording archive.
//!
//! Launches the archive and blocks until its control channel is bound and
//! accepting recording sessions.

use replog_archive::Archive;
use tracing::info;

use super::Bootstrap;
use crate::error::Result;

pub async fn execute(bootstrap: &mut Bootstrap) -> Result<()> {
    let config = bootstrap.archive_config.take().unwrap_or_else(|| {
        panic!("archive config not set before archive step");
    });

    let archive = Archive::new(config);
    archive.start().await?;

    info!("archive started");
    bootstrap.add_bootable(Box::new(archive));

    Ok(())
}
