//! Reclamation of stale on-disk cluster state from a previous run.

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};

/// Remove the cluster directory left behind by a previous run.
///
/// Runs before launch so every run starts from a clean cluster directory.
/// A missing directory is not an error.
///
/// # Errors
///
/// Fails if the directory exists but cannot be removed; the node must not
/// proceed to launch over partially reclaimed state.
pub fn reclaim_stale_state(cluster_dir: &Path) -> Result<()> {
    if cluster_dir.exists() {
        info!(path = %cluster_dir.display(), "reclaiming stale cluster directory");
        std::fs::remove_dir_all(cluster_dir)
            .map_err(|e| Error::Io("failed to reclaim stale cluster directory", e))?;
    }

    Ok(())
}
