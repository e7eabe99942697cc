//! The running node: the launched subsystem stack and its release logic.

use replog_bootable::Bootable;
use tracing::{error, info};

use crate::error::{Error, ReleaseErrors, ReleaseFailure, Result};

/// A fully launched cluster node holding its subsystems in launch order.
pub struct ClusterNode {
    bootables: Vec<Box<dyn Bootable>>,
}

impl ClusterNode {
    /// Wrap an already launched subsystem stack, in launch order.
    #[must_use]
    pub fn new(bootables: Vec<Box<dyn Bootable>>) -> Self {
        Self { bootables }
    }

    /// Names of the held subsystems, in launch order.
    #[must_use]
    pub fn subsystem_names(&self) -> Vec<&'static str> {
        self.bootables.iter().map(|b| b.name()).collect()
    }

    /// Release every subsystem in reverse launch order.
    ///
    /// Every release is attempted even when an earlier one fails; failures
    /// are aggregated into the returned error. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Release`] carrying one entry per failed release.
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        while let Some(bootable) = self.bootables.pop() {
            let name = bootable.name();
            info!(subsystem = name, "releasing");

            if let Err(e) = bootable.shutdown().await {
                error!(subsystem = name, "release failed: {e}");
                failures.push(ReleaseFailure {
                    subsystem: name,
                    message: e.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Release(ReleaseErrors(failures)))
        }
    }
}
