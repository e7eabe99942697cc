//! Abstract lifecycle interface for the node's subsystems.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use async_trait::async_trait;

/// Boxed error type surfaced at the lifecycle seam.
pub type BootableError = Box<dyn std::error::Error + Send + Sync>;

/// Trait implemented by every subsystem the node launches.
///
/// `start` is synchronous from the orchestrator's point of view: it returns
/// only once the subsystem is ready to accept traffic, or with the failure
/// that prevented it. `shutdown` releases the subsystem and must be safe to
/// call again after a failed or completed shutdown.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// Human-readable name of the subsystem, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Start the subsystem and block until it is ready.
    async fn start(&self) -> Result<(), BootableError>;

    /// Release the subsystem.
    async fn shutdown(&self) -> Result<(), BootableError>;

    /// Wait for the subsystem's internal tasks to exit.
    async fn wait(&self);
}
