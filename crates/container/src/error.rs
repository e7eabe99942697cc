use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// Archive client error.
    #[error(transparent)]
    Archive(#[from] replog_archive::Error),

    /// Consensus-owned state (mark file) error.
    #[error(transparent)]
    Consensus(#[from] replog_consensus::Error),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// The consensus module never published its service endpoint.
    #[error("service endpoint not published: {}", .0.display())]
    ServiceEndpoint(PathBuf),
}
