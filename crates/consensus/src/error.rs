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

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Mark file was not created before the subsystem started.
    #[error("mark file missing: {}", .0.display())]
    MarkFileMissing(PathBuf),

    /// Mark file could not be read or written.
    #[error("mark file serialization: {0}")]
    MarkFileSerde(#[from] serde_json::Error),
}
