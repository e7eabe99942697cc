use std::fmt;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// One failed release attempt during shutdown.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Name of the subsystem whose release failed.
    pub subsystem: &'static str,
    /// Rendered failure.
    pub message: String,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subsystem, self.message)
    }
}

/// Aggregate of release failures; every release is attempted regardless.
#[derive(Debug)]
pub struct ReleaseErrors(pub Vec<ReleaseFailure>);

impl fmt::Display for ReleaseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to release {} subsystem(s): ", self.0.len())?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Errors that can occur while orchestrating the node.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started
    #[error("already started")]
    AlreadyStarted,

    /// Archive error.
    #[error(transparent)]
    Archive(#[from] replog_archive::Error),

    /// Consensus module error.
    #[error(transparent)]
    Consensus(#[from] replog_consensus::Error),

    /// Service container error.
    #[error(transparent)]
    Container(#[from] replog_container::Error),

    /// IO error
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Property file error.
    #[error("properties: {0}")]
    Properties(String),

    /// Aggregated release failures surfaced after shutdown.
    #[error("{0}")]
    Release(ReleaseErrors),

    /// Could not set global default subscriber.
    #[error("could not set global default subscriber: {0}")]
    SetTracing(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
