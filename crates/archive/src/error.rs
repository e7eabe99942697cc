use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Already started.
    #[error("already started")]
    AlreadyStarted,

    /// Control channel string could not be parsed.
    #[error("invalid control channel: {0}")]
    InvalidChannel(String),

    /// Control session handshake failed.
    #[error("archive handshake failed: {0}")]
    Handshake(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}
