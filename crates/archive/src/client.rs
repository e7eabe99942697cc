//! Client side of the archive's control channel.
//!
//! The consensus module records its log through a [`RecordingClient`]; the
//! service container records snapshots through another. Both are configured
//! from the byte-identical [`ArchiveClientConfig`] the composer copies out of
//! the archive's own config.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{Error, parse_channel};

/// Connection details for reaching an archive's control channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveClientConfig {
    /// Control channel string, copied verbatim from the archive config.
    pub control_channel: String,

    /// Control stream id, copied verbatim from the archive config.
    pub control_stream_id: i32,
}

/// An open recording session with the archive.
pub struct RecordingClient {
    stream: TcpStream,
    recording_id: u32,
}

impl RecordingClient {
    /// Connect a recording session for `stream_id`.
    ///
    /// # Errors
    ///
    /// Fails if the channel cannot be parsed or reached, or if the archive
    /// rejects the handshake (a control stream id divergence shows up here as
    /// a closed connection).
    pub async fn connect(config: &ArchiveClientConfig, stream_id: i32) -> Result<Self, Error> {
        let addr = parse_channel(&config.control_channel)?;
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Io("failed to connect to archive control channel", e))?;

        stream
            .write_i32(config.control_stream_id)
            .await
            .map_err(|e| Error::Io("failed to send control stream id", e))?;
        stream
            .write_i32(stream_id)
            .await
            .map_err(|e| Error::Io("failed to send recording stream id", e))?;

        let recording_id = stream.read_u32().await.map_err(|_| {
            Error::Handshake("archive closed the control session during handshake".to_string())
        })?;

        Ok(Self {
            stream,
            recording_id,
        })
    }

    /// Identifier the archive assigned to this recording session.
    #[must_use]
    pub const fn recording_id(&self) -> u32 {
        self.recording_id
    }

    /// Append one frame to the recording.
    ///
    /// # Errors
    ///
    /// Fails if the session's connection is no longer writable.
    pub async fn append(&mut self, frame: &[u8]) -> Result<(), Error> {
        let length = u32::try_from(frame.len())
            .map_err(|_| Error::Handshake("frame larger than 4GiB".to_string()))?;

        self.stream
            .write_u32(length)
            .await
            .map_err(|e| Error::Io("failed to write frame header", e))?;
        self.stream
            .write_all(frame)
            .await
            .map_err(|e| Error::Io("failed to write frame payload", e))?;

        Ok(())
    }
}
