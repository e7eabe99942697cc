//! Durable recording archive for the cluster's replicated log and snapshots.
//!
//! The archive owns a directory under the node's base directory and a local
//! TCP control channel. Recording sessions connect to the control channel,
//! handshake with the control stream id and a recording stream id, and then
//! append length-prefixed frames which the archive persists to a per-stream
//! recording file.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

pub mod client;
mod error;

pub use client::{ArchiveClientConfig, RecordingClient};
pub use error::Error;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use replog_bootable::{Bootable, BootableError};
use replog_util::{ErrorHandler, SharedEpochClock};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Default local control channel for the archive.
pub const DEFAULT_CONTROL_CHANNEL: &str = "tcp://127.0.0.1:28010";

/// Default control stream id expected on every control session.
pub const DEFAULT_CONTROL_STREAM_ID: i32 = 10;

/// Name of the subdirectory the archive owns under the node base directory.
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Notification published when recording-event notifications are enabled.
#[derive(Clone, Debug)]
pub enum RecordingEvent {
    /// A recording session started.
    Started {
        /// Identifier assigned to the session.
        recording_id: u32,
        /// Stream the session records.
        stream_id: i32,
    },
    /// A recording session ended.
    Stopped {
        /// Identifier of the ended session.
        recording_id: u32,
    },
}

/// Configuration for the [`Archive`].
#[derive(Clone)]
pub struct ArchiveConfig {
    /// Directory the archive persists recordings into.
    pub archive_dir: PathBuf,

    /// Local control channel sessions connect to, e.g. `tcp://127.0.0.1:28010`.
    pub control_channel: String,

    /// Stream id every control session must present.
    pub control_stream_id: i32,

    /// Whether to wipe the archive directory on start.
    pub delete_archive_on_start: bool,

    /// Whether to publish [`RecordingEvent`] notifications.
    pub recording_events_enabled: bool,

    /// Clock used for consistent timestamping.
    pub epoch_clock: SharedEpochClock,

    /// Sink for unhandled runtime errors.
    pub error_handler: ErrorHandler,
}

impl ArchiveConfig {
    /// Create a config with default channel settings under `base_dir`.
    #[must_use]
    pub fn new(base_dir: &Path, epoch_clock: SharedEpochClock, error_handler: ErrorHandler) -> Self {
        Self {
            archive_dir: base_dir.join(ARCHIVE_DIR_NAME),
            control_channel: DEFAULT_CONTROL_CHANNEL.to_string(),
            control_stream_id: DEFAULT_CONTROL_STREAM_ID,
            delete_archive_on_start: false,
            recording_events_enabled: true,
            epoch_clock,
            error_handler,
        }
    }

    /// Client-side view of this archive's control channel.
    ///
    /// The returned config carries the channel string and stream id verbatim;
    /// every subsystem connecting to this archive must use it unchanged.
    #[must_use]
    pub fn client_config(&self) -> ArchiveClientConfig {
        ArchiveClientConfig {
            control_channel: self.control_channel.clone(),
            control_stream_id: self.control_stream_id,
        }
    }
}

/// Parse a `tcp://host:port` channel string into a socket address.
pub(crate) fn parse_channel(channel: &str) -> Result<SocketAddr, Error> {
    channel
        .strip_prefix("tcp://")
        .and_then(|rest| rest.parse().ok())
        .ok_or_else(|| Error::InvalidChannel(channel.to_string()))
}

struct ArchiveRuntime {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// Recording archive subsystem.
pub struct Archive {
    config: ArchiveConfig,
    events_tx: broadcast::Sender<RecordingEvent>,
    runtime: Arc<Mutex<Option<ArchiveRuntime>>>,
}

impl Archive {
    /// Create a new archive from `config`. Nothing happens until `start`.
    #[must_use]
    pub fn new(config: ArchiveConfig) -> Self {
        let (events_tx, _) = broadcast::channel(128);

        Self {
            config,
            events_tx,
            runtime: Arc::new(Mutex::new(None)),
        }
    }

    /// The directory this archive records into.
    #[must_use]
    pub fn archive_dir(&self) -> &Path {
        &self.config.archive_dir
    }

    /// Subscribe to recording events, if enabled in the config.
    #[must_use]
    pub fn recording_events(&self) -> Option<broadcast::Receiver<RecordingEvent>> {
        self.config
            .recording_events_enabled
            .then(|| self.events_tx.subscribe())
    }

    /// Start the archive: prepare the directory and bind the control channel.
    ///
    /// Returns once the control listener is bound and accepting sessions.
    ///
    /// # Errors
    ///
    /// Fails if already started, if the directory cannot be prepared or if
    /// the control channel cannot be bound.
    pub async fn start(&self) -> Result<(), Error> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(Error::AlreadyStarted);
        }

        if self.config.delete_archive_on_start && self.config.archive_dir.exists() {
            std::fs::remove_dir_all(&self.config.archive_dir)
                .map_err(|e| Error::Io("failed to delete stale archive directory", e))?;
        }

        std::fs::create_dir_all(&self.config.archive_dir)
            .map_err(|e| Error::Io("failed to create archive directory", e))?;

        let addr = parse_channel(&self.config.control_channel)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Io("failed to bind archive control channel", e))?;

        info!(channel = %self.config.control_channel, "archive control channel bound");

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let accept_token = token.clone();
        let accept_tracker = tracker.clone();
        let config = self.config.clone();
        let events_tx = self.events_tx.clone();
        let next_recording_id = Arc::new(AtomicU32::new(0));

        tracker.spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                debug!(%peer, "archive control session accepted");
                                let session_token = accept_token.clone();
                                let session_config = config.clone();
                                let session_events = events_tx.clone();
                                let recording_id =
                                    next_recording_id.fetch_add(1, Ordering::Relaxed);
                                accept_tracker.spawn(async move {
                                    if let Err(e) = record_session(
                                        stream,
                                        recording_id,
                                        &session_config,
                                        &session_events,
                                        session_token,
                                    )
                                    .await
                                    {
                                        warn!(recording_id, "recording session ended: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                (config.error_handler)(Box::new(e));
                                break;
                            }
                        }
                    }
                    () = accept_token.cancelled() => break,
                }
            }
        });

        tracker.close();
        runtime.replace(ArchiveRuntime { token, tracker });

        Ok(())
    }

    /// Stop the archive and wait for in-flight sessions to drain.
    ///
    /// # Errors
    ///
    /// Currently infallible; calling it when not running is a no-op.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let taken = self.runtime.lock().await.take();
        if let Some(runtime) = taken {
            info!("archive shutting down...");
            runtime.token.cancel();
            runtime.tracker.wait().await;
            info!("archive shutdown");
        }

        Ok(())
    }

    /// Wait for the archive's tasks to exit.
    pub async fn wait(&self) {
        let tracker = self
            .runtime
            .lock()
            .await
            .as_ref()
            .map(|r| r.tracker.clone());

        if let Some(tracker) = tracker {
            tracker.wait().await;
        }
    }
}

async fn record_session(
    mut stream: TcpStream,
    recording_id: u32,
    config: &ArchiveConfig,
    events_tx: &broadcast::Sender<RecordingEvent>,
    token: CancellationToken,
) -> Result<(), Error> {
    let control_stream_id = stream
        .read_i32()
        .await
        .map_err(|e| Error::Io("failed to read control stream id", e))?;

    if control_stream_id != config.control_stream_id {
        return Err(Error::Handshake(format!(
            "control stream id mismatch: expected {}, got {control_stream_id}",
            config.control_stream_id,
        )));
    }

    let stream_id = stream
        .read_i32()
        .await
        .map_err(|e| Error::Io("failed to read recording stream id", e))?;

    stream
        .write_u32(recording_id)
        .await
        .map_err(|e| Error::Io("failed to ack recording session", e))?;

    let path = config
        .archive_dir
        .join(format!("recording-{stream_id}.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| Error::Io("failed to open recording file", e))?;
    let mut writer = BufWriter::new(file);

    if config.recording_events_enabled {
        let _ = events_tx.send(RecordingEvent::Started {
            recording_id,
            stream_id,
        });
    }

    let result = record_frames(&mut stream, &mut writer, token).await;

    writer
        .flush()
        .await
        .map_err(|e| Error::Io("failed to flush recording file", e))?;

    if config.recording_events_enabled {
        let _ = events_tx.send(RecordingEvent::Stopped { recording_id });
    }

    result
}

async fn record_frames(
    stream: &mut TcpStream,
    writer: &mut BufWriter<tokio::fs::File>,
    token: CancellationToken,
) -> Result<(), Error> {
    let mut payload = Vec::new();

    loop {
        let length = tokio::select! {
            read = stream.read_u32() => match read {
                Ok(length) => length,
                // session closed by the client
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(Error::Io("failed to read frame header", e)),
            },
            () = token.cancelled() => return Ok(()),
        };

        payload.resize(length as usize, 0);
        stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| Error::Io("failed to read frame payload", e))?;

        writer
            .write_u32(length)
            .await
            .map_err(|e| Error::Io("failed to write frame header", e))?;
        writer
            .write_all(&payload)
            .await
            .map_err(|e| Error::Io("failed to write frame payload", e))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Io("failed to flush frame", e))?;
    }
}

#[async_trait]
impl Bootable for Archive {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn start(&self) -> Result<(), BootableError> {
        self.start().await.map_err(Into::into)
    }

    async fn shutdown(&self) -> Result<(), BootableError> {
        self.shutdown().await.map_err(Into::into)
    }

    async fn wait(&self) {
        self.wait().await;
    }
}
