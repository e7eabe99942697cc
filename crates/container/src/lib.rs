//! Clustered service container: hosts the application service and feeds it
//! the ordered message stream produced by the consensus module.
//!
//! The container attaches to the consensus module over the service endpoint
//! published in the shared cluster directory, delivers replicated messages to
//! its hosted [`ClusteredService`], routes responses back, and records the
//! service's snapshots through the archive when the service reports its
//! accumulated state exceeded its configured threshold.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
mod service;

pub use error::Error;
pub use service::ClusteredService;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use replog_archive::{ArchiveClientConfig, RecordingClient};
use replog_bootable::{Bootable, BootableError};
use replog_consensus::{
    ComponentType, LIVENESS_TIMEOUT, MarkFile, SERVICE_ENDPOINT_FILENAME, service_mark_filename,
    wire,
};
use replog_util::{ErrorHandler, SharedEpochClock};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Service id used when a node hosts a single service instance.
pub const DEFAULT_SERVICE_ID: i64 = 0;

/// Stream id the container records service snapshots under.
pub const SNAPSHOT_STREAM_ID: i32 = 106;

/// Default length of the container's error buffer.
pub const DEFAULT_ERROR_BUFFER_LENGTH: usize = 64 * 1024;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const ENDPOINT_WAIT: Duration = Duration::from_secs(5);
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for the [`ServiceContainer`].
#[derive(Clone)]
pub struct ContainerConfig {
    /// Numeric id of the hosted service instance.
    pub service_id: i64,

    /// Cluster working directory, taken verbatim from the consensus module's
    /// resolved config; the container never computes its own.
    pub cluster_dir: PathBuf,

    /// Location of the container's mark file.
    pub mark_file_path: PathBuf,

    /// Archive control channel details, copied verbatim from the archive.
    pub archive_client: ArchiveClientConfig,

    /// Stream id snapshots are recorded under.
    pub snapshot_stream_id: i32,

    /// Length of the container's error buffer, recorded in the mark file.
    pub error_buffer_length: usize,

    /// Clock used for consistent timestamping.
    pub epoch_clock: SharedEpochClock,

    /// Sink for unhandled runtime errors.
    pub error_handler: ErrorHandler,
}

impl ContainerConfig {
    /// Create a config for the default service id, reusing the consensus
    /// module's resolved `cluster_dir`.
    #[must_use]
    pub fn new(
        base_dir: &Path,
        cluster_dir: PathBuf,
        archive_client: ArchiveClientConfig,
        epoch_clock: SharedEpochClock,
        error_handler: ErrorHandler,
    ) -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID,
            cluster_dir,
            mark_file_path: base_dir.join(service_mark_filename(DEFAULT_SERVICE_ID)),
            archive_client,
            snapshot_stream_id: SNAPSHOT_STREAM_ID,
            error_buffer_length: DEFAULT_ERROR_BUFFER_LENGTH,
            epoch_clock,
            error_handler,
        }
    }
}

struct ContainerRuntime {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// The clustered service container subsystem.
pub struct ServiceContainer {
    config: ContainerConfig,
    service: Mutex<Option<Box<dyn ClusteredService>>>,
    runtime: Arc<Mutex<Option<ContainerRuntime>>>,
}

impl ServiceContainer {
    /// Create a new container hosting `service`. Nothing happens until
    /// `start`.
    #[must_use]
    pub fn new(config: ContainerConfig, service: Box<dyn ClusteredService>) -> Self {
        Self {
            config,
            service: Mutex::new(Some(service)),
            runtime: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the container and block until it is attached to the cluster.
    ///
    /// Binds the mark file (which the node must have created), resolves the
    /// consensus module's service endpoint from the shared cluster directory,
    /// attaches to it and opens the snapshot recording with the archive.
    ///
    /// # Errors
    ///
    /// Fails if already started, if the mark file is missing, if the service
    /// endpoint never appears, or if consensus module or archive are
    /// unreachable.
    pub async fn start(&self) -> Result<(), Error> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let mark = MarkFile::bind(&self.config.mark_file_path)?;

        let service = self
            .service
            .lock()
            .await
            .take()
            .ok_or(Error::AlreadyStarted)?;

        let endpoint = self.resolve_service_endpoint().await?;
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| Error::Io("failed to attach to consensus module", e))?;

        let snapshots = RecordingClient::connect(
            &self.config.archive_client,
            self.config.snapshot_stream_id,
        )
        .await?;

        info!(
            service_id = self.config.service_id,
            %endpoint,
            "service container attached"
        );

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        self.spawn_service_loop(&tracker, &token, stream, service, snapshots);
        self.spawn_heartbeat(&tracker, &token, mark);

        tracker.close();
        runtime.replace(ContainerRuntime { token, tracker });

        Ok(())
    }

    async fn resolve_service_endpoint(&self) -> Result<SocketAddr, Error> {
        let path = self.config.cluster_dir.join(SERVICE_ENDPOINT_FILENAME);
        let deadline = tokio::time::Instant::now() + ENDPOINT_WAIT;

        // The launcher starts the consensus module first, so the endpoint
        // file normally exists already; the poll covers publish latency.
        loop {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                if let Ok(endpoint) = contents.trim().parse() {
                    return Ok(endpoint);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ServiceEndpoint(path));
            }

            tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;
        }
    }

    fn spawn_service_loop(
        &self,
        tracker: &TaskTracker,
        token: &CancellationToken,
        stream: TcpStream,
        mut service: Box<dyn ClusteredService>,
        mut snapshots: RecordingClient,
    ) {
        let token = token.clone();
        let error_handler = self.config.error_handler.clone();

        tracker.spawn(async move {
            let (mut reader, mut writer) = stream.into_split();

            loop {
                tokio::select! {
                    message = wire::read_message(&mut reader) => match message {
                        Ok(Some((session_id, payload))) => {
                            let response = service.on_session_message(&payload);

                            if let Err(e) =
                                wire::write_message(&mut writer, session_id, &response).await
                            {
                                if !token.is_cancelled() {
                                    error_handler(Box::new(e));
                                }
                                break;
                            }

                            if service.should_snapshot() {
                                let snapshot = service.take_snapshot();
                                debug!(bytes = snapshot.len(), "recording service snapshot");
                                if let Err(e) = snapshots.append(&snapshot).await {
                                    error_handler(Box::new(e));
                                    break;
                                }
                            }
                        }
                        Ok(None) => {
                            if !token.is_cancelled() {
                                warn!("consensus module closed the service link");
                            }
                            break;
                        }
                        Err(e) => {
                            if !token.is_cancelled() {
                                error_handler(Box::new(e));
                            }
                            break;
                        }
                    },
                    () = token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_heartbeat(&self, tracker: &TaskTracker, token: &CancellationToken, mark: MarkFile) {
        let token = token.clone();
        let clock = self.config.epoch_clock.clone();
        let error_handler = self.config.error_handler.clone();
        let mut mark = mark;

        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = mark.update_heartbeat(clock.as_ref()) {
                            error_handler(Box::new(e));
                            break;
                        }
                    }
                    () = token.cancelled() => break,
                }
            }
        });
    }

    /// Stop the container and wait for its tasks to drain.
    ///
    /// # Errors
    ///
    /// Currently infallible; calling it when not running is a no-op.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let taken = self.runtime.lock().await.take();
        if let Some(runtime) = taken {
            info!("service container shutting down...");
            runtime.token.cancel();
            runtime.tracker.wait().await;
            info!("service container shutdown");
        }

        Ok(())
    }

    /// Wait for the container's tasks to exit.
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

#[async_trait]
impl Bootable for ServiceContainer {
    fn name(&self) -> &'static str {
        "service-container"
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
