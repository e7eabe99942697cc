//! Consensus module: ordered replication of client messages to the cluster's
//! service containers, with the log recorded through the archive.
//!
//! This is a single-node rendition sized for the benchmark harness: the local
//! module is always leader, client frames arriving on the ingress endpoint
//! are sequenced under the log lock, appended to the archive recording, then
//! fanned out to every attached service container. Container responses are
//! routed back to the originating client session.
//!
//! Startup preconditions are deliberately strict: the module binds to a mark
//! file the node must have created beforehand, and it shares its cluster
//! directory with the service container. Both are wired by the node's
//! configuration composer.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod error;
pub mod mark;
pub mod wire;

pub use error::Error;
pub use mark::{
    ComponentType, LIVENESS_TIMEOUT, LivenessRecord, MARK_FILENAME, MarkFile,
    service_mark_filename,
};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use replog_archive::{ArchiveClientConfig, RecordingClient};
use replog_bootable::{Bootable, BootableError};
use replog_util::{ErrorHandler, SharedEpochClock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Name of the cluster subdirectory computed from the node base directory.
pub const CLUSTER_DIR_NAME: &str = "cluster";

/// Stream id the module records its log under.
pub const LOG_STREAM_ID: i32 = 100;

/// Default length of the module's error buffer.
pub const DEFAULT_ERROR_BUFFER_LENGTH: usize = 64 * 1024;

/// File in the cluster directory holding the client ingress endpoint.
pub const INGRESS_ENDPOINT_FILENAME: &str = "ingress-endpoint";

/// File in the cluster directory holding the service-link endpoint.
pub const SERVICE_ENDPOINT_FILENAME: &str = "service-endpoint";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

type Sessions = Arc<RwLock<HashMap<u64, mpsc::Sender<Bytes>>>>;
type ServiceLinks = Arc<RwLock<Vec<mpsc::Sender<(u64, Bytes)>>>>;

/// Configuration for the [`ConsensusModule`].
#[derive(Clone)]
pub struct ConsensusConfig {
    /// Cluster working directory, shared verbatim with the service container.
    pub cluster_dir: PathBuf,

    /// Location of the module's mark file.
    pub mark_file_path: PathBuf,

    /// Archive control channel details, copied verbatim from the archive.
    pub archive_client: ArchiveClientConfig,

    /// Stream id the replicated log is recorded under.
    pub log_stream_id: i32,

    /// Length of the module's error buffer, recorded in the mark file.
    pub error_buffer_length: usize,

    /// Clock used for consistent timestamping.
    pub epoch_clock: SharedEpochClock,

    /// Sink for unhandled runtime errors.
    pub error_handler: ErrorHandler,
}

impl ConsensusConfig {
    /// Create a config rooted at `base_dir`, computing the cluster
    /// subdirectory and mark file location from it.
    #[must_use]
    pub fn new(
        base_dir: &Path,
        archive_client: ArchiveClientConfig,
        epoch_clock: SharedEpochClock,
        error_handler: ErrorHandler,
    ) -> Self {
        Self {
            cluster_dir: base_dir.join(CLUSTER_DIR_NAME),
            mark_file_path: base_dir.join(MARK_FILENAME),
            archive_client,
            log_stream_id: LOG_STREAM_ID,
            error_buffer_length: DEFAULT_ERROR_BUFFER_LENGTH,
            epoch_clock,
            error_handler,
        }
    }
}

struct ModuleRuntime {
    token: CancellationToken,
    tracker: TaskTracker,
    ingress_endpoint: SocketAddr,
}

/// The consensus module subsystem.
pub struct ConsensusModule {
    config: ConsensusConfig,
    runtime: Arc<Mutex<Option<ModuleRuntime>>>,
}

impl ConsensusModule {
    /// Create a new module from `config`. Nothing happens until `start`.
    #[must_use]
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            runtime: Arc::new(Mutex::new(None)),
        }
    }

    /// The cluster directory this module finalized.
    #[must_use]
    pub fn cluster_dir(&self) -> &Path {
        &self.config.cluster_dir
    }

    /// Endpoint clients drive requests into, available once started.
    pub async fn ingress_endpoint(&self) -> Option<SocketAddr> {
        self.runtime.lock().await.as_ref().map(|r| r.ingress_endpoint)
    }

    /// Start the module and block until it is ready for traffic.
    ///
    /// Binds the mark file (which the node must have created), finalizes the
    /// cluster directory, opens the archive recording for the log and
    /// publishes the ingress and service endpoints.
    ///
    /// # Errors
    ///
    /// Fails if already started, if the mark file is missing, if the cluster
    /// directory cannot be created, or if the archive is unreachable.
    pub async fn start(&self) -> Result<(), Error> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let mark = MarkFile::bind(&self.config.mark_file_path)?;

        std::fs::create_dir_all(&self.config.cluster_dir)
            .map_err(|e| Error::Io("failed to create cluster directory", e))?;

        let log =
            RecordingClient::connect(&self.config.archive_client, self.config.log_stream_id)
                .await?;
        debug!(
            recording_id = log.recording_id(),
            stream_id = self.config.log_stream_id,
            "log recording opened"
        );

        let ingress_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Io("failed to bind ingress endpoint", e))?;
        let ingress_endpoint = ingress_listener
            .local_addr()
            .map_err(|e| Error::Io("failed to resolve ingress endpoint", e))?;

        let service_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Io("failed to bind service endpoint", e))?;
        let service_endpoint = service_listener
            .local_addr()
            .map_err(|e| Error::Io("failed to resolve service endpoint", e))?;

        std::fs::write(
            self.config.cluster_dir.join(INGRESS_ENDPOINT_FILENAME),
            ingress_endpoint.to_string(),
        )
        .map_err(|e| Error::Io("failed to publish ingress endpoint", e))?;
        std::fs::write(
            self.config.cluster_dir.join(SERVICE_ENDPOINT_FILENAME),
            service_endpoint.to_string(),
        )
        .map_err(|e| Error::Io("failed to publish service endpoint", e))?;

        info!(%ingress_endpoint, %service_endpoint, "consensus module ready");

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let sessions: Sessions = Arc::new(RwLock::new(HashMap::new()));
        let service_links: ServiceLinks = Arc::new(RwLock::new(Vec::new()));
        let log = Arc::new(Mutex::new(log));

        self.spawn_ingress_acceptor(
            &tracker,
            &token,
            ingress_listener,
            sessions.clone(),
            service_links.clone(),
            log,
        );
        self.spawn_service_acceptor(&tracker, &token, service_listener, sessions, service_links);
        self.spawn_heartbeat(&tracker, &token, mark);

        tracker.close();
        runtime.replace(ModuleRuntime {
            token,
            tracker,
            ingress_endpoint,
        });

        Ok(())
    }

    fn spawn_ingress_acceptor(
        &self,
        tracker: &TaskTracker,
        token: &CancellationToken,
        listener: TcpListener,
        sessions: Sessions,
        service_links: ServiceLinks,
        log: Arc<Mutex<RecordingClient>>,
    ) {
        let token = token.clone();
        let session_tracker = tracker.clone();
        let next_session_id = Arc::new(AtomicU64::new(0));
        let error_handler = self.config.error_handler.clone();

        tracker.spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(accepted) => accepted,
                            Err(e) => {
                                error_handler(Box::new(e));
                                break;
                            }
                        };
                        debug!(%peer, "ingress session accepted");

                        let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
                        let session_token = token.clone();
                        let session_sessions = sessions.clone();
                        let session_links = service_links.clone();
                        let session_log = log.clone();
                        let session_handler = error_handler.clone();
                        let writer_tracker = session_tracker.clone();

                        session_tracker.spawn(async move {
                            run_ingress_session(
                                stream,
                                session_id,
                                session_sessions,
                                session_links,
                                session_log,
                                session_handler,
                                session_token,
                                &writer_tracker,
                            )
                            .await;
                        });
                    }
                    () = token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_service_acceptor(
        &self,
        tracker: &TaskTracker,
        token: &CancellationToken,
        listener: TcpListener,
        sessions: Sessions,
        service_links: ServiceLinks,
    ) {
        let token = token.clone();
        let link_tracker = tracker.clone();
        let error_handler = self.config.error_handler.clone();

        tracker.spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(accepted) => accepted,
                            Err(e) => {
                                error_handler(Box::new(e));
                                break;
                            }
                        };
                        info!(%peer, "service container attached");

                        let link_token = token.clone();
                        let link_sessions = sessions.clone();
                        let link_links = service_links.clone();
                        let writer_tracker = link_tracker.clone();

                        link_tracker.spawn(async move {
                            run_service_link(
                                stream,
                                link_sessions,
                                link_links,
                                link_token,
                                &writer_tracker,
                            )
                            .await;
                        });
                    }
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

    /// Stop the module and wait for its tasks to drain.
    ///
    /// # Errors
    ///
    /// Currently infallible; calling it when not running is a no-op.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let taken = self.runtime.lock().await.take();
        if let Some(runtime) = taken {
            info!("consensus module shutting down...");
            runtime.token.cancel();
            runtime.tracker.wait().await;
            info!("consensus module shutdown");
        }

        Ok(())
    }

    /// Wait for the module's tasks to exit.
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

#[allow(clippy::too_many_arguments)]
async fn run_ingress_session(
    stream: TcpStream,
    session_id: u64,
    sessions: Sessions,
    service_links: ServiceLinks,
    log: Arc<Mutex<RecordingClient>>,
    error_handler: ErrorHandler,
    token: CancellationToken,
    tracker: &TaskTracker,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (response_tx, mut response_rx) = mpsc::channel::<Bytes>(64);

    sessions.write().await.insert(session_id, response_tx);

    tracker.spawn(async move {
        while let Some(payload) = response_rx.recv().await {
            if wire::write_frame(&mut writer, &payload).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = wire::read_frame(&mut reader) => match frame {
                Ok(Some(payload)) => {
                    // Recording and fan-out both happen under the log lock
                    // so the delivery order to every service container
                    // matches the archived order.
                    let mut log = log.lock().await;
                    if let Err(e) = log.append(&payload).await {
                        if token.is_cancelled() {
                            break;
                        }
                        error_handler(Box::new(e));
                        break;
                    }

                    let links = service_links.read().await;
                    for link in links.iter() {
                        let _ = link.send((session_id, payload.clone())).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if !token.is_cancelled() {
                        warn!(session_id, "ingress session error: {e}");
                    }
                    break;
                }
            },
            () = token.cancelled() => break,
        }
    }

    sessions.write().await.remove(&session_id);
    debug!(session_id, "ingress session closed");
}

async fn run_service_link(
    stream: TcpStream,
    sessions: Sessions,
    service_links: ServiceLinks,
    token: CancellationToken,
    tracker: &TaskTracker,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<(u64, Bytes)>(256);

    service_links.write().await.push(outbound_tx);

    tracker.spawn(async move {
        while let Some((session_id, payload)) = outbound_rx.recv().await {
            if wire::write_message(&mut writer, session_id, &payload)
                .await
                .is_err()
            {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            message = wire::read_message(&mut reader) => match message {
                Ok(Some((session_id, payload))) => {
                    if let Some(response_tx) = sessions.read().await.get(&session_id) {
                        let _ = response_tx.send(payload).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if !token.is_cancelled() {
                        warn!("service link error: {e}");
                    }
                    break;
                }
            },
            () = token.cancelled() => break,
        }
    }

    debug!("service link closed");
}

#[async_trait]
impl Bootable for ConsensusModule {
    fn name(&self) -> &'static str {
        "consensus-module"
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
