use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use replog_bootable::{Bootable, BootableError};
use replog_consensus::{ComponentType, MarkFile, wire};
use replog_node::{
    Bootstrap, ClusterNode, EchoService, Error, NodeOptions, SharedContext, compose_configs,
    reclaim_stale_state, write_liveness_records,
};
use replog_util::{ErrorHandler, ErrorPolicy, SystemEpochClock, allocate_port};
use tokio::net::TcpStream;

fn quiet_policy() -> ErrorPolicy {
    Arc::new(|_subsystem: &'static str| -> ErrorHandler { Arc::new(|_e| {}) })
}

fn test_context(base_dir: &Path) -> SharedContext {
    SharedContext {
        base_dir: base_dir.to_path_buf(),
        epoch_clock: Arc::new(SystemEpochClock),
        error_policy: quiet_policy(),
    }
}

fn test_options() -> NodeOptions {
    NodeOptions {
        control_channel: format!("tcp://127.0.0.1:{}", allocate_port()),
        control_stream_id: 10,
        service_id: 0,
        snapshot_size: 1024 * 1024,
    }
}

async fn wait_for_file(path: &Path) -> Vec<u8> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        if let Ok(contents) = std::fs::read(path) {
            if !contents.is_empty() {
                return contents;
            }
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[test]
fn composed_configs_agree_on_shared_fields() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let options = test_options();

    let configs = compose_configs(&shared, &options);

    assert_eq!(configs.archive.client_config(), configs.consensus.archive_client);
    assert_eq!(configs.archive.client_config(), configs.container.archive_client);
    assert_eq!(configs.consensus.cluster_dir, configs.container.cluster_dir);
    assert_ne!(configs.consensus.mark_file_path, configs.container.mark_file_path);

    assert!(configs.archive.delete_archive_on_start);
    assert!(!configs.archive.recording_events_enabled);
    assert_eq!(configs.archive.control_channel, options.control_channel);
    assert_eq!(configs.archive.control_stream_id, options.control_stream_id);
}

#[test]
fn custom_service_id_moves_the_container_mark_file() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let mut options = test_options();
    options.service_id = 3;

    let configs = compose_configs(&shared, &options);
    assert_eq!(configs.container.service_id, 3);
    assert_eq!(
        configs.container.mark_file_path,
        dir.path().join("cluster-mark-service-3.json")
    );
}

#[test]
fn reclaim_removes_stale_cluster_directory() {
    let dir = tempfile::tempdir().unwrap();
    let cluster_dir = dir.path().join("cluster");
    std::fs::create_dir_all(cluster_dir.join("nested")).unwrap();
    std::fs::write(cluster_dir.join("ingress-endpoint"), "stale").unwrap();

    reclaim_stale_state(&cluster_dir).unwrap();
    assert!(!cluster_dir.exists());

    // A second reclaim over the now-missing directory is a no-op.
    reclaim_stale_state(&cluster_dir).unwrap();
}

#[test]
fn liveness_records_exist_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let configs = compose_configs(&shared, &test_options());

    write_liveness_records(&shared, &configs).unwrap();

    let consensus_mark = MarkFile::bind(&configs.consensus.mark_file_path).unwrap();
    assert_eq!(
        consensus_mark.record().component_type,
        ComponentType::ConsensusModule
    );

    let container_mark = MarkFile::bind(&configs.container.mark_file_path).unwrap();
    assert_eq!(container_mark.record().component_type, ComponentType::Container);
}

#[tokio::test]
async fn launch_fails_cleanly_when_control_channel_is_taken() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let options = test_options();

    let addr = options.control_channel.strip_prefix("tcp://").unwrap();
    let _occupant = std::net::TcpListener::bind(addr).unwrap();

    let configs = compose_configs(&shared, &options);
    write_liveness_records(&shared, &configs).unwrap();
    let cluster_dir = configs.consensus.cluster_dir.clone();

    let result = Bootstrap::new(configs, Box::new(EchoService::new(1024)))
        .initialize()
        .await;

    assert!(result.is_err());
    // Nothing past the archive step ran.
    assert!(!cluster_dir.exists());
}

#[tokio::test]
async fn failed_launch_releases_already_started_subsystems() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let options = test_options();
    let control_addr = options
        .control_channel
        .strip_prefix("tcp://")
        .unwrap()
        .to_string();

    // Without liveness records the consensus module refuses to start, after
    // the archive has already bound its control channel.
    let configs = compose_configs(&shared, &options);
    let result = Bootstrap::new(configs, Box::new(EchoService::new(1024)))
        .initialize()
        .await;

    assert!(matches!(
        result,
        Err(Error::Consensus(replog_consensus::Error::MarkFileMissing(_)))
    ));

    // The unwind released the archive, so its control channel is gone.
    assert!(TcpStream::connect(&control_addr).await.is_err());
}

#[tokio::test]
async fn node_echoes_ingress_traffic_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let shared = test_context(dir.path());
    let options = test_options();

    let configs = compose_configs(&shared, &options);
    let cluster_dir = configs.consensus.cluster_dir.clone();
    let archive_dir = configs.archive.archive_dir.clone();

    write_liveness_records(&shared, &configs).unwrap();
    reclaim_stale_state(&cluster_dir).unwrap();

    let mut node = Bootstrap::new(configs, Box::new(EchoService::new(1024 * 1024)))
        .initialize()
        .await
        .unwrap();
    assert_eq!(
        node.subsystem_names(),
        vec!["archive", "consensus-module", "service-container"]
    );

    let endpoint = String::from_utf8(wait_for_file(&cluster_dir.join("ingress-endpoint")).await)
        .unwrap();
    let mut ingress = TcpStream::connect(endpoint.trim()).await.unwrap();

    wire::write_frame(&mut ingress, b"benchmark-message").await.unwrap();
    let echoed = wire::read_frame(&mut ingress).await.unwrap().unwrap();
    assert_eq!(&echoed[..], b"benchmark-message");

    // The log recording is flushed frame by frame.
    let log = wait_for_file(&archive_dir.join("recording-100.log")).await;
    assert!(log.len() >= b"benchmark-message".len());

    drop(ingress);
    node.shutdown().await.unwrap();

    // A second release over the now-empty stack is a no-op.
    node.shutdown().await.unwrap();
}

struct RecordingBootable {
    name: &'static str,
    fail_release: bool,
    released: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl Bootable for RecordingBootable {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start(&self) -> Result<(), BootableError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BootableError> {
        self.released.lock().unwrap().push(self.name);
        if self.fail_release {
            return Err("release failed".into());
        }
        Ok(())
    }

    async fn wait(&self) {}
}

#[tokio::test]
async fn release_is_reverse_ordered_and_exhaustive() {
    let released = Arc::new(Mutex::new(Vec::new()));
    let bootable = |name, fail_release| -> Box<dyn Bootable> {
        Box::new(RecordingBootable {
            name,
            fail_release,
            released: released.clone(),
        })
    };

    let mut node = ClusterNode::new(vec![
        bootable("first", false),
        bootable("second", true),
        bootable("third", false),
    ]);

    let result = node.shutdown().await;
    let Err(Error::Release(failures)) = result else {
        panic!("expected aggregated release failure");
    };
    assert_eq!(failures.0.len(), 1);
    assert_eq!(failures.0[0].subsystem, "second");

    // Reverse launch order, every release attempted.
    assert_eq!(*released.lock().unwrap(), vec!["third", "second", "first"]);

    node.shutdown().await.unwrap();
}

#[test]
fn options_fall_back_to_defaults() {
    let properties = replog_node::Properties::default();
    let options = NodeOptions::from_properties(&properties);

    assert_eq!(options.control_channel, replog_archive::DEFAULT_CONTROL_CHANNEL);
    assert_eq!(options.control_stream_id, replog_archive::DEFAULT_CONTROL_STREAM_ID);
    assert_eq!(options.service_id, 0);
    assert_eq!(options.snapshot_size, replog_node::DEFAULT_SNAPSHOT_SIZE);
}
