use std::sync::Arc;
use std::time::Duration;

use replog_archive::{Archive, ArchiveConfig};
use replog_consensus::{
    ComponentType, ConsensusConfig, ConsensusModule, LIVENESS_TIMEOUT, MarkFile,
    SERVICE_ENDPOINT_FILENAME, wire,
};
use replog_util::{ErrorHandler, SystemEpochClock, allocate_port};
use tokio::net::TcpStream;

const FRAMES_PER_SESSION: u8 = 50;

fn quiet_handler() -> ErrorHandler {
    Arc::new(|_e| {})
}

async fn drive_session(endpoint: std::net::SocketAddr, tag: u8) {
    let mut stream = TcpStream::connect(endpoint).await.unwrap();
    for i in 0..FRAMES_PER_SESSION {
        wire::write_frame(&mut stream, &[tag, i]).await.unwrap();
    }
}

async fn wait_for_log_bytes(path: &std::path::Path, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        if let Ok(true) = std::fs::metadata(path).map(|m| m.len() as usize >= expected) {
            return;
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for the log recording to fill"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn archived_order_matches_delivery_order() {
    let dir = tempfile::tempdir().unwrap();

    let mut archive_config =
        ArchiveConfig::new(dir.path(), Arc::new(SystemEpochClock), quiet_handler());
    archive_config.control_channel = format!("tcp://127.0.0.1:{}", allocate_port());
    let archive = Archive::new(archive_config.clone());
    archive.start().await.unwrap();

    let config = ConsensusConfig::new(
        dir.path(),
        archive_config.client_config(),
        Arc::new(SystemEpochClock),
        quiet_handler(),
    );
    MarkFile::create(
        &config.mark_file_path,
        ComponentType::ConsensusModule,
        config.error_buffer_length,
        &SystemEpochClock,
        LIVENESS_TIMEOUT,
    )
    .unwrap();

    let module = ConsensusModule::new(config.clone());
    module.start().await.unwrap();

    let service_endpoint =
        std::fs::read_to_string(config.cluster_dir.join(SERVICE_ENDPOINT_FILENAME)).unwrap();
    let mut link = TcpStream::connect(service_endpoint.trim()).await.unwrap();

    // Give the module time to register the link before traffic fans out.
    tokio::time::sleep(Duration::from_millis(250)).await;

    let ingress = module.ingress_endpoint().await.unwrap();
    tokio::join!(drive_session(ingress, 1), drive_session(ingress, 2));

    let total = usize::from(FRAMES_PER_SESSION) * 2;
    let mut delivered = Vec::with_capacity(total);
    while delivered.len() < total {
        let (_session_id, payload) = wire::read_message(&mut link).await.unwrap().unwrap();
        delivered.push(payload.to_vec());
    }

    // Every frame is 4 bytes of header plus a 2 byte payload, flushed as it
    // is recorded.
    let log_path = archive_config.archive_dir.join("recording-100.log");
    wait_for_log_bytes(&log_path, total * 6).await;

    module.shutdown().await.unwrap();
    archive.shutdown().await.unwrap();

    let log = std::fs::read(&log_path).unwrap();
    let mut archived = Vec::with_capacity(total);
    let mut rest = &log[..];
    while !rest.is_empty() {
        let length = u32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
        archived.push(rest[4..4 + length].to_vec());
        rest = &rest[4 + length..];
    }

    assert_eq!(archived.len(), total);
    assert_eq!(archived, delivered);
}
