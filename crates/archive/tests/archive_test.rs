use std::sync::Arc;

use replog_archive::{Archive, ArchiveConfig, Error, RecordingClient, RecordingEvent};
use replog_util::{ErrorHandler, SystemEpochClock, allocate_port};

fn quiet_handler() -> ErrorHandler {
    Arc::new(|_e| {})
}

fn test_config(base_dir: &std::path::Path) -> ArchiveConfig {
    let mut config = ArchiveConfig::new(base_dir, Arc::new(SystemEpochClock), quiet_handler());
    config.control_channel = format!("tcp://127.0.0.1:{}", allocate_port());
    config
}

#[tokio::test]
async fn records_frames_to_per_stream_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let archive = Archive::new(config.clone());
    let mut events = archive.recording_events().unwrap();

    archive.start().await.unwrap();

    let mut session = RecordingClient::connect(&config.client_config(), 7).await.unwrap();
    session.append(b"alpha").await.unwrap();
    session.append(b"beta").await.unwrap();
    drop(session);

    // The session flushes before it reports stopped.
    loop {
        if let RecordingEvent::Stopped { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    archive.shutdown().await.unwrap();

    let recorded = std::fs::read(config.archive_dir.join("recording-7.log")).unwrap();
    let mut expected = Vec::new();
    expected.extend_from_slice(&5u32.to_be_bytes());
    expected.extend_from_slice(b"alpha");
    expected.extend_from_slice(&4u32.to_be_bytes());
    expected.extend_from_slice(b"beta");
    assert_eq!(recorded, expected);
}

#[tokio::test]
async fn deletes_stale_recordings_on_start_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.delete_archive_on_start = true;

    std::fs::create_dir_all(&config.archive_dir).unwrap();
    let stale = config.archive_dir.join("recording-999.log");
    std::fs::write(&stale, b"stale").unwrap();

    let archive = Archive::new(config);
    archive.start().await.unwrap();

    assert!(!stale.exists());
    archive.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejects_control_stream_id_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let archive = Archive::new(config.clone());

    archive.start().await.unwrap();

    let mut client_config = config.client_config();
    client_config.control_stream_id += 1;

    let result = RecordingClient::connect(&client_config, 7).await;
    assert!(matches!(result, Err(Error::Handshake(_))));

    archive.shutdown().await.unwrap();
}

#[tokio::test]
async fn second_start_fails() {
    let dir = tempfile::tempdir().unwrap();
    let archive = Archive::new(test_config(dir.path()));

    archive.start().await.unwrap();
    assert!(matches!(archive.start().await, Err(Error::AlreadyStarted)));

    archive.shutdown().await.unwrap();
}

#[tokio::test]
async fn publishes_recording_events_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.recording_events_enabled = false;

    let silent = Archive::new(config);
    assert!(silent.recording_events().is_none());

    let config = test_config(dir.path());
    let archive = Archive::new(config.clone());
    let mut events = archive.recording_events().unwrap();

    archive.start().await.unwrap();

    let session = RecordingClient::connect(&config.client_config(), 3).await.unwrap();
    let started = events.recv().await.unwrap();
    assert!(matches!(
        started,
        RecordingEvent::Started { stream_id: 3, .. }
    ));

    drop(session);
    let stopped = events.recv().await.unwrap();
    assert!(matches!(stopped, RecordingEvent::Stopped { .. }));

    archive.shutdown().await.unwrap();
}
