//! Echo service hosted by the benchmark node's container.

use bytes::Bytes;
use replog_container::ClusteredService;

/// Benchmark service that echoes every message back to its session and
/// offers a zero-filled snapshot sized to the bytes it has accumulated.
pub struct EchoService {
    snapshot_threshold: u64,
    accumulated: u64,
}

impl EchoService {
    /// Create an echo service that requests a snapshot once `snapshot_threshold`
    /// bytes have accumulated since the last snapshot.
    #[must_use]
    pub const fn new(snapshot_threshold: u64) -> Self {
        Self {
            snapshot_threshold,
            accumulated: 0,
        }
    }
}

impl ClusteredService for EchoService {
    fn on_session_message(&mut self, payload: &[u8]) -> Bytes {
        self.accumulated = self.accumulated.saturating_add(payload.len() as u64);
        Bytes::copy_from_slice(payload)
    }

    fn should_snapshot(&self) -> bool {
        self.accumulated >= self.snapshot_threshold
    }

    fn take_snapshot(&mut self) -> Bytes {
        let length = usize::try_from(self.accumulated).unwrap_or(usize::MAX);
        let snapshot = Bytes::from(vec![0u8; length]);
        self.accumulated = 0;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_payloads_verbatim() {
        let mut service = EchoService::new(1024);
        assert_eq!(service.on_session_message(b"hello"), Bytes::from_static(b"hello"));
        assert_eq!(service.on_session_message(b""), Bytes::new());
    }

    #[test]
    fn snapshots_once_threshold_is_reached() {
        let mut service = EchoService::new(8);

        service.on_session_message(b"1234");
        assert!(!service.should_snapshot());

        service.on_session_message(b"5678");
        assert!(service.should_snapshot());

        let snapshot = service.take_snapshot();
        assert_eq!(snapshot.len(), 8);
        assert!(!service.should_snapshot());
    }

    #[test]
    fn snapshot_is_a_zero_filled_blob_of_the_accumulated_size() {
        let mut service = EchoService::new(16);
        for _ in 0..10 {
            service.on_session_message(&[7u8; 10]);
        }

        let snapshot = service.take_snapshot();
        assert_eq!(snapshot.len(), 100);
        assert!(snapshot.iter().all(|b| *b == 0));
    }
}
