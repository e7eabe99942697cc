//! Sequential port allocation for tests that need real listeners.

use std::net::{SocketAddr, TcpListener};
use std::sync::{LazyLock, Mutex};

/// Next candidate port, starting high enough to avoid well-known services.
static NEXT_PORT: LazyLock<Mutex<u16>> = LazyLock::new(|| Mutex::new(18000));

/// Allocate the next port that is currently bindable on localhost.
///
/// # Panics
///
/// Panics if no free port is found in a large scan window.
#[must_use]
pub fn allocate_port() -> u16 {
    let mut next = NEXT_PORT.lock().unwrap();

    for _ in 0..10_000 {
        let port = *next;
        *next += 1;

        if is_port_available(port) {
            return port;
        }
    }

    panic!("no available ports found near {}", *next);
}

/// Whether `port` can currently be bound on localhost.
#[must_use]
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).is_ok()
}
