use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Construction-time settings of a [`TcpTransport`](crate::TcpTransport).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpTransportConfig {
    /// Address to bind, e.g. `"0.0.0.0:3000"`. Port 0 picks a free port.
    pub listen_addr: String,
    /// Upper bound on live connections (accepted plus dialed). `None` means
    /// unbounded.
    pub max_connections: Option<usize>,
    /// Capacity of the inbound channel shared by all peers. When it is full
    /// every decode loop waits, which is what slows readers down when the
    /// consumer falls behind.
    pub inbound_capacity: usize,
    /// Deadline for the handshake of each new connection.
    pub handshake_timeout_ms: Option<u64>,
}

const DEFAULT_INBOUND_CAPACITY: usize = 16;

impl TcpTransportConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Self::default()
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".into(),
            max_connections: None,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            handshake_timeout_ms: None,
        }
    }
}
