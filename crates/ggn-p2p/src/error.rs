use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum P2pError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("peer rejected: {0}")]
    PeerRejected(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    Framing(String),

    #[error("serialization error: {0}")]
    Encode(String),

    #[error("deserialization error: {0}")]
    Decode(String),

    #[error("connection closed by remote")]
    ConnectionClosed,

    #[error("peer {0} is closed")]
    PeerClosed(SocketAddr),

    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),

    #[error("inbound consumer already taken")]
    ConsumerTaken,

    #[error("inbound consumer dropped")]
    ConsumerClosed,

    #[error("transport already listening on {0}")]
    AlreadyListening(SocketAddr),

    #[error("already connected to {0}")]
    AlreadyConnected(SocketAddr),

    #[error("transport is shut down")]
    Shutdown,

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl P2pError {
    /// Returns `true` if the error means the remote went away rather than
    /// misbehaved.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Self::ConnectionClosed | Self::PeerClosed(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

pub type P2pResult<T> = Result<T, P2pError>;
