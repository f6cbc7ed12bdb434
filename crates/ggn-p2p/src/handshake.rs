use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{P2pError, P2pResult};
use crate::peer::TcpPeer;

/// Magic bytes opening a [`VersionHandshake`].
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"GGNW";

const VERSION_HANDSHAKE_SIZE: usize = HANDSHAKE_MAGIC.len() + 1;

/// Negotiation run once on every new connection before it becomes a peer.
///
/// An error rejects the connection: the transport closes it and nothing from
/// it reaches the inbound channel.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn handshake(&self, peer: &TcpPeer) -> P2pResult<()>;
}

/// Accepts every connection without exchanging anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopHandshake;

#[async_trait]
impl Handshake for NopHandshake {
    async fn handshake(&self, _peer: &TcpPeer) -> P2pResult<()> {
        Ok(())
    }
}

/// Both sides send `GGNW` followed by one version byte, then check what the
/// other side sent. Symmetric, so dialer and acceptor run the same code.
#[derive(Clone, Copy, Debug)]
pub struct VersionHandshake {
    version: u8,
}

impl VersionHandshake {
    pub fn new(version: u8) -> Self {
        Self { version }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    fn hello(&self) -> [u8; VERSION_HANDSHAKE_SIZE] {
        let mut out = [0u8; VERSION_HANDSHAKE_SIZE];
        out[..HANDSHAKE_MAGIC.len()].copy_from_slice(&HANDSHAKE_MAGIC);
        out[HANDSHAKE_MAGIC.len()] = self.version;
        out
    }
}

#[async_trait]
impl Handshake for VersionHandshake {
    async fn handshake(&self, peer: &TcpPeer) -> P2pResult<()> {
        peer.send(&self.hello()).await?;

        let mut buf = [0u8; VERSION_HANDSHAKE_SIZE];
        peer.read_exact(&mut buf).await?;
        if buf[..HANDSHAKE_MAGIC.len()] != HANDSHAKE_MAGIC {
            return Err(P2pError::HandshakeFailed("bad magic".into()));
        }
        let remote = buf[HANDSHAKE_MAGIC.len()];
        if remote != self.version {
            return Err(P2pError::HandshakeFailed(format!(
                "version mismatch: local {}, remote {}",
                self.version, remote
            )));
        }
        Ok(())
    }
}

/// Handshake selection for configuration files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandshakeKind {
    #[default]
    Nop,
    Version { version: u8 },
}

impl HandshakeKind {
    pub fn build(&self) -> Arc<dyn Handshake> {
        match *self {
            Self::Nop => Arc::new(NopHandshake),
            Self::Version { version } => Arc::new(VersionHandshake::new(version)),
        }
    }
}
