use std::sync::Arc;

use async_trait::async_trait;

use crate::error::P2pResult;
use crate::peer::TcpPeer;

/// Called once per connection after a successful handshake, before the
/// peer's decode loop starts.
///
/// Returning an error rejects the peer and closes its connection. The handler
/// may keep the `Arc` to send to the peer later; the decode loop keeps
/// running independently.
#[async_trait]
pub trait PeerHandler: Send + Sync {
    async fn on_peer(&self, peer: Arc<TcpPeer>) -> P2pResult<()>;
}
