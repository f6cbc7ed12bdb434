use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use ggn_p2p::{
    DecoderKind, P2pResult, PeerHandler, Rpc, TcpPeer, TcpTransport, TcpTransportOpts, Transport,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;

/// Logs every peer that completes its handshake.
struct LogPeers;

#[async_trait]
impl PeerHandler for LogPeers {
    async fn on_peer(&self, peer: Arc<TcpPeer>) -> P2pResult<()> {
        info!(peer = %peer.remote_addr(), outbound = peer.is_outbound(), "peer connected");
        Ok(())
    }
}

pub fn build_transport(config: &NodeConfig) -> TcpTransport {
    let opts = TcpTransportOpts::default()
        .with_handshake(config.handshake.build())
        .with_decoder(config.decoder.build())
        .with_peer_handler(Arc::new(LogPeers));
    TcpTransport::new(config.transport.clone(), opts)
}

/// Encode `payload` the way the configured decoder on the other side expects.
pub async fn send_message(peer: &TcpPeer, decoder: &DecoderKind, payload: &[u8]) -> P2pResult<()> {
    match decoder {
        DecoderKind::Bincode => peer.send_frame(payload).await,
        DecoderKind::Raw { .. } => peer.send(payload).await,
    }
}

/// Drain the inbound channel until it ends. Returns the number of messages.
pub async fn consume_messages(mut rx: mpsc::Receiver<Rpc>) -> u64 {
    let mut received = 0;
    while let Some(rpc) = rx.recv().await {
        received += 1;
        info!(peer = %rpc.from, bytes = rpc.payload.len(), "message received");
        debug!(peer = %rpc.from, payload = %String::from_utf8_lossy(&rpc.payload), "message payload");
    }
    received
}

/// Listen, dial `peers`, log traffic until `shutdown` resolves, then close.
pub async fn run<T, F>(transport: &T, peers: &[String], shutdown: F) -> anyhow::Result<u64>
where
    T: Transport,
    F: Future<Output = ()>,
{
    transport
        .listen_and_accept()
        .await
        .context("failed to start transport")?;
    let rx = transport.consume()?;
    let consumer = tokio::spawn(consume_messages(rx));

    for addr in peers {
        if let Err(e) = transport.dial(addr).await {
            warn!(peer = %addr, error = %e, "failed to dial peer");
        }
    }

    shutdown.await;
    info!("shutting down");
    transport.close().await;
    consumer.await.context("message consumer panicked")
}
