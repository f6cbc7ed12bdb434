use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::codec::FrameCodec;
use crate::decoder::Decoder;
use crate::error::{P2pError, P2pResult};
use crate::signal::wait_until_set;

/// The remote node over an established TCP connection.
///
/// A peer owns both halves of its socket until [`TcpPeer::close`] releases
/// them. Reads are driven by the transport's decode loop (and by handshakes
/// before it starts); writes may come from any task holding the peer.
pub struct TcpPeer {
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    /// `true` if we dialed the connection, `false` if we accepted it.
    outbound: bool,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl TcpPeer {
    pub fn new(stream: TcpStream, outbound: bool) -> P2pResult<Self> {
        let remote_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);
        Ok(Self {
            remote_addr,
            local_addr,
            outbound,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            closed,
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write all of `data` and flush.
    pub async fn send(&self, data: &[u8]) -> P2pResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or(P2pError::PeerClosed(self.remote_addr))?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send `payload` as one structured frame.
    pub async fn send_frame(&self, payload: &[u8]) -> P2pResult<()> {
        let frame = FrameCodec::encode(payload)?;
        self.send(&frame).await
    }

    /// Fill `buf` from the connection. Meant for handshakes; once the decode
    /// loop runs it owns the read side.
    pub async fn read_exact(&self, buf: &mut [u8]) -> P2pResult<()> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or(P2pError::PeerClosed(self.remote_addr))?;
        match reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(P2pError::ConnectionClosed)
            }
            Err(e) => Err(P2pError::Io(e)),
        }
    }

    /// Decode one message, or stop early with [`P2pError::PeerClosed`] if the
    /// peer is closed meanwhile.
    pub(crate) async fn decode_with(&self, decoder: &dyn Decoder) -> P2pResult<Bytes> {
        let closed = self.closed.subscribe();
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or(P2pError::PeerClosed(self.remote_addr))?;
        tokio::select! {
            res = decoder.decode(reader) => res,
            _ = wait_until_set(closed) => Err(P2pError::PeerClosed(self.remote_addr)),
        }
    }

    /// Shut down the connection and release the socket.
    ///
    /// Idempotent. A decode in progress on another task is interrupted and
    /// drops the read half when it returns.
    pub async fn close(&self) {
        self.closed.send_replace(true);
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(peer = %self.remote_addr, error = %e, "shutdown after remote hangup");
            }
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }

    /// Release the read half once the decode loop is done with it.
    pub(crate) async fn release_reader(&self) {
        self.reader.lock().await.take();
    }
}

impl std::fmt::Debug for TcpPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeer")
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.local_addr)
            .field("outbound", &self.outbound)
            .field("closed", &self.is_closed())
            .finish()
    }
}
