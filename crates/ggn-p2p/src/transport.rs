use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::TcpTransportConfig;
use crate::decoder::{BincodeDecoder, Decoder};
use crate::error::{P2pError, P2pResult};
use crate::handshake::{Handshake, NopHandshake};
use crate::hooks::PeerHandler;
use crate::message::Rpc;
use crate::peer::TcpPeer;
use crate::signal::wait_until_set;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Anything that connects this node to remote peers.
#[async_trait]
pub trait Transport: Send + Sync {
    type Peer: Send + Sync;

    /// Start accepting connections. Returns once the listener is bound.
    async fn listen_and_accept(&self) -> P2pResult<SocketAddr>;

    /// Open an outbound connection.
    async fn dial(&self, addr: &str) -> P2pResult<Arc<Self::Peer>>;

    /// Receiving end of the inbound message channel.
    fn consume(&self) -> P2pResult<mpsc::Receiver<Rpc>>;

    /// Stop accepting, close every peer, and wait for their tasks.
    async fn close(&self);

    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Protocol strategies plugged into a [`TcpTransport`].
#[derive(Clone)]
pub struct TcpTransportOpts {
    pub handshake: Arc<dyn Handshake>,
    pub decoder: Arc<dyn Decoder>,
    pub on_peer: Option<Arc<dyn PeerHandler>>,
}

impl TcpTransportOpts {
    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_peer_handler(mut self, handler: Arc<dyn PeerHandler>) -> Self {
        self.on_peer = Some(handler);
        self
    }
}

impl Default for TcpTransportOpts {
    fn default() -> Self {
        Self {
            handshake: Arc::new(NopHandshake),
            decoder: Arc::new(BincodeDecoder::default()),
            on_peer: None,
        }
    }
}

#[derive(Default)]
struct ListenerState {
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
}

/// State shared by the transport handle, the accept loop and every
/// connection task.
struct Shared {
    config: TcpTransportConfig,
    opts: TcpTransportOpts,
    /// Taken on close so the consumer sees the channel end once the last
    /// decode loop is gone.
    rpc_tx: Mutex<Option<mpsc::Sender<Rpc>>>,
    rpc_rx: Mutex<Option<mpsc::Receiver<Rpc>>>,
    peers: RwLock<HashMap<SocketAddr, Arc<TcpPeer>>>,
    limiter: Option<Arc<Semaphore>>,
    shutdown: watch::Sender<bool>,
    listener: Mutex<ListenerState>,
    connections: AsyncMutex<JoinSet<()>>,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Reserve a connection slot, if connections are limited.
    fn admit(&self) -> P2pResult<Option<OwnedSemaphorePermit>> {
        match &self.limiter {
            None => Ok(None),
            Some(limiter) => Arc::clone(limiter)
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| P2pError::ConnectionLimit(self.config.max_connections.unwrap_or_default())),
        }
    }

    fn sender(&self) -> P2pResult<mpsc::Sender<Rpc>> {
        self.rpc_tx
            .lock()
            .expect("inbound sender lock poisoned")
            .clone()
            .ok_or(P2pError::Shutdown)
    }

    /// Handshake, peer callback, registration.
    async fn establish(&self, peer: &Arc<TcpPeer>) -> P2pResult<()> {
        let handshake = self.opts.handshake.handshake(peer);
        match self.config.handshake_timeout() {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| P2pError::Timeout("handshake"))??,
            None => handshake.await?,
        }

        if let Some(handler) = &self.opts.on_peer {
            handler.on_peer(Arc::clone(peer)).await.map_err(|e| match e {
                P2pError::PeerRejected(_) => e,
                other => P2pError::PeerRejected(other.to_string()),
            })?;
        }

        self.register(peer)?;
        debug!(peer = %peer.remote_addr(), outbound = peer.is_outbound(), "peer established");
        Ok(())
    }

    /// Add `peer` to the peer set. A second live connection to the same remote
    /// address is refused; an entry whose peer is already closed is replaced.
    fn register(&self, peer: &Arc<TcpPeer>) -> P2pResult<()> {
        let addr = peer.remote_addr();
        let mut peers = self.peers.write().expect("peer set lock poisoned");
        match peers.entry(addr) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                Err(P2pError::AlreadyConnected(addr))
            }
            Entry::Occupied(mut entry) => {
                entry.insert(Arc::clone(peer));
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(peer));
                Ok(())
            }
        }
    }

    fn unregister(&self, peer: &Arc<TcpPeer>) {
        let mut peers = self.peers.write().expect("peer set lock poisoned");
        let addr = peer.remote_addr();
        if peers.get(&addr).is_some_and(|p| Arc::ptr_eq(p, peer)) {
            peers.remove(&addr);
        }
    }

    /// Decode messages until the first error and publish each one.
    async fn decode_loop(&self, peer: &TcpPeer) -> P2pResult<()> {
        let tx = self.sender()?;
        loop {
            let payload = peer.decode_with(self.opts.decoder.as_ref()).await?;
            debug!(peer = %peer.remote_addr(), bytes = payload.len(), "message decoded");
            let rpc = Rpc {
                from: peer.remote_addr(),
                payload,
            };
            tx.send(rpc).await.map_err(|_| P2pError::ConsumerClosed)?;
        }
    }

    async fn run_connection(self: Arc<Self>, peer: Arc<TcpPeer>, established: bool) {
        let addr = peer.remote_addr();
        let shutdown = self.shutdown.subscribe();
        let drive = async {
            if !established {
                self.establish(&peer).await?;
            }
            self.decode_loop(&peer).await
        };
        let result = tokio::select! {
            res = drive => res,
            _ = wait_until_set(shutdown) => Err(P2pError::Shutdown),
        };

        self.unregister(&peer);
        peer.close().await;
        peer.release_reader().await;

        match result {
            Ok(()) => debug!(peer = %addr, "peer connection finished"),
            Err(P2pError::Shutdown) => debug!(peer = %addr, "peer closed on shutdown"),
            Err(e) if e.is_disconnect() => debug!(peer = %addr, reason = %e, "peer disconnected"),
            Err(e) => warn!(peer = %addr, error = %e, "dropping peer connection"),
        }
    }

    /// Hand `peer` to a connection task tracked by `close()`. Fails once
    /// shutdown has started; `close()` raises the flag before it takes the
    /// task set, so a task spawned here is always waited for.
    async fn spawn_connection(
        self: &Arc<Self>,
        peer: Arc<TcpPeer>,
        permit: Option<OwnedSemaphorePermit>,
        established: bool,
    ) -> P2pResult<()> {
        let shared = Arc::clone(self);
        let mut connections = self.connections.lock().await;
        if self.is_shut_down() {
            return Err(P2pError::Shutdown);
        }
        while connections.try_join_next().is_some() {}
        connections.spawn(async move {
            let _permit = permit;
            shared.run_connection(peer, established).await;
        });
        Ok(())
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        let accepted = tokio::select! {
            res = listener.accept() => res,
            _ = wait_until_set(shared.shutdown.subscribe()) => break,
        };
        match accepted {
            Ok((stream, addr)) => {
                let permit = match shared.admit() {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!(peer = %addr, error = %e, "rejecting incoming connection");
                        continue;
                    }
                };
                match TcpPeer::new(stream, false) {
                    Ok(peer) => {
                        debug!(peer = %addr, "new incoming connection");
                        if shared.spawn_connection(Arc::new(peer), permit, false).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(peer = %addr, error = %e, "failed to set up incoming connection"),
                }
            }
            Err(e) => {
                warn!(error = %e, "TCP accept error");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
    debug!("accept loop stopped");
}

/// TCP transport: one accept loop, one task per connection, and a single
/// bounded channel carrying every decoded message to the consumer.
///
/// Messages from one peer arrive in the order they were decoded. There is no
/// ordering across peers. A consumer that stops reading eventually stalls
/// every peer's decode loop.
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig, opts: TcpTransportOpts) -> Self {
        let (rpc_tx, rpc_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let limiter = config.max_connections.map(|n| Arc::new(Semaphore::new(n)));
        Self {
            shared: Arc::new(Shared {
                config,
                opts,
                rpc_tx: Mutex::new(Some(rpc_tx)),
                rpc_rx: Mutex::new(Some(rpc_rx)),
                peers: RwLock::new(HashMap::new()),
                limiter,
                shutdown,
                listener: Mutex::new(ListenerState::default()),
                connections: AsyncMutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.shared.config
    }

    /// Bind the configured address and start the accept loop in the
    /// background. Returns the bound address.
    pub async fn listen_and_accept(&self) -> P2pResult<SocketAddr> {
        if self.shared.is_shut_down() {
            return Err(P2pError::Shutdown);
        }
        if let Some(addr) = self.local_addr() {
            return Err(P2pError::AlreadyListening(addr));
        }

        let listen_addr = &self.shared.config.listen_addr;
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| P2pError::Bind {
                addr: listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        {
            let mut state = self.shared.listener.lock().expect("listener lock poisoned");
            if let Some(addr) = state.local_addr {
                return Err(P2pError::AlreadyListening(addr));
            }
            state.local_addr = Some(local_addr);
            state.accept_task = Some(tokio::spawn(accept_loop(Arc::clone(&self.shared), listener)));
        }

        info!(addr = %local_addr, "listening for peers");
        Ok(local_addr)
    }

    /// Connect to `addr`, run the handshake and peer callback, and start the
    /// peer's decode loop. Returns the peer for sending.
    pub async fn dial(&self, addr: &str) -> P2pResult<Arc<TcpPeer>> {
        if self.shared.is_shut_down() {
            return Err(P2pError::Shutdown);
        }
        let permit = self.shared.admit()?;
        let stream = TcpStream::connect(addr).await?;
        let peer = Arc::new(TcpPeer::new(stream, true)?);

        let shutdown = self.shared.shutdown.subscribe();
        let established = tokio::select! {
            res = self.shared.establish(&peer) => res,
            _ = wait_until_set(shutdown) => Err(P2pError::Shutdown),
        };
        let spawned = match established {
            Ok(()) => {
                self.shared
                    .spawn_connection(Arc::clone(&peer), permit, true)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = spawned {
            self.shared.unregister(&peer);
            peer.close().await;
            return Err(e);
        }

        debug!(peer = %peer.remote_addr(), "dialed peer");
        Ok(peer)
    }

    /// Hand out the receiving end of the inbound channel. Only the first call
    /// succeeds.
    pub fn consume(&self) -> P2pResult<mpsc::Receiver<Rpc>> {
        self.shared
            .rpc_rx
            .lock()
            .expect("inbound receiver lock poisoned")
            .take()
            .ok_or(P2pError::ConsumerTaken)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .listener
            .lock()
            .expect("listener lock poisoned")
            .local_addr
    }

    /// Live peers, in no particular order.
    pub fn peers(&self) -> Vec<Arc<TcpPeer>> {
        self.shared
            .peers
            .read()
            .expect("peer set lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn peer(&self, addr: SocketAddr) -> Option<Arc<TcpPeer>> {
        self.shared
            .peers
            .read()
            .expect("peer set lock poisoned")
            .get(&addr)
            .cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.shared.peers.read().expect("peer set lock poisoned").len()
    }

    /// Graceful shutdown: stop the accept loop, end every connection task and
    /// wait for them. Idempotent.
    pub async fn close(&self) {
        if self.shared.shutdown.send_replace(true) {
            return;
        }

        let accept_task = self
            .shared
            .listener
            .lock()
            .expect("listener lock poisoned")
            .accept_task
            .take();
        if let Some(task) = accept_task {
            if let Err(e) = task.await {
                warn!(error = %e, "accept loop ended abnormally");
            }
        }

        self.shared
            .rpc_tx
            .lock()
            .expect("inbound sender lock poisoned")
            .take();

        let mut connections = std::mem::take(&mut *self.shared.connections.lock().await);
        while connections.join_next().await.is_some() {}

        let leftover: Vec<_> = self
            .shared
            .peers
            .write()
            .expect("peer set lock poisoned")
            .drain()
            .map(|(_, peer)| peer)
            .collect();
        for peer in leftover {
            peer.close().await;
        }

        info!("transport closed");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        // background tasks hold the shared state; tell them to stop
        self.shared.shutdown.send_replace(true);
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Peer = TcpPeer;

    async fn listen_and_accept(&self) -> P2pResult<SocketAddr> {
        TcpTransport::listen_and_accept(self).await
    }

    async fn dial(&self, addr: &str) -> P2pResult<Arc<TcpPeer>> {
        TcpTransport::dial(self, addr).await
    }

    fn consume(&self) -> P2pResult<mpsc::Receiver<Rpc>> {
        TcpTransport::consume(self)
    }

    async fn close(&self) {
        TcpTransport::close(self).await
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        TcpTransport::local_addr(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::decoder::RawDecoder;
    use crate::handshake::VersionHandshake;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> TcpTransportConfig {
        TcpTransportConfig::new("127.0.0.1:0")
    }

    async fn start(
        config: TcpTransportConfig,
        opts: TcpTransportOpts,
    ) -> (TcpTransport, SocketAddr, mpsc::Receiver<Rpc>) {
        let transport = TcpTransport::new(config, opts);
        let addr = transport.listen_and_accept().await.unwrap();
        let rx = transport.consume().unwrap();
        (transport, addr, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Rpc>) -> Rpc {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("inbound channel closed")
    }

    async fn assert_nothing_delivered(rx: &mut mpsc::Receiver<Rpc>) {
        let res = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(res.is_err(), "unexpected message: {res:?}");
    }

    async fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
        let frame = FrameCodec::encode(payload).unwrap();
        stream.write_all(&frame).await.unwrap();
    }

    /// Everything the server sent before closing the connection.
    async fn read_until_eof(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        // a reset counts as closed too
        let _ = timeout(WAIT, stream.read_to_end(&mut buf))
            .await
            .expect("connection was not closed");
        buf
    }

    struct Recording {
        seen: Mutex<Vec<(SocketAddr, bool)>>,
    }

    #[async_trait]
    impl PeerHandler for Recording {
        async fn on_peer(&self, peer: Arc<TcpPeer>) -> P2pResult<()> {
            self.seen
                .lock()
                .unwrap()
                .push((peer.remote_addr(), peer.is_outbound()));
            Ok(())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl PeerHandler for RejectAll {
        async fn on_peer(&self, _peer: Arc<TcpPeer>) -> P2pResult<()> {
            Err(P2pError::PeerRejected("not welcome".into()))
        }
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delivers_messages_in_order_with_origin() {
        let (_transport, addr, mut rx) = start(config(), TcpTransportOpts::default()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let client_addr = client.local_addr().unwrap();

        for payload in [b"m1", b"m2", b"m3"] {
            send_frame(&mut client, payload).await;
        }
        for expected in [b"m1", b"m2", b"m3"] {
            let rpc = recv(&mut rx).await;
            assert_eq!(rpc.payload, &expected[..]);
            assert_eq!(rpc.from, client_addr);
        }
    }

    #[tokio::test]
    async fn failing_peer_does_not_block_others() {
        let (_transport, addr, mut rx) = start(config(), TcpTransportOpts::default()).await;
        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        send_frame(&mut a, b"from a").await;
        assert_eq!(recv(&mut rx).await.payload, &b"from a"[..]);

        // a dies in the middle of a frame
        a.write_all(&[0, 0, 0, 50, 1, 2]).await.unwrap();
        drop(a);

        send_frame(&mut b, b"from b").await;
        let rpc = recv(&mut rx).await;
        assert_eq!(rpc.payload, &b"from b"[..]);
        assert_eq!(rpc.from, b_addr);
    }

    #[tokio::test]
    async fn raw_decoder_delivers_bytes_as_read() {
        let opts = TcpTransportOpts::default().with_decoder(Arc::new(RawDecoder::default()));
        let (_transport, addr, mut rx) = start(config(), opts).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        assert_eq!(recv(&mut rx).await.payload, &b"hello"[..]);
    }

    // -----------------------------------------------------------------------
    // Handshake and peer callback
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn handshake_rejection_closes_connection() {
        let opts = TcpTransportOpts::default().with_handshake(Arc::new(VersionHandshake::new(1)));
        let (transport, addr, mut rx) = start(config(), opts).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GGNW\x02").await.unwrap();

        assert_eq!(read_until_eof(&mut client).await, b"GGNW\x01");
        assert_nothing_delivered(&mut rx).await;
        assert_eq!(transport.peer_count(), 0);
    }

    #[tokio::test]
    async fn handshake_timeout_closes_silent_connection() {
        let mut cfg = config();
        cfg.handshake_timeout_ms = Some(100);
        let opts = TcpTransportOpts::default().with_handshake(Arc::new(VersionHandshake::new(1)));
        let (transport, addr, _rx) = start(cfg, opts).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(read_until_eof(&mut client).await, b"GGNW\x01");
        assert_eq!(transport.peer_count(), 0);
    }

    #[tokio::test]
    async fn peer_handler_rejection_closes_connection() {
        let opts = TcpTransportOpts::default().with_peer_handler(Arc::new(RejectAll));
        let (transport, addr, mut rx) = start(config(), opts).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        assert!(read_until_eof(&mut client).await.is_empty());
        assert_nothing_delivered(&mut rx).await;
        assert_eq!(transport.peer_count(), 0);
    }

    #[tokio::test]
    async fn peer_handler_sees_inbound_peer() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let opts = TcpTransportOpts::default().with_peer_handler(recording.clone());
        let (transport, addr, mut rx) = start(config(), opts).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let client_addr = client.local_addr().unwrap();
        send_frame(&mut client, b"hi").await;
        recv(&mut rx).await;

        assert_eq!(*recording.seen.lock().unwrap(), vec![(client_addr, false)]);
        let peer = transport.peer(client_addr).expect("peer should be registered");
        assert!(!peer.is_outbound());
        assert_eq!(transport.peers().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Dialing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn dial_connects_two_transports() {
        let handshake: Arc<dyn Handshake> = Arc::new(VersionHandshake::new(7));
        let opts = TcpTransportOpts::default().with_handshake(handshake);
        let (server, server_addr, mut server_rx) = start(config(), opts.clone()).await;

        let client = TcpTransport::new(config(), opts);
        let mut client_rx = client.consume().unwrap();
        let peer = client.dial(&server_addr.to_string()).await.unwrap();
        assert!(peer.is_outbound());
        assert_eq!(peer.remote_addr(), server_addr);
        assert_eq!(client.peer_count(), 1);

        peer.send_frame(b"ping").await.unwrap();
        let rpc = recv(&mut server_rx).await;
        assert_eq!(rpc.payload, &b"ping"[..]);
        assert_eq!(rpc.from, peer.local_addr());

        let inbound = server.peer(peer.local_addr()).expect("server registered the peer");
        assert!(!inbound.is_outbound());
        inbound.send_frame(b"pong").await.unwrap();
        let reply = recv(&mut client_rx).await;
        assert_eq!(reply.payload, &b"pong"[..]);
        assert_eq!(reply.from, server_addr);
    }

    #[tokio::test]
    async fn dial_with_mismatched_handshake_fails() {
        let server_opts =
            TcpTransportOpts::default().with_handshake(Arc::new(VersionHandshake::new(1)));
        let (_server, server_addr, _rx) = start(config(), server_opts).await;

        let client_opts =
            TcpTransportOpts::default().with_handshake(Arc::new(VersionHandshake::new(2)));
        let client = TcpTransport::new(config(), client_opts);
        let err = client.dial(&server_addr.to_string()).await.unwrap_err();
        assert!(matches!(err, P2pError::HandshakeFailed(_)), "{err}");
        assert_eq!(client.peer_count(), 0);
    }

    #[tokio::test]
    async fn second_dial_to_same_address_is_refused() {
        let (_server, server_addr, mut server_rx) =
            start(config(), TcpTransportOpts::default()).await;
        let client = TcpTransport::new(config(), TcpTransportOpts::default());

        let first = client.dial(&server_addr.to_string()).await.unwrap();
        let err = client.dial(&server_addr.to_string()).await.unwrap_err();
        assert!(matches!(err, P2pError::AlreadyConnected(a) if a == server_addr), "{err}");

        assert!(!first.is_closed());
        assert_eq!(client.peer_count(), 1);
        let registered = client.peer(server_addr).expect("first peer stays registered");
        assert!(Arc::ptr_eq(&registered, &first));

        first.send_frame(b"still up").await.unwrap();
        assert_eq!(recv(&mut server_rx).await.payload, &b"still up"[..]);
    }

    #[tokio::test]
    async fn close_interrupts_dial_during_handshake() {
        // accepts, then never answers the handshake
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let (stream, _) = silent.accept().await.unwrap();
            tokio::time::sleep(WAIT * 2).await;
            drop(stream);
        });

        let opts = TcpTransportOpts::default().with_handshake(Arc::new(VersionHandshake::new(1)));
        let transport = Arc::new(TcpTransport::new(config(), opts));
        let dialing = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.dial(&silent_addr.to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        timeout(WAIT, transport.close()).await.expect("close should finish");
        let res = timeout(WAIT, dialing)
            .await
            .expect("dial should stop once the transport closes")
            .unwrap();
        assert!(matches!(res, Err(P2pError::Shutdown)), "{res:?}");
        assert_eq!(transport.peer_count(), 0);
        holder.abort();
    }

    // -----------------------------------------------------------------------
    // Connection limit
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn connection_limit_rejects_extra_inbound() {
        let mut cfg = config();
        cfg.max_connections = Some(1);
        let (_transport, addr, mut rx) = start(cfg, TcpTransportOpts::default()).await;

        let mut first = TcpStream::connect(addr).await.unwrap();
        send_frame(&mut first, b"admitted").await;
        recv(&mut rx).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert!(read_until_eof(&mut second).await.is_empty());

        send_frame(&mut first, b"still here").await;
        assert_eq!(recv(&mut rx).await.payload, &b"still here"[..]);
    }

    #[tokio::test]
    async fn connection_limit_applies_to_dial() {
        let (_server, server_addr, _rx) = start(config(), TcpTransportOpts::default()).await;

        let mut cfg = config();
        cfg.max_connections = Some(1);
        let client = TcpTransport::new(cfg, TcpTransportOpts::default());
        let _peer = client.dial(&server_addr.to_string()).await.unwrap();
        let err = client.dial(&server_addr.to_string()).await.unwrap_err();
        assert!(matches!(err, P2pError::ConnectionLimit(1)));
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn close_ends_connections_and_channel() {
        let (transport, addr, mut rx) = start(config(), TcpTransportOpts::default()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        send_frame(&mut client, b"before close").await;
        recv(&mut rx).await;

        timeout(WAIT, transport.close()).await.expect("close should finish");

        assert!(read_until_eof(&mut client).await.is_empty());
        assert_eq!(transport.peer_count(), 0);
        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
        assert!(matches!(transport.listen_and_accept().await, Err(P2pError::Shutdown)));
        assert!(matches!(
            transport.dial(&addr.to_string()).await,
            Err(P2pError::Shutdown)
        ));
        // closing twice is harmless
        transport.close().await;
    }

    #[tokio::test]
    async fn close_finishes_while_consumer_is_stalled() {
        let mut cfg = config();
        cfg.inbound_capacity = 1;
        let transport = TcpTransport::new(cfg, TcpTransportOpts::default());
        let addr = transport.listen_and_accept().await.unwrap();

        // nobody consumes, so the decode loop blocks on the full channel
        let mut client = TcpStream::connect(addr).await.unwrap();
        for i in 0..5u8 {
            send_frame(&mut client, &[i]).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(WAIT, transport.close()).await.expect("close should not hang");
        assert_eq!(transport.peer_count(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_returned() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap().to_string();
        let transport = TcpTransport::new(TcpTransportConfig::new(taken.clone()), TcpTransportOpts::default());
        match transport.listen_and_accept().await {
            Err(P2pError::Bind { addr, .. }) => assert_eq!(addr, taken),
            other => panic!("expected bind error, got {other:?}"),
        }

        let transport = TcpTransport::new(
            TcpTransportConfig::new("not an address"),
            TcpTransportOpts::default(),
        );
        assert!(matches!(
            transport.listen_and_accept().await,
            Err(P2pError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn listen_twice_is_an_error() {
        let (transport, addr, _rx) = start(config(), TcpTransportOpts::default()).await;
        assert_eq!(transport.local_addr(), Some(addr));
        assert!(matches!(
            transport.listen_and_accept().await,
            Err(P2pError::AlreadyListening(a)) if a == addr
        ));
    }

    #[tokio::test]
    async fn consume_only_once() {
        let transport = TcpTransport::new(config(), TcpTransportOpts::default());
        transport.consume().unwrap();
        assert!(matches!(transport.consume(), Err(P2pError::ConsumerTaken)));
    }

    #[tokio::test]
    async fn usable_through_transport_trait() {
        async fn bring_up<T: Transport>(transport: &T) -> SocketAddr {
            transport.listen_and_accept().await.unwrap()
        }

        let transport = TcpTransport::new(config(), TcpTransportOpts::default());
        let addr = bring_up(&transport).await;
        assert_eq!(Transport::local_addr(&transport), Some(addr));
        Transport::close(&transport).await;
    }
}
