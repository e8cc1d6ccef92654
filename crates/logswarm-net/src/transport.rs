//! TCP transport layer
//!
//! Provides authenticated, encrypted connections between nodes sharing a
//! discovery topic. Every connection starts with a signed handshake; after
//! that all frames are sealed with per-session keys.

use crate::crypto::{CryptoError, EphemeralKeyExchange, FrameOpener, FrameSealer, KeyPair, SessionKeys};
use crate::framing::{Frame, FrameCodec, FrameError, FrameType};
use crate::peer::{ConnectionState, PeerId, PeerInfo};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use logswarm_core::types::Topic;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use x25519_dalek::PublicKey as X25519Public;

use self::messages::{Handshake, WireMessage};

/// How long a peer gets to answer our handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Outgoing frames queued per connection
const CONNECTION_QUEUE: usize = 256;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),
    #[error("Handshake timed out")]
    HandshakeTimeout,
    #[error("Peer is on another topic")]
    TopicMismatch,
    #[error("Refusing connection to ourselves")]
    SelfConnection,
    #[error("Unexpected frame: {0:?}")]
    UnexpectedFrame(FrameType),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),
    #[error("Already connected to peer: {0}")]
    AlreadyConnected(PeerId),
    #[error("Send queue to {0} is full")]
    QueueFull(PeerId),
}

/// Connection to a peer
pub struct Connection {
    /// Peer info
    pub peer: PeerInfo,
    /// Send channel (drained by the writer task)
    tx: mpsc::Sender<Frame>,
    /// Lifecycle state
    state: RwLock<ConnectionState>,
    /// Wakes the connection task on close
    closed: Notify,
}

impl Connection {
    fn new(peer: PeerInfo, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            peer,
            tx,
            state: RwLock::new(ConnectionState::Connecting),
            closed: Notify::new(),
        }
    }

    /// Peer that dialed this connection
    fn dialer(&self, our_id: PeerId) -> PeerId {
        if self.peer.outbound {
            our_id
        } else {
            self.peer.id
        }
    }

    /// Send a frame to this peer
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Queue a frame without waiting for room
    pub fn try_send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull(self.peer.id),
            mpsc::error::TrySendError::Closed(_) => TransportError::ConnectionClosed,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connection is open
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn open(&self) {
        *self.state.write() = ConnectionState::Open;
    }

    /// Close the connection and stop its task
    pub fn close(&self) {
        *self.state.write() = ConnectionState::Closed;
        self.closed.notify_one();
    }
}

/// Event from the transport layer
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake completed, peer is open
    PeerConnected(PeerId),
    /// Peer disconnected
    PeerDisconnected(PeerId),
    /// Frame received from peer (already decrypted)
    FrameReceived { from: PeerId, frame: Frame },
}

/// A verified connection that has not been admitted yet
struct Established {
    framed: Framed<TcpStream, FrameCodec>,
    info: PeerInfo,
    sealer: FrameSealer,
    opener: FrameOpener,
}

/// Transport layer managing connections
pub struct Transport {
    /// Our keypair
    keypair: KeyPair,
    /// Our peer ID
    our_id: PeerId,
    /// Discovery topic; peers on other topics are refused
    topic: Topic,
    /// Bound listen address, once listening
    local_addr: RwLock<Option<SocketAddr>>,
    /// Connected peers
    connections: RwLock<HashMap<PeerId, Arc<Connection>>>,
    /// Events for the node
    event_tx: mpsc::Sender<TransportEvent>,
    /// Accept loop and connection tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Transport {
    /// Create a new transport and the receiver for its events
    pub fn new(
        keypair: KeyPair,
        topic: Topic,
        event_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
        let our_id = PeerId::from_public_key(&keypair.public_key());
        let transport = Arc::new(Self {
            keypair,
            our_id,
            topic,
            local_addr: RwLock::new(None),
            connections: RwLock::new(HashMap::new()),
            event_tx,
            tasks: Mutex::new(Vec::new()),
        });
        (transport, event_rx)
    }

    /// Get our peer ID
    pub fn our_id(&self) -> PeerId {
        self.our_id
    }

    /// Get our public key
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// Get the discovery topic
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Address we are listening on, if any
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// List connected peers
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.connections
            .read()
            .iter()
            .filter(|(_, c)| c.is_open())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of open connections
    pub fn peer_count(&self) -> usize {
        self.connections.read().values().filter(|c| c.is_open()).count()
    }

    /// Check if connected to a peer
    pub fn is_connected(&self, id: &PeerId) -> bool {
        self.connections
            .read()
            .get(id)
            .map(|c| c.is_open())
            .unwrap_or(false)
    }

    /// Get info about a connected peer
    pub fn peer_info(&self, id: &PeerId) -> Option<PeerInfo> {
        self.connections.read().get(id).map(|c| c.peer.clone())
    }

    /// Send a frame to a peer
    pub async fn send(&self, to: &PeerId, frame: Frame) -> Result<(), TransportError> {
        let conn = self
            .connections
            .read()
            .get(to)
            .cloned()
            .ok_or(TransportError::PeerNotFound(*to))?;

        conn.send(frame).await
    }

    /// Broadcast a frame to all connected peers
    pub async fn broadcast(&self, frame: Frame) {
        let connections: Vec<_> = self
            .connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect();
        for conn in connections {
            if let Err(e) = conn.send(frame.clone()).await {
                warn!("Failed to broadcast to {}: {}", conn.peer.id, e);
            }
        }
    }

    /// Broadcast without waiting; peers whose queue is full miss the frame
    pub fn try_broadcast(&self, frame: Frame) -> usize {
        let connections: Vec<_> = self
            .connections
            .read()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect();
        let mut delivered = 0;
        for conn in connections {
            match conn.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Skipped {:?} frame to {}: {}", frame.frame_type, conn.peer.id, e),
            }
        }
        delivered
    }

    /// Bind a listener and start accepting connections
    pub async fn listen(self: &Arc<Self>, addr: SocketAddr) -> Result<SocketAddr, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        *self.local_addr.write() = Some(local);
        info!("Transport listening on {}", local);

        let transport = Arc::clone(self);
        let handle = tokio::spawn(async move { transport.accept_loop(listener).await });
        self.track(handle);
        Ok(local)
    }

    /// Dial a peer; returns once the handshake is verified
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<PeerId, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        let established = self.handshake(stream, addr, true).await?;
        let peer_id = established.info.id;
        let (conn, rx) = self.admit(&established.info)?;

        let transport = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Err(e) = transport.drive(conn, rx, established).await {
                warn!("Connection error to {}: {}", addr, e);
            }
        });
        self.track(handle);
        Ok(peer_id)
    }

    /// Close every connection and stop all transport tasks
    pub fn shutdown(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        let connections: Vec<_> = self.connections.write().drain().map(|(_, c)| c).collect();
        for conn in connections {
            conn.close();
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Accepted connection from {}", addr);
                    let transport = Arc::clone(&self);
                    let handle = tokio::spawn(async move {
                        if let Err(e) = transport.accept_one(stream, addr).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                    self.track(handle);
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn accept_one(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<(), TransportError> {
        let established = self.handshake(stream, addr, false).await?;
        let (conn, rx) = self.admit(&established.info)?;
        self.drive(conn, rx, established).await
    }

    /// Exchange signed handshakes and derive session keys
    async fn handshake(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        outbound: bool,
    ) -> Result<Established, TransportError> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let exchange = EphemeralKeyExchange::new();

        let ours = Handshake::sign(&self.keypair, self.topic, exchange.public_key());
        framed.send(ours.to_frame()?).await?;

        let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next())
            .await
            .map_err(|_| TransportError::HandshakeTimeout)?
            .ok_or(TransportError::ConnectionClosed)??;
        if frame.frame_type != FrameType::Handshake {
            return Err(TransportError::UnexpectedFrame(frame.frame_type));
        }

        let theirs = Handshake::from_frame(&frame)?;
        theirs.verify(&self.topic)?;

        let peer_id = PeerId::from_public_key(&theirs.transport_pubkey);
        if peer_id == self.our_id {
            return Err(TransportError::SelfConnection);
        }

        let our_public = X25519Public::from(exchange.public_key());
        let their_public = X25519Public::from(theirs.ephemeral_pubkey);
        let shared = exchange.exchange(&theirs.ephemeral_pubkey);
        let (sealer, opener) =
            SessionKeys::derive(&shared, &our_public, &their_public, &self.topic.0)?.split()?;

        debug!("Handshake complete with {} ({})", peer_id, addr);
        Ok(Established {
            framed,
            info: PeerInfo::new(peer_id, addr, outbound),
            sealer,
            opener,
        })
    }

    /// Register a verified peer; at most one live connection per peer.
    ///
    /// When both sides dial at once, each side keeps the connection dialed
    /// by the lower peer id, so both settle on the same one.
    fn admit(&self, info: &PeerInfo) -> Result<(Arc<Connection>, mpsc::Receiver<Frame>), TransportError> {
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE);
        let conn = Arc::new(Connection::new(info.clone(), tx));

        let mut connections = self.connections.write();
        if let Some(existing) = connections.get(&info.id).filter(|c| c.is_open()) {
            if conn.dialer(self.our_id) >= existing.dialer(self.our_id) {
                return Err(TransportError::AlreadyConnected(info.id));
            }
            debug!("Replacing connection to {} with the one dialed by the lower id", info.id);
            existing.close();
        }
        conn.open();
        connections.insert(info.id, Arc::clone(&conn));
        Ok((conn, rx))
    }

    /// Pump frames until either side closes
    async fn drive(
        &self,
        conn: Arc<Connection>,
        mut rx: mpsc::Receiver<Frame>,
        established: Established,
    ) -> Result<(), TransportError> {
        let Established {
            framed,
            info,
            mut sealer,
            mut opener,
        } = established;
        let peer_id = info.id;
        let (mut sink, mut stream) = framed.split();

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let sealed = match sealer.seal(&frame.payload, &[frame.frame_type as u8]) {
                    Ok(sealed) => sealed,
                    Err(e) => {
                        warn!("Failed to seal frame for {}: {}", peer_id, e);
                        break;
                    }
                };
                if let Err(e) = sink.send(Frame::new(frame.frame_type, sealed)).await {
                    debug!("Write to {} failed: {}", peer_id, e);
                    break;
                }
            }
        });

        info!("Peer connected: {} ({})", peer_id, info.addr);
        let _ = self.event_tx.send(TransportEvent::PeerConnected(peer_id)).await;

        let result = tokio::select! {
            result = self.read_loop(peer_id, &mut stream, &mut opener) => result,
            _ = conn.closed.notified() => Ok(()),
        };

        writer.abort();
        conn.close();
        let removed = {
            let mut connections = self.connections.write();
            let current = connections.get(&peer_id).map(|c| Arc::ptr_eq(c, &conn)).unwrap_or(false);
            if current {
                connections.remove(&peer_id);
            }
            current
        };
        // A replaced connection leaves the peer connected
        if removed {
            info!("Peer disconnected: {}", peer_id);
            let _ = self.event_tx.send(TransportEvent::PeerDisconnected(peer_id)).await;
        } else {
            debug!("Superseded connection to {} closed", peer_id);
        }

        result
    }

    async fn read_loop(
        &self,
        peer_id: PeerId,
        stream: &mut SplitStream<Framed<TcpStream, FrameCodec>>,
        opener: &mut FrameOpener,
    ) -> Result<(), TransportError> {
        while let Some(frame) = stream.next().await {
            let frame = frame?;
            if frame.frame_type == FrameType::Handshake {
                return Err(TransportError::UnexpectedFrame(frame.frame_type));
            }
            let payload = opener.open(&frame.payload, &[frame.frame_type as u8])?;
            let event = TransportEvent::FrameReceived {
                from: peer_id,
                frame: Frame::new(frame.frame_type, payload),
            };
            if self.event_tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Message serialization helpers
pub mod messages {
    use super::*;
    use logswarm_core::crypto::handshake_signing_bytes;
    use logswarm_core::types::{LogId, SignedEntry};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};

    /// A message carried in exactly one frame type
    pub trait WireMessage: Serialize + DeserializeOwned {
        const FRAME_TYPE: FrameType;

        fn to_frame(&self) -> Result<Frame, postcard::Error> {
            let payload = postcard::to_allocvec(self)?;
            Ok(Frame::new(Self::FRAME_TYPE, payload))
        }

        fn from_frame(frame: &Frame) -> Result<Self, postcard::Error> {
            postcard::from_bytes(&frame.payload)
        }
    }

    /// Connection handshake
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct Handshake {
        pub transport_pubkey: [u8; 32],
        pub topic: Topic,
        pub ephemeral_pubkey: [u8; 32],
        /// Ed25519 signature over `handshake_signing_bytes(topic, ephemeral_pubkey)`
        pub signature: Vec<u8>,
    }

    impl Handshake {
        pub fn sign(keypair: &KeyPair, topic: Topic, ephemeral_pubkey: [u8; 32]) -> Self {
            let signature = keypair.sign(&handshake_signing_bytes(&topic, &ephemeral_pubkey));
            Self {
                transport_pubkey: keypair.public_key(),
                topic,
                ephemeral_pubkey,
                signature: signature.to_vec(),
            }
        }

        /// Check the topic and that the sender owns the transport key
        pub fn verify(&self, topic: &Topic) -> Result<(), TransportError> {
            if &self.topic != topic {
                return Err(TransportError::TopicMismatch);
            }
            let message = handshake_signing_bytes(&self.topic, &self.ephemeral_pubkey);
            KeyPair::verify(&self.transport_pubkey, &message, &self.signature)
                .map_err(|e| TransportError::InvalidHandshake(e.to_string()))
        }
    }

    /// Message on a named extension channel
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct ExtensionMessage {
        pub channel: String,
        pub payload: Vec<u8>,
    }

    /// Announces how many entries of a log the sender holds
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Have {
        pub log: LogId,
        pub length: u64,
    }

    /// Asks for entries of a log starting at `start`
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Request {
        pub log: LogId,
        pub start: u64,
    }

    /// Contiguous signed entries of a log
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Data {
        pub log: LogId,
        pub entries: Vec<SignedEntry>,
    }

    impl WireMessage for Handshake {
        const FRAME_TYPE: FrameType = FrameType::Handshake;
    }

    impl WireMessage for ExtensionMessage {
        const FRAME_TYPE: FrameType = FrameType::Extension;
    }

    impl WireMessage for Have {
        const FRAME_TYPE: FrameType = FrameType::Have;
    }

    impl WireMessage for Request {
        const FRAME_TYPE: FrameType = FrameType::Request;
    }

    impl WireMessage for Data {
        const FRAME_TYPE: FrameType = FrameType::Data;
    }
}

#[cfg(test)]
mod tests {
    use super::messages::*;
    use super::*;
    use logswarm_core::crypto::derive_topic;
    use tokio::time::timeout;

    async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("transport event channel closed")
    }

    #[test]
    fn test_handshake_verification() {
        let keypair = KeyPair::generate();
        let topic = derive_topic("test topic");
        let handshake = Handshake::sign(&keypair, topic, [5; 32]);

        assert!(handshake.verify(&topic).is_ok());
        assert!(matches!(
            handshake.verify(&derive_topic("other topic")),
            Err(TransportError::TopicMismatch)
        ));

        let mut forged = handshake.clone();
        forged.ephemeral_pubkey = [6; 32];
        assert!(matches!(
            forged.verify(&topic),
            Err(TransportError::InvalidHandshake(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_and_exchange_frames() {
        let topic = derive_topic("transport test");
        let (a, mut a_events) = Transport::new(KeyPair::generate(), topic, 16);
        let (b, mut b_events) = Transport::new(KeyPair::generate(), topic, 16);

        let addr = b.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_id = a.connect(addr).await.unwrap();
        assert_eq!(b_id, b.our_id());
        assert!(a.is_connected(&b_id));
        assert!(a.peer_info(&b_id).unwrap().outbound);

        assert!(matches!(next_event(&mut a_events).await, TransportEvent::PeerConnected(id) if id == b.our_id()));
        assert!(matches!(next_event(&mut b_events).await, TransportEvent::PeerConnected(id) if id == a.our_id()));

        let have = Have {
            log: logswarm_core::types::LogId([1; 32]),
            length: 3,
        };
        a.send(&b_id, have.to_frame().unwrap()).await.unwrap();

        match next_event(&mut b_events).await {
            TransportEvent::FrameReceived { from, frame } => {
                assert_eq!(from, a.our_id());
                assert_eq!(frame.frame_type, FrameType::Have);
                assert_eq!(Have::from_frame(&frame).unwrap(), have);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_topic_mismatch_refused() {
        let (a, _a_events) = Transport::new(KeyPair::generate(), derive_topic("one"), 16);
        let (b, _b_events) = Transport::new(KeyPair::generate(), derive_topic("two"), 16);

        let addr = b.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(matches!(
            a.connect(addr).await,
            Err(TransportError::TopicMismatch)
        ));
        assert_eq!(a.peer_count(), 0);

        b.shutdown();
    }

    #[tokio::test]
    async fn test_self_connection_refused() {
        let (a, _a_events) = Transport::new(KeyPair::generate(), derive_topic("self"), 16);
        let addr = a.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(matches!(
            a.connect(addr).await,
            Err(TransportError::SelfConnection)
        ));
        a.shutdown();
    }

    async fn next_frame(rx: &mut mpsc::Receiver<TransportEvent>) -> (PeerId, Frame) {
        loop {
            if let TransportEvent::FrameReceived { from, frame } = next_event(rx).await {
                return (from, frame);
            }
        }
    }

    #[tokio::test]
    async fn test_simultaneous_dials_keep_one_link() {
        let topic = derive_topic("crossed dials");
        let (a, mut a_events) = Transport::new(KeyPair::generate(), topic, 64);
        let (b, mut b_events) = Transport::new(KeyPair::generate(), topic, 64);
        let a_addr = a.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = b.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();

        // Either dial may lose the tie-break; only the surviving link matters
        let _ = tokio::join!(a.connect(b_addr), b.connect(a_addr));

        timeout(Duration::from_secs(5), async {
            while !(a.is_connected(&b.our_id()) && b.is_connected(&a.our_id())) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("peers never settled on a connection");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(a.peer_count(), 1);
        assert_eq!(b.peer_count(), 1);

        let have = Have {
            log: logswarm_core::types::LogId([2; 32]),
            length: 1,
        };
        a.send(&b.our_id(), have.to_frame().unwrap()).await.unwrap();
        let (from, frame) = next_frame(&mut b_events).await;
        assert_eq!(from, a.our_id());
        assert_eq!(Have::from_frame(&frame).unwrap(), have);

        b.send(&a.our_id(), have.to_frame().unwrap()).await.unwrap();
        let (from, _) = next_frame(&mut a_events).await;
        assert_eq!(from, b.our_id());

        a.shutdown();
        b.shutdown();
    }

    #[tokio::test]
    async fn test_try_broadcast_reaches_open_peers() {
        let topic = derive_topic("try broadcast");
        let (a, _a_events) = Transport::new(KeyPair::generate(), topic, 16);
        let (b, mut b_events) = Transport::new(KeyPair::generate(), topic, 16);

        assert_eq!(a.try_broadcast(Frame::new(FrameType::Have, vec![])), 0);

        let addr = b.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        a.connect(addr).await.unwrap();

        let have = Have {
            log: logswarm_core::types::LogId([3; 32]),
            length: 7,
        };
        assert_eq!(a.try_broadcast(have.to_frame().unwrap()), 1);
        let (from, frame) = next_frame(&mut b_events).await;
        assert_eq!(from, a.our_id());
        assert_eq!(Have::from_frame(&frame).unwrap(), have);

        a.shutdown();
        b.shutdown();
    }
}
