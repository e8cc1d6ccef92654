//! logswarm node - the application facade and its event loop

use crate::config::Config;
use crate::discovery::{DiscoveryGossiper, DISCOVERY_CHANNEL};
use crate::events::{AppEvent, EventReceiver, EventSender};
use crate::log::{LogError, LogHandle};
use crate::outbound::Outbound;
use crate::registry::LogRegistry;
use crate::replication::{ReplicationError, Replicator};
use crate::store::LogStore;
use crate::watcher::Watchers;
use logswarm_core::crypto::KeyPair;
use logswarm_core::types::{LogId, Record};
use logswarm_net::channel::ExtensionChannel;
use logswarm_net::framing::{Frame, FrameType};
use logswarm_net::peer::{PeerId, PeerInfo};
use logswarm_net::transport::messages::{ExtensionMessage, WireMessage};
use logswarm_net::transport::{Transport, TransportError, TransportEvent};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Log error: {0}")]
    Log(#[from] LogError),
    #[error("Replication error: {0}")]
    Replication(#[from] ReplicationError),
    #[error("Node is shut down")]
    Shutdown,
}

/// Node statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    pub peers: usize,
    pub known_logs: usize,
    pub watchers: usize,
    pub local_length: u64,
}

struct NodeInner {
    transport: Arc<Transport>,
    store: Arc<LogStore>,
    registry: Arc<LogRegistry>,
    gossiper: DiscoveryGossiper,
    replicator: Replicator,
    watchers: Watchers,
    local_log: LogHandle,
    events: EventSender,
    /// Shutdown signal for the event loop
    shutdown_tx: broadcast::Sender<()>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

/// A running logswarm node.
///
/// Dropping the node tears it down the same way [`Node::shutdown`] does.
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Start a node: open our log, listen, dial the configured peers.
    ///
    /// Returns the node and the receiver for its application events. The
    /// first event is always `Discovered` for our own log.
    pub async fn start(config: Config) -> Result<(Self, EventReceiver), NodeError> {
        config
            .validate()
            .map_err(|e| NodeError::Config(format!("{:#}", e)))?;
        let topic = config
            .topic()
            .map_err(|e| NodeError::Config(format!("{:#}", e)))?;
        let master_seed = config
            .seed_bytes()
            .map_err(|e| NodeError::Config(format!("{:#}", e)))?
            .unwrap_or_else(|| KeyPair::generate().seed());

        let store = Arc::new(LogStore::new(master_seed));
        let registry = Arc::new(LogRegistry::new());

        let (transport, transport_events) =
            Transport::new(KeyPair::generate(), topic, config.event_buffer);
        let local_addr = transport.listen(config.listen).await?;

        let (events, events_rx) = mpsc::channel(config.event_buffer);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let channel = ExtensionChannel::new(DISCOVERY_CHANNEL);
        let local_log = store.open_named(&config.log_name);

        let inner = Arc::new(NodeInner {
            transport: Arc::clone(&transport),
            gossiper: DiscoveryGossiper::new(channel, Arc::clone(&registry), Arc::clone(&store)),
            replicator: Replicator::new(Arc::clone(&registry), config.max_sync_entries as usize),
            store,
            registry,
            watchers: Watchers::new(),
            local_log: local_log.clone(),
            events,
            shutdown_tx,
            event_loop: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        info!(
            "Node started on {} (topic: {}, log: {})",
            local_addr,
            topic,
            local_log.id()
        );

        let node = Self { inner };
        let (handle, _) = node
            .inner
            .registry
            .register_if_new(local_log.id(), || Ok(local_log.clone()))?;
        node.inner.on_new_log_registered(handle).await;

        let event_loop = tokio::spawn(Arc::clone(&node.inner).run(transport_events, shutdown_rx));
        *node.inner.event_loop.lock() = Some(event_loop);

        for addr in &config.peers {
            if let Err(e) = node.connect(*addr).await {
                warn!("Failed to connect to bootstrap peer {}: {}", addr, e);
            }
        }

        Ok((node, events_rx))
    }

    /// Append a chat message to our own log
    pub async fn write(&self, text: &str) -> Result<u64, NodeError> {
        if self.inner.is_stopped() {
            return Err(NodeError::Shutdown);
        }
        let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let index = self.inner.local_log.append(&Record::message(text, timestamp))?;
        debug!("Appended record {} to {}", index, self.inner.local_log.id());

        let have = self.inner.replicator.on_local_append(&self.inner.local_log)?;
        self.inner.dispatch(have).await;
        Ok(index)
    }

    /// Dial a peer
    pub async fn connect(&self, addr: SocketAddr) -> Result<PeerId, NodeError> {
        if self.inner.is_stopped() {
            return Err(NodeError::Shutdown);
        }
        let peer = self.inner.transport.connect(addr).await?;
        debug!("Dialed {} at {}", peer, addr);
        Ok(peer)
    }

    /// Address we accept peers on
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.transport.local_addr()
    }

    /// Identifier of our own log
    pub fn local_log_id(&self) -> LogId {
        self.inner.local_log.id()
    }

    /// Currently connected peers
    pub fn peers(&self) -> Vec<PeerInfo> {
        let transport = &self.inner.transport;
        transport
            .connected_peers()
            .iter()
            .filter_map(|id| transport.peer_info(id))
            .collect()
    }

    /// Every registered log, in registration order
    pub fn known_logs(&self) -> Vec<LogId> {
        self.inner.registry.known_ids()
    }

    /// Handle to a registered log
    pub fn log(&self, id: &LogId) -> Option<LogHandle> {
        self.inner.registry.get(id)
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            peers: self.inner.transport.peer_count(),
            known_logs: self.inner.registry.len(),
            watchers: self.inner.watchers.running(),
            local_length: self.inner.local_log.len(),
        }
    }

    /// Stop the node. Safe to call more than once.
    pub fn shutdown(&self) {
        self.inner.teardown();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl NodeInner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Serially handle transport events until shutdown
    async fn run(
        self: Arc<Self>,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = transport_events.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            debug!("Transport event channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Event loop shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::PeerConnected(peer) => self.on_peer_open(peer).await,
            TransportEvent::PeerDisconnected(peer) => {
                debug!("Peer {} closed", peer);
            }
            TransportEvent::FrameReceived { from, frame } => self.on_frame(from, frame).await,
        }
    }

    async fn on_peer_open(&self, peer: PeerId) {
        match self.gossiper.on_peer_open(peer) {
            Ok(outbound) => self.dispatch(outbound).await,
            Err(e) => warn!("Failed to announce logs to {}: {}", peer, e),
        }
        match self.replicator.on_peer_open(peer) {
            Ok(outbound) => {
                for out in outbound {
                    self.dispatch(out).await;
                }
            }
            Err(e) => warn!("Failed to advertise logs to {}: {}", peer, e),
        }
    }

    async fn on_frame(&self, from: PeerId, frame: Frame) {
        match frame.frame_type {
            FrameType::Extension => match ExtensionMessage::from_frame(&frame) {
                Ok(message) if self.gossiper.accepts(&message) => {
                    self.on_control_message(&message.payload, from).await
                }
                Ok(message) => {
                    trace!("Ignoring message on channel '{}' from {}", message.channel, from)
                }
                Err(e) => warn!("Malformed extension frame from {}: {}", from, e),
            },
            FrameType::Have | FrameType::Request | FrameType::Data => {
                match self.replicator.on_frame(from, &frame) {
                    Ok(outbound) => {
                        for out in outbound {
                            self.dispatch(out).await;
                        }
                    }
                    Err(e) => warn!("Replication error with {}: {}", from, e),
                }
            }
            FrameType::Handshake => {
                warn!("Unexpected handshake frame from {}", from);
            }
        }
    }

    async fn on_control_message(&self, payload: &[u8], from: PeerId) {
        let outcome = match self.gossiper.on_message(payload, from) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}", e);
                self.emit(AppEvent::Error {
                    message: e.to_string(),
                })
                .await;
                return;
            }
        };

        for failure in &outcome.failures {
            warn!("Could not register log from {}: {}", from, failure);
        }
        for handle in outcome.registered {
            self.on_new_log_registered(handle).await;
        }
        if let Some(outbound) = outcome.outbound {
            self.dispatch(outbound).await;
        }
    }

    /// Announce a log to the application, then start tailing and pulling it
    async fn on_new_log_registered(&self, log: LogHandle) {
        info!("New log: {}", log.id());
        self.emit(AppEvent::Discovered { log: log.id() }).await;
        self.watchers.spawn(log.clone(), self.events.clone());

        match self.replicator.on_log_registered(&log) {
            Ok(Some(outbound)) => self.dispatch(outbound).await,
            Ok(None) => {}
            Err(e) => warn!("Failed to request {}: {}", log.id(), e),
        }
    }

    async fn emit(&self, event: AppEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Application event receiver dropped");
        }
    }

    async fn dispatch(&self, outbound: Outbound) {
        match outbound {
            Outbound::Send { peer, frame } => {
                if let Err(e) = self.transport.send(&peer, frame).await {
                    debug!("Send to {} failed: {}", peer, e);
                }
            }
            Outbound::Broadcast(frame) => self.transport.broadcast(frame).await,
            Outbound::Announce(frame) => {
                let reached = self.transport.try_broadcast(frame);
                trace!("Announced to {} peers", reached);
            }
        }
    }

    fn teardown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down node");

        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        self.watchers.abort_all();
        self.registry.close_all();
        self.store.close_all();
        self.transport.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn test_config() -> Config {
        Config {
            listen: "127.0.0.1:0".parse().unwrap(),
            topic: "node unit test".to_string(),
            event_buffer: 16,
            ..Config::default()
        }
    }

    async fn next_event(rx: &mut EventReceiver) -> AppEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_node_start() {
        let (node, mut events) = Node::start(test_config()).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            AppEvent::Discovered {
                log: node.local_log_id()
            }
        );
        assert_eq!(node.known_logs(), vec![node.local_log_id()]);
        assert!(node.local_addr().is_some());

        let stats = node.stats();
        assert_eq!(stats.peers, 0);
        assert_eq!(stats.known_logs, 1);
        assert_eq!(stats.local_length, 0);
    }

    #[tokio::test]
    async fn test_seed_gives_stable_log_id() {
        let config = Config {
            seed: Some("11".repeat(32)),
            ..test_config()
        };
        let (first, _events) = Node::start(config.clone()).await.unwrap();
        let id = first.local_log_id();
        first.shutdown();

        let (second, _events) = Node::start(config).await.unwrap();
        assert_eq!(second.local_log_id(), id);
    }

    #[tokio::test]
    async fn test_write_is_visible_locally() {
        let (node, mut events) = Node::start(test_config()).await.unwrap();
        let own = node.local_log_id();
        next_event(&mut events).await;

        assert_eq!(node.write("hello").await.unwrap(), 0);

        match next_event(&mut events).await {
            AppEvent::Message { log, index, record } => {
                assert_eq!(log, own);
                assert_eq!(index, 0);
                assert_eq!(record.message_text(), Some("hello"));
                assert!(record.timestamp > 0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(timeout(Duration::from_millis(200), events.recv()).await.is_err());
        assert_eq!(node.stats().local_length, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = Config {
            seed: Some("not hex".to_string()),
            ..test_config()
        };
        assert!(matches!(
            Node::start(config).await,
            Err(NodeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (node, _events) = Node::start(test_config()).await.unwrap();
        node.shutdown();
        node.shutdown();

        assert!(matches!(node.write("late").await, Err(NodeError::Shutdown)));
        assert!(node.log(&node.local_log_id()).unwrap().is_closed());
    }
}
