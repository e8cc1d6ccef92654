//! Peer identity and information

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Unique peer identifier (the peer's transport public key)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from transport public key
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(*public_key)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Lifecycle of one peer connection. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP established, handshake in progress
    Connecting,
    /// Handshake verified, frames flowing
    Open,
    /// Connection torn down; no reconnection at this layer
    Closed,
}

/// Information about a connected peer
#[derive(Clone, Debug)]
pub struct PeerInfo {
    /// Peer identifier
    pub id: PeerId,
    /// Remote socket address
    pub addr: SocketAddr,
    /// Whether we dialed this peer
    pub outbound: bool,
    /// Connection time (unix millis)
    pub connected_at: u64,
}

impl PeerInfo {
    /// Create new peer info stamped with the current time
    pub fn new(id: PeerId, addr: SocketAddr, outbound: bool) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        Self {
            id,
            addr,
            outbound,
            connected_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}
