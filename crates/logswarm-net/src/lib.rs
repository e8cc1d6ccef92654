//! Networking primitives for the LogSwarm protocol
//!
//! This crate provides:
//! - Peer identity
//! - Signed handshakes and per-connection session encryption
//! - TCP transport with connect/disconnect notifications
//! - Named extension channels for control messages
//! - Message framing

pub mod channel;
pub mod crypto;
pub mod framing;
pub mod peer;
pub mod transport;

pub use channel::ExtensionChannel;
pub use crypto::{KeyPair, SessionKeys};
pub use framing::{Frame, FrameCodec, FrameType};
pub use peer::{ConnectionState, PeerId, PeerInfo};
pub use transport::{Transport, TransportError, TransportEvent};
