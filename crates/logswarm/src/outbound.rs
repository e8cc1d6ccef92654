//! Frames produced by the protocol state machines
//!
//! The gossiper and the replicator never touch the network. They return
//! [`Outbound`] actions and the node's event loop puts them on the wire.

use logswarm_net::framing::Frame;
use logswarm_net::peer::PeerId;

/// A frame waiting to be sent
#[derive(Clone, Debug)]
pub enum Outbound {
    /// Unicast to one peer
    Send { peer: PeerId, frame: Frame },
    /// Every currently connected peer
    Broadcast(Frame),
    /// Every connected peer with room in its send queue. Only for frames a
    /// later frame supersedes, so the event loop never waits on a slow peer.
    Announce(Frame),
}

impl Outbound {
    pub fn frame(&self) -> &Frame {
        match self {
            Self::Send { frame, .. } | Self::Broadcast(frame) | Self::Announce(frame) => frame,
        }
    }
}
