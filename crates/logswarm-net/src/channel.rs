//! Named extension channels
//!
//! A side channel for control messages multiplexed over every peer
//! connection, independent of log replication traffic. Payload encoding is
//! chosen by the channel's user; frames are sent through the transport
//! like any other.

use crate::framing::Frame;
use crate::transport::messages::{ExtensionMessage, WireMessage};
use crate::transport::TransportError;

/// One named channel
#[derive(Clone, Debug)]
pub struct ExtensionChannel {
    name: String,
}

impl ExtensionChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Whether an incoming extension message belongs to this channel
    pub fn accepts(&self, message: &ExtensionMessage) -> bool {
        message.channel == self.name
    }

    /// Wrap a payload into an extension frame for this channel
    pub fn frame(&self, payload: Vec<u8>) -> Result<Frame, TransportError> {
        let message = ExtensionMessage {
            channel: self.name.clone(),
            payload,
        };
        Ok(message.to_frame()?)
    }
}
