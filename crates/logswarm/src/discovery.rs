//! Discovery gossip
//!
//! Spreads the set of known log identifiers over the `peer-discovery`
//! extension channel. A newly opened peer gets our whole set; an incoming
//! announcement registers whatever we had not seen and, only if that delta
//! was non-empty, is re-broadcast with our grown set. Broadcasts are thus
//! bounded by the number of distinct logs in the swarm.
//!
//! Keys are parsed one at a time: a malformed key is a registration failure
//! for that key alone, never for the rest of the announcement.

use crate::log::{LogError, LogHandle};
use crate::outbound::Outbound;
use crate::registry::LogRegistry;
use crate::store::LogStore;
use logswarm_core::encoding::{decode_control, encode_control};
use logswarm_core::types::{ControlMessage, LogId};
use logswarm_net::channel::ExtensionChannel;
use logswarm_net::peer::PeerId;
use logswarm_net::transport::messages::ExtensionMessage;
use logswarm_net::transport::TransportError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Extension channel carrying bootstrap announcements
pub const DISCOVERY_CHANNEL: &str = "peer-discovery";

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Malformed control message from {peer}: {source}")]
    ChannelDecode {
        peer: PeerId,
        #[source]
        source: logswarm_core::Error,
    },
    #[error("Failed to encode control message: {0}")]
    Encode(#[from] logswarm_core::Error),
    #[error("Failed to frame control message: {0}")]
    Frame(#[from] TransportError),
}

/// A key from an announcement that could not be registered.
///
/// Nothing is inserted, so a later announcement of the same key retries.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Malformed log id '{key}': {source}")]
    Malformed {
        key: String,
        #[source]
        source: logswarm_core::Error,
    },
    #[error("Cannot open log {id}: {source}")]
    Open {
        id: LogId,
        #[source]
        source: LogError,
    },
}

/// Result of handling one announcement
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    /// Logs registered for the first time, in announcement order
    pub registered: Vec<LogHandle>,
    /// Keys that could not be registered
    pub failures: Vec<RegistrationError>,
    /// Re-announcement, present whenever the announcement held anything new
    pub outbound: Option<Outbound>,
}

impl DiscoveryOutcome {
    pub fn is_noop(&self) -> bool {
        self.registered.is_empty() && self.failures.is_empty() && self.outbound.is_none()
    }
}

/// Sans-IO discovery state machine
pub struct DiscoveryGossiper {
    channel: ExtensionChannel,
    registry: Arc<LogRegistry>,
    store: Arc<LogStore>,
}

impl DiscoveryGossiper {
    pub fn new(channel: ExtensionChannel, registry: Arc<LogRegistry>, store: Arc<LogStore>) -> Self {
        Self {
            channel,
            registry,
            store,
        }
    }

    /// Whether an extension message is ours to handle
    pub fn accepts(&self, message: &ExtensionMessage) -> bool {
        self.channel.accepts(message)
    }

    /// Announce every known log to a newly opened peer
    pub fn on_peer_open(&self, peer: PeerId) -> Result<Outbound, DiscoveryError> {
        let keys = self.registry.known_ids();
        debug!("Announcing {} known logs to {}", keys.len(), peer);
        Ok(Outbound::Send {
            peer,
            frame: self.bootstrap_frame(keys)?,
        })
    }

    /// Handle a payload received on the discovery channel
    pub fn on_message(&self, payload: &[u8], from: PeerId) -> Result<DiscoveryOutcome, DiscoveryError> {
        let message = decode_control(payload)
            .map_err(|source| DiscoveryError::ChannelDecode { peer: from, source })?;

        match message {
            ControlMessage::Bootstrap { keys } => self.on_bootstrap(&keys, from),
            ControlMessage::Unknown => {
                trace!("Ignoring unknown control message from {}", from);
                Ok(DiscoveryOutcome::default())
            }
        }
    }

    fn on_bootstrap(&self, keys: &[String], from: PeerId) -> Result<DiscoveryOutcome, DiscoveryError> {
        let mut outcome = DiscoveryOutcome::default();

        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match key.parse::<LogId>() {
                Ok(id) => ids.push(id),
                Err(source) => outcome.failures.push(RegistrationError::Malformed {
                    key: key.clone(),
                    source,
                }),
            }
        }

        let new_keys = self.registry.unknown(&ids);
        if new_keys.is_empty() && outcome.failures.is_empty() {
            trace!("Bootstrap from {} carried nothing new", from);
            return Ok(outcome);
        }

        for id in new_keys {
            // Another announcement may have registered it since `unknown`
            match self.registry.register_if_new(id, || self.store.open(id)) {
                Ok((handle, true)) => {
                    debug!("Discovered log {} via {}", id, from);
                    outcome.registered.push(handle);
                }
                Ok((_, false)) => {}
                Err(source) => outcome.failures.push(RegistrationError::Open { id, source }),
            }
        }

        if !outcome.registered.is_empty() || !outcome.failures.is_empty() {
            let keys = self.registry.known_ids();
            outcome.outbound = Some(Outbound::Broadcast(self.bootstrap_frame(keys)?));
        }
        Ok(outcome)
    }

    fn bootstrap_frame(&self, keys: Vec<LogId>) -> Result<logswarm_net::framing::Frame, DiscoveryError> {
        let payload = encode_control(&ControlMessage::bootstrap(keys))?;
        Ok(self.channel.frame(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logswarm_core::crypto::KeyPair;
    use logswarm_net::transport::messages::WireMessage;

    struct Fixture {
        gossiper: DiscoveryGossiper,
        registry: Arc<LogRegistry>,
        local: LogId,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(LogRegistry::new());
        let store = Arc::new(LogStore::new([9; 32]));

        let local = store.open_named("my_messages");
        registry.register_if_new(local.id(), || Ok(local.clone())).unwrap();

        let channel = ExtensionChannel::new(DISCOVERY_CHANNEL);
        Fixture {
            gossiper: DiscoveryGossiper::new(channel, registry.clone(), store),
            registry,
            local: local.id(),
        }
    }

    fn log_id(seed: u8) -> LogId {
        LogId(KeyPair::from_seed(&[seed; 32]).public_key())
    }

    fn bootstrap(keys: &[LogId]) -> Vec<u8> {
        encode_control(&ControlMessage::bootstrap(keys.to_vec())).unwrap()
    }

    fn announced_keys(outbound: &Outbound) -> Vec<LogId> {
        let message = ExtensionMessage::from_frame(outbound.frame()).unwrap();
        assert_eq!(message.channel, DISCOVERY_CHANNEL);
        match decode_control(&message.payload).unwrap() {
            ControlMessage::Bootstrap { keys } => keys.iter().map(|k| k.parse().unwrap()).collect(),
            other => panic!("unexpected control message: {:?}", other),
        }
    }

    #[test]
    fn test_peer_open_announces_known_set() {
        let f = fixture();
        let peer = PeerId([1; 32]);

        let outbound = f.gossiper.on_peer_open(peer).unwrap();
        assert!(matches!(outbound, Outbound::Send { peer: p, .. } if p == peer));
        assert_eq!(announced_keys(&outbound), vec![f.local]);
    }

    #[test]
    fn test_bootstrap_registers_delta_and_rebroadcasts() {
        let f = fixture();
        let x = log_id(1);

        let outcome = f.gossiper.on_message(&bootstrap(&[f.local, x]), PeerId([2; 32])).unwrap();
        assert_eq!(outcome.registered.len(), 1);
        assert_eq!(outcome.registered[0].id(), x);
        assert!(!outcome.registered[0].is_writable());

        let outbound = outcome.outbound.expect("delta must be re-announced");
        assert!(matches!(outbound, Outbound::Broadcast(_)));
        assert_eq!(announced_keys(&outbound), vec![f.local, x]);
    }

    #[test]
    fn test_repeated_bootstrap_is_idempotent() {
        let f = fixture();
        let payload = bootstrap(&[log_id(1), log_id(2)]);

        let first = f.gossiper.on_message(&payload, PeerId([2; 32])).unwrap();
        assert_eq!(first.registered.len(), 2);

        let second = f.gossiper.on_message(&payload, PeerId([3; 32])).unwrap();
        assert!(second.is_noop());
        assert_eq!(f.registry.len(), 3);
    }

    #[test]
    fn test_duplicate_keys_register_once() {
        let f = fixture();
        let x = log_id(4);

        let outcome = f.gossiper.on_message(&bootstrap(&[x, x]), PeerId([2; 32])).unwrap();
        assert_eq!(outcome.registered.len(), 1);
        assert_eq!(f.registry.known_ids(), vec![f.local, x]);
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let f = fixture();
        let outcome = f
            .gossiper
            .on_message(br#"{"type":"ping","nonce":7}"#, PeerId([2; 32]))
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let f = fixture();
        let peer = PeerId([2; 32]);

        let payloads: [&[u8]; 3] = [
            b"not json",
            br#"{"type":"bootstrap"}"#,
            br#"{"type":"bootstrap","keys":[1,2]}"#,
        ];
        for payload in payloads {
            assert!(matches!(
                f.gossiper.on_message(payload, peer),
                Err(DiscoveryError::ChannelDecode { .. })
            ));
        }
        assert_eq!(f.registry.len(), 1);
    }

    #[test]
    fn test_malformed_key_does_not_block_the_rest() {
        let f = fixture();
        let good = log_id(6);
        let payload = format!(r#"{{"type":"bootstrap","keys":["{}","zz"]}}"#, good.to_hex());

        let outcome = f.gossiper.on_message(payload.as_bytes(), PeerId([2; 32])).unwrap();
        assert_eq!(outcome.registered.len(), 1);
        assert_eq!(outcome.registered[0].id(), good);
        assert!(matches!(
            outcome.failures.as_slice(),
            [RegistrationError::Malformed { key, .. }] if key == "zz"
        ));
        assert!(f.registry.contains(&good));
        assert_eq!(f.registry.len(), 2);

        let outbound = outcome.outbound.expect("registered key must be re-announced");
        assert_eq!(announced_keys(&outbound), vec![f.local, good]);
    }

    fn off_curve_id() -> LogId {
        (0u8..=255)
            .map(|b| LogId([b; 32]))
            .find(|id| logswarm_core::crypto::validate_log_id(id).is_err())
            .expect("some repeated-byte key is not a curve point")
    }

    #[test]
    fn test_unopenable_key_is_not_registered() {
        let f = fixture();
        let good = log_id(5);
        let bad = off_curve_id();

        let outcome = f.gossiper.on_message(&bootstrap(&[bad, good]), PeerId([2; 32])).unwrap();
        assert!(matches!(
            outcome.failures.as_slice(),
            [RegistrationError::Open { id, .. }] if *id == bad
        ));
        assert_eq!(outcome.registered.len(), 1);
        assert!(!f.registry.contains(&bad));
        assert!(f.registry.contains(&good));
    }

    #[test]
    fn test_failed_delta_still_announces_and_retries() {
        let f = fixture();
        let bad = off_curve_id();
        let payload = bootstrap(&[bad]);

        let first = f.gossiper.on_message(&payload, PeerId([2; 32])).unwrap();
        assert!(first.registered.is_empty());
        let outbound = first.outbound.expect("a non-empty delta is re-announced");
        assert_eq!(announced_keys(&outbound), vec![f.local]);

        // Not inserted, so the same key is attempted again
        let second = f.gossiper.on_message(&payload, PeerId([3; 32])).unwrap();
        assert_eq!(second.failures.len(), 1);
        assert_eq!(f.registry.len(), 1);
    }
}
