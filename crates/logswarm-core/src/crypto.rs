//! Signing keys and hash derivations for LogSwarm
//!
//! All hash derivations use BLAKE3 with domain separation prefixes.
//! Log entries are signed with Ed25519 by the log's writer key.

use crate::error::{Error, Result};
use crate::types::*;
use blake3::Hasher;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

// =============================================================================
// DOMAIN SEPARATION PREFIXES
// =============================================================================

/// Domain prefix for Topic derivation
pub const DOMAIN_TOPIC: &[u8] = b"topic";
/// Domain prefix for entry signatures
pub const DOMAIN_ENTRY: &[u8] = b"entry";
/// Domain prefix for the connection handshake signature
pub const DOMAIN_HANDSHAKE: &[u8] = b"handshake";
/// KDF context for per-name log seeds
pub const LOG_SEED_CONTEXT: &str = "logswarm log seed v1";

// =============================================================================
// KEYS
// =============================================================================

/// Ed25519 keypair for signing and identity
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from seed bytes (deterministic identities and tests)
    pub fn from_seed(seed: &Bytes32) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> Bytes32 {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the seed this keypair was created from
    pub fn seed(&self) -> Bytes32 {
        self.signing_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Verify a signature of arbitrary length against a public key
    pub fn verify(public_key: &Bytes32, message: &[u8], signature: &[u8]) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let signature: [u8; 64] = signature.try_into().map_err(|_| Error::InvalidSignature)?;
        verifying_key
            .verify(message, &Signature::from_bytes(&signature))
            .map_err(|_| Error::InvalidSignature)
    }
}

/// Check that a log identifier is a usable Ed25519 public key.
pub fn validate_log_id(id: &LogId) -> Result<()> {
    VerifyingKey::from_bytes(id.as_bytes())
        .map(|_| ())
        .map_err(|e| Error::InvalidPublicKey(e.to_string()))
}

// =============================================================================
// TOPICS & SEEDS
// =============================================================================

/// Normalize a topic phrase: lowercase, trim, collapse whitespace to single hyphen.
pub fn normalize_topic_phrase(phrase: &str) -> String {
    phrase
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive a Topic from a phrase.
///
/// `Topic = BLAKE3("topic" || phrase_norm)`
pub fn derive_topic(phrase: &str) -> Topic {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_TOPIC);
    hasher.update(normalize_topic_phrase(phrase).as_bytes());
    Topic(*hasher.finalize().as_bytes())
}

/// Derive the writer seed for a named log owned by this node.
///
/// The same master seed and name always give the same log.
pub fn derive_log_seed(master_seed: &Bytes32, name: &str) -> Bytes32 {
    let mut material = Vec::with_capacity(32 + name.len());
    material.extend_from_slice(master_seed);
    material.extend_from_slice(name.as_bytes());
    blake3::derive_key(LOG_SEED_CONTEXT, &material)
}

// =============================================================================
// ENTRY SIGNATURES
// =============================================================================

/// Bytes covered by an entry signature.
///
/// `BLAKE3("entry" || log_id || index_le || payload)`
pub fn entry_signing_bytes(log: &LogId, index: u64, payload: &[u8]) -> Bytes32 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_ENTRY);
    hasher.update(log.as_bytes());
    hasher.update(&index.to_le_bytes());
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Sign a payload at `index` with the log writer's key.
pub fn sign_entry(writer: &KeyPair, index: u64, payload: Vec<u8>) -> SignedEntry {
    let log = LogId(writer.public_key());
    let signature = writer.sign(&entry_signing_bytes(&log, index, &payload));
    SignedEntry {
        index,
        payload,
        signature: signature.to_vec(),
    }
}

/// Verify that `entry` was signed by the writer of `log`.
pub fn verify_entry(log: &LogId, entry: &SignedEntry) -> Result<()> {
    let message = entry_signing_bytes(log, entry.index, &entry.payload);
    KeyPair::verify(log.as_bytes(), &message, &entry.signature)
}

/// Bytes covered by the handshake signature.
///
/// `BLAKE3("handshake" || topic || ephemeral_pubkey)`
pub fn handshake_signing_bytes(topic: &Topic, ephemeral_pubkey: &Bytes32) -> Bytes32 {
    let mut hasher = Hasher::new();
    hasher.update(DOMAIN_HANDSHAKE);
    hasher.update(&topic.0);
    hasher.update(ephemeral_pubkey);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let kp = KeyPair::generate();
        let msg = b"hello world";
        let sig = kp.sign(msg);

        assert!(KeyPair::verify(&kp.public_key(), msg, &sig).is_ok());
        assert!(KeyPair::verify(&kp.public_key(), b"other", &sig).is_err());
        assert!(KeyPair::verify(&kp.public_key(), msg, &sig[..10]).is_err());
    }

    #[test]
    fn test_log_seed_is_stable_per_name() {
        let master = [9; 32];
        assert_eq!(
            derive_log_seed(&master, "my_messages"),
            derive_log_seed(&master, "my_messages")
        );
        assert_ne!(
            derive_log_seed(&master, "my_messages"),
            derive_log_seed(&master, "other")
        );
        assert_ne!(
            derive_log_seed(&master, "my_messages"),
            derive_log_seed(&[8; 32], "my_messages")
        );
    }

    #[test]
    fn test_entry_signature() {
        let writer = KeyPair::from_seed(&[3; 32]);
        let log = LogId(writer.public_key());
        let entry = sign_entry(&writer, 0, b"{}".to_vec());

        assert!(verify_entry(&log, &entry).is_ok());

        // Moving an entry to another index breaks the signature
        let mut moved = entry.clone();
        moved.index = 1;
        assert!(verify_entry(&log, &moved).is_err());

        // So does claiming it for another log
        let other = LogId(KeyPair::from_seed(&[4; 32]).public_key());
        assert!(verify_entry(&other, &entry).is_err());
    }

    #[test]
    fn test_validate_log_id() {
        let kp = KeyPair::generate();
        assert!(validate_log_id(&LogId(kp.public_key())).is_ok());
    }
}
