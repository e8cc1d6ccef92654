//! Session cryptography for peer links
//!
//! Provides ephemeral ECDH, session key derivation, and per-frame AEAD.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, SharedSecret};

pub use logswarm_core::crypto::KeyPair;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("AEAD encryption failed")]
    EncryptionFailed,
    #[error("AEAD decryption failed")]
    DecryptionFailed,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
}

/// Session keys derived from ECDH
pub struct SessionKeys {
    /// Key for encrypting outgoing frames
    pub encrypt_key: [u8; 32],
    /// Key for decrypting incoming frames
    pub decrypt_key: [u8; 32],
}

impl SessionKeys {
    /// Derive session keys from shared secret and role.
    ///
    /// Both sides derive the same pair with directions swapped; the role is
    /// fixed by the ordering of the ephemeral public keys.
    pub fn derive(
        shared_secret: &SharedSecret,
        our_public: &X25519Public,
        their_public: &X25519Public,
        context: &[u8],
    ) -> Result<Self, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());

        let is_initiator = our_public.as_bytes() < their_public.as_bytes();

        let mut encrypt_key = [0u8; 32];
        let mut decrypt_key = [0u8; 32];

        let (enc_info, dec_info) = if is_initiator {
            (b"initiator_to_responder", b"responder_to_initiator")
        } else {
            (b"responder_to_initiator", b"initiator_to_responder")
        };

        let mut enc_context = context.to_vec();
        enc_context.extend_from_slice(enc_info);
        hkdf.expand(&enc_context, &mut encrypt_key)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let mut dec_context = context.to_vec();
        dec_context.extend_from_slice(dec_info);
        hkdf.expand(&dec_context, &mut decrypt_key)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(Self {
            encrypt_key,
            decrypt_key,
        })
    }

    /// Split into independent halves for the writer and reader tasks.
    pub fn split(self) -> Result<(FrameSealer, FrameOpener), CryptoError> {
        let sealer = FrameSealer {
            cipher: ChaCha20Poly1305::new_from_slice(&self.encrypt_key)
                .map_err(|_| CryptoError::InvalidKeyLength)?,
            counter: 0,
        };
        let opener = FrameOpener {
            cipher: ChaCha20Poly1305::new_from_slice(&self.decrypt_key)
                .map_err(|_| CryptoError::InvalidKeyLength)?,
            counter: 0,
        };
        Ok((sealer, opener))
    }
}

fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce_bytes
}

/// Outgoing half of a session. Nonces come from a send counter.
pub struct FrameSealer {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl FrameSealer {
    /// Encrypt a frame payload with AEAD
    pub fn seal(&mut self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_bytes = counter_nonce(self.counter);
        self.counter += 1;

        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }
}

/// Incoming half of a session. Frames must be opened in send order.
pub struct FrameOpener {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl FrameOpener {
    /// Decrypt a frame payload with AEAD
    pub fn open(&mut self, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_bytes = counter_nonce(self.counter);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;
        self.counter += 1;
        Ok(plaintext)
    }
}

/// X25519 ephemeral key exchange
pub struct EphemeralKeyExchange {
    secret: EphemeralSecret,
    public: X25519Public,
}

impl EphemeralKeyExchange {
    /// Generate new ephemeral keypair
    pub fn new() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Perform key exchange and derive shared secret
    pub fn exchange(self, their_public: &[u8; 32]) -> SharedSecret {
        let their_public = X25519Public::from(*their_public);
        self.secret.diffie_hellman(&their_public)
    }
}

impl Default for EphemeralKeyExchange {
    fn default() -> Self {
        Self::new()
    }
}
