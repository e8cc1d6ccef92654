//! Core protocol types for LogSwarm
//!
//! Records and control messages travel as JSON; everything else on the
//! wire is postcard. [`LogId`] picks its representation from the format.

use crate::error::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 32-byte fixed-size array used for keys and identifiers.
pub type Bytes32 = [u8; 32];

/// Record type discriminator for chat messages.
pub const MESSAGE_TYPE: &str = "message";

// =============================================================================
// IDENTITY TYPES
// =============================================================================

/// Log identifier: the Ed25519 public key of the log's single writer.
///
/// Hex encoded in human-readable formats (JSON, console), raw bytes otherwise.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId(pub Bytes32);

impl LogId {
    /// Get as bytes
    pub fn as_bytes(&self) -> &Bytes32 {
        &self.0
    }

    /// Full lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First four hex characters, used when rendering to the console
    pub fn short(&self) -> String {
        hex::encode(&self.0[..2])
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({})", self.to_hex())
    }
}

impl FromStr for LogId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidLogId(format!("{s}: {e}")))?;
        let id: Bytes32 = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidLogId(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(id))
    }
}

impl Serialize for LogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for LogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            Bytes32::deserialize(deserializer).map(LogId)
        }
    }
}

/// Discovery topic shared by every node of one swarm.
///
/// Parsed from a 64 character hex key, or derived from a phrase.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Topic(pub Bytes32);

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidTopic("topic cannot be empty".into()));
        }
        if s.len() == 64 {
            if let Ok(bytes) = hex::decode(s) {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                return Ok(Self(key));
            }
        }
        Ok(crate::crypto::derive_topic(s))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// One immutable structured entry in a log.
///
/// `type` and `timestamp` are always present; application fields ride alongside.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Type discriminator ("message" for chat records)
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix milliseconds at append time
    pub timestamp: u64,
    /// Application payload fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no payload fields
    pub fn new(kind: impl Into<String>, timestamp: u64) -> Self {
        Self {
            kind: kind.into(),
            timestamp,
            fields: Map::new(),
        }
    }

    /// Create a chat message record
    pub fn message(text: impl Into<String>, timestamp: u64) -> Self {
        Self::new(MESSAGE_TYPE, timestamp).with_field("message", text.into())
    }

    /// Attach a payload field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_TYPE
    }

    /// Text of a chat message, if present
    pub fn message_text(&self) -> Option<&str> {
        self.fields.get("message").and_then(Value::as_str)
    }
}

/// A record as stored and replicated: JSON payload signed by the log writer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedEntry {
    /// Position in the log (permanent)
    pub index: u64,
    /// JSON-encoded [`Record`]
    pub payload: Vec<u8>,
    /// Ed25519 signature over `entry_signing_bytes(log, index, payload)`
    pub signature: Vec<u8>,
}

// =============================================================================
// CONTROL CHANNEL
// =============================================================================

/// Messages exchanged on the discovery extension channel.
///
/// Unrecognized `type` values decode to [`ControlMessage::Unknown`].
/// Bootstrap keys stay strings on decode; a bad key only affects itself.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Full set of log identifiers known to the sender, hex encoded
    Bootstrap { keys: Vec<String> },
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    pub fn bootstrap(keys: Vec<LogId>) -> Self {
        Self::Bootstrap {
            keys: keys.iter().map(LogId::to_hex).collect(),
        }
    }
}
