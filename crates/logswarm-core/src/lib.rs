//! LogSwarm Core Library
//!
//! This crate provides the core types, encodings, and signing primitives
//! shared by every LogSwarm node.
//!
//! # Modules
//!
//! - [`types`]: Protocol types (LogId, Topic, Record, SignedEntry, ControlMessage)
//! - [`encoding`]: JSON encoding for records and control messages
//! - [`crypto`]: Signing keys, topic and log seed derivation, entry signatures
//! - [`error`]: Error types

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
