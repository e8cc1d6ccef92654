//! Error types for LogSwarm

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// LogSwarm core error types
#[derive(Debug, Error)]
pub enum Error {
    /// JSON encoding error (records and control messages)
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Identifier is not 32 bytes of hex
    #[error("invalid log id: {0}")]
    InvalidLogId(String),

    /// Topic is neither a 64 character hex key nor a usable phrase
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,

    /// Invalid public key (not a point on the curve)
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}
