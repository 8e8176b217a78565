//! IR construction error types.

use thiserror::Error;

/// Errors raised while building query IR.
#[derive(Debug, Error)]
pub enum Error {
    /// Chain construction violated an ordering rule.
    #[error("invalid chain: {0}")]
    InvalidChain(String),

    /// Operation source type does not match the chain's element type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
