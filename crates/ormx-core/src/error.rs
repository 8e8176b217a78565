//! Core error types.

use ormx_proto::OpKind;
use thiserror::Error;

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A component was handed input it is not built for (e.g. an executor
    /// given a different operation kind, or a synthesized shape missing a
    /// constructor).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// No classification rule or executor is registered for the kind.
    #[error("no rule registered for operation kind {0}")]
    UnregisteredKind(OpKind),

    /// The operation cannot be classified or executed by any policy.
    #[error("unsupported operation {kind}: {reason}")]
    Unsupported { kind: OpKind, reason: String },

    /// Unknown entity type.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Member does not exist on its owner type.
    #[error("unknown member {member} on {owner}")]
    UnknownMember { owner: String, member: String },

    /// Static or runtime type mismatch.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Synthesized shape lacks an expected member.
    #[error("shape {shape} has no member {member}")]
    MissingMember { shape: String, member: String },

    /// Related data was navigated without being loaded.
    #[error("reference {member} on {owner} is not loaded")]
    NotLoaded { owner: String, member: String },

    /// Expression evaluation failed.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Storage backend rejected or failed a pipeline.
    #[error("backend error: {0}")]
    Backend(String),

    /// Nested engine invocations exceeded the configured depth.
    #[error("decomposition depth {0} exceeded")]
    DepthExceeded(usize),

    /// Schema definition is inconsistent.
    #[error("schema error: {0}")]
    Schema(String),

    /// Protocol (IR) error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ormx_proto::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an unsupported-operation error.
    pub fn unsupported(kind: OpKind, reason: impl Into<String>) -> Self {
        Error::Unsupported {
            kind,
            reason: reason.into(),
        }
    }

    /// Shorthand for an unknown-member error.
    pub fn unknown_member(owner: impl ToString, member: impl Into<String>) -> Self {
        Error::UnknownMember {
            owner: owner.to_string(),
            member: member.into(),
        }
    }

    /// Shorthand for a type mismatch.
    pub fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
