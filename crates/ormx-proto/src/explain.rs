//! EXPLAIN result types.
//!
//! These types describe how a query chain is split between the backend and
//! local re-execution, without running it.

use serde::{Deserialize, Serialize};

use crate::operation::OpKind;

/// Result of explaining a query chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionSummary {
    /// The full chain, rendered.
    pub chain: String,
    /// Per-operation classification.
    pub operations: Vec<OperationSummary>,
    /// Index of the boundary operation (last heterogeneous one), if any.
    pub boundary: Option<usize>,
    /// Executor selected for the main segment.
    pub executor: String,
    /// Main segment, rendered.
    pub main: String,
    /// Locally executed remainder, rendered.
    pub complement: Option<String>,
    /// Include paths carried by the main segment's result.
    pub including: Vec<String>,
    /// Include paths in the boundary's source space.
    pub source_including: Vec<String>,
    /// Human-readable explanation text.
    pub explanation: String,
}

/// Classification of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    /// Position in the chain.
    pub index: usize,
    /// Operation kind.
    pub kind: OpKind,
    /// Whether the backend cannot execute the operation natively.
    pub heterogeneous: bool,
}

impl DecompositionSummary {
    /// Check whether any part of the chain runs locally.
    pub fn has_local_work(&self) -> bool {
        self.boundary.is_some() || self.complement.is_some()
    }

    /// Number of heterogeneous operations.
    pub fn heterogeneous_count(&self) -> usize {
        self.operations.iter().filter(|op| op.heterogeneous).count()
    }
}
