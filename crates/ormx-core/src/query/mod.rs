//! Query construction and local execution.
//!
//! This module builds typed operation chains and evaluates them over
//! materialized rows when the backend cannot.

mod builder;
mod local;
mod signature;

use ormx_proto::Value;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub use builder::QueryBuilder;
pub use local::{group_key, grouping_record, ChainSource, LocalExecutor};
pub use signature::{lambda_signatures, Signature};

/// Result of executing a chain: a sequence of rows, or the single value of
/// a terminal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryOutput {
    /// Result rows.
    Rows(Vec<Value>),
    /// Single value of a terminal operation.
    Scalar(Value),
}

impl QueryOutput {
    /// Empty row set.
    pub fn empty() -> Self {
        QueryOutput::Rows(Vec::new())
    }

    /// Rows, failing for a single value.
    pub fn into_rows(self) -> Result<Vec<Value>, Error> {
        match self {
            QueryOutput::Rows(rows) => Ok(rows),
            QueryOutput::Scalar(value) => Err(Error::ContractViolation(format!(
                "expected rows, got single value {value}"
            ))),
        }
    }

    /// Rows, if this is a row set.
    pub fn rows(&self) -> Option<&[Value]> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Scalar(_) => None,
        }
    }

    /// Mutable rows, if this is a row set.
    pub fn rows_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Scalar(_) => None,
        }
    }

    /// The single value, if this is a terminal result.
    pub fn scalar(&self) -> Option<&Value> {
        match self {
            QueryOutput::Scalar(value) => Some(value),
            QueryOutput::Rows(_) => None,
        }
    }

    /// Number of rows (1 for a single value).
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Rows(rows) => rows.len(),
            QueryOutput::Scalar(_) => 1,
        }
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        matches!(self, QueryOutput::Rows(rows) if rows.is_empty())
    }
}
