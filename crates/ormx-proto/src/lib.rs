//! ORMX query IR.
//!
//! This crate defines the data types shared by the decomposition engine and
//! by storage backends.
//!
//! # Modules
//!
//! - [`value`] - Runtime values, records and object identities
//! - [`types`] - Static element types
//! - [`path`] - Dot-notation member paths
//! - [`expr`] - Lambda expression trees
//! - [`operation`] - Query operations and their kinds
//! - [`chain`] - Immutable operation chains
//! - [`explain`] - Decomposition summaries
//! - [`error`] - IR construction errors
//!
//! # Serialization
//!
//! All types derive `serde::Serialize` and `serde::Deserialize`:
//!
//! ```ignore
//! use ormx_proto::{QueryChain, Value};
//!
//! let chain = QueryChain::extent("Order");
//! let json = chain.to_json()?;
//! let back = QueryChain::from_json(&json)?;
//! ```

pub mod chain;
pub mod error;
pub mod explain;
pub mod expr;
pub mod operation;
pub mod path;
pub mod types;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use chain::{ChainRoot, QueryChain};
pub use explain::{DecompositionSummary, OperationSummary};
pub use expr::{BinaryOp, Expr, Lambda, MemberBinding, UnaryOp};
pub use operation::{AggregateFunction, KeyComparer, Op, OpKind, QueryOp};
pub use path::MemberPath;
pub use types::{ScalarType, TypeRef};
pub use value::{ObjectKey, Record, Value};
