//! ORMX Core - heterogeneous query decomposition and execution.
//!
//! A query chain is classified operation by operation against the
//! capabilities of a storage backend. The chain is split at the last
//! operation the backend cannot run natively: the prefix runs in the
//! backend, the boundary operation is completed locally by an operation
//! executor, and the remaining operations run locally over its results.
//! Projections the backend cannot build are instantiated through
//! synthesized Type Views, and related data requested through
//! `Include` survives every split.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod expr;
pub mod hetero;
pub mod including;
pub mod memory;
pub mod provider;
pub mod query;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{
    Cardinality, ComplexTypeDef, EntityDef, EnumDef, FieldDef, FieldType, ObjectModel,
    RelationDef, SchemaBundle, ShapeDef,
};
pub use config::{EngineConfig, IncludingFallback};
pub use engine::Engine;
pub use error::Error;
pub use exec::{ExecContext, ExecutorRegistry, OperationExecutor};
pub use hetero::{
    Capability, CapabilityPolicy, Classifier, Decomposer, HeterogeneityPolicy, Segments,
};
pub use including::IncludingTree;
pub use memory::{MemoryBackend, MemoryStore};
pub use provider::{
    Backend, DetachedObjects, ExecutionCallbacks, IdentityMap, NoopCallbacks, ObjectAttacher,
    PipelineGenerator, PipelineRequest, RecordingCallbacks, StorageProvider, TracingCallbacks,
};
pub use query::{QueryBuilder, QueryOutput};
pub use view::{TypeView, ViewRegistry};

/// Re-export protocol types.
pub use ormx_proto as proto;
