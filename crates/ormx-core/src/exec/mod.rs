//! Execution of decomposed chains.
//!
//! # Modules
//!
//! - [`context`] - Per-invocation context and lazy reference loading
//! - [`segment`] - Decompose, run main segment, run complement
//! - [`template`] - The base / attach / combine executor template
//! - [`base`] - Backend sub-queries
//! - [`attach`] - Attaching queries and stitching
//! - [`homogeneous`], [`projection`], [`degenerate`], [`filter`], [`group`],
//!   [`local_tail`] - Executors by boundary kind

pub mod attach;
pub mod base;
pub mod context;
pub mod degenerate;
pub mod filter;
pub mod group;
pub mod homogeneous;
pub mod local_tail;
pub mod projection;
pub mod segment;
pub mod template;

use std::collections::HashMap;

use ormx_proto::OpKind;

use crate::error::Error;
use crate::hetero::Segments;
use crate::view::ParserKind;

pub use base::BaseQueryProvider;
pub use context::ExecContext;
pub use degenerate::DegenerateExecutor;
pub use filter::FilterExecutor;
pub use group::GroupExecutor;
pub use homogeneous::HomogeneousExecutor;
pub use local_tail::LocalTailExecutor;
pub use projection::ProjectionExecutor;
pub use segment::SegmentExecutor;
pub use template::{
    execute_template, AttachPlan, AttachingQuery, Attachment, BaseQuery, FactorRole,
    OperationExecutor,
};

/// Creates the executor for one decomposition.
pub type ExecutorFactory = fn(&Segments) -> Box<dyn OperationExecutor>;

/// Executor factories by boundary kind.
#[derive(Clone)]
pub struct ExecutorRegistry {
    factories: HashMap<OpKind, ExecutorFactory>,
}

fn projection(segments: &Segments) -> Box<dyn OperationExecutor> {
    match segments.view.as_deref().map(|v| v.parser) {
        Some(ParserKind::Degenerate) => Box::new(DegenerateExecutor),
        _ => Box::new(ProjectionExecutor),
    }
}

fn filter(_segments: &Segments) -> Box<dyn OperationExecutor> {
    Box::new(FilterExecutor)
}

fn group(_segments: &Segments) -> Box<dyn OperationExecutor> {
    Box::new(GroupExecutor)
}

fn local_tail(_segments: &Segments) -> Box<dyn OperationExecutor> {
    Box::new(LocalTailExecutor)
}

impl ExecutorRegistry {
    /// Registry with no executors.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Executors for every kind that can be a boundary.
    pub fn standard() -> Self {
        let mut registry = Self::empty()
            .with(OpKind::Select, projection)
            .with(OpKind::CollectionSelect, projection)
            .with(OpKind::CombiningSelect, projection)
            .with(OpKind::Where, filter)
            .with(OpKind::Group, group)
            .with(OpKind::GroupAggregate, group);
        for kind in LocalTailExecutor::KINDS {
            registry = registry.with(kind, local_tail);
        }
        registry
    }

    /// Register a factory, replacing any previous one.
    pub fn with(mut self, kind: OpKind, factory: ExecutorFactory) -> Self {
        self.factories.insert(kind, factory);
        self
    }

    /// Remove the factory of a kind.
    pub fn without(mut self, kind: OpKind) -> Self {
        self.factories.remove(&kind);
        self
    }

    /// Check whether a kind has an executor.
    pub fn contains(&self, kind: OpKind) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Create the executor for a boundary kind.
    pub fn create(
        &self,
        kind: OpKind,
        segments: &Segments,
    ) -> Result<Box<dyn OperationExecutor>, Error> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or(Error::UnregisteredKind(kind))?;
        Ok(factory(segments))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_boundary_kinds() {
        let registry = ExecutorRegistry::standard();
        for kind in OpKind::ALL {
            assert_eq!(registry.contains(kind), kind != OpKind::Include, "{kind}");
        }
        assert!(!ExecutorRegistry::empty().contains(OpKind::Where));
    }

    #[test]
    fn test_without_removes_executor() {
        let registry = ExecutorRegistry::standard().without(OpKind::Group);
        assert!(!registry.contains(OpKind::Group));
        assert!(registry.contains(OpKind::GroupAggregate));

        let restored = registry.with(OpKind::Group, group);
        assert!(restored.contains(OpKind::Group));
    }
}
