//! Query engine entry point.

use std::sync::Arc;

use ormx_proto::{DecompositionSummary, OperationSummary, QueryChain};
use tracing::debug;

use crate::catalog::ObjectModel;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::exec::{ExecContext, ExecutorRegistry, SegmentExecutor};
use crate::hetero::{Classifier, HeterogeneityPolicy, Segments};
use crate::including::IncludingTree;
use crate::provider::{
    Backend, DetachedObjects, ExecutionCallbacks, IdentityMap, ObjectAttacher, TracingCallbacks,
};
use crate::query::QueryOutput;

/// Executes query chains against a backend, decomposing every chain at the
/// last operation the backend cannot run natively.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use ormx_core::{Engine, MemoryBackend, MemoryStore, ObjectModel, QueryBuilder};
///
/// let model = Arc::new(ObjectModel::new(schema)?);
/// let backend = MemoryBackend::new(model.clone(), Arc::new(MemoryStore::new()))
///     .with_policy(CapabilityPolicy::minimal());
/// let engine = Engine::new(model.clone(), Arc::new(backend));
///
/// let chain = QueryBuilder::from_extent(&model, "Order")?
///     .select(Expr::param(0).member("customer"))?
///     .build();
/// let customers = engine.execute(&chain)?.into_rows()?;
/// ```
pub struct Engine {
    model: Arc<ObjectModel>,
    backend: Arc<dyn Backend>,
    policy: Arc<dyn HeterogeneityPolicy>,
    classifier: Classifier,
    executors: ExecutorRegistry,
    config: EngineConfig,
    callbacks: Arc<dyn ExecutionCallbacks>,
}

impl Engine {
    /// Create an engine decomposing for the backend's own policy.
    pub fn new(model: Arc<ObjectModel>, backend: Arc<dyn Backend>) -> Self {
        let policy = backend.policy();
        Self {
            model,
            backend,
            policy,
            classifier: Classifier::standard(),
            executors: ExecutorRegistry::standard(),
            config: EngineConfig::default(),
            callbacks: Arc::new(TracingCallbacks),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Decompose for a different policy than the backend's.
    pub fn with_policy(mut self, policy: impl HeterogeneityPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Set the backend call hooks.
    pub fn with_callbacks(mut self, callbacks: Arc<dyn ExecutionCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Set the classification rules.
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the executor registry.
    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Object model.
    pub fn model(&self) -> &Arc<ObjectModel> {
        &self.model
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Policy used for decomposition.
    pub fn policy(&self) -> &dyn HeterogeneityPolicy {
        self.policy.as_ref()
    }

    /// Top-level context registering objects with `attacher`.
    pub fn context<'a>(&'a self, attacher: &'a dyn ObjectAttacher) -> ExecContext<'a> {
        ExecContext::new(
            &self.model,
            self.backend.as_ref(),
            &self.classifier,
            self.policy.as_ref(),
            &self.executors,
            &self.config,
            self.callbacks.as_ref(),
            attacher,
        )
    }

    /// Execute a chain with a fresh identity map.
    pub fn execute(&self, chain: &QueryChain) -> Result<QueryOutput, Error> {
        let identities = IdentityMap::new(self.model.clone());
        self.execute_with(chain, &identities)
    }

    /// Execute a chain, registering materialized objects with `attacher`.
    pub fn execute_with(
        &self,
        chain: &QueryChain,
        attacher: &dyn ObjectAttacher,
    ) -> Result<QueryOutput, Error> {
        debug!(%chain, policy = self.policy.name(), "executing chain");
        self.context(attacher).execute(chain)
    }

    /// Decompose a chain without executing it.
    pub fn decompose(&self, chain: &QueryChain) -> Result<Segments, Error> {
        SegmentExecutor::new(&self.context(&DetachedObjects)).decompose(chain)
    }

    /// Describe how a chain would be executed.
    pub fn explain(&self, chain: &QueryChain) -> Result<DecompositionSummary, Error> {
        let ctx = self.context(&DetachedObjects);
        let segment = SegmentExecutor::new(&ctx);
        let segments = segment.decompose(chain)?;
        let executor = segment.executor(&segments)?;

        let operations = chain
            .ops()
            .iter()
            .zip(&segments.classification)
            .enumerate()
            .map(|(index, (op, heterogeneous))| OperationSummary {
                index,
                kind: op.kind(),
                heterogeneous: *heterogeneous,
            })
            .collect();
        let render = |tree: &IncludingTree| {
            tree.paths().iter().map(ToString::to_string).collect::<Vec<_>>()
        };
        let explanation = match (segments.boundary_op(), &segments.complement) {
            (None, _) => format!("runs entirely in the backend ({})", self.policy.name()),
            (Some(op), None) => format!(
                "backend runs the chain before {}; {} executor completes it",
                op.kind(),
                executor.name()
            ),
            (Some(op), Some(complement)) => format!(
                "backend runs the chain before {}; {} executor completes it; {} operations run locally",
                op.kind(),
                executor.name(),
                complement.len()
            ),
        };
        Ok(DecompositionSummary {
            chain: chain.to_string(),
            operations,
            boundary: segments.boundary,
            executor: executor.name().to_string(),
            main: segments.main.to_string(),
            complement: segments.complement.as_ref().map(ToString::to_string),
            including: render(&segments.including),
            source_including: render(&segments.source_including),
            explanation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IncludingFallback;
    use crate::hetero::CapabilityPolicy;
    use crate::memory::MemoryBackend;
    use crate::provider::{DetachedObjects, RecordingCallbacks};
    use crate::query::QueryBuilder;
    use crate::testing::{create_test_model, sample_store};
    use ormx_proto::{Expr, ObjectKey, OpKind, Record, TypeRef, Value};

    fn engine(policy: CapabilityPolicy) -> Engine {
        let model = Arc::new(create_test_model());
        let backend = MemoryBackend::new(model.clone(), Arc::new(sample_store())).with_policy(policy);
        Engine::new(model, Arc::new(backend))
    }

    fn ids(rows: &[Value], field: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.as_record()?.get(field)?.as_i64())
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_homogeneous_chain_runs_in_backend() {
        let engine = engine(CapabilityPolicy::minimal());
        let callbacks = Arc::new(RecordingCallbacks::new());
        let engine = engine.with_callbacks(callbacks.clone());
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .filter(Expr::param(0).member("total").gt(20))
            .unwrap()
            .count()
            .unwrap()
            .build();
        assert_eq!(
            engine.execute(&chain).unwrap(),
            QueryOutput::Scalar(Value::Int64(4))
        );
        assert_eq!(callbacks.calls(), 1);
    }

    #[test]
    fn test_navigation_projection_attaches_reference() {
        let engine = engine(CapabilityPolicy::minimal());
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .select(Expr::param(0).member("customer"))
            .unwrap()
            .include(&["orders"])
            .unwrap()
            .build();
        let rows = engine.execute(&chain).unwrap().into_rows().unwrap();
        assert_eq!(ids(&rows, "id"), vec![1, 1, 2, 2, 3]);
        for row in &rows {
            let customer = row.as_record().unwrap();
            let orders = customer.get("orders").unwrap().as_list().unwrap();
            assert!(!orders.is_empty());
        }
    }

    #[test]
    fn test_projection_over_reference_member() {
        let engine = engine(CapabilityPolicy::minimal());
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .select(Expr::param(0).member("customer").member("name"))
            .unwrap()
            .build();
        let rows = engine.execute(&chain).unwrap().into_rows().unwrap();
        let mut names: Vec<&str> = rows.iter().filter_map(Value::as_str).collect();
        names.sort();
        assert_eq!(names, vec!["Ada", "Ada", "Bob", "Bob", "Cy"]);
    }

    #[test]
    fn test_heterogeneous_filter_with_complement() {
        let engine = engine(CapabilityPolicy::minimal());
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .filter(
                Expr::param(0)
                    .member("customer")
                    .member("name")
                    .equals("Ada")
                    .or(Expr::param(0).member("total").gt(90)),
            )
            .unwrap()
            .filter(Expr::param(0).member("qty").gt(1))
            .unwrap()
            .build();
        let rows = engine.execute(&chain).unwrap().into_rows().unwrap();
        assert_eq!(ids(&rows, "id"), vec![10, 11, 14]);
    }

    #[test]
    fn test_identity_map_receives_roots_once() {
        let engine = engine(CapabilityPolicy::minimal());
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .filter(
                Expr::param(0)
                    .member("total")
                    .gt(50)
                    .or(Expr::param(0).member("customer").member("name").equals("Ada")),
            )
            .unwrap()
            .build();
        let identities = IdentityMap::new(engine.model().clone());
        let rows = engine
            .execute_with(&chain, &identities)
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(ids(&rows, "id"), vec![10, 11, 12, 14]);
        let roots = identities.roots();
        assert_eq!(roots.len(), 4);
        assert!(identities.is_root(&ObjectKey::new("Order", &Value::Int64(10))));
        assert!(!identities.is_root(&ObjectKey::new("Customer", &Value::Int64(1))));
    }

    #[test]
    fn test_unregistered_executor_fails_fast() {
        let engine = engine(CapabilityPolicy::minimal())
            .with_executors(ExecutorRegistry::standard().without(OpKind::Group));
        let chain = QueryBuilder::from_extent(engine.model(), "Item")
            .unwrap()
            .group_by(Expr::param(0).member("flag"))
            .unwrap()
            .build();
        assert!(matches!(
            engine.execute(&chain),
            Err(Error::UnregisteredKind(OpKind::Group))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let engine = engine(CapabilityPolicy::minimal())
            .with_config(EngineConfig::new().with_max_depth(0));
        let chain = QueryBuilder::from_extent(engine.model(), "Order")
            .unwrap()
            .select(Expr::param(0).member("customer"))
            .unwrap()
            .build();
        assert!(matches!(
            engine.execute(&chain),
            Err(Error::DepthExceeded(0))
        ));
    }

    #[test]
    fn test_lazy_loading_toggle() {
        let model = Arc::new(create_test_model());
        let backend = MemoryBackend::new(model.clone(), Arc::new(sample_store()))
            .with_policy(CapabilityPolicy::minimal());
        let engine = Engine::new(model.clone(), Arc::new(backend));
        let ctx_chain = QueryBuilder::from_input(&model, TypeRef::entity("Order"))
            .filter(Expr::param(0).member("customer").member("name").equals("Bob"))
            .unwrap()
            .build();
        let orders = vec![
            Record::new("Order")
                .with_field("id", 12i64)
                .with_field("customer_id", 2i64)
                .into_value(),
        ];

        let lazy = engine.context(&DetachedObjects);
        let rows = lazy.run_local(&ctx_chain, orders.clone()).unwrap().into_rows().unwrap();
        assert_eq!(rows.len(), 1);

        let strict_engine = engine.with_config(EngineConfig::new().with_lazy_loading(false));
        let strict = strict_engine.context(&DetachedObjects);
        assert!(matches!(
            strict.run_local(&ctx_chain, orders),
            Err(Error::NotLoaded { .. })
        ));
    }

    #[test]
    fn test_explain_summary() {
        let engine = engine(CapabilityPolicy::minimal()).with_config(
            EngineConfig::new().with_including_fallback(IncludingFallback::FreshCut),
        );
        let chain = QueryBuilder::from_extent(engine.model(), "Item")
            .unwrap()
            .filter(Expr::param(0).member("key").gt(0))
            .unwrap()
            .group_by(Expr::param(0).member("flag"))
            .unwrap()
            .count()
            .unwrap()
            .build();
        let summary = engine.explain(&chain).unwrap();
        assert_eq!(summary.boundary, Some(1));
        assert_eq!(summary.executor, "group");
        assert_eq!(summary.heterogeneous_count(), 1);
        assert!(summary.complement.is_some());
        assert!(summary.has_local_work());

        let segments = engine.decompose(&chain).unwrap();
        assert_eq!(segments.base_chain().len(), 1);
        assert_eq!(segments.complement.map(|c| c.len()), Some(1));
    }
}
