//! Per-invocation execution context.

use ormx_proto::{ChainRoot, QueryChain, Record, Value};
use tracing::warn;

use super::attach::relation_query;
use super::base::BaseQueryProvider;
use super::segment::SegmentExecutor;
use super::ExecutorRegistry;
use crate::catalog::ObjectModel;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::expr::{Evaluator, MemberResolver};
use crate::hetero::{Classifier, HeterogeneityPolicy};
use crate::provider::{Backend, ExecutionCallbacks, LocalComplement, ObjectAttacher};
use crate::query::{ChainSource, LocalExecutor, QueryOutput};

/// Everything an executor needs to run one (possibly nested) invocation.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    /// Object model.
    pub model: &'a ObjectModel,
    /// Storage backend.
    pub backend: &'a dyn Backend,
    /// Classification rules.
    pub classifier: &'a Classifier,
    /// Backend capabilities used for decomposition.
    pub policy: &'a dyn HeterogeneityPolicy,
    /// Executors by boundary kind.
    pub executors: &'a ExecutorRegistry,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Backend call hooks.
    pub callbacks: &'a dyn ExecutionCallbacks,
    /// Receives every materialized object.
    pub attacher: &'a dyn ObjectAttacher,
    depth: usize,
    attach_root: bool,
}

impl<'a> ExecContext<'a> {
    /// Top-level context.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: &'a ObjectModel,
        backend: &'a dyn Backend,
        classifier: &'a Classifier,
        policy: &'a dyn HeterogeneityPolicy,
        executors: &'a ExecutorRegistry,
        config: &'a EngineConfig,
        callbacks: &'a dyn ExecutionCallbacks,
        attacher: &'a dyn ObjectAttacher,
    ) -> Self {
        Self {
            model,
            backend,
            classifier,
            policy,
            executors,
            config,
            callbacks,
            attacher,
            depth: 0,
            attach_root: true,
        }
    }

    /// Nesting depth of this invocation.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether results of this invocation become identity-map roots.
    pub fn attach_root(&self) -> bool {
        self.attach_root
    }

    /// Same context with root attachment set.
    pub fn with_attach_root(&self, attach_root: bool) -> Self {
        Self {
            attach_root,
            ..*self
        }
    }

    /// Context for a nested invocation. Nested results are never roots.
    pub fn nested(&self) -> Result<Self, Error> {
        let depth = self.depth + 1;
        if depth > self.config.max_depth {
            return Err(Error::DepthExceeded(self.config.max_depth));
        }
        Ok(Self {
            depth,
            attach_root: false,
            ..*self
        })
    }

    /// Execute a chain through decomposition.
    pub fn execute(&self, chain: &QueryChain) -> Result<QueryOutput, Error> {
        SegmentExecutor::new(self).execute(chain)
    }

    /// Provider for backend sub-queries.
    pub fn base_provider(&self) -> BaseQueryProvider<'_, 'a> {
        BaseQueryProvider::new(self)
    }

    /// Run `chain` locally over `rows`.
    pub fn run_local(&self, chain: &QueryChain, rows: Vec<Value>) -> Result<QueryOutput, Error> {
        let resolver = LazyResolver::new(self);
        LocalExecutor::new(self.model, &resolver, self).run(chain, rows)
    }

    /// Run a backend complement locally over the pipeline's rows.
    pub fn run_complement(
        &self,
        complement: &LocalComplement,
        rows: Vec<Value>,
    ) -> Result<QueryOutput, Error> {
        let resolver = LazyResolver::new(self);
        complement.run(&LocalExecutor::new(self.model, &resolver, self), rows)
    }

    /// Evaluate with an evaluator bound to this context.
    pub fn with_evaluator<T>(
        &self,
        f: impl FnOnce(&Evaluator<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let resolver = LazyResolver::new(self);
        f(&Evaluator::new(self.model, &resolver))
    }
}

impl ChainSource for ExecContext<'_> {
    fn rows(&self, chain: &QueryChain) -> Result<Vec<Value>, Error> {
        if let ChainRoot::Input(ty) = chain.root() {
            return Err(Error::ContractViolation(format!(
                "nested chain over local input of {ty} has no rows"
            )));
        }
        self.nested()?.execute(chain)?.into_rows()
    }
}

/// Resolves references that were not loaded, by querying the backend when
/// lazy loading is enabled.
pub(crate) struct LazyResolver<'c, 'a> {
    ctx: &'c ExecContext<'a>,
}

impl<'c, 'a> LazyResolver<'c, 'a> {
    pub(crate) fn new(ctx: &'c ExecContext<'a>) -> Self {
        Self { ctx }
    }
}

impl MemberResolver for LazyResolver<'_, '_> {
    fn resolve_missing(&self, record: &Record, member: &str) -> Result<Value, Error> {
        let Some(relation) = self.ctx.model.relation(&record.shape, member) else {
            return Ok(Value::Null);
        };
        if !self.ctx.config.lazy_loading {
            return Err(Error::NotLoaded {
                owner: record.shape.clone(),
                member: member.to_string(),
            });
        }
        warn!(owner = %record.shape, member, "lazily loading reference");
        let key = record
            .get(&relation.from_field)
            .cloned()
            .unwrap_or(Value::Null);
        let rows = match relation_query(relation, vec![key], None) {
            Some(chain) => self.ctx.nested()?.execute(&chain)?.into_rows()?,
            None => Vec::new(),
        };
        Ok(if relation.is_collection() {
            Value::List(rows)
        } else {
            rows.into_iter().next().unwrap_or(Value::Null)
        })
    }
}
