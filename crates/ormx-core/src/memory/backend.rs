//! Reference backend over a [`MemoryStore`].
//!
//! The backend executes pipelines by linear scans, resolving navigations
//! straight from the store. Its [`HeterogeneityPolicy`] decides which
//! pipelines it accepts: operations the policy marks heterogeneous are
//! rejected at execution and left out of generated pipelines.

use std::sync::Arc;

use ormx_proto::{ChainRoot, QueryChain, Record, Value};
use tracing::debug;

use super::MemoryStore;
use crate::catalog::{ObjectModel, RelationDef};
use crate::error::Error;
use crate::expr::MemberResolver;
use crate::hetero::{CapabilityPolicy, Classifier, HeterogeneityPolicy};
use crate::including::IncludeNode;
use crate::provider::{
    Backend, ExecutionCallbacks, GeneratedPipeline, LocalComplement, ObjectAttacher,
    PipelineGenerator, PipelineRequest, StorageProvider,
};
use crate::query::{ChainSource, LocalExecutor, QueryOutput};

/// In-memory storage backend.
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    model: Arc<ObjectModel>,
    policy: Arc<dyn HeterogeneityPolicy>,
    classifier: Classifier,
}

impl MemoryBackend {
    /// Create a fully capable backend.
    pub fn new(model: Arc<ObjectModel>, store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            model,
            policy: Arc::new(CapabilityPolicy::full()),
            classifier: Classifier::standard(),
        }
    }

    /// Restrict the backend to a policy.
    pub fn with_policy(mut self, policy: impl HeterogeneityPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Position of the first operation the backend cannot run.
    fn first_unsupported(&self, chain: &QueryChain) -> Result<Option<usize>, Error> {
        let classification =
            self.classifier
                .classify_chain(&self.model, self.policy.as_ref(), chain)?;
        Ok(classification.iter().position(|h| *h))
    }

    /// Execute a chain natively, without loading includes.
    pub fn evaluate(&self, chain: &QueryChain) -> Result<QueryOutput, Error> {
        if let Some(position) = self.first_unsupported(chain)? {
            return Err(Error::Backend(format!(
                "{} at position {position} is not supported by policy {}",
                chain.ops()[position].kind(),
                self.policy.name()
            )));
        }
        let entity = match chain.root() {
            ChainRoot::Extent(entity) => entity,
            ChainRoot::Input(ty) => {
                return Err(Error::Backend(format!(
                    "cannot execute a pipeline over local input of {ty}"
                )))
            }
        };
        let rows = self.store.scan(entity);
        let resolver = StoreResolver { backend: self };
        LocalExecutor::new(&self.model, &resolver, self).run(chain, rows)
    }

    /// Objects related to `record` through `relation`.
    fn related(&self, record: &Record, relation: &RelationDef) -> Value {
        let key = record.get(&relation.from_field).cloned().unwrap_or(Value::Null);
        let matches = self
            .store
            .find_by(&relation.to_entity, &relation.to_field, &key);
        if relation.is_collection() {
            Value::List(matches)
        } else {
            matches.into_iter().next().unwrap_or(Value::Null)
        }
    }

    /// Load the included nodes into `value`.
    fn hydrate(&self, value: &mut Value, nodes: &[IncludeNode]) -> Result<(), Error> {
        if nodes.is_empty() {
            return Ok(());
        }
        match value {
            Value::List(items) => {
                for item in items {
                    self.hydrate(item, nodes)?;
                }
            }
            Value::Record(record) => {
                let record = Arc::make_mut(record);
                for node in nodes {
                    match self.model.relation(&record.shape, &node.name) {
                        Some(relation) => {
                            let mut related = self.related(record, relation);
                            self.hydrate(&mut related, &node.children)?;
                            record.set(node.name.clone(), related);
                        }
                        None => {
                            if let Some(field) = record.get_mut(&node.name) {
                                self.hydrate(field, &node.children)?;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl ChainSource for MemoryBackend {
    fn rows(&self, chain: &QueryChain) -> Result<Vec<Value>, Error> {
        self.evaluate(chain)?.into_rows()
    }
}

/// Resolves navigations from the store during native evaluation.
struct StoreResolver<'a> {
    backend: &'a MemoryBackend,
}

impl MemberResolver for StoreResolver<'_> {
    fn resolve_missing(&self, record: &Record, member: &str) -> Result<Value, Error> {
        Ok(match self.backend.model.relation(&record.shape, member) {
            Some(relation) => self.backend.related(record, relation),
            None => Value::Null,
        })
    }
}

impl StorageProvider for MemoryBackend {
    fn execute_pipeline(
        &self,
        request: &PipelineRequest,
        callbacks: &dyn ExecutionCallbacks,
        attacher: &dyn ObjectAttacher,
    ) -> Result<QueryOutput, Error> {
        let replaced = callbacks.before_execute(&request.pipeline);
        let pipeline = replaced.as_ref().unwrap_or(&request.pipeline);
        let mut output = self.evaluate(pipeline)?;
        if let Some(rows) = output.rows_mut() {
            let is_root = request.attaches_roots();
            for row in rows.iter_mut() {
                self.hydrate(row, request.including.children())?;
                attacher.attach_object(row, is_root);
            }
        }
        debug!(
            %pipeline,
            rows = output.len(),
            including = request.including.paths().len(),
            "memory pipeline executed"
        );
        callbacks.after_execute(pipeline, &output);
        Ok(output)
    }
}

impl PipelineGenerator for MemoryBackend {
    fn generate_pipeline(&self, chain: &QueryChain) -> Result<GeneratedPipeline, Error> {
        Ok(match self.first_unsupported(chain)? {
            Some(position) => {
                let (pipeline, rest) = chain.split_at(position);
                GeneratedPipeline {
                    pipeline,
                    complement: Some(LocalComplement { chain: rest }),
                }
            }
            None => GeneratedPipeline {
                pipeline: chain.clone(),
                complement: None,
            },
        })
    }
}

impl Backend for MemoryBackend {
    fn policy(&self) -> Arc<dyn HeterogeneityPolicy> {
        self.policy.clone()
    }
}
