//! Interfaces between the engine and a storage backend.
//!
//! A backend compiles base chains into native pipelines
//! ([`PipelineGenerator`]) and executes them with an including tree
//! ([`StorageProvider`]). Materialized objects are registered through an
//! [`ObjectAttacher`]; [`ExecutionCallbacks`] observe every backend call.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ormx_proto::{ObjectKey, QueryChain, Record, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::hetero::HeterogeneityPolicy;
use crate::including::IncludingTree;
use crate::query::{LocalExecutor, QueryOutput};

/// A backend-native pipeline to execute.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// The pipeline.
    pub pipeline: QueryChain,
    /// Related data to load with each result row.
    pub including: IncludingTree,
    /// Register results as identity-map roots.
    pub attach: bool,
    /// The results only feed a local complement; never attach them as roots.
    pub complement_only: bool,
}

impl PipelineRequest {
    /// Request for a pipeline with nothing included.
    pub fn new(pipeline: QueryChain) -> Self {
        let including = IncludingTree::new(pipeline.element_type());
        Self {
            pipeline,
            including,
            attach: false,
            complement_only: false,
        }
    }

    /// Set the including tree.
    pub fn with_including(mut self, including: IncludingTree) -> Self {
        self.including = including;
        self
    }

    /// Set root attachment.
    pub fn with_attach(mut self, attach: bool) -> Self {
        self.attach = attach;
        self
    }

    /// Mark the request as feeding a local complement.
    pub fn with_complement_only(mut self, complement_only: bool) -> Self {
        self.complement_only = complement_only;
        self
    }

    /// Whether results are attached as roots.
    pub fn attaches_roots(&self) -> bool {
        self.attach && !self.complement_only
    }
}

/// Executes backend-native pipelines.
pub trait StorageProvider: Send + Sync {
    /// Execute a pipeline, loading `request.including` for each row,
    /// firing `callbacks` around the backend call and registering results
    /// with `attacher`.
    fn execute_pipeline(
        &self,
        request: &PipelineRequest,
        callbacks: &dyn ExecutionCallbacks,
        attacher: &dyn ObjectAttacher,
    ) -> Result<QueryOutput, Error>;
}

/// Operations of a chain the backend could not compile, to run locally over
/// the pipeline's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalComplement {
    /// Remaining operations, rooted at the pipeline's output.
    pub chain: QueryChain,
}

impl LocalComplement {
    /// Run the complement over pipeline rows.
    pub fn run(&self, executor: &LocalExecutor<'_>, rows: Vec<Value>) -> Result<QueryOutput, Error> {
        executor.run(&self.chain, rows)
    }
}

/// A compiled base chain.
#[derive(Debug, Clone)]
pub struct GeneratedPipeline {
    /// Backend-executable prefix.
    pub pipeline: QueryChain,
    /// Uncompilable suffix, if any.
    pub complement: Option<LocalComplement>,
}

/// Compiles chains into backend pipelines.
pub trait PipelineGenerator: Send + Sync {
    /// Compile `chain`, reporting any suffix that must run locally.
    fn generate_pipeline(&self, chain: &QueryChain) -> Result<GeneratedPipeline, Error>;
}

/// A storage backend: provider, generator and the policy describing it.
pub trait Backend: StorageProvider + PipelineGenerator {
    /// Capabilities of the backend.
    fn policy(&self) -> Arc<dyn HeterogeneityPolicy>;
}

/// Registers materialized objects with their owner.
pub trait ObjectAttacher: Send + Sync {
    /// Register `value`. An object already known to the attacher replaces
    /// `value` so every result shares one instance per identity.
    fn attach_object(&self, value: &mut Value, is_root: bool);
}

/// Attacher that ignores every object.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedObjects;

impl ObjectAttacher for DetachedObjects {
    fn attach_object(&self, _value: &mut Value, _is_root: bool) {}
}

/// Identity map of entity objects.
///
/// The first registration of an identity wins; later registrations only
/// contribute fields the registered instance does not carry yet (related
/// objects loaded by another query).
pub struct IdentityMap {
    model: Arc<ObjectModel>,
    objects: Mutex<HashMap<ObjectKey, Value>>,
    roots: Mutex<HashSet<ObjectKey>>,
}

impl IdentityMap {
    /// Create an empty identity map.
    pub fn new(model: Arc<ObjectModel>) -> Self {
        Self {
            model,
            objects: Mutex::new(HashMap::new()),
            roots: Mutex::new(HashSet::new()),
        }
    }

    /// Registered instance of an identity.
    pub fn get(&self, key: &ObjectKey) -> Option<Value> {
        self.objects.lock().get(key).cloned()
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Check if no object is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Identities registered as roots, sorted.
    pub fn roots(&self) -> Vec<ObjectKey> {
        let mut roots: Vec<ObjectKey> = self.roots.lock().iter().cloned().collect();
        roots.sort();
        roots
    }

    /// Check if an identity is a root.
    pub fn is_root(&self, key: &ObjectKey) -> bool {
        self.roots.lock().contains(key)
    }
}

fn absorb(existing: &mut Value, incoming: &Record) {
    if let Value::Record(record) = existing {
        let missing: Vec<(String, Value)> = incoming
            .fields
            .iter()
            .filter(|(name, _)| !record.has(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let record = Arc::make_mut(record);
            record.fields.extend(missing);
        }
    }
}

impl ObjectAttacher for IdentityMap {
    fn attach_object(&self, value: &mut Value, is_root: bool) {
        let Some(key) = self.model.identity_of_value(value) else {
            return;
        };
        {
            let mut objects = self.objects.lock();
            match objects.get_mut(&key) {
                Some(existing) => {
                    if let Value::Record(incoming) = value {
                        absorb(existing, incoming);
                    }
                    *value = existing.clone();
                }
                None => {
                    objects.insert(key.clone(), value.clone());
                }
            }
        }
        if is_root {
            self.roots.lock().insert(key);
        }
    }
}

/// Hooks around every backend invocation.
pub trait ExecutionCallbacks: Send + Sync {
    /// Called before the backend runs `pipeline`; may return a replacement
    /// pipeline (e.g. with an augmented predicate).
    fn before_execute(&self, _pipeline: &QueryChain) -> Option<QueryChain> {
        None
    }

    /// Called after the backend returned `output` for `pipeline`.
    fn after_execute(&self, _pipeline: &QueryChain, _output: &QueryOutput) {}
}

/// Callbacks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl ExecutionCallbacks for NoopCallbacks {}

/// Callbacks that log every backend call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallbacks;

impl ExecutionCallbacks for TracingCallbacks {
    fn before_execute(&self, pipeline: &QueryChain) -> Option<QueryChain> {
        debug!(%pipeline, "executing backend pipeline");
        None
    }

    fn after_execute(&self, pipeline: &QueryChain, output: &QueryOutput) {
        debug!(%pipeline, rows = output.len(), "backend pipeline finished");
    }
}

/// Callbacks that record every executed pipeline.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    pipelines: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered pipelines, in execution order.
    pub fn pipelines(&self) -> Vec<String> {
        self.pipelines.lock().clone()
    }

    /// Number of backend calls.
    pub fn calls(&self) -> usize {
        self.pipelines.lock().len()
    }
}

impl ExecutionCallbacks for RecordingCallbacks {
    fn before_execute(&self, pipeline: &QueryChain) -> Option<QueryChain> {
        self.pipelines.lock().push(pipeline.to_string());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;

    fn item(key: i64, tag: Option<&str>) -> Value {
        let mut record = Record::new("Item").with_field("key", key);
        if let Some(tag) = tag {
            record = record.with_field("tag", tag);
        }
        record.into_value()
    }

    #[test]
    fn test_identity_map_first_wins_and_absorbs() {
        let map = IdentityMap::new(Arc::new(create_test_model()));
        let mut first = item(1, None);
        map.attach_object(&mut first, true);

        let mut second = item(1, Some("t1"));
        map.attach_object(&mut second, false);
        assert_eq!(second.as_record().unwrap().get("tag"), Some(&Value::from("t1")));

        let mut third = item(1, Some("other"));
        map.attach_object(&mut third, true);
        assert_eq!(third.as_record().unwrap().get("tag"), Some(&Value::from("t1")));

        assert_eq!(map.len(), 1);
        assert_eq!(map.roots(), vec![ObjectKey::new("Item", &Value::Int64(1))]);
    }

    #[test]
    fn test_identity_map_ignores_non_entities() {
        let map = IdentityMap::new(Arc::new(create_test_model()));
        let mut value = Value::Int64(3);
        map.attach_object(&mut value, true);
        let mut shape = Record::new("Summary").with_field("Id", 1i64).into_value();
        map.attach_object(&mut shape, true);
        assert!(map.is_empty());
        assert!(map.roots().is_empty());
    }

    #[test]
    fn test_recording_callbacks() {
        let callbacks = RecordingCallbacks::new();
        let chain = QueryChain::extent("Item");
        assert!(callbacks.before_execute(&chain).is_none());
        callbacks.after_execute(&chain, &QueryOutput::empty());
        assert_eq!(callbacks.pipelines(), vec!["Item".to_string()]);
        assert_eq!(callbacks.calls(), 1);
    }

    #[test]
    fn test_noop_callbacks_keep_pipeline() {
        let callbacks = NoopCallbacks;
        let chain = QueryChain::extent("Item");
        assert!(callbacks.before_execute(&chain).is_none());
        callbacks.after_execute(&chain, &QueryOutput::empty());
    }

    #[test]
    fn test_request_roots() {
        let request = PipelineRequest::new(QueryChain::extent("Item")).with_attach(true);
        assert!(request.attaches_roots());
        assert!(!request.with_complement_only(true).attaches_roots());
    }
}
