//! Segment orchestration: decompose, run the main segment, run the
//! complement locally.

use ormx_proto::QueryChain;
use tracing::debug;

use super::context::ExecContext;
use super::homogeneous::HomogeneousExecutor;
use super::template::{execute_template, OperationExecutor};
use crate::error::Error;
use crate::hetero::{Decomposer, Segments};
use crate::query::QueryOutput;

/// Executes one chain within a context.
pub struct SegmentExecutor<'c, 'a> {
    ctx: &'c ExecContext<'a>,
}

impl<'c, 'a> SegmentExecutor<'c, 'a> {
    /// Create a segment executor.
    pub fn new(ctx: &'c ExecContext<'a>) -> Self {
        Self { ctx }
    }

    /// Decompose `chain` with the context's policy and fallback.
    pub fn decompose(&self, chain: &QueryChain) -> Result<Segments, Error> {
        Decomposer::new(self.ctx.model, self.ctx.classifier, self.ctx.policy)
            .with_fallback(self.ctx.config.including_fallback)
            .decompose(chain)
    }

    /// Executor for the boundary of `segments`.
    pub fn executor(&self, segments: &Segments) -> Result<Box<dyn OperationExecutor>, Error> {
        match segments.boundary_kind() {
            Some(kind) => self.ctx.executors.create(kind, segments),
            None => Ok(Box::new(HomogeneousExecutor)),
        }
    }

    /// Execute `chain`.
    pub fn execute(&self, chain: &QueryChain) -> Result<QueryOutput, Error> {
        let segments = self.decompose(chain)?;
        let executor = self.executor(&segments)?;
        let attach_root = self.ctx.attach_root()
            && self.ctx.config.attach_roots
            && segments
                .complement
                .as_ref()
                .map_or(true, |c| segments.main.element_type() == c.element_type());
        debug!(
            executor = executor.name(),
            boundary = ?segments.boundary,
            attach_root,
            depth = self.ctx.depth(),
            "executing segments"
        );

        let ctx = self.ctx.with_attach_root(attach_root);
        let output = execute_template(&ctx, executor.as_ref(), &segments)?;
        match &segments.complement {
            Some(complement) => self.ctx.run_local(complement, output.into_rows()?),
            None => Ok(output),
        }
    }
}
