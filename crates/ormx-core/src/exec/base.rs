//! Backend sub-query execution.

use ormx_proto::QueryChain;
use tracing::debug;

use super::context::ExecContext;
use crate::error::Error;
use crate::including::IncludingTree;
use crate::provider::PipelineRequest;
use crate::query::QueryOutput;

/// Runs homogeneous sub-queries in the backend.
///
/// The chain is compiled by the backend's generator; anything it could not
/// compile runs locally over the pipeline's rows, in which case those rows
/// are never attached as roots.
pub struct BaseQueryProvider<'c, 'a> {
    ctx: &'c ExecContext<'a>,
}

impl<'c, 'a> BaseQueryProvider<'c, 'a> {
    /// Create a provider for a context.
    pub fn new(ctx: &'c ExecContext<'a>) -> Self {
        Self { ctx }
    }

    /// Execute `chain`, loading `including` on its rows when the tree is
    /// rooted at the pipeline's element type.
    pub fn execute(
        &self,
        chain: &QueryChain,
        including: &IncludingTree,
    ) -> Result<QueryOutput, Error> {
        let generated = self.ctx.backend.generate_pipeline(chain)?;
        let element = generated.pipeline.element_type();
        let including = if including.root_type() == &element {
            including.clone()
        } else {
            IncludingTree::new(element)
        };
        debug!(
            pipeline = %generated.pipeline,
            complement = generated.complement.is_some(),
            including = including.paths().len(),
            "base query"
        );
        let request = PipelineRequest::new(generated.pipeline)
            .with_including(including)
            .with_attach(self.ctx.attach_root())
            .with_complement_only(generated.complement.is_some());
        let output =
            self.ctx
                .backend
                .execute_pipeline(&request, self.ctx.callbacks, self.ctx.attacher)?;
        match &generated.complement {
            Some(complement) => self.ctx.run_complement(complement, output.into_rows()?),
            None => Ok(output),
        }
    }
}
