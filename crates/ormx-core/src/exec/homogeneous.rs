//! Pass-through executor for chains the backend runs entirely.

use ormx_proto::Value;

use super::context::ExecContext;
use super::template::{AttachPlan, AttachingQuery, BaseQuery, OperationExecutor};
use crate::error::Error;
use crate::hetero::Segments;
use crate::including::IncludingTree;
use crate::query::QueryOutput;

/// Runs the main segment as the base and returns its output unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct HomogeneousExecutor;

impl OperationExecutor for HomogeneousExecutor {
    fn name(&self) -> &'static str {
        "homogeneous"
    }

    fn base_is_result(&self) -> bool {
        true
    }

    fn generate_base(&self, _ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        Ok(BaseQuery {
            chain: Some(segments.main.clone()),
            attaching: Vec::new(),
        })
    }

    fn cut_including(
        &self,
        _ctx: &ExecContext<'_>,
        segments: &Segments,
    ) -> Result<IncludingTree, Error> {
        Ok(segments.including.clone())
    }

    fn generate_attaching(
        &self,
        _ctx: &ExecContext<'_>,
        _segments: &Segments,
        _rows: &[Value],
        _plan: &AttachPlan,
    ) -> Result<Vec<AttachingQuery>, Error> {
        Ok(Vec::new())
    }

    fn combine(
        &self,
        _ctx: &ExecContext<'_>,
        _segments: &Segments,
        base: QueryOutput,
        _attached: Vec<(AttachingQuery, QueryOutput)>,
    ) -> Result<QueryOutput, Error> {
        Ok(base)
    }
}
