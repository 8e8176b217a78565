//! Grouping boundaries.

use ormx_proto::{Op, Value};

use super::attach::{reference_queries, referenced_base, stitched_rows};
use super::context::ExecContext;
use super::template::{
    boundary_chain, boundary_op, AttachPlan, AttachingQuery, BaseQuery, OperationExecutor,
};
use crate::error::Error;
use crate::hetero::Segments;
use crate::query::QueryOutput;

/// Groups the source rows locally, after attaching every reference the key
/// and element selectors navigate. Handles plain grouping and grouping with
/// a result selector.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupExecutor;

impl GroupExecutor {
    fn check(segments: &Segments) -> Result<(), Error> {
        let op = boundary_op(segments)?;
        match op.op {
            Op::Group { .. } | Op::GroupAggregate { .. } => Ok(()),
            _ => Err(Error::ContractViolation(format!(
                "group executor given {}",
                op.kind()
            ))),
        }
    }
}

impl OperationExecutor for GroupExecutor {
    fn name(&self) -> &'static str {
        "group"
    }

    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        Self::check(segments)?;
        referenced_base(ctx, segments)
    }

    fn generate_attaching(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        rows: &[Value],
        plan: &AttachPlan,
    ) -> Result<Vec<AttachingQuery>, Error> {
        let op = boundary_op(segments)?;
        reference_queries(ctx.model, &op.source_type, rows, &plan.overlapping)
    }

    fn combine(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        base: QueryOutput,
        attached: Vec<(AttachingQuery, QueryOutput)>,
    ) -> Result<QueryOutput, Error> {
        let rows = stitched_rows(ctx, segments, base, attached)?;
        ctx.run_local(&boundary_chain(segments)?, rows)
    }
}
