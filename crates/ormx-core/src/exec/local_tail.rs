//! Boundaries evaluated locally over the whole source sequence: counts,
//! arithmetic aggregates, folds, joins and zips.

use ormx_proto::{OpKind, Value};

use super::attach::{reference_queries, referenced_base, stitched_rows};
use super::context::ExecContext;
use super::template::{
    boundary_chain, boundary_op, AttachPlan, AttachingQuery, BaseQuery, OperationExecutor,
};
use crate::error::Error;
use crate::hetero::Segments;
use crate::query::QueryOutput;

/// Loads the source rows with the references the operation navigates and
/// applies the operation locally. Join and zip partners are executed as
/// nested invocations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTailExecutor;

impl LocalTailExecutor {
    /// Kinds this executor handles.
    pub const KINDS: [OpKind; 5] = [
        OpKind::Count,
        OpKind::ArithAggregate,
        OpKind::Accumulate,
        OpKind::Join,
        OpKind::Zip,
    ];
}

impl OperationExecutor for LocalTailExecutor {
    fn name(&self) -> &'static str {
        "local_tail"
    }

    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        let op = boundary_op(segments)?;
        if !Self::KINDS.contains(&op.kind()) {
            return Err(Error::ContractViolation(format!(
                "local tail executor given {}",
                op.kind()
            )));
        }
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
