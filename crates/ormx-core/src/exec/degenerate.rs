//! Degenerate projections: `x => x.a.b` and `x => x.collection`.

use ormx_proto::{Expr, Op, Value};

use super::attach::{reference_queries, referenced_base, stitched_rows};
use super::context::ExecContext;
use super::template::{boundary_op, AttachPlan, AttachingQuery, BaseQuery, OperationExecutor};
use crate::error::Error;
use crate::hetero::Segments;
use crate::query::QueryOutput;

/// Attaches the reference the path starts with and reads the path from
/// every source row. The including tree found under the path travels with
/// the attaching query, so results carry what the rest of the chain
/// includes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DegenerateExecutor;

impl OperationExecutor for DegenerateExecutor {
    fn name(&self) -> &'static str {
        "degenerate"
    }

    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        let op = boundary_op(segments)?;
        match &op.op {
            Op::Select { selector } if selector.degenerate_path().is_some() => {}
            Op::CollectionSelect { collection } if collection.degenerate_path().is_some() => {}
            _ => {
                return Err(Error::ContractViolation(format!(
                    "degenerate executor given {op}"
                )))
            }
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
        let op = boundary_op(segments)?;
        let (path, flatten) = match &op.op {
            Op::Select { selector } => (selector.degenerate_path(), false),
            Op::CollectionSelect { collection } => (collection.degenerate_path(), true),
            _ => (None, false),
        };
        let path = path.ok_or_else(|| {
            Error::ContractViolation(format!("degenerate executor given {op}"))
        })?;
        let read = Expr::param_path(0, &path);
        let rows = stitched_rows(ctx, segments, base, attached)?;
        let out = ctx.with_evaluator(|evaluator| {
            let mut out = Vec::with_capacity(rows.len());
            for row in rows {
                match (evaluator.eval(&read, &[row])?, flatten) {
                    (Value::List(items), true) => out.extend(items),
                    (Value::Null, true) => {}
                    (other, true) => {
                        return Err(Error::type_mismatch("sequence", other.type_name()))
                    }
                    (value, false) => out.push(value),
                }
            }
            Ok(out)
        })?;
        Ok(QueryOutput::Rows(out))
    }
}
