//! Projection boundaries: new-instance, computed and multi-valued
//! projections instantiated through their Type View.

use ormx_proto::{Op, Value};
use tracing::trace;

use super::attach::{reference_queries, referenced_base, stitched_rows};
use super::context::ExecContext;
use super::template::{boundary_op, AttachPlan, AttachingQuery, BaseQuery, OperationExecutor};
use crate::error::Error;
use crate::hetero::Segments;
use crate::query::QueryOutput;
use crate::view::TypeView;

/// Loads the source rows, attaches the references the view's source
/// extension reaches and instantiates the view once per row (or per
/// flattened item).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectionExecutor;

fn view(segments: &Segments) -> Result<&TypeView, Error> {
    segments
        .view
        .as_deref()
        .ok_or_else(|| Error::ContractViolation("projection boundary has no type view".into()))
}

fn sequence(value: Value) -> Result<Vec<Value>, Error> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::List(items) => Ok(items),
        other => Err(Error::type_mismatch("sequence", other.type_name())),
    }
}

impl OperationExecutor for ProjectionExecutor {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        let op = boundary_op(segments)?;
        if !matches!(
            op.op,
            Op::Select { .. } | Op::CollectionSelect { .. } | Op::CombiningSelect { .. }
        ) {
            return Err(Error::ContractViolation(format!(
                "projection executor given {}",
                op.kind()
            )));
        }
        view(segments)?;
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
        let view = view(segments)?;
        let rows = stitched_rows(ctx, segments, base, attached)?;
        trace!(shape = %view.descriptor.name, rows = rows.len(), "instantiating view");
        let out = ctx.with_evaluator(|evaluator| {
            let mut out = Vec::with_capacity(rows.len());
            match &op.op {
                Op::Select { .. } => {
                    let indexed = view.params.len() >= 2;
                    for (index, row) in rows.into_iter().enumerate() {
                        let env = if indexed {
                            vec![row, Value::Int64(index as i64)]
                        } else {
                            vec![row]
                        };
                        out.push(view.instantiate(evaluator, &env)?);
                    }
                }
                Op::CollectionSelect { .. } => {
                    for row in rows {
                        out.extend(sequence(view.instantiate(evaluator, &[row])?)?);
                    }
                }
                Op::CombiningSelect { .. } => {
                    let flattening = view.flattening.as_ref().ok_or_else(|| {
                        Error::ContractViolation("combining projection has no flattening".into())
                    })?;
                    for row in rows {
                        let env = std::slice::from_ref(&row);
                        let items = sequence(evaluator.eval(&flattening.collection.body, env)?)?;
                        for item in items {
                            out.push(view.instantiate(evaluator, &[row.clone(), item])?);
                        }
                    }
                }
                _ => {
                    return Err(Error::ContractViolation(format!(
                        "projection executor given {}",
                        op.kind()
                    )))
                }
            }
            Ok(out)
        })?;
        Ok(QueryOutput::Rows(out))
    }
}
