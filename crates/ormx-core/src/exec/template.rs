//! Base / attach / combine executor template.
//!
//! Every operation executor describes its work as base, attaching and
//! combine steps. The generic driver, [`execute_template`], runs them:
//!
//! 1. generate the base sub-query and the references it attaches
//! 2. cut the including tree, force mandatory includes and split off the
//!    parts the attaching queries carry
//! 3. run the base through the [`BaseQueryProvider`](super::BaseQueryProvider)
//! 4. load forced references that no attaching query covers
//! 5. generate the attaching queries
//! 6. run them as nested invocations (never attached as roots)
//! 7. combine base and attached results

use std::sync::Arc;

use ormx_proto::{MemberPath, QueryChain, QueryOp, Value};
use tracing::{debug, instrument, trace};

use super::attach::relation_query;
use super::context::ExecContext;
use crate::catalog::RelationDef;
use crate::error::Error;
use crate::hetero::{own_needs, Segments};
use crate::including::{force_includes, IncludingTree};
use crate::query::QueryOutput;

/// Base sub-query of an executor.
#[derive(Debug, Clone, Default)]
pub struct BaseQuery {
    /// Chain run in the backend, or `None` when nothing needs the backend
    /// directly.
    pub chain: Option<QueryChain>,
    /// Top-level references loaded by attaching queries instead of the base.
    pub attaching: Vec<MemberPath>,
}

/// Role of a filter sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorRole {
    /// Candidates matching the supported conjuncts.
    Coarse,
    /// Check view carrying what the unsupported conjuncts need.
    Check,
}

/// What an attaching query's rows are for.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    /// Targets of a reference of the base rows.
    Relation {
        /// Member the targets are assigned to.
        member: String,
        /// The reference.
        relation: RelationDef,
    },
    /// One sub-query of an OR-factor of a filter.
    Factor {
        /// Factor position.
        index: usize,
        /// Sub-query role.
        role: FactorRole,
    },
}

/// A query run after the base, whose rows are combined with it.
#[derive(Debug, Clone)]
pub struct AttachingQuery {
    /// The chain.
    pub chain: QueryChain,
    /// Purpose of the rows.
    pub purpose: Attachment,
}

/// Including tree after step 2.
#[derive(Debug, Clone)]
pub struct AttachPlan {
    /// Tree loaded by the base sub-query.
    pub rest: IncludingTree,
    /// Sub-trees to load with each attaching reference.
    pub overlapping: Vec<(MemberPath, IncludingTree)>,
}

/// Executor of one boundary kind.
pub trait OperationExecutor {
    /// Executor name, for logs and explain output.
    fn name(&self) -> &'static str;

    /// Whether the base rows are (part of) the result, and so attached as
    /// roots when the invocation attaches roots.
    fn base_is_result(&self) -> bool {
        false
    }

    /// Base sub-query.
    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error>;

    /// Including tree in the base rows' space.
    fn cut_including(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
    ) -> Result<IncludingTree, Error> {
        boundary_needs(ctx, segments)
    }

    /// Queries run after the base.
    fn generate_attaching(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        rows: &[Value],
        plan: &AttachPlan,
    ) -> Result<Vec<AttachingQuery>, Error>;

    /// Final result from the base output and the attached outputs.
    fn combine(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        base: QueryOutput,
        attached: Vec<(AttachingQuery, QueryOutput)>,
    ) -> Result<QueryOutput, Error>;
}

/// Run an executor over decomposed segments.
#[instrument(skip_all, fields(executor = executor.name(), depth = ctx.depth()))]
pub fn execute_template(
    ctx: &ExecContext<'_>,
    executor: &dyn OperationExecutor,
    segments: &Segments,
) -> Result<QueryOutput, Error> {
    let base = executor.generate_base(ctx, segments)?;

    let mut tree = executor.cut_including(ctx, segments)?;
    let forced = force_includes(ctx.model, &mut tree)?;
    let (mut rest, overlapping) = tree.split_overlapping(&base.attaching);
    let direct: Vec<MemberPath> = forced
        .into_iter()
        .filter(|p| p.len() == 1 && !base.attaching.iter().any(|a| p.starts_with(a)))
        .collect();
    for path in &direct {
        rest.remove(path);
    }
    let plan = AttachPlan { rest, overlapping };

    let base_ctx = if executor.base_is_result() {
        *ctx
    } else {
        ctx.with_attach_root(false)
    };
    let mut base_output = match &base.chain {
        Some(chain) => base_ctx.base_provider().execute(chain, &plan.rest)?,
        None => QueryOutput::empty(),
    };

    if !direct.is_empty() {
        if let Some(rows) = base_output.rows_mut() {
            load_forced(ctx, rows, &direct)?;
        }
    }

    let rows = base_output.rows().unwrap_or(&[]);
    let attaching = executor.generate_attaching(ctx, segments, rows, &plan)?;
    debug!(
        base = base.chain.is_some(),
        rows = base_output.len(),
        attaching = attaching.len(),
        forced = direct.len(),
        "executor plan"
    );

    let mut attached = Vec::with_capacity(attaching.len());
    if !attaching.is_empty() {
        let nested = ctx.nested()?;
        for query in attaching {
            let output = nested.execute(&query.chain)?;
            trace!(chain = %query.chain, rows = output.len(), "attaching query finished");
            attached.push((query, output));
        }
    }

    executor.combine(ctx, segments, base_output, attached)
}

/// Load mandatory references on every row, one query per row.
fn load_forced(ctx: &ExecContext<'_>, rows: &mut [Value], paths: &[MemberPath]) -> Result<(), Error> {
    let nested = ctx.nested()?;
    for row in rows.iter_mut() {
        let Value::Record(record) = row else {
            continue;
        };
        for member in paths.iter().filter_map(MemberPath::first) {
            if record.has(member) {
                continue;
            }
            let Some(relation) = ctx.model.relation(&record.shape, member) else {
                continue;
            };
            let key = record
                .get(&relation.from_field)
                .cloned()
                .unwrap_or(Value::Null);
            let related = match relation_query(relation, vec![key], None) {
                Some(chain) => nested.execute(&chain)?.into_rows()?,
                None => Vec::new(),
            };
            let value = if relation.is_collection() {
                Value::List(related)
            } else {
                related.into_iter().next().unwrap_or(Value::Null)
            };
            trace!(owner = %record.shape, member, "forced reference loaded");
            Arc::make_mut(record).set(member.to_string(), value);
        }
    }
    Ok(())
}

/// The boundary operation.
pub fn boundary_op(segments: &Segments) -> Result<&QueryOp, Error> {
    segments
        .boundary_op()
        .ok_or_else(|| Error::ContractViolation("segments have no boundary".into()))
}

/// The boundary operation alone, over a local input of its source type.
pub fn boundary_chain(segments: &Segments) -> Result<QueryChain, Error> {
    let boundary = segments
        .boundary
        .ok_or_else(|| Error::ContractViolation("segments have no boundary".into()))?;
    Ok(segments.chain.suffix(boundary).prefix(1))
}

/// Related data the boundary's input rows need: the decomposed source tree
/// plus whatever the boundary itself navigates or includes.
pub fn boundary_needs(ctx: &ExecContext<'_>, segments: &Segments) -> Result<IncludingTree, Error> {
    let mut tree = segments.source_including.clone();
    if let Some(op) = segments.boundary_op() {
        let own = own_needs(ctx.model, op)?;
        if own.root_type() == tree.root_type() {
            tree.merge(&own);
        }
    }
    Ok(tree)
}
