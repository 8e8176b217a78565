//! Filters whose predicate the backend can only partly evaluate.
//!
//! The predicate is split into OR-factors. Factors the backend supports
//! entirely are folded into one backend filter. Every other factor runs its
//! supported conjuncts as a coarse sub-query and is re-validated through a
//! generated check view: a projection carrying the row identity plus every
//! member path the unsupported conjuncts read. The check view goes through
//! the full engine; the unsupported conjuncts, rewritten over the check
//! view's members, are evaluated locally. Results are united by identity,
//! first writer wins.

use std::collections::{HashMap, HashSet};

use ormx_proto::{Expr, Lambda, MemberPath, ObjectKey, Op, QueryChain, QueryOp, TypeRef, Value};
use tracing::debug;

use super::attach::{reference_queries, referenced_base, stitched_rows};
use super::context::ExecContext;
use super::template::{
    boundary_chain, boundary_op, AttachPlan, AttachingQuery, Attachment, BaseQuery, FactorRole,
    OperationExecutor,
};
use crate::error::Error;
use crate::expr::infer;
use crate::expr::predicate::{conjoin, disjoin, member_paths, rewrite_paths};
use crate::hetero::{split_factors, FactorSplit, Segments};
use crate::query::QueryOutput;

/// Member of a check view carrying the row identity.
pub const CHECK_IDENTITY: &str = "Id";

/// One heterogeneous OR-factor.
#[derive(Debug, Clone)]
struct FactorPlan {
    index: usize,
    split: FactorSplit,
    /// Member paths the unsupported conjuncts read, bound to `P0`, `P1`, ...
    paths: Vec<MemberPath>,
    /// Unsupported conjuncts over a check view row.
    check: Expr,
}

#[derive(Debug, Clone)]
struct FilterPlan {
    entity: String,
    identity: String,
    row_type: TypeRef,
    homogeneous: Vec<Expr>,
    factors: Vec<FactorPlan>,
}

/// Name of the check view shape of a factor.
pub fn check_shape_name(entity: &str, factor: &Expr) -> String {
    let digest = blake3::hash(factor.to_string().as_bytes());
    format!("{entity}Check{}", &hex::encode(digest.as_bytes())[..8])
}

fn where_op(row_type: &TypeRef, predicate: Expr) -> QueryOp {
    QueryOp::new(
        Op::Where {
            predicate: Lambda::unary(predicate),
        },
        row_type.clone(),
        row_type.clone(),
    )
}

/// Splits entity filters by OR-factor and re-validates heterogeneous
/// factors through check views. Filters over rows without identity load
/// the rows and filter them locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterExecutor;

impl FilterExecutor {
    fn plan(ctx: &ExecContext<'_>, segments: &Segments) -> Result<Option<FilterPlan>, Error> {
        let op = boundary_op(segments)?;
        let Op::Where { predicate } = &op.op else {
            return Err(Error::ContractViolation(format!(
                "filter executor given {}",
                op.kind()
            )));
        };
        let TypeRef::Entity(entity) = &op.source_type else {
            return Ok(None);
        };
        let identity = ctx.model.identity_field(entity)?.to_string();

        let mut homogeneous = Vec::new();
        let mut factors = Vec::new();
        for (index, split) in split_factors(ctx.model, ctx.policy, &predicate.body, &op.source_type)?
            .into_iter()
            .enumerate()
        {
            if split.is_homogeneous() {
                homogeneous.push(split.factor);
                continue;
            }
            let unsupported = conjoin(split.unsupported.iter().cloned())
                .ok_or_else(|| Error::ContractViolation("empty heterogeneous factor".into()))?;
            let paths = member_paths(&unsupported, 0);
            let mapping: Vec<(MemberPath, Expr)> = paths
                .iter()
                .enumerate()
                .map(|(i, path)| (path.clone(), Expr::param(0).member(format!("P{i}"))))
                .collect();
            let check = rewrite_paths(&unsupported, 0, &mapping);
            factors.push(FactorPlan {
                index,
                split,
                paths,
                check,
            });
        }
        Ok(Some(FilterPlan {
            entity: entity.clone(),
            identity,
            row_type: op.source_type.clone(),
            homogeneous,
            factors,
        }))
    }

    /// Source chain filtered by the factor's supported conjuncts.
    fn coarse_chain(segments: &Segments, plan: &FilterPlan, factor: &FactorPlan) -> QueryChain {
        let chain = segments.base_chain();
        match conjoin(factor.split.supported.iter().cloned()) {
            Some(supported) => chain.with_op(where_op(&plan.row_type, supported)),
            None => chain,
        }
    }

    /// Projection of the coarse rows onto identity and the paths the
    /// unsupported conjuncts read.
    fn check_op(
        ctx: &ExecContext<'_>,
        plan: &FilterPlan,
        factor: &FactorPlan,
    ) -> Result<QueryOp, Error> {
        let shape = check_shape_name(&plan.entity, &factor.split.factor);
        let mut members = vec![(
            CHECK_IDENTITY.to_string(),
            Expr::param(0).member(&plan.identity),
        )];
        members.extend(
            factor
                .paths
                .iter()
                .enumerate()
                .map(|(i, path)| (format!("P{i}"), Expr::param_path(0, path))),
        );
        let body = Expr::new_shape(shape, members);
        let result_type = infer(ctx.model, &body, std::slice::from_ref(&plan.row_type))?;
        Ok(QueryOp::new(
            Op::Select {
                selector: Lambda::unary(body),
            },
            plan.row_type.clone(),
            result_type,
        ))
    }
}

impl OperationExecutor for FilterExecutor {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn base_is_result(&self) -> bool {
        true
    }

    fn generate_base(&self, ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
        let Some(plan) = Self::plan(ctx, segments)? else {
            return referenced_base(ctx, segments);
        };
        debug!(
            entity = %plan.entity,
            homogeneous = plan.homogeneous.len(),
            heterogeneous = plan.factors.len(),
            "filter factors"
        );
        let chain = disjoin(plan.homogeneous)
            .map(|predicate| segments.base_chain().with_op(where_op(&plan.row_type, predicate)));
        Ok(BaseQuery {
            chain,
            attaching: Vec::new(),
        })
    }

    fn generate_attaching(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        rows: &[Value],
        plan: &AttachPlan,
    ) -> Result<Vec<AttachingQuery>, Error> {
        let Some(filter) = Self::plan(ctx, segments)? else {
            let op = boundary_op(segments)?;
            return reference_queries(ctx.model, &op.source_type, rows, &plan.overlapping);
        };
        let include = (!plan.rest.is_empty() && plan.rest.root_type() == &filter.row_type)
            .then(|| plan.rest.leaf_paths());
        let mut queries = Vec::with_capacity(filter.factors.len() * 2);
        for factor in &filter.factors {
            let coarse = Self::coarse_chain(segments, &filter, factor);
            let check = coarse.with_op(Self::check_op(ctx, &filter, factor)?);
            let coarse = match &include {
                Some(paths) => coarse.with_op(QueryOp::new(
                    Op::Include {
                        paths: paths.clone(),
                    },
                    filter.row_type.clone(),
                    filter.row_type.clone(),
                )),
                None => coarse,
            };
            queries.push(AttachingQuery {
                chain: coarse,
                purpose: Attachment::Factor {
                    index: factor.index,
                    role: FactorRole::Coarse,
                },
            });
            queries.push(AttachingQuery {
                chain: check,
                purpose: Attachment::Factor {
                    index: factor.index,
                    role: FactorRole::Check,
                },
            });
        }
        Ok(queries)
    }

    fn combine(
        &self,
        ctx: &ExecContext<'_>,
        segments: &Segments,
        base: QueryOutput,
        attached: Vec<(AttachingQuery, QueryOutput)>,
    ) -> Result<QueryOutput, Error> {
        let Some(plan) = Self::plan(ctx, segments)? else {
            let rows = stitched_rows(ctx, segments, base, attached)?;
            return ctx.run_local(&boundary_chain(segments)?, rows);
        };

        let mut seen: HashSet<ObjectKey> = HashSet::new();
        let mut out = Vec::new();
        for row in base.into_rows()? {
            let duplicate = ctx
                .model
                .identity_of_value(&row)
                .is_some_and(|key| !seen.insert(key));
            if !duplicate {
                out.push(row);
            }
        }

        let mut coarse: HashMap<usize, Vec<Value>> = HashMap::new();
        let mut checks: HashMap<usize, Vec<Value>> = HashMap::new();
        for (query, output) in attached {
            if let Attachment::Factor { index, role } = query.purpose {
                let rows = output.into_rows()?;
                match role {
                    FactorRole::Coarse => coarse.insert(index, rows),
                    FactorRole::Check => checks.insert(index, rows),
                };
            }
        }

        ctx.with_evaluator(|evaluator| {
            for factor in &plan.factors {
                let mut accepted: HashSet<ObjectKey> = HashSet::new();
                for check in checks.remove(&factor.index).unwrap_or_default() {
                    if !evaluator.eval_bool(&factor.check, std::slice::from_ref(&check))? {
                        continue;
                    }
                    if let Some(id) = check.as_record().and_then(|r| r.get(CHECK_IDENTITY)) {
                        accepted.insert(ObjectKey::new(&plan.entity, id));
                    }
                }
                for mut row in coarse.remove(&factor.index).unwrap_or_default() {
                    let Some(key) = ctx.model.identity_of_value(&row) else {
                        continue;
                    };
                    if accepted.contains(&key) && seen.insert(key) {
                        ctx.attacher.attach_object(&mut row, ctx.attach_root());
                        out.push(row);
                    }
                }
            }
            Ok(())
        })?;
        Ok(QueryOutput::Rows(out))
    }
}
