//! Attaching queries for references and stitching their results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ormx_proto::{Expr, Lambda, MemberPath, Op, QueryChain, QueryOp, TypeRef, Value};
use tracing::trace;

use super::context::ExecContext;
use super::template::{boundary_needs, AttachingQuery, Attachment, BaseQuery};
use crate::catalog::{ObjectModel, RelationDef};
use crate::error::Error;
use crate::hetero::Segments;
use crate::including::IncludingTree;
use crate::query::QueryOutput;

/// Chain loading the targets of `relation` whose key is one of `keys`,
/// with `including` loaded on them. `None` when no key is set.
pub fn relation_query(
    relation: &RelationDef,
    keys: Vec<Value>,
    including: Option<&IncludingTree>,
) -> Option<QueryChain> {
    let mut seen = HashSet::new();
    let keys: Vec<Value> = keys
        .into_iter()
        .filter(|k| !k.is_null() && seen.insert(k.key_string()))
        .collect();
    if keys.is_empty() {
        return None;
    }
    let target = TypeRef::entity(&relation.to_entity);
    let predicate = Expr::param(0).member(&relation.to_field).in_list(keys);
    let mut chain = QueryChain::extent(&relation.to_entity).with_op(QueryOp::new(
        Op::Where {
            predicate: Lambda::unary(predicate),
        },
        target.clone(),
        target.clone(),
    ));
    if let Some(including) = including.filter(|t| !t.is_empty()) {
        chain = chain.with_op(QueryOp::new(
            Op::Include {
                paths: including.leaf_paths(),
            },
            target.clone(),
            target,
        ));
    }
    Some(chain)
}

/// Top-level members of `tree` that are references of an entity source.
/// Anything else is materialized with the source rows themselves.
pub fn reference_members(model: &ObjectModel, tree: &IncludingTree) -> Vec<MemberPath> {
    let TypeRef::Entity(entity) = tree.root_type() else {
        return Vec::new();
    };
    tree.children()
        .iter()
        .filter(|node| model.relation(entity, &node.name).is_some())
        .map(|node| MemberPath::from_segments([node.name.clone()]))
        .collect()
}

/// One attaching query per overlapping reference, keyed by the values the
/// base rows hold.
pub fn reference_queries(
    model: &ObjectModel,
    source_type: &TypeRef,
    rows: &[Value],
    overlapping: &[(MemberPath, IncludingTree)],
) -> Result<Vec<AttachingQuery>, Error> {
    let TypeRef::Entity(entity) = source_type else {
        return Ok(Vec::new());
    };
    let mut queries = Vec::new();
    for (path, subtree) in overlapping {
        let Some(member) = path.first().filter(|_| path.len() == 1) else {
            continue;
        };
        let relation = model
            .relation(entity, member)
            .ok_or_else(|| Error::unknown_member(entity, member))?;
        let keys = rows
            .iter()
            .filter_map(|row| row.as_record()?.get(&relation.from_field).cloned())
            .collect();
        if let Some(chain) = relation_query(relation, keys, Some(subtree)) {
            trace!(%chain, member, "attaching query");
            queries.push(AttachingQuery {
                chain,
                purpose: Attachment::Relation {
                    member: member.to_string(),
                    relation: relation.clone(),
                },
            });
        }
    }
    Ok(queries)
}

/// Assign related objects to the `member` of every row.
pub fn stitch(rows: &mut [Value], member: &str, relation: &RelationDef, related: Vec<Value>) {
    let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
    for object in related {
        let Some(key) = object
            .as_record()
            .and_then(|r| r.get(&relation.to_field))
            .map(Value::key_string)
        else {
            continue;
        };
        by_key.entry(key).or_default().push(object);
    }
    for row in rows.iter_mut() {
        let Value::Record(record) = row else {
            continue;
        };
        let matches = record
            .get(&relation.from_field)
            .filter(|k| !k.is_null())
            .and_then(|k| by_key.get(&k.key_string()))
            .cloned()
            .unwrap_or_default();
        let value = if relation.is_collection() {
            Value::List(matches)
        } else {
            matches.into_iter().next().unwrap_or(Value::Null)
        };
        Arc::make_mut(record).set(member.to_string(), value);
    }
}

/// Stitch every relation attachment into the base rows.
pub fn stitch_all(
    base: QueryOutput,
    attached: Vec<(AttachingQuery, QueryOutput)>,
) -> Result<Vec<Value>, Error> {
    let mut rows = base.into_rows()?;
    for (query, output) in attached {
        if let Attachment::Relation { member, relation } = query.purpose {
            stitch(&mut rows, &member, &relation, output.into_rows()?);
        }
    }
    Ok(rows)
}

/// Rows with every reference member not loaded yet set to its empty value,
/// so local evaluation never needs to load them.
pub fn settle_references(model: &ObjectModel, rows: &mut [Value], members: &[MemberPath]) {
    for row in rows.iter_mut() {
        let Value::Record(record) = row else {
            continue;
        };
        for member in members.iter().filter_map(MemberPath::first) {
            if record.has(member) {
                continue;
            }
            let Some(relation) = model.relation(&record.shape, member) else {
                continue;
            };
            let empty = if relation.is_collection() {
                Value::List(Vec::new())
            } else {
                Value::Null
            };
            Arc::make_mut(record).set(member.to_string(), empty);
        }
    }
}

/// Base query of executors that run the boundary over source rows with
/// their references attached: the chain before the boundary, attaching
/// every reference the boundary navigates.
pub fn referenced_base(ctx: &ExecContext<'_>, segments: &Segments) -> Result<BaseQuery, Error> {
    let needs = boundary_needs(ctx, segments)?;
    Ok(BaseQuery {
        chain: Some(segments.base_chain()),
        attaching: reference_members(ctx.model, &needs),
    })
}

/// Base rows with the attached references stitched in. References no
/// attaching query covered (no row had a key) are set empty.
pub fn stitched_rows(
    ctx: &ExecContext<'_>,
    segments: &Segments,
    base: QueryOutput,
    attached: Vec<(AttachingQuery, QueryOutput)>,
) -> Result<Vec<Value>, Error> {
    let mut rows = stitch_all(base, attached)?;
    let needs = boundary_needs(ctx, segments)?;
    settle_references(ctx.model, &mut rows, &reference_members(ctx.model, &needs));
    Ok(rows)
}
