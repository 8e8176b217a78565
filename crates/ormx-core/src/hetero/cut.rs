//! Including-tree cut rules per operation kind.
//!
//! [`cut`] carries a tree from an operation's source space into its result
//! space; [`lift`] carries a tree needed in the result space back into the
//! source space. [`own_needs`] collects what an operation navigates itself.

use ormx_proto::{MemberPath, Op, QueryOp, TypeRef};

use crate::catalog::{ObjectModel, GROUP_ELEMENTS, GROUP_KEY};
use crate::error::Error;
use crate::expr::navigation_paths;
use crate::including::IncludingTree;
use crate::query::lambda_signatures;
use crate::view::{ParserKind, TypeView};

/// Path a degenerate projection narrows to.
fn degenerate_path(op: &QueryOp) -> Option<MemberPath> {
    match &op.op {
        Op::Select { selector } if selector.arity() == 1 => selector.degenerate_path(),
        Op::CollectionSelect { collection } => collection.degenerate_path(),
        _ => None,
    }
}

fn is_degenerate(op: &QueryOp, view: Option<&TypeView>) -> Option<MemberPath> {
    match view {
        Some(view) if view.parser == ParserKind::Degenerate => degenerate_path(op),
        _ => None,
    }
}

/// Remap through a projection view.
fn project(tree: &IncludingTree, view: &TypeView) -> Option<IncludingTree> {
    let mapping = view.object_mapping();
    if view.unwrap {
        let (_, anchor) = mapping.into_iter().next()?;
        return tree.search(&anchor);
    }
    tree.cut_by_mapping(view.result_type(), &mapping)
}

/// Group element and key paths, when they are plain member paths.
fn group_paths(op: &QueryOp) -> Option<(Option<MemberPath>, Option<MemberPath>)> {
    let (key, element) = match &op.op {
        Op::Group { key, element, .. } | Op::GroupAggregate { key, element, .. } => {
            (key, element)
        }
        _ => return None,
    };
    let element_path = match element {
        Some(element) => element.degenerate_path(),
        None => Some(MemberPath::root()),
    };
    Some((element_path, key.degenerate_path()))
}

fn grouping_tree(
    model: &ObjectModel,
    grouping: TypeRef,
    tree: &IncludingTree,
    element_path: Option<MemberPath>,
    key_path: Option<MemberPath>,
) -> Result<Option<IncludingTree>, Error> {
    let mut cut = IncludingTree::new(grouping);
    if let Some(sub) = element_path.and_then(|p| tree.search(&p)) {
        if sub.root_type().is_object() && !sub.is_empty() {
            cut.graft(model, &MemberPath::parse(GROUP_ELEMENTS), &sub)?;
        }
    }
    if let Some(path) = key_path.filter(|p| !p.is_root()) {
        if let Some(sub) = tree.search(&path) {
            if sub.root_type().is_object() {
                cut.graft(model, &MemberPath::parse(GROUP_KEY), &sub)?;
            }
        }
    }
    Ok(if cut.is_empty() { None } else { Some(cut) })
}

/// Cut `tree` (rooted at the source type of `op`) across `op`.
///
/// Returns `None` when nothing of the tree survives.
pub fn cut(
    model: &ObjectModel,
    op: &QueryOp,
    view: Option<&TypeView>,
    tree: &IncludingTree,
) -> Result<Option<IncludingTree>, Error> {
    let cut = match &op.op {
        Op::Where { .. } | Op::Include { .. } => Some(tree.clone()),
        Op::Select { .. } | Op::CollectionSelect { .. } | Op::CombiningSelect { .. } => {
            match (is_degenerate(op, view), view) {
                (Some(path), _) => tree.search(&path),
                (None, Some(view)) => project(tree, view),
                (None, None) => None,
            }
        }
        Op::Group { .. } => match group_paths(op) {
            Some((element_path, key_path)) => grouping_tree(
                model,
                op.result_type.clone(),
                tree,
                element_path,
                key_path,
            )?,
            None => None,
        },
        Op::GroupAggregate { .. } => match (view, group_paths(op)) {
            (Some(view), Some((element_path, key_path))) => {
                let key_type = view.params.first().cloned().unwrap_or(TypeRef::Unknown);
                let element_type = view
                    .params
                    .get(1)
                    .and_then(|t| t.element().cloned())
                    .unwrap_or_else(|| op.source_type.clone());
                let grouping = TypeRef::grouping(key_type, element_type);
                grouping_tree(model, grouping, tree, element_path, key_path)?
                    .and_then(|grouped| group_result(&grouped, view))
            }
            _ => None,
        },
        Op::Count { .. } | Op::ArithAggregate { .. } | Op::Join { .. } | Op::Zip { .. } => None,
        Op::Accumulate {
            seed_type, result, ..
        } => {
            if *seed_type != op.source_type {
                None
            } else {
                match (result, view) {
                    (None, _) => Some(tree.clone()),
                    (Some(_), Some(view)) => project(tree, view),
                    (Some(_), None) => None,
                }
            }
        }
    };
    Ok(cut.map(|t| t.rerooted(op.result_type.clone())))
}

/// Map a grouping tree through a result selector whose parameters are the
/// key and the element sequence.
fn group_result(grouped: &IncludingTree, view: &TypeView) -> Option<IncludingTree> {
    let base = |param: usize| {
        MemberPath::parse(if param == 0 { GROUP_KEY } else { GROUP_ELEMENTS })
    };
    let mapping: Vec<(String, MemberPath)> = view
        .elements
        .iter()
        .filter_map(|e| {
            let (param, path) = e.expr.member_chain()?;
            Some((e.name.clone(), base(param).join(&path)))
        })
        .collect();
    if view.unwrap {
        let (_, source) = mapping.into_iter().next()?;
        return grouped.search(&source);
    }
    grouped.cut_by_mapping(view.result_type(), &mapping)
}

/// Carry a tree needed in the result space of `op` back into its source
/// space. Returns `None` when the operation does not preserve object
/// identity along plain paths.
pub fn lift(
    model: &ObjectModel,
    op: &QueryOp,
    view: Option<&TypeView>,
    needed: &IncludingTree,
) -> Result<Option<IncludingTree>, Error> {
    let source = op.source_type.clone();
    if needed.is_empty() {
        return Ok(Some(IncludingTree::new(source)));
    }
    let mut lifted = IncludingTree::new(source.clone());
    match &op.op {
        Op::Where { .. } | Op::Include { .. } => return Ok(Some(needed.rerooted(source))),
        Op::Select { .. } | Op::CollectionSelect { .. } | Op::CombiningSelect { .. } => {
            if let Some(path) = is_degenerate(op, view) {
                lifted.graft(model, &path, needed)?;
            } else {
                let Some(view) = view.filter(|v| !v.unwrap) else {
                    return Ok(None);
                };
                for (name, anchor) in view.object_mapping() {
                    if let Some(sub) = needed.search(&MemberPath::parse(&name)) {
                        lifted.graft(model, &anchor, &sub)?;
                    }
                }
            }
        }
        Op::Group { .. } => {
            let Some((element_path, key_path)) = group_paths(op) else {
                return Ok(None);
            };
            if let (Some(path), Some(sub)) =
                (element_path, needed.search(&MemberPath::parse(GROUP_ELEMENTS)))
            {
                lifted.graft(model, &path, &sub)?;
            }
            if let (Some(path), Some(sub)) =
                (key_path, needed.search(&MemberPath::parse(GROUP_KEY)))
            {
                if !path.is_root() {
                    lifted.graft(model, &path, &sub)?;
                }
            }
        }
        Op::Accumulate {
            seed_type,
            result: None,
            ..
        } if *seed_type == source => return Ok(Some(needed.rerooted(source))),
        _ => return Ok(None),
    }
    Ok(Some(lifted))
}

/// Related data `op` itself navigates, in its source space: its declared
/// include paths and the navigations of its row lambdas.
pub fn own_needs(model: &ObjectModel, op: &QueryOp) -> Result<IncludingTree, Error> {
    let mut needs = IncludingTree::new(op.source_type.clone());
    if !op.source_type.is_object() {
        return Ok(needs);
    }
    if let Op::Include { paths } = &op.op {
        for path in paths {
            needs.grow(model, path)?;
        }
        return Ok(needs);
    }
    for signature in lambda_signatures(model, op)? {
        let Some(row) = signature.row else {
            continue;
        };
        for path in navigation_paths(model, &signature.lambda.body, &signature.params, row)? {
            needs.grow(model, &path)?;
        }
    }
    Ok(needs)
}
