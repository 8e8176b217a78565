//! Type View construction.
//!
//! A parser turns an operation into a [`ViewRequest`]: the members bound by
//! the projection, the parameter types and the source paths the parameters
//! stand for. [`build`] classifies every member, grows the source extension
//! and wires the synthesized constructor.

use std::sync::Arc;

use ormx_proto::{Expr, MemberPath, TypeRef};
use tracing::debug;

use super::{
    ConstructorParam, Conversion, ElementKind, Flattening, ParserKind, ShapeDescriptor, TypeView,
    ViewConstructor, ViewElement, ViewKey,
};
use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::expr::{infer, member_chains_from, navigable_origin, ChainRef};
use crate::including::IncludingTree;

/// Member bindings of a construction expression, in assignment order.
///
/// Positional arguments bind to their explicit member names, or else to the
/// declared constructor parameters of the shape. Named assignments of a
/// property initialization follow the positional arguments.
pub fn bound_members(
    declared: Option<&ShapeDescriptor>,
    expr: &Expr,
) -> Result<Vec<(String, Expr)>, Error> {
    let positional = |shape: &str, index: usize| -> Result<String, Error> {
        declared
            .and_then(|d| d.constructor.get(index).cloned())
            .ok_or_else(|| Error::MissingMember {
                shape: shape.to_string(),
                member: format!("constructor parameter {index}"),
            })
    };

    match expr {
        Expr::New {
            shape,
            args,
            members,
        } => args
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                let name = match members.get(index).cloned().flatten() {
                    Some(name) => name,
                    None => positional(shape, index)?,
                };
                Ok((name, arg.clone()))
            })
            .collect(),
        Expr::MemberInit {
            shape,
            args,
            bindings,
        } => {
            let mut members = Vec::with_capacity(args.len() + bindings.len());
            for (index, arg) in args.iter().enumerate() {
                members.push((positional(shape, index)?, arg.clone()));
            }
            for binding in bindings {
                match members.iter_mut().find(|(name, _)| *name == binding.member) {
                    Some(slot) => slot.1 = binding.expr.clone(),
                    None => members.push((binding.member.clone(), binding.expr.clone())),
                }
            }
            Ok(members)
        }
        other => Err(Error::ContractViolation(format!(
            "{other} is not a construction expression"
        ))),
    }
}

/// Everything needed to build one Type View.
#[derive(Debug, Clone)]
pub struct ViewRequest {
    /// Cache key.
    pub key: ViewKey,
    /// Parser producing the request.
    pub parser: ParserKind,
    /// Result shape.
    pub descriptor: Arc<ShapeDescriptor>,
    /// Element type of the projection source.
    pub source_type: TypeRef,
    /// Parameter types of the member expressions.
    pub params: Vec<TypeRef>,
    /// Source path each parameter stands for, if any.
    pub origins: Vec<Option<MemberPath>>,
    /// Bound members in field order.
    pub members: Vec<(String, Expr)>,
    /// Flattening point.
    pub flattening: Option<Flattening>,
    /// The result is the single member's value.
    pub unwrap: bool,
    /// Whether instances can be identified through source identity.
    pub identifying: bool,
}

/// Build a Type View from a request.
pub fn build(model: &ObjectModel, request: ViewRequest) -> Result<TypeView, Error> {
    let ViewRequest {
        key,
        parser,
        descriptor,
        source_type,
        params,
        origins,
        members,
        flattening,
        unwrap,
        identifying,
    } = request;

    let mut extension = IncludingTree::new(source_type.clone());
    if let Some(path) = flattening.as_ref().and_then(|f| f.path.as_ref()) {
        if !path.is_root() {
            extension.grow(model, path)?;
        }
    }

    let mut elements = Vec::with_capacity(members.len());
    for (slot, (name, expr)) in members.into_iter().enumerate() {
        let ty = infer(model, &expr, &params)?;
        let chains = member_chains_from(model, &expr, &params, &origins)?;
        for chain in &chains {
            if let Some(path) = navigable_origin(chain) {
                extension.grow(model, &path)?;
            }
        }
        let conversion = if descriptor.is_declared() {
            let target = descriptor
                .field_type(&name)
                .ok_or_else(|| Error::MissingMember {
                    shape: descriptor.name.clone(),
                    member: name.clone(),
                })?;
            Conversion::between(&ty, target)?
        } else {
            Conversion::Identity
        };
        let kind = element_kind(&expr, &ty, &origins, &chains);
        elements.push(ViewElement {
            name,
            ty,
            kind,
            slot,
            expr,
            conversion,
        });
    }

    let constructor = if unwrap || descriptor.constructor.is_empty() {
        None
    } else {
        let params = descriptor
            .constructor
            .iter()
            .map(|member| {
                let element = elements.iter().find(|e| &e.name == member).ok_or_else(|| {
                    Error::MissingMember {
                        shape: descriptor.name.clone(),
                        member: member.clone(),
                    }
                })?;
                Ok(ConstructorParam {
                    member: member.clone(),
                    slot: element.slot,
                    conversion: element.conversion.clone(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Some(ViewConstructor { params })
    };

    let key_attributes = match source_type.entity_name() {
        Some(entity) if identifying => {
            let identity = MemberPath::parse(model.identity_field(entity)?);
            elements
                .iter()
                .filter(|e| match &e.kind {
                    ElementKind::Attribute { sources } => {
                        sources.len() == 1
                            && sources[0] == identity
                            && e.expr.member_chain().is_some()
                    }
                    _ => false,
                })
                .map(|e| e.name.clone())
                .collect()
        }
        _ => Vec::new(),
    };

    debug!(
        shape = %descriptor.name,
        parser = ?parser,
        elements = elements.len(),
        extension = extension.paths().len(),
        "type view built"
    );

    Ok(TypeView {
        key,
        parser,
        descriptor,
        source_type,
        params,
        elements,
        constructor,
        source_extension: extension,
        flattening,
        key_attributes,
        unwrap,
    })
}

fn element_kind(
    expr: &Expr,
    ty: &TypeRef,
    origins: &[Option<MemberPath>],
    chains: &[ChainRef],
) -> ElementKind {
    let (target, collection) = match ty {
        TypeRef::Sequence(inner) => (inner.as_ref(), true),
        other => (other, false),
    };
    let direct = expr.member_chain().and_then(|(param, path)| {
        origins
            .get(param)
            .cloned()
            .flatten()
            .map(|origin| origin.join(&path))
    });

    if target.is_entity() {
        return ElementKind::Reference {
            anchor: direct,
            target: target.clone(),
            collection,
        };
    }
    if let (TypeRef::Complex(_), Some(path)) = (ty, &direct) {
        return ElementKind::Complex { path: path.clone() };
    }
    let sources = match direct {
        Some(path) => vec![path],
        None => {
            let mut sources: Vec<MemberPath> = Vec::new();
            for origin in chains.iter().filter_map(|c| c.origin.clone()) {
                if !sources.contains(&origin) {
                    sources.push(origin);
                }
            }
            sources
        }
    };
    ElementKind::Attribute { sources }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{ShapeField, ShapeOrigin};
    use ormx_proto::ScalarType;

    fn declared_line() -> ShapeDescriptor {
        ShapeDescriptor {
            name: "OrderLine".into(),
            fields: vec![
                ShapeField::new("Id", TypeRef::scalar(ScalarType::Int64)),
                ShapeField::new("Total", TypeRef::scalar(ScalarType::Float64)),
            ],
            constructor: vec!["Id".into(), "Total".into()],
            origin: ShapeOrigin::Declared,
        }
    }

    #[test]
    fn test_bound_members_positional() {
        let expr = Expr::New {
            shape: "OrderLine".into(),
            args: vec![Expr::param(0).member("id"), Expr::param(0).member("total")],
            members: vec![None, None],
        };
        let members = bound_members(Some(&declared_line()), &expr).unwrap();
        assert_eq!(members[0].0, "Id");
        assert_eq!(members[1].0, "Total");

        assert!(matches!(
            bound_members(None, &expr),
            Err(Error::MissingMember { .. })
        ));
    }

    #[test]
    fn test_bound_members_property_init() {
        let expr = Expr::member_init(
            "OrderLine",
            vec![Expr::param(0).member("id")],
            [("Total", Expr::param(0).member("total"))],
        );
        let members = bound_members(Some(&declared_line()), &expr).unwrap();
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Id", "Total"]);

        let plain = Expr::member_init("Anon", vec![], [("A", Expr::lit(1i64))]);
        assert_eq!(bound_members(None, &plain).unwrap().len(), 1);
        assert!(bound_members(None, &Expr::param(0)).is_err());
    }
}
