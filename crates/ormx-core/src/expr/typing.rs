//! Static typing of expressions against the object model.
//!
//! Type inference registers a synthesized shape for every construction
//! expression whose shape is not already known, so member access on the
//! result of a projection resolves like member access on an entity.

use ormx_proto::{AggregateFunction, BinaryOp, Expr, MemberPath, ScalarType, TypeRef, UnaryOp};

use super::functions;
use crate::catalog::{Member, MemberKind, ObjectModel};
use crate::error::Error;
use crate::view::{bound_members, value_type, Conversion, ShapeDescriptor, ShapeField};

/// Infer the static type of `expr`; `params[i]` is the type of `Param(i)`.
pub fn infer(model: &ObjectModel, expr: &Expr, params: &[TypeRef]) -> Result<TypeRef, Error> {
    match expr {
        Expr::Param(index) => params.get(*index).cloned().ok_or_else(|| {
            Error::ContractViolation(format!(
                "parameter {index} is unbound ({} bound)",
                params.len()
            ))
        }),
        Expr::Const(value) => Ok(match value {
            ormx_proto::Value::List(items) => TypeRef::sequence(
                items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(value_type)
                    .unwrap_or(TypeRef::Unknown),
            ),
            ormx_proto::Value::Record(record) => {
                if model.is_entity(&record.shape) {
                    TypeRef::Entity(record.shape.clone())
                } else {
                    TypeRef::Shape(record.shape.clone())
                }
            }
            other => value_type(other),
        }),
        Expr::Member { target, name } => {
            let owner = infer(model, target, params)?;
            if owner == TypeRef::Unknown {
                return Ok(TypeRef::Unknown);
            }
            Ok(model.member(&owner, name)?.ty)
        }
        Expr::Binary { op, left, right } => {
            let l = infer(model, left, params)?;
            let r = infer(model, right, params)?;
            if op.is_arithmetic() {
                arithmetic_type(*op, &l, &r)
            } else {
                Ok(TypeRef::scalar(ScalarType::Bool))
            }
        }
        Expr::Unary { op, operand } => {
            let ty = infer(model, operand, params)?;
            Ok(match op {
                UnaryOp::Not | UnaryOp::IsNull => TypeRef::scalar(ScalarType::Bool),
                UnaryOp::Neg => ty,
            })
        }
        Expr::Call { function, args } => {
            let types = args
                .iter()
                .map(|a| infer(model, a, params))
                .collect::<Result<Vec<_>, _>>()?;
            functions::return_type(function, &types)
        }
        Expr::Aggregate {
            function,
            source,
            selector,
            element,
        } => {
            let element_type = sequence_element(&infer(model, source, params)?)?;
            let selected = match selector {
                Some(selector) => {
                    let inner = element_params(params, *element, element_type);
                    infer(model, selector, &inner)?
                }
                None => element_type,
            };
            Ok(aggregate_type(*function, &selected))
        }
        Expr::Conditional {
            test,
            then,
            otherwise,
        } => {
            infer(model, test, params)?;
            let then = infer(model, then, params)?;
            let otherwise = infer(model, otherwise, params)?;
            Ok(if then == TypeRef::Unknown { otherwise } else { then })
        }
        Expr::New { .. } | Expr::MemberInit { .. } => register_construction(model, expr, params),
        Expr::Convert { operand, to } => {
            infer(model, operand, params)?;
            Ok(TypeRef::Scalar(*to))
        }
    }
}

fn arithmetic_type(op: BinaryOp, l: &TypeRef, r: &TypeRef) -> Result<TypeRef, Error> {
    match (l, r) {
        (TypeRef::Unknown, other) | (other, TypeRef::Unknown) => Ok(other.clone()),
        (TypeRef::Scalar(ScalarType::String), TypeRef::Scalar(ScalarType::String))
            if op == BinaryOp::Add =>
        {
            Ok(TypeRef::scalar(ScalarType::String))
        }
        (TypeRef::Scalar(a), TypeRef::Scalar(b)) if a.is_numeric() && b.is_numeric() => {
            Ok(TypeRef::Scalar(a.widen(*b)))
        }
        _ => Err(Error::type_mismatch(
            "numeric operands",
            format!("{l} and {r}"),
        )),
    }
}

/// Result type of an aggregate over values of type `selected`.
pub fn aggregate_type(function: AggregateFunction, selected: &TypeRef) -> TypeRef {
    match function {
        AggregateFunction::Count => TypeRef::scalar(ScalarType::Int64),
        AggregateFunction::Avg => TypeRef::scalar(ScalarType::Float64),
        AggregateFunction::Sum => match selected {
            TypeRef::Scalar(s) if s.is_integer() => TypeRef::scalar(ScalarType::Int64),
            TypeRef::Unknown => TypeRef::Unknown,
            _ => TypeRef::scalar(ScalarType::Float64),
        },
        AggregateFunction::Min | AggregateFunction::Max => selected.clone(),
    }
}

/// Element type of a sequence type; `Unknown` stays unknown.
pub fn sequence_element(ty: &TypeRef) -> Result<TypeRef, Error> {
    match ty {
        TypeRef::Sequence(inner) => Ok((**inner).clone()),
        TypeRef::Unknown => Ok(TypeRef::Unknown),
        other => Err(Error::type_mismatch("sequence", other)),
    }
}

fn element_params(params: &[TypeRef], element: usize, element_type: TypeRef) -> Vec<TypeRef> {
    let mut inner: Vec<TypeRef> = params[..element.min(params.len())].to_vec();
    inner.resize(element, TypeRef::Unknown);
    inner.push(element_type);
    inner
}

/// Register (or check against the declared shape) the result shape of a
/// construction expression.
fn register_construction(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
) -> Result<TypeRef, Error> {
    let shape = match expr {
        Expr::New { shape, .. } | Expr::MemberInit { shape, .. } => shape,
        _ => return Err(Error::ContractViolation("not a construction".into())),
    };
    if model.is_entity(shape) {
        return Err(Error::ContractViolation(format!(
            "entity {shape} cannot be constructed by a projection"
        )));
    }

    let existing = model.shape(shape);
    let members = bound_members(existing.as_deref(), expr)?;
    let mut fields = Vec::with_capacity(members.len());
    for (name, arg) in &members {
        let ty = infer(model, arg, params)?;
        if let Some(declared) = existing.as_ref().filter(|d| d.is_declared()) {
            let target = declared.field_type(name).ok_or_else(|| Error::MissingMember {
                shape: shape.clone(),
                member: name.clone(),
            })?;
            Conversion::between(&ty, target)?;
        }
        fields.push(ShapeField::new(name.clone(), ty));
    }

    if existing.is_none() {
        let constructor: Vec<String> = match expr {
            Expr::New { .. } => members.iter().map(|(name, _)| name.clone()).collect(),
            _ => Vec::new(),
        };
        model.register_shape(
            ShapeDescriptor::synthesized(shape.clone(), fields).with_constructor(constructor),
        );
    }
    Ok(TypeRef::Shape(shape.clone()))
}

/// A maximal member chain found in an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainRef {
    /// Path relative to the walk's root parameter, when the chain starts at
    /// it (directly or through an aggregate element over it).
    pub origin: Option<MemberPath>,
    /// Parameter the chain starts at.
    pub param: usize,
    /// Path from that parameter.
    pub path: MemberPath,
    /// Members resolved along `path`.
    pub members: Vec<Member>,
}

/// Collect every maximal member chain of `expr`.
///
/// `root` is the parameter whose chains get an origin; chains over aggregate
/// elements whose source is itself rooted there inherit the source path.
pub fn member_chains(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
    root: usize,
) -> Result<Vec<ChainRef>, Error> {
    let mut origins: Vec<Option<MemberPath>> = vec![None; params.len()];
    if root < origins.len() {
        origins[root] = Some(MemberPath::root());
    }
    member_chains_from(model, expr, params, &origins)
}

/// Collect every maximal member chain of `expr`, where `origins[i]` is the
/// source path parameter `i` stands for (if any).
pub fn member_chains_from(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
    origins: &[Option<MemberPath>],
) -> Result<Vec<ChainRef>, Error> {
    let mut out = Vec::new();
    walk_chains(model, expr, params, origins, &mut out)?;
    Ok(out)
}

fn walk_chains(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
    origins: &[Option<MemberPath>],
    out: &mut Vec<ChainRef>,
) -> Result<(), Error> {
    if let Some((param, path)) = expr.member_chain() {
        let root = params.get(param).cloned().unwrap_or(TypeRef::Unknown);
        let members = if root == TypeRef::Unknown {
            Vec::new()
        } else {
            model.resolve_path(&root, &path)?
        };
        out.push(ChainRef {
            origin: origins.get(param).cloned().flatten().map(|o| o.join(&path)),
            param,
            path,
            members,
        });
        return Ok(());
    }
    if let Expr::Aggregate {
        source,
        selector,
        element,
        ..
    } = expr
    {
        walk_chains(model, source, params, origins, out)?;
        if let Some(selector) = selector {
            let element_type = sequence_element(&infer(model, source, params)?)?;
            let inner = element_params(params, *element, element_type);
            let mut inner_origins: Vec<Option<MemberPath>> =
                origins[..(*element).min(origins.len())].to_vec();
            inner_origins.resize(*element, None);
            inner_origins.push(source.member_chain().and_then(|(param, path)| {
                origins.get(param).cloned().flatten().map(|o| o.join(&path))
            }));
            walk_chains(model, selector, &inner, &inner_origins, out)?;
        }
        return Ok(());
    }
    for child in expr.children() {
        walk_chains(model, child, params, origins, out)?;
    }
    Ok(())
}

/// Source path of the longest navigable prefix of a chain, if the chain has
/// an origin and starts with a navigable member.
pub fn navigable_origin(chain: &ChainRef) -> Option<MemberPath> {
    let origin = chain.origin.as_ref()?;
    let navigable = chain
        .members
        .iter()
        .take_while(|m| m.is_navigable())
        .count();
    if navigable == 0 {
        return None;
    }
    // The origin ends with the chain's own path.
    let base_len = origin.len() - chain.path.len();
    Some(origin.prefix(base_len + navigable))
}

/// Paths (relative to parameter `root`) of related objects and nested
/// attributes the expression navigates through.
pub fn navigation_paths(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
    root: usize,
) -> Result<Vec<MemberPath>, Error> {
    let mut paths: Vec<MemberPath> = Vec::new();
    for chain in member_chains(model, expr, params, root)? {
        if let Some(path) = navigable_origin(&chain) {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

/// Check whether the expression follows a reference element anywhere,
/// including the source of an aggregate.
pub fn traverses_reference(
    model: &ObjectModel,
    expr: &Expr,
    params: &[TypeRef],
) -> Result<bool, Error> {
    Ok(member_chains(model, expr, params, 0)?
        .iter()
        .any(|chain| {
            chain
                .members
                .iter()
                .any(|m| matches!(m.kind, MemberKind::Reference(_)))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;

    fn order() -> Vec<TypeRef> {
        vec![TypeRef::entity("Order")]
    }

    #[test]
    fn test_infer_basic_types() {
        let model = create_test_model();
        let p = order();
        assert_eq!(
            infer(&model, &Expr::param(0).member("total"), &p).unwrap(),
            TypeRef::scalar(ScalarType::Float64)
        );
        assert_eq!(
            infer(&model, &Expr::param(0).member("qty").add(Expr::lit(1i64)), &p).unwrap(),
            TypeRef::scalar(ScalarType::Int64)
        );
        assert_eq!(
            infer(&model, &Expr::param(0).path("customer.address"), &p).unwrap(),
            TypeRef::Complex("Address".into())
        );
        assert_eq!(
            infer(&model, &Expr::param(0).member("id").gt(3), &p).unwrap(),
            TypeRef::scalar(ScalarType::Bool)
        );
        assert!(infer(&model, &Expr::param(0).member("nope"), &p).is_err());
        assert!(infer(&model, &Expr::param(1), &p).is_err());
    }

    #[test]
    fn test_infer_aggregates() {
        let model = create_test_model();
        let p = order();
        let sum = Expr::aggregate(
            AggregateFunction::Sum,
            Expr::param(0).member("lines"),
            Some(Expr::param(1).member("qty")),
            1,
        );
        assert_eq!(
            infer(&model, &sum, &p).unwrap(),
            TypeRef::scalar(ScalarType::Int64)
        );
        let max = Expr::aggregate(
            AggregateFunction::Max,
            Expr::param(0).member("lines"),
            Some(Expr::param(1).member("product")),
            1,
        );
        assert_eq!(
            infer(&model, &max, &p).unwrap(),
            TypeRef::scalar(ScalarType::String)
        );
    }

    #[test]
    fn test_construction_registers_shape() {
        let model = create_test_model();
        let expr = Expr::new_shape(
            "Summary",
            [
                ("Id", Expr::param(0).member("id")),
                ("Buyer", Expr::param(0).member("customer")),
            ],
        );
        assert_eq!(
            infer(&model, &expr, &order()).unwrap(),
            TypeRef::Shape("Summary".into())
        );
        let shape = model.shape("Summary").unwrap();
        assert_eq!(shape.constructor, vec!["Id".to_string(), "Buyer".to_string()]);
        assert_eq!(
            infer(
                &model,
                &Expr::param(0).path("Buyer.name"),
                &[TypeRef::Shape("Summary".into())]
            )
            .unwrap(),
            TypeRef::scalar(ScalarType::String)
        );
    }

    #[test]
    fn test_declared_shape_checks_conversions() {
        let model = create_test_model();
        // OrderLine(Id: Int64, Total: Float64): Int32 widens, String does not convert.
        let ok = Expr::New {
            shape: "OrderLine".into(),
            args: vec![Expr::param(0).member("qty"), Expr::param(0).member("qty")],
            members: vec![None, None],
        };
        assert!(infer(&model, &ok, &order()).is_ok());
        let bad = Expr::New {
            shape: "OrderLine".into(),
            args: vec![Expr::param(0).member("note"), Expr::param(0).member("total")],
            members: vec![None, None],
        };
        assert!(matches!(
            infer(&model, &bad, &order()),
            Err(Error::TypeMismatch { .. })
        ));
        let entity = Expr::new_shape("Order", [("id", Expr::lit(1i64))]);
        assert!(matches!(
            infer(&model, &entity, &order()),
            Err(Error::ContractViolation(_))
        ));
    }

    #[test]
    fn test_navigation_paths() {
        let model = create_test_model();
        let expr = Expr::param(0)
            .path("customer.address.city")
            .equals("Paris")
            .and(Expr::param(0).member("total").gt(10));
        let paths = navigation_paths(&model, &expr, &order(), 0).unwrap();
        assert_eq!(paths, vec![MemberPath::parse("customer.address")]);

        let nested = Expr::aggregate(
            AggregateFunction::Count,
            Expr::param(0).member("orders"),
            Some(Expr::param(1).path("lines")),
            1,
        );
        let paths =
            navigation_paths(&model, &nested, &[TypeRef::entity("Customer")], 0).unwrap();
        assert_eq!(
            paths,
            vec![MemberPath::parse("orders"), MemberPath::parse("orders.lines")]
        );
    }

    #[test]
    fn test_traverses_reference() {
        let model = create_test_model();
        assert!(traverses_reference(&model, &Expr::param(0).path("customer.name"), &order()).unwrap());
        assert!(!traverses_reference(&model, &Expr::param(0).member("total"), &order()).unwrap());
        let customer = [TypeRef::entity("Customer")];
        assert!(!traverses_reference(&model, &Expr::param(0).path("address.city"), &customer).unwrap());
    }
}
