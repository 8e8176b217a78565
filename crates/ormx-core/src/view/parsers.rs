//! View-shape parsers.
//!
//! Each parser recognizes one family of projection-like operations and
//! derives the member bindings and implicit parameter bindings the builder
//! needs. The first parser that applies wins.

use std::sync::Arc;

use ormx_proto::{Expr, Lambda, MemberPath, Op, QueryOp, ScalarType, TypeRef};
use tracing::trace;

use super::builder::{bound_members, build, ViewRequest};
use super::fingerprint::source_fingerprint;
use super::{Flattening, ParserKind, ShapeDescriptor, ShapeField, TypeView, ViewKey};
use crate::catalog::{ObjectModel, GROUPING_SHAPE, GROUP_ELEMENTS, GROUP_KEY};
use crate::error::Error;
use crate::expr::{infer, sequence_element};

/// Base shape of views whose result is a single computed value.
pub const VALUE_SHAPE: &str = "Value";
/// Element name of a multi-valued projection's inner reference.
pub const ITEMS_MEMBER: &str = "Items";

/// Strategy extracting a Type View from one kind of operation.
pub trait ViewShapeParser: Send + Sync {
    /// Parser kind.
    fn kind(&self) -> ParserKind;

    /// Check whether this parser handles `op`.
    fn applies(&self, model: &ObjectModel, op: &QueryOp) -> Result<bool, Error>;

    /// Derive the view request for `op`.
    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error>;
}

struct GroupingParser;
struct GroupAggregateParser;
struct DegenerateParser;
struct MultiValuedParser;
struct GeneralParser;

static PARSERS: [&dyn ViewShapeParser; 5] = [
    &GroupingParser,
    &GroupAggregateParser,
    &DegenerateParser,
    &MultiValuedParser,
    &GeneralParser,
];

/// Type View of a projection-like operation, or `None` for operations that
/// do not project. Views are taken from the model's registry when an
/// identical one was built before.
pub fn parse_view(model: &ObjectModel, op: &QueryOp) -> Result<Option<Arc<TypeView>>, Error> {
    for parser in PARSERS.iter() {
        if !parser.applies(model, op)? {
            continue;
        }
        let request = parser.request(model, op)?;
        let key = request.key.clone();
        let view = model.views().get_or_build(&key, || build(model, request))?;
        trace!(kind = %op.kind(), parser = ?parser.kind(), shape = %view.descriptor.name, "view parsed");
        return Ok(Some(view));
    }
    Ok(None)
}

/// Parameter types and origins of a projection lambda over `source`.
fn selector_params(selector: &Lambda, source: &TypeRef) -> (Vec<TypeRef>, Vec<Option<MemberPath>>) {
    if selector.arity() >= 2 {
        (
            vec![source.clone(), TypeRef::scalar(ScalarType::Int64)],
            vec![Some(MemberPath::root()), None],
        )
    } else {
        (vec![source.clone()], vec![Some(MemberPath::root())])
    }
}

/// Members of a projection body: the bindings of a construction, or a
/// single computed value.
fn projection_members(
    model: &ObjectModel,
    body: &Expr,
    params: &[TypeRef],
) -> Result<(Arc<ShapeDescriptor>, Vec<(String, Expr)>, bool), Error> {
    if body.is_construction() {
        let shape = match infer(model, body, params)? {
            TypeRef::Shape(name) => name,
            other => return Err(Error::type_mismatch("shape", other)),
        };
        let descriptor = model.shape(&shape).ok_or_else(|| Error::MissingMember {
            shape: shape.clone(),
            member: "shape descriptor".into(),
        })?;
        let members = bound_members(Some(&descriptor), body)?;
        return Ok((descriptor, members, false));
    }
    let ty = infer(model, body, params)?;
    let descriptor = ShapeDescriptor::synthesized(VALUE_SHAPE, vec![ShapeField::new(VALUE_SHAPE, ty)]);
    Ok((
        Arc::new(descriptor),
        vec![(VALUE_SHAPE.to_string(), body.clone())],
        true,
    ))
}

fn view_key(
    parser: ParserKind,
    base: &str,
    source: &TypeRef,
    params: &[TypeRef],
    body: &[&Expr],
) -> Result<ViewKey, Error> {
    Ok(ViewKey {
        base: base.to_string(),
        source: source_fingerprint(parser, source, params, body)?,
    })
}

impl ViewShapeParser for GroupingParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Grouping
    }

    fn applies(&self, _model: &ObjectModel, op: &QueryOp) -> Result<bool, Error> {
        Ok(matches!(op.op, Op::Group { .. }))
    }

    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error> {
        let Op::Group { key, element, .. } = &op.op else {
            return Err(Error::ContractViolation(format!(
                "grouping parser given {}",
                op.kind()
            )));
        };
        let params = vec![op.source_type.clone()];
        let element_body = element
            .as_ref()
            .map(|e| e.body.clone())
            .unwrap_or(Expr::Param(0));
        let key_type = infer(model, &key.body, &params)?;
        let element_type = infer(model, &element_body, &params)?;
        let descriptor = ShapeDescriptor::synthesized(
            GROUPING_SHAPE,
            vec![
                ShapeField::new(GROUP_KEY, key_type),
                ShapeField::new(GROUP_ELEMENTS, TypeRef::sequence(element_type)),
            ],
        );
        Ok(ViewRequest {
            key: view_key(
                self.kind(),
                GROUPING_SHAPE,
                &op.source_type,
                &params,
                &[&key.body, &element_body],
            )?,
            parser: self.kind(),
            descriptor: Arc::new(descriptor),
            source_type: op.source_type.clone(),
            origins: vec![Some(MemberPath::root())],
            params,
            members: vec![
                (GROUP_KEY.to_string(), key.body.clone()),
                (GROUP_ELEMENTS.to_string(), element_body),
            ],
            flattening: None,
            unwrap: false,
            identifying: false,
        })
    }
}

impl ViewShapeParser for GroupAggregateParser {
    fn kind(&self) -> ParserKind {
        ParserKind::GroupAggregate
    }

    fn applies(&self, _model: &ObjectModel, op: &QueryOp) -> Result<bool, Error> {
        Ok(matches!(op.op, Op::GroupAggregate { .. }))
    }

    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error> {
        let Op::GroupAggregate {
            key,
            element,
            result,
            ..
        } = &op.op
        else {
            return Err(Error::ContractViolation(format!(
                "group aggregate parser given {}",
                op.kind()
            )));
        };
        let source = [op.source_type.clone()];
        let key_type = infer(model, &key.body, &source)?;
        let element_type = match element {
            Some(element) => infer(model, &element.body, &source)?,
            None => op.source_type.clone(),
        };
        let params = vec![key_type, TypeRef::sequence(element_type)];
        let (descriptor, members, unwrap) = projection_members(model, &result.body, &params)?;
        Ok(ViewRequest {
            key: view_key(
                self.kind(),
                &descriptor.name,
                &op.source_type,
                &params,
                &[&result.body],
            )?,
            parser: self.kind(),
            descriptor,
            source_type: op.source_type.clone(),
            origins: vec![None, None],
            params,
            members,
            flattening: None,
            unwrap,
            identifying: false,
        })
    }
}

impl ViewShapeParser for DegenerateParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Degenerate
    }

    fn applies(&self, _model: &ObjectModel, op: &QueryOp) -> Result<bool, Error> {
        Ok(match &op.op {
            Op::Select { selector } => {
                selector.arity() == 1 && selector.degenerate_path().is_some()
            }
            Op::CollectionSelect { collection } => collection.degenerate_path().is_some(),
            _ => false,
        })
    }

    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error> {
        let (lambda, flattening) = match &op.op {
            Op::Select { selector } => (selector, false),
            Op::CollectionSelect { collection } => (collection, true),
            _ => {
                return Err(Error::ContractViolation(format!(
                    "degenerate parser given {}",
                    op.kind()
                )))
            }
        };
        let path = lambda
            .degenerate_path()
            .ok_or_else(|| Error::ContractViolation(format!("{lambda} is not a member path")))?;
        let params = vec![op.source_type.clone()];
        let ty = infer(model, &lambda.body, &params)?;
        let descriptor =
            ShapeDescriptor::synthesized(VALUE_SHAPE, vec![ShapeField::new(VALUE_SHAPE, ty)]);
        Ok(ViewRequest {
            key: view_key(
                self.kind(),
                VALUE_SHAPE,
                &op.source_type,
                &params,
                &[&lambda.body],
            )?,
            parser: self.kind(),
            descriptor: Arc::new(descriptor),
            source_type: op.source_type.clone(),
            origins: vec![Some(MemberPath::root())],
            params,
            members: vec![(VALUE_SHAPE.to_string(), lambda.body.clone())],
            flattening: flattening.then(|| Flattening {
                collection: lambda.clone(),
                path: Some(path),
            }),
            unwrap: true,
            identifying: false,
        })
    }
}

impl ViewShapeParser for MultiValuedParser {
    fn kind(&self) -> ParserKind {
        ParserKind::MultiValued
    }

    fn applies(&self, model: &ObjectModel, op: &QueryOp) -> Result<bool, Error> {
        match &op.op {
            Op::Select { selector } if !selector.body.is_construction() => {
                let (params, _) = selector_params(selector, &op.source_type);
                Ok(matches!(
                    infer(model, &selector.body, &params)?,
                    TypeRef::Sequence(_)
                ))
            }
            Op::CollectionSelect { .. } => Ok(true),
            _ => Ok(false),
        }
    }

    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error> {
        let (lambda, flattening) = match &op.op {
            Op::Select { selector } => (selector, false),
            Op::CollectionSelect { collection } => (collection, true),
            _ => {
                return Err(Error::ContractViolation(format!(
                    "multi-valued parser given {}",
                    op.kind()
                )))
            }
        };
        let (params, origins) = selector_params(lambda, &op.source_type);
        let ty = infer(model, &lambda.body, &params)?;
        sequence_element(&ty)?;
        let descriptor =
            ShapeDescriptor::synthesized(ITEMS_MEMBER, vec![ShapeField::new(ITEMS_MEMBER, ty)]);
        Ok(ViewRequest {
            key: view_key(
                self.kind(),
                ITEMS_MEMBER,
                &op.source_type,
                &params,
                &[&lambda.body],
            )?,
            parser: self.kind(),
            descriptor: Arc::new(descriptor),
            source_type: op.source_type.clone(),
            params,
            origins,
            members: vec![(ITEMS_MEMBER.to_string(), lambda.body.clone())],
            flattening: flattening.then(|| Flattening {
                collection: lambda.clone(),
                path: None,
            }),
            unwrap: true,
            identifying: false,
        })
    }
}

impl ViewShapeParser for GeneralParser {
    fn kind(&self) -> ParserKind {
        ParserKind::General
    }

    fn applies(&self, _model: &ObjectModel, op: &QueryOp) -> Result<bool, Error> {
        Ok(matches!(
            op.op,
            Op::Select { .. }
                | Op::CombiningSelect { .. }
                | Op::Accumulate {
                    result: Some(_),
                    ..
                }
        ))
    }

    fn request(&self, model: &ObjectModel, op: &QueryOp) -> Result<ViewRequest, Error> {
        let source = &op.source_type;
        let (params, origins, body, collection, flattening) = match &op.op {
            Op::Select { selector } => {
                let (params, origins) = selector_params(selector, source);
                (params, origins, &selector.body, None, None)
            }
            Op::CombiningSelect { collection, result } => {
                let item = sequence_element(&infer(model, &collection.body, &[source.clone()])?)?;
                let path = collection.degenerate_path();
                (
                    vec![source.clone(), item],
                    vec![Some(MemberPath::root()), path.clone()],
                    &result.body,
                    Some(&collection.body),
                    Some(Flattening {
                        collection: collection.clone(),
                        path,
                    }),
                )
            }
            Op::Accumulate {
                seed_type,
                result: Some(result),
                ..
            } => {
                let origin = (seed_type == source).then(MemberPath::root);
                (vec![seed_type.clone()], vec![origin], &result.body, None, None)
            }
            _ => {
                return Err(Error::ContractViolation(format!(
                    "general parser given {}",
                    op.kind()
                )))
            }
        };

        let (descriptor, members, unwrap) = projection_members(model, body, &params)?;
        let mut fingerprinted = Vec::with_capacity(2);
        fingerprinted.extend(collection);
        fingerprinted.push(body);
        Ok(ViewRequest {
            key: view_key(self.kind(), &descriptor.name, source, &params, &fingerprinted)?,
            parser: self.kind(),
            descriptor,
            source_type: source.clone(),
            params,
            origins,
            members,
            flattening,
            unwrap,
            identifying: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;
    use crate::view::ElementKind;
    use ormx_proto::{AggregateFunction, KeyComparer};

    fn select(source: &str, body: Expr, result: TypeRef) -> QueryOp {
        QueryOp::new(
            Op::Select {
                selector: Lambda::unary(body),
            },
            TypeRef::entity(source),
            result,
        )
    }

    fn summary_body() -> Expr {
        Expr::new_shape(
            "Summary",
            [
                ("Id", Expr::param(0).member("id")),
                ("Buyer", Expr::param(0).member("customer")),
                ("City", Expr::param(0).path("customer.address.city")),
                ("Home", Expr::param(0).path("customer.address")),
                ("Lines", Expr::param(0).member("lines")),
                (
                    "Value",
                    Expr::param(0).member("total").mul(Expr::param(0).member("qty")),
                ),
            ],
        )
    }

    #[test]
    fn test_general_projection_elements() {
        let model = create_test_model();
        let op = select("Order", summary_body(), TypeRef::Shape("Summary".into()));
        let view = parse_view(&model, &op).unwrap().unwrap();

        assert_eq!(view.parser, ParserKind::General);
        assert!(!view.unwrap);
        assert_eq!(view.key_attributes, vec!["Id".to_string()]);
        assert_eq!(
            view.element("Buyer").unwrap().kind,
            ElementKind::Reference {
                anchor: Some(MemberPath::parse("customer")),
                target: TypeRef::entity("Customer"),
                collection: false,
            }
        );
        assert_eq!(
            view.element("Home").unwrap().kind,
            ElementKind::Complex {
                path: MemberPath::parse("customer.address")
            }
        );
        assert!(matches!(
            &view.element("Lines").unwrap().kind,
            ElementKind::Reference { collection: true, .. }
        ));
        assert_eq!(
            view.element("Value").unwrap().provenance(),
            vec![MemberPath::parse("total"), MemberPath::parse("qty")]
        );
        assert!(view.source_extension.contains(&"customer.address".into()));
        assert!(view.source_extension.contains(&"lines".into()));
        let constructor = view.constructor.as_ref().unwrap();
        assert_eq!(constructor.params.len(), 6);
        assert_eq!(view.object_mapping().len(), 3);
    }

    #[test]
    fn test_identical_projections_share_view() {
        let model = create_test_model();
        let op = select("Order", summary_body(), TypeRef::Shape("Summary".into()));
        let first = parse_view(&model, &op).unwrap().unwrap();
        let second = parse_view(&model, &op.clone()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(model.views().len(), 1);
        assert_eq!(model.views().stats().hits(), 1);

        let other = select(
            "Order",
            Expr::param(0).member("total"),
            TypeRef::scalar(ScalarType::Float64),
        );
        let third = parse_view(&model, &other).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_degenerate_projection() {
        let model = create_test_model();
        let op = select(
            "Order",
            Expr::param(0).path("customer.address"),
            TypeRef::Complex("Address".into()),
        );
        let view = parse_view(&model, &op).unwrap().unwrap();
        assert_eq!(view.parser, ParserKind::Degenerate);
        assert!(view.unwrap);
        assert!(view.flattening.is_none());
        assert_eq!(view.result_type(), TypeRef::Complex("Address".into()));

        let flatten = QueryOp::new(
            Op::CollectionSelect {
                collection: Lambda::unary(Expr::param(0).member("lines")),
            },
            TypeRef::entity("Order"),
            TypeRef::entity("Line"),
        );
        let view = parse_view(&model, &flatten).unwrap().unwrap();
        assert_eq!(view.parser, ParserKind::Degenerate);
        assert_eq!(
            view.flattening.as_ref().unwrap().path,
            Some(MemberPath::parse("lines"))
        );
    }

    #[test]
    fn test_indexed_and_combining_projection() {
        let model = create_test_model();
        let indexed = QueryOp::new(
            Op::Select {
                selector: Lambda::binary(Expr::new_shape(
                    "Ranked",
                    [("Pos", Expr::param(1)), ("Id", Expr::param(0).member("id"))],
                )),
            },
            TypeRef::entity("Order"),
            TypeRef::Shape("Ranked".into()),
        );
        let view = parse_view(&model, &indexed).unwrap().unwrap();
        assert_eq!(view.params[1], TypeRef::scalar(ScalarType::Int64));
        assert_eq!(
            view.element("Pos").unwrap().kind,
            ElementKind::Attribute { sources: vec![] }
        );

        let combining = QueryOp::new(
            Op::CombiningSelect {
                collection: Lambda::unary(Expr::param(0).member("lines")),
                result: Lambda::binary(Expr::new_shape(
                    "Pair",
                    [
                        ("Order", Expr::param(0).member("id")),
                        ("Product", Expr::param(1).member("product")),
                    ],
                )),
            },
            TypeRef::entity("Order"),
            TypeRef::Shape("Pair".into()),
        );
        let view = parse_view(&model, &combining).unwrap().unwrap();
        assert!(view.flattening.is_some());
        assert_eq!(
            view.element("Product").unwrap().provenance(),
            vec![MemberPath::parse("lines.product")]
        );
        assert!(view.source_extension.contains(&"lines".into()));
    }

    #[test]
    fn test_grouping_views() {
        let model = create_test_model();
        let group = QueryOp::new(
            Op::Group {
                key: Lambda::unary(Expr::param(0).member("flag")),
                element: None,
                comparer: KeyComparer::Default,
            },
            TypeRef::entity("Item"),
            TypeRef::grouping(TypeRef::scalar(ScalarType::Bool), TypeRef::entity("Item")),
        );
        let view = parse_view(&model, &group).unwrap().unwrap();
        assert_eq!(view.parser, ParserKind::Grouping);
        assert!(view.key_attributes.is_empty());
        assert!(view.element(GROUP_KEY).is_some());
        assert_eq!(view.element(GROUP_ELEMENTS).unwrap().expr, Expr::Param(0));

        let aggregate = QueryOp::new(
            Op::GroupAggregate {
                key: Lambda::unary(Expr::param(0).member("flag")),
                element: None,
                result: Lambda::binary(Expr::new_shape(
                    "FlagCount",
                    [
                        ("Flag", Expr::param(0)),
                        (
                            "Count",
                            Expr::aggregate(AggregateFunction::Count, Expr::param(1), None, 2),
                        ),
                    ],
                )),
                comparer: KeyComparer::Default,
            },
            TypeRef::entity("Item"),
            TypeRef::Shape("FlagCount".into()),
        );
        let view = parse_view(&model, &aggregate).unwrap().unwrap();
        assert_eq!(view.parser, ParserKind::GroupAggregate);
        assert_eq!(view.params[1], TypeRef::sequence(TypeRef::entity("Item")));
        assert_eq!(
            view.element("Count").unwrap().ty,
            TypeRef::scalar(ScalarType::Int64)
        );
    }

    #[test]
    fn test_non_projections_have_no_view() {
        let model = create_test_model();
        let filter = QueryOp::new(
            Op::Where {
                predicate: Lambda::unary(Expr::param(0).member("flag")),
            },
            TypeRef::entity("Item"),
            TypeRef::entity("Item"),
        );
        assert!(parse_view(&model, &filter).unwrap().is_none());
    }
}
