//! Parameter bindings of the lambdas carried by each operation kind.

use ormx_proto::{Lambda, Op, QueryOp, ScalarType, TypeRef};

use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::expr::{infer, sequence_element};

/// A lambda with the static types of its parameters.
#[derive(Debug, Clone)]
pub struct Signature<'a> {
    /// The lambda.
    pub lambda: &'a Lambda,
    /// Parameter types, by position.
    pub params: Vec<TypeRef>,
    /// Parameter bound to the operation's source row, if any.
    pub row: Option<usize>,
}

impl<'a> Signature<'a> {
    fn new(lambda: &'a Lambda, params: Vec<TypeRef>, row: Option<usize>) -> Self {
        Self {
            lambda,
            params,
            row,
        }
    }
}

/// Signatures of every lambda of `op`, in declaration order.
pub fn lambda_signatures<'a>(
    model: &ObjectModel,
    op: &'a QueryOp,
) -> Result<Vec<Signature<'a>>, Error> {
    let src = op.source_type.clone();
    let row = Some(0);
    let signatures = match &op.op {
        Op::Select { selector } => {
            let params = if selector.arity() >= 2 {
                vec![src, TypeRef::scalar(ScalarType::Int64)]
            } else {
                vec![src]
            };
            vec![Signature::new(selector, params, row)]
        }
        Op::CollectionSelect { collection } => vec![Signature::new(collection, vec![src], row)],
        Op::CombiningSelect { collection, result } => {
            let item = sequence_element(&infer(model, &collection.body, &[src.clone()])?)?;
            vec![
                Signature::new(collection, vec![src.clone()], row),
                Signature::new(result, vec![src, item], row),
            ]
        }
        Op::Where { predicate } => vec![Signature::new(predicate, vec![src], row)],
        Op::Group { key, element, .. } => {
            let mut signatures = vec![Signature::new(key, vec![src.clone()], row)];
            if let Some(element) = element {
                signatures.push(Signature::new(element, vec![src], row));
            }
            signatures
        }
        Op::GroupAggregate {
            key,
            element,
            result,
            ..
        } => {
            let key_type = infer(model, &key.body, &[src.clone()])?;
            let element_type = match element {
                Some(element) => infer(model, &element.body, &[src.clone()])?,
                None => src.clone(),
            };
            let mut signatures = vec![Signature::new(key, vec![src.clone()], row)];
            if let Some(element) = element {
                signatures.push(Signature::new(element, vec![src], row));
            }
            signatures.push(Signature::new(
                result,
                vec![key_type, TypeRef::sequence(element_type)],
                None,
            ));
            signatures
        }
        Op::Join {
            inner,
            outer_key,
            inner_key,
            result,
        } => {
            let inner_type = inner.element_type();
            vec![
                Signature::new(outer_key, vec![src.clone()], row),
                Signature::new(inner_key, vec![inner_type.clone()], None),
                Signature::new(result, vec![src, inner_type], row),
            ]
        }
        Op::Zip { other, result } => {
            vec![Signature::new(result, vec![src, other.element_type()], row)]
        }
        Op::Count { predicate } => predicate
            .iter()
            .map(|p| Signature::new(p, vec![src.clone()], row))
            .collect(),
        Op::ArithAggregate { selector, .. } => selector
            .iter()
            .map(|s| Signature::new(s, vec![src.clone()], row))
            .collect(),
        Op::Accumulate {
            seed_type,
            func,
            result,
            ..
        } => {
            let mut signatures = vec![Signature::new(
                func,
                vec![seed_type.clone(), src],
                Some(1),
            )];
            if let Some(result) = result {
                signatures.push(Signature::new(result, vec![seed_type.clone()], None));
            }
            signatures
        }
        Op::Include { .. } => Vec::new(),
    };
    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;
    use ormx_proto::{Expr, KeyComparer, Value};

    #[test]
    fn test_group_aggregate_signature() {
        let model = create_test_model();
        let op = QueryOp::new(
            Op::GroupAggregate {
                key: Lambda::unary(Expr::param(0).member("flag")),
                element: Some(Lambda::unary(Expr::param(0).member("tag"))),
                result: Lambda::binary(Expr::param(0)),
                comparer: KeyComparer::Default,
            },
            TypeRef::entity("Item"),
            TypeRef::scalar(ScalarType::Bool),
        );
        let signatures = lambda_signatures(&model, &op).unwrap();
        assert_eq!(signatures.len(), 3);
        assert_eq!(
            signatures[2].params,
            vec![
                TypeRef::scalar(ScalarType::Bool),
                TypeRef::sequence(TypeRef::scalar(ScalarType::String))
            ]
        );
        assert_eq!(signatures[2].row, None);
    }

    #[test]
    fn test_accumulate_binds_row_second() {
        let model = create_test_model();
        let op = QueryOp::new(
            Op::Accumulate {
                seed: Value::Int64(0),
                seed_type: TypeRef::scalar(ScalarType::Int64),
                func: Lambda::binary(Expr::param(0).add(Expr::param(1).member("key"))),
                result: None,
            },
            TypeRef::entity("Item"),
            TypeRef::scalar(ScalarType::Int64),
        );
        let signatures = lambda_signatures(&model, &op).unwrap();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].row, Some(1));
        assert_eq!(signatures[0].params[1], TypeRef::entity("Item"));
    }
}
