//! Typed construction of query chains.
//!
//! Every lambda is typed against the object model as it is appended, so
//! projections register their result shapes before the chain is executed.

use ormx_proto::{
    AggregateFunction, Expr, KeyComparer, Lambda, MemberPath, Op, QueryChain, QueryOp, ScalarType,
    TypeRef, Value,
};

use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::expr::{aggregate_type, infer, sequence_element};
use crate::including::IncludingTree;

/// Builder for query chains over an object model.
pub struct QueryBuilder<'a> {
    model: &'a ObjectModel,
    chain: QueryChain,
}

impl<'a> QueryBuilder<'a> {
    /// Start from all objects of an entity.
    pub fn from_extent(model: &'a ObjectModel, entity: &str) -> Result<Self, Error> {
        if !model.is_entity(entity) {
            return Err(Error::UnknownEntity(entity.to_string()));
        }
        Ok(Self {
            model,
            chain: QueryChain::extent(entity),
        })
    }

    /// Start from a materialized local sequence.
    pub fn from_input(model: &'a ObjectModel, element_type: TypeRef) -> Self {
        Self {
            model,
            chain: QueryChain::input(element_type),
        }
    }

    fn element(&self) -> TypeRef {
        self.chain.element_type()
    }

    fn push(mut self, op: Op, result_type: TypeRef) -> Result<Self, Error> {
        let op = QueryOp::new(op, self.element(), result_type);
        self.chain = self.chain.try_with_op(op)?;
        Ok(self)
    }

    fn infer_row(&self, body: &Expr) -> Result<TypeRef, Error> {
        infer(self.model, body, &[self.element()])
    }

    fn check_predicate(&self, body: &Expr) -> Result<(), Error> {
        match self.infer_row(body)? {
            TypeRef::Scalar(ScalarType::Bool) | TypeRef::Unknown => Ok(()),
            other => Err(Error::type_mismatch("predicate", other)),
        }
    }

    /// Project each element.
    pub fn select(self, body: Expr) -> Result<Self, Error> {
        let ty = self.infer_row(&body)?;
        self.push(
            Op::Select {
                selector: Lambda::unary(body),
            },
            ty,
        )
    }

    /// Project each element together with its position (`Param(1)`).
    pub fn select_indexed(self, body: Expr) -> Result<Self, Error> {
        let ty = infer(
            self.model,
            &body,
            &[self.element(), TypeRef::scalar(ScalarType::Int64)],
        )?;
        self.push(
            Op::Select {
                selector: Lambda::binary(body),
            },
            ty,
        )
    }

    /// Flatten a collection of each element.
    pub fn select_many(self, collection: Expr) -> Result<Self, Error> {
        let item = sequence_element(&self.infer_row(&collection)?)?;
        self.push(
            Op::CollectionSelect {
                collection: Lambda::unary(collection),
            },
            item,
        )
    }

    /// Flatten a collection and project each `(element, item)` pair.
    pub fn select_many_with(self, collection: Expr, result: Expr) -> Result<Self, Error> {
        let item = sequence_element(&self.infer_row(&collection)?)?;
        let ty = infer(self.model, &result, &[self.element(), item])?;
        self.push(
            Op::CombiningSelect {
                collection: Lambda::unary(collection),
                result: Lambda::binary(result),
            },
            ty,
        )
    }

    /// Keep elements matching a predicate.
    pub fn filter(self, predicate: Expr) -> Result<Self, Error> {
        self.check_predicate(&predicate)?;
        let ty = self.element();
        self.push(
            Op::Where {
                predicate: Lambda::unary(predicate),
            },
            ty,
        )
    }

    /// Group elements by key.
    pub fn group_by(self, key: Expr) -> Result<Self, Error> {
        self.group_by_with(key, None, KeyComparer::Default)
    }

    /// Group elements by key, projecting each element and comparing keys
    /// with `comparer`.
    pub fn group_by_with(
        self,
        key: Expr,
        element: Option<Expr>,
        comparer: KeyComparer,
    ) -> Result<Self, Error> {
        let key_type = self.infer_row(&key)?;
        let element_type = match &element {
            Some(element) => self.infer_row(element)?,
            None => self.element(),
        };
        self.push(
            Op::Group {
                key: Lambda::unary(key),
                element: element.map(Lambda::unary),
                comparer,
            },
            TypeRef::grouping(key_type, element_type),
        )
    }

    /// Group elements and project each `(key, elements)` pair.
    pub fn group_aggregate(
        self,
        key: Expr,
        element: Option<Expr>,
        result: Expr,
        comparer: KeyComparer,
    ) -> Result<Self, Error> {
        let key_type = self.infer_row(&key)?;
        let element_type = match &element {
            Some(element) => self.infer_row(element)?,
            None => self.element(),
        };
        let ty = infer(
            self.model,
            &result,
            &[key_type, TypeRef::sequence(element_type)],
        )?;
        self.push(
            Op::GroupAggregate {
                key: Lambda::unary(key),
                element: element.map(Lambda::unary),
                result: Lambda::new(["key", "elements"], result),
                comparer,
            },
            ty,
        )
    }

    /// Inner join with another chain.
    pub fn join(
        self,
        inner: QueryChain,
        outer_key: Expr,
        inner_key: Expr,
        result: Expr,
    ) -> Result<Self, Error> {
        let inner_type = inner.element_type();
        self.infer_row(&outer_key)?;
        infer(self.model, &inner_key, &[inner_type.clone()])?;
        let ty = infer(self.model, &result, &[self.element(), inner_type])?;
        self.push(
            Op::Join {
                inner: Box::new(inner),
                outer_key: Lambda::unary(outer_key),
                inner_key: Lambda::unary(inner_key),
                result: Lambda::binary(result),
            },
            ty,
        )
    }

    /// Pair elements positionally with another chain.
    pub fn zip(self, other: QueryChain, result: Expr) -> Result<Self, Error> {
        let ty = infer(self.model, &result, &[self.element(), other.element_type()])?;
        self.push(
            Op::Zip {
                other: Box::new(other),
                result: Lambda::binary(result),
            },
            ty,
        )
    }

    /// Declare related data to load with each element.
    pub fn include(self, paths: &[&str]) -> Result<Self, Error> {
        let ty = self.element();
        let paths: Vec<MemberPath> = paths.iter().map(|p| MemberPath::parse(p)).collect();
        let mut tree = IncludingTree::new(ty.clone());
        for path in &paths {
            tree.grow(self.model, path)?;
        }
        self.push(Op::Include { paths }, ty)
    }

    /// Count elements.
    pub fn count(self) -> Result<Self, Error> {
        self.push(
            Op::Count { predicate: None },
            TypeRef::scalar(ScalarType::Int64),
        )
    }

    /// Count elements matching a predicate.
    pub fn count_where(self, predicate: Expr) -> Result<Self, Error> {
        self.check_predicate(&predicate)?;
        self.push(
            Op::Count {
                predicate: Some(Lambda::unary(predicate)),
            },
            TypeRef::scalar(ScalarType::Int64),
        )
    }

    /// Arithmetic aggregate over elements or a selector.
    pub fn aggregate(
        self,
        function: AggregateFunction,
        selector: Option<Expr>,
    ) -> Result<Self, Error> {
        let selected = match &selector {
            Some(selector) => self.infer_row(selector)?,
            None => self.element(),
        };
        self.push(
            Op::ArithAggregate {
                function,
                selector: selector.map(Lambda::unary),
            },
            aggregate_type(function, &selected),
        )
    }

    /// Fold elements into an accumulator `(acc, element) => acc'`, then
    /// optionally project the final accumulator.
    pub fn accumulate(
        self,
        seed: Value,
        seed_type: TypeRef,
        func: Expr,
        result: Option<Expr>,
    ) -> Result<Self, Error> {
        infer(self.model, &func, &[seed_type.clone(), self.element()])?;
        let ty = match &result {
            Some(result) => infer(self.model, result, &[seed_type.clone()])?,
            None => seed_type.clone(),
        };
        self.push(
            Op::Accumulate {
                seed,
                seed_type,
                func: Lambda::new(["acc", "x"], func),
                result: result.map(|r| Lambda::new(["acc"], r)),
            },
            ty,
        )
    }

    /// Finish the chain.
    pub fn build(self) -> QueryChain {
        self.chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;
    use ormx_proto::OpKind;

    #[test]
    fn test_builder_types_operations() {
        let model = create_test_model();
        let chain = QueryBuilder::from_extent(&model, "Order")
            .unwrap()
            .filter(Expr::param(0).member("total").gt(20))
            .unwrap()
            .include(&["customer"])
            .unwrap()
            .select(Expr::param(0).member("customer"))
            .unwrap()
            .build();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.element_type(), TypeRef::entity("Customer"));
        assert_eq!(chain.ops()[1].kind(), OpKind::Include);
    }

    #[test]
    fn test_builder_rejects_invalid_steps() {
        let model = create_test_model();
        assert!(matches!(
            QueryBuilder::from_extent(&model, "Nope"),
            Err(Error::UnknownEntity(_))
        ));
        let builder = QueryBuilder::from_extent(&model, "Item").unwrap();
        assert!(builder.filter(Expr::param(0).member("key")).is_err());

        let counted = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .count()
            .unwrap();
        assert!(matches!(
            counted.count(),
            Err(Error::Protocol(ormx_proto::Error::InvalidChain(_)))
        ));
        let builder = QueryBuilder::from_extent(&model, "Order").unwrap();
        assert!(builder.include(&["total"]).is_err());
    }

    #[test]
    fn test_group_and_aggregate_types() {
        let model = create_test_model();
        let grouped = QueryBuilder::from_extent(&model, "Item")
            .unwrap()
            .group_by(Expr::param(0).member("flag"))
            .unwrap()
            .build();
        assert_eq!(
            grouped.element_type(),
            TypeRef::grouping(TypeRef::scalar(ScalarType::Bool), TypeRef::entity("Item"))
        );

        let avg = QueryBuilder::from_extent(&model, "Order")
            .unwrap()
            .aggregate(AggregateFunction::Avg, Some(Expr::param(0).member("qty")))
            .unwrap()
            .build();
        assert_eq!(avg.element_type(), TypeRef::scalar(ScalarType::Float64));
    }
}
