//! Immutable query operation chains.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::operation::QueryOp;
use crate::types::TypeRef;

/// Source of a query chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainRoot {
    /// All objects of an entity, read from the backend.
    Extent(String),
    /// A materialized local sequence with the given element type.
    Input(TypeRef),
}

impl ChainRoot {
    /// Element type produced by this root.
    pub fn element_type(&self) -> TypeRef {
        match self {
            ChainRoot::Extent(entity) => TypeRef::Entity(entity.clone()),
            ChainRoot::Input(ty) => ty.clone(),
        }
    }
}

/// A chain of query operations, ordered from the source (head) to the final
/// operation (tail).
///
/// Chains are never mutated: every transformation returns a new chain and
/// leaves operation payloads untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryChain {
    root: ChainRoot,
    ops: Vec<QueryOp>,
}

impl QueryChain {
    /// Create a chain with no operations.
    pub fn new(root: ChainRoot) -> Self {
        Self {
            root,
            ops: Vec::new(),
        }
    }

    /// Chain over an entity extent.
    pub fn extent(entity: impl Into<String>) -> Self {
        Self::new(ChainRoot::Extent(entity.into()))
    }

    /// Chain over a materialized local input.
    pub fn input(element_type: TypeRef) -> Self {
        Self::new(ChainRoot::Input(element_type))
    }

    /// Build a chain from a root and operations.
    pub fn from_ops(root: ChainRoot, ops: Vec<QueryOp>) -> Self {
        Self { root, ops }
    }

    /// Append an operation without validation.
    pub fn with_op(&self, op: QueryOp) -> Self {
        let mut ops = self.ops.clone();
        ops.push(op);
        Self {
            root: self.root.clone(),
            ops,
        }
    }

    /// Append an operation, checking that it consumes the current element
    /// type and that the chain has not already produced a single value.
    pub fn try_with_op(&self, op: QueryOp) -> Result<Self, Error> {
        if self.is_terminal() {
            return Err(Error::InvalidChain(format!(
                "cannot append {} after a terminal operation",
                op.kind()
            )));
        }
        let element = self.element_type();
        if element != TypeRef::Unknown && op.source_type != element {
            return Err(Error::TypeMismatch {
                expected: element.to_string(),
                actual: op.source_type.to_string(),
            });
        }
        Ok(self.with_op(op))
    }

    /// Chain root.
    pub fn root(&self) -> &ChainRoot {
        &self.root
    }

    /// Operations, source to tail.
    pub fn ops(&self) -> &[QueryOp] {
        &self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the chain has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Final operation.
    pub fn tail(&self) -> Option<&QueryOp> {
        self.ops.last()
    }

    /// Element type produced by the whole chain.
    pub fn element_type(&self) -> TypeRef {
        self.ops
            .last()
            .map(|op| op.result_type.clone())
            .unwrap_or_else(|| self.root.element_type())
    }

    /// Element type flowing into the operation at `index`.
    pub fn type_before(&self, index: usize) -> TypeRef {
        match index.checked_sub(1).and_then(|i| self.ops.get(i)) {
            Some(op) => op.result_type.clone(),
            None => self.root.element_type(),
        }
    }

    /// Check if the chain ends in a single-value operation.
    pub fn is_terminal(&self) -> bool {
        self.ops.last().is_some_and(QueryOp::is_terminal)
    }

    /// The first `len` operations over the same root.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            root: self.root.clone(),
            ops: self.ops[..len.min(self.ops.len())].to_vec(),
        }
    }

    /// Operations from `start` onwards, rooted at a local input of the
    /// element type flowing into `start`.
    pub fn suffix(&self, start: usize) -> Self {
        let start = start.min(self.ops.len());
        Self {
            root: ChainRoot::Input(self.type_before(start)),
            ops: self.ops[start..].to_vec(),
        }
    }

    /// Split into the prefix before `index` and the suffix from `index`.
    pub fn split_at(&self, index: usize) -> (Self, Self) {
        (self.prefix(index), self.suffix(index))
    }

    /// Same operations over a different root.
    pub fn rebased(&self, root: ChainRoot) -> Self {
        Self {
            root,
            ops: self.ops.clone(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Append all operations of `other` (its root is ignored).
    pub fn concat(&self, other: &QueryChain) -> Self {
        let mut ops = self.ops.clone();
        ops.extend(other.ops.iter().cloned());
        Self {
            root: self.root.clone(),
            ops,
        }
    }
}

impl fmt::Display for QueryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            ChainRoot::Extent(entity) => write!(f, "{entity}")?,
            ChainRoot::Input(ty) => write!(f, "input<{ty}>")?,
        }
        for op in &self.ops {
            write!(f, ".{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Lambda};
    use crate::operation::Op;
    use crate::types::ScalarType;

    fn where_op() -> QueryOp {
        QueryOp::new(
            Op::Where {
                predicate: Lambda::unary(Expr::param(0).member("key").gt(0)),
            },
            TypeRef::entity("Item"),
            TypeRef::entity("Item"),
        )
    }

    fn count_op() -> QueryOp {
        QueryOp::new(
            Op::Count { predicate: None },
            TypeRef::entity("Item"),
            TypeRef::scalar(ScalarType::Int64),
        )
    }

    #[test]
    fn test_split_and_rebase_preserve_payload() {
        let chain = QueryChain::extent("Item").with_op(where_op()).with_op(count_op());
        let (prefix, suffix) = chain.split_at(1);
        assert_eq!(prefix.len(), 1);
        assert_eq!(suffix.root(), &ChainRoot::Input(TypeRef::entity("Item")));
        assert_eq!(suffix.ops()[0], count_op());

        let rebased = suffix.rebased(ChainRoot::Extent("Item".into()));
        assert_eq!(rebased.ops(), suffix.ops());
        assert_eq!(prefix.concat(&suffix), chain);
    }

    #[test]
    fn test_element_types() {
        let chain = QueryChain::extent("Item").with_op(where_op()).with_op(count_op());
        assert_eq!(chain.element_type(), TypeRef::scalar(ScalarType::Int64));
        assert_eq!(chain.type_before(0), TypeRef::entity("Item"));
        assert_eq!(chain.type_before(2), TypeRef::entity("Item"));
        assert!(chain.is_terminal());
    }

    #[test]
    fn test_try_with_op_validates() {
        let chain = QueryChain::extent("Item").with_op(count_op());
        assert!(matches!(
            chain.try_with_op(where_op()),
            Err(Error::InvalidChain(_))
        ));

        let other = QueryChain::extent("Other");
        assert!(matches!(
            other.try_with_op(where_op()),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(QueryChain::extent("Item").try_with_op(where_op()).is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let chain = QueryChain::extent("Item").with_op(where_op()).with_op(count_op());
        let json = chain.to_json().unwrap();
        assert_eq!(QueryChain::from_json(&json).unwrap(), chain);
    }

    #[test]
    fn test_display() {
        let chain = QueryChain::extent("Item").with_op(where_op());
        assert_eq!(chain.to_string(), "Item.Where(|x| ($0.key > 0))");
    }
}
