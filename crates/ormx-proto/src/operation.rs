//! Query operations.
//!
//! A [`QueryOp`] is one immutable node of a [`QueryChain`](crate::QueryChain).
//! Each variant of [`Op`] carries the payload of its kind; the static source
//! and result element types are recorded alongside so the chain can be split
//! and re-rooted without re-running type inference.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::QueryChain;
use crate::expr::Lambda;
use crate::path::MemberPath;
use crate::types::TypeRef;
use crate::value::Value;

/// Aggregate function types for arithmetic aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Count of values.
    Count,
    /// Sum of numeric values.
    Sum,
    /// Average of numeric values.
    Avg,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
}

/// Key comparison used by grouping operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyComparer {
    /// Loose value equality.
    #[default]
    Default,
    /// String keys compared ignoring ASCII case.
    CaseInsensitive,
}

/// Operation kind, the discriminant of [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    Select,
    CollectionSelect,
    CombiningSelect,
    Where,
    Group,
    GroupAggregate,
    Join,
    Zip,
    Count,
    ArithAggregate,
    Accumulate,
    Include,
}

impl OpKind {
    /// All operation kinds.
    pub const ALL: [OpKind; 12] = [
        OpKind::Select,
        OpKind::CollectionSelect,
        OpKind::CombiningSelect,
        OpKind::Where,
        OpKind::Group,
        OpKind::GroupAggregate,
        OpKind::Join,
        OpKind::Zip,
        OpKind::Count,
        OpKind::ArithAggregate,
        OpKind::Accumulate,
        OpKind::Include,
    ];

    /// Check whether operations of this kind produce a single value.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OpKind::Count | OpKind::ArithAggregate | OpKind::Accumulate
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Select => "Select",
            OpKind::CollectionSelect => "CollectionSelect",
            OpKind::CombiningSelect => "CombiningSelect",
            OpKind::Where => "Where",
            OpKind::Group => "Group",
            OpKind::GroupAggregate => "GroupAggregate",
            OpKind::Join => "Join",
            OpKind::Zip => "Zip",
            OpKind::Count => "Count",
            OpKind::ArithAggregate => "ArithAggregate",
            OpKind::Accumulate => "Accumulate",
            OpKind::Include => "Include",
        };
        f.write_str(name)
    }
}

/// Operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Projection `x => ...`, or `(x, index) => ...` with a sequence index.
    Select { selector: Lambda },
    /// Flattening projection `x => x.collection`.
    CollectionSelect { collection: Lambda },
    /// Flattening projection with a result selector `(x, item) => ...`.
    CombiningSelect { collection: Lambda, result: Lambda },
    /// Filter `x => bool`.
    Where { predicate: Lambda },
    /// Grouping by key, optionally projecting each element.
    Group {
        key: Lambda,
        element: Option<Lambda>,
        comparer: KeyComparer,
    },
    /// Grouping with a result selector `(key, elements) => ...`.
    GroupAggregate {
        key: Lambda,
        element: Option<Lambda>,
        result: Lambda,
        comparer: KeyComparer,
    },
    /// Inner join with another chain; `result` is `(outer, inner) => ...`.
    Join {
        inner: Box<QueryChain>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    },
    /// Positional pairing with another chain; `result` is `(a, b) => ...`.
    Zip {
        other: Box<QueryChain>,
        result: Lambda,
    },
    /// Count of elements, optionally matching a predicate.
    Count { predicate: Option<Lambda> },
    /// Arithmetic aggregate over elements or a selector.
    ArithAggregate {
        function: AggregateFunction,
        selector: Option<Lambda>,
    },
    /// Fold with a seed `(acc, x) => acc'`, then an optional result selector.
    Accumulate {
        seed: Value,
        seed_type: TypeRef,
        func: Lambda,
        result: Option<Lambda>,
    },
    /// Eager-load declaration of related data paths.
    Include { paths: Vec<MemberPath> },
}

impl Op {
    /// Kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Select { .. } => OpKind::Select,
            Op::CollectionSelect { .. } => OpKind::CollectionSelect,
            Op::CombiningSelect { .. } => OpKind::CombiningSelect,
            Op::Where { .. } => OpKind::Where,
            Op::Group { .. } => OpKind::Group,
            Op::GroupAggregate { .. } => OpKind::GroupAggregate,
            Op::Join { .. } => OpKind::Join,
            Op::Zip { .. } => OpKind::Zip,
            Op::Count { .. } => OpKind::Count,
            Op::ArithAggregate { .. } => OpKind::ArithAggregate,
            Op::Accumulate { .. } => OpKind::Accumulate,
            Op::Include { .. } => OpKind::Include,
        }
    }

    /// Lambdas carried by this operation, in declaration order.
    pub fn lambdas(&self) -> Vec<&Lambda> {
        match self {
            Op::Select { selector } => vec![selector],
            Op::CollectionSelect { collection } => vec![collection],
            Op::CombiningSelect { collection, result } => vec![collection, result],
            Op::Where { predicate } => vec![predicate],
            Op::Group { key, element, .. } => {
                let mut lambdas = vec![key];
                lambdas.extend(element.iter());
                lambdas
            }
            Op::GroupAggregate {
                key,
                element,
                result,
                ..
            } => {
                let mut lambdas = vec![key];
                lambdas.extend(element.iter());
                lambdas.push(result);
                lambdas
            }
            Op::Join {
                outer_key,
                inner_key,
                result,
                ..
            } => vec![outer_key, inner_key, result],
            Op::Zip { result, .. } => vec![result],
            Op::Count { predicate } => predicate.iter().collect(),
            Op::ArithAggregate { selector, .. } => selector.iter().collect(),
            Op::Accumulate { func, result, .. } => {
                let mut lambdas = vec![func];
                lambdas.extend(result.iter());
                lambdas
            }
            Op::Include { .. } => vec![],
        }
    }
}

/// One node of a query chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOp {
    /// Kind-specific payload.
    pub op: Op,
    /// Element type flowing into this operation.
    pub source_type: TypeRef,
    /// Element type flowing out (the value type for terminal operations).
    pub result_type: TypeRef,
}

impl QueryOp {
    /// Create an operation node.
    pub fn new(op: Op, source_type: TypeRef, result_type: TypeRef) -> Self {
        Self {
            op,
            source_type,
            result_type,
        }
    }

    /// Kind of this operation.
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Check if this operation produces a single value.
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Check if this operation changes the element type.
    pub fn changes_type(&self) -> bool {
        self.source_type != self.result_type
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            Op::Select { selector } => write!(f, "Select({selector})"),
            Op::CollectionSelect { collection } => write!(f, "CollectionSelect({collection})"),
            Op::CombiningSelect { collection, result } => {
                write!(f, "CombiningSelect({collection}, {result})")
            }
            Op::Where { predicate } => write!(f, "Where({predicate})"),
            Op::Group { key, element, .. } => match element {
                Some(element) => write!(f, "Group({key}, {element})"),
                None => write!(f, "Group({key})"),
            },
            Op::GroupAggregate { key, result, .. } => {
                write!(f, "GroupAggregate({key}, {result})")
            }
            Op::Join { inner, result, .. } => write!(f, "Join({inner}, {result})"),
            Op::Zip { other, result } => write!(f, "Zip({other}, {result})"),
            Op::Count { .. } => write!(f, "Count"),
            Op::ArithAggregate { function, .. } => write!(f, "{function:?}"),
            Op::Accumulate { func, .. } => write!(f, "Accumulate({func})"),
            Op::Include { paths } => {
                let paths: Vec<String> = paths.iter().map(ToString::to_string).collect();
                write!(f, "Include({})", paths.join(", "))
            }
        }
    }
}
