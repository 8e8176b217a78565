//! Expression IR for lambdas carried by query operations.
//!
//! Expressions reference lambda parameters positionally through
//! [`Expr::Param`]. Nested element selectors inside [`Expr::Aggregate`] bind
//! the element at the parameter index given by `element`, after all outer
//! parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::AggregateFunction;
use crate::path::MemberPath;
use crate::types::ScalarType;
use crate::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Set membership (right side is a list)
    In,
}

impl BinaryOp {
    /// Check if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::In
        )
    }

    /// Check if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::In => "in",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
}

/// Named member assignment of a property-initialization expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBinding {
    /// Member being assigned.
    pub member: String,
    /// Assigned expression.
    pub expr: Expr,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Lambda parameter by position.
    Param(usize),
    /// Constant value.
    Const(Value),
    /// Member access (attribute, reference or complex attribute).
    Member { target: Box<Expr>, name: String },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Call of a named scalar function.
    Call { function: String, args: Vec<Expr> },
    /// Aggregate over a sequence-valued expression.
    Aggregate {
        function: AggregateFunction,
        source: Box<Expr>,
        selector: Option<Box<Expr>>,
        /// Parameter index bound to each element while evaluating `selector`.
        element: usize,
    },
    /// Conditional expression.
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Direct construction: positional arguments, optionally bound to members.
    New {
        shape: String,
        args: Vec<Expr>,
        members: Vec<Option<String>>,
    },
    /// Construction followed by named member assignments.
    MemberInit {
        shape: String,
        args: Vec<Expr>,
        bindings: Vec<MemberBinding>,
    },
    /// Conversion to a scalar type.
    Convert { operand: Box<Expr>, to: ScalarType },
}

impl Expr {
    /// Parameter reference.
    pub fn param(index: usize) -> Self {
        Expr::Param(index)
    }

    /// Constant expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Const(value.into())
    }

    /// Member access on this expression.
    pub fn member(self, name: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    /// Member access along a dot-separated path.
    pub fn path(self, path: &str) -> Self {
        MemberPath::parse(path)
            .segments()
            .iter()
            .fold(self, |expr, segment| expr.member(segment.clone()))
    }

    /// Build a member-access chain rooted at a parameter.
    pub fn param_path(index: usize, path: &MemberPath) -> Self {
        path.segments()
            .iter()
            .fold(Expr::Param(index), |expr, segment| expr.member(segment.clone()))
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into()),
        }
    }

    /// `self == other`
    pub fn equals(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self != other`
    pub fn not_equals(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    /// `self < other`
    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    /// `self > other`
    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    /// `self && other`
    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self || other`
    pub fn or(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self + other`
    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    /// `self * other`
    pub fn mul(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    /// `self in values`
    pub fn in_list(self, values: Vec<Value>) -> Self {
        self.binary(BinaryOp::In, Expr::Const(Value::List(values)))
    }

    /// `!self`
    pub fn negate(self) -> Self {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// `self is null`
    pub fn is_null(self) -> Self {
        Expr::Unary {
            op: UnaryOp::IsNull,
            operand: Box::new(self),
        }
    }

    /// Function call.
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
        }
    }

    /// Conditional expression.
    pub fn conditional(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Aggregate over a sequence.
    pub fn aggregate(
        function: AggregateFunction,
        source: Expr,
        selector: Option<Expr>,
        element: usize,
    ) -> Self {
        Expr::Aggregate {
            function,
            source: Box::new(source),
            selector: selector.map(Box::new),
            element,
        }
    }

    /// Numeric conversion.
    pub fn convert(self, to: ScalarType) -> Self {
        Expr::Convert {
            operand: Box::new(self),
            to,
        }
    }

    /// Direct construction with member-bound arguments.
    pub fn new_shape<I, S>(shape: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        let (members, args): (Vec<Option<String>>, Vec<Expr>) = members
            .into_iter()
            .map(|(name, expr)| (Some(name.into()), expr))
            .unzip();
        Expr::New {
            shape: shape.into(),
            args,
            members,
        }
    }

    /// Property-initialization with named member assignments.
    pub fn member_init<I, S>(shape: impl Into<String>, args: Vec<Expr>, bindings: I) -> Self
    where
        I: IntoIterator<Item = (S, Expr)>,
        S: Into<String>,
    {
        Expr::MemberInit {
            shape: shape.into(),
            args,
            bindings: bindings
                .into_iter()
                .map(|(member, expr)| MemberBinding {
                    member: member.into(),
                    expr,
                })
                .collect(),
        }
    }

    /// If this is a member chain rooted at a parameter, return the parameter
    /// index and the member path (`Param(i)` alone yields the root path).
    pub fn member_chain(&self) -> Option<(usize, MemberPath)> {
        match self {
            Expr::Param(index) => Some((*index, MemberPath::root())),
            Expr::Member { target, name } => {
                let (index, path) = target.member_chain()?;
                Some((index, path.child(name.clone())))
            }
            _ => None,
        }
    }

    /// Check if this is a construction expression.
    pub fn is_construction(&self) -> bool {
        matches!(self, Expr::New { .. } | Expr::MemberInit { .. })
    }

    /// Direct sub-expressions.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Param(_) | Expr::Const(_) => vec![],
            Expr::Member { target, .. } => vec![target],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Unary { operand, .. } | Expr::Convert { operand, .. } => vec![operand],
            Expr::Call { args, .. } | Expr::New { args, .. } => args.iter().collect(),
            Expr::Aggregate {
                source, selector, ..
            } => {
                let mut children: Vec<&Expr> = vec![source];
                if let Some(selector) = selector {
                    children.push(selector);
                }
                children
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => vec![test, then, otherwise],
            Expr::MemberInit { args, bindings, .. } => args
                .iter()
                .chain(bindings.iter().map(|b| &b.expr))
                .collect(),
        }
    }

    /// Pre-order visit of this expression and all sub-expressions.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Check whether any sub-expression satisfies the predicate.
    pub fn any(&self, predicate: &dyn Fn(&Expr) -> bool) -> bool {
        predicate(self) || self.children().into_iter().any(|c| c.any(predicate))
    }

    /// Top-down rewrite: `f` returns a replacement for a node, or `None` to
    /// keep the node and rewrite its children.
    pub fn rewrite(&self, f: &mut dyn FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        match self {
            Expr::Param(_) | Expr::Const(_) => self.clone(),
            Expr::Member { target, name } => Expr::Member {
                target: Box::new(target.rewrite(f)),
                name: name.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.rewrite(f)),
            },
            Expr::Call { function, args } => Expr::Call {
                function: function.clone(),
                args: args.iter().map(|a| a.rewrite(f)).collect(),
            },
            Expr::Aggregate {
                function,
                source,
                selector,
                element,
            } => Expr::Aggregate {
                function: *function,
                source: Box::new(source.rewrite(f)),
                selector: selector.as_ref().map(|s| Box::new(s.rewrite(f))),
                element: *element,
            },
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => Expr::Conditional {
                test: Box::new(test.rewrite(f)),
                then: Box::new(then.rewrite(f)),
                otherwise: Box::new(otherwise.rewrite(f)),
            },
            Expr::New {
                shape,
                args,
                members,
            } => Expr::New {
                shape: shape.clone(),
                args: args.iter().map(|a| a.rewrite(f)).collect(),
                members: members.clone(),
            },
            Expr::MemberInit {
                shape,
                args,
                bindings,
            } => Expr::MemberInit {
                shape: shape.clone(),
                args: args.iter().map(|a| a.rewrite(f)).collect(),
                bindings: bindings
                    .iter()
                    .map(|b| MemberBinding {
                        member: b.member.clone(),
                        expr: b.expr.rewrite(f),
                    })
                    .collect(),
            },
            Expr::Convert { operand, to } => Expr::Convert {
                operand: Box::new(operand.rewrite(f)),
                to: *to,
            },
        }
    }

    /// Replace parameter `index` with `replacement` everywhere.
    pub fn substitute_param(&self, index: usize, replacement: &Expr) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Param(i) if *i == index => Some(replacement.clone()),
            _ => None,
        })
    }

    /// Check whether the expression references parameter `index`.
    pub fn uses_param(&self, index: usize) -> bool {
        self.any(&|e| matches!(e, Expr::Param(i) if *i == index))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Const(value)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Const(Value::Int32(v))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Const(Value::Int64(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Const(Value::Bool(v))
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Const(Value::String(v.to_string()))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(i) => write!(f, "${i}"),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Member { target, name } => write!(f, "{target}.{name}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::IsNull => write!(f, "({operand} is null)"),
            },
            Expr::Call { function, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{function}({})", args.join(", "))
            }
            Expr::Aggregate {
                function,
                source,
                selector,
                element,
            } => match selector {
                Some(selector) => write!(f, "{function:?}({source}, ${element} => {selector})"),
                None => write!(f, "{function:?}({source})"),
            },
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
            Expr::New {
                shape,
                args,
                members,
            } => {
                let parts: Vec<String> = args
                    .iter()
                    .zip(members)
                    .map(|(arg, member)| match member {
                        Some(member) => format!("{member} = {arg}"),
                        None => arg.to_string(),
                    })
                    .collect();
                write!(f, "new {shape}({})", parts.join(", "))
            }
            Expr::MemberInit {
                shape,
                args,
                bindings,
            } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                let bindings: Vec<String> = bindings
                    .iter()
                    .map(|b| format!("{} = {}", b.member, b.expr))
                    .collect();
                write!(f, "new {shape}({}) {{ {} }}", args.join(", "), bindings.join(", "))
            }
            Expr::Convert { operand, to } => write!(f, "({to:?}){operand}"),
        }
    }
}

/// A lambda: named parameters and a body expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    /// Parameter names (display only; the body references positions).
    pub params: Vec<String>,
    /// Body expression.
    pub body: Expr,
}

impl Lambda {
    /// Create a lambda with explicit parameter names.
    pub fn new<I, S>(params: I, body: Expr) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            body,
        }
    }

    /// Single-parameter lambda.
    pub fn unary(body: Expr) -> Self {
        Self::new(["x"], body)
    }

    /// Two-parameter lambda.
    pub fn binary(body: Expr) -> Self {
        Self::new(["x", "y"], body)
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check if the body is a member path rooted at the first parameter.
    pub fn degenerate_path(&self) -> Option<MemberPath> {
        match self.body.member_chain() {
            Some((0, path)) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}| {}", self.params.join(", "), self.body)
    }
}
