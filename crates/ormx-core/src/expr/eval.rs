//! Expression evaluation over runtime values.

use std::cmp::Ordering;

use ormx_proto::{AggregateFunction, BinaryOp, Expr, Record, ScalarType, UnaryOp, Value};
use tracing::trace;

use super::functions;
use crate::catalog::ObjectModel;
use crate::error::Error;
use crate::view::{bound_members, Conversion};

/// Supplies values of members that are absent from a record.
pub trait MemberResolver {
    /// Value of `member` on `record`, which does not carry it.
    fn resolve_missing(&self, record: &Record, member: &str) -> Result<Value, Error>;
}

/// Resolver for fully materialized data: an absent reference is an error,
/// an absent attribute is null.
pub struct LocalResolver<'a> {
    model: &'a ObjectModel,
}

impl<'a> LocalResolver<'a> {
    /// Create a resolver over a model.
    pub fn new(model: &'a ObjectModel) -> Self {
        Self { model }
    }
}

impl MemberResolver for LocalResolver<'_> {
    fn resolve_missing(&self, record: &Record, member: &str) -> Result<Value, Error> {
        if self.model.relation(&record.shape, member).is_some() {
            return Err(Error::NotLoaded {
                owner: record.shape.clone(),
                member: member.to_string(),
            });
        }
        Ok(Value::Null)
    }
}

/// Equality used by comparisons: entity objects compare by identity,
/// everything else loosely across numeric widths.
pub fn values_equal(model: &ObjectModel, a: &Value, b: &Value) -> bool {
    if let (Value::Record(ra), Value::Record(rb)) = (a, b) {
        if let (Some(ka), Some(kb)) = (model.identity_of(ra), model.identity_of(rb)) {
            return ka == kb;
        }
    }
    a.loose_eq(b)
}

/// Evaluates expressions against an environment of parameter values.
pub struct Evaluator<'a> {
    model: &'a ObjectModel,
    resolver: &'a dyn MemberResolver,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator.
    pub fn new(model: &'a ObjectModel, resolver: &'a dyn MemberResolver) -> Self {
        Self { model, resolver }
    }

    /// Object model.
    pub fn model(&self) -> &'a ObjectModel {
        self.model
    }

    /// Evaluate an expression; `env[i]` is the value of `Param(i)`.
    pub fn eval(&self, expr: &Expr, env: &[Value]) -> Result<Value, Error> {
        match expr {
            Expr::Param(index) => env.get(*index).cloned().ok_or_else(|| {
                Error::ContractViolation(format!(
                    "parameter {index} is unbound ({} bound)",
                    env.len()
                ))
            }),
            Expr::Const(value) => Ok(value.clone()),
            Expr::Member { target, name } => {
                let target = self.eval(target, env)?;
                self.member(&target, name)
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right, env),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                match op {
                    UnaryOp::IsNull => Ok(Value::Bool(value.is_null())),
                    UnaryOp::Not => match value {
                        Value::Null => Ok(Value::Null),
                        Value::Bool(b) => Ok(Value::Bool(!b)),
                        other => Err(Error::type_mismatch("bool", other.type_name())),
                    },
                    UnaryOp::Neg => match value {
                        Value::Null => Ok(Value::Null),
                        Value::Int32(i) => Ok(Value::Int32(-i)),
                        Value::Int64(i) => Ok(Value::Int64(-i)),
                        Value::Float32(f) => Ok(Value::Float32(-f)),
                        Value::Float64(f) => Ok(Value::Float64(-f)),
                        other => Err(Error::type_mismatch("numeric", other.type_name())),
                    },
                }
            }
            Expr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(function, &args)
            }
            Expr::Aggregate {
                function,
                source,
                selector,
                element,
            } => {
                let items = match self.eval(source, env)? {
                    Value::Null => Vec::new(),
                    Value::List(items) => items,
                    other => return Err(Error::type_mismatch("sequence", other.type_name())),
                };
                let values = match selector {
                    Some(selector) => {
                        let mut inner: Vec<Value> = env[..(*element).min(env.len())].to_vec();
                        inner.resize(*element, Value::Null);
                        inner.push(Value::Null);
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            inner[*element] = item;
                            out.push(self.eval(selector, &inner)?);
                        }
                        out
                    }
                    None => items,
                };
                aggregate(*function, &values)
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => match self.eval(test, env)? {
                Value::Bool(true) => self.eval(then, env),
                Value::Bool(false) | Value::Null => self.eval(otherwise, env),
                other => Err(Error::type_mismatch("bool", other.type_name())),
            },
            Expr::New { shape, .. } | Expr::MemberInit { shape, .. } => {
                let declared = self.model.shape(shape);
                let mut record = Record::new(shape.clone());
                for (name, arg) in bound_members(declared.as_deref(), expr)? {
                    let value = self.eval(&arg, env)?;
                    let value = self.convert_for_member(shape, &name, value)?;
                    record.set(name, value);
                }
                Ok(record.into_value())
            }
            Expr::Convert { operand, to } => {
                let value = self.eval(operand, env)?;
                convert_scalar(value, *to)
            }
        }
    }

    /// Evaluate a predicate; null counts as false.
    pub fn eval_bool(&self, expr: &Expr, env: &[Value]) -> Result<bool, Error> {
        match self.eval(expr, env)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(Error::type_mismatch("bool", other.type_name())),
        }
    }

    /// Access a member of a value.
    pub fn member(&self, target: &Value, name: &str) -> Result<Value, Error> {
        match target {
            Value::Null => Ok(Value::Null),
            Value::Record(record) => match record.get(name) {
                Some(value) => Ok(value.clone()),
                None => {
                    trace!(shape = %record.shape, member = name, "member not materialized");
                    self.resolver.resolve_missing(record, name)
                }
            },
            other => Err(Error::unknown_member(other.type_name(), name)),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, env: &[Value]) -> Result<Value, Error> {
        match op {
            BinaryOp::And => {
                if !self.eval_bool(left, env)? {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval_bool(right, env)?));
            }
            BinaryOp::Or => {
                if self.eval_bool(left, env)? {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval_bool(right, env)?));
            }
            _ => {}
        }

        let l = self.eval(left, env)?;
        let r = self.eval(right, env)?;
        let result = match op {
            BinaryOp::Eq => Value::Bool(values_equal(self.model, &l, &r)),
            BinaryOp::Ne => Value::Bool(!values_equal(self.model, &l, &r)),
            BinaryOp::Lt => Value::Bool(compare(&l, &r).is_some_and(Ordering::is_lt)),
            BinaryOp::Le => Value::Bool(compare(&l, &r).is_some_and(Ordering::is_le)),
            BinaryOp::Gt => Value::Bool(compare(&l, &r).is_some_and(Ordering::is_gt)),
            BinaryOp::Ge => Value::Bool(compare(&l, &r).is_some_and(Ordering::is_ge)),
            BinaryOp::In => match &r {
                Value::List(items) => {
                    Value::Bool(items.iter().any(|v| values_equal(self.model, &l, v)))
                }
                Value::Null => Value::Bool(false),
                other => return Err(Error::type_mismatch("list", other.type_name())),
            },
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                arithmetic(op, &l, &r)?
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };
        Ok(result)
    }

    fn convert_for_member(&self, shape: &str, member: &str, value: Value) -> Result<Value, Error> {
        let Some(descriptor) = self.model.shape(shape) else {
            return Ok(value);
        };
        if !descriptor.is_declared() {
            return Ok(value);
        }
        match descriptor.field_type(member) {
            Some(target) => Conversion::for_value(&value, target)?.apply(self.model, value),
            None => Ok(value),
        }
    }
}

/// Ordering of two values; null and incompatible types are unordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Enum { ty: t1, variant: v1 }, Value::Enum { ty: t2, variant: v2 }) if t1 == t2 => {
            Some(v1.cmp(v2))
        }
        _ => a.loose_cmp(b),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, Error> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::String(a), Value::String(b), BinaryOp::Add) = (l, r, op) {
        return Ok(Value::String(format!("{a}{b}")));
    }
    let overflow = || Error::Evaluation(format!("integer overflow in {op:?}"));
    match (l, r) {
        (Value::Int32(a), Value::Int32(b)) => {
            let v = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ if *b == 0 => return Err(Error::Evaluation("division by zero".into())),
                _ => a.checked_div(*b),
            };
            v.map(Value::Int32).ok_or_else(overflow)
        }
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            let (a, b) = (l.as_i64().unwrap_or_default(), r.as_i64().unwrap_or_default());
            let v = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                _ if b == 0 => return Err(Error::Evaluation("division by zero".into())),
                _ => a.checked_div(b),
            };
            v.map(Value::Int64).ok_or_else(overflow)
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            let v = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                _ => x / y,
            };
            if matches!((a, b), (Value::Float32(_), Value::Float32(_))) {
                Ok(Value::Float32(v as f32))
            } else {
                Ok(Value::Float64(v))
            }
        }
        _ => Err(Error::type_mismatch(
            "numeric operands",
            format!("{} and {}", l.type_name(), r.type_name()),
        )),
    }
}

/// Apply an aggregate function to already-selected values. Nulls are
/// skipped by every function except `Count`.
pub fn aggregate(function: AggregateFunction, values: &[Value]) -> Result<Value, Error> {
    if function == AggregateFunction::Count {
        return Ok(Value::Int64(values.len() as i64));
    }
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match function {
        AggregateFunction::Count => unreachable!("handled above"),
        AggregateFunction::Sum => {
            if present.iter().all(|v| matches!(v, Value::Int32(_) | Value::Int64(_))) {
                let mut sum: i64 = 0;
                for v in &present {
                    sum = sum
                        .checked_add(v.as_i64().unwrap_or_default())
                        .ok_or_else(|| Error::Evaluation("integer overflow in Sum".into()))?;
                }
                Ok(Value::Int64(sum))
            } else {
                let mut sum = 0.0;
                for v in &present {
                    sum += v
                        .as_f64()
                        .ok_or_else(|| Error::type_mismatch("numeric", v.type_name()))?;
                }
                Ok(Value::Float64(sum))
            }
        }
        AggregateFunction::Avg => {
            if present.is_empty() {
                return Ok(Value::Null);
            }
            let mut sum = 0.0;
            for v in &present {
                sum += v
                    .as_f64()
                    .ok_or_else(|| Error::type_mismatch("numeric", v.type_name()))?;
            }
            Ok(Value::Float64(sum / present.len() as f64))
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let mut best: Option<&Value> = None;
            for v in present {
                best = match best {
                    None => Some(v),
                    Some(current) => {
                        let ord = compare(v, current).ok_or_else(|| {
                            Error::type_mismatch(current.type_name(), v.type_name())
                        })?;
                        let better = if function == AggregateFunction::Min {
                            ord.is_lt()
                        } else {
                            ord.is_gt()
                        };
                        Some(if better { v } else { current })
                    }
                };
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
    }
}

/// Explicit scalar conversion.
pub fn convert_scalar(value: Value, to: ScalarType) -> Result<Value, Error> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let converted = match to {
        ScalarType::Int32 => value
            .as_f64()
            .map(|f| Value::Int32(f as i32))
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()).map(Value::Int32)),
        ScalarType::Int64 => value
            .as_f64()
            .map(|f| match value.as_i64() {
                Some(i) => Value::Int64(i),
                None => Value::Int64(f as i64),
            })
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()).map(Value::Int64)),
        ScalarType::Float32 => value.as_f64().map(|f| Value::Float32(f as f32)),
        ScalarType::Float64 => value
            .as_f64()
            .map(Value::Float64)
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()).map(Value::Float64)),
        ScalarType::String => Some(match &value {
            Value::String(s) => Value::String(s.clone()),
            Value::Enum { variant, .. } => Value::String(variant.clone()),
            other => Value::String(other.to_string()),
        }),
        ScalarType::Bool => value.as_bool().map(Value::Bool),
        _ => None,
    };
    converted.ok_or_else(|| Error::type_mismatch(format!("{to:?}"), value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;
    use ormx_proto::Expr;

    fn order() -> Value {
        Record::new("Order")
            .with_field("id", 10i64)
            .with_field("total", 25.0)
            .with_field("qty", 2i32)
            .with_field("customer_id", 1i64)
            .into_value()
    }

    #[test]
    fn test_member_and_comparison() {
        let model = create_test_model();
        let resolver = LocalResolver::new(&model);
        let eval = Evaluator::new(&model, &resolver);

        let expr = Expr::param(0).member("total").gt(20);
        assert_eq!(eval.eval(&expr, &[order()]).unwrap(), Value::Bool(true));

        let expr = Expr::param(0).member("qty").add(Expr::lit(3i64));
        assert_eq!(eval.eval(&expr, &[order()]).unwrap(), Value::Int64(5));
    }

    #[test]
    fn test_unloaded_reference_is_an_error() {
        let model = create_test_model();
        let resolver = LocalResolver::new(&model);
        let eval = Evaluator::new(&model, &resolver);

        let expr = Expr::param(0).path("customer.name");
        assert!(matches!(
            eval.eval(&expr, &[order()]),
            Err(Error::NotLoaded { .. })
        ));
        // Absent attribute reads as null.
        let expr = Expr::param(0).member("note");
        assert_eq!(eval.eval(&expr, &[order()]).unwrap(), Value::Null);
    }

    #[test]
    fn test_aggregate_with_selector() {
        let model = create_test_model();
        let resolver = LocalResolver::new(&model);
        let eval = Evaluator::new(&model, &resolver);

        let lines = Value::List(vec![
            Record::new("Line").with_field("qty", 2i32).into_value(),
            Record::new("Line").with_field("qty", 5i32).into_value(),
        ]);
        let customer = Record::new("Order")
            .with_field("id", 1i64)
            .with_field("lines", lines)
            .into_value();
        let sum = Expr::aggregate(
            AggregateFunction::Sum,
            Expr::param(0).member("lines"),
            Some(Expr::param(1).member("qty")),
            1,
        );
        assert_eq!(eval.eval(&sum, &[customer.clone()]).unwrap(), Value::Int64(7));

        let count = Expr::aggregate(
            AggregateFunction::Count,
            Expr::param(0).member("lines"),
            None,
            1,
        );
        assert_eq!(eval.eval(&count, &[customer]).unwrap(), Value::Int64(2));
    }

    #[test]
    fn test_declared_shape_converts_members() {
        let model = create_test_model();
        let resolver = LocalResolver::new(&model);
        let eval = Evaluator::new(&model, &resolver);

        // OrderLine(Id: Int64, Total: Float64) built positionally from Int32 values.
        let expr = Expr::New {
            shape: "OrderLine".into(),
            args: vec![Expr::param(0).member("qty"), Expr::param(0).member("qty")],
            members: vec![None, None],
        };
        let value = eval.eval(&expr, &[order()]).unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("Id"), Some(&Value::Int64(2)));
        assert_eq!(record.get("Total"), Some(&Value::Float64(2.0)));
    }

    #[test]
    fn test_entity_equality_uses_identity() {
        let model = create_test_model();
        let loaded = Record::new("Order")
            .with_field("id", 10i64)
            .with_field("lines", Value::List(vec![]))
            .into_value();
        assert!(values_equal(&model, &order(), &loaded));
        assert!(!values_equal(&model, &order(), &Value::Null));
    }

    #[test]
    fn test_aggregate_functions() {
        let values = vec![Value::Int32(3), Value::Null, Value::Int64(1)];
        assert_eq!(
            aggregate(AggregateFunction::Count, &values).unwrap(),
            Value::Int64(3)
        );
        assert_eq!(
            aggregate(AggregateFunction::Min, &values).unwrap(),
            Value::Int64(1)
        );
        assert_eq!(
            aggregate(AggregateFunction::Avg, &values).unwrap(),
            Value::Float64(2.0)
        );
        assert_eq!(aggregate(AggregateFunction::Max, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_division_by_zero() {
        assert!(arithmetic(BinaryOp::Div, &Value::Int32(1), &Value::Int32(0)).is_err());
        assert_eq!(
            arithmetic(BinaryOp::Div, &Value::Int64(7), &Value::Int32(2)).unwrap(),
            Value::Int64(3)
        );
    }
}
