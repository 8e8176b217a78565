//! Scalar functions callable from expressions.
//!
//! Every function propagates null: a null argument yields a null result,
//! except for `coalesce` and `is_empty`.

use std::iter::Peekable;
use std::str::Chars;

use ormx_proto::{ScalarType, TypeRef, Value};

use crate::error::Error;

/// Names of all built-in functions.
pub const FUNCTIONS: &[&str] = &[
    "upper",
    "lower",
    "trim",
    "reverse",
    "len",
    "contains",
    "starts_with",
    "ends_with",
    "like",
    "concat",
    "abs",
    "coalesce",
    "is_empty",
];

/// Check whether a function name is built in.
pub fn is_known(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// Static result type of a call.
pub fn return_type(name: &str, args: &[TypeRef]) -> Result<TypeRef, Error> {
    check_arity(name, args.len())?;
    let ty = match name {
        "upper" | "lower" | "trim" | "reverse" | "concat" => TypeRef::scalar(ScalarType::String),
        "len" => TypeRef::scalar(ScalarType::Int64),
        "contains" | "starts_with" | "ends_with" | "like" | "is_empty" => {
            TypeRef::scalar(ScalarType::Bool)
        }
        "abs" => args[0].clone(),
        "coalesce" => args
            .iter()
            .find(|t| **t != TypeRef::Unknown)
            .cloned()
            .unwrap_or(TypeRef::Unknown),
        other => return Err(Error::Evaluation(format!("unknown function {other}"))),
    };
    Ok(ty)
}

fn check_arity(name: &str, count: usize) -> Result<(), Error> {
    let expected = match name {
        "upper" | "lower" | "trim" | "reverse" | "len" | "abs" | "is_empty" => 1..=1,
        "contains" | "starts_with" | "ends_with" | "like" => 2..=2,
        "concat" | "coalesce" => 1..=usize::MAX,
        other => return Err(Error::Evaluation(format!("unknown function {other}"))),
    };
    if expected.contains(&count) {
        Ok(())
    } else {
        Err(Error::Evaluation(format!(
            "{name} called with {count} arguments"
        )))
    }
}

fn string_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, Error> {
    value
        .as_str()
        .ok_or_else(|| Error::type_mismatch(format!("string argument to {name}"), value.type_name()))
}

/// Invoke a function on evaluated arguments.
pub fn call(name: &str, args: &[Value]) -> Result<Value, Error> {
    check_arity(name, args.len())?;
    match name {
        "coalesce" => {
            return Ok(args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null))
        }
        "is_empty" => {
            let empty = match &args[0] {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::List(items) => items.is_empty(),
                other => return Err(Error::type_mismatch("string or list", other.type_name())),
            };
            return Ok(Value::Bool(empty));
        }
        _ => {}
    }
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    let value = match name {
        "upper" => Value::String(string_arg(name, &args[0])?.to_uppercase()),
        "lower" => Value::String(string_arg(name, &args[0])?.to_lowercase()),
        "trim" => Value::String(string_arg(name, &args[0])?.trim().to_string()),
        "reverse" => Value::String(string_arg(name, &args[0])?.chars().rev().collect()),
        "len" => match &args[0] {
            Value::List(items) => Value::Int64(items.len() as i64),
            other => Value::Int64(string_arg(name, other)?.chars().count() as i64),
        },
        "contains" => {
            Value::Bool(string_arg(name, &args[0])?.contains(string_arg(name, &args[1])?))
        }
        "starts_with" => {
            Value::Bool(string_arg(name, &args[0])?.starts_with(string_arg(name, &args[1])?))
        }
        "ends_with" => {
            Value::Bool(string_arg(name, &args[0])?.ends_with(string_arg(name, &args[1])?))
        }
        "like" => Value::Bool(like_match(
            string_arg(name, &args[0])?,
            string_arg(name, &args[1])?,
        )),
        "concat" => {
            let mut out = String::new();
            for arg in args {
                match arg {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            Value::String(out)
        }
        "abs" => match &args[0] {
            Value::Int32(i) => Value::Int32(i.wrapping_abs()),
            Value::Int64(i) => Value::Int64(i.wrapping_abs()),
            Value::Float32(f) => Value::Float32(f.abs()),
            Value::Float64(f) => Value::Float64(f.abs()),
            other => return Err(Error::type_mismatch("numeric", other.type_name())),
        },
        other => return Err(Error::Evaluation(format!("unknown function {other}"))),
    };
    Ok(value)
}

/// Match a string against a SQL LIKE pattern.
///
/// Supports:
/// - `%` matches zero or more characters
/// - `_` matches exactly one character
/// - `\\%` matches literal `%`
/// - `\\_` matches literal `_`
pub fn like_match(value: &str, pattern: &str) -> bool {
    let mut chars = value.chars().peekable();
    let mut pattern_chars = pattern.chars().peekable();

    like_match_recursive(&mut chars, &mut pattern_chars)
}

fn like_match_recursive(chars: &mut Peekable<Chars>, pattern: &mut Peekable<Chars>) -> bool {
    loop {
        match (pattern.peek().copied(), chars.peek().copied()) {
            (None, None) => return true,
            (None, Some(_)) => return false,
            (Some('%'), _) => {
                pattern.next();
                if pattern.peek().is_none() {
                    return true;
                }
                // Try matching % with 0, 1, 2, ... characters
                loop {
                    let mut pattern_clone = pattern.clone();
                    let mut chars_clone = chars.clone();
                    if like_match_recursive(&mut chars_clone, &mut pattern_clone) {
                        return true;
                    }
                    if chars.next().is_none() {
                        return false;
                    }
                }
            }
            (Some('_'), Some(_)) => {
                pattern.next();
                chars.next();
            }
            (Some('_'), None) => return false,
            (Some('\\'), _) => {
                pattern.next();
                match (pattern.peek().copied(), chars.peek().copied()) {
                    (Some(p), Some(c)) if p == c => {
                        pattern.next();
                        chars.next();
                    }
                    _ => return false,
                }
            }
            (Some(p), Some(c)) => {
                if p == c {
                    pattern.next();
                    chars.next();
                } else {
                    return false;
                }
            }
            (Some(_), None) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.into())
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", &[s("ab")]).unwrap(), s("AB"));
        assert_eq!(call("reverse", &[s("t12")]).unwrap(), s("21t"));
        assert_eq!(call("len", &[s("héllo")]).unwrap(), Value::Int64(5));
        assert_eq!(
            call("starts_with", &[s("t12"), s("t1")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("concat", &[s("a"), Value::Int32(1)]).unwrap(),
            s("a1")
        );
    }

    #[test]
    fn test_null_propagation() {
        assert_eq!(call("upper", &[Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            call("coalesce", &[Value::Null, Value::Int32(3)]).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(call("is_empty", &[Value::Null]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_arity_and_types() {
        assert!(call("upper", &[]).is_err());
        assert!(call("upper", &[Value::Int32(1)]).is_err());
        assert!(call("nope", &[s("x")]).is_err());
        assert_eq!(
            return_type("abs", &[TypeRef::scalar(ScalarType::Int32)]).unwrap(),
            TypeRef::scalar(ScalarType::Int32)
        );
        assert_eq!(
            return_type("like", &[TypeRef::Unknown, TypeRef::Unknown]).unwrap(),
            TypeRef::scalar(ScalarType::Bool)
        );
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("alice@example.com", "%@%"));
        assert!(like_match("alice@example.com", "%ice%exam%"));
        assert!(like_match("A1B", "A_B"));
        assert!(!like_match("A1B", "__"));
        assert!(like_match("100%", "100\\%"));
        assert!(!like_match("Alice", "Bob"));
    }
}
