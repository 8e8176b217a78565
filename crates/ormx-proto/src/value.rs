//! Runtime value types for query evaluation and results.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A runtime value produced by the backend or by local re-execution.
///
/// Scalar variants mirror the scalar types of the object model. Structured
/// results (entity objects, synthesized views, groupings) are carried as
/// shared [`Record`]s so rows can be cloned cheaply while flowing through
/// the decomposition stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit floating point.
    Float32(f32),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
    /// Enumeration member.
    Enum {
        /// Name of the enum type.
        ty: String,
        /// Selected variant.
        variant: String,
    },
    /// Ordered sequence of values (collection references, group elements).
    List(Vec<Value>),
    /// Structured record (entity object, view instance, grouping).
    Record(Arc<Record>),
}

/// A generic record keyed by a shape name.
///
/// Entity objects use the entity name as shape; a reference field that is not
/// present means the related data was not loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Shape (entity, view or grouping) this record instantiates.
    pub shape: String,
    /// Field values in declaration order.
    pub fields: Vec<(String, Value)>,
}

/// Identity of an entity object inside an identity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Entity type name.
    pub entity: String,
    /// Canonical key string of the identity attribute.
    pub id: String,
}

impl ObjectKey {
    /// Build a key from an entity name and its identity value.
    pub fn new(entity: impl Into<String>, id: &Value) -> Self {
        Self {
            entity: entity.into(),
            id: id.key_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}

impl Record {
    /// Create an empty record of the given shape.
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field (builder style).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a mutable field value by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Check whether a field is present.
    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Set a field, replacing an existing value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Wrap into a shared record value.
    pub fn into_value(self) -> Value {
        Value::Record(Arc::new(self))
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64 (widening from i32).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64 (widening from any numeric).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Float32(f) => Some(*f as f64),
            Value::Int64(i) => Some(*i as f64),
            Value::Int32(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a record.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Check whether this is an integer or floating point value.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_)
        )
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::Uuid(_) => "uuid",
            Value::Enum { .. } => "enum",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    /// Equality across numeric widths (Int32 == Int64, Float32 == Float64).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
                self.as_i64() == other.as_i64()
            }
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
            (Value::Enum { ty: t1, variant: v1 }, Value::Enum { ty: t2, variant: v2 }) => {
                t1 == t2 && v1 == v2
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Compare two values, returning their ordering if comparable.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
                self.as_i64()?.partial_cmp(&other.as_i64()?)
            }
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None, // Incompatible types
        }
    }

    /// Canonical string used for hashing keys (identity maps, group keys).
    ///
    /// Integers of both widths share a representation so that widened keys
    /// collide with their narrow originals.
    pub fn key_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Int32(i) => format!("i:{i}"),
            Value::Int64(i) => format!("i:{i}"),
            Value::Float32(f) => format!("f:{}", *f as f64),
            Value::Float64(f) => format!("f:{f}"),
            Value::String(s) => format!("s:{s}"),
            Value::Bytes(b) => format!("x:{b:?}"),
            Value::Timestamp(t) => format!("t:{t}"),
            Value::Uuid(u) => format!("u:{u:?}"),
            Value::Enum { ty, variant } => format!("e:{ty}.{variant}"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::key_string).collect();
                format!("[{}]", parts.join(","))
            }
            Value::Record(r) => {
                let parts: Vec<String> = r
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{n}={}", v.key_string()))
                    .collect();
                format!("{}{{{}}}", r.shape, parts.join(","))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(t) => write!(f, "@{t}"),
            Value::Uuid(u) => write!(f, "uuid:{u:?}"),
            Value::Enum { ty, variant } => write!(f, "{ty}.{variant}"),
            Value::List(items) => write!(f, "[{} items]", items.len()),
            Value::Record(r) => write!(f, "{} {{{} fields}}", r.shape, r.fields.len()),
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<[u8; 16]> for Value {
    fn from(v: [u8; 16]) -> Self {
        Value::Uuid(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        v.into_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Int32(42).as_i64(), Some(42)); // Widening conversion
        assert_eq!(Value::Int32(2).as_f64(), Some(2.0));

        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::List(vec![Value::Null]).as_list().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v, Value::Bool(true));

        let v: Value = "hello".into();
        assert_eq!(v, Value::String("hello".into()));

        let v: Value = None::<i32>.into();
        assert_eq!(v, Value::Null);

        let v: Value = Some(42i32).into();
        assert_eq!(v, Value::Int32(42));
    }

    #[test]
    fn test_loose_equality_across_widths() {
        assert!(Value::Int32(7).loose_eq(&Value::Int64(7)));
        assert!(Value::Float32(1.5).loose_eq(&Value::Float64(1.5)));
        assert!(Value::Int64(2).loose_eq(&Value::Float64(2.0)));
        assert!(!Value::String("7".into()).loose_eq(&Value::Int32(7)));
    }

    #[test]
    fn test_loose_ordering() {
        assert_eq!(
            Value::Int32(1).loose_cmp(&Value::Int64(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::String("b".into()).loose_cmp(&Value::String("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Bool(true).loose_cmp(&Value::Int32(1)), None);
    }

    #[test]
    fn test_key_string_shares_integer_widths() {
        assert_eq!(Value::Int32(5).key_string(), Value::Int64(5).key_string());
        assert_ne!(Value::Int32(5).key_string(), Value::String("5".into()).key_string());
    }

    #[test]
    fn test_record_fields() {
        let mut record = Record::new("Order").with_field("id", 1i64).with_field("total", 10.5);
        assert_eq!(record.get("id"), Some(&Value::Int64(1)));
        assert!(record.has("total"));

        record.set("id", Value::Int64(2));
        assert_eq!(record.get("id"), Some(&Value::Int64(2)));
        assert_eq!(record.fields.len(), 2);

        assert_eq!(record.remove("total"), Some(Value::Float64(10.5)));
        assert!(!record.has("total"));
    }

    #[test]
    fn test_object_key_display() {
        let key = ObjectKey::new("Order", &Value::Int64(3));
        assert_eq!(key.to_string(), "Order#i:3");
        assert_eq!(key, ObjectKey::new("Order", &Value::Int32(3)));
    }

    #[test]
    fn test_value_json_roundtrip() {
        let value = Record::new("Order")
            .with_field("id", 1i64)
            .with_field("tags", Value::List(vec!["a".into(), "b".into()]))
            .into_value();
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
