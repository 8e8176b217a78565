//! Static type descriptors used by query operations and expressions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Scalar data types of the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float32 | ScalarType::Float64
        )
    }

    /// Check if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Int32 | ScalarType::Int64)
    }

    /// The scalar type of a runtime value, if it is a scalar.
    pub fn of_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(ScalarType::Bool),
            Value::Int32(_) => Some(ScalarType::Int32),
            Value::Int64(_) => Some(ScalarType::Int64),
            Value::Float32(_) => Some(ScalarType::Float32),
            Value::Float64(_) => Some(ScalarType::Float64),
            Value::String(_) => Some(ScalarType::String),
            Value::Bytes(_) => Some(ScalarType::Bytes),
            Value::Timestamp(_) => Some(ScalarType::Timestamp),
            Value::Uuid(_) => Some(ScalarType::Uuid),
            _ => None,
        }
    }

    /// Wider of two numeric types (used for arithmetic results).
    pub fn widen(self, other: ScalarType) -> ScalarType {
        use ScalarType::*;
        match (self, other) {
            (Float64, _) | (_, Float64) => Float64,
            (Float32, _) | (_, Float32) => Float32,
            (Int64, _) | (_, Int64) => Int64,
            _ => Int32,
        }
    }
}

/// Static type of a query element or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    /// Scalar attribute type.
    Scalar(ScalarType),
    /// Enumeration type by name.
    Enum(String),
    /// Identifiable entity (structural type with identity).
    Entity(String),
    /// Complex (struct-like, non-identifiable) type.
    Complex(String),
    /// Projection shape (declared class, anonymous shape or synthesized view).
    Shape(String),
    /// Sequence of elements.
    Sequence(Box<TypeRef>),
    /// Grouping result with key and element types.
    Grouping {
        /// Type of the grouping key.
        key: Box<TypeRef>,
        /// Type of grouped elements.
        element: Box<TypeRef>,
    },
    /// Type could not be determined (constants of null, opaque results).
    Unknown,
}

impl TypeRef {
    /// Scalar type shorthand.
    pub fn scalar(scalar: ScalarType) -> Self {
        TypeRef::Scalar(scalar)
    }

    /// Entity type shorthand.
    pub fn entity(name: impl Into<String>) -> Self {
        TypeRef::Entity(name.into())
    }

    /// Sequence type shorthand.
    pub fn sequence(element: TypeRef) -> Self {
        TypeRef::Sequence(Box::new(element))
    }

    /// Grouping type shorthand.
    pub fn grouping(key: TypeRef, element: TypeRef) -> Self {
        TypeRef::Grouping {
            key: Box::new(key),
            element: Box::new(element),
        }
    }

    /// Check if this is an entity (object) type.
    pub fn is_entity(&self) -> bool {
        matches!(self, TypeRef::Entity(_))
    }

    /// Check if this type names an object (entity, complex or shape).
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            TypeRef::Entity(_) | TypeRef::Complex(_) | TypeRef::Shape(_)
        )
    }

    /// Entity name if this is an entity type.
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            TypeRef::Entity(name) => Some(name),
            _ => None,
        }
    }

    /// Element type of a sequence.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Sequence(inner) => Some(inner),
            _ => None,
        }
    }

    /// Scalar type if this is a scalar.
    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            TypeRef::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Name of the structural type (entity, complex or shape).
    pub fn structural_name(&self) -> Option<&str> {
        match self {
            TypeRef::Entity(n) | TypeRef::Complex(n) | TypeRef::Shape(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Scalar(s) => write!(f, "{s:?}"),
            TypeRef::Enum(n) => write!(f, "enum {n}"),
            TypeRef::Entity(n) => write!(f, "{n}"),
            TypeRef::Complex(n) => write!(f, "complex {n}"),
            TypeRef::Shape(n) => write!(f, "shape {n}"),
            TypeRef::Sequence(inner) => write!(f, "[{inner}]"),
            TypeRef::Grouping { key, element } => write!(f, "Grouping<{key}, {element}>"),
            TypeRef::Unknown => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widen_numeric() {
        assert_eq!(ScalarType::Int32.widen(ScalarType::Int64), ScalarType::Int64);
        assert_eq!(ScalarType::Int64.widen(ScalarType::Float32), ScalarType::Float32);
        assert_eq!(ScalarType::Float64.widen(ScalarType::Int32), ScalarType::Float64);
        assert_eq!(ScalarType::Int32.widen(ScalarType::Int32), ScalarType::Int32);
    }

    #[test]
    fn test_type_helpers() {
        let seq = TypeRef::sequence(TypeRef::entity("Order"));
        assert_eq!(seq.element(), Some(&TypeRef::entity("Order")));
        assert!(TypeRef::entity("Order").is_entity());
        assert!(TypeRef::Shape("Summary".into()).is_object());
        assert!(!TypeRef::Scalar(ScalarType::Int32).is_object());
        assert_eq!(seq.to_string(), "[Order]");
    }

    #[test]
    fn test_scalar_of_value() {
        assert_eq!(ScalarType::of_value(&Value::Int32(1)), Some(ScalarType::Int32));
        assert_eq!(ScalarType::of_value(&Value::Null), None);
    }
}
