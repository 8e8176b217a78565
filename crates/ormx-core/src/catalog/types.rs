//! Core type definitions for the catalog.

use ormx_proto::{ScalarType, TypeRef};
use serde::{Deserialize, Serialize};

/// Field types - flat representation without recursion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An optional scalar value (nullable).
    OptionalScalar(ScalarType),
    /// An enumeration type, by name.
    Enum {
        /// Name of the enum type.
        name: String,
    },
    /// An embedded complex type (nested, non-identifiable object).
    Embedded {
        /// Name of the complex type.
        complex: String,
    },
}

/// An enumeration definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    /// Enum type name.
    pub name: String,
    /// Variants in ordinal order.
    pub variants: Vec<String>,
}

impl EnumDef {
    /// Create an enum definition.
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    /// Variant at an ordinal.
    pub fn variant_at(&self, ordinal: i64) -> Option<&str> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| self.variants.get(i))
            .map(String::as_str)
    }

    /// Ordinal of a variant.
    pub fn ordinal_of(&self, variant: &str) -> Option<usize> {
        self.variants.iter().position(|v| v == variant)
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an optional scalar field type.
    pub fn optional_scalar(scalar: ScalarType) -> Self {
        FieldType::OptionalScalar(scalar)
    }

    /// Create an enum field type.
    pub fn enum_type(name: impl Into<String>) -> Self {
        FieldType::Enum { name: name.into() }
    }

    /// Create an embedded complex field type.
    pub fn embedded(complex: impl Into<String>) -> Self {
        FieldType::Embedded {
            complex: complex.into(),
        }
    }

    /// Check if this type is nullable.
    pub fn is_nullable(&self) -> bool {
        matches!(self, FieldType::OptionalScalar(_))
    }

    /// Get the inner scalar type if this is a scalar-based type.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Static type of values of this field.
    pub fn type_ref(&self) -> TypeRef {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => TypeRef::Scalar(*s),
            FieldType::Enum { name } => TypeRef::Enum(name.clone()),
            FieldType::Embedded { complex } => TypeRef::Complex(complex.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_builders() {
        let int_type = FieldType::scalar(ScalarType::Int32);
        assert!(!int_type.is_nullable());
        assert_eq!(int_type.scalar_type(), Some(ScalarType::Int32));

        let optional_int = FieldType::optional_scalar(ScalarType::Int32);
        assert!(optional_int.is_nullable());

        let address = FieldType::embedded("Address");
        assert_eq!(address.type_ref(), TypeRef::Complex("Address".into()));
        assert!(address.scalar_type().is_none());
    }

    #[test]
    fn test_enum_def() {
        let status = EnumDef::new("Status", ["Active", "Inactive"]);
        assert_eq!(status.variant_at(1), Some("Inactive"));
        assert_eq!(status.variant_at(2), None);
        assert_eq!(status.variant_at(-1), None);
        assert_eq!(status.ordinal_of("Active"), Some(0));
        assert_eq!(
            FieldType::enum_type("Status").type_ref(),
            TypeRef::Enum("Status".into())
        );
    }
}
