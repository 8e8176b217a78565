//! Field definitions for entities and complex types.

use super::types::FieldType;
use ormx_proto::ScalarType;
use serde::{Deserialize, Serialize};

/// A field definition within an entity or complex type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field is required (non-nullable at the application level).
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Create a required scalar field.
    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldType::Scalar(scalar))
    }

    /// Create an optional scalar field.
    pub fn optional_scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::optional(name, FieldType::OptionalScalar(scalar))
    }

    /// Check if this field embeds a complex type.
    pub fn is_embedded(&self) -> bool {
        matches!(self.field_type, FieldType::Embedded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builders() {
        let field = FieldDef::scalar("id", ScalarType::Int64);
        assert!(field.required);
        assert!(!field.is_embedded());

        let field = FieldDef::optional_scalar("note", ScalarType::String);
        assert!(!field.required);
        assert!(field.field_type.is_nullable());

        let field = FieldDef::new("address", FieldType::embedded("Address"));
        assert!(field.is_embedded());
    }
}
