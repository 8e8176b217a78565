//! Entity, complex type and declared shape definitions.

use super::field::FieldDef;
use ormx_proto::TypeRef;
use serde::{Deserialize, Serialize};

/// An entity definition (identifiable structural type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within schema).
    pub name: String,
    /// Name of the primary identity field.
    pub identity_field: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
    /// Constructor parameters, by member name, when objects are built
    /// through a constructor rather than by field assignment.
    pub constructor: Option<Vec<String>>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>, identity_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_field: identity_field.into(),
            fields: Vec::new(),
            constructor: None,
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Declare constructor parameters.
    pub fn with_constructor<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constructor = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get the identity field definition.
    pub fn get_identity_field(&self) -> Option<&FieldDef> {
        self.get_field(&self.identity_field)
    }
}

/// A complex (struct-like, non-identifiable) type embedded in entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexTypeDef {
    /// Type name.
    pub name: String,
    /// Field definitions.
    pub fields: Vec<FieldDef>,
}

impl ComplexTypeDef {
    /// Create a complex type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A declared projection class (a result shape known ahead of time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    /// Shape name.
    pub name: String,
    /// Members and their static types.
    pub members: Vec<(String, TypeRef)>,
    /// Constructor parameters by member name, in positional order.
    pub constructor: Vec<String>,
}

impl ShapeDef {
    /// Create a declared shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            constructor: Vec::new(),
        }
    }

    /// Add a member.
    pub fn with_member(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.members.push((name.into(), ty));
        self
    }

    /// Declare constructor parameters.
    pub fn with_constructor<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constructor = params.into_iter().map(Into::into).collect();
        self
    }

    /// Static type of a member.
    pub fn member_type(&self, name: &str) -> Option<&TypeRef> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormx_proto::ScalarType;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Customer", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("name", ScalarType::String))
            .with_constructor(["id", "name"]);

        assert_eq!(entity.name, "Customer");
        assert_eq!(entity.fields.len(), 2);
        assert!(entity.get_identity_field().is_some());
        assert!(entity.get_field("nonexistent").is_none());
        assert_eq!(entity.constructor.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_shape_def() {
        let shape = ShapeDef::new("OrderLine")
            .with_member("Id", TypeRef::scalar(ScalarType::Int64))
            .with_member("Total", TypeRef::scalar(ScalarType::Float64))
            .with_constructor(["Id", "Total"]);
        assert_eq!(
            shape.member_type("Total"),
            Some(&TypeRef::scalar(ScalarType::Float64))
        );
        assert_eq!(shape.constructor, vec!["Id", "Total"]);
    }
}
