//! Schema bundle - versioned snapshot of the object model's metadata.

use super::{ComplexTypeDef, EntityDef, EnumDef, FieldType, RelationDef, ShapeDef};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A versioned snapshot of the entire schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaBundle {
    /// Schema version.
    pub version: u64,
    /// Entity definitions keyed by name.
    pub entities: HashMap<String, EntityDef>,
    /// Reference definitions.
    pub relations: Vec<RelationDef>,
    /// Complex type definitions keyed by name.
    #[serde(default)]
    pub complex_types: HashMap<String, ComplexTypeDef>,
    /// Enum definitions keyed by name.
    #[serde(default)]
    pub enums: HashMap<String, EnumDef>,
    /// Declared projection shapes keyed by name.
    #[serde(default)]
    pub shapes: HashMap<String, ShapeDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a reference to the schema.
    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    /// Add a complex type.
    pub fn with_complex(mut self, complex: ComplexTypeDef) -> Self {
        self.complex_types.insert(complex.name.clone(), complex);
        self
    }

    /// Add an enum.
    pub fn with_enum(mut self, def: EnumDef) -> Self {
        self.enums.insert(def.name.clone(), def);
        self
    }

    /// Add a declared projection shape.
    pub fn with_shape(mut self, shape: ShapeDef) -> Self {
        self.shapes.insert(shape.name.clone(), shape);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get a reference by owning entity and member name.
    pub fn get_relation(&self, entity: &str, member: &str) -> Option<&RelationDef> {
        self.relations
            .iter()
            .find(|r| r.from_entity == entity && r.name == member)
    }

    /// Get all references owned by an entity.
    pub fn relations_from(&self, entity: &str) -> Vec<&RelationDef> {
        self.relations
            .iter()
            .filter(|r| r.from_entity == entity)
            .collect()
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Check internal consistency: identity fields exist, references point
    /// at known entities and fields, embedded and enum types are declared.
    pub fn validate(&self) -> Result<(), Error> {
        for entity in self.entities.values() {
            if entity.get_identity_field().is_none() {
                return Err(Error::Schema(format!(
                    "entity {} has no identity field {}",
                    entity.name, entity.identity_field
                )));
            }
            for field in &entity.fields {
                self.validate_field_type(&entity.name, &field.field_type)?;
                if self.get_relation(&entity.name, &field.name).is_some() {
                    return Err(Error::Schema(format!(
                        "member {}.{} is both a field and a reference",
                        entity.name, field.name
                    )));
                }
            }
        }
        for complex in self.complex_types.values() {
            for field in &complex.fields {
                self.validate_field_type(&complex.name, &field.field_type)?;
            }
        }
        for relation in &self.relations {
            let from = self
                .get_entity(&relation.from_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.from_entity.clone()))?;
            let to = self
                .get_entity(&relation.to_entity)
                .ok_or_else(|| Error::UnknownEntity(relation.to_entity.clone()))?;
            if from.get_field(&relation.from_field).is_none() {
                return Err(Error::unknown_member(&from.name, relation.from_field.clone()));
            }
            if to.get_field(&relation.to_field).is_none() {
                return Err(Error::unknown_member(&to.name, relation.to_field.clone()));
            }
        }
        Ok(())
    }

    fn validate_field_type(&self, owner: &str, field_type: &FieldType) -> Result<(), Error> {
        match field_type {
            FieldType::Enum { name } if !self.enums.contains_key(name) => Err(Error::Schema(
                format!("{owner} references undeclared enum {name}"),
            )),
            FieldType::Embedded { complex } if !self.complex_types.contains_key(complex) => {
                Err(Error::Schema(format!(
                    "{owner} embeds undeclared complex type {complex}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Serialize the schema bundle to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize a schema bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;
    use ormx_proto::ScalarType;

    fn sample_schema() -> SchemaBundle {
        let customer = EntityDef::new("Customer", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("name", ScalarType::String));

        let order = EntityDef::new("Order", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("customer_id", ScalarType::Int64))
            .with_field(FieldDef::new("status", FieldType::enum_type("Status")));

        let relation =
            RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");

        SchemaBundle::new(1)
            .with_entity(customer)
            .with_entity(order)
            .with_relation(relation.clone())
            .with_relation(relation.inverse("orders"))
            .with_enum(EnumDef::new("Status", ["Open", "Closed"]))
    }

    #[test]
    fn test_schema_bundle_builder() {
        let schema = sample_schema();

        assert_eq!(schema.version, 1);
        assert_eq!(schema.entities.len(), 2);
        assert_eq!(schema.relations.len(), 2);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_relations_for_entity() {
        let schema = sample_schema();

        assert_eq!(schema.relations_from("Order").len(), 1);
        assert!(schema.get_relation("Customer", "orders").is_some());
        assert!(schema.get_relation("Customer", "customer").is_none());
    }

    #[test]
    fn test_validate_rejects_dangling_reference() {
        let schema = sample_schema().with_relation(RelationDef::many_to_one(
            "supplier", "Order", "customer_id", "Supplier", "id",
        ));
        assert!(matches!(schema.validate(), Err(Error::UnknownEntity(_))));
    }

    #[test]
    fn test_validate_rejects_undeclared_enum() {
        let mut schema = sample_schema();
        schema.enums.clear();
        assert!(matches!(schema.validate(), Err(Error::Schema(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let schema = sample_schema();
        let json = schema.to_json().unwrap();
        let decoded = SchemaBundle::from_json(&json).unwrap();

        assert_eq!(schema, decoded);
    }
}
