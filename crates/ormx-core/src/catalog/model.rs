//! Object model: read-only schema metadata plus the shape and view registries.

use std::collections::HashMap;
use std::sync::Arc;

use ormx_proto::{MemberPath, ObjectKey, Record, TypeRef, Value};
use parking_lot::RwLock;
use tracing::debug;

use super::{RelationDef, SchemaBundle};
use crate::error::Error;
use crate::view::{ShapeDescriptor, ViewRegistry};

/// Member name of a grouping's key.
pub const GROUP_KEY: &str = "Key";
/// Member name of a grouping's elements.
pub const GROUP_ELEMENTS: &str = "Elements";
/// Shape name of grouping records.
pub const GROUPING_SHAPE: &str = "Grouping";

/// How a member relates to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    /// Plain attribute (scalar or enum).
    Attribute,
    /// Embedded complex attribute.
    Complex,
    /// Reference element backed by a relation.
    Reference(RelationDef),
    /// Member of a projection shape or grouping.
    ShapeField,
}

/// A resolved member.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Member name.
    pub name: String,
    /// Static type of the member's value.
    pub ty: TypeRef,
    /// Member kind.
    pub kind: MemberKind,
}

impl Member {
    /// Check if the member navigates to related or nested objects.
    pub fn is_navigable(&self) -> bool {
        match &self.kind {
            MemberKind::Reference(_) | MemberKind::Complex => true,
            MemberKind::Attribute => false,
            MemberKind::ShapeField => is_object_like(&self.ty),
        }
    }

    /// Check if the member yields a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self.ty, TypeRef::Sequence(_))
    }

    /// Element type (the item type for collections).
    pub fn element_type(&self) -> &TypeRef {
        match &self.ty {
            TypeRef::Sequence(inner) => inner,
            other => other,
        }
    }
}

fn is_object_like(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Sequence(inner) => is_object_like(inner),
        TypeRef::Grouping { .. } => true,
        other => other.is_object(),
    }
}

/// The object data model consulted by classification, view building and
/// execution.
///
/// Schema metadata is immutable. The shape registry and the Type View
/// registry are the only mutable state; both only ever grow and hand out
/// shared immutable entries.
pub struct ObjectModel {
    schema: SchemaBundle,
    shapes: RwLock<HashMap<String, Arc<ShapeDescriptor>>>,
    views: ViewRegistry,
}

impl ObjectModel {
    /// Build a model from a validated schema.
    pub fn new(schema: SchemaBundle) -> Result<Self, Error> {
        schema.validate()?;
        let shapes = schema
            .shapes
            .values()
            .map(|def| {
                (
                    def.name.clone(),
                    Arc::new(ShapeDescriptor::from_declared(def)),
                )
            })
            .collect();
        debug!(
            entities = schema.entities.len(),
            relations = schema.relations.len(),
            "object model loaded"
        );
        Ok(Self {
            schema,
            shapes: RwLock::new(shapes),
            views: ViewRegistry::new(),
        })
    }

    /// Underlying schema.
    pub fn schema(&self) -> &SchemaBundle {
        &self.schema
    }

    /// Type View registry.
    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    /// Identity field of an entity.
    pub fn identity_field(&self, entity: &str) -> Result<&str, Error> {
        self.schema
            .get_entity(entity)
            .map(|e| e.identity_field.as_str())
            .ok_or_else(|| Error::UnknownEntity(entity.to_string()))
    }

    /// Check whether a name is an entity.
    pub fn is_entity(&self, name: &str) -> bool {
        self.schema.entities.contains_key(name)
    }

    /// Reference of an entity by member name.
    pub fn relation(&self, entity: &str, member: &str) -> Option<&RelationDef> {
        self.schema.get_relation(entity, member)
    }

    /// Identity of an entity record, if the record is an entity object.
    pub fn identity_of(&self, record: &Record) -> Option<ObjectKey> {
        let entity = self.schema.get_entity(&record.shape)?;
        let id = record.get(&entity.identity_field)?;
        Some(ObjectKey::new(entity.name.clone(), id))
    }

    /// Identity of a value, if it is an entity record.
    pub fn identity_of_value(&self, value: &Value) -> Option<ObjectKey> {
        value.as_record().and_then(|r| self.identity_of(r))
    }

    /// Register a projection shape. The first registration of a name wins;
    /// later registrations return the existing descriptor.
    pub fn register_shape(&self, shape: ShapeDescriptor) -> Arc<ShapeDescriptor> {
        if let Some(existing) = self.shapes.read().get(&shape.name) {
            return existing.clone();
        }
        let mut shapes = self.shapes.write();
        shapes
            .entry(shape.name.clone())
            .or_insert_with(|| Arc::new(shape))
            .clone()
    }

    /// Look up a registered shape.
    pub fn shape(&self, name: &str) -> Option<Arc<ShapeDescriptor>> {
        self.shapes.read().get(name).cloned()
    }

    /// Resolve a member on an owner type.
    pub fn member(&self, owner: &TypeRef, name: &str) -> Result<Member, Error> {
        match owner {
            TypeRef::Entity(entity) => {
                let def = self
                    .schema
                    .get_entity(entity)
                    .ok_or_else(|| Error::UnknownEntity(entity.clone()))?;
                if let Some(field) = def.get_field(name) {
                    return Ok(field_member(name, &field.field_type));
                }
                let relation = self
                    .schema
                    .get_relation(entity, name)
                    .ok_or_else(|| Error::unknown_member(entity, name))?;
                let target = TypeRef::Entity(relation.to_entity.clone());
                Ok(Member {
                    name: name.to_string(),
                    ty: if relation.is_collection() {
                        TypeRef::sequence(target)
                    } else {
                        target
                    },
                    kind: MemberKind::Reference(relation.clone()),
                })
            }
            TypeRef::Complex(complex) => {
                let def = self.schema.complex_types.get(complex).ok_or_else(|| {
                    Error::Schema(format!("unknown complex type {complex}"))
                })?;
                let field = def
                    .get_field(name)
                    .ok_or_else(|| Error::unknown_member(complex, name))?;
                Ok(field_member(name, &field.field_type))
            }
            TypeRef::Shape(shape) => {
                let descriptor = self.shape(shape).ok_or_else(|| Error::MissingMember {
                    shape: shape.clone(),
                    member: name.to_string(),
                })?;
                let ty = descriptor
                    .field_type(name)
                    .ok_or_else(|| Error::MissingMember {
                        shape: shape.clone(),
                        member: name.to_string(),
                    })?;
                Ok(Member {
                    name: name.to_string(),
                    ty: ty.clone(),
                    kind: MemberKind::ShapeField,
                })
            }
            TypeRef::Grouping { key, element } => {
                let ty = match name {
                    GROUP_KEY => (**key).clone(),
                    GROUP_ELEMENTS => TypeRef::Sequence(element.clone()),
                    _ => return Err(Error::unknown_member(owner, name)),
                };
                Ok(Member {
                    name: name.to_string(),
                    ty,
                    kind: MemberKind::ShapeField,
                })
            }
            other => Err(Error::unknown_member(other, name)),
        }
    }

    /// Resolve every member along a path, starting at `root`. Collection
    /// members are traversed through their element type.
    pub fn resolve_path(&self, root: &TypeRef, path: &MemberPath) -> Result<Vec<Member>, Error> {
        let mut owner = root.clone();
        let mut members = Vec::with_capacity(path.len());
        for segment in path.segments() {
            let member = self.member(&owner, segment)?;
            owner = member.element_type().clone();
            members.push(member);
        }
        Ok(members)
    }

    /// Static type at the end of a path (the element type for collections).
    pub fn path_type(&self, root: &TypeRef, path: &MemberPath) -> Result<TypeRef, Error> {
        Ok(self
            .resolve_path(root, path)?
            .last()
            .map(|m| m.ty.clone())
            .unwrap_or_else(|| root.clone()))
    }
}

fn field_member(name: &str, field_type: &super::FieldType) -> Member {
    let kind = if matches!(field_type, super::FieldType::Embedded { .. }) {
        MemberKind::Complex
    } else {
        MemberKind::Attribute
    };
    Member {
        name: name.to_string(),
        ty: field_type.type_ref(),
        kind,
    }
}

impl std::fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectModel")
            .field("version", &self.schema.version)
            .field("entities", &self.schema.entities.len())
            .field("shapes", &self.shapes.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ComplexTypeDef, EntityDef, FieldDef, FieldType, ShapeDef};
    use crate::view::ShapeField;
    use ormx_proto::ScalarType;

    fn create_test_model() -> ObjectModel {
        let customer = EntityDef::new("Customer", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("name", ScalarType::String))
            .with_field(FieldDef::new("address", FieldType::embedded("Address")));
        let order = EntityDef::new("Order", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("customer_id", ScalarType::Int64));
        let relation =
            RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");
        let schema = SchemaBundle::new(1)
            .with_entity(customer)
            .with_entity(order)
            .with_relation(relation.clone())
            .with_relation(relation.inverse("orders"))
            .with_complex(
                ComplexTypeDef::new("Address")
                    .with_field(FieldDef::scalar("city", ScalarType::String)),
            )
            .with_shape(
                ShapeDef::new("OrderLine")
                    .with_member("Id", TypeRef::scalar(ScalarType::Int64))
                    .with_constructor(["Id"]),
            );
        ObjectModel::new(schema).unwrap()
    }

    #[test]
    fn test_member_resolution() {
        let model = create_test_model();
        let order = TypeRef::entity("Order");

        let member = model.member(&order, "customer").unwrap();
        assert!(matches!(member.kind, MemberKind::Reference(_)));
        assert_eq!(member.ty, TypeRef::entity("Customer"));

        let orders = model.member(&TypeRef::entity("Customer"), "orders").unwrap();
        assert!(orders.is_collection());
        assert_eq!(orders.element_type(), &TypeRef::entity("Order"));

        let address = model
            .member(&TypeRef::entity("Customer"), "address")
            .unwrap();
        assert_eq!(address.kind, MemberKind::Complex);
        assert!(address.is_navigable());

        assert!(matches!(
            model.member(&order, "missing"),
            Err(Error::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_resolve_path_through_collections() {
        let model = create_test_model();
        let path = MemberPath::parse("orders.customer.address.city");
        let members = model
            .resolve_path(&TypeRef::entity("Customer"), &path)
            .unwrap();
        assert_eq!(members.len(), 4);
        assert_eq!(
            model
                .path_type(&TypeRef::entity("Customer"), &path)
                .unwrap(),
            TypeRef::scalar(ScalarType::String)
        );
    }

    #[test]
    fn test_grouping_members() {
        let model = create_test_model();
        let grouping = TypeRef::grouping(
            TypeRef::scalar(ScalarType::Bool),
            TypeRef::entity("Order"),
        );
        let elements = model.member(&grouping, GROUP_ELEMENTS).unwrap();
        assert_eq!(elements.ty, TypeRef::sequence(TypeRef::entity("Order")));
        assert!(elements.is_navigable());
        let key = model.member(&grouping, GROUP_KEY).unwrap();
        assert!(!key.is_navigable());
    }

    #[test]
    fn test_shape_registry_first_insert_wins() {
        let model = create_test_model();
        assert!(model.shape("OrderLine").is_some());

        let first = model.register_shape(ShapeDescriptor::synthesized(
            "Summary",
            vec![ShapeField::new("Id", TypeRef::scalar(ScalarType::Int64))],
        ));
        let second = model.register_shape(ShapeDescriptor::synthesized(
            "Summary",
            vec![ShapeField::new("Other", TypeRef::scalar(ScalarType::Bool))],
        ));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(model
            .member(&TypeRef::Shape("Summary".into()), "Id")
            .is_ok());
    }

    #[test]
    fn test_identity_of() {
        let model = create_test_model();
        let record = Record::new("Order").with_field("id", 7i64);
        assert_eq!(
            model.identity_of(&record),
            Some(ObjectKey::new("Order", &Value::Int64(7)))
        );
        assert_eq!(model.identity_of(&Record::new("Summary")), None);
    }
}
