//! Mandatory includes.
//!
//! Some references must always be loaded with their owner: references the
//! entity's constructor consumes, and eager references whose key the owner
//! row does not carry itself (nothing on the row could load them later).

use ormx_proto::{MemberPath, TypeRef};

use super::IncludingTree;
use crate::catalog::{ObjectModel, GROUP_ELEMENTS, GROUP_KEY};
use crate::error::Error;

/// Depth limit when looking for entities inside groupings and shapes.
const MAX_SHAPE_NESTING: usize = 4;

/// Reference members of `entity` that must be included.
pub fn mandatory_members(model: &ObjectModel, entity: &str) -> Result<Vec<String>, Error> {
    let def = model
        .schema()
        .get_entity(entity)
        .ok_or_else(|| Error::UnknownEntity(entity.to_string()))?;
    let mut members: Vec<String> = model
        .schema()
        .relations_from(entity)
        .into_iter()
        .filter(|r| !r.lazy && !r.has_redundant_attribute(&def.identity_field))
        .map(|r| r.name.clone())
        .collect();
    if let Some(params) = &def.constructor {
        for param in params {
            if model.relation(entity, param).is_some() && !members.contains(param) {
                members.push(param.clone());
            }
        }
    }
    members.sort();
    Ok(members)
}

/// Grow `tree` with the mandatory references of every entity position in
/// its root type and of every entity node already in it. Returns the paths
/// that were added.
///
/// Entity positions of a grouping root are its `Key` and `Elements`; those
/// of a shape root are its entity-typed fields. Forced references are added
/// one level deep; references forced on the newly added nodes are not
/// followed further.
pub fn force_includes(model: &ObjectModel, tree: &mut IncludingTree) -> Result<Vec<MemberPath>, Error> {
    let mut owners: Vec<(MemberPath, String)> = Vec::new();
    entity_positions(model, tree.root_type(), MemberPath::root(), 0, &mut owners);
    for path in tree.paths() {
        if owners.iter().any(|(owner, _)| owner == &path) {
            continue;
        }
        if let Some(sub) = tree.search(&path) {
            if let TypeRef::Entity(entity) = sub.root_type() {
                owners.push((path, entity.clone()));
            }
        }
    }

    let mut added = Vec::new();
    for (owner, entity) in owners {
        for member in mandatory_members(model, &entity)? {
            let path = owner.child(member);
            if !tree.contains(&path) {
                tree.grow(model, &path)?;
                added.push(path);
            }
        }
    }
    Ok(added)
}

/// Collect the paths at which `ty` holds entity values.
fn entity_positions(
    model: &ObjectModel,
    ty: &TypeRef,
    prefix: MemberPath,
    depth: usize,
    out: &mut Vec<(MemberPath, String)>,
) {
    match ty {
        TypeRef::Entity(entity) => out.push((prefix, entity.clone())),
        TypeRef::Sequence(element) => entity_positions(model, element, prefix, depth, out),
        TypeRef::Grouping { key, element } if depth < MAX_SHAPE_NESTING => {
            entity_positions(model, key, prefix.child(GROUP_KEY), depth + 1, out);
            entity_positions(model, element, prefix.child(GROUP_ELEMENTS), depth + 1, out);
        }
        TypeRef::Shape(name) if depth < MAX_SHAPE_NESTING => {
            if let Some(shape) = model.shape(name) {
                for field in &shape.fields {
                    let path = prefix.child(field.name.clone());
                    entity_positions(model, &field.ty, path, depth + 1, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, RelationDef, SchemaBundle};
    use crate::view::{ShapeDescriptor, ShapeField};
    use ormx_proto::ScalarType;

    fn model_with_eager_lines() -> ObjectModel {
        let order = EntityDef::new("Order", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("customer_id", ScalarType::Int64))
            .with_constructor(["id", "customer"]);
        let line = EntityDef::new("Line", "id")
            .with_field(FieldDef::scalar("id", ScalarType::Int64))
            .with_field(FieldDef::scalar("order_id", ScalarType::Int64));
        let customer =
            EntityDef::new("Customer", "id").with_field(FieldDef::scalar("id", ScalarType::Int64));
        let schema = SchemaBundle::new(1)
            .with_entity(order)
            .with_entity(line)
            .with_entity(customer)
            .with_relation(
                RelationDef::one_to_many("lines", "Order", "id", "Line", "order_id").eager(),
            )
            .with_relation(
                RelationDef::many_to_one("order", "Line", "order_id", "Order", "id").eager(),
            )
            .with_relation(RelationDef::many_to_one(
                "customer",
                "Order",
                "customer_id",
                "Customer",
                "id",
            ));
        ObjectModel::new(schema).unwrap()
    }

    #[test]
    fn test_mandatory_members() {
        let model = model_with_eager_lines();
        // Eager collection without a key on the row, plus the constructor reference.
        assert_eq!(
            mandatory_members(&model, "Order").unwrap(),
            vec!["customer".to_string(), "lines".to_string()]
        );
        // Eager but the row carries the key.
        assert!(mandatory_members(&model, "Line").unwrap().is_empty());
    }

    #[test]
    fn test_force_includes_is_one_level() {
        let model = model_with_eager_lines();
        let mut tree = IncludingTree::new(TypeRef::entity("Order"));
        let added = force_includes(&model, &mut tree).unwrap();
        assert_eq!(added.len(), 2);
        assert!(tree.contains(&"lines".into()));
        assert!(!tree.contains(&"lines.order".into()));

        let again = force_includes(&model, &mut tree).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_lazy_fixture_forces_nothing() {
        let model = crate::testing::create_test_model();
        let mut tree = IncludingTree::new(TypeRef::entity("Order"));
        assert!(force_includes(&model, &mut tree).unwrap().is_empty());
    }

    #[test]
    fn test_grouping_root_forces_element_members() {
        let model = model_with_eager_lines();
        let mut tree = IncludingTree::new(TypeRef::grouping(
            TypeRef::scalar(ScalarType::Int64),
            TypeRef::entity("Order"),
        ));
        let added = force_includes(&model, &mut tree).unwrap();
        assert_eq!(added.len(), 2);
        assert!(tree.contains(&"Elements.lines".into()));
        assert!(tree.contains(&"Elements.customer".into()));
        assert!(!tree.contains(&"Elements.lines.order".into()));
    }

    #[test]
    fn test_grouping_by_entity_forces_key_members() {
        let model = model_with_eager_lines();
        let mut tree = IncludingTree::new(TypeRef::grouping(
            TypeRef::entity("Order"),
            TypeRef::entity("Line"),
        ));
        force_includes(&model, &mut tree).unwrap();
        assert!(tree.contains(&"Key.lines".into()));
        assert!(!tree.contains(&"Elements.order".into()));
    }

    #[test]
    fn test_shape_root_forces_entity_fields() {
        let model = model_with_eager_lines();
        model.register_shape(ShapeDescriptor::synthesized(
            "OrderWithCount",
            vec![
                ShapeField::new("O", TypeRef::entity("Order")),
                ShapeField::new("N", TypeRef::scalar(ScalarType::Int64)),
            ],
        ));
        let mut tree = IncludingTree::new(TypeRef::Shape("OrderWithCount".to_string()));
        let added = force_includes(&model, &mut tree).unwrap();
        assert_eq!(added.len(), 2);
        assert!(tree.contains(&"O.lines".into()));
        assert!(tree.contains(&"O.customer".into()));
    }
}
