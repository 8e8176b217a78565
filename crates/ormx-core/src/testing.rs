//! Shared fixtures for unit tests.

use ormx_proto::{Record, ScalarType, TypeRef, Value};

use crate::catalog::{
    ComplexTypeDef, EntityDef, EnumDef, FieldDef, FieldType, ObjectModel, RelationDef,
    SchemaBundle, ShapeDef,
};
use crate::memory::MemoryStore;

/// Customer / Order / Line plus the flat `Item` entity.
pub(crate) fn test_schema() -> SchemaBundle {
    let customer = EntityDef::new("Customer", "id")
        .with_field(FieldDef::scalar("id", ScalarType::Int64))
        .with_field(FieldDef::scalar("name", ScalarType::String))
        .with_field(FieldDef::new("tier", FieldType::enum_type("Tier")))
        .with_field(FieldDef::new("address", FieldType::embedded("Address")));
    let order = EntityDef::new("Order", "id")
        .with_field(FieldDef::scalar("id", ScalarType::Int64))
        .with_field(FieldDef::scalar("customer_id", ScalarType::Int64))
        .with_field(FieldDef::scalar("total", ScalarType::Float64))
        .with_field(FieldDef::scalar("qty", ScalarType::Int32))
        .with_field(FieldDef::new("status", FieldType::enum_type("Status")))
        .with_field(FieldDef::optional_scalar("note", ScalarType::String));
    let line = EntityDef::new("Line", "id")
        .with_field(FieldDef::scalar("id", ScalarType::Int64))
        .with_field(FieldDef::scalar("order_id", ScalarType::Int64))
        .with_field(FieldDef::scalar("product", ScalarType::String))
        .with_field(FieldDef::scalar("qty", ScalarType::Int32));
    let item = EntityDef::new("Item", "key")
        .with_field(FieldDef::scalar("key", ScalarType::Int64))
        .with_field(FieldDef::scalar("flag", ScalarType::Bool))
        .with_field(FieldDef::scalar("tag", ScalarType::String));

    let order_customer =
        RelationDef::many_to_one("customer", "Order", "customer_id", "Customer", "id");
    let order_lines = RelationDef::one_to_many("lines", "Order", "id", "Line", "order_id");

    SchemaBundle::new(1)
        .with_entity(customer)
        .with_entity(order)
        .with_entity(line)
        .with_entity(item)
        .with_relation(order_customer.clone())
        .with_relation(order_customer.inverse("orders"))
        .with_relation(order_lines.clone())
        .with_relation(order_lines.inverse("order"))
        .with_complex(
            ComplexTypeDef::new("Address")
                .with_field(FieldDef::scalar("city", ScalarType::String))
                .with_field(FieldDef::scalar("zip", ScalarType::String)),
        )
        .with_enum(EnumDef::new("Status", ["Open", "Shipped", "Closed"]))
        .with_enum(EnumDef::new("Tier", ["Basic", "Gold"]))
        .with_shape(
            ShapeDef::new("OrderLine")
                .with_member("Id", TypeRef::scalar(ScalarType::Int64))
                .with_member("Total", TypeRef::scalar(ScalarType::Float64))
                .with_constructor(["Id", "Total"]),
        )
}

pub(crate) fn create_test_model() -> ObjectModel {
    ObjectModel::new(test_schema()).expect("fixture schema is valid")
}

fn status(variant: &str) -> Value {
    Value::Enum {
        ty: "Status".into(),
        variant: variant.into(),
    }
}

fn tier(variant: &str) -> Value {
    Value::Enum {
        ty: "Tier".into(),
        variant: variant.into(),
    }
}

fn address(city: &str, zip: &str) -> Value {
    Record::new("Address")
        .with_field("city", city)
        .with_field("zip", zip)
        .into_value()
}

/// Three customers, five orders, six lines and twenty items.
pub(crate) fn sample_store() -> MemoryStore {
    let store = MemoryStore::new();
    let customers = [
        (1i64, "Ada", "Gold", "Paris"),
        (2, "Bob", "Basic", "Oslo"),
        (3, "Cy", "Basic", "Paris"),
    ];
    for (id, name, t, city) in customers {
        store.insert(
            Record::new("Customer")
                .with_field("id", id)
                .with_field("name", name)
                .with_field("tier", tier(t))
                .with_field("address", address(city, "000")),
        );
    }
    let orders = [
        (10i64, 1i64, 25.0, 2i32, "Open", Some("gift")),
        (11, 1, 140.0, 5, "Shipped", None),
        (12, 2, 60.0, 1, "Closed", None),
        (13, 2, 15.5, 3, "Open", Some("rush")),
        (14, 3, 99.0, 4, "Shipped", None),
    ];
    for (id, customer, total, qty, s, note) in orders {
        store.insert(
            Record::new("Order")
                .with_field("id", id)
                .with_field("customer_id", customer)
                .with_field("total", total)
                .with_field("qty", qty)
                .with_field("status", status(s))
                .with_field("note", note),
        );
    }
    let lines = [
        (100i64, 10i64, "pen", 1i32),
        (101, 10, "ink", 2),
        (102, 11, "desk", 1),
        (103, 12, "lamp", 3),
        (104, 14, "pen", 5),
        (105, 14, "pad", 2),
    ];
    for (id, order, product, qty) in lines {
        store.insert(
            Record::new("Line")
                .with_field("id", id)
                .with_field("order_id", order)
                .with_field("product", product)
                .with_field("qty", qty),
        );
    }
    for key in 1..=20i64 {
        store.insert(
            Record::new("Item")
                .with_field("key", key)
                .with_field("flag", key % 2 == 0)
                .with_field("tag", format!("t{key}")),
        );
    }
    store
}
