//! Object data model for ORMX.
//!
//! The catalog stores metadata about entities, complex types, references,
//! enums and declared projection shapes, and exposes it through
//! [`ObjectModel`].

mod entity;
mod field;
mod model;
mod relation;
mod schema;
mod types;

pub use entity::{ComplexTypeDef, EntityDef, ShapeDef};
pub use field::FieldDef;
pub use model::{Member, MemberKind, ObjectModel, GROUPING_SHAPE, GROUP_ELEMENTS, GROUP_KEY};
pub use relation::{Cardinality, RelationDef};
pub use schema::SchemaBundle;
pub use types::{EnumDef, FieldType};
