//! Type Views: synthesized structural shapes of projection results.
//!
//! # Modules
//!
//! - [`shape`] - Shape descriptors, view elements and instantiation
//! - [`conversion`] - Value conversions for constructor parameters
//! - [`builder`] - View construction from member bindings
//! - [`parsers`] - Per-kind view-shape parsers
//! - [`fingerprint`] - Structural identity of projection sources
//! - [`registry`] - Shared view cache

pub mod builder;
pub mod conversion;
pub mod fingerprint;
pub mod parsers;
pub mod registry;
pub mod shape;

pub use builder::{bound_members, build, ViewRequest};
pub use conversion::{value_type, Conversion};
pub use fingerprint::source_fingerprint;
pub use parsers::{parse_view, ViewShapeParser, ITEMS_MEMBER, VALUE_SHAPE};
pub use registry::{RegistryStats, ViewRegistry};
pub use shape::{
    ConstructorParam, ElementKind, Flattening, ParserKind, ShapeDescriptor, ShapeField,
    ShapeOrigin, TypeView, ViewConstructor, ViewElement, ViewKey,
};
