//! Shape descriptors and synthesized Type Views.
//!
//! A [`ShapeDescriptor`] names the ordered fields of a projection result; a
//! [`TypeView`] describes how such a result is computed from a source row:
//! which element comes from which source path, which elements are related
//! objects, and how a synthesized constructor converts values.

use std::sync::Arc;

use ormx_proto::{Expr, Lambda, MemberPath, Record, TypeRef, Value};
use serde::{Deserialize, Serialize};

use super::Conversion;
use crate::catalog::{ObjectModel, ShapeDef};
use crate::error::Error;
use crate::expr::Evaluator;
use crate::including::IncludingTree;

/// A named, typed field of a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeField {
    /// Field name.
    pub name: String,
    /// Static type.
    pub ty: TypeRef,
}

impl ShapeField {
    /// Create a field.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Where a shape came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeOrigin {
    /// Declared in the schema; values are converted to the declared types.
    Declared,
    /// Synthesized from a projection expression.
    Synthesized,
}

/// Ordered field list of a projection shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDescriptor {
    /// Shape name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<ShapeField>,
    /// Constructor parameter names, in order.
    pub constructor: Vec<String>,
    /// Origin of the shape.
    pub origin: ShapeOrigin,
}

impl ShapeDescriptor {
    /// Descriptor of a schema-declared shape.
    pub fn from_declared(def: &ShapeDef) -> Self {
        Self {
            name: def.name.clone(),
            fields: def
                .members
                .iter()
                .map(|(name, ty)| ShapeField::new(name.clone(), ty.clone()))
                .collect(),
            constructor: def.constructor.clone(),
            origin: ShapeOrigin::Declared,
        }
    }

    /// Descriptor synthesized from a projection.
    pub fn synthesized(name: impl Into<String>, fields: Vec<ShapeField>) -> Self {
        Self {
            name: name.into(),
            fields,
            constructor: Vec::new(),
            origin: ShapeOrigin::Synthesized,
        }
    }

    /// Set the constructor parameters.
    pub fn with_constructor(mut self, constructor: Vec<String>) -> Self {
        self.constructor = constructor;
        self
    }

    /// Check if the shape is schema-declared.
    pub fn is_declared(&self) -> bool {
        self.origin == ShapeOrigin::Declared
    }

    /// Type of a field.
    pub fn field_type(&self, name: &str) -> Option<&TypeRef> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    /// Position of a field.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Parser that produced a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParserKind {
    /// New-instance or computed projection.
    General,
    /// Projection narrowing to an existing member path.
    Degenerate,
    /// Projection producing a sequence.
    MultiValued,
    /// Plain grouping.
    Grouping,
    /// Grouping with a result selector.
    GroupAggregate,
}

/// Cache key of a Type View: the base shape plus the structural identity of
/// the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewKey {
    /// Base shape name.
    pub base: String,
    /// Fingerprint of the source type and projection structure.
    pub source: String,
}

/// Kind of a view element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    /// Plain attribute computed from one or more source attributes.
    Attribute {
        /// Leaf attribute paths the value is computed from.
        sources: Vec<MemberPath>,
    },
    /// Embedded complex attribute taken from a nested path.
    Complex {
        /// Full path of the complex attribute.
        path: MemberPath,
    },
    /// Related object (or collection of objects).
    Reference {
        /// Source path of the reference, when it is a plain member path.
        anchor: Option<MemberPath>,
        /// Referenced element type.
        target: TypeRef,
        /// Whether the element holds a collection.
        collection: bool,
    },
}

/// One element of a Type View.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewElement {
    /// Target field name.
    pub name: String,
    /// Static type of the computed value.
    pub ty: TypeRef,
    /// Element kind.
    pub kind: ElementKind,
    /// Field position inside instantiated records.
    pub slot: usize,
    /// Expression computing the value from the view's parameters.
    pub expr: Expr,
    /// Conversion applied when the element is assigned.
    pub conversion: Conversion,
}

impl ViewElement {
    /// Source paths this element is computed from.
    pub fn provenance(&self) -> Vec<MemberPath> {
        match &self.kind {
            ElementKind::Attribute { sources } => sources.clone(),
            ElementKind::Complex { path } => vec![path.clone()],
            ElementKind::Reference { anchor, .. } => anchor.iter().cloned().collect(),
        }
    }

    /// Read the element from an instantiated record.
    pub fn get<'r>(&self, record: &'r Record) -> Option<&'r Value> {
        match record.fields.get(self.slot) {
            Some((name, value)) if *name == self.name => Some(value),
            _ => record.get(&self.name),
        }
    }

    /// Assign the element on a record, converting the value.
    pub fn set(&self, model: &ObjectModel, record: &mut Record, value: Value) -> Result<(), Error> {
        let value = self.conversion.apply(model, value)?;
        match record.fields.get_mut(self.slot) {
            Some((name, slot)) if *name == self.name => *slot = value,
            _ => record.set(self.name.clone(), value),
        }
        Ok(())
    }
}

/// A parameter of a synthesized constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorParam {
    /// Element bound to the parameter.
    pub member: String,
    /// Slot of that element.
    pub slot: usize,
    /// Conversion from the stored value to the parameter type.
    pub conversion: Conversion,
}

/// Synthesized constructor of a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConstructor {
    /// Parameters in call order.
    pub params: Vec<ConstructorParam>,
}

/// How one source row expands into several output rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattening {
    /// Collection selector over the source row.
    pub collection: Lambda,
    /// Path of the collection when the selector is a plain member path.
    pub path: Option<MemberPath>,
}

/// A synthesized structural view of a projection result.
#[derive(Debug, Clone)]
pub struct TypeView {
    /// Cache key.
    pub key: ViewKey,
    /// Parser that produced the view.
    pub parser: ParserKind,
    /// Result shape.
    pub descriptor: Arc<ShapeDescriptor>,
    /// Element type of the projection source.
    pub source_type: TypeRef,
    /// Static types of the view's parameters.
    pub params: Vec<TypeRef>,
    /// Elements in field order.
    pub elements: Vec<ViewElement>,
    /// Synthesized constructor, when the shape has one.
    pub constructor: Option<ViewConstructor>,
    /// Portion of the source's association graph the projection touches.
    pub source_extension: IncludingTree,
    /// Flattening point, for projections over a collection selector.
    pub flattening: Option<Flattening>,
    /// Elements that identify an instance.
    pub key_attributes: Vec<String>,
    /// The result is the single element's value rather than a record.
    pub unwrap: bool,
}

impl TypeView {
    /// Element by name.
    pub fn element(&self, name: &str) -> Option<&ViewElement> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Reference elements.
    pub fn references(&self) -> impl Iterator<Item = &ViewElement> {
        self.elements
            .iter()
            .filter(|e| matches!(e.kind, ElementKind::Reference { .. }))
    }

    /// `(element name, source path)` pairs of elements that carry related
    /// or nested objects, used to remap including trees.
    pub fn object_mapping(&self) -> Vec<(String, MemberPath)> {
        self.elements
            .iter()
            .filter_map(|e| match &e.kind {
                ElementKind::Reference {
                    anchor: Some(anchor),
                    ..
                } => Some((e.name.clone(), anchor.clone())),
                ElementKind::Complex { path } => Some((e.name.clone(), path.clone())),
                _ => None,
            })
            .collect()
    }

    /// Static type of a view result.
    pub fn result_type(&self) -> TypeRef {
        if self.unwrap {
            self.elements
                .first()
                .map(|e| e.ty.clone())
                .unwrap_or(TypeRef::Unknown)
        } else {
            TypeRef::Shape(self.descriptor.name.clone())
        }
    }

    /// Compute one result from the view's parameter values.
    pub fn instantiate(&self, evaluator: &Evaluator<'_>, env: &[Value]) -> Result<Value, Error> {
        let mut values = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            values.push(evaluator.eval(&element.expr, env)?);
        }
        if self.unwrap {
            return Ok(values.into_iter().next().unwrap_or(Value::Null));
        }

        let model = evaluator.model();
        let mut record = Record::new(self.descriptor.name.clone());
        record.fields = self
            .elements
            .iter()
            .map(|e| (e.name.clone(), Value::Null))
            .collect();
        let mut assigned = vec![false; self.elements.len()];
        if let Some(constructor) = &self.constructor {
            for param in &constructor.params {
                let value = std::mem::replace(&mut values[param.slot], Value::Null);
                record.fields[param.slot].1 = param.conversion.apply(model, value)?;
                assigned[param.slot] = true;
            }
        }
        for (element, value) in self.elements.iter().zip(values) {
            if !assigned[element.slot] {
                element.set(model, &mut record, value)?;
            }
        }
        Ok(record.into_value())
    }
}
