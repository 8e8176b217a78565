//! Value conversions applied when a stored value is handed to a constructor
//! parameter or a declared shape member of a different static type.

use ormx_proto::{ScalarType, TypeRef, Value};
use serde::{Deserialize, Serialize};

use crate::catalog::ObjectModel;
use crate::error::Error;

/// Conversion from a stored value to a parameter's static type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conversion {
    /// Value is passed unchanged.
    Identity,
    /// Integer widening to 64 bits.
    ToInt64,
    /// Numeric conversion to 32-bit float.
    ToFloat32,
    /// Numeric conversion to 64-bit float.
    ToFloat64,
    /// Integer ordinal to enum variant.
    EnumFromOrdinal(String),
    /// Variant name to enum variant.
    EnumFromName(String),
    /// Enum variant to its name.
    EnumToName,
    /// Enum variant to its ordinal.
    EnumToOrdinal(String),
}

/// Static type of a runtime value, as far as conversions care.
pub fn value_type(value: &Value) -> TypeRef {
    match value {
        Value::Enum { ty, .. } => TypeRef::Enum(ty.clone()),
        other => ScalarType::of_value(other)
            .map(TypeRef::Scalar)
            .unwrap_or(TypeRef::Unknown),
    }
}

impl Conversion {
    /// Pick the conversion from `source` to `target`.
    pub fn between(source: &TypeRef, target: &TypeRef) -> Result<Self, Error> {
        use ScalarType::*;

        if source == target || *source == TypeRef::Unknown || *target == TypeRef::Unknown {
            return Ok(Conversion::Identity);
        }
        let conversion = match (source, target) {
            (TypeRef::Scalar(Int32), TypeRef::Scalar(Int64)) => Conversion::ToInt64,
            (TypeRef::Scalar(s), TypeRef::Scalar(Float32)) if s.is_numeric() => {
                Conversion::ToFloat32
            }
            (TypeRef::Scalar(s), TypeRef::Scalar(Float64)) if s.is_numeric() => {
                Conversion::ToFloat64
            }
            (TypeRef::Scalar(s), TypeRef::Enum(e)) if s.is_integer() => {
                Conversion::EnumFromOrdinal(e.clone())
            }
            (TypeRef::Scalar(String), TypeRef::Enum(e)) => Conversion::EnumFromName(e.clone()),
            (TypeRef::Enum(_), TypeRef::Scalar(String)) => Conversion::EnumToName,
            (TypeRef::Enum(e), TypeRef::Scalar(s)) if s.is_integer() => {
                Conversion::EnumToOrdinal(e.clone())
            }
            _ => return Err(Error::type_mismatch(target, source)),
        };
        Ok(conversion)
    }

    /// Conversion for a runtime value into `target`.
    pub fn for_value(value: &Value, target: &TypeRef) -> Result<Self, Error> {
        if value.is_null() {
            return Ok(Conversion::Identity);
        }
        match target {
            TypeRef::Scalar(_) | TypeRef::Enum(_) => Self::between(&value_type(value), target),
            _ => Ok(Conversion::Identity),
        }
    }

    /// Apply the conversion. Null converts to null.
    pub fn apply(&self, model: &ObjectModel, value: Value) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match self {
            Conversion::Identity => value,
            Conversion::ToInt64 => Value::Int64(
                value
                    .as_i64()
                    .ok_or_else(|| Error::type_mismatch("integer", value.type_name()))?,
            ),
            Conversion::ToFloat32 => Value::Float32(
                value
                    .as_f64()
                    .ok_or_else(|| Error::type_mismatch("numeric", value.type_name()))?
                    as f32,
            ),
            Conversion::ToFloat64 => Value::Float64(
                value
                    .as_f64()
                    .ok_or_else(|| Error::type_mismatch("numeric", value.type_name()))?,
            ),
            Conversion::EnumFromOrdinal(ty) => {
                let ordinal = value
                    .as_i64()
                    .ok_or_else(|| Error::type_mismatch("integer", value.type_name()))?;
                let variant = enum_def(model, ty)?
                    .variant_at(ordinal)
                    .ok_or_else(|| {
                        Error::Evaluation(format!("enum {ty} has no ordinal {ordinal}"))
                    })?;
                Value::Enum {
                    ty: ty.clone(),
                    variant: variant.to_string(),
                }
            }
            Conversion::EnumFromName(ty) => {
                let name = value
                    .as_str()
                    .ok_or_else(|| Error::type_mismatch("string", value.type_name()))?;
                if enum_def(model, ty)?.ordinal_of(name).is_none() {
                    return Err(Error::Evaluation(format!("enum {ty} has no variant {name}")));
                }
                Value::Enum {
                    ty: ty.clone(),
                    variant: name.to_string(),
                }
            }
            Conversion::EnumToName => match value {
                Value::Enum { variant, .. } => Value::String(variant),
                other => return Err(Error::type_mismatch("enum", other.type_name())),
            },
            Conversion::EnumToOrdinal(ty) => match &value {
                Value::Enum { variant, .. } => {
                    let ordinal = enum_def(model, ty)?.ordinal_of(variant).ok_or_else(|| {
                        Error::Evaluation(format!("enum {ty} has no variant {variant}"))
                    })?;
                    Value::Int64(ordinal as i64)
                }
                other => return Err(Error::type_mismatch("enum", other.type_name())),
            },
        };
        Ok(converted)
    }
}

fn enum_def<'a>(model: &'a ObjectModel, name: &str) -> Result<&'a crate::catalog::EnumDef, Error> {
    model
        .schema()
        .enums
        .get(name)
        .ok_or_else(|| Error::Schema(format!("unknown enum {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_model;

    #[test]
    fn test_between() {
        let int32 = TypeRef::scalar(ScalarType::Int32);
        let int64 = TypeRef::scalar(ScalarType::Int64);
        let string = TypeRef::scalar(ScalarType::String);
        let status = TypeRef::Enum("Status".into());

        assert_eq!(Conversion::between(&int64, &int64).unwrap(), Conversion::Identity);
        assert_eq!(Conversion::between(&int32, &int64).unwrap(), Conversion::ToInt64);
        assert_eq!(
            Conversion::between(&int32, &status).unwrap(),
            Conversion::EnumFromOrdinal("Status".into())
        );
        assert_eq!(
            Conversion::between(&status, &string).unwrap(),
            Conversion::EnumToName
        );
        assert!(Conversion::between(&string, &int64).is_err());
    }

    #[test]
    fn test_apply() {
        let model = create_test_model();
        assert_eq!(
            Conversion::ToInt64.apply(&model, Value::Int32(4)).unwrap(),
            Value::Int64(4)
        );
        assert_eq!(
            Conversion::EnumFromOrdinal("Status".into())
                .apply(&model, Value::Int32(2))
                .unwrap(),
            Value::Enum {
                ty: "Status".into(),
                variant: "Closed".into()
            }
        );
        assert!(Conversion::EnumFromName("Status".into())
            .apply(&model, Value::String("Lost".into()))
            .is_err());
        assert_eq!(
            Conversion::ToFloat64.apply(&model, Value::Null).unwrap(),
            Value::Null
        );
    }
}
