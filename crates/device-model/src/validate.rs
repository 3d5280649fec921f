use crate::schema::{AttributeDef, Format};
use crate::value::AttrValue;
use crate::{Error, Result};
use core::fmt;
use std::collections::BTreeSet;

/// Semantic value kind an attribute accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedType {
    /// Integer within `[min, max]`; enums carry their declared keys instead.
    Integer {
        min: i128,
        max: i128,
        valid_values: Option<BTreeSet<i64>>,
    },
    /// Finite float with magnitude at most `max`.
    Float { max: f64 },
    Boolean,
    Text,
    /// String-keyed map of one scalar type.
    Map(Box<ExpectedType>),
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedType::Integer { .. } => f.write_str("integer"),
            ExpectedType::Float { .. } => f.write_str("float"),
            ExpectedType::Boolean => f.write_str("bool"),
            ExpectedType::Text => f.write_str("text"),
            ExpectedType::Map(inner) => write!(f, "map[string, {inner}]"),
        }
    }
}

/// Slot and slug of the attribute being validated, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub slot: &'a str,
    pub slug: &'a str,
}

fn integer(min: impl Into<i128>, max: impl Into<i128>) -> ExpectedType {
    ExpectedType::Integer {
        min: min.into(),
        max: max.into(),
        valid_values: None,
    }
}

fn scalar_type(slot: &str, format: &Format) -> Result<ExpectedType> {
    let ty = match format {
        Format::Int8 => integer(i8::MIN, i8::MAX),
        Format::Int16 => integer(i16::MIN, i16::MAX),
        Format::Int32 => integer(i32::MIN, i32::MAX),
        Format::Int64 => integer(i64::MIN, i64::MAX),
        Format::Uint8 => integer(0, u8::MAX),
        Format::Uint16 => integer(0, u16::MAX),
        Format::Uint32 => integer(0, u32::MAX),
        Format::Uint64 => integer(0, u64::MAX),
        Format::Float32 => ExpectedType::Float {
            max: f64::from(f32::MAX),
        },
        Format::Float64 => ExpectedType::Float { max: f64::MAX },
        Format::Bool => ExpectedType::Boolean,
        Format::Data => ExpectedType::Text,
        Format::Enum(labels) => ExpectedType::Integer {
            min: i128::from(i64::MIN),
            max: i128::from(i64::MAX),
            valid_values: Some(labels.values().collect()),
        },
        Format::Keyed(_) | Format::Unsupported(_) => {
            return Err(Error::UnsupportedFormat {
                slot: slot.to_string(),
                kind: format.kind_tag().to_string(),
            })
        }
    };
    Ok(ty)
}

/// Map an attribute's format to the value kind it accepts.
pub fn expected_type(slot: &str, attr: &AttributeDef) -> Result<ExpectedType> {
    match &attr.format {
        Format::Keyed(inner) => {
            let entry = scalar_type(slot, inner).map_err(|_| Error::UnsupportedFormat {
                slot: slot.to_string(),
                kind: format!("Keyed<{}>", inner.kind_tag()),
            })?;
            Ok(ExpectedType::Map(Box::new(entry)))
        }
        other => scalar_type(slot, other),
    }
}

fn check_integer(
    target: Target<'_>,
    (min, max): (i128, i128),
    valid_values: Option<&BTreeSet<i64>>,
    v: i128,
) -> Result<()> {
    if let Some(valid) = valid_values {
        let declared = i64::try_from(v).is_ok_and(|v| valid.contains(&v));
        if !declared {
            return Err(Error::InvalidEnumValue {
                slot: target.slot.to_string(),
                slug: target.slug.to_string(),
                value: v,
                valid: valid.iter().copied().collect(),
            });
        }
    } else if v < min || v > max {
        return Err(Error::ValueOutOfRange {
            slot: target.slot.to_string(),
            slug: target.slug.to_string(),
            value: v,
            min,
            max,
        });
    }
    Ok(())
}

/// Check `value` against `expected`. Never coerces.
pub fn validate(target: Target<'_>, expected: &ExpectedType, value: &AttrValue) -> Result<()> {
    match (expected, value) {
        (
            ExpectedType::Integer {
                min,
                max,
                valid_values,
            },
            AttrValue::Int(v),
        ) => check_integer(target, (*min, *max), valid_values.as_ref(), i128::from(*v)),
        (
            ExpectedType::Integer {
                min,
                max,
                valid_values,
            },
            AttrValue::Uint(v),
        ) => check_integer(target, (*min, *max), valid_values.as_ref(), i128::from(*v)),
        (ExpectedType::Float { max }, AttrValue::Float(v)) => {
            if v.is_finite() && v.abs() <= *max {
                Ok(())
            } else {
                Err(Error::InvalidFloat {
                    slot: target.slot.to_string(),
                    slug: target.slug.to_string(),
                    value: *v,
                    max: *max,
                })
            }
        }
        (ExpectedType::Boolean, AttrValue::Bool(_)) | (ExpectedType::Text, AttrValue::Text(_)) => {
            Ok(())
        }
        (ExpectedType::Map(_), AttrValue::Keyed(entries)) => {
            for (key, entry) in entries {
                validate_entry(target, expected, key, entry)?;
            }
            Ok(())
        }
        _ => Err(Error::TypeMismatch {
            slot: target.slot.to_string(),
            slug: target.slug.to_string(),
            expected: expected.to_string(),
            actual: value.kind_name(),
            value: value.to_string(),
        }),
    }
}

/// Check one entry of a keyed attribute. `expected` is the attribute's map type.
pub fn validate_entry(
    target: Target<'_>,
    expected: &ExpectedType,
    key: &str,
    value: &AttrValue,
) -> Result<()> {
    let ExpectedType::Map(inner) = expected else {
        return Err(Error::TypeMismatch {
            slot: target.slot.to_string(),
            slug: target.slug.to_string(),
            expected: expected.to_string(),
            actual: "map",
            value: format!("{{'{key}': {value}}}"),
        });
    };
    validate(target, inner, value).map_err(|_| Error::InvalidKeyedValue {
        slot: target.slot.to_string(),
        slug: target.slug.to_string(),
        key: key.to_string(),
        expected: expected.to_string(),
        value: value.to_string(),
    })
}
