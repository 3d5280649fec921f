use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dynamically typed attribute value.
///
/// Serialized untagged, so it reads and writes as the plain JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    /// Unsigned integers that do not fit an `i64`.
    Uint(u64),
    Float(f64),
    Text(String),
    Keyed(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Short name of the value's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) | AttrValue::Uint(_) => "integer",
            AttrValue::Float(_) => "float",
            AttrValue::Text(_) => "text",
            AttrValue::Keyed(_) => "map",
        }
    }

    /// Zero, `0.0`, `false`, empty text and empty maps are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Bool(b) => *b,
            AttrValue::Int(i) => *i != 0,
            AttrValue::Uint(u) => *u != 0,
            AttrValue::Float(f) => *f != 0.0,
            AttrValue::Text(s) => !s.is_empty(),
            AttrValue::Keyed(m) => !m.is_empty(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            AttrValue::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Any integer value, widened so that both `i64` and `u64` fit.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            AttrValue::Int(i) => Some(i128::from(*i)),
            AttrValue::Uint(u) => Some(i128::from(*u)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Keyed(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Uint(u) => write!(f, "{u}"),
            AttrValue::Float(x) => write!(f, "{x:?}"),
            AttrValue::Text(s) => write!(f, "'{s}'"),
            AttrValue::Keyed(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{k}': {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<u32> for AttrValue {
    fn from(v: u32) -> Self {
        AttrValue::Int(i64::from(v))
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(AttrValue::Uint(v), AttrValue::Int)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(f64::from(v))
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<BTreeMap<String, AttrValue>> for AttrValue {
    fn from(v: BTreeMap<String, AttrValue>) -> Self {
        AttrValue::Keyed(v)
    }
}
