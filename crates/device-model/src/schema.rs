use crate::ordered::{KeyString, OrderedMap};
use crate::slug::slug;
use crate::{Error, Result};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

/// Immutable description of a device class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    id: u32,
    name: String,
    #[serde(default)]
    description: String,
    vendor_device_id_format: VendorIdFormat,
    attributes: OrderedMap<AttributeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub format: Format,
    pub access: Access,
}

impl AttributeDef {
    /// Human-readable description of this attribute at `slot`.
    pub fn describe(&self, slot: &str) -> String {
        crate::slug::describe(slot, self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

/// Attribute value format, encoded as `{"kind": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Format {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Bool,
    Data,
    Enum(EnumLabels),
    /// String-keyed map of one scalar format.
    Keyed(Box<Format>),
    /// Any kind this crate does not know, payload ignored; rejected when a
    /// device is built.
    Unsupported(String),
}

impl Format {
    pub fn kind_tag(&self) -> &str {
        match self {
            Format::Int8 => "Int8",
            Format::Int16 => "Int16",
            Format::Int32 => "Int32",
            Format::Int64 => "Int64",
            Format::Uint8 => "Uint8",
            Format::Uint16 => "Uint16",
            Format::Uint32 => "Uint32",
            Format::Uint64 => "Uint64",
            Format::Float32 => "Float32",
            Format::Float64 => "Float64",
            Format::Bool => "Bool",
            Format::Data => "Data",
            Format::Enum(_) => "Enum",
            Format::Keyed(_) => "Keyed",
            Format::Unsupported(kind) => kind,
        }
    }
}

/// Wire shape of [`Format`]. The payload is kept as a YAML value so that
/// JSON and YAML documents (with integer enum keys) decode the same way.
#[derive(Serialize, Deserialize)]
struct RawFormat {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_yaml::Value>,
}

impl TryFrom<RawFormat> for Format {
    type Error = String;

    fn try_from(raw: RawFormat) -> Result<Self, Self::Error> {
        let payload = |what: &str| {
            raw.value
                .clone()
                .ok_or_else(|| format!("{} format needs a `value` {what}", raw.kind))
        };
        let format = match raw.kind.as_str() {
            "Int8" => Format::Int8,
            "Int16" => Format::Int16,
            "Int32" => Format::Int32,
            "Int64" => Format::Int64,
            "Uint8" => Format::Uint8,
            "Uint16" => Format::Uint16,
            "Uint32" => Format::Uint32,
            "Uint64" => Format::Uint64,
            "Float32" => Format::Float32,
            "Float64" => Format::Float64,
            "Bool" => Format::Bool,
            "Data" => Format::Data,
            "Enum" => {
                let labels = serde_yaml::from_value(payload("with labels")?)
                    .map_err(|e| format!("enum format: {e}"))?;
                Format::Enum(labels)
            }
            "Keyed" => {
                let inner = serde_yaml::from_value(payload("with the entry format")?)
                    .map_err(|e| format!("keyed format: {e}"))?;
                Format::Keyed(Box::new(inner))
            }
            _ => Format::Unsupported(raw.kind.clone()),
        };
        Ok(format)
    }
}

impl Serialize for Format {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            Format::Enum(labels) => Some(serde_yaml::to_value(labels)),
            Format::Keyed(inner) => Some(serde_yaml::to_value(inner)),
            _ => None,
        }
        .transpose()
        .map_err(<S::Error as ser::Error>::custom)?;
        RawFormat {
            kind: self.kind_tag().to_string(),
            value,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Format {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawFormat::deserialize(deserializer)?;
        Format::try_from(raw).map_err(de::Error::custom)
    }
}

/// Integer-keyed enumeration labels, encoded as `{"value": {"0": "off", ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnumLabels", into = "RawEnumLabels")]
pub struct EnumLabels {
    labels: BTreeMap<i64, String>,
}

impl EnumLabels {
    pub fn new(labels: BTreeMap<i64, String>) -> Self {
        Self { labels }
    }

    pub fn label(&self, value: i64) -> Option<&str> {
        self.labels.get(&value).map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.labels.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct RawEnumLabels {
    value: BTreeMap<KeyString, String>,
}

impl TryFrom<RawEnumLabels> for EnumLabels {
    type Error = String;

    fn try_from(raw: RawEnumLabels) -> Result<Self, Self::Error> {
        let mut labels = BTreeMap::new();
        for (KeyString(key), label) in raw.value {
            let value = key
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("enum key `{key}` is not an integer"))?;
            labels.insert(value, label);
        }
        Ok(Self { labels })
    }
}

impl From<EnumLabels> for RawEnumLabels {
    fn from(e: EnumLabels) -> Self {
        Self {
            value: e
                .labels
                .into_iter()
                .map(|(k, v)| (KeyString(k.to_string()), v))
                .collect(),
        }
    }
}

/// Shape of the external device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VendorIdFormat {
    /// 17 characters: six hex octets separated by one consistent `:` or `-`.
    /// Non-hex characters are rejected even at the right length.
    Macaddr,
    #[serde(other)]
    Text,
}

impl VendorIdFormat {
    pub fn describe(&self) -> &'static str {
        match self {
            VendorIdFormat::Macaddr => "MAC address",
            VendorIdFormat::Text => "text identifier",
        }
    }

    pub fn validate(&self, id: &str) -> Result<()> {
        let ok = match self {
            VendorIdFormat::Macaddr => is_mac_shaped(id),
            VendorIdFormat::Text => !id.trim().is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidVendorId {
                vendor_device_id: id.to_string(),
                format: self.describe(),
            })
        }
    }
}

fn is_mac_shaped(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    let sep = bytes[2];
    if sep != b':' && sep != b'-' {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| {
        if i % 3 == 2 {
            *b == sep
        } else {
            b.is_ascii_hexdigit()
        }
    })
}

impl Schema {
    pub fn from_json_str(doc: &str) -> Result<Self> {
        let schema: Schema =
            serde_json::from_str(doc).map_err(|e| Error::SchemaFormat(e.to_string()))?;
        schema.validated()
    }

    pub fn from_yaml_str(doc: &str) -> Result<Self> {
        let schema: Schema =
            serde_yaml::from_str(doc).map_err(|e| Error::SchemaFormat(e.to_string()))?;
        schema.validated()
    }

    pub fn from_value(doc: serde_json::Value) -> Result<Self> {
        let schema: Schema =
            serde_json::from_value(doc).map_err(|e| Error::SchemaFormat(e.to_string()))?;
        schema.validated()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn vendor_device_id_format(&self) -> VendorIdFormat {
        self.vendor_device_id_format
    }

    pub fn attribute(&self, slot: &str) -> Option<&AttributeDef> {
        self.attributes.get(slot)
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeDef)> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn validated(self) -> Result<Self> {
        let mut slugs = HashSet::new();
        for (slot, attr) in self.attributes.iter() {
            if slot.trim().is_empty() {
                return Err(Error::SchemaFormat("empty attribute slot key".into()));
            }
            if !attr.access.read && !attr.access.write {
                return Err(Error::SchemaFormat(format!(
                    "attribute slot `{slot}` is neither readable nor writable"
                )));
            }
            match &attr.format {
                Format::Enum(labels) if labels.is_empty() => {
                    return Err(Error::SchemaFormat(format!(
                        "enum attribute slot `{slot}` declares no labels"
                    )));
                }
                Format::Keyed(inner) if matches!(**inner, Format::Keyed(_)) => {
                    return Err(Error::SchemaFormat(format!(
                        "keyed attribute slot `{slot}` must wrap a scalar format"
                    )));
                }
                _ => {}
            }
            let s = slug(slot, attr);
            if !slugs.insert(s.clone()) {
                return Err(Error::SchemaFormat(format!(
                    "attribute slot `{slot}` derives duplicate name `{s}`"
                )));
            }
        }
        Ok(self)
    }
}
