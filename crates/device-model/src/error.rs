use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error type returned by write callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed schema document: {0}")]
    SchemaFormat(String),

    #[error("vendor device id '{vendor_device_id}' is not a valid {format}")]
    InvalidVendorId {
        vendor_device_id: String,
        format: &'static str,
    },

    #[error("no attribute for slot `{slot}` found in device with schema {device_class_id}")]
    UnknownSlot { slot: String, device_class_id: u32 },

    #[error("no attribute named `{name}` found in device with schema {device_class_id}")]
    UnknownAttribute { name: String, device_class_id: u32 },

    #[error(
        "value {value} for attribute `{slug}` (slot `{slot}`) has an invalid type: expected {expected}, got {actual}"
    )]
    TypeMismatch {
        slot: String,
        slug: String,
        expected: String,
        actual: &'static str,
        value: String,
    },

    #[error(
        "value {value} for enum attribute `{slug}` (slot `{slot}`) is invalid: expected one of: {valid:?}"
    )]
    InvalidEnumValue {
        slot: String,
        slug: String,
        value: i128,
        valid: Vec<i64>,
    },

    #[error(
        "keyed attribute slot `{slot}` (`{slug}`) must be a {expected}: entry `{key}` has value {value}"
    )]
    InvalidKeyedValue {
        slot: String,
        slug: String,
        key: String,
        expected: String,
        value: String,
    },

    #[error(
        "value {value} for attribute `{slug}` (slot `{slot}`) is out of range [{min}, {max}]"
    )]
    ValueOutOfRange {
        slot: String,
        slug: String,
        value: i128,
        min: i128,
        max: i128,
    },

    #[error(
        "value {value} for attribute `{slug}` (slot `{slot}`) is not a finite float within ±{max:e}"
    )]
    InvalidFloat {
        slot: String,
        slug: String,
        value: f64,
        max: f64,
    },

    #[error("received incoming value {value} for read-only attribute `{slug}` (slot `{slot}`)")]
    ReadOnlyAttribute {
        slot: String,
        slug: String,
        value: String,
    },

    #[error(
        "tried to dispatch a message for a wrong device, expected message for id '{expected}', but got a message for '{actual}'"
    )]
    DeviceMismatch { expected: String, actual: String },

    #[error("unsupported attribute format `{kind}` for slot `{slot}`")]
    UnsupportedFormat { slot: String, kind: String },

    #[error("write callback for attribute `{slug}` (slot `{slot}`) failed: {source}")]
    Callback {
        slot: String,
        slug: String,
        source: BoxError,
    },

    #[error("malformed device message: {0}")]
    MessageFormat(String),

    #[error("could not format message timestamp: {0}")]
    Timestamp(String),
}
