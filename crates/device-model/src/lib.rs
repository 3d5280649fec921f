//! device-model: schema-driven IoT devices.
//!
//! A [`Schema`] describes a device class: its numbered attribute slots, the
//! format each slot carries and whether the platform may read or write it.
//! A [`Device`] built from a schema stores validated readable values, holds
//! write callbacks, emits outbound [`Envelope`]s and applies inbound
//! [`UpdateMessage`]s.

mod error;
pub use error::{BoxError, Error, Result};

mod ordered;
pub use ordered::OrderedMap;

mod value;
pub use value::AttrValue;

mod schema;
pub use schema::{Access, AttributeDef, EnumLabels, Format, Schema, VendorIdFormat};

mod slug;
pub use slug::{binding_name, describe, slug, AttributeRegistry};

mod validate;
pub use validate::{expected_type, validate, validate_entry, ExpectedType, Target};

mod codec;
pub use codec::{
    decode_update, decode_update_slice, encode_envelope, encode_envelopes, format_created_time,
    parse_created_time, Clock, Envelope, MessageIdSource, SystemClock, UpdateMessage, UuidV4Ids,
};

mod device;
pub use device::{Device, DeviceOptions, ValuesFilter, WriteCallback};

mod loader;
pub use loader::{load_schema_file, load_schemas_dir, SchemaRegistry};

mod metrics;
pub use metrics::{DeviceMetrics, MetricsHub};
