use crate::ordered::OrderedMap;
use crate::value::AttrValue;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Outbound device message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_uuid: String,
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`.
    pub created_time: String,
    pub vendor_device_id: String,
    pub device_class_id: u32,
    /// Slot -> value for every readable slot that is set.
    pub values: BTreeMap<String, AttrValue>,
}

/// Inbound update for one device. Pairs keep the order they were supplied in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    pub vendor_device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class_id: Option<u32>,
    #[serde(default)]
    pub values: OrderedMap<AttrValue>,
}

impl UpdateMessage {
    pub fn new(vendor_device_id: impl Into<String>) -> Self {
        Self {
            message_uuid: None,
            created_time: None,
            vendor_device_id: vendor_device_id.into(),
            device_class_id: None,
            values: OrderedMap::new(),
        }
    }

    pub fn with_value(mut self, slot: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.values.insert(slot, value.into());
        self
    }

    /// Parsed `created_time`, if the sender supplied one.
    pub fn created_at(&self) -> Result<Option<OffsetDateTime>> {
        self.created_time
            .as_deref()
            .map(parse_created_time)
            .transpose()
    }
}

impl From<Envelope> for UpdateMessage {
    fn from(env: Envelope) -> Self {
        Self {
            message_uuid: Some(env.message_uuid),
            created_time: Some(env.created_time),
            vendor_device_id: env.vendor_device_id,
            device_class_id: Some(env.device_class_id),
            values: env.values.into_iter().collect(),
        }
    }
}

/// Source of wall-clock time for message envelopes.
pub trait Clock {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Source of unique message identifiers.
pub trait MessageIdSource {
    fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Ids;

impl MessageIdSource for UuidV4Ids {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub fn format_created_time(t: OffsetDateTime) -> Result<String> {
    t.to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .map_err(|e| Error::Timestamp(e.to_string()))
}

pub fn parse_created_time(s: &str) -> Result<OffsetDateTime> {
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|e| Error::MessageFormat(format!("created_time `{s}`: {e}")))
}

/// Request body for the platform's incoming-messages endpoint: a JSON array.
pub fn encode_envelopes(envelopes: &[Envelope]) -> Result<String> {
    serde_json::to_string(envelopes).map_err(|e| Error::MessageFormat(e.to_string()))
}

pub fn encode_envelope(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| Error::MessageFormat(e.to_string()))
}

pub fn decode_update(raw: &str) -> Result<UpdateMessage> {
    serde_json::from_str(raw).map_err(|e| Error::MessageFormat(e.to_string()))
}

pub fn decode_update_slice(raw: &[u8]) -> Result<UpdateMessage> {
    serde_json::from_slice(raw).map_err(|e| Error::MessageFormat(e.to_string()))
}
