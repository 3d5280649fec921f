//! Device instances built from a schema.
//!
//! A [`Device`] is confined to one owner: it holds plain maps and boxed
//! callbacks, and callers serialise access when sharing it.

use crate::codec::{
    format_created_time, Clock, Envelope, MessageIdSource, SystemClock, UpdateMessage, UuidV4Ids,
};
use crate::error::BoxError;
use crate::metrics::DeviceMetrics;
use crate::ordered::OrderedMap;
use crate::schema::Schema;
use crate::slug::{describe, AttributeRegistry};
use crate::validate::{expected_type, validate, validate_entry, ExpectedType, Target};
use crate::value::AttrValue;
use crate::{Error, Result};
use core::fmt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked when a writable attribute receives a value through dispatch.
pub type WriteCallback = Box<dyn FnMut(&AttrValue) -> Result<(), BoxError>>;

/// Which readable values [`Device::values`] reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValuesFilter {
    /// Skip unset values and zero, `0.0`, `false`, empty text or empty maps.
    #[default]
    Truthy,
    /// Skip unset values only, like [`Device::to_message`].
    Present,
}

#[derive(Clone, Default)]
pub struct DeviceOptions {
    pub values_filter: ValuesFilter,
    pub metrics: Option<DeviceMetrics>,
}

pub struct Device {
    vendor_device_id: String,
    device_class_id: u32,
    schema: Arc<Schema>,
    registry: AttributeRegistry,
    expected: HashMap<String, ExpectedType>,
    values: HashMap<String, Option<AttrValue>>,
    bindings: HashMap<String, Option<WriteCallback>>,
    options: DeviceOptions,
}

impl Device {
    pub fn from_schema(schema: Arc<Schema>, vendor_device_id: &str) -> Result<Self> {
        Self::with_options(schema, vendor_device_id, DeviceOptions::default())
    }

    pub fn with_options(
        schema: Arc<Schema>,
        vendor_device_id: &str,
        options: DeviceOptions,
    ) -> Result<Self> {
        schema.vendor_device_id_format().validate(vendor_device_id)?;

        let mut expected = HashMap::with_capacity(schema.len());
        for (slot, attr) in schema.attributes() {
            expected.insert(slot.to_string(), expected_type(slot, attr)?);
        }

        let registry = AttributeRegistry::new(&schema);
        let values = registry
            .readable()
            .iter()
            .map(|slot| (slot.clone(), None))
            .collect();
        let bindings = registry
            .writable()
            .iter()
            .map(|slot| (slot.clone(), None))
            .collect();

        let device = Self {
            vendor_device_id: vendor_device_id.to_uppercase(),
            device_class_id: schema.id(),
            schema,
            registry,
            expected,
            values,
            bindings,
            options,
        };
        if let Some(m) = &device.options.metrics {
            m.devices_created.inc();
        }
        debug!(
            device_class_id = device.device_class_id,
            vendor_device_id = %device.vendor_device_id,
            readable = device.registry.readable().len(),
            writable = device.registry.writable().len(),
            "device created"
        );
        Ok(device)
    }

    pub fn vendor_device_id(&self) -> &str {
        &self.vendor_device_id
    }

    pub fn device_class_id(&self) -> u32 {
        self.device_class_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Slugs of every schema attribute, in schema order.
    pub fn attributes(&self) -> &[String] {
        self.registry.slugs()
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Schema name and description.
    pub fn doc(&self) -> String {
        format!("{}\n{}", self.schema.name(), self.schema.description())
    }

    /// Description of the attribute behind a slug.
    pub fn describe(&self, name: &str) -> Result<String> {
        let slot = self
            .registry
            .slot_for(name)
            .ok_or_else(|| self.unknown_name(name))?;
        let attr = self
            .schema
            .attribute(slot)
            .ok_or_else(|| self.unknown_name(name))?;
        Ok(describe(slot, attr))
    }

    // ---- access by name ----

    pub fn get(&self, name: &str) -> Result<Option<&AttrValue>> {
        let slot = self.readable_slot_by_name(name)?;
        self.get_slot(&slot)
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        let slot = self.readable_slot_by_name(name)?;
        self.set_slot(&slot, value)
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let slot = self.readable_slot_by_name(name)?;
        self.delete_slot(&slot)
    }

    // ---- access by slot ----

    pub fn get_slot(&self, slot: &str) -> Result<Option<&AttrValue>> {
        self.values
            .get(slot)
            .map(Option::as_ref)
            .ok_or_else(|| self.unknown_slot(slot))
    }

    pub fn set_slot(&mut self, slot: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        if !self.values.contains_key(slot) {
            return Err(self.unknown_slot(slot));
        }
        validate(self.target(slot), self.expected_for(slot)?, &value)?;
        self.values.insert(slot.to_string(), Some(value));
        Ok(())
    }

    pub fn delete_slot(&mut self, slot: &str) -> Result<()> {
        match self.values.get_mut(slot) {
            Some(stored) => {
                *stored = None;
                Ok(())
            }
            None => Err(self.unknown_slot(slot)),
        }
    }

    // ---- keyed entries ----

    pub fn entry(&self, name: &str, key: &str) -> Result<Option<&AttrValue>> {
        Ok(self
            .get(name)?
            .and_then(AttrValue::as_keyed)
            .and_then(|m| m.get(key)))
    }

    pub fn set_entry(
        &mut self,
        name: &str,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let slot = self.readable_slot_by_name(name)?;
        self.set_slot_entry(&slot, key, value)
    }

    /// Assign one entry of a keyed attribute, creating the map on first write.
    pub fn set_slot_entry(
        &mut self,
        slot: &str,
        key: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let value = value.into();
        if !self.values.contains_key(slot) {
            return Err(self.unknown_slot(slot));
        }
        validate_entry(self.target(slot), self.expected_for(slot)?, key, &value)?;
        let stored = self.values.entry(slot.to_string()).or_default();
        match stored {
            Some(AttrValue::Keyed(map)) => {
                map.insert(key.to_string(), value);
            }
            other => {
                *other = Some(AttrValue::Keyed(BTreeMap::from([(key.to_string(), value)])));
            }
        }
        Ok(())
    }

    // ---- write bindings ----

    pub fn is_bound(&self, binding: &str) -> Result<bool> {
        let slot = self.slot_by_binding(binding)?;
        Ok(matches!(self.bindings.get(slot), Some(Some(_))))
    }

    pub fn binding(&mut self, binding: &str) -> Result<Option<&mut WriteCallback>> {
        let slot = self.slot_by_binding(binding)?.to_string();
        Ok(self.bindings.get_mut(&slot).and_then(Option::as_mut))
    }

    pub fn set_binding<F>(&mut self, binding: &str, callback: F) -> Result<()>
    where
        F: FnMut(&AttrValue) -> Result<(), BoxError> + 'static,
    {
        let slot = self.slot_by_binding(binding)?.to_string();
        self.bind_slot(&slot, callback)
    }

    pub fn bind_slot<F>(&mut self, slot: &str, callback: F) -> Result<()>
    where
        F: FnMut(&AttrValue) -> Result<(), BoxError> + 'static,
    {
        match self.bindings.get_mut(slot) {
            Some(b) => {
                *b = Some(Box::new(callback));
                Ok(())
            }
            None => Err(self.unknown_slot(slot)),
        }
    }

    pub fn delete_binding(&mut self, binding: &str) -> Result<()> {
        let slot = self.slot_by_binding(binding)?.to_string();
        if let Some(b) = self.bindings.get_mut(&slot) {
            *b = None;
        }
        Ok(())
    }

    // ---- bulk ----

    /// Slug -> value of readable attributes in schema order, filtered per
    /// [`DeviceOptions::values_filter`].
    pub fn values(&self) -> OrderedMap<AttrValue> {
        let mut out = OrderedMap::new();
        for slot in self.registry.readable() {
            let Some(Some(value)) = self.values.get(slot) else {
                continue;
            };
            if self.options.values_filter == ValuesFilter::Truthy && !value.is_truthy() {
                continue;
            }
            if let Some(slug) = self.registry.slug_for(slot) {
                out.insert(slug, value.clone());
            }
        }
        out
    }

    /// Unset every readable value. Bindings are kept.
    pub fn clear(&mut self) {
        for v in self.values.values_mut() {
            *v = None;
        }
    }

    // ---- messages ----

    pub fn to_message(&self) -> Result<Envelope> {
        self.to_message_with(&UuidV4Ids, &SystemClock)
    }

    pub fn to_message_with(
        &self,
        ids: &dyn MessageIdSource,
        clock: &dyn Clock,
    ) -> Result<Envelope> {
        let values = self
            .values
            .iter()
            .filter_map(|(slot, v)| v.as_ref().map(|v| (slot.clone(), v.clone())))
            .collect();
        let envelope = Envelope {
            message_uuid: ids.next_id(),
            created_time: format_created_time(clock.now_utc())?,
            vendor_device_id: self.vendor_device_id.clone(),
            device_class_id: self.device_class_id,
            values,
        };
        if let Some(m) = &self.options.metrics {
            m.messages_built.inc();
        }
        Ok(envelope)
    }

    /// Apply an inbound update.
    ///
    /// Every pair is checked before any is applied. Pairs are then applied in
    /// order; a failing callback stops the remaining pairs and keeps the ones
    /// already applied.
    pub fn dispatch(&mut self, message: &UpdateMessage) -> Result<()> {
        if let Err(e) = self.check_update(message) {
            warn!(vendor_device_id = %self.vendor_device_id, error = %e, "rejected device message");
            if let Some(m) = &self.options.metrics {
                m.dispatch_rejected.inc();
            }
            return Err(e);
        }

        for (slot, value) in message.values.iter() {
            if let Some(stored) = self.values.get_mut(slot) {
                *stored = Some(value.clone());
            }
            if let Some(Some(callback)) = self.bindings.get_mut(slot) {
                callback(value).map_err(|source| Error::Callback {
                    slot: slot.to_string(),
                    slug: self
                        .registry
                        .slug_for(slot)
                        .unwrap_or_default()
                        .to_string(),
                    source,
                })?;
            }
        }

        if let Some(m) = &self.options.metrics {
            m.messages_dispatched.inc();
        }
        debug!(
            vendor_device_id = %self.vendor_device_id,
            pairs = message.values.len(),
            "dispatched device message"
        );
        Ok(())
    }

    fn check_update(&self, message: &UpdateMessage) -> Result<()> {
        if message.vendor_device_id.to_uppercase() != self.vendor_device_id {
            return Err(Error::DeviceMismatch {
                expected: self.vendor_device_id.clone(),
                actual: message.vendor_device_id.clone(),
            });
        }
        for (slot, value) in message.values.iter() {
            let attr = self
                .schema
                .attribute(slot)
                .ok_or_else(|| self.unknown_slot(slot))?;
            let target = self.target(slot);
            validate(target, self.expected_for(slot)?, value)?;
            if !attr.access.write {
                return Err(Error::ReadOnlyAttribute {
                    slot: slot.to_string(),
                    slug: target.slug.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    // ---- lookups ----

    fn target<'a>(&'a self, slot: &'a str) -> Target<'a> {
        Target {
            slot,
            slug: self.registry.slug_for(slot).unwrap_or_default(),
        }
    }

    fn expected_for(&self, slot: &str) -> Result<&ExpectedType> {
        self.expected
            .get(slot)
            .ok_or_else(|| self.unknown_slot(slot))
    }

    fn readable_slot_by_name(&self, name: &str) -> Result<String> {
        self.registry
            .slot_for(name)
            .filter(|slot| self.values.contains_key(*slot))
            .map(str::to_string)
            .ok_or_else(|| self.unknown_name(name))
    }

    fn slot_by_binding(&self, binding: &str) -> Result<&str> {
        self.registry
            .slot_for_binding(binding)
            .ok_or_else(|| self.unknown_name(binding))
    }

    fn unknown_slot(&self, slot: &str) -> Error {
        Error::UnknownSlot {
            slot: slot.to_string(),
            device_class_id: self.device_class_id,
        }
    }

    fn unknown_name(&self, name: &str) -> Error {
        Error::UnknownAttribute {
            name: name.to_string(),
            device_class_id: self.device_class_id,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Device{}: {}>", self.device_class_id, self.vendor_device_id)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<&str> = self
            .bindings
            .iter()
            .filter(|(_, b)| b.is_some())
            .map(|(slot, _)| slot.as_str())
            .collect();
        f.debug_struct("Device")
            .field("vendor_device_id", &self.vendor_device_id)
            .field("device_class_id", &self.device_class_id)
            .field("values", &self.values)
            .field("bound", &bound)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsHub;
    use crate::schema::tests::{SCHEMA_12, SCHEMA_91};
    use std::cell::RefCell;
    use std::rc::Rc;
    use time::macros::datetime;
    use time::OffsetDateTime;

    const MAC: &str = "DE:AD:BE:EF:FF:00";

    fn device() -> Device {
        let schema = Arc::new(Schema::from_json_str(SCHEMA_12).unwrap());
        Device::from_schema(schema, MAC).unwrap()
    }

    fn keyed_device() -> Device {
        let schema = Arc::new(Schema::from_json_str(SCHEMA_91).unwrap());
        Device::from_schema(schema, "abc1234").unwrap()
    }

    struct FixedIds;
    impl MessageIdSource for FixedIds {
        fn next_id(&self) -> String {
            "msg-1".into()
        }
    }

    struct FixedClock;
    impl Clock for FixedClock {
        fn now_utc(&self) -> OffsetDateTime {
            datetime!(2024-03-05 21:04:09 UTC)
        }
    }

    #[test]
    fn construction_normalises_vendor_id() {
        let schema = Arc::new(Schema::from_json_str(SCHEMA_12).unwrap());
        let dev = Device::from_schema(schema, "de:ad:be:ef:ff:00").unwrap();
        assert_eq!(dev.vendor_device_id(), MAC);
        assert_eq!(dev.device_class_id(), 12);
        assert_eq!(dev.to_string(), "<Device12: DE:AD:BE:EF:FF:00>");
        assert_eq!(dev.doc(), "Sensor board\nAmbient sensors with remote reboot");
    }

    #[test]
    fn short_mac_is_rejected() {
        let schema = Arc::new(Schema::from_json_str(SCHEMA_12).unwrap());
        let err = Device::from_schema(schema, "DE:AD:BE").unwrap_err();
        assert!(matches!(err, Error::InvalidVendorId { .. }));
    }

    #[test]
    fn unsupported_format_fails_construction() {
        let doc = r#"{"id": 1, "name": "x", "vendor_device_id_format": {"kind": "Macaddr"},
            "attributes": {"0": {"format": {"kind": "Complex128"}, "access": {"read": true, "write": false}}}}"#;
        let schema = Arc::new(Schema::from_json_str(doc).unwrap());
        assert!(matches!(
            Device::from_schema(schema, MAC),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn temperature_round_trip_and_message() {
        let mut dev = device();
        let env = dev.to_message_with(&FixedIds, &FixedClock).unwrap();
        assert!(!env.values.contains_key("0"));

        dev.set_slot("0", -30.14).unwrap();
        assert_eq!(
            dev.get("sht31_ambient_temperature_0").unwrap(),
            Some(&AttrValue::Float(-30.14))
        );

        let env = dev.to_message_with(&FixedIds, &FixedClock).unwrap();
        assert_eq!(env.message_uuid, "msg-1");
        assert_eq!(env.created_time, "2024-03-05T21:04:09Z");
        assert_eq!(env.vendor_device_id, MAC);
        assert_eq!(env.device_class_id, 12);
        assert_eq!(env.values.get("0"), Some(&AttrValue::Float(-30.14)));

        dev.delete("sht31_ambient_temperature_0").unwrap();
        assert_eq!(dev.get_slot("0").unwrap(), None);
    }

    #[test]
    fn default_message_ids_are_unique() {
        let dev = device();
        let a = dev.to_message().unwrap();
        let b = dev.to_message().unwrap();
        assert_ne!(a.message_uuid, b.message_uuid);
        assert_eq!(a.created_time.len(), "YYYY-MM-DDTHH:MM:SSZ".len());
    }

    #[test]
    fn name_and_slot_access_agree() {
        let mut dev = device();
        dev.set("uptime_ms_5", 100).unwrap();
        assert_eq!(dev.get_slot("5").unwrap(), Some(&AttrValue::Int(100)));
        dev.set_slot("1_3", "v1.2.0").unwrap();
        assert_eq!(
            dev.get("firmware_version_1_3").unwrap(),
            Some(&AttrValue::from("v1.2.0"))
        );
    }

    #[test]
    fn set_rejects_wrong_type() {
        let mut dev = device();
        let err = dev.set("veml7700_ambient_light_2", "invalid").unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 'invalid' for attribute `veml7700_ambient_light_2` (slot `2`) has an invalid type: expected float, got text"
        );
        assert!(matches!(
            dev.set_slot("2", "invalid"),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(dev.get_slot("2").unwrap(), None);
    }

    #[test]
    fn unknown_slot_is_checked_before_type() {
        let mut dev = device();
        let err = dev.set_slot("999", "not even a number").unwrap_err();
        assert_eq!(
            err.to_string(),
            "no attribute for slot `999` found in device with schema 12"
        );
        // write-only slots have no readable value
        assert!(matches!(dev.get_slot("1_4"), Err(Error::UnknownSlot { .. })));
        assert!(matches!(
            dev.get("reboot_1_4"),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn enum_values() {
        let mut dev = device();
        assert!(matches!(
            dev.set("mode_7", 3),
            Err(Error::InvalidEnumValue { value: 3, .. })
        ));
        dev.set("mode_7", 5).unwrap();
        assert_eq!(dev.get("mode_7").unwrap(), Some(&AttrValue::Int(5)));
    }

    #[test]
    fn clear_unsets_every_readable_value() {
        let mut dev = device();
        dev.set("uptime_ms_5", 100).unwrap();
        dev.set("veml7700_ambient_light_2", 321.60).unwrap();
        dev.bind_slot("6", |_| Ok(())).unwrap();
        dev.clear();
        for slot in dev.registry().readable().to_vec() {
            assert_eq!(dev.get_slot(&slot).unwrap(), None);
        }
        assert!(dev.is_bound("on_publish_interval_s_6_update").unwrap());
    }

    #[test]
    fn values_filters_falsy_by_default() {
        let mut dev = device();
        dev.set("uptime_ms_5", 0).unwrap();
        dev.set("veml7700_ambient_light_2", 200.112).unwrap();
        dev.set("firmware_version_1_3", "").unwrap();
        let values = dev.values();
        assert_eq!(values.len(), 1);
        assert_eq!(
            values.get("veml7700_ambient_light_2"),
            Some(&AttrValue::Float(200.112))
        );
        // the envelope only looks at presence
        let env = dev.to_message().unwrap();
        assert_eq!(env.values.get("5"), Some(&AttrValue::Int(0)));
    }

    #[test]
    fn values_follow_schema_order() {
        let mut dev = device();
        dev.set("sht31_ambient_temperature_0", -30.14).unwrap();
        dev.set("uptime_ms_5", 12).unwrap();
        dev.set("mode_7", 1).unwrap();
        dev.set("veml7700_ambient_light_2", 3.5).unwrap();
        let values = dev.values();
        assert_eq!(
            values.keys().collect::<Vec<_>>(),
            vec![
                "uptime_ms_5",
                "veml7700_ambient_light_2",
                "sht31_ambient_temperature_0",
                "mode_7",
            ]
        );
    }

    #[test]
    fn values_presence_filter() {
        let schema = Arc::new(Schema::from_json_str(SCHEMA_12).unwrap());
        let options = DeviceOptions {
            values_filter: ValuesFilter::Present,
            ..Default::default()
        };
        let mut dev = Device::with_options(schema, MAC, options).unwrap();
        dev.set("uptime_ms_5", 0).unwrap();
        assert_eq!(dev.values().get("uptime_ms_5"), Some(&AttrValue::Int(0)));
    }

    #[test]
    fn bindings_set_and_delete() {
        let mut dev = device();
        let name = "on_publish_interval_s_6_update";
        assert!(!dev.is_bound(name).unwrap());
        dev.set_binding(name, |_| Ok(())).unwrap();
        assert!(dev.is_bound(name).unwrap());
        if let Some(cb) = dev.binding(name).unwrap() {
            cb(&AttrValue::Int(1)).unwrap();
        }
        dev.delete_binding(name).unwrap();
        assert!(!dev.is_bound(name).unwrap());
        // read-only attributes have no binding
        assert!(matches!(
            dev.set_binding("on_uptime_ms_5_update", |_| Ok(())),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn dispatch_to_other_device_changes_nothing() {
        let mut dev = device();
        let seen = Rc::new(RefCell::new(0));
        let s = seen.clone();
        dev.bind_slot("6", move |_| {
            *s.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
        let msg = UpdateMessage::new("YY:XX:XX:XX:XX:XX").with_value("6", 42);
        let err = dev.dispatch(&msg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tried to dispatch a message for a wrong device, expected message for id 'DE:AD:BE:EF:FF:00', but got a message for 'YY:XX:XX:XX:XX:XX'"
        );
        assert_eq!(dev.get_slot("6").unwrap(), None);
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn dispatch_updates_value_and_calls_back_once() {
        let mut dev = device();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        dev.set_binding("on_publish_interval_s_6_update", move |v| {
            s.borrow_mut().push(v.clone());
            Ok(())
        })
        .unwrap();

        let msg = UpdateMessage::new(MAC).with_value("6", 42);
        dev.dispatch(&msg).unwrap();

        assert_eq!(dev.get("publish_interval_s_6").unwrap(), Some(&AttrValue::Int(42)));
        assert_eq!(*seen.borrow(), vec![AttrValue::Int(42)]);
    }

    #[test]
    fn dispatch_write_only_slot_only_calls_back() {
        let mut dev = device();
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        dev.bind_slot("1_4", move |v| {
            *s.borrow_mut() = v.as_bool();
            Ok(())
        })
        .unwrap();
        dev.dispatch(&UpdateMessage::new(MAC).with_value("1_4", true))
            .unwrap();
        assert_eq!(*seen.borrow(), Some(true));
        assert!(dev.get_slot("1_4").is_err());
    }

    #[test]
    fn dispatch_rejections() {
        let mut dev = device();
        let err = dev
            .dispatch(&UpdateMessage::new(MAC).with_value("6", "hello"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 'hello' for attribute `publish_interval_s_6` (slot `6`) has an invalid type: expected integer, got text"
        );
        assert!(matches!(
            dev.dispatch(&UpdateMessage::new(MAC).with_value("0", 1.5)),
            Err(Error::ReadOnlyAttribute { .. })
        ));
        assert!(matches!(
            dev.dispatch(&UpdateMessage::new(MAC).with_value("42", 1)),
            Err(Error::UnknownSlot { .. })
        ));
        assert!(matches!(
            dev.dispatch(&UpdateMessage::new(MAC).with_value("7", 9)),
            Err(Error::InvalidEnumValue { .. })
        ));
    }

    #[test]
    fn dispatch_is_all_or_nothing() {
        let mut dev = device();
        let msg = UpdateMessage::new(MAC)
            .with_value("6", 10)
            .with_value("7", 1)
            .with_value("0", 3.0);
        assert!(matches!(
            dev.dispatch(&msg),
            Err(Error::ReadOnlyAttribute { .. })
        ));
        assert_eq!(dev.get_slot("6").unwrap(), None);
        assert_eq!(dev.get_slot("7").unwrap(), None);
    }

    #[test]
    fn failing_callback_keeps_applied_pairs() {
        let mut dev = device();
        dev.bind_slot("7", |_| Err("actuator offline".into()))
            .unwrap();
        let msg = UpdateMessage::new(MAC)
            .with_value("6", 10)
            .with_value("7", 1)
            .with_value("8", 4);
        let err = dev.dispatch(&msg).unwrap_err();
        assert!(matches!(err, Error::Callback { ref slot, .. } if slot == "7"));
        assert_eq!(dev.get_slot("6").unwrap(), Some(&AttrValue::Int(10)));
        assert_eq!(dev.get_slot("7").unwrap(), Some(&AttrValue::Int(1)));
        assert_eq!(dev.get_slot("8").unwrap(), None);
    }

    #[test]
    fn keyed_entries() {
        let mut dev = keyed_device();
        assert_eq!(dev.vendor_device_id(), "ABC1234");
        dev.set_slot_entry("0", "plastic", 1234.0).unwrap();
        dev.set_entry("temperature_by_material_0", "glass", 900.5)
            .unwrap();
        assert_eq!(
            dev.entry("temperature_by_material_0", "plastic").unwrap(),
            Some(&AttrValue::Float(1234.0))
        );
        let stored = dev.get_slot("0").unwrap().and_then(AttrValue::as_keyed).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn keyed_entry_with_wrong_type() {
        let mut dev = keyed_device();
        let err = dev
            .set_entry("temperature_by_material_0", "plastic", 10)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyedValue { ref slot, ref slug, .. }
                if slot == "0" && slug == "temperature_by_material_0"
        ));
        assert!(err.to_string().starts_with(
            "keyed attribute slot `0` (`temperature_by_material_0`) must be a map[string, float]"
        ));
    }

    #[test]
    fn dispatch_keyed_value() {
        let mut dev = keyed_device();
        let seen = Rc::new(RefCell::new(0));
        let s = seen.clone();
        dev.bind_slot("0", move |_| {
            *s.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();

        let good: AttrValue = serde_json::from_str(r#"{"plastic": 1234.0, "glass": 900.5}"#).unwrap();
        dev.dispatch(&UpdateMessage::new("abc1234").with_value("0", good.clone()))
            .unwrap();
        assert_eq!(dev.get_slot("0").unwrap(), Some(&good));
        assert_eq!(*seen.borrow(), 1);

        let bad: AttrValue = serde_json::from_str(r#"{"plastic": 1.0, "steel": "hot"}"#).unwrap();
        let err = dev
            .dispatch(&UpdateMessage::new("ABC1234").with_value("0", bad))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyedValue { ref slot, ref key, .. } if slot == "0" && key == "steel"
        ));
        assert_eq!(dev.get_slot("0").unwrap(), Some(&good));
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn whole_keyed_map_can_be_set() {
        let mut dev = keyed_device();
        let map = BTreeMap::from([("plastic".to_string(), AttrValue::Float(1.5))]);
        dev.set("temperature_by_material_0", map.clone()).unwrap();
        assert_eq!(
            dev.get_slot("0").unwrap().and_then(AttrValue::as_keyed),
            Some(&map)
        );
    }

    const COUNTER_SCHEMA: &str = r#"{
        "id": 40,
        "name": "Counter",
        "vendor_device_id_format": {"kind": "Macaddr"},
        "attributes": {
            "0": {"name": "counter", "format": {"kind": "Uint64"}, "access": {"read": true, "write": true}},
            "1": {"name": "level", "format": {"kind": "Float32"}, "access": {"read": true, "write": true}}
        }
    }"#;

    fn counter_device() -> Device {
        let schema = Arc::new(Schema::from_json_str(COUNTER_SCHEMA).unwrap());
        Device::from_schema(schema, MAC).unwrap()
    }

    #[test]
    fn dispatch_full_range_uint64() {
        let mut dev = counter_device();
        let raw = r#"{"vendor_device_id": "DE:AD:BE:EF:FF:00", "values": {"0": 18446744073709551615}}"#;
        let msg = crate::codec::decode_update(raw).unwrap();
        dev.dispatch(&msg).unwrap();
        assert_eq!(
            dev.get("counter_0").unwrap(),
            Some(&AttrValue::Uint(u64::MAX))
        );
        let body = crate::codec::encode_envelope(&dev.to_message().unwrap()).unwrap();
        assert!(body.contains(r#""0":18446744073709551615"#));

        assert!(matches!(
            dev.set("counter_0", -1),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut dev = device();
        for v in [f64::NAN, f64::INFINITY] {
            assert!(matches!(
                dev.set_slot("1", v),
                Err(Error::InvalidFloat { .. })
            ));
        }
        assert_eq!(dev.get_slot("1").unwrap(), None);
        assert!(!dev.to_message().unwrap().values.contains_key("1"));
    }

    #[test]
    fn float32_range_is_enforced() {
        let mut dev = counter_device();
        assert!(matches!(
            dev.set("level_1", 1e300),
            Err(Error::InvalidFloat { .. })
        ));
        dev.set("level_1", 0.25).unwrap();
        assert!(matches!(
            dev.dispatch(&UpdateMessage::new(MAC).with_value("1", -1e39)),
            Err(Error::InvalidFloat { .. })
        ));
        assert_eq!(dev.get("level_1").unwrap(), Some(&AttrValue::Float(0.25)));
    }

    #[test]
    fn keyed_attribute_needs_a_map() {
        let mut dev = keyed_device();
        let err = dev.set("temperature_by_material_0", 5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value 5 for attribute `temperature_by_material_0` (slot `0`) has an invalid type: expected map[string, float], got integer"
        );
        // entry access on a scalar attribute
        let mut dev = device();
        assert!(matches!(
            dev.set_slot_entry("0", "x", 1.0),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn describes_attributes() {
        let dev = device();
        assert_eq!(
            dev.describe("veml7700_ambient_light_2").unwrap(),
            "veml7700 ambient light\n\n This attribute has format Float32 and represents illuminance measured in lx."
        );
    }

    #[test]
    fn metrics_count_device_activity() {
        let hub = MetricsHub::new().unwrap();
        let schema = Arc::new(Schema::from_json_str(SCHEMA_12).unwrap());
        let options = DeviceOptions {
            metrics: Some(hub.dev.clone()),
            ..Default::default()
        };
        let mut dev = Device::with_options(schema, MAC, options).unwrap();
        dev.to_message().unwrap();
        dev.dispatch(&UpdateMessage::new(MAC).with_value("6", 1))
            .unwrap();
        let _ = dev.dispatch(&UpdateMessage::new("00:00:00:00:00:00"));
        assert_eq!(hub.dev.devices_created.get(), 1);
        assert_eq!(hub.dev.messages_built.get(), 1);
        assert_eq!(hub.dev.messages_dispatched.get(), 1);
        assert_eq!(hub.dev.dispatch_rejected.get(), 1);
    }
}
