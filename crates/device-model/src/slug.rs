use crate::schema::{AttributeDef, Schema};
use std::collections::HashMap;

/// Derive the human-readable name of an attribute slot.
///
/// Name (non-alphanumerics become `_`), else quantity (spaces become `_`),
/// else the format kind; lowercased and suffixed with `_<slot>`.
pub fn slug(slot: &str, attr: &AttributeDef) -> String {
    let mut out = String::new();
    if let Some(name) = attr.name.as_deref() {
        for c in name.chars() {
            if c.is_alphanumeric() {
                out.extend(c.to_lowercase());
            } else {
                out.push('_');
            }
        }
    } else if let Some(quantity) = attr.quantity.as_deref() {
        out.push_str(&quantity.replace(' ', "_").to_lowercase());
    } else {
        out.push_str(&attr.format.kind_tag().to_lowercase());
    }
    out.push('_');
    out.push_str(slot);
    out
}

/// Name under which a write callback is registered.
pub fn binding_name(slug: &str) -> String {
    format!("on_{slug}_update")
}

/// One-paragraph description of an attribute.
pub fn describe(slot: &str, attr: &AttributeDef) -> String {
    let title = attr.name.clone().unwrap_or_else(|| slug(slot, attr));
    let quantity = attr
        .quantity
        .as_deref()
        .map(|q| format!(" and represents {q}"))
        .unwrap_or_default();
    let unit = attr
        .unit
        .as_deref()
        .map(|u| format!(" measured in {u}"))
        .unwrap_or_default();
    format!(
        "{title}\n\n This attribute has format {}{quantity}{unit}.",
        attr.format.kind_tag()
    )
}

/// Slug lookup tables for one schema, plus its readable/writable partition.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    slugs: Vec<String>,
    slug_by_slot: HashMap<String, String>,
    slot_by_slug: HashMap<String, String>,
    slot_by_binding: HashMap<String, String>,
    readable: Vec<String>,
    writable: Vec<String>,
}

impl AttributeRegistry {
    pub fn new(schema: &Schema) -> Self {
        let mut reg = Self::default();
        for (slot, attr) in schema.attributes() {
            let s = slug(slot, attr);
            if attr.access.read {
                reg.readable.push(slot.to_string());
            }
            if attr.access.write {
                reg.writable.push(slot.to_string());
                reg.slot_by_binding
                    .insert(binding_name(&s), slot.to_string());
            }
            reg.slot_by_slug.insert(s.clone(), slot.to_string());
            reg.slug_by_slot.insert(slot.to_string(), s.clone());
            reg.slugs.push(s);
        }
        reg
    }

    /// All slugs, in schema order.
    pub fn slugs(&self) -> &[String] {
        &self.slugs
    }

    pub fn slug_for(&self, slot: &str) -> Option<&str> {
        self.slug_by_slot.get(slot).map(String::as_str)
    }

    pub fn slot_for(&self, slug: &str) -> Option<&str> {
        self.slot_by_slug.get(slug).map(String::as_str)
    }

    pub fn slot_for_binding(&self, binding: &str) -> Option<&str> {
        self.slot_by_binding.get(binding).map(String::as_str)
    }

    /// Readable slots, in schema order.
    pub fn readable(&self) -> &[String] {
        &self.readable
    }

    /// Writable slots, in schema order.
    pub fn writable(&self) -> &[String] {
        &self.writable
    }
}
