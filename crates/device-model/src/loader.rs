use crate::schema::Schema;
use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Schemas indexed by device class id.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    pub schemas: HashMap<u32, Arc<Schema>>,
}

impl SchemaRegistry {
    /// Insert a schema, returning the one it replaced for the same id.
    pub fn insert(&mut self, schema: Schema) -> Option<Arc<Schema>> {
        self.schemas.insert(schema.id(), Arc::new(schema))
    }

    pub fn get(&self, device_class_id: u32) -> Option<Arc<Schema>> {
        self.schemas.get(&device_class_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml")
    )
}

/// Load a schema document; `.yml`/`.yaml` files are YAML, anything else JSON.
pub fn load_schema_file(path: impl AsRef<Path>) -> anyhow::Result<Schema> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading schema: {}", path.display()))?;
    let schema = if is_yaml(path) {
        Schema::from_yaml_str(&raw)
    } else {
        Schema::from_json_str(&raw)
    }
    .with_context(|| format!("decoding schema: {}", path.display()))?;
    Ok(schema)
}

/// Load every `.json`, `.yml` and `.yaml` file in `dir`, in file name order.
pub fn load_schemas_dir(dir: impl AsRef<Path>) -> anyhow::Result<SchemaRegistry> {
    let dir = dir.as_ref();
    let mut reg = SchemaRegistry::default();
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("listing schemas: {}", dir.display()))?
    {
        let path = entry?.path();
        if let Some(ext) = path.extension() {
            if ext == "json" || ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        let schema = load_schema_file(&p)?;
        debug!(id = schema.id(), path = %p.display(), "loaded schema");
        if reg.insert(schema).is_some() {
            anyhow::bail!("duplicate device class id in {}", p.display());
        }
    }
    Ok(reg)
}
