use crate::{PublishError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENV_API_URL: &str = "HYPER_API_URL";
pub const ENV_API_KEY: &str = "HYPER_API_KEY";
pub const ENV_SITE_ID: &str = "HYPER_SITE_ID";

fn default_timeout_secs() -> u64 {
    10
}

/// Where and as whom envelopes are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub api_url: String,
    pub api_key: String,
    pub site_id: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Partially specified config as read from a file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    api_url: Option<String>,
    api_key: Option<String>,
    site_id: Option<u64>,
    timeout_secs: Option<u64>,
}

impl PlatformConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, site_id: u64) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            site_id,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Read an optional JSON file, then apply `HYPER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`PlatformConfig::load`] with an explicit variable lookup.
    pub fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut raw = match path {
            Some(p) => {
                let contents = fs::read_to_string(p)
                    .map_err(|e| PublishError::Config(format!("reading {}: {e}", p.display())))?;
                serde_json::from_str::<RawConfig>(&contents)
                    .map_err(|e| PublishError::Config(format!("parsing {}: {e}", p.display())))?
            }
            None => RawConfig::default(),
        };
        if let Some(url) = env(ENV_API_URL) {
            raw.api_url = Some(url);
        }
        if let Some(key) = env(ENV_API_KEY) {
            raw.api_key = Some(key);
        }
        if let Some(site) = env(ENV_SITE_ID) {
            let id = site.trim().parse().map_err(|_| {
                PublishError::Config(format!("{ENV_SITE_ID} must be an integer, got `{site}`"))
            })?;
            raw.site_id = Some(id);
        }

        let missing = |what: &str| PublishError::Config(format!("missing {what}"));
        let config = Self {
            api_url: raw.api_url.ok_or_else(|| missing("api_url"))?,
            api_key: raw.api_key.ok_or_else(|| missing("api_key"))?,
            site_id: raw.site_id.ok_or_else(|| missing("site_id"))?,
            timeout_secs: raw.timeout_secs.unwrap_or_else(default_timeout_secs),
        };
        if config.api_url.trim().is_empty() {
            return Err(missing("api_url"));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Incoming-messages endpoint for this site.
    pub fn incoming_url(&self) -> String {
        let base = self.api_url.strip_suffix('/').unwrap_or(&self.api_url);
        format!("{base}/sites/{}/device_messages/v3/incoming", self.site_id)
    }
}
