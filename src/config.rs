//! Provider configuration bags: one `<provider>.json` file per provider
//! under the configuration directory, holding flat string key-value pairs
//! (API base URL, credentials).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Default)]
pub struct ProviderProperties {
    values: HashMap<String, String>,
}

impl ProviderProperties {
    pub fn load(config_dir: &Path, provider: &str) -> Result<Self> {
        let path = config_dir.join(format!("{provider}.json"));
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading provider configuration {}", path.display()))?;
        let values = serde_json::from_str(&raw)
            .with_context(|| format!("parsing provider configuration {}", path.display()))?;
        Ok(Self { values })
    }

    pub fn from_pairs<const N: usize>(pairs: [(&str, &str); N]) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| anyhow!("missing configuration key '{key}'"))
    }
}
