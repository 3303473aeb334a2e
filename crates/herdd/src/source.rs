//! File-backed data source used as the group loader

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use herdcache::Loader;
use serde_json::Value;
use tracing::{debug, info};

/// Key/value pairs read from a JSON object file.
///
/// Stands in for a slow backing database: every call is logged, and missing
/// keys are loader errors.
#[derive(Debug, Default)]
pub struct JsonSource {
    values: HashMap<String, Vec<u8>>,
}

impl JsonSource {
    /// Read `{"key": value, ...}` from `path`.
    ///
    /// String values are stored as their UTF-8 bytes, anything else as its
    /// JSON text.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let object: serde_json::Map<String, Value> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON object", path.display()))?;

        let values = object
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(s) => (key, s.into_bytes()),
                other => (key, other.to_string().into_bytes()),
            })
            .collect::<HashMap<_, _>>();

        info!(path = %path.display(), keys = values.len(), "loaded data source");
        Ok(Self { values })
    }

    /// Small built-in data set for trying a node out
    pub fn demo() -> Self {
        let values = [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl Loader for JsonSource {
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        debug!(key, "slow source lookup");
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("{key} not exist"))
    }
}
