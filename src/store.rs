//! JSON key/value file used for client-side state (analytics, rate-limit windows).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

pub const ANALYTICS_KEY: &str = "qr_analytics";
pub const RATE_LIMITS_KEY: &str = "qr_rate_limits";

/// A small persistent map of JSON values, saved as one pretty-printed file.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl LocalStore {
    /// An unbacked store; `save` is a no-op.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store at `path`. A missing file yields an empty store; a corrupt one is
    /// logged and replaced on the next save.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding unreadable store");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "loaded local store");
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads `key`, returning `None` when absent or of the wrong shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "ignoring malformed store entry");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.values)?)?;
        debug!(path = %path.display(), "saved local store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(store.keys().count(), 0);
    }

    #[test]
    fn test_set_save_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let mut store = LocalStore::load(&path).unwrap();
        store.set("counts", &vec![1u32, 2, 3]).unwrap();
        store.save().unwrap();

        let reloaded = LocalStore::load(&path).unwrap();
        assert_eq!(reloaded.get::<Vec<u32>>("counts"), Some(vec![1, 2, 3]));
        assert_eq!(reloaded.get::<String>("counts"), None);
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        let store = LocalStore::load(&path).unwrap();
        assert_eq!(store.keys().count(), 0);
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut store = LocalStore::in_memory();
        store.set("k", &true).unwrap();
        assert!(store.save().is_ok());
        assert!(store.remove("k"));
        assert!(!store.remove("k"));
    }
}
