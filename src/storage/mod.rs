//! Persistent key-value storage, grouped by namespace.
//!
//! Every component that remembers something across restarts (fingerprint,
//! discovery cache, location, stored credentials) talks to a
//! [`KeyValueStore`]. The host build keeps one TOML file per namespace in
//! `XDG_STATE_HOME/lamplink`; tests use the in-memory store.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::constants::APP_DIR_NAME;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A single stored scalar.
///
/// Integers are listed before floats so whole numbers read back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl StoredValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StoredValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoredValue::Float(value) => Some(*value),
            StoredValue::Integer(value) => Some(*value as f64),
            StoredValue::Text(_) => None,
        }
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::Text(value.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::Text(value)
    }
}

impl From<i64> for StoredValue {
    fn from(value: i64) -> Self {
        StoredValue::Integer(value)
    }
}

impl From<f64> for StoredValue {
    fn from(value: f64) -> Self {
        StoredValue::Float(value)
    }
}

pub type Namespace = BTreeMap<String, StoredValue>;

/// Namespaced key-value persistence.
///
/// Implementations must make each write durable before returning and must
/// never leave a namespace half-written.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredValue>>;

    fn put(&self, namespace: &str, key: &str, value: StoredValue) -> Result<()>;

    fn remove(&self, namespace: &str, key: &str) -> Result<()>;

    /// Every key in the namespace. Missing namespaces read as empty.
    fn entries(&self, namespace: &str) -> Result<Namespace>;

    /// Replace the whole namespace in one write.
    fn replace_namespace(&self, namespace: &str, entries: Namespace) -> Result<()>;

    fn clear_namespace(&self, namespace: &str) -> Result<()> {
        self.replace_namespace(namespace, Namespace::new())
    }

    fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(namespace, key)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    fn get_i64(&self, namespace: &str, key: &str) -> Result<Option<i64>> {
        Ok(self.get(namespace, key)?.and_then(|v| v.as_i64()))
    }

    fn get_f64(&self, namespace: &str, key: &str) -> Result<Option<f64>> {
        Ok(self.get(namespace, key)?.and_then(|v| v.as_f64()))
    }
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Directory holding persisted state.
///
/// `XDG_STATE_HOME/lamplink`, falling back to `~/.local/state/lamplink`.
pub fn get_state_dir() -> PathBuf {
    let state_home = std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local/state")
        });
    state_home.join(APP_DIR_NAME)
}

/// Resolve the configured storage directory, expanding a leading `~/`.
pub fn resolve_state_dir(configured: Option<&str>) -> PathBuf {
    match configured {
        Some(dir) => {
            if let Some(rest) = dir.strip_prefix("~/")
                && let Some(home) = dirs::home_dir()
            {
                return home.join(rest);
            }
            Path::new(dir).to_path_buf()
        }
        None => get_state_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_stored_value_conversions() {
        assert_eq!(StoredValue::from(3_i64).as_f64(), Some(3.0));
        assert_eq!(StoredValue::from("a").as_i64(), None);
        assert_eq!(StoredValue::from(1.5).as_str(), None);
    }

    #[test]
    #[serial]
    fn test_state_dir_respects_xdg() {
        let original = std::env::var("XDG_STATE_HOME").ok();
        unsafe {
            std::env::set_var("XDG_STATE_HOME", "/var/tmp/state");
        }
        assert_eq!(get_state_dir(), PathBuf::from("/var/tmp/state/lamplink"));
        unsafe {
            match original {
                Some(value) => std::env::set_var("XDG_STATE_HOME", value),
                None => std::env::remove_var("XDG_STATE_HOME"),
            }
        }
    }

    #[test]
    fn test_resolve_explicit_dir() {
        assert_eq!(
            resolve_state_dir(Some("/opt/lamp")),
            PathBuf::from("/opt/lamp")
        );
    }
}
