use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{KeyValueStore, Namespace, StoredValue};

/// Volatile store for tests and `--simulate` runs.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, Namespace>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, Namespace>) -> R) -> Result<R> {
        let mut guard = self
            .namespaces
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredValue>> {
        self.with(|all| all.get(namespace).and_then(|ns| ns.get(key).cloned()))
    }

    fn put(&self, namespace: &str, key: &str, value: StoredValue) -> Result<()> {
        self.with(|all| {
            all.entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value);
        })
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        self.with(|all| {
            if let Some(ns) = all.get_mut(namespace) {
                ns.remove(key);
            }
        })
    }

    fn entries(&self, namespace: &str) -> Result<Namespace> {
        self.with(|all| all.get(namespace).cloned().unwrap_or_default())
    }

    fn replace_namespace(&self, namespace: &str, entries: Namespace) -> Result<()> {
        self.with(|all| {
            all.insert(namespace.to_string(), entries);
        })
    }
}
