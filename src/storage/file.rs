use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{KeyValueStore, Namespace, StoredValue};

/// One TOML file per namespace, replaced atomically on every write.
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles from the worker and CLI commands.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{namespace}.toml"))
    }

    fn read_namespace(&self, namespace: &str) -> Result<Namespace> {
        let path = self.namespace_path(namespace);
        if !path.exists() {
            return Ok(Namespace::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Corrupt state file {}", path.display()))
    }

    fn write_namespace(&self, namespace: &str, entries: &Namespace) -> Result<()> {
        let path = self.namespace_path(namespace);
        if entries.is_empty() {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            return Ok(());
        }

        let content = toml::to_string(entries).context("Failed to serialize state")?;
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary state file")?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn modify<F>(&self, namespace: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut Namespace),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("state store lock poisoned"))?;
        let mut entries = self.read_namespace(namespace)?;
        change(&mut entries);
        self.write_namespace(namespace, &entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredValue>> {
        Ok(self.read_namespace(namespace)?.remove(key))
    }

    fn put(&self, namespace: &str, key: &str, value: StoredValue) -> Result<()> {
        self.modify(namespace, |entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        self.modify(namespace, |entries| {
            entries.remove(key);
        })
    }

    fn entries(&self, namespace: &str) -> Result<Namespace> {
        self.read_namespace(namespace)
    }

    fn replace_namespace(&self, namespace: &str, entries: Namespace) -> Result<()> {
        self.modify(namespace, |current| *current = entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_values_survive_reopen() {
        let temp = tempdir().unwrap();
        {
            let store = FileStore::open(temp.path()).unwrap();
            store.put("location", "lat", StoredValue::Float(32.08)).unwrap();
            store.put("location", "tz", StoredValue::Integer(2)).unwrap();
            store
                .put("discovery", "server", StoredValue::from("api.example.com"))
                .unwrap();
        }

        let store = FileStore::open(temp.path()).unwrap();
        assert_eq!(store.get_f64("location", "lat").unwrap(), Some(32.08));
        assert_eq!(store.get_i64("location", "tz").unwrap(), Some(2));
        assert_eq!(
            store.get_string("discovery", "server").unwrap().as_deref(),
            Some("api.example.com")
        );
    }

    #[test]
    fn test_clear_namespace_removes_file() {
        let temp = tempdir().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        store.put("wifi_fp", "count", StoredValue::Integer(1)).unwrap();
        assert!(temp.path().join("wifi_fp.toml").exists());

        store.clear_namespace("wifi_fp").unwrap();
        assert!(!temp.path().join("wifi_fp.toml").exists());
        assert!(store.entries("wifi_fp").unwrap().is_empty());
    }

    #[test]
    fn test_replace_namespace_drops_old_keys() {
        let temp = tempdir().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        store.put("wifi_fp", "n3", StoredValue::from("old")).unwrap();

        let mut fresh = Namespace::new();
        fresh.insert("count".to_string(), StoredValue::Integer(1));
        fresh.insert("n0".to_string(), StoredValue::from("Cafe"));
        store.replace_namespace("wifi_fp", fresh).unwrap();

        assert_eq!(store.get("wifi_fp", "n3").unwrap(), None);
        assert_eq!(store.get_i64("wifi_fp", "count").unwrap(), Some(1));
    }
}
