//! `lamplink wipe`: clear every persisted namespace.
//!
//! Used before shipping a device or handing it to a new owner. Afterwards the
//! next boot runs first setup.

use anyhow::{Context, Result};

use crate::common::constants::ALL_NAMESPACES;
use crate::config::Config;
use crate::storage::KeyValueStore;

/// Clear all namespaces. Returns how many held data.
pub fn wipe_store(store: &dyn KeyValueStore) -> Result<usize> {
    let mut cleared = 0;
    for namespace in ALL_NAMESPACES {
        let had_data = !store.entries(namespace)?.is_empty();
        store
            .clear_namespace(namespace)
            .with_context(|| format!("Failed to clear namespace '{namespace}'"))?;
        if had_data {
            log_indented!("Cleared {}", namespace);
            cleared += 1;
        }
    }
    Ok(cleared)
}

pub fn handle_wipe_command(config: &Config, confirmed: bool) -> Result<()> {
    if !confirmed {
        log_pipe!();
        log_warning!("This erases stored WiFi credentials, fingerprint, server and location");
        log_indented!("Run 'lamplink wipe --yes' to confirm");
        log_end!();
        return Ok(());
    }

    let Some(_lock) = super::lock_or_report()? else {
        return Ok(());
    };

    let store = super::open_store(config)?;
    log_block_start!("Wiping persisted state");
    let cleared = wipe_store(store.as_ref())?;
    if cleared == 0 {
        log_indented!("Nothing to clear");
    }
    log_end!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::{NS_DISCOVERY, NS_FINGERPRINT};
    use crate::storage::{FileStore, StoredValue};
    use tempfile::tempdir;

    #[test]
    fn test_wipe_clears_every_namespace() {
        crate::logger::Log::set_enabled(false);
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .put(NS_FINGERPRINT, "count", StoredValue::Integer(2))
            .unwrap();
        store
            .put(NS_DISCOVERY, "server", StoredValue::from("api.example.com"))
            .unwrap();

        assert_eq!(wipe_store(&store).unwrap(), 2);
        for namespace in ALL_NAMESPACES {
            assert!(store.entries(namespace).unwrap().is_empty());
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.entries(NS_DISCOVERY).unwrap().is_empty());
        assert_eq!(wipe_store(&reopened).unwrap(), 0);
    }
}
