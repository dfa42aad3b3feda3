//! One-shot CLI commands that inspect or modify persisted state.

pub mod discover;
pub mod status;
pub mod wipe;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::io::lock::{InstanceLock, acquire_lock, get_lock_path, read_lock_pid};
use crate::storage::{FileStore, SharedStore};

/// Open the configured state directory.
pub(crate) fn open_store(config: &Config) -> Result<SharedStore> {
    let store = FileStore::open(config.storage_dir()).context("Failed to open state directory")?;
    Ok(Arc::new(store))
}

/// Take the instance lock so a command never writes under a running daemon.
pub(crate) fn lock_or_report() -> Result<Option<InstanceLock>> {
    let path = get_lock_path();
    let lock = acquire_lock(&path)?;
    if lock.is_none() {
        log_pipe!();
        match read_lock_pid(&path) {
            Some(pid) => log_error!("lamplink is running (PID: {pid})"),
            None => log_error!("lamplink is running"),
        }
        log_indented!("Stop the daemon first");
        log_end!();
    }
    Ok(lock)
}
