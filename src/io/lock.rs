//! Lock file management for single-instance enforcement.
//!
//! Two daemons sharing one state directory would race on the persisted
//! fingerprint and discovery cache, so only one may run at a time. The lock is
//! an advisory `fs2` exclusive lock; the kernel releases it when the holder
//! exits, so a crashed instance never leaves a stale lock behind.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::constants::LOCK_FILE_NAME;
use crate::common::utils::private_path;

/// Held for the lifetime of the daemon. Dropping it releases the lock.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// `XDG_RUNTIME_DIR/lamplink.lock`, or `/tmp/lamplink.lock`.
pub fn get_lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// Try to take the instance lock at `lock_path`.
///
/// Returns `Ok(None)` when another process holds it.
pub fn acquire_lock(lock_path: &Path) -> Result<Option<InstanceLock>> {
    // Without truncation so a running holder's PID survives a failed attempt.
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {}", private_path(lock_path)))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(&file, "{}", std::process::id())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        file,
        path: lock_path.to_path_buf(),
    }))
}

/// PID recorded by the current holder, if readable.
pub fn read_lock_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}
