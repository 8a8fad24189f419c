//! Atomic JSON file writes.
//!
//! Every file lands via temp-sibling + fsync + rename, so readers observe
//! either the complete old file or the complete new one. Content is
//! addressed by its hash, so an already-present destination is left
//! untouched.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use bb_error::{PoolError, Result};
use serde::Serialize;
use tracing::debug;

/// Temp-file write attempts beyond the first.
const WRITE_RETRIES: u32 = 2;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `value` as pretty-printed JSON to `path`, atomically.
///
/// Parent directories are created as needed. If `path` already exists the
/// write is skipped: the layout is content-addressed, so an existing file
/// already holds these bytes. Transient I/O failures while writing the
/// temp file are retried at most [`WRITE_RETRIES`] times before the error
/// propagates.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "content-addressed file already present, skipping write");
        return Ok(());
    }

    let parent = path
        .parent()
        .ok_or_else(|| PoolError::Io(std::io::Error::other("path has no parent directory")))?;
    fs::create_dir_all(parent)?;

    let mut text = serde_json::to_string_pretty(value)
        .map_err(|err| PoolError::Io(std::io::Error::other(err)))?;
    text.push('\n');

    let mut last_err = None;
    for attempt in 0..=WRITE_RETRIES {
        let temp = temp_sibling(path);
        match write_temp(&temp, text.as_bytes()) {
            Ok(()) => {
                fs::rename(&temp, path)?;
                sync_dir(parent);
                debug!(path = %path.display(), attempt, "atomic write committed");
                return Ok(());
            }
            Err(err) => {
                let _ = fs::remove_file(&temp);
                debug!(path = %path.display(), attempt, error = %err, "temp write failed");
                last_err = Some(err);
            }
        }
    }
    Err(PoolError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::other("temp write failed with no recorded error")
    })))
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_owned());
    let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{file_name}.{}.{unique}.tmp",
        process::id()
    ))
}

fn write_temp(temp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Best-effort directory sync so the rename itself is durable.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}
