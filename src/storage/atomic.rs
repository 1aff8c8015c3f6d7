//! Atomic JSON file writes and corrupt-file recovery (spec §4.2, §6).
//!
//! Every JSON file in the data directory is written by serializing to
//! `<path>.tmp` and renaming over `<path>`; a reader never observes a
//! truncated write because the rename is atomic at the filesystem level. On
//! read, a parse failure is recovered by moving the unreadable file aside to
//! `<path>.corrupt.<unix_epoch>` and returning the caller's fallback value
//! rather than propagating the error.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

/// Write `value` to `path` via a temp-file-then-rename so readers never see
/// a partial write.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path_for(path);
    let serialized = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&tmp_path, serialized)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    std::path::PathBuf::from(os_string)
}

/// Read and parse a JSON file at `path`, falling back to `fallback()` when
/// the file is absent. If the file exists but fails to parse, it is moved
/// aside to `<path>.corrupt.<epoch>` and `fallback()` is returned.
pub fn read_json_or_recover<T, F>(path: &Path, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return fallback(),
    };

    match serde_json::from_str::<T>(&contents) {
        Ok(value) => value,
        Err(e) => {
            warn!("corrupt json file at {:?}: {} — quarantining", path, e);
            quarantine(path);
            fallback()
        }
    }
}

/// Like [`read_json_or_recover`] but for single-record files that may
/// legitimately not exist yet (no record for this id).
pub fn read_json_optional<T>(path: &Path) -> Option<T>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return None;
    }
    let contents = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<T>(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("corrupt json file at {:?}: {} — quarantining", path, e);
            quarantine(path);
            None
        }
    }
}

fn quarantine(path: &Path) {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(format!(".corrupt.{epoch}"));
    let corrupt_path = std::path::PathBuf::from(os_string);
    if let Err(e) = fs::rename(path, &corrupt_path) {
        error!("failed to quarantine corrupt file {:?}: {}", path, e);
    }
}
