//! JSON file persistence
//!
//! Every store is a pretty-printed JSON array on disk. Writes go through a
//! temp file in the same directory followed by a rename, so a crash leaves
//! either the old file or the new one, never a torn mix.

use crate::storage::{StorageError, StorageResult};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Reads and parses a JSON file
///
/// # Returns
///
/// * `Ok(Some(T))` - File exists and parsed
/// * `Ok(None)` - File does not exist
/// * `Err(StorageError)` - File could not be read or parsed
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads an output store, falling back to an empty one
///
/// Output stores are never fatal at load time. A missing file is simply a
/// fresh store. An unreadable or unparseable file is reported loudly and,
/// when `backup_corrupt` is set, copied aside to `<file>.corrupt-<timestamp>`
/// before the next commit overwrites it.
pub fn load_or_default<T>(path: &Path, label: &str, backup_corrupt: bool) -> T
where
    T: DeserializeOwned + Default,
{
    match read_json::<T>(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::info!("No {} found at {}, starting empty", label, path.display());
            T::default()
        }
        Err(e) => {
            tracing::warn!(
                "{} is unusable and will be treated as EMPTY: {}",
                label,
                e
            );
            if backup_corrupt {
                match backup_file(path) {
                    Ok(backup) => tracing::warn!(
                        "Copied unusable {} to {} before it can be overwritten",
                        label,
                        backup.display()
                    ),
                    Err(e) => tracing::error!(
                        "Could not back up unusable {} ({}); its content will be lost at the next commit",
                        label,
                        e
                    ),
                }
            } else {
                tracing::warn!(
                    "backup-corrupt is disabled; the next commit overwrites {}",
                    path.display()
                );
            }
            T::default()
        }
    }
}

/// Copies `path` to `<path>.corrupt-<UTC timestamp>`
pub fn backup_file(path: &Path) -> StorageResult<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let backup = PathBuf::from(format!("{}.corrupt-{}", path.display(), stamp));
    fs::copy(path, &backup).map_err(|source| StorageError::Write {
        path: backup.clone(),
        source,
    })?;
    Ok(backup)
}

/// Serializes `value` and atomically replaces `path` with it
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');

    let write_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = parent_dir(path);
    fs::create_dir_all(parent).map_err(write_err)?;

    let tmp_path = temp_path(path);
    {
        let mut file = File::create(&tmp_path).map_err(write_err)?;
        file.write_all(&bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(write_err(e));
    }

    sync_parent_directory(parent).map_err(write_err)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn sync_parent_directory(parent: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        File::open(parent)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = parent;
    }
    Ok(())
}
