//! JSON File Store
//!
//! `KeyValueStore` persisted as a single JSON object on disk. Every write
//! rewrites the file through a temporary sibling and a rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use picaso_core::store::{KeyValueStore, StoreError, StoreResult};

pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty when the file does not exist yet
    ///
    /// An unparseable file is moved aside to `*.corrupt` and the store starts
    /// empty, so a damaged state file never keeps the server from starting.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: HashMap<String, String> = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    quarantine(&path, &e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Unavailable(e.to_string())),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened state file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> StoreResult<()> {
        let encoded = serde_json::to_string_pretty(entries).map_err(|e| StoreError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Move an unreadable state file out of the way, keeping it for inspection
fn quarantine(path: &Path, error: &serde_json::Error) {
    let aside = path.with_extension("json.corrupt");
    match std::fs::rename(path, &aside) {
        Ok(()) => tracing::warn!(
            path = %path.display(),
            moved_to = %aside.display(),
            error = %error,
            "State file unreadable, starting empty"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %error,
            rename_error = %e,
            "State file unreadable and could not be moved aside, starting empty"
        ),
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}
