//! Local persistence of the snapshot.
//!
//! State lives under a single key, [`STORAGE_KEY`], holding the snapshot
//! JSON. Loading shallow-merges the saved top-level keys over the defaults,
//! so a file written by an older build still yields every collection.

use crate::error::PersistenceError;
use lounge_engine::{Backup, Millis, Snapshot};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Key of the persisted snapshot.
pub const STORAGE_KEY: &str = "lounge-data";

/// Somewhere the agent keeps its snapshot between runs.
pub trait LocalPersistence: Send + Sync {
    /// Raw saved value, if anything was saved.
    fn load_raw(&self) -> Result<Option<Value>, PersistenceError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    /// Saved state laid over `defaults`, or `defaults` when nothing is saved.
    fn load(&self, defaults: &Snapshot) -> Result<Snapshot, PersistenceError> {
        match self.load_raw()? {
            Some(saved) => Ok(Snapshot::load_over(defaults, saved)?),
            None => Ok(defaults.clone()),
        }
    }
}

/// Snapshot stored as `<dir>/lounge-data.json`.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalPersistence for FilePersistence {
    fn load_raw(&self) -> Result<Option<Value>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(None),
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, snapshot.to_json()?)?;
        fs::rename(&tmp, &self.path)?;
        tracing::trace!(path = %self.path.display(), "snapshot saved");
        Ok(())
    }
}

/// In-memory persistence. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed with raw JSON, as if an earlier run had saved it.
    pub fn with_saved(json: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(json.into()))),
        }
    }

    /// Last saved JSON text.
    pub fn saved(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LocalPersistence for MemoryPersistence {
    fn load_raw(&self) -> Result<Option<Value>, PersistenceError> {
        match self.saved() {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let json = snapshot.to_json()?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }
}

/// Write `snapshot` as a backup file at `path`.
pub fn export_backup(
    snapshot: &Snapshot,
    path: impl AsRef<Path>,
    now: Millis,
) -> Result<Backup, PersistenceError> {
    let backup = Backup::new(snapshot.clone(), now);
    fs::write(path.as_ref(), backup.to_json_pretty()?)?;
    tracing::info!(path = %path.as_ref().display(), records = snapshot.record_count(), "backup exported");
    Ok(backup)
}

/// Read a backup file. Bare snapshot files are accepted too.
pub fn import_backup(path: impl AsRef<Path>) -> Result<Backup, PersistenceError> {
    let text = fs::read_to_string(path.as_ref())?;
    Ok(Backup::from_json(&text)?)
}
