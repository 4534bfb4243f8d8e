//! File-backed lock entry storage
//!
//! Entries live in one JSON document. The whole map is cached behind a
//! lock; every mutation is applied to a copy, written to disk, and only
//! then swapped into the cache, so a failed write leaves both unchanged.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info};

use warden_core::{EntryMap, EntryStore, Error, LockEntry, ScreenKey};

use crate::persist::write_private;

const FORMAT_VERSION: u32 = 1;

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    entries: Vec<LockEntry>,
}

/// [`EntryStore`] persisted as a JSON file
#[derive(Debug)]
pub struct JsonEntryStore {
    path: PathBuf,
    entries: RwLock<EntryMap>,
}

impl JsonEntryStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            Self::load(&path)?
        } else {
            EntryMap::new()
        };
        info!("Entry store at {:?} ({} entries)", path, entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// File backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> crate::Result<EntryMap> {
        let content = std::fs::read_to_string(path)?;
        let document: StoreDocument = serde_json::from_str(&content)?;
        if document.version != FORMAT_VERSION {
            return Err(crate::DaemonError::Config(format!(
                "unsupported entry store version {}",
                document.version
            )));
        }
        Ok(EntryMap::from_entries(document.entries)?)
    }

    fn persist(&self, map: &EntryMap) -> warden_core::Result<()> {
        let document = StoreDocument {
            version: FORMAT_VERSION,
            entries: map.to_entries(),
        };
        let content = serde_json::to_vec_pretty(&document)?;
        write_private(&self.path, &content).map_err(|e| {
            error!("Failed to write entry store {:?}: {}", self.path, e);
            Error::Store(format!("write {:?}: {}", self.path, e))
        })
    }

    fn read(&self) -> warden_core::Result<RwLockReadGuard<'_, EntryMap>> {
        self.entries
            .read()
            .map_err(|_| Error::Store("entry cache lock poisoned".to_string()))
    }

    fn write(&self) -> warden_core::Result<RwLockWriteGuard<'_, EntryMap>> {
        self.entries
            .write()
            .map_err(|_| Error::Store("entry cache lock poisoned".to_string()))
    }

    fn mutate<F>(&self, change: F) -> warden_core::Result<()>
    where
        F: FnOnce(&mut EntryMap) -> warden_core::Result<()>,
    {
        let mut cached = self.write()?;
        let mut next = cached.clone();
        change(&mut next)?;
        self.persist(&next)?;
        *cached = next;
        Ok(())
    }

    fn update<F>(&self, key: &ScreenKey, change: F) -> warden_core::Result<()>
    where
        F: FnOnce(&mut LockEntry),
    {
        self.mutate(|map| map.update(key, change))
    }
}

impl EntryStore for JsonEntryStore {
    fn find_exact(&self, key: &ScreenKey) -> warden_core::Result<Option<LockEntry>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn insert(&self, entry: LockEntry) -> warden_core::Result<()> {
        debug!("Inserting {}", entry.key);
        self.mutate(|map| map.insert(entry))
    }

    fn replace(&self, entry: LockEntry) -> warden_core::Result<()> {
        debug!("Replacing {}", entry.key);
        self.mutate(|map| map.replace(entry))
    }

    fn update_whitelist(&self, key: &ScreenKey, whitelisted: bool) -> warden_core::Result<()> {
        self.update(key, |e| e.whitelisted = whitelisted)
    }

    fn update_lock_until(&self, key: &ScreenKey, lock_until: u64) -> warden_core::Result<()> {
        self.update(key, |e| e.lock_until = lock_until)
    }

    fn update_ignore_until(&self, key: &ScreenKey, ignore_until: u64) -> warden_core::Result<()> {
        self.update(key, |e| e.ignore_until = ignore_until)
    }

    fn delete(&self, key: &ScreenKey) -> warden_core::Result<()> {
        debug!("Deleting {}", key);
        self.mutate(|map| map.remove(key).map(|_| ()))
    }

    fn query_all(&self) -> warden_core::Result<Vec<LockEntry>> {
        Ok(self.read()?.to_entries())
    }
}
