//! Lock entry storage
//!
//! [`EntryStore`] is the persistence contract the engine consumes. Every
//! implementation must keep at most one entry per key and must refuse to
//! store a whitelisted whole-app entry.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entry::LockEntry;
use crate::error::{Error, Result};
use crate::types::ScreenKey;

/// Persistent store of lock entries keyed by (package, screen)
pub trait EntryStore: Send + Sync {
    /// Entry for exactly this key
    fn find_exact(&self, key: &ScreenKey) -> Result<Option<LockEntry>>;

    /// Whole-app entry for a package
    fn find_whole_app(&self, package: &str) -> Result<Option<LockEntry>> {
        self.find_exact(&ScreenKey::whole_app(package))
    }

    /// Add a new entry; fails if the key already has one
    fn insert(&self, entry: LockEntry) -> Result<()>;

    /// Overwrite an existing entry in a single write
    fn replace(&self, entry: LockEntry) -> Result<()>;

    /// Set the whitelist flag of an existing entry
    fn update_whitelist(&self, key: &ScreenKey, whitelisted: bool) -> Result<()>;

    /// Set the lockout deadline of an existing entry
    fn update_lock_until(&self, key: &ScreenKey, lock_until: u64) -> Result<()>;

    /// Set the grace-window deadline of an existing entry
    fn update_ignore_until(&self, key: &ScreenKey, ignore_until: u64) -> Result<()>;

    /// Remove an existing entry
    fn delete(&self, key: &ScreenKey) -> Result<()>;

    /// Every entry, ordered by key
    fn query_all(&self) -> Result<Vec<LockEntry>>;
}

/// Validated sorted map of entries shared by the store implementations
#[derive(Debug, Clone, Default)]
pub struct EntryMap {
    entries: BTreeMap<ScreenKey, LockEntry>,
}

impl EntryMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted list, rejecting duplicates and invalid entries
    ///
    /// A whitelisted whole-app entry in existing data is reported as
    /// [`Error::InvariantViolation`].
    pub fn from_entries(entries: Vec<LockEntry>) -> Result<Self> {
        let mut map = Self::new();
        for entry in entries {
            map.insert(entry).map_err(|e| match e {
                Error::WholeAppWhitelist { package } => Error::InvariantViolation { package },
                other => other,
            })?;
        }
        Ok(map)
    }

    /// Entries in key order
    pub fn to_entries(&self) -> Vec<LockEntry> {
        self.entries.values().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key
    pub fn get(&self, key: &ScreenKey) -> Option<&LockEntry> {
        self.entries.get(key)
    }

    /// Insert a new entry
    pub fn insert(&mut self, entry: LockEntry) -> Result<()> {
        entry.validate()?;
        if self.entries.contains_key(&entry.key) {
            return Err(Error::DuplicateEntry(entry.key.to_string()));
        }
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Apply `change` to an existing entry; the result must still validate
    pub fn update<F>(&mut self, key: &ScreenKey, change: F) -> Result<()>
    where
        F: FnOnce(&mut LockEntry),
    {
        let current = self
            .entries
            .get(key)
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))?;
        let mut updated = current.clone();
        change(&mut updated);
        updated.validate()?;
        self.entries.insert(key.clone(), updated);
        Ok(())
    }

    /// Overwrite an existing entry with `entry`
    pub fn replace(&mut self, entry: LockEntry) -> Result<()> {
        let key = entry.key.clone();
        self.update(&key, move |current| *current = entry)
    }

    /// Remove an existing entry
    pub fn remove(&mut self, key: &ScreenKey) -> Result<LockEntry> {
        self.entries
            .remove(key)
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))
    }
}

/// In-memory [`EntryStore`]
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: RwLock<EntryMap>,
}

impl MemoryEntryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with entries
    pub fn with_entries(entries: Vec<LockEntry>) -> Result<Self> {
        Ok(Self {
            entries: RwLock::new(EntryMap::from_entries(entries)?),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EntryMap>> {
        self.entries
            .read()
            .map_err(|_| Error::Store("entry map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EntryMap>> {
        self.entries
            .write()
            .map_err(|_| Error::Store("entry map lock poisoned".to_string()))
    }
}

impl EntryStore for MemoryEntryStore {
    fn find_exact(&self, key: &ScreenKey) -> Result<Option<LockEntry>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn insert(&self, entry: LockEntry) -> Result<()> {
        self.write()?.insert(entry)
    }

    fn replace(&self, entry: LockEntry) -> Result<()> {
        self.write()?.replace(entry)
    }

    fn update_whitelist(&self, key: &ScreenKey, whitelisted: bool) -> Result<()> {
        self.write()?.update(key, |e| e.whitelisted = whitelisted)
    }

    fn update_lock_until(&self, key: &ScreenKey, lock_until: u64) -> Result<()> {
        self.write()?.update(key, |e| e.lock_until = lock_until)
    }

    fn update_ignore_until(&self, key: &ScreenKey, ignore_until: u64) -> Result<()> {
        self.write()?.update(key, |e| e.ignore_until = ignore_until)
    }

    fn delete(&self, key: &ScreenKey) -> Result<()> {
        self.write()?.remove(key).map(|_| ())
    }

    fn query_all(&self) -> Result<Vec<LockEntry>> {
        Ok(self.read()?.to_entries())
    }
}
