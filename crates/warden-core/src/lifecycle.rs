//! Lock entry lifecycle
//!
//! Toggles move a key between Default (no entry), Locked and Whitelisted.
//! Each toggle is a single upsert performed under the manager's write guard,
//! so the existence check and the write can never interleave with another
//! toggle or post-unlock update.
//!
//! | existing | desired     | action                       |
//! |----------|-------------|------------------------------|
//! | none     | Whitelisted | create entry (whitelisted)   |
//! | none     | Locked      | create entry (locked)        |
//! | none     | Default     | no-op                        |
//! | present  | Whitelisted | set whitelisted              |
//! | present  | Locked      | clear whitelisted            |
//! | present  | Default     | delete entry                 |

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::entry::LockEntry;
use crate::error::{Error, Result};
use crate::platform::PackageInspector;
use crate::prefs::Preferences;
use crate::scheduler::RecheckScheduler;
use crate::store::EntryStore;
use crate::types::{LockState, ScreenKey};
use crate::{IGNORE_PAD_MILLIS, MILLIS_PER_MINUTE};

/// What a toggle did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// A new entry was written
    Created,
    /// The whitelist flag of an existing entry changed
    Updated,
    /// The entry was removed
    Deleted,
    /// The store already matched the desired state
    Unchanged,
}

/// Caller's choice after a successful unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// "Don't ask again" for this screen
    pub exclude: bool,
    /// Grace window length, falling back to the preference
    pub ignore_minutes: Option<u64>,
}

/// Side effect applied after a successful unlock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockOutcome {
    /// The screen was whitelisted
    Excluded { key: ScreenKey },
    /// Challenges are suppressed until `ignore_until`
    Ignoring {
        key: ScreenKey,
        ignore_until: u64,
        recheck_at: Option<u64>,
    },
}

/// Entry with presentation data for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryView {
    /// The stored entry
    pub entry: LockEntry,
    /// Application label
    pub label: String,
    /// Logical state
    pub state: LockState,
}

/// Applies lock state transitions and post-unlock effects
pub struct LifecycleManager {
    store: Arc<dyn EntryStore>,
    inspector: Arc<dyn PackageInspector>,
    recheck: Arc<RecheckScheduler>,
    clock: Arc<dyn Clock>,
    write_guard: Mutex<()>,
}

impl LifecycleManager {
    /// Create a lifecycle manager
    pub fn new(
        store: Arc<dyn EntryStore>,
        inspector: Arc<dyn PackageInspector>,
        recheck: Arc<RecheckScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            inspector,
            recheck,
            clock,
            write_guard: Mutex::new(()),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_guard
            .lock()
            .map_err(|_| Error::Store("lifecycle write guard poisoned".to_string()))
    }

    /// Current state of exactly `key`
    pub fn state_of(&self, key: &ScreenKey) -> Result<LockState> {
        Ok(self
            .store
            .find_exact(key)?
            .map(|e| e.state())
            .unwrap_or_default())
    }

    /// Move `key` to `desired`, creating, updating or deleting its entry
    pub fn set_state(&self, key: &ScreenKey, desired: LockState) -> Result<Transition> {
        if key.is_whole_app() && desired == LockState::Whitelisted {
            return Err(Error::WholeAppWhitelist {
                package: key.package.clone(),
            });
        }

        let _guard = self.guard()?;
        let existing = self.store.find_exact(key)?;

        let transition = match (existing, desired) {
            (None, LockState::Default) => Transition::Unchanged,
            (None, LockState::Locked) => {
                let system = self.inspector.is_system_app(&key.package);
                self.store.insert(LockEntry::locked(key.clone(), system))?;
                Transition::Created
            }
            (None, LockState::Whitelisted) => {
                let system = self.inspector.is_system_app(&key.package);
                self.store.insert(LockEntry::whitelisted(key.clone(), system))?;
                Transition::Created
            }
            (Some(entry), LockState::Default) => {
                self.store.delete(&entry.key)?;
                self.recheck.cancel(key);
                Transition::Deleted
            }
            (Some(entry), desired) if entry.state() == desired => Transition::Unchanged,
            (Some(_), LockState::Locked) => {
                self.store.update_whitelist(key, false)?;
                Transition::Updated
            }
            (Some(_), LockState::Whitelisted) => {
                self.store.update_whitelist(key, true)?;
                Transition::Updated
            }
        };

        info!("{} -> {} ({:?})", key, desired, transition);
        Ok(transition)
    }

    /// Lockout deadline currently stored for `key`, zero when there is no entry
    pub fn stored_lock_until(&self, key: &ScreenKey) -> Result<u64> {
        Ok(self.store.find_exact(key)?.map_or(0, |e| e.lock_until))
    }

    /// Persist a lockout deadline on the entry that was challenged
    pub fn record_lockout(&self, key: &ScreenKey, lock_until: u64) -> Result<()> {
        let _guard = self.guard()?;
        self.store.update_lock_until(key, lock_until)
    }

    /// Apply the post-unlock effect for `active`, the screen the user is on,
    /// after `matched` (its exact or whole-app entry) was unlocked
    pub fn post_unlock(
        &self,
        active: &ScreenKey,
        matched: &LockEntry,
        request: UnlockRequest,
        prefs: &Preferences,
    ) -> Result<UnlockOutcome> {
        if request.exclude {
            self.exclude(active, matched)?;
            return Ok(UnlockOutcome::Excluded {
                key: active.clone(),
            });
        }

        let minutes = request.ignore_minutes.unwrap_or(prefs.default_ignore_minutes);
        let delay = minutes
            .saturating_mul(MILLIS_PER_MINUTE)
            .saturating_add(IGNORE_PAD_MILLIS);
        let now = self.clock.now_millis();
        let ignore_until = now.saturating_add(delay);

        {
            let _guard = self.guard()?;
            self.store.update_ignore_until(&matched.key, ignore_until)?;
        }

        let recheck_at = if prefs.recheck_enabled {
            Some(self.recheck.schedule(active, delay)?)
        } else {
            None
        };

        info!("{} unlocked, ignoring until {}", matched.key, ignore_until);
        Ok(UnlockOutcome::Ignoring {
            key: matched.key.clone(),
            ignore_until,
            recheck_at,
        })
    }

    fn exclude(&self, active: &ScreenKey, matched: &LockEntry) -> Result<()> {
        if active.is_whole_app() {
            return Err(Error::WholeAppWhitelist {
                package: active.package.clone(),
            });
        }

        let _guard = self.guard()?;
        match self.store.find_exact(active)? {
            Some(mut existing) => {
                existing.whitelisted = true;
                if existing.override_secret.is_none() {
                    existing.override_secret = matched.override_secret.clone();
                }
                self.store.replace(existing)?;
            }
            None => {
                let mut entry = LockEntry::whitelisted(active.clone(), matched.is_system_app);
                entry.override_secret = matched.override_secret.clone();
                self.store.insert(entry)?;
            }
        }
        self.recheck.cancel(active);

        info!("{} excluded from challenges", active);
        Ok(())
    }

    /// Entries for display, system apps hidden unless requested
    pub fn list_entries(&self, include_system_apps: bool) -> Result<Vec<EntryView>> {
        Ok(self
            .store
            .query_all()?
            .into_iter()
            .filter(|e| include_system_apps || !e.is_system_app)
            .map(|entry| EntryView {
                label: self.inspector.resolve_display_label(&entry.key.package),
                state: entry.state(),
                entry,
            })
            .collect())
    }
}
