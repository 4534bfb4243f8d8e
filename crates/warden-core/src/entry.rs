//! Persisted lock entries

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::secret::SecretHash;
use crate::types::{LockState, ScreenKey};

/// Lock disposition of one (package, screen) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Package and screen this entry covers
    pub key: ScreenKey,

    /// Secret that replaces the master secret for this entry
    #[serde(default)]
    pub override_secret: Option<SecretHash>,

    /// Attempts are refused until this time (epoch ms, 0 = none)
    #[serde(default)]
    pub lock_until: u64,

    /// Challenges are suppressed until this time (epoch ms, 0 = none)
    #[serde(default)]
    pub ignore_until: u64,

    /// Whether the package is a system app
    #[serde(default)]
    pub is_system_app: bool,

    /// Permanently exempt from challenge
    #[serde(default)]
    pub whitelisted: bool,
}

impl LockEntry {
    /// Create a locked entry
    pub fn locked(key: ScreenKey, is_system_app: bool) -> Self {
        Self {
            key,
            override_secret: None,
            lock_until: 0,
            ignore_until: 0,
            is_system_app,
            whitelisted: false,
        }
    }

    /// Create a whitelisted entry
    pub fn whitelisted(key: ScreenKey, is_system_app: bool) -> Self {
        Self {
            whitelisted: true,
            ..Self::locked(key, is_system_app)
        }
    }

    /// Attach a per-entry secret
    pub fn with_override_secret(mut self, secret: SecretHash) -> Self {
        self.override_secret = Some(secret);
        self
    }

    /// Reject shapes that must never be stored
    pub fn validate(&self) -> Result<()> {
        if self.key.is_whole_app() && self.whitelisted {
            return Err(Error::WholeAppWhitelist {
                package: self.key.package.clone(),
            });
        }
        Ok(())
    }

    /// Logical state of this entry
    pub fn state(&self) -> LockState {
        if self.whitelisted {
            LockState::Whitelisted
        } else {
            LockState::Locked
        }
    }

    /// Inside a post-unlock grace window at `now`
    pub fn is_ignoring(&self, now: u64) -> bool {
        self.ignore_until > now
    }

    /// Inside a failed-attempt lockout at `now`
    pub fn is_locked_out(&self, now: u64) -> bool {
        self.lock_until > now
    }
}
