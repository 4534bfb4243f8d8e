//! User preferences consulted by the engine

use serde::{Deserialize, Serialize};

use crate::MILLIS_PER_MINUTE;

/// Engine preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Master switch for window monitoring
    pub monitoring_enabled: bool,

    /// Include system apps in entry listings
    pub system_apps_visible: bool,

    /// Also re-evaluate when only the package changed
    pub lock_on_package_change_only: bool,

    /// Drop all events while the device lock screen is engaged
    pub restricted_while_device_locked: bool,

    /// Lockout length after repeated failures (0 disables lockout)
    pub timeout_period_minutes: u64,

    /// Grace window after a successful unlock
    pub default_ignore_minutes: u64,

    /// Schedule a recheck when a grace window ends
    pub recheck_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            system_apps_visible: false,
            lock_on_package_change_only: false,
            restricted_while_device_locked: false,
            timeout_period_minutes: 1,
            default_ignore_minutes: 5,
            recheck_enabled: true,
        }
    }
}

impl Preferences {
    /// Lockout length in milliseconds
    pub fn timeout_period_millis(&self) -> u64 {
        self.timeout_period_minutes.saturating_mul(MILLIS_PER_MINUTE)
    }
}
