//! Shared identifiers: screen keys, window events, lock states

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::WHOLE_APP_SCREEN;

/// Identifies one (package, screen) pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScreenKey {
    /// Application package id
    pub package: String,
    /// Screen (activity) id, or [`WHOLE_APP_SCREEN`]
    pub screen: String,
}

impl ScreenKey {
    /// Create a key for a specific screen
    pub fn new(package: impl Into<String>, screen: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            screen: screen.into(),
        }
    }

    /// Create the whole-app key for a package
    pub fn whole_app(package: impl Into<String>) -> Self {
        Self::new(package, WHOLE_APP_SCREEN)
    }

    /// Whether this key addresses the entire application
    pub fn is_whole_app(&self) -> bool {
        self.screen == WHOLE_APP_SCREEN
    }
}

impl fmt::Display for ScreenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.screen)
    }
}

/// A foreground window change reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEvent {
    /// The window that came to the foreground
    pub key: ScreenKey,
    /// Set by recheck jobs to bypass debounce
    pub forced_recheck: bool,
}

impl WindowEvent {
    /// A regular window change
    pub fn new(package: impl Into<String>, screen: impl Into<String>) -> Self {
        Self {
            key: ScreenKey::new(package, screen),
            forced_recheck: false,
        }
    }

    /// A recheck event for a key
    pub fn forced(key: ScreenKey) -> Self {
        Self {
            key,
            forced_recheck: true,
        }
    }
}

/// Logical lock disposition of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    /// No entry
    #[default]
    Default,
    /// Entry present, challenge required
    Locked,
    /// Entry present, permanently exempt
    Whitelisted,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Default => write!(f, "default"),
            LockState::Locked => write!(f, "locked"),
            LockState::Whitelisted => write!(f, "whitelisted"),
        }
    }
}
