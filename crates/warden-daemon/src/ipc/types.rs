//! IPC protocol types

use serde::{Deserialize, Serialize};

use warden_core::{EntryView, LockState, Preferences, Transition, UnlockOutcome, Verdict};

use crate::engine::{EngineEvent, EngineStatus};

/// IPC request types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Check if daemon is running
    Ping,

    /// Get engine state
    Status,

    /// Foreground window changed
    WindowChanged {
        package: String,
        screen: String,
        #[serde(default)]
        forced_recheck: bool,
    },

    /// Device lock screen engaged or released
    DeviceLock { locked: bool },

    /// Credential attempt for the active challenge
    Submit { secret: String },

    /// Exclude/ignore choice after a successful unlock
    PostUnlock {
        #[serde(default)]
        exclude: bool,
        #[serde(default)]
        ignore_minutes: Option<u64>,
    },

    /// Move a screen (or whole app, screen `*`) to a lock state
    SetState {
        package: String,
        screen: String,
        state: LockState,
    },

    /// List lock entries
    ListEntries {
        #[serde(default)]
        include_system_apps: bool,
    },

    /// Set or change the master secret
    SetMasterSecret {
        secret: String,
        #[serde(default)]
        hint: Option<String>,
        /// Required when a secret already exists
        #[serde(default)]
        current: Option<String>,
    },

    /// Remove the master secret
    ClearMasterSecret { current: String },

    /// Replace the preferences
    SetPreferences { preferences: Preferences },

    /// Stream engine events on this connection
    Subscribe,
}

/// IPC response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Success with no data
    Ok,

    /// Pong response
    Pong { version: String },

    /// Error response
    Error { message: String },

    /// Engine state
    Status { status: EngineStatus },

    /// Result of a credential attempt
    Verdict { verdict: Verdict },

    /// Effect applied after an unlock
    Unlocked { outcome: UnlockOutcome },

    /// Effect of a lock state change
    StateChanged { transition: Transition },

    /// Lock entries
    Entries { entries: Vec<EntryView> },

    /// Preferences now in force
    Preferences { preferences: Preferences },

    /// Subscription accepted; events follow
    Subscribed,

    /// One engine event
    Event { event: EngineEvent },
}
