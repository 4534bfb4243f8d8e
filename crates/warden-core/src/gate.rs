//! Window event gate
//!
//! Filters raw foreground-window notifications before they reach the
//! decision engine. Rules run in order:
//!
//! 1. not a real screen → drop
//! 2. monitoring disabled → reset snapshot, drop
//! 3. device lock screen engaged → reset snapshot; drop if restricted
//! 4. the engine's own challenge screen → drop
//! 5. debounce → forward only on a screen change, a package change (when
//!    `lock_on_package_change_only` is set), a forced recheck, or a screen
//!    whose challenge has not been passed

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::platform::{DeviceLockState, PackageInspector};
use crate::prefs::Preferences;
use crate::types::{ScreenKey, WindowEvent};

/// In-memory view of recent foreground windows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Package of the last event that reached debounce
    pub last_package: Option<String>,
    /// Screen of the last event that reached debounce
    pub last_screen: Option<String>,
    /// Package of the last forwarded event
    pub active_package: Option<String>,
    /// Screen of the last forwarded event
    pub active_screen: Option<String>,
    challenge_passed: HashMap<ScreenKey, bool>,
}

impl WindowSnapshot {
    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the challenge for `key` has been passed since it was last forwarded
    pub fn is_passed(&self, key: &ScreenKey) -> bool {
        self.challenge_passed.get(key).copied().unwrap_or(false)
    }

    /// Last forwarded screen
    pub fn active(&self) -> Option<ScreenKey> {
        match (&self.active_package, &self.active_screen) {
            (Some(package), Some(screen)) => Some(ScreenKey::new(package.clone(), screen.clone())),
            _ => None,
        }
    }
}

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    NotAScreen,
    MonitoringDisabled,
    DeviceRestricted,
    SelfChallenge,
    Debounced,
}

/// Gate result for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Evaluate this screen
    Forward(ScreenKey),
    /// Drop silently
    Filtered(FilterReason),
}

/// Environment the gate consults for each event
pub struct GateContext<'a> {
    pub inspector: &'a dyn PackageInspector,
    pub device: &'a dyn DeviceLockState,
    pub prefs: &'a Preferences,
    /// True when a master secret exists
    pub secret_configured: bool,
}

impl GateContext<'_> {
    fn monitoring_enabled(&self) -> bool {
        self.secret_configured && self.prefs.monitoring_enabled
    }
}

/// Entry point for window notifications
#[derive(Debug)]
pub struct EventGate {
    own_screen: ScreenKey,
    snapshot: WindowSnapshot,
}

impl EventGate {
    /// Create a gate that never forwards `own_screen`
    pub fn new(own_screen: ScreenKey) -> Self {
        Self {
            own_screen,
            snapshot: WindowSnapshot::default(),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> &WindowSnapshot {
        &self.snapshot
    }

    /// Forget all window history
    pub fn reset(&mut self) {
        self.snapshot.reset();
    }

    /// Record that `key` needs no challenge until it is forwarded again
    pub fn mark_passed(&mut self, key: &ScreenKey) {
        self.snapshot.challenge_passed.insert(key.clone(), true);
    }

    /// Run one event through the filter rules
    pub fn filter(&mut self, event: &WindowEvent, ctx: &GateContext<'_>) -> GateVerdict {
        let verdict = self.apply(event, ctx);
        if let GateVerdict::Filtered(reason) = &verdict {
            debug!("Dropped {} ({:?})", event.key, reason);
        }
        verdict
    }

    fn apply(&mut self, event: &WindowEvent, ctx: &GateContext<'_>) -> GateVerdict {
        let key = &event.key;

        if !ctx.inspector.is_real_screen(&key.package, &key.screen) {
            return GateVerdict::Filtered(FilterReason::NotAScreen);
        }

        if !ctx.monitoring_enabled() {
            self.snapshot.reset();
            return GateVerdict::Filtered(FilterReason::MonitoringDisabled);
        }

        if ctx.device.is_device_locked() {
            self.snapshot.reset();
            if ctx.prefs.restricted_while_device_locked {
                return GateVerdict::Filtered(FilterReason::DeviceRestricted);
            }
        }

        if *key == self.own_screen {
            return GateVerdict::Filtered(FilterReason::SelfChallenge);
        }

        let screen_changed = self.snapshot.last_screen.as_deref() != Some(key.screen.as_str());
        let package_changed = self.snapshot.last_package.as_deref() != Some(key.package.as_str());
        self.snapshot.last_package = Some(key.package.clone());
        self.snapshot.last_screen = Some(key.screen.clone());

        let forward = screen_changed
            || (package_changed && ctx.prefs.lock_on_package_change_only)
            || event.forced_recheck
            || !self.snapshot.is_passed(key);
        if !forward {
            return GateVerdict::Filtered(FilterReason::Debounced);
        }

        self.snapshot.challenge_passed.insert(key.clone(), false);
        self.snapshot.active_package = Some(key.package.clone());
        self.snapshot.active_screen = Some(key.screen.clone());
        GateVerdict::Forward(key.clone())
    }
}
