//! Host collaborators backed by configuration and IPC reports

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use warden_core::{DeviceLockState, PackageInspector, WHOLE_APP_SCREEN};

use crate::config::DaemonConfig;

/// Package facts taken from the daemon configuration
#[derive(Debug, Clone, Default)]
pub struct ConfiguredInspector {
    system_apps: BTreeSet<String>,
    labels: BTreeMap<String, String>,
}

impl ConfiguredInspector {
    /// Inspector with explicit tables
    pub fn new(
        system_apps: impl IntoIterator<Item = String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            system_apps: system_apps.into_iter().collect(),
            labels,
        }
    }

    /// Inspector for a daemon configuration
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(config.system_apps.iter().cloned(), config.labels.clone())
    }
}

impl PackageInspector for ConfiguredInspector {
    fn is_real_screen(&self, package: &str, screen: &str) -> bool {
        !package.trim().is_empty() && !screen.trim().is_empty() && screen != WHOLE_APP_SCREEN
    }

    fn is_system_app(&self, package: &str) -> bool {
        self.system_apps.contains(package)
    }

    fn resolve_display_label(&self, package: &str) -> String {
        self.labels
            .get(package)
            .cloned()
            .unwrap_or_else(|| package.to_string())
    }
}

/// Device lock flag reported by the host over IPC
#[derive(Debug, Default)]
pub struct ReportedDeviceState {
    locked: AtomicBool,
}

impl ReportedDeviceState {
    /// Record whether the device lock screen is engaged
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }
}

impl DeviceLockState for ReportedDeviceState {
    fn is_device_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}
