//! Host platform collaborators
//!
//! The host OS reports which windows exist and whether the device lock
//! screen is up. Warden never talks to the OS directly; it asks these traits.

/// Package and screen metadata from the host
pub trait PackageInspector: Send + Sync {
    /// Whether (package, screen) is an actual foreground screen (not a
    /// toast, dialog or other non-activity window)
    fn is_real_screen(&self, package: &str, screen: &str) -> bool;

    /// Whether the package ships with the system image
    fn is_system_app(&self, package: &str) -> bool;

    /// Human-readable application label
    fn resolve_display_label(&self, package: &str) -> String;
}

/// Device lock-screen status
pub trait DeviceLockState: Send + Sync {
    /// Whether the device lock screen is currently engaged
    fn is_device_locked(&self) -> bool;
}
