//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_core::{Preferences, ScreenKey};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// JSON file holding lock entries
    pub entry_store_path: PathBuf,

    /// JSON file holding the master secret hash
    pub secret_path: PathBuf,

    /// Unix socket path for IPC
    pub ipc_socket_path: PathBuf,

    /// Screen that shows the credential prompt; never challenged itself
    pub challenge_screen: ScreenKey,

    /// Upper bound for one blocking store operation (milliseconds)
    pub query_timeout_ms: u64,

    /// Depth of the engine command queue
    pub command_queue_depth: usize,

    /// Depth of the engine event broadcast
    pub event_queue_depth: usize,

    /// Packages treated as system apps
    pub system_apps: Vec<String>,

    /// Display labels by package
    pub labels: BTreeMap<String, String>,

    /// User preferences
    pub preferences: Preferences,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let data_dir = Self::default_data_dir();
        Self {
            entry_store_path: data_dir.join("entries.json"),
            secret_path: data_dir.join("secret.json"),
            ipc_socket_path: Self::default_ipc_path(),
            challenge_screen: ScreenKey::new("io.warden.daemon", "ChallengeScreen"),
            query_timeout_ms: 2_000,
            command_queue_depth: 64,
            event_queue_depth: 32,
            system_apps: Vec::new(),
            labels: BTreeMap::new(),
            preferences: Preferences::default(),
        }
    }
}

impl DaemonConfig {
    /// Default IPC path, under `XDG_RUNTIME_DIR` when available
    pub fn default_ipc_path() -> PathBuf {
        dirs::runtime_dir()
            .map(|dir| dir.join("warden.sock"))
            .unwrap_or_else(|| PathBuf::from("/tmp/warden.sock"))
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("warden")
    }

    /// Config file location: `$WARDEN_CONFIG` or `<config_dir>/warden/daemon.json`
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("/etc"))
                    .join("warden")
                    .join("daemon.json")
            })
    }

    /// Query timeout as a duration
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path`, writing defaults there first if it is missing
    pub fn load_or_create(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        config.save(path)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.query_timeout_ms == 0 {
            return Err(crate::DaemonError::Config(
                "query_timeout_ms must be positive".to_string(),
            ));
        }
        if self.command_queue_depth == 0 || self.event_queue_depth == 0 {
            return Err(crate::DaemonError::Config(
                "queue depths must be positive".to_string(),
            ));
        }
        if self.challenge_screen.package.is_empty() || self.challenge_screen.screen.is_empty() {
            return Err(crate::DaemonError::Config(
                "challenge_screen needs a package and a screen".to_string(),
            ));
        }
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> crate::Result<()> {
        for path in [
            &self.entry_store_path,
            &self.secret_path,
            &self.ipc_socket_path,
        ] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("daemon.json");

        let created = DaemonConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(DaemonConfig::load(&path).unwrap(), created);
        assert_eq!(created.query_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.json");
        std::fs::write(
            &path,
            r#"{"system_apps": ["android"], "preferences": {"timeout_period_minutes": 3}}"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.system_apps, vec!["android".to_string()]);
        assert_eq!(config.preferences.timeout_period_minutes, 3);
        assert!(config.preferences.recheck_enabled);
        assert_eq!(config.query_timeout_ms, 2_000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = DaemonConfig {
            query_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::DaemonError::Config(_))
        ));
    }
}
