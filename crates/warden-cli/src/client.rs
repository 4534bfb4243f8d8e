//! Client for communicating with the Warden daemon

use std::path::PathBuf;

use warden_core::{EntryView, LockState, Preferences, ScreenKey, Transition, UnlockOutcome, Verdict};
use warden_daemon::error::DaemonError;
use warden_daemon::ipc::{EventStream, IpcClient, IpcRequest, IpcResponse};
use warden_daemon::{DaemonConfig, EngineStatus};

/// Client for the Warden daemon
pub struct WardenClient {
    inner: IpcClient,
}

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("No screen is waiting for a credential")]
    NoChallenge,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Daemon error: {0}")]
    DaemonError(String),
}

impl ClientError {
    fn from_daemon_error(e: DaemonError) -> Self {
        match &e {
            DaemonError::Ipc(msg) if msg.contains("not running") => ClientError::DaemonNotRunning,
            _ => ClientError::DaemonError(e.to_string()),
        }
    }

    fn unexpected() -> Self {
        ClientError::RequestFailed("Unexpected response".to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl Default for WardenClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WardenClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(DaemonConfig::default_ipc_path())
    }

    /// Create a new client with a custom socket path
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            inner: IpcClient::new(socket_path),
        }
    }

    async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        self.inner
            .request(request)
            .await
            .map_err(ClientError::from_daemon_error)
    }

    /// Check if the daemon is running
    pub async fn ping(&self) -> Result<String> {
        match self.request(&IpcRequest::Ping).await? {
            IpcResponse::Pong { version } => Ok(version),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Get the engine status
    pub async fn status(&self) -> Result<EngineStatus> {
        match self.request(&IpcRequest::Status).await? {
            IpcResponse::Status { status } => Ok(status),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Report a foreground window change
    pub async fn window_changed(&self, key: ScreenKey, forced_recheck: bool) -> Result<()> {
        let request = IpcRequest::WindowChanged {
            package: key.package,
            screen: key.screen,
            forced_recheck,
        };
        match self.request(&request).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Report the device lock state
    pub async fn device_lock(&self, locked: bool) -> Result<()> {
        match self.request(&IpcRequest::DeviceLock { locked }).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Submit a credential for the active challenge
    pub async fn submit(&self, secret: String) -> Result<Verdict> {
        match self.request(&IpcRequest::Submit { secret }).await? {
            IpcResponse::Verdict { verdict } => Ok(verdict),
            IpcResponse::Error { message } if message.contains("No active challenge") => {
                Err(ClientError::NoChallenge)
            }
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Apply the exclude/ignore choice after a successful unlock
    pub async fn post_unlock(
        &self,
        exclude: bool,
        ignore_minutes: Option<u64>,
    ) -> Result<UnlockOutcome> {
        let request = IpcRequest::PostUnlock {
            exclude,
            ignore_minutes,
        };
        match self.request(&request).await? {
            IpcResponse::Unlocked { outcome } => Ok(outcome),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Move a key to `state`
    pub async fn set_state(&self, key: ScreenKey, state: LockState) -> Result<Transition> {
        let request = IpcRequest::SetState {
            package: key.package,
            screen: key.screen,
            state,
        };
        match self.request(&request).await? {
            IpcResponse::StateChanged { transition } => Ok(transition),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// List stored entries
    pub async fn list_entries(&self, include_system_apps: bool) -> Result<Vec<EntryView>> {
        let request = IpcRequest::ListEntries {
            include_system_apps,
        };
        match self.request(&request).await? {
            IpcResponse::Entries { entries } => Ok(entries),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Set or replace the master secret
    pub async fn set_master_secret(
        &self,
        secret: String,
        hint: Option<String>,
        current: Option<String>,
    ) -> Result<()> {
        let request = IpcRequest::SetMasterSecret {
            secret,
            hint,
            current,
        };
        match self.request(&request).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Remove the master secret
    pub async fn clear_master_secret(&self, current: String) -> Result<()> {
        match self.request(&IpcRequest::ClearMasterSecret { current }).await? {
            IpcResponse::Ok => Ok(()),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Replace the preferences, returning what the daemon applied
    pub async fn set_preferences(&self, preferences: Preferences) -> Result<Preferences> {
        match self
            .request(&IpcRequest::SetPreferences { preferences })
            .await?
        {
            IpcResponse::Preferences { preferences } => Ok(preferences),
            IpcResponse::Error { message } => Err(ClientError::RequestFailed(message)),
            _ => Err(ClientError::unexpected()),
        }
    }

    /// Follow engine events
    pub async fn subscribe(&self) -> Result<EventStream> {
        self.inner
            .subscribe()
            .await
            .map_err(ClientError::from_daemon_error)
    }
}
