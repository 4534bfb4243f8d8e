//! Unix domain socket transport
//!
//! The socket is created mode 0600 and connections from other users are
//! dropped.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::error::{DaemonError, Result};

use super::connection::{IpcClientTransport, IpcTransport};

/// Listener on the daemon socket
pub struct UnixIpcTransport {
    listener: UnixListener,
    socket_path: PathBuf,
    owner_uid: u32,
}

impl UnixIpcTransport {
    /// Remove a socket file left behind by a daemon that is gone
    async fn clear_stale(path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::Ipc(format!(
                "Another daemon is listening on {}",
                path.display()
            )));
        }
        debug!("Removing stale socket {}", path.display());
        std::fs::remove_file(path)?;
        Ok(())
    }
}

#[async_trait]
impl IpcTransport for UnixIpcTransport {
    type Stream = UnixStream;

    async fn bind(path: &Path) -> Result<Self> {
        Self::clear_stale(path).await?;

        let listener = UnixListener::bind(path)
            .map_err(|e| DaemonError::Ipc(format!("Failed to bind {}: {}", path.display(), e)))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        let owner_uid = std::fs::metadata(path)?.uid();

        Ok(Self {
            listener,
            socket_path: path.to_path_buf(),
            owner_uid,
        })
    }

    async fn accept(&self) -> Result<Self::Stream> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|e| DaemonError::Ipc(format!("Accept failed: {}", e)))?;

            match stream.peer_cred() {
                Ok(cred) if cred.uid() == self.owner_uid => return Ok(stream),
                Ok(cred) => warn!("Refused connection from uid {}", cred.uid()),
                Err(e) => warn!("Refused connection without peer credentials: {}", e),
            }
        }
    }
}

impl Drop for UnixIpcTransport {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.socket_path.display(), e);
            }
        }
    }
}

/// Dialer for the daemon socket
pub struct UnixIpcClient;

#[async_trait]
impl IpcClientTransport for UnixIpcClient {
    type Stream = UnixStream;

    async fn connect(path: &Path) -> Result<Self::Stream> {
        UnixStream::connect(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused => {
                DaemonError::Ipc("Daemon not running".to_string())
            }
            _ => DaemonError::Ipc(format!("Failed to connect to {}: {}", path.display(), e)),
        })
    }
}
