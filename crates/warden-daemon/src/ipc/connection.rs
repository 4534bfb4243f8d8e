//! Socket seams used by the server and client

use async_trait::async_trait;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Listening side of the daemon socket.
///
/// Dropping the listener removes the socket it created.
#[async_trait]
pub trait IpcTransport: Send + Sync + Sized {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Claim `path`, replacing a stale socket but never a live one
    async fn bind(path: &Path) -> Result<Self>;

    /// Next connection from a permitted peer
    async fn accept(&self) -> Result<Self::Stream>;
}

/// Dialing side used by the CLI and hosts
#[async_trait]
pub trait IpcClientTransport: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connect to the daemon listening at `path`
    async fn connect(path: &Path) -> Result<Self::Stream>;
}

pub use super::unix::{UnixIpcClient as PlatformClient, UnixIpcTransport as PlatformTransport};
