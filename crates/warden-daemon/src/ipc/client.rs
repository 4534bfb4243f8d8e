//! IPC client implementation

use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};

use crate::engine::EngineEvent;
use crate::error::{DaemonError, Result};

use super::connection::{IpcClientTransport, PlatformClient};
use super::types::{IpcRequest, IpcResponse};

type ClientStream = <PlatformClient as IpcClientTransport>::Stream;

/// IPC client for CLI and host use
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send a request and get a response
    pub async fn request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = PlatformClient::connect(&self.socket_path).await?;

        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        write_request(&mut writer, request).await?;
        read_response(&mut reader).await
    }

    /// Check if daemon is running
    pub async fn ping(&self) -> bool {
        matches!(
            self.request(&IpcRequest::Ping).await,
            Ok(IpcResponse::Pong { .. })
        )
    }

    /// Open a connection that receives engine events
    pub async fn subscribe(&self) -> Result<EventStream> {
        let stream = PlatformClient::connect(&self.socket_path).await?;
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        write_request(&mut writer, &IpcRequest::Subscribe).await?;
        match read_response(&mut reader).await? {
            IpcResponse::Subscribed => Ok(EventStream {
                reader,
                _writer: writer,
            }),
            IpcResponse::Error { message } => Err(DaemonError::Ipc(message)),
            other => Err(DaemonError::Ipc(format!("Unexpected response: {:?}", other))),
        }
    }
}

/// Engine events arriving on a subscribed connection
pub struct EventStream {
    reader: BufReader<ReadHalf<ClientStream>>,
    // Dropping the write half would close the connection
    _writer: WriteHalf<ClientStream>,
}

impl EventStream {
    /// Next event, `None` once the daemon closes the stream
    pub async fn next(&mut self) -> Result<Option<EngineEvent>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        match serde_json::from_str(&line)? {
            IpcResponse::Event { event } => Ok(Some(event)),
            other => Err(DaemonError::Ipc(format!("Unexpected message: {:?}", other))),
        }
    }
}

async fn write_request<W>(writer: &mut W, request: &IpcRequest) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let json = serde_json::to_string(request)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response<R>(reader: &mut R) -> Result<IpcResponse>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(DaemonError::Ipc("Connection closed by daemon".to_string()));
    }
    let response: IpcResponse = serde_json::from_str(&line)?;
    Ok(response)
}
