//! IPC server implementation

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use warden_core::{ScreenKey, UnlockRequest, WindowEvent};

use crate::config::DaemonConfig;
use crate::engine::{EngineEvent, EngineHandle};
use crate::error::{DaemonError, Result};

use super::connection::{IpcTransport, PlatformTransport};
use super::types::{IpcRequest, IpcResponse};

/// Config file that preference changes are written back to
#[derive(Clone)]
struct ConfigFile {
    path: PathBuf,
    config: Arc<Mutex<DaemonConfig>>,
}

/// IPC server
pub struct IpcServer {
    /// Socket path
    socket_path: PathBuf,

    /// Engine
    engine: EngineHandle,

    /// Where preference changes are persisted, if anywhere
    config_file: Option<ConfigFile>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(socket_path: PathBuf, engine: EngineHandle) -> Self {
        Self {
            socket_path,
            engine,
            config_file: None,
        }
    }

    /// Persist preference changes into `config` saved at `path`
    pub fn with_config_file(mut self, path: PathBuf, config: DaemonConfig) -> Self {
        self.config_file = Some(ConfigFile {
            path,
            config: Arc::new(Mutex::new(config)),
        });
        self
    }

    /// Start the IPC server
    pub async fn run(&self) -> Result<()> {
        let transport = PlatformTransport::bind(&self.socket_path).await?;

        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match transport.accept().await {
                Ok(stream) => {
                    let engine = self.engine.clone();
                    let config_file = self.config_file.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, engine, config_file).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single IPC connection
async fn handle_connection<S>(
    stream: S,
    engine: EngineHandle,
    config_file: Option<ConfigFile>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let request: IpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = IpcResponse::Error {
                    message: format!("Invalid request: {}", e),
                };
                send_response(&mut writer, &response).await?;
                line.clear();
                continue;
            }
        };
        line.clear();

        if request == IpcRequest::Subscribe {
            let events = engine.subscribe();
            send_response(&mut writer, &IpcResponse::Subscribed).await?;
            return stream_events(&mut reader, &mut writer, events).await;
        }

        debug!("Received IPC request: {}", request_name(&request));

        let response = handle_request(request, &engine, config_file.as_ref()).await;
        send_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Forward engine events until the client hangs up or the engine stops
async fn stream_events<R, W>(
    reader: &mut R,
    writer: &mut W,
    mut events: broadcast::Receiver<EngineEvent>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut discard = String::new();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => send_response(writer, &IpcResponse::Event { event }).await?,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Subscriber lagged, {} events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            read = reader.read_line(&mut discard) => {
                if read? == 0 {
                    debug!("Subscriber disconnected");
                    return Ok(());
                }
                discard.clear();
            }
        }
    }
}

/// Request kind for logs; never includes secrets
fn request_name(request: &IpcRequest) -> &'static str {
    match request {
        IpcRequest::Ping => "Ping",
        IpcRequest::Status => "Status",
        IpcRequest::WindowChanged { .. } => "WindowChanged",
        IpcRequest::DeviceLock { .. } => "DeviceLock",
        IpcRequest::Submit { .. } => "Submit",
        IpcRequest::PostUnlock { .. } => "PostUnlock",
        IpcRequest::SetState { .. } => "SetState",
        IpcRequest::ListEntries { .. } => "ListEntries",
        IpcRequest::SetMasterSecret { .. } => "SetMasterSecret",
        IpcRequest::ClearMasterSecret { .. } => "ClearMasterSecret",
        IpcRequest::SetPreferences { .. } => "SetPreferences",
        IpcRequest::Subscribe => "Subscribe",
    }
}

fn failure(context: &str, e: DaemonError) -> IpcResponse {
    IpcResponse::Error {
        message: format!("{}: {}", context, e),
    }
}

/// Handle a single request
async fn handle_request(
    request: IpcRequest,
    engine: &EngineHandle,
    config_file: Option<&ConfigFile>,
) -> IpcResponse {
    match request {
        IpcRequest::Ping => IpcResponse::Pong {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },

        IpcRequest::Status => match engine.status().await {
            Ok(status) => IpcResponse::Status { status },
            Err(e) => failure("Status unavailable", e),
        },

        IpcRequest::WindowChanged {
            package,
            screen,
            forced_recheck,
        } => {
            let event = WindowEvent {
                key: ScreenKey::new(package, screen),
                forced_recheck,
            };
            match engine.window_changed(event).await {
                Ok(()) => IpcResponse::Ok,
                Err(e) => failure("Window event rejected", e),
            }
        }

        IpcRequest::DeviceLock { locked } => {
            engine.set_device_locked(locked);
            IpcResponse::Ok
        }

        IpcRequest::Submit { secret } => {
            let result = match engine.submit(&secret).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(verdict) => IpcResponse::Verdict { verdict },
                Err(e) => failure("Submit failed", e),
            }
        }

        IpcRequest::PostUnlock {
            exclude,
            ignore_minutes,
        } => {
            let request = UnlockRequest {
                exclude,
                ignore_minutes,
            };
            let result = match engine.post_unlock(request).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(outcome) => IpcResponse::Unlocked { outcome },
                Err(e) => failure("Unlock choice failed", e),
            }
        }

        IpcRequest::SetState {
            package,
            screen,
            state,
        } => {
            let key = ScreenKey::new(package, screen);
            let result = match engine.set_state(key, state).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(transition) => IpcResponse::StateChanged { transition },
                Err(e) => failure("State change failed", e),
            }
        }

        IpcRequest::ListEntries {
            include_system_apps,
        } => {
            let result = match engine.list_entries(include_system_apps).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(entries) => IpcResponse::Entries { entries },
                Err(e) => failure("Failed to list entries", e),
            }
        }

        IpcRequest::SetMasterSecret {
            secret,
            hint,
            current,
        } => {
            let result = match engine
                .set_master_secret(&secret, hint, current.as_deref())
                .await
            {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => IpcResponse::Ok,
                Err(e) => failure("Failed to set master secret", e),
            }
        }

        IpcRequest::ClearMasterSecret { current } => {
            let result = match engine.clear_master_secret(&current).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => IpcResponse::Ok,
                Err(e) => failure("Failed to clear master secret", e),
            }
        }

        IpcRequest::SetPreferences { preferences } => {
            let result = match engine.set_preferences(preferences).await {
                Ok(op) => op.wait().await,
                Err(e) => Err(e),
            };
            let preferences = match result {
                Ok(preferences) => preferences,
                Err(e) => return failure("Failed to set preferences", e),
            };
            if let Some(file) = config_file {
                let mut config = file.config.lock().await;
                config.preferences = preferences.clone();
                if let Err(e) = config.save(&file.path) {
                    return failure("Preferences applied but not saved", e);
                }
            }
            IpcResponse::Preferences { preferences }
        }

        IpcRequest::Subscribe => IpcResponse::Error {
            message: "Subscribe is handled by the connection loop".to_string(),
        },
    }
}

/// Send a response over the socket
async fn send_response<W>(writer: &mut W, response: &IpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
