//! Warden Daemon - runs the lock engine behind a local socket
//!
//! This crate provides:
//! - The engine actor serialising window events, challenges and unlocks
//! - JSON file storage for lock entries and the master secret
//! - A tokio job timer for post-unlock rechecks
//! - IPC server and client for hosts and the CLI

pub mod config;
pub mod engine;
pub mod entry_store;
pub mod error;
pub mod ipc;
pub mod jobs;
mod persist;
pub mod platform;
pub mod vault;

pub use config::DaemonConfig;
pub use engine::{
    EngineDeps, EngineEvent, EngineHandle, EngineSettings, EngineStatus, OpOutcome, PendingOp,
};
pub use entry_store::JsonEntryStore;
pub use error::{DaemonError, Result};
pub use ipc::{IpcClient, IpcServer};
pub use jobs::TokioJobScheduler;
pub use platform::{ConfiguredInspector, ReportedDeviceState};
pub use vault::SecretVault;
