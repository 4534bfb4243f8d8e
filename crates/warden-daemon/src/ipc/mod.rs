//! IPC between the daemon and its clients
//!
//! Newline-delimited JSON over a Unix domain socket. One request gets one
//! response, except `Subscribe`, which turns the connection into an event
//! stream.

mod client;
mod connection;
mod server;
mod types;
mod unix;

// Public API
pub use client::{EventStream, IpcClient};
pub use server::IpcServer;
pub use types::{IpcRequest, IpcResponse};
