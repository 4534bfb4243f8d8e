//! Warden CLI - drive the Warden daemon from a terminal
//!
//! Every command is one IPC request, except `watch`, which follows the
//! daemon's event stream.

pub mod client;
pub mod commands;

pub use client::WardenClient;
pub use commands::*;
