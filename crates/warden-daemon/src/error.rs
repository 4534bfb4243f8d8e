//! Error types for the Warden daemon

use thiserror::Error;

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur in the daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] warden_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IPC error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking task could not be joined
    #[error("Worker error: {0}")]
    Worker(String),

    /// No challenge is waiting for a credential or an unlock choice
    #[error("No active challenge")]
    NoActiveChallenge,

    /// The engine task is gone
    #[error("Engine stopped")]
    EngineStopped,

    /// Timeout
    #[error("Operation timed out")]
    Timeout,

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl DaemonError {
    /// Whether the engine must stop after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaemonError::Core(e) if e.is_fatal())
    }
}

impl From<serde_json::Error> for DaemonError {
    fn from(e: serde_json::Error) -> Self {
        DaemonError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_only_for_invariant_violation() {
        let defect = DaemonError::from(warden_core::Error::InvariantViolation {
            package: "com.example".to_string(),
        });
        assert!(defect.is_fatal());
        assert!(!DaemonError::Timeout.is_fatal());
        assert!(!DaemonError::from(warden_core::Error::NoSecret).is_fatal());
    }
}
