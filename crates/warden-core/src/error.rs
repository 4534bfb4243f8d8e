//! Error types for the Warden core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum Error {
    /// Persistent store failure (lookup or write)
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A whole-app entry was found whitelisted. This is a defect, not a
    /// recoverable condition.
    #[error("Invariant violation: whole-app entry for {package} is whitelisted")]
    InvariantViolation { package: String },

    /// Attempt to whitelist a whole-app entry
    #[error("Whole-app entries cannot be whitelisted: {package}")]
    WholeAppWhitelist { package: String },

    /// Insert of a key that already has an entry
    #[error("Entry already exists: {0}")]
    DuplicateEntry(String),

    /// Update or delete of a key without an entry
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// No secret is configured to verify against
    #[error("No master secret configured")]
    NoSecret,

    /// Secret rejected by validation
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// Current secret did not match during a secret change
    #[error("Current secret does not match")]
    SecretMismatch,

    /// Job scheduler failure
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    /// Whether this error signals a broken invariant that must stop the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation { .. })
    }

    /// Whether this error came from the persistent store
    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store(_) | Error::Io(_) | Error::Serialization(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
