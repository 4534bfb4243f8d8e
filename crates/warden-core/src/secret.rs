//! Secret hashing
//!
//! Attempts and stored secrets are compared as SHA-256 digests encoded with
//! standard base64. Plaintext attempts are zeroized after hashing.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Base64-encoded SHA-256 digest of a secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHash(String);

impl SecretHash {
    /// Hash a plaintext secret
    pub fn of(plaintext: &str) -> Self {
        let bytes = Zeroizing::new(plaintext.as_bytes().to_vec());
        let digest = Sha256::digest(bytes.as_slice());
        Self(STANDARD.encode(digest))
    }

    /// Wrap an already encoded digest
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encoded digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash `attempt` and compare against this digest
    pub fn matches(&self, attempt: &str) -> bool {
        let candidate = Self::of(attempt);
        self.0.as_bytes().ct_eq(candidate.0.as_bytes()).into()
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(..)")
    }
}

/// The secret guarding every challenge without a per-entry override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSecret {
    /// Digest of the secret
    pub hash: SecretHash,
    /// Optional plaintext reminder shown on the challenge screen
    #[serde(default)]
    pub hint: Option<String>,
}

impl MasterSecret {
    /// Validate and hash a new master secret
    pub fn new(plaintext: &str, hint: Option<String>) -> Result<Self> {
        validate_secret(plaintext)?;
        Ok(Self {
            hash: SecretHash::of(plaintext),
            hint: hint.filter(|h| !h.trim().is_empty()),
        })
    }
}

/// Secrets must be non-empty and not only whitespace
pub fn validate_secret(plaintext: &str) -> Result<()> {
    if plaintext.trim().is_empty() {
        return Err(Error::InvalidSecret("secret must not be empty".to_string()));
    }
    Ok(())
}
