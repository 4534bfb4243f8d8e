//! Master secret persistence
//!
//! Only the digest and the optional hint are written; the plaintext never
//! leaves the request that carried it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use warden_core::{MasterSecret, SecretHash};

use crate::error::{DaemonError, Result};
use crate::persist::write_private;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct VaultDocument {
    version: u32,
    hash: SecretHash,
    #[serde(default)]
    hint: Option<String>,
}

/// File holding the master secret digest
#[derive(Debug, Clone)]
pub struct SecretVault {
    path: PathBuf,
}

impl SecretVault {
    /// Vault backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing this vault
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored master secret, `None` if none was ever set
    pub fn load(&self) -> Result<Option<MasterSecret>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let document: VaultDocument = serde_json::from_str(&content)?;
        if document.version != FORMAT_VERSION {
            return Err(DaemonError::Config(format!(
                "unsupported secret vault version {}",
                document.version
            )));
        }
        Ok(Some(MasterSecret {
            hash: document.hash,
            hint: document.hint,
        }))
    }

    /// Persist `secret`, replacing any previous one
    pub fn save(&self, secret: &MasterSecret) -> Result<()> {
        let document = VaultDocument {
            version: FORMAT_VERSION,
            hash: secret.hash.clone(),
            hint: secret.hint.clone(),
        };
        let content = serde_json::to_vec_pretty(&document)?;
        write_private(&self.path, &content)?;
        info!("Master secret saved to {:?}", self.path);
        Ok(())
    }

    /// Remove the stored secret
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Master secret removed from {:?}", self.path);
        }
        Ok(())
    }
}
