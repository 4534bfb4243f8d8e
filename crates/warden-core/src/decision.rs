//! Challenge decisions for a forwarded window

use std::sync::Arc;

use tracing::{debug, error};

use crate::entry::LockEntry;
use crate::error::{Error, Result};
use crate::store::EntryStore;
use crate::types::ScreenKey;

/// Outcome of evaluating one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the user through
    NoChallenge,
    /// Ask for credentials; carries the entry that matched
    Challenge(LockEntry),
}

impl Decision {
    /// Whether a credential prompt is required
    pub fn is_challenge(&self) -> bool {
        matches!(self, Decision::Challenge(_))
    }
}

/// Looks up the entry governing a window and decides whether to challenge
pub struct DecisionEngine {
    store: Arc<dyn EntryStore>,
}

impl DecisionEngine {
    /// Create a decision engine over a store
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self { store }
    }

    /// Evaluate `key` at time `now` (epoch ms).
    ///
    /// Reads only; two calls against an unchanged store give the same result.
    /// A whitelisted whole-app entry yields [`Error::InvariantViolation`].
    pub fn evaluate(&self, key: &ScreenKey, now: u64) -> Result<Decision> {
        let entry = match self.store.find_exact(key)? {
            Some(entry) => entry,
            None => match self.store.find_whole_app(&key.package)? {
                Some(entry) => entry,
                None => {
                    debug!("No entry for {}", key);
                    return Ok(Decision::NoChallenge);
                }
            },
        };

        if entry.is_ignoring(now) {
            debug!("{} inside ignore window until {}", entry.key, entry.ignore_until);
            return Ok(Decision::NoChallenge);
        }

        if entry.key.is_whole_app() && entry.whitelisted {
            error!("Whole-app entry for {} is whitelisted", entry.key.package);
            return Err(Error::InvariantViolation {
                package: entry.key.package,
            });
        }

        if entry.whitelisted {
            debug!("{} is whitelisted", entry.key);
            return Ok(Decision::NoChallenge);
        }

        Ok(Decision::Challenge(entry))
    }
}
