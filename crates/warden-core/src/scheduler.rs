//! Recheck scheduling
//!
//! When a grace window is granted after an unlock, a one-shot job is
//! scheduled for the moment it ends. Firing the job re-injects a forced
//! window event so the gate re-evaluates the screen the user is still on.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::types::{ScreenKey, WindowEvent};

/// One-shot job timer provided by the host
pub trait JobScheduler: Send + Sync {
    /// Schedule the job `tag` to fire at `at_epoch_millis`
    fn schedule(&self, tag: &str, at_epoch_millis: u64) -> Result<()>;

    /// Cancel the job `tag`; cancelling an unknown tag is a no-op
    fn cancel(&self, tag: &str);
}

const TAG_PREFIX: &str = "recheck";
const TAG_SEPARATOR: char = '|';

/// Schedules forced re-evaluation of a screen
pub struct RecheckScheduler {
    jobs: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
}

impl RecheckScheduler {
    /// Wrap a host job scheduler
    pub fn new(jobs: Arc<dyn JobScheduler>, clock: Arc<dyn Clock>) -> Self {
        Self { jobs, clock }
    }

    /// Job tag for a screen
    pub fn tag_for(key: &ScreenKey) -> String {
        format!(
            "{}{}{}{}{}",
            TAG_PREFIX, TAG_SEPARATOR, key.package, TAG_SEPARATOR, key.screen
        )
    }

    /// Screen addressed by a job tag, `None` for foreign tags
    pub fn parse_tag(tag: &str) -> Option<ScreenKey> {
        let mut parts = tag.splitn(3, TAG_SEPARATOR);
        if parts.next()? != TAG_PREFIX {
            return None;
        }
        let package = parts.next()?;
        let screen = parts.next()?;
        if package.is_empty() || screen.is_empty() {
            return None;
        }
        Some(ScreenKey::new(package, screen))
    }

    /// Forced event to inject when the job `tag` fires
    pub fn fired(tag: &str) -> Option<WindowEvent> {
        Self::parse_tag(tag).map(WindowEvent::forced)
    }

    /// Replace any pending recheck for `key` with one firing after `delay_millis`.
    ///
    /// Returns the absolute fire time.
    pub fn schedule(&self, key: &ScreenKey, delay_millis: u64) -> Result<u64> {
        let tag = Self::tag_for(key);
        let at = self.clock.now_millis().saturating_add(delay_millis);
        self.jobs.cancel(&tag);
        self.jobs.schedule(&tag, at)?;
        debug!("Recheck for {} scheduled at {}", key, at);
        Ok(at)
    }

    /// Drop the pending recheck for `key`, if any
    pub fn cancel(&self, key: &ScreenKey) {
        self.jobs.cancel(&Self::tag_for(key));
    }
}

/// Job scheduler driven by an external tick.
///
/// Hosts without a timer service call [`ManualJobScheduler::take_due`]
/// periodically and feed the returned tags to [`RecheckScheduler::fired`].
#[derive(Debug, Default)]
pub struct ManualJobScheduler {
    jobs: Mutex<BTreeMap<String, u64>>,
}

impl ManualJobScheduler {
    /// Empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending jobs as (tag, fire time)
    pub fn pending(&self) -> Vec<(String, u64)> {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().map(|(t, at)| (t.clone(), *at)).collect())
            .unwrap_or_default()
    }

    /// Remove and return every job due at `now`, earliest first
    pub fn take_due(&self, now: u64) -> Vec<String> {
        let Ok(mut jobs) = self.jobs.lock() else {
            return Vec::new();
        };
        let mut due: Vec<(String, u64)> = jobs
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(t, at)| (t.clone(), *at))
            .collect();
        due.sort_by_key(|(_, at)| *at);
        for (tag, _) in &due {
            jobs.remove(tag);
        }
        due.into_iter().map(|(tag, _)| tag).collect()
    }
}

impl JobScheduler for ManualJobScheduler {
    fn schedule(&self, tag: &str, at_epoch_millis: u64) -> Result<()> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| Error::Scheduler("job table lock poisoned".to_string()))?;
        jobs.insert(tag.to_string(), at_epoch_millis);
        Ok(())
    }

    fn cancel(&self, tag: &str) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(tag);
        }
    }
}
