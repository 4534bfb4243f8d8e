//! Credential verification with escalating lockout
//!
//! The verifier is constructed once and injected; it owns the master secret.
//! Failure counting is per challenge: [`Challenge::new`] starts at zero and
//! the count only goes back to zero when the next challenge begins.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::entry::LockEntry;
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleManager;
use crate::lockout::LockoutPolicy;
use crate::prefs::Preferences;
use crate::secret::MasterSecret;
use crate::types::ScreenKey;

/// Consecutive failed attempts within one challenge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounter {
    count: u32,
}

impl FailureCounter {
    /// Current count
    pub fn count(&self) -> u32 {
        self.count
    }

    fn record_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }
}

/// An active credential prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Screen the user is trying to open
    pub key: ScreenKey,
    /// Entry that caused the challenge (exact or whole-app)
    pub entry: LockEntry,
    failures: FailureCounter,
}

impl Challenge {
    /// Begin a challenge with a fresh failure counter
    pub fn new(key: ScreenKey, entry: LockEntry) -> Self {
        Self {
            key,
            entry,
            failures: FailureCounter::default(),
        }
    }

    /// Consecutive failures so far
    pub fn failures(&self) -> u32 {
        self.failures.count()
    }
}

/// Result of one credential attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// Credential accepted
    Success,
    /// Credential rejected
    Fail {
        failures: u32,
        attempts_remaining: u32,
    },
    /// Rejected because the entry is locked out until `until` (epoch ms)
    LockedOut { until: u64 },
}

impl Verdict {
    /// Whether the attempt was accepted
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

/// Checks attempts against the master or per-entry secret
pub struct CredentialVerifier {
    master: RwLock<Option<MasterSecret>>,
    lifecycle: Arc<LifecycleManager>,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    /// Create a verifier with no master secret (monitoring stays disabled)
    pub fn new(lifecycle: Arc<LifecycleManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            master: RwLock::new(None),
            lifecycle,
            clock,
        }
    }

    /// Create a verifier with a previously stored master secret
    pub fn with_master(
        lifecycle: Arc<LifecycleManager>,
        clock: Arc<dyn Clock>,
        master: Option<MasterSecret>,
    ) -> Self {
        Self {
            master: RwLock::new(master),
            lifecycle,
            clock,
        }
    }

    fn read_master(&self) -> Result<Option<MasterSecret>> {
        self.master
            .read()
            .map(|m| m.clone())
            .map_err(|_| Error::Store("master secret lock poisoned".to_string()))
    }

    fn write_master(&self, value: Option<MasterSecret>) -> Result<()> {
        let mut master = self
            .master
            .write()
            .map_err(|_| Error::Store("master secret lock poisoned".to_string()))?;
        *master = value;
        Ok(())
    }

    /// Whether a master secret is configured
    pub fn has_master_secret(&self) -> bool {
        matches!(self.read_master(), Ok(Some(_)))
    }

    /// The configured master secret, for persistence
    pub fn master_secret(&self) -> Option<MasterSecret> {
        self.read_master().ok().flatten()
    }

    /// Hint for the master secret
    pub fn hint(&self) -> Option<String> {
        self.master_secret().and_then(|m| m.hint)
    }

    /// Set (or replace) the master secret
    pub fn set_master_secret(&self, plaintext: &str, hint: Option<String>) -> Result<MasterSecret> {
        let secret = MasterSecret::new(plaintext, hint)?;
        self.write_master(Some(secret.clone()))?;
        info!("Master secret set");
        Ok(secret)
    }

    /// Replace the master secret after checking the current one
    pub fn change_master_secret(
        &self,
        current: &str,
        new: &str,
        hint: Option<String>,
    ) -> Result<MasterSecret> {
        let master = self.read_master()?.ok_or(Error::NoSecret)?;
        if !master.hash.matches(current) {
            return Err(Error::SecretMismatch);
        }
        self.set_master_secret(new, hint)
    }

    /// Remove the master secret, which disables monitoring
    pub fn clear_master_secret(&self) -> Result<()> {
        self.write_master(None)?;
        info!("Master secret cleared");
        Ok(())
    }

    /// Put back a previously read master secret (used to undo a change
    /// whose persistence failed)
    pub fn restore_master_secret(&self, master: Option<MasterSecret>) -> Result<()> {
        self.write_master(master)
    }

    /// Check `attempt` for the active `challenge`.
    ///
    /// While the challenged entry is locked out the attempt is refused before
    /// any hashing. The stored deadline is consulted as well as the one the
    /// challenge carries, so a lockout persisted by an earlier attempt whose
    /// caller gave up waiting still applies. A failure past the threshold
    /// persists a new lockout deadline (when the timeout preference is
    /// non-zero).
    pub fn submit(
        &self,
        attempt: &str,
        challenge: &mut Challenge,
        prefs: &Preferences,
    ) -> Result<Verdict> {
        let now = self.clock.now_millis();

        let stored = self.lifecycle.stored_lock_until(&challenge.entry.key)?;
        challenge.entry.lock_until = challenge.entry.lock_until.max(stored);

        if challenge.entry.is_locked_out(now) {
            debug!("{} locked out, attempt refused", challenge.entry.key);
            return Ok(Verdict::LockedOut {
                until: challenge.entry.lock_until,
            });
        }

        let expected = match &challenge.entry.override_secret {
            Some(secret) => secret.clone(),
            None => self.read_master()?.ok_or(Error::NoSecret)?.hash,
        };

        if expected.matches(attempt) {
            info!("Challenge for {} passed", challenge.key);
            return Ok(Verdict::Success);
        }

        let policy = LockoutPolicy::with_timeout(prefs.timeout_period_minutes);
        let failures = challenge.failures.record_failure();

        if let Some(until) = policy.lock_until(now, failures) {
            self.lifecycle.record_lockout(&challenge.entry.key, until)?;
            challenge.entry.lock_until = until;
            warn!(
                "{} failed attempts on {}, locked until {}",
                failures, challenge.entry.key, until
            );
            return Ok(Verdict::LockedOut { until });
        }

        debug!("Failed attempt {} on {}", failures, challenge.entry.key);
        Ok(Verdict::Fail {
            failures,
            attempts_remaining: policy.attempts_remaining(failures),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::platform::PackageInspector;
    use crate::scheduler::{ManualJobScheduler, RecheckScheduler};
    use crate::secret::SecretHash;
    use crate::store::{EntryStore, MemoryEntryStore};
    use crate::types::LockState;

    struct Inspector;

    impl PackageInspector for Inspector {
        fn is_real_screen(&self, _: &str, _: &str) -> bool {
            true
        }
        fn is_system_app(&self, _: &str) -> bool {
            false
        }
        fn resolve_display_label(&self, package: &str) -> String {
            package.to_string()
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryEntryStore>,
        verifier: CredentialVerifier,
        challenge: Challenge,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let store = Arc::new(MemoryEntryStore::new());
        let recheck = Arc::new(RecheckScheduler::new(
            Arc::new(ManualJobScheduler::new()),
            clock.clone(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            Arc::new(Inspector),
            recheck,
            clock.clone(),
        ));
        let key = ScreenKey::new("com.example.app", "MainActivity");
        lifecycle.set_state(&key, LockState::Locked).unwrap();
        let entry = store.find_exact(&key).unwrap().unwrap();

        let verifier = CredentialVerifier::new(lifecycle, clock.clone());
        verifier.set_master_secret("1234", Some("year".to_string())).unwrap();

        Fixture {
            clock,
            store,
            verifier,
            challenge: Challenge::new(key, entry),
        }
    }

    fn prefs(timeout: u64) -> Preferences {
        Preferences {
            timeout_period_minutes: timeout,
            ..Default::default()
        }
    }

    #[test]
    fn test_correct_master_secret() {
        let mut f = fixture();
        let verdict = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert!(verdict.is_success());
    }

    #[test]
    fn test_failures_below_threshold() {
        let mut f = fixture();
        let first = f.verifier.submit("0000", &mut f.challenge, &prefs(1)).unwrap();
        assert_eq!(
            first,
            Verdict::Fail {
                failures: 1,
                attempts_remaining: 2
            }
        );
        let second = f.verifier.submit("0000", &mut f.challenge, &prefs(1)).unwrap();
        assert!(matches!(second, Verdict::Fail { failures: 2, .. }));
        assert_eq!(f.store.find_exact(&f.challenge.key).unwrap().unwrap().lock_until, 0);
    }

    #[test]
    fn test_third_failure_locks_out() {
        let mut f = fixture();
        for _ in 0..2 {
            f.verifier.submit("0000", &mut f.challenge, &prefs(1)).unwrap();
        }
        let third = f.verifier.submit("0000", &mut f.challenge, &prefs(1)).unwrap();
        assert_eq!(third, Verdict::LockedOut { until: 5_060_000 });
        assert_eq!(
            f.store.find_exact(&f.challenge.key).unwrap().unwrap().lock_until,
            5_060_000
        );

        // Correct secret is refused while locked out
        f.clock.advance(59_999);
        let fourth = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert_eq!(fourth, Verdict::LockedOut { until: 5_060_000 });
        assert_eq!(f.challenge.failures(), 3);

        f.clock.advance(1);
        let after = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert!(after.is_success());
    }

    #[test]
    fn test_stored_lockout_refuses_stale_challenge() {
        let mut f = fixture();
        // Deadline persisted while this challenge still holds the old entry
        f.store.update_lock_until(&f.challenge.key, 5_060_000).unwrap();
        assert_eq!(f.challenge.entry.lock_until, 0);

        let verdict = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert_eq!(verdict, Verdict::LockedOut { until: 5_060_000 });
        assert_eq!(f.challenge.entry.lock_until, 5_060_000);
        assert_eq!(f.challenge.failures(), 0);

        f.clock.advance(60_000);
        assert!(f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap().is_success());
    }

    #[test]
    fn test_zero_timeout_never_locks() {
        let mut f = fixture();
        for _ in 0..5 {
            let verdict = f.verifier.submit("0000", &mut f.challenge, &prefs(0)).unwrap();
            assert!(matches!(verdict, Verdict::Fail { .. }));
        }
    }

    #[test]
    fn test_success_does_not_reset_counter() {
        let mut f = fixture();
        f.verifier.submit("0000", &mut f.challenge, &prefs(1)).unwrap();
        f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert_eq!(f.challenge.failures(), 1);

        let next = Challenge::new(f.challenge.key.clone(), f.challenge.entry.clone());
        assert_eq!(next.failures(), 0);
    }

    #[test]
    fn test_override_secret_replaces_master() {
        let mut f = fixture();
        f.challenge.entry.override_secret = Some(SecretHash::of("9999"));

        let master = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap();
        assert!(!master.is_success());
        let own = f.verifier.submit("9999", &mut f.challenge, &prefs(1)).unwrap();
        assert!(own.is_success());
    }

    #[test]
    fn test_no_secret_is_error() {
        let mut f = fixture();
        f.verifier.clear_master_secret().unwrap();
        assert!(!f.verifier.has_master_secret());
        let err = f.verifier.submit("1234", &mut f.challenge, &prefs(1)).unwrap_err();
        assert!(matches!(err, Error::NoSecret));
    }

    #[test]
    fn test_change_master_secret() {
        let f = fixture();
        assert!(matches!(
            f.verifier.change_master_secret("0000", "5678", None),
            Err(Error::SecretMismatch)
        ));
        f.verifier.change_master_secret("1234", "5678", None).unwrap();
        assert!(f.verifier.master_secret().unwrap().hash.matches("5678"));
        assert!(f.verifier.hint().is_none());
    }

    #[test]
    fn test_restore_master_secret() {
        let f = fixture();
        let before = f.verifier.master_secret();
        f.verifier.change_master_secret("1234", "5678", None).unwrap();
        f.verifier.restore_master_secret(before).unwrap();
        assert!(f.verifier.master_secret().unwrap().hash.matches("1234"));
        assert_eq!(f.verifier.hint().as_deref(), Some("year"));
    }
}
