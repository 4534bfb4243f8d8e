//! Scenario tests for the Warden access-control core
//!
//! These tests wire the gate, decision engine, verifier, lifecycle manager
//! and recheck scheduler together the way a host does, and drive them with
//! a manual clock and job scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;

use rstest::rstest;

use warden_core::{
    Challenge, Clock, CredentialVerifier, Decision, DecisionEngine, EntryStore, Error, EventGate,
    FilterReason, GateContext, GateVerdict, LifecycleManager, LockEntry, LockState, ManualClock,
    ManualJobScheduler, MemoryEntryStore, Preferences, RecheckScheduler, ScreenKey, Transition,
    UnlockOutcome, UnlockRequest, Verdict, WindowEvent,
};
use warden_daemon::{ConfiguredInspector, ReportedDeviceState};

const START: u64 = 1_700_000_000_000;
const APP: &str = "com.example.app";
const MAIN: &str = "MainActivity";

/// In-process host driving the core components
struct Host {
    clock: Arc<ManualClock>,
    store: Arc<MemoryEntryStore>,
    jobs: Arc<ManualJobScheduler>,
    inspector: Arc<ConfiguredInspector>,
    device: ReportedDeviceState,
    prefs: Preferences,
    gate: EventGate,
    decision: DecisionEngine,
    lifecycle: Arc<LifecycleManager>,
    verifier: CredentialVerifier,
    challenge: Option<Challenge>,
}

impl Host {
    fn new() -> Self {
        Self::with_store(MemoryEntryStore::new())
    }

    fn with_store(store: MemoryEntryStore) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(store);
        let jobs = Arc::new(ManualJobScheduler::new());
        let inspector = Arc::new(ConfiguredInspector::new(
            vec!["com.android.settings".to_string()],
            BTreeMap::new(),
        ));
        let recheck = Arc::new(RecheckScheduler::new(jobs.clone(), clock.clone()));
        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            inspector.clone(),
            recheck,
            clock.clone(),
        ));
        let verifier = CredentialVerifier::new(lifecycle.clone(), clock.clone());
        verifier.set_master_secret("1234", Some("pin".to_string())).unwrap();

        Self {
            decision: DecisionEngine::new(store.clone()),
            gate: EventGate::new(ScreenKey::new("io.warden.daemon", "ChallengeScreen")),
            device: ReportedDeviceState::default(),
            prefs: Preferences::default(),
            challenge: None,
            clock,
            store,
            jobs,
            inspector,
            lifecycle,
            verifier,
        }
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Run one window event through the gate and, if forwarded, decide
    fn window(&mut self, event: WindowEvent) -> Result<Option<Decision>, Error> {
        let ctx = GateContext {
            inspector: self.inspector.as_ref(),
            device: &self.device,
            prefs: &self.prefs,
            secret_configured: self.verifier.has_master_secret(),
        };
        let key = match self.gate.filter(&event, &ctx) {
            GateVerdict::Forward(key) => key,
            GateVerdict::Filtered(_) => return Ok(None),
        };

        let decision = self.decision.evaluate(&key, self.now())?;
        match &decision {
            Decision::NoChallenge => {
                self.gate.mark_passed(&key);
                self.challenge = None;
            }
            Decision::Challenge(entry) => {
                let same = self.challenge.as_ref().map(|c| &c.key) == Some(&key);
                if !same {
                    self.challenge = Some(Challenge::new(key, entry.clone()));
                }
            }
        }
        Ok(Some(decision))
    }

    fn open(&mut self, screen: &str) -> Option<Decision> {
        self.window(WindowEvent::new(APP, screen)).unwrap()
    }

    fn submit(&mut self, attempt: &str) -> Verdict {
        let mut challenge = self.challenge.take().expect("no active challenge");
        let verdict = self.verifier.submit(attempt, &mut challenge, &self.prefs).unwrap();
        if verdict.is_success() {
            self.gate.mark_passed(&challenge.key);
        }
        self.challenge = Some(challenge);
        verdict
    }

    fn unlock(&mut self, request: UnlockRequest) -> Result<UnlockOutcome, Error> {
        let challenge = self.challenge.take().expect("no unlocked challenge");
        self.lifecycle
            .post_unlock(&challenge.key, &challenge.entry, request, &self.prefs)
    }

    /// Fire every due recheck job as a forced event, skipping screens the
    /// user has since left
    fn tick(&mut self) -> Vec<Option<Decision>> {
        let due = self.jobs.take_due(self.now());
        let active = self.gate.snapshot().active();
        let events: Vec<WindowEvent> = due
            .iter()
            .filter_map(|tag| RecheckScheduler::fired(tag))
            .filter(|event| active.as_ref() == Some(&event.key))
            .collect();
        events
            .into_iter()
            .map(|event| self.window(event).unwrap())
            .collect()
    }
}

fn main_key() -> ScreenKey {
    ScreenKey::new(APP, MAIN)
}

// ============================================
// Scenarios
// ============================================

/// No entry, user locks the screen, next event is challenged
#[test]
fn test_scenario_a_lock_then_challenge() {
    let mut host = Host::new();
    assert_eq!(host.open(MAIN), Some(Decision::NoChallenge));

    let transition = host
        .lifecycle
        .set_state(&main_key(), LockState::Locked)
        .unwrap();
    assert_eq!(transition, Transition::Created);

    let entry = host.store.find_exact(&main_key()).unwrap().unwrap();
    assert!(!entry.whitelisted);

    // Same screen again: it was passed before, so force the re-evaluation
    let decision = host
        .window(WindowEvent::forced(main_key()))
        .unwrap()
        .unwrap();
    assert!(matches!(decision, Decision::Challenge(ref e) if e.key == main_key()));
}

/// A whitelisted screen without a grace window is let through
#[test]
fn test_scenario_b_whitelisted_screen() {
    let store =
        MemoryEntryStore::with_entries(vec![LockEntry::whitelisted(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);

    assert_eq!(host.open(MAIN), Some(Decision::NoChallenge));
    assert_eq!(
        host.decision.evaluate(&main_key(), host.now()).unwrap(),
        Decision::NoChallenge
    );
}

/// A whitelisted screen stays open even when its whole package is locked
#[test]
fn test_scenario_b_exact_entry_wins_over_whole_app() {
    let store = MemoryEntryStore::with_entries(vec![
        LockEntry::locked(ScreenKey::whole_app(APP), false),
        LockEntry::whitelisted(main_key(), false),
    ])
    .unwrap();
    let mut host = Host::with_store(store);

    assert_eq!(host.open(MAIN), Some(Decision::NoChallenge));
    assert!(host.open("SettingsActivity").unwrap().is_challenge());
}

/// Correct attempt, then a five minute grace window with a recheck
#[test]
fn test_scenario_c_unlock_then_ignore() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    assert_eq!(host.submit("1234"), Verdict::Success);

    let now = host.now();
    let outcome = host
        .unlock(UnlockRequest {
            exclude: false,
            ignore_minutes: Some(5),
        })
        .unwrap();

    let expected = now + 300_000 + 1_000;
    assert_eq!(
        outcome,
        UnlockOutcome::Ignoring {
            key: main_key(),
            ignore_until: expected,
            recheck_at: Some(expected),
        }
    );
    assert_eq!(
        host.store.find_exact(&main_key()).unwrap().unwrap().ignore_until,
        expected
    );
    assert_eq!(
        host.jobs.pending(),
        vec![(RecheckScheduler::tag_for(&main_key()), expected)]
    );
}

/// Three wrong attempts lock the entry for the timeout period
#[test]
fn test_scenario_d_lockout() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);
    assert_eq!(host.prefs.timeout_period_minutes, 1);

    assert!(host.open(MAIN).unwrap().is_challenge());
    let now = host.now();

    assert!(matches!(host.submit("0000"), Verdict::Fail { failures: 1, .. }));
    assert!(matches!(host.submit("0000"), Verdict::Fail { failures: 2, .. }));
    assert_eq!(host.submit("0000"), Verdict::LockedOut { until: now + 60_000 });
    assert_eq!(
        host.store.find_exact(&main_key()).unwrap().unwrap().lock_until,
        now + 60_000
    );

    // Even the right secret is refused inside the lockout
    host.clock.advance(59_999);
    assert_eq!(host.submit("1234"), Verdict::LockedOut { until: now + 60_000 });

    host.clock.advance(1);
    assert_eq!(host.submit("1234"), Verdict::Success);
}

/// The engine's own challenge screen never reaches the decision engine
#[rstest]
#[case(false, false, false)]
#[case(true, false, false)]
#[case(false, true, false)]
#[case(false, false, true)]
#[case(true, true, true)]
fn test_scenario_e_own_screen_ignored(
    #[case] forced: bool,
    #[case] device_locked: bool,
    #[case] package_change: bool,
) {
    let own = ScreenKey::new("io.warden.daemon", "ChallengeScreen");
    let store = MemoryEntryStore::with_entries(vec![
        LockEntry::locked(own.clone(), false),
        LockEntry::locked(ScreenKey::whole_app("io.warden.daemon"), false),
    ])
    .unwrap();
    let mut host = Host::with_store(store);
    host.device.set_locked(device_locked);
    host.prefs.lock_on_package_change_only = package_change;

    let event = WindowEvent {
        key: own.clone(),
        forced_recheck: forced,
    };
    assert_eq!(host.window(event).unwrap(), None);

    let ctx = GateContext {
        inspector: host.inspector.as_ref(),
        device: &host.device,
        prefs: &host.prefs,
        secret_configured: true,
    };
    let mut gate = EventGate::new(own.clone());
    assert_eq!(
        gate.filter(&WindowEvent::forced(own), &ctx),
        GateVerdict::Filtered(FilterReason::SelfChallenge)
    );
}

// ============================================
// Properties
// ============================================

/// A whole-app key can never be whitelisted, by toggle or by exclude
#[test]
fn test_whole_app_whitelist_fails_loudly() {
    let mut host = Host::new();
    let whole = ScreenKey::whole_app(APP);

    assert!(matches!(
        host.lifecycle.set_state(&whole, LockState::Whitelisted),
        Err(Error::WholeAppWhitelist { .. })
    ));

    host.lifecycle.set_state(&whole, LockState::Locked).unwrap();
    let entry = host.store.find_exact(&whole).unwrap().unwrap();
    host.challenge = Some(Challenge::new(whole.clone(), entry));
    assert!(matches!(
        host.unlock(UnlockRequest {
            exclude: true,
            ignore_minutes: None,
        }),
        Err(Error::WholeAppWhitelist { .. })
    ));

    assert!(host
        .store
        .query_all()
        .unwrap()
        .iter()
        .all(|e| !(e.key.is_whole_app() && e.whitelisted)));
}

/// Excluding a screen reached through a whole-app lock whitelists only that screen
#[test]
fn test_exclude_under_whole_app_lock() {
    let store =
        MemoryEntryStore::with_entries(vec![LockEntry::locked(ScreenKey::whole_app(APP), false)])
            .unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    assert_eq!(host.submit("1234"), Verdict::Success);
    let outcome = host
        .unlock(UnlockRequest {
            exclude: true,
            ignore_minutes: None,
        })
        .unwrap();
    assert_eq!(outcome, UnlockOutcome::Excluded { key: main_key() });

    assert_eq!(
        host.lifecycle.state_of(&main_key()).unwrap(),
        LockState::Whitelisted
    );
    assert_eq!(
        host.lifecycle.state_of(&ScreenKey::whole_app(APP)).unwrap(),
        LockState::Locked
    );
    assert!(host.open("OtherActivity").unwrap().is_challenge());
}

/// Evaluation does not change the store
#[test]
fn test_evaluate_is_idempotent() {
    let store = MemoryEntryStore::with_entries(vec![
        LockEntry::locked(ScreenKey::whole_app(APP), false),
        LockEntry::whitelisted(main_key(), false),
    ])
    .unwrap();
    let host = Host::with_store(store);
    let before = host.store.query_all().unwrap();

    for screen in [MAIN, "Other"] {
        let key = ScreenKey::new(APP, screen);
        let first = host.decision.evaluate(&key, host.now()).unwrap();
        let second = host.decision.evaluate(&key, host.now()).unwrap();
        assert_eq!(first, second);
    }
    assert_eq!(host.store.query_all().unwrap(), before);
}

/// A correct attempt mid-challenge keeps the failure count; a new challenge resets it
#[test]
fn test_failure_counter_resets_only_on_new_challenge() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(
        ScreenKey::whole_app(APP),
        false,
    )])
    .unwrap();
    let mut host = Host::with_store(store);
    host.prefs.timeout_period_minutes = 0;

    assert!(host.open(MAIN).unwrap().is_challenge());
    host.submit("0000");
    host.submit("0000");
    assert_eq!(host.challenge.as_ref().unwrap().failures(), 2);

    // Re-reporting the same screen keeps the challenge
    assert!(host
        .window(WindowEvent::forced(main_key()))
        .unwrap()
        .unwrap()
        .is_challenge());
    assert_eq!(host.challenge.as_ref().unwrap().failures(), 2);

    assert_eq!(host.submit("1234"), Verdict::Success);
    assert_eq!(host.challenge.as_ref().unwrap().failures(), 2);

    assert!(host.open("Other").unwrap().is_challenge());
    assert_eq!(host.challenge.as_ref().unwrap().failures(), 0);
}

/// No lockout when the timeout period is zero
#[rstest]
#[case(0, None)]
#[case(1, Some(60_000))]
#[case(10, Some(600_000))]
fn test_lockout_length_follows_timeout(#[case] minutes: u64, #[case] length: Option<u64>) {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);
    host.prefs.timeout_period_minutes = minutes;

    assert!(host.open(MAIN).unwrap().is_challenge());
    let now = host.now();
    host.submit("0000");
    host.submit("0000");
    let third = host.submit("0000");

    match length {
        Some(length) => {
            assert_eq!(third, Verdict::LockedOut { until: now + length });
            let entry = host.store.find_exact(&main_key()).unwrap().unwrap();
            assert!(entry.lock_until >= now + length);
        }
        None => {
            assert!(matches!(third, Verdict::Fail { failures: 3, .. }));
            assert_eq!(
                host.store.find_exact(&main_key()).unwrap().unwrap().lock_until,
                0
            );
        }
    }
}

/// Rescheduling the same screen leaves one pending job at the latest time
#[test]
fn test_reschedule_leaves_one_job() {
    let host = Host::new();
    let recheck = RecheckScheduler::new(host.jobs.clone(), host.clock.clone());

    recheck.schedule(&main_key(), 10_000).unwrap();
    let at = recheck.schedule(&main_key(), 20_000).unwrap();

    assert_eq!(at, START + 20_000);
    assert_eq!(
        host.jobs.pending(),
        vec![(RecheckScheduler::tag_for(&main_key()), START + 20_000)]
    );
}

// ============================================
// Full cycles
// ============================================

/// Grace window ends, the recheck fires, and the screen is challenged again
#[test]
fn test_recheck_rechallenges_after_grace_window() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    assert_eq!(host.submit("1234"), Verdict::Success);
    host.unlock(UnlockRequest {
        exclude: false,
        ignore_minutes: Some(1),
    })
    .unwrap();

    // Inside the window the same screen is debounced
    assert_eq!(host.open(MAIN), None);
    host.clock.advance(30_000);
    assert!(host.tick().is_empty());

    host.clock.advance(31_000);
    let fired = host.tick();
    assert_eq!(fired.len(), 1);
    assert!(fired[0].as_ref().unwrap().is_challenge());
}

/// A recheck for a screen the user already left leaves the live challenge alone
#[test]
fn test_recheck_for_left_screen_keeps_current_challenge() {
    let other = ScreenKey::new(APP, "SettingsActivity");
    let store = MemoryEntryStore::with_entries(vec![
        LockEntry::locked(main_key(), false),
        LockEntry::locked(other.clone(), false),
    ])
    .unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    assert_eq!(host.submit("1234"), Verdict::Success);
    host.unlock(UnlockRequest {
        exclude: false,
        ignore_minutes: Some(0),
    })
    .unwrap();

    assert!(host.open("SettingsActivity").unwrap().is_challenge());
    assert!(matches!(host.submit("0000"), Verdict::Fail { failures: 1, .. }));
    assert!(matches!(host.submit("0000"), Verdict::Fail { failures: 2, .. }));

    host.clock.advance(5_000);
    assert!(host.tick().is_empty());
    assert!(host.jobs.pending().is_empty());

    let challenge = host.challenge.as_ref().unwrap();
    assert_eq!(challenge.key, other);
    assert_eq!(challenge.failures(), 2);
}

/// Removing an entry cancels its pending recheck
#[test]
fn test_clear_cancels_recheck() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    host.submit("1234");
    host.unlock(UnlockRequest::default()).unwrap();
    assert_eq!(host.jobs.pending().len(), 1);

    let transition = host
        .lifecycle
        .set_state(&main_key(), LockState::Default)
        .unwrap();
    assert_eq!(transition, Transition::Deleted);
    assert!(host.jobs.pending().is_empty());
}

/// Disabling recheck still grants the grace window
#[test]
fn test_ignore_without_recheck() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);
    host.prefs.recheck_enabled = false;

    assert!(host.open(MAIN).unwrap().is_challenge());
    host.submit("1234");
    let outcome = host.unlock(UnlockRequest::default()).unwrap();

    assert!(matches!(
        outcome,
        UnlockOutcome::Ignoring {
            recheck_at: None,
            ..
        }
    ));
    assert!(host.jobs.pending().is_empty());
    assert_eq!(
        host.decision.evaluate(&main_key(), host.now()).unwrap(),
        Decision::NoChallenge
    );
}

/// Nothing is forwarded until a master secret exists
#[test]
fn test_no_master_secret_disables_monitoring() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);
    host.verifier.clear_master_secret().unwrap();

    assert_eq!(host.open(MAIN), None);
    host.verifier.set_master_secret("9876", None).unwrap();
    assert!(host.open(MAIN).unwrap().is_challenge());
}

/// Per-entry secrets replace the master secret
#[test]
fn test_override_secret() {
    let entry = LockEntry::locked(main_key(), false)
        .with_override_secret(warden_core::SecretHash::of("4321"));
    let store = MemoryEntryStore::with_entries(vec![entry]).unwrap();
    let mut host = Host::with_store(store);

    assert!(host.open(MAIN).unwrap().is_challenge());
    assert!(matches!(host.submit("1234"), Verdict::Fail { .. }));
    assert_eq!(host.submit("4321"), Verdict::Success);
}

/// Device lock with restriction drops events; without it the window history resets
#[test]
fn test_device_lock_handling() {
    let store = MemoryEntryStore::with_entries(vec![LockEntry::locked(main_key(), false)]).unwrap();
    let mut host = Host::with_store(store);

    host.device.set_locked(true);
    host.prefs.restricted_while_device_locked = true;
    assert_eq!(host.open(MAIN), None);

    host.prefs.restricted_while_device_locked = false;
    assert!(host.open(MAIN).unwrap().is_challenge());
    assert_eq!(host.submit("1234"), Verdict::Success);

    // Locked device forgets the passed screen, so it is challenged again
    assert!(host.open(MAIN).unwrap().is_challenge());
}

/// System apps are hidden from listings unless asked for
#[test]
fn test_list_entries_hides_system_apps() {
    let host = Host::new();
    host.lifecycle
        .set_state(&main_key(), LockState::Locked)
        .unwrap();
    host.lifecycle
        .set_state(&ScreenKey::whole_app("com.android.settings"), LockState::Locked)
        .unwrap();

    let visible = host.lifecycle.list_entries(false).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].entry.key, main_key());

    let all = host.lifecycle.list_entries(true).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|v| v.entry.is_system_app));
}
