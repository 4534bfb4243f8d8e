//! Engine actor
//!
//! One task owns the window snapshot, the active challenge and its failure
//! counter. Everything else talks to it through [`EngineHandle`]. Store
//! work runs on the blocking pool, bounded by the query timeout. At most one
//! decision evaluation is in flight; a newer forwarded window aborts it and
//! any late result is discarded by generation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use warden_core::{
    Challenge, Clock, CredentialVerifier, Decision, DecisionEngine, DeviceLockState, EntryStore,
    EntryView, Error, EventGate, GateContext, GateVerdict, LifecycleManager, LockState, LockoutPolicy,
    PackageInspector, Preferences, RecheckScheduler, ScreenKey, Transition, UnlockOutcome,
    UnlockRequest, Verdict, WindowEvent,
};

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};
use crate::jobs::TokioJobScheduler;
use crate::platform::ReportedDeviceState;
use crate::vault::SecretVault;

/// Notification published to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Show the credential prompt for `key`
    Challenge {
        key: ScreenKey,
        /// Entry that matched (exact or whole-app)
        matched: ScreenKey,
        hint: Option<String>,
        /// Lockout deadline already in force, if any
        locked_until: Option<u64>,
    },
    /// No prompt is needed for `key`
    Cleared { key: ScreenKey },
    /// Attempts on `key` are refused until `until`
    LockedOut {
        key: ScreenKey,
        until: u64,
        remaining: String,
    },
    /// The decision for `key` could not be made
    EvaluationFailed { key: ScreenKey, reason: String },
    /// Stored data broke an invariant; the engine has stopped
    Defect { reason: String },
}

/// Active challenge as reported by status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStatus {
    pub key: ScreenKey,
    pub matched: ScreenKey,
    pub failures: u32,
    pub locked_until: Option<u64>,
}

/// Snapshot of engine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Secret configured and monitoring preference on
    pub monitoring: bool,
    pub secret_configured: bool,
    pub hint: Option<String>,
    pub device_locked: bool,
    /// Last forwarded screen
    pub active: Option<ScreenKey>,
    pub challenge: Option<ChallengeStatus>,
    /// Screen unlocked and waiting for the exclude/ignore choice
    pub awaiting_unlock_choice: Option<ScreenKey>,
    pub preferences: Preferences,
}

/// Terminal outcome of an engine operation
#[derive(Debug)]
pub enum OpOutcome<T> {
    Completed(T),
    Failed(DaemonError),
    Cancelled,
}

/// Handle to one submitted operation; yields exactly one [`OpOutcome`]
#[derive(Debug)]
pub struct PendingOp<T> {
    rx: oneshot::Receiver<Result<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> PendingOp<T> {
    /// Ask the engine to skip this operation if it has not started yet
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Wait for the outcome
    pub async fn outcome(self) -> OpOutcome<T> {
        match self.rx.await {
            Ok(Ok(value)) => OpOutcome::Completed(value),
            Ok(Err(DaemonError::Cancelled)) => OpOutcome::Cancelled,
            Ok(Err(e)) => OpOutcome::Failed(e),
            Err(_) => OpOutcome::Failed(DaemonError::EngineStopped),
        }
    }

    /// Wait for the outcome as a `Result`
    pub async fn wait(self) -> Result<T> {
        match self.outcome().await {
            OpOutcome::Completed(value) => Ok(value),
            OpOutcome::Failed(e) => Err(e),
            OpOutcome::Cancelled => Err(DaemonError::Cancelled),
        }
    }
}

struct Reply<T> {
    tx: oneshot::Sender<Result<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Reply<T> {
    async fn complete<F>(self, work: F)
    where
        F: Future<Output = Result<T>>,
    {
        let result = if self.cancelled.load(Ordering::SeqCst) {
            Err(DaemonError::Cancelled)
        } else {
            work.await
        };
        let _ = self.tx.send(result);
    }
}

fn pending_op<T>() -> (Reply<T>, PendingOp<T>) {
    let (tx, rx) = oneshot::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        Reply {
            tx,
            cancelled: Arc::clone(&cancelled),
        },
        PendingOp { rx, cancelled },
    )
}

enum Command {
    Window(WindowEvent),
    Submit {
        attempt: Zeroizing<String>,
        reply: Reply<Verdict>,
    },
    PostUnlock {
        request: UnlockRequest,
        reply: Reply<UnlockOutcome>,
    },
    SetState {
        key: ScreenKey,
        state: LockState,
        reply: Reply<Transition>,
    },
    ListEntries {
        include_system_apps: bool,
        reply: Reply<Vec<EntryView>>,
    },
    SetMasterSecret {
        secret: Zeroizing<String>,
        hint: Option<String>,
        current: Option<Zeroizing<String>>,
        reply: Reply<()>,
    },
    ClearMasterSecret {
        current: Zeroizing<String>,
        reply: Reply<()>,
    },
    SetPreferences {
        preferences: Preferences,
        reply: Reply<Preferences>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Cloneable front end of the engine task
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<EngineEvent>,
    device: Arc<ReportedDeviceState>,
}

impl EngineHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DaemonError::EngineStopped)
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<PendingOp<T>> {
        let (reply, op) = pending_op();
        self.send(command(reply)).await?;
        Ok(op)
    }

    /// Queue a foreground window change
    pub async fn window_changed(&self, event: WindowEvent) -> Result<()> {
        self.send(Command::Window(event)).await
    }

    /// Report whether the device lock screen is engaged
    pub fn set_device_locked(&self, locked: bool) {
        debug!("Device locked: {}", locked);
        self.device.set_locked(locked);
    }

    /// Check a credential against the active challenge
    pub async fn submit(&self, attempt: &str) -> Result<PendingOp<Verdict>> {
        let attempt = Zeroizing::new(attempt.to_string());
        self.call(|reply| Command::Submit { attempt, reply }).await
    }

    /// Apply the exclude/ignore choice after a successful unlock
    pub async fn post_unlock(&self, request: UnlockRequest) -> Result<PendingOp<UnlockOutcome>> {
        self.call(|reply| Command::PostUnlock { request, reply }).await
    }

    /// Move a key to `state`
    pub async fn set_state(
        &self,
        key: ScreenKey,
        state: LockState,
    ) -> Result<PendingOp<Transition>> {
        self.call(|reply| Command::SetState { key, state, reply })
            .await
    }

    /// Entries with labels; system apps follow the preference unless forced
    pub async fn list_entries(&self, include_system_apps: bool) -> Result<PendingOp<Vec<EntryView>>> {
        self.call(|reply| Command::ListEntries {
            include_system_apps,
            reply,
        })
        .await
    }

    /// Set the master secret; replacing one requires `current`
    pub async fn set_master_secret(
        &self,
        secret: &str,
        hint: Option<String>,
        current: Option<&str>,
    ) -> Result<PendingOp<()>> {
        let secret = Zeroizing::new(secret.to_string());
        let current = current.map(|c| Zeroizing::new(c.to_string()));
        self.call(|reply| Command::SetMasterSecret {
            secret,
            hint,
            current,
            reply,
        })
        .await
    }

    /// Remove the master secret, which disables monitoring
    pub async fn clear_master_secret(&self, current: &str) -> Result<PendingOp<()>> {
        let current = Zeroizing::new(current.to_string());
        self.call(|reply| Command::ClearMasterSecret { current, reply })
            .await
    }

    /// Replace the preferences
    pub async fn set_preferences(&self, preferences: Preferences) -> Result<PendingOp<Preferences>> {
        self.call(|reply| Command::SetPreferences { preferences, reply })
            .await
    }

    /// Current engine state
    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| DaemonError::EngineStopped)
    }

    /// Receive engine events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Engine tuning taken from the daemon configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub challenge_screen: ScreenKey,
    pub query_timeout: Duration,
    pub command_queue_depth: usize,
    pub event_queue_depth: usize,
    pub preferences: Preferences,
}

impl EngineSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            challenge_screen: config.challenge_screen.clone(),
            query_timeout: config.query_timeout(),
            command_queue_depth: config.command_queue_depth,
            event_queue_depth: config.event_queue_depth,
            preferences: config.preferences.clone(),
        }
    }
}

/// Collaborators the engine is built from
pub struct EngineDeps {
    pub store: Arc<dyn EntryStore>,
    pub inspector: Arc<dyn PackageInspector>,
    pub device: Arc<ReportedDeviceState>,
    pub vault: SecretVault,
    pub clock: Arc<dyn Clock>,
}

/// Build the engine and start its task on the current runtime
pub fn spawn(
    settings: EngineSettings,
    deps: EngineDeps,
) -> Result<(EngineHandle, JoinHandle<Result<()>>)> {
    let runtime = Handle::try_current()
        .map_err(|e| DaemonError::Config(format!("engine needs a tokio runtime: {}", e)))?;

    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let jobs = Arc::new(TokioJobScheduler::new(
        runtime.clone(),
        Arc::clone(&deps.clock),
        fired_tx,
    ));
    let recheck = Arc::new(RecheckScheduler::new(jobs, Arc::clone(&deps.clock)));
    let lifecycle = Arc::new(LifecycleManager::new(
        Arc::clone(&deps.store),
        Arc::clone(&deps.inspector),
        Arc::clone(&recheck),
        Arc::clone(&deps.clock),
    ));
    let master = deps.vault.load()?;
    info!(
        "Master secret {}",
        if master.is_some() { "loaded" } else { "not set" }
    );
    let verifier = Arc::new(CredentialVerifier::with_master(
        Arc::clone(&lifecycle),
        Arc::clone(&deps.clock),
        master,
    ));

    let (commands_tx, commands_rx) = mpsc::channel(settings.command_queue_depth);
    let (events_tx, _) = broadcast::channel(settings.event_queue_depth);
    let (evaluated_tx, evaluated_rx) = mpsc::unbounded_channel();

    let engine = Engine {
        gate: EventGate::new(settings.challenge_screen),
        prefs: settings.preferences,
        challenge: None,
        unlocked: None,
        evaluation: None,
        generation: 0,
        decision: Arc::new(DecisionEngine::new(Arc::clone(&deps.store))),
        verifier,
        lifecycle,
        recheck,
        store: deps.store,
        inspector: deps.inspector,
        device: Arc::clone(&deps.device),
        vault: deps.vault,
        clock: deps.clock,
        query_timeout: settings.query_timeout,
        events: events_tx.clone(),
        evaluated: evaluated_tx,
    };

    let task = runtime.spawn(engine.run(commands_rx, evaluated_rx, fired_rx));
    let handle = EngineHandle {
        commands: commands_tx,
        events: events_tx,
        device: deps.device,
    };
    Ok((handle, task))
}

/// Run `work` on the blocking pool, bounded by `timeout`.
///
/// A blocking task cannot be interrupted, so work that times out keeps
/// running and its store writes may still commit after the caller has seen
/// [`DaemonError::Timeout`]. Callers rely on those writes being safe to
/// observe later: a persisted lockout is read back by the next attempt, and
/// repeating a post-unlock request rewrites the same grace window.
async fn offload<T, E, F>(timeout: Duration, work: F) -> Result<T>
where
    T: Send + 'static,
    E: Into<DaemonError> + Send + 'static,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result.map_err(Into::into),
        Ok(Err(e)) => Err(DaemonError::Worker(e.to_string())),
        Err(_) => {
            warn!("Store operation exceeded {:?}", timeout);
            Err(DaemonError::Timeout)
        }
    }
}

struct InFlight {
    generation: u64,
    key: ScreenKey,
    task: JoinHandle<()>,
}

struct Evaluated {
    generation: u64,
    key: ScreenKey,
    result: Result<Decision>,
}

struct Engine {
    gate: EventGate,
    prefs: Preferences,
    challenge: Option<Challenge>,
    unlocked: Option<Challenge>,
    evaluation: Option<InFlight>,
    generation: u64,
    decision: Arc<DecisionEngine>,
    verifier: Arc<CredentialVerifier>,
    lifecycle: Arc<LifecycleManager>,
    recheck: Arc<RecheckScheduler>,
    store: Arc<dyn EntryStore>,
    inspector: Arc<dyn PackageInspector>,
    device: Arc<ReportedDeviceState>,
    vault: SecretVault,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
    events: broadcast::Sender<EngineEvent>,
    evaluated: mpsc::UnboundedSender<Evaluated>,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut evaluated: mpsc::UnboundedReceiver<Evaluated>,
        mut fired: mpsc::UnboundedReceiver<String>,
    ) -> Result<()> {
        self.rearm_rechecks().await;
        info!("Engine running");

        let result = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break Ok(()),
                },
                Some(done) = evaluated.recv() => {
                    if let Err(e) = self.on_evaluated(done) {
                        break Err(e);
                    }
                }
                Some(tag) = fired.recv() => self.on_fired(&tag),
            }
        };

        if let Some(in_flight) = self.evaluation.take() {
            in_flight.task.abort();
        }
        match &result {
            Ok(()) => info!("Engine stopped"),
            Err(e) => error!("Engine halted: {}", e),
        }
        result
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Window(event) => self.on_window(event),
            Command::Submit { attempt, reply } => reply.complete(self.submit(attempt)).await,
            Command::PostUnlock { request, reply } => {
                reply.complete(self.post_unlock(request)).await
            }
            Command::SetState { key, state, reply } => {
                reply.complete(self.set_state(key, state)).await
            }
            Command::ListEntries {
                include_system_apps,
                reply,
            } => reply.complete(self.list_entries(include_system_apps)).await,
            Command::SetMasterSecret {
                secret,
                hint,
                current,
                reply,
            } => {
                reply
                    .complete(self.set_master_secret(secret, hint, current))
                    .await
            }
            Command::ClearMasterSecret { current, reply } => {
                reply.complete(self.clear_master_secret(current)).await
            }
            Command::SetPreferences { preferences, reply } => {
                reply.complete(self.set_preferences(preferences)).await
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_window(&mut self, event: WindowEvent) {
        let ctx = GateContext {
            inspector: self.inspector.as_ref(),
            device: self.device.as_ref(),
            prefs: &self.prefs,
            secret_configured: self.verifier.has_master_secret(),
        };
        if let GateVerdict::Forward(key) = self.gate.filter(&event, &ctx) {
            self.start_evaluation(key);
        }
    }

    fn on_fired(&mut self, tag: &str) {
        match RecheckScheduler::fired(tag) {
            Some(event) => {
                if self.gate.snapshot().active().as_ref() != Some(&event.key) {
                    debug!("Recheck for {} dropped, screen no longer active", event.key);
                    return;
                }
                info!("Recheck due for {}", event.key);
                self.on_window(event);
            }
            None => warn!("Ignoring unknown job {}", tag),
        }
    }

    fn start_evaluation(&mut self, key: ScreenKey) {
        if let Some(previous) = self.evaluation.take() {
            previous.task.abort();
            debug!("Evaluation of {} superseded", previous.key);
        }

        self.generation += 1;
        let generation = self.generation;
        let decision = Arc::clone(&self.decision);
        let clock = Arc::clone(&self.clock);
        let done = self.evaluated.clone();
        let timeout = self.query_timeout;
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let lookup = task_key.clone();
            let result = offload(timeout, move || decision.evaluate(&lookup, clock.now_millis())).await;
            let _ = done.send(Evaluated {
                generation,
                key: task_key,
                result,
            });
        });

        self.evaluation = Some(InFlight {
            generation,
            key,
            task,
        });
    }

    fn on_evaluated(&mut self, done: Evaluated) -> Result<()> {
        match &self.evaluation {
            Some(current) if current.generation == done.generation => self.evaluation = None,
            _ => {
                debug!("Discarding stale evaluation of {}", done.key);
                return Ok(());
            }
        }

        let key = done.key;
        match done.result {
            Ok(Decision::NoChallenge) => {
                self.gate.mark_passed(&key);
                self.challenge = None;
                self.emit(EngineEvent::Cleared { key });
            }
            Ok(Decision::Challenge(entry)) => {
                let now = self.clock.now_millis();
                let locked_until = entry.is_locked_out(now).then_some(entry.lock_until);
                let matched = entry.key.clone();

                match &mut self.challenge {
                    // Same screen again: keep its failure count
                    Some(active) if active.key == key => active.entry = entry,
                    _ => {
                        info!("Challenge required for {} ({})", key, matched);
                        self.unlocked = None;
                        self.challenge = Some(Challenge::new(key.clone(), entry));
                    }
                }
                self.emit(EngineEvent::Challenge {
                    key,
                    matched,
                    hint: self.verifier.hint(),
                    locked_until,
                });
            }
            Err(e) if e.is_fatal() => {
                error!("Defect while evaluating {}: {}", key, e);
                self.emit(EngineEvent::Defect {
                    reason: e.to_string(),
                });
                return Err(e);
            }
            Err(e) => {
                warn!("Evaluation of {} failed: {}", key, e);
                self.emit(EngineEvent::EvaluationFailed {
                    key,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn submit(&mut self, attempt: Zeroizing<String>) -> Result<Verdict> {
        let challenge = self
            .challenge
            .clone()
            .ok_or(DaemonError::NoActiveChallenge)?;
        let verifier = Arc::clone(&self.verifier);
        let prefs = self.prefs.clone();

        let (challenge, verdict) = offload(
            self.query_timeout,
            move || -> warden_core::Result<(Challenge, Verdict)> {
                let mut challenge = challenge;
                let verdict = verifier.submit(&attempt, &mut challenge, &prefs)?;
                Ok((challenge, verdict))
            },
        )
        .await?;

        let key = challenge.key.clone();
        match verdict {
            Verdict::Success => {
                self.gate.mark_passed(&key);
                self.challenge = None;
                self.unlocked = Some(challenge);
                self.emit(EngineEvent::Cleared { key });
            }
            Verdict::LockedOut { until } => {
                let remaining = LockoutPolicy::describe_remaining(until, self.clock.now_millis());
                self.challenge = Some(challenge);
                self.emit(EngineEvent::LockedOut {
                    key,
                    until,
                    remaining,
                });
            }
            Verdict::Fail { .. } => self.challenge = Some(challenge),
        }
        Ok(verdict)
    }

    async fn post_unlock(&mut self, request: UnlockRequest) -> Result<UnlockOutcome> {
        let unlocked = self.unlocked.take().ok_or(DaemonError::NoActiveChallenge)?;
        let lifecycle = Arc::clone(&self.lifecycle);
        let prefs = self.prefs.clone();
        let target = unlocked.clone();

        let result = offload(self.query_timeout, move || {
            lifecycle.post_unlock(&target.key, &target.entry, request, &prefs)
        })
        .await;
        if result.is_err() {
            self.unlocked = Some(unlocked);
        }
        result
    }

    async fn set_state(&mut self, key: ScreenKey, state: LockState) -> Result<Transition> {
        let lifecycle = Arc::clone(&self.lifecycle);
        offload(self.query_timeout, move || lifecycle.set_state(&key, state)).await
    }

    async fn list_entries(&mut self, include_system_apps: bool) -> Result<Vec<EntryView>> {
        let lifecycle = Arc::clone(&self.lifecycle);
        let include = include_system_apps || self.prefs.system_apps_visible;
        offload(self.query_timeout, move || lifecycle.list_entries(include)).await
    }

    async fn set_master_secret(
        &mut self,
        secret: Zeroizing<String>,
        hint: Option<String>,
        current: Option<Zeroizing<String>>,
    ) -> Result<()> {
        let verifier = Arc::clone(&self.verifier);
        let vault = self.vault.clone();

        offload(self.query_timeout, move || -> Result<()> {
            let previous = verifier.master_secret();
            let master = match (&previous, current) {
                (Some(_), Some(current)) => verifier.change_master_secret(&current, &secret, hint)?,
                (Some(_), None) => return Err(DaemonError::Core(Error::SecretMismatch)),
                (None, _) => verifier.set_master_secret(&secret, hint)?,
            };
            if let Err(e) = vault.save(&master) {
                verifier.restore_master_secret(previous)?;
                return Err(e);
            }
            Ok(())
        })
        .await
    }

    async fn clear_master_secret(&mut self, current: Zeroizing<String>) -> Result<()> {
        let verifier = Arc::clone(&self.verifier);
        let vault = self.vault.clone();

        offload(self.query_timeout, move || -> Result<()> {
            let master = verifier.master_secret().ok_or(Error::NoSecret)?;
            if !master.hash.matches(&current) {
                return Err(DaemonError::Core(Error::SecretMismatch));
            }
            vault.clear()?;
            verifier.clear_master_secret()?;
            Ok(())
        })
        .await?;

        self.stand_down();
        Ok(())
    }

    async fn set_preferences(&mut self, preferences: Preferences) -> Result<Preferences> {
        info!("Preferences updated");
        self.prefs = preferences;
        if !self.prefs.monitoring_enabled {
            self.stand_down();
        }
        Ok(self.prefs.clone())
    }

    /// Monitoring turned off: forget windows and dismiss any prompt
    fn stand_down(&mut self) {
        self.gate.reset();
        self.unlocked = None;
        if let Some(in_flight) = self.evaluation.take() {
            in_flight.task.abort();
        }
        if let Some(challenge) = self.challenge.take() {
            self.emit(EngineEvent::Cleared { key: challenge.key });
        }
    }

    fn status(&self) -> EngineStatus {
        let secret_configured = self.verifier.has_master_secret();
        let now = self.clock.now_millis();
        EngineStatus {
            monitoring: secret_configured && self.prefs.monitoring_enabled,
            secret_configured,
            hint: self.verifier.hint(),
            device_locked: self.device.is_device_locked(),
            active: self.gate.snapshot().active(),
            challenge: self.challenge.as_ref().map(|c| ChallengeStatus {
                key: c.key.clone(),
                matched: c.entry.key.clone(),
                failures: c.failures(),
                locked_until: c.entry.is_locked_out(now).then_some(c.entry.lock_until),
            }),
            awaiting_unlock_choice: self.unlocked.as_ref().map(|c| c.key.clone()),
            preferences: self.prefs.clone(),
        }
    }

    /// Job timers do not survive a restart; re-arm them from stored ignore windows
    async fn rearm_rechecks(&self) {
        if !self.prefs.recheck_enabled {
            return;
        }
        let store = Arc::clone(&self.store);
        let entries = match offload(self.query_timeout, move || store.query_all()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not re-arm rechecks: {}", e);
                return;
            }
        };

        let now = self.clock.now_millis();
        for entry in entries
            .iter()
            .filter(|e| e.is_ignoring(now) && !e.key.is_whole_app())
        {
            match self.recheck.schedule(&entry.key, entry.ignore_until - now) {
                Ok(at) => debug!("Re-armed recheck for {} at {}", entry.key, at),
                Err(e) => warn!("Could not re-arm recheck for {}: {}", entry.key, e),
            }
        }
    }
}
