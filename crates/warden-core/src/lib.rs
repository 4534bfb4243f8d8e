//! Warden Core - lock decisions for foreground window changes
//!
//! This crate holds the synchronous heart of Warden:
//! - Window event filtering and debounce ([`EventGate`])
//! - Lock lookups for a window ([`DecisionEngine`])
//! - Credential checks with escalating lockout ([`CredentialVerifier`])
//! - Lock entry transitions and post-unlock effects ([`LifecycleManager`])
//! - Recheck scheduling once an ignore window expires ([`RecheckScheduler`])
//!
//! Storage, the host window source and the job timer are collaborators
//! described by the traits in [`platform`], [`store`] and [`scheduler`].

pub mod clock;
pub mod decision;
pub mod entry;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod lockout;
pub mod platform;
pub mod prefs;
pub mod scheduler;
pub mod secret;
pub mod store;
pub mod types;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, DecisionEngine};
pub use entry::LockEntry;
pub use error::{Error, Result};
pub use gate::{EventGate, FilterReason, GateContext, GateVerdict, WindowSnapshot};
pub use lifecycle::{EntryView, LifecycleManager, Transition, UnlockOutcome, UnlockRequest};
pub use lockout::LockoutPolicy;
pub use platform::{DeviceLockState, PackageInspector};
pub use prefs::Preferences;
pub use scheduler::{JobScheduler, ManualJobScheduler, RecheckScheduler};
pub use secret::{MasterSecret, SecretHash};
pub use store::{EntryMap, EntryStore, MemoryEntryStore};
pub use types::{LockState, ScreenKey, WindowEvent};
pub use verifier::{Challenge, CredentialVerifier, FailureCounter, Verdict};

/// Reserved screen id meaning "the entire application"
pub const WHOLE_APP_SCREEN: &str = "*";

/// Consecutive failures tolerated before lockout applies
pub const FAILURE_THRESHOLD: u32 = 2;

/// Pad added to every ignore window so rapid re-entry (multi-window) does not race the recheck
pub const IGNORE_PAD_MILLIS: u64 = 1_000;

/// Milliseconds per minute
pub const MILLIS_PER_MINUTE: u64 = 60_000;
