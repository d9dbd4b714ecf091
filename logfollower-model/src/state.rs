use serde::{Deserialize, Serialize};

use crate::Tick;

/// The follower's phase, surfaced to the supervising process.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Initializing,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// A serializable summary of the last error the follower hit, persisted
/// alongside [`ApplierState`] so `logfollower status` can report it
/// without needing the full typed error hierarchy of `logfollower-core`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: String,
    pub message: String,
}

/// Process-wide durable state of the follower.
///
/// Persisted atomically through the storage interface's metadata
/// collection; see `logfollower-core`'s checkpoint policy for when
/// writes happen.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplierState {
    pub last_applied_tick: Tick,
    pub last_processed_tick: Tick,
    pub safe_resume_tick: Tick,
    pub running: bool,
    pub phase: Phase,
    pub last_error: Option<ErrorDescriptor>,
    /// Free-text progress string for operators, e.g. "applying marker
    /// tick 412". Carried over from the original syncer's `setProgress`.
    pub progress: String,
    /// Monotonic id of the master last followed, used to detect a
    /// restart against a different master than the one the checkpoint
    /// was taken against.
    pub server_id: Option<u64>,
}

impl ApplierState {
    pub fn initial() -> ApplierState {
        ApplierState {
            last_applied_tick: Tick::ZERO,
            last_processed_tick: Tick::ZERO,
            safe_resume_tick: Tick(1),
            running: false,
            phase: Phase::Initializing,
            last_error: None,
            progress: String::from("not yet started"),
            server_id: None,
        }
    }
}
