//! Shared stream state: the process-wide bookkeeping singleton.
//!
//! One `StreamState` exists per supervisor, guarded by a single mutex.
//! The current item lives inside the active record, so "current item is
//! set iff a pipeline is active" holds by construction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use super::placeholder::PlaceholderClock;
use crate::pipeline::PipelineHandle;

/// One requested playback. Immutable once created; identity is the
/// reference string, which also keys the crash counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackItem {
    /// Operator-supplied content reference (e.g. a URL)
    pub reference: String,
    /// Optional display title
    pub title: Option<String>,
    /// Optional submitter identity
    pub submitted_by: Option<String>,
}

impl PlaybackItem {
    /// Creates an item with just a reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            title: None,
            submitted_by: None,
        }
    }
}

/// The at-most-one live pipeline and the item bound to it.
pub(crate) struct ActivePipeline {
    pub item: PlaybackItem,
    pub handle: Arc<dyn PipelineHandle>,
    /// Ownership generation; lets a lifecycle detect that its slot was
    /// taken over while it slept.
    pub epoch: u64,
    /// Set by every explicit stop path before the process is terminated,
    /// so the waiting lifecycle classifies the exit as user-initiated.
    pub user_stop: Arc<AtomicBool>,
}

/// Marker for a start that is mid-resolve/spawn: the slot is spoken for
/// even though no pipeline is installed yet.
pub(crate) struct PendingStart {
    pub reference: String,
    pub claim: u64,
}

/// All supervisor bookkeeping, guarded by one mutex in the supervisor.
pub(crate) struct StreamState {
    pub active: Option<ActivePipeline>,
    pub queue: VecDeque<PlaybackItem>,
    pub queue_mode: bool,
    pub paused: bool,
    pub placeholder: PlaceholderClock,
    /// Consecutive-crash counters keyed by reference; absent means zero.
    pub crash_counts: HashMap<String, u32>,
    pub pending: Option<PendingStart>,
    epoch: u64,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            active: None,
            queue: VecDeque::new(),
            queue_mode: false,
            paused: false,
            placeholder: PlaceholderClock::new(),
            crash_counts: HashMap::new(),
            pending: None,
            epoch: 0,
        }
    }

    pub fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub fn current_reference(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.item.reference.as_str())
    }

    pub fn pending_claim_is(&self, claim: u64) -> bool {
        self.pending.as_ref().is_some_and(|p| p.claim == claim)
    }
}

/// Snapshot returned to the command front end.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub current: Option<PlaybackItem>,
    pub queue: Vec<PlaybackItem>,
    pub queue_mode: bool,
    pub paused: bool,
    pub placeholder_elapsed_secs: u64,
}
