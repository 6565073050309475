//! Operator-visible supervisor events.
//!
//! Every failure and state transition the operator cares about is reported
//! here as a side effect; nothing is ever raised past the supervisor's
//! internal loops. The command front end subscribes to the broadcast
//! channel and renders these however its transport requires.

use serde::{Deserialize, Serialize};

/// Events published by the stream supervisor to the operator channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// A pipeline started publishing to the outbound endpoint.
    PlaybackStarted {
        reference: String,
        title: Option<String>,
    },
    /// A pipeline ended with a clean exit.
    PlaybackFinished { reference: String },
    /// The reference could not be turned into a direct media URL.
    ResolveFailed { reference: String, reason: String },
    /// The encoder process could not be started.
    SpawnFailed { reference: String, reason: String },
    /// The pipeline exited abnormally; a retry is scheduled.
    PipelineCrashed {
        reference: String,
        attempt: u32,
        retry_delay_secs: u64,
    },
    /// The crash ceiling was reached and the item is being skipped.
    TooManyFailures { reference: String },
    /// An item was appended to the queue at the given 1-based position.
    Enqueued { reference: String, position: usize },
    /// The queue runner started draining the queue.
    QueueStarted,
    /// A start-queue request found the queue empty.
    QueueEmpty,
    /// The queue runner finished and handed off to the placeholder.
    QueueFinished,
    /// The active pipeline was suspended.
    Paused,
    /// A suspended pipeline was resumed.
    Resumed,
    /// Queue mode was cleared and the active pipeline stopped.
    Stopped,
    /// The current item was stopped at the operator's request.
    Interrupted { reference: String },
    /// An interrupt request was rejected because the placeholder is current.
    PlaceholderProtected,
    /// The health monitor corrected a divergence between bookkeeping and
    /// actual process state.
    MonitorIntervention { detail: String },
    /// Free-form operator notice.
    Notice { message: String },
}
