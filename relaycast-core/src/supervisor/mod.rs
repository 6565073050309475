//! Stream supervisor: the single authority over what is currently running.
//!
//! Composes the resolver and encoder collaborators with the shared
//! stream state to implement start/stop/switch/pause/resume, the queue
//! runner, placeholder progress accounting, crash retry with backoff,
//! and the self-healing health monitor.

mod core;
mod lifecycle;
mod monitor;
mod placeholder;
mod queue;
mod state;
mod tasks;

#[cfg(test)]
pub(crate) mod test_mocks;

pub use self::core::{ProductionSupervisor, StreamSupervisor};
pub use self::state::{PlaybackItem, StatusSnapshot};
