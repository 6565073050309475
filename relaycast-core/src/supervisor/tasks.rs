//! Tracked background tasks.
//!
//! Every background operation the supervisor spawns (queue runner,
//! one-off playback, placeholder starts) lives in a named slot, so the
//! health monitor can distinguish a task that finished from one that
//! died, instead of reasoning about detached spawns.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;

/// Named slot holding at most one tracked background task.
pub(crate) struct TaskSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns `future` into the slot. A previous task that is still
    /// winding down keeps running to completion; it is merely no longer
    /// tracked.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            debug!(slot = self.name, "replacing live task in slot");
        }
        self.handle = Some(tokio::spawn(future));
        debug!(slot = self.name, "task spawned");
    }

    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// The supervisor's tracked task slots.
pub(crate) struct TaskSet {
    /// Queue runner drain loop
    pub runner: TaskSlot,
    /// One-off playback and placeholder starts
    pub playback: TaskSlot,
}

impl TaskSet {
    pub fn new() -> Self {
        Self {
            runner: TaskSlot::new("queue-runner"),
            playback: TaskSlot::new("playback"),
        }
    }
}
