//! Public supervisor operations.
//!
//! All bookkeeping happens under one state mutex; resolver calls,
//! encoder spawns, and waits on child processes always happen outside
//! it. Starting a new pipeline is always preceded by a full
//! graceful-stop-then-kill of the previous one.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::state::{ActivePipeline, PlaybackItem, StatusSnapshot, StreamState};
use super::tasks::TaskSet;
use crate::config::RelaycastConfig;
use crate::events::SupervisorEvent;
use crate::pipeline::{FfmpegSpawner, PipelineSpawner};
use crate::resolver::{SourceResolver, YtDlpResolver};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared supervisor internals; public operations and background tasks
/// all hold an `Arc` of this.
pub(crate) struct SupervisorInner<R, E> {
    pub config: RelaycastConfig,
    pub resolver: R,
    pub spawner: E,
    pub state: Mutex<StreamState>,
    pub tasks: Mutex<TaskSet>,
    pub events: broadcast::Sender<SupervisorEvent>,
}

impl<R, E> SupervisorInner<R, E> {
    pub fn notify(&self, event: SupervisorEvent) {
        debug!(?event, "supervisor event");
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Removes the active record for an explicit stop: marks the exit as
    /// user-initiated, resets the item's crash counter, and flushes
    /// placeholder accounting. The caller must terminate the returned
    /// pipeline before starting anything new.
    pub fn take_active_locked(&self, state: &mut StreamState) -> Option<ActivePipeline> {
        let active = state.active.take()?;
        active.user_stop.store(true, Ordering::SeqCst);
        state.crash_counts.remove(&active.item.reference);
        if active.item.reference == self.config.stream.placeholder_reference {
            state.placeholder.flush();
        }
        state.paused = false;
        Some(active)
    }

    /// Cancels a start that is mid-resolve, mid-spawn, or sleeping out a
    /// crash backoff. The owning lifecycle observes the lost claim at its
    /// next checkpoint and winds down without reinstalling itself.
    pub fn cancel_pending_locked(&self, state: &mut StreamState) -> Option<String> {
        let pending = state.pending.take()?;
        state.crash_counts.remove(&pending.reference);
        debug!(reference = %pending.reference, "cancelled pending start");
        Some(pending.reference)
    }

    /// Gracefully stops a taken pipeline, escalating to SIGKILL after the
    /// configured grace period.
    pub async fn stop_pipeline(&self, active: ActivePipeline) {
        let exit = active
            .handle
            .terminate(self.config.supervisor.stop_grace)
            .await;
        debug!(reference = %active.item.reference, ?exit, "pipeline stopped");
    }
}

/// The stream supervisor: single authority over the one active pipeline.
///
/// Generic over the resolver and encoder collaborators so tests can run
/// the full state machine against scripted mocks.
pub struct StreamSupervisor<R, E> {
    pub(crate) inner: Arc<SupervisorInner<R, E>>,
}

impl<R, E> Clone for StreamSupervisor<R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, E> StreamSupervisor<R, E>
where
    R: SourceResolver + 'static,
    E: PipelineSpawner + 'static,
{
    /// Creates a supervisor with the provided collaborators.
    pub fn new(config: RelaycastConfig, resolver: R, spawner: E) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                resolver,
                spawner,
                state: Mutex::new(StreamState::new()),
                tasks: Mutex::new(TaskSet::new()),
                events,
            }),
        }
    }

    /// Subscribes to the operator event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &RelaycastConfig {
        &self.inner.config
    }

    /// Cancels queue mode, stops whatever is active, and starts `item`
    /// immediately. Resolution or spawn failures are reported, not
    /// retried.
    pub async fn play_now(&self, item: PlaybackItem) {
        info!(reference = %item.reference, "play-now requested");
        let stopped = {
            let mut state = self.inner.state.lock().await;
            state.queue_mode = false;
            self.inner.take_active_locked(&mut state)
        };
        if let Some(active) = stopped {
            self.inner.stop_pipeline(active).await;
        }

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.lock().await.playback.spawn(async move {
            match inner.run_item(item).await {
                super::lifecycle::ItemOutcome::Stopped => {}
                _ => inner.run_placeholder().await,
            }
        });
    }

    /// Appends an item to the queue without touching current playback.
    pub async fn enqueue(&self, item: PlaybackItem) {
        let (reference, position) = {
            let mut state = self.inner.state.lock().await;
            state.queue.push_back(item.clone());
            (item.reference, state.queue.len())
        };
        info!(%reference, position, "item enqueued");
        self.inner
            .notify(SupervisorEvent::Enqueued {
                reference,
                position,
            });
    }

    /// Starts draining the queue. No-op if the runner is already active;
    /// reports an empty queue instead of starting.
    pub async fn start_queue(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.queue_mode {
                debug!("queue already running");
                return;
            }
            if state.queue.is_empty() {
                self.inner.notify(SupervisorEvent::QueueEmpty);
                return;
            }
            state.queue_mode = true;
        }
        self.inner.notify(SupervisorEvent::QueueStarted);

        let inner = Arc::clone(&self.inner);
        self.inner.tasks.lock().await.runner.spawn(async move {
            inner.run_queue().await;
        });
    }

    /// Clears queue mode, stops the active pipeline, cancels any start
    /// still in flight, and transitions to the placeholder.
    pub async fn stop_all(&self) {
        info!("stop-all requested");
        let stopped = {
            let mut state = self.inner.state.lock().await;
            state.queue_mode = false;
            self.inner.cancel_pending_locked(&mut state);
            self.inner.take_active_locked(&mut state)
        };
        if let Some(active) = stopped {
            self.inner.stop_pipeline(active).await;
        }
        self.inner.notify(SupervisorEvent::Stopped);
        self.start_placeholder().await;
    }

    /// Suspends the active pipeline process without terminating it.
    pub async fn pause(&self) {
        let handle = {
            let mut state = self.inner.state.lock().await;
            let Some(active) = state.active.as_ref() else {
                self.inner.notify(SupervisorEvent::Notice {
                    message: "nothing to pause".to_string(),
                });
                return;
            };
            if state.paused {
                self.inner.notify(SupervisorEvent::Notice {
                    message: "already paused".to_string(),
                });
                return;
            }
            let handle = Arc::clone(&active.handle);
            let is_placeholder =
                active.item.reference == self.inner.config.stream.placeholder_reference;
            state.paused = true;
            if is_placeholder {
                state.placeholder.flush();
            }
            handle
        };
        if let Err(error) = handle.suspend() {
            debug!(%error, "suspend failed");
        }
        self.inner.notify(SupervisorEvent::Paused);
    }

    /// Resumes a suspended pipeline process.
    pub async fn resume(&self) {
        let handle = {
            let mut state = self.inner.state.lock().await;
            let Some(active) = state.active.as_ref() else {
                self.inner.notify(SupervisorEvent::Notice {
                    message: "nothing to resume".to_string(),
                });
                return;
            };
            if !state.paused {
                self.inner.notify(SupervisorEvent::Notice {
                    message: "not paused".to_string(),
                });
                return;
            }
            let handle = Arc::clone(&active.handle);
            let is_placeholder =
                active.item.reference == self.inner.config.stream.placeholder_reference;
            state.paused = false;
            if is_placeholder {
                state.placeholder.begin_segment();
            }
            handle
        };
        if let Err(error) = handle.resume() {
            debug!(%error, "resume failed");
        }
        self.inner.notify(SupervisorEvent::Resumed);
    }

    /// Stops the current item unless it is the placeholder. A start that
    /// is still mid-flight (resolving, or sleeping out a crash backoff)
    /// counts as the current item and is cancelled. In queue mode the
    /// runner advances automatically; otherwise the placeholder takes
    /// over.
    pub async fn interrupt_current(&self) {
        let placeholder = &self.inner.config.stream.placeholder_reference;
        let (stopped, cancelled, queue_mode) = {
            let mut state = self.inner.state.lock().await;
            let current = state
                .current_reference()
                .or(state.pending.as_ref().map(|p| p.reference.as_str()));
            match current {
                None => {
                    self.inner.notify(SupervisorEvent::Notice {
                        message: "nothing is playing".to_string(),
                    });
                    return;
                }
                Some(reference) if reference == placeholder => {
                    self.inner.notify(SupervisorEvent::PlaceholderProtected);
                    return;
                }
                Some(_) => {}
            }
            let queue_mode = state.queue_mode;
            let cancelled = self.inner.cancel_pending_locked(&mut state);
            (
                self.inner.take_active_locked(&mut state),
                cancelled,
                queue_mode,
            )
        };
        if let Some(active) = stopped {
            let reference = active.item.reference.clone();
            self.inner.stop_pipeline(active).await;
            self.inner
                .notify(SupervisorEvent::Interrupted { reference });
        } else if let Some(reference) = cancelled {
            self.inner
                .notify(SupervisorEvent::Interrupted { reference });
        }
        if !queue_mode {
            self.start_placeholder().await;
        }
    }

    /// Starts the placeholder loop. Idempotent: a placeholder that is
    /// already current, or already mid-start, leaves this a no-op.
    pub async fn start_placeholder(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.lock().await.playback.spawn(async move {
            inner.run_placeholder().await;
        });
    }

    /// Spawns the health monitor reconciliation loop.
    pub fn spawn_monitor(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.run_monitor())
    }

    /// Snapshot of current playback and the queue for the front end.
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.inner.state.lock().await;
        StatusSnapshot {
            current: state.active.as_ref().map(|a| a.item.clone()),
            queue: state.queue.iter().cloned().collect(),
            queue_mode: state.queue_mode,
            paused: state.paused,
            placeholder_elapsed_secs: state.placeholder.running_total().as_secs(),
        }
    }

    /// Stops background tasks and the active pipeline. Used on daemon
    /// shutdown.
    pub async fn shutdown(&self) {
        info!("supervisor shutting down");
        {
            let mut tasks = self.inner.tasks.lock().await;
            tasks.runner.abort();
            tasks.playback.abort();
        }
        let stopped = {
            let mut state = self.inner.state.lock().await;
            state.queue_mode = false;
            self.inner.cancel_pending_locked(&mut state);
            self.inner.take_active_locked(&mut state)
        };
        if let Some(active) = stopped {
            self.inner.stop_pipeline(active).await;
        }
    }
}

/// Production supervisor wiring yt-dlp resolution to ffmpeg publishing.
pub type ProductionSupervisor = StreamSupervisor<YtDlpResolver, FfmpegSpawner>;

impl ProductionSupervisor {
    /// Creates the production supervisor from configuration alone.
    pub fn new_production(config: RelaycastConfig) -> Self {
        let resolver = YtDlpResolver::new(
            config.stream.ytdlp_path.clone(),
            config.stream.cookies_file.clone(),
            config.supervisor.resolve_timeout,
        );
        let spawner = FfmpegSpawner::new(config.stream.clone());
        Self::new(config, resolver, spawner)
    }
}
