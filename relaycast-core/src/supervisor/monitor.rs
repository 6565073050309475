//! Health monitor: periodic reconciliation of bookkeeping vs reality.
//!
//! The last line of defense against lost wake-ups and silently-dead
//! background tasks. It never fights an in-progress transition: a
//! pending start marks the slot as spoken for, and a dead-but-recorded
//! pipeline gets a grace period for its own lifecycle to recover before
//! the monitor forces a restart.

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::core::SupervisorInner;
use crate::events::SupervisorEvent;
use crate::pipeline::PipelineSpawner;
use crate::resolver::SourceResolver;

impl<R, E> SupervisorInner<R, E>
where
    R: SourceResolver + 'static,
    E: PipelineSpawner + 'static,
{
    /// Fixed-interval reconciliation loop, independent of command
    /// traffic.
    pub(crate) async fn run_monitor(self: Arc<Self>) {
        let mut ticker = time::interval(self.config.monitor.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            Arc::clone(&self).reconcile().await;
        }
    }

    /// One reconciliation pass. Holds the state lock only for snapshots
    /// and corrections, never across the grace wait.
    pub(crate) async fn reconcile(self: Arc<Self>) {
        let (active_dead, vacant, queue_mode, queue_nonempty) = {
            let state = self.state.lock().await;
            (
                state.active.as_ref().is_some_and(|a| !a.handle.is_alive()),
                state.active.is_none() && state.pending.is_none(),
                state.queue_mode,
                !state.queue.is_empty(),
            )
        };

        if active_dead {
            warn!("recorded pipeline is no longer alive; granting recovery grace");
            self.notify(SupervisorEvent::MonitorIntervention {
                detail: "active pipeline found dead".to_string(),
            });
            time::sleep(self.config.monitor.restart_grace).await;

            let reclaimed = {
                let mut state = self.state.lock().await;
                match state.active.as_ref() {
                    // The lifecycle never observed the exit; reclaim the
                    // slot ourselves.
                    Some(active) if !active.handle.is_alive() => {
                        let _ = self.take_active_locked(&mut state);
                        true
                    }
                    // A new pipeline was installed meanwhile; all good.
                    Some(_) => false,
                    // Slot emptied; force routing only if nothing is
                    // starting either.
                    None => state.pending.is_none(),
                }
            };
            if reclaimed {
                self.force_restart().await;
            }
            return;
        }

        if vacant {
            if queue_mode {
                let runner_alive = self.tasks.lock().await.runner.is_running();
                if !runner_alive {
                    if queue_nonempty {
                        warn!("queue runner died with items remaining; restarting it");
                        self.notify(SupervisorEvent::MonitorIntervention {
                            detail: "queue runner restarted".to_string(),
                        });
                        let inner = Arc::clone(&self);
                        self.tasks.lock().await.runner.spawn(async move {
                            inner.run_queue().await;
                        });
                    } else {
                        // Runner died without clearing the flag and there
                        // is nothing left to drain.
                        self.state.lock().await.queue_mode = false;
                        let inner = Arc::clone(&self);
                        self.tasks.lock().await.playback.spawn(async move {
                            inner.run_placeholder().await;
                        });
                    }
                }
            } else {
                debug!("idle gap detected; starting placeholder");
                let inner = Arc::clone(&self);
                self.tasks.lock().await.playback.spawn(async move {
                    inner.run_placeholder().await;
                });
            }
        }
    }

    /// Routing after the monitor reclaimed a dead slot: resume the queue
    /// when it has work, otherwise fall back to the placeholder.
    async fn force_restart(self: Arc<Self>) {
        let (queue_mode, queue_nonempty) = {
            let state = self.state.lock().await;
            (state.queue_mode, !state.queue.is_empty())
        };
        if queue_mode && queue_nonempty {
            warn!("forcing queue restart after dead pipeline");
            self.notify(SupervisorEvent::MonitorIntervention {
                detail: "queue resumed after dead pipeline".to_string(),
            });
            let inner = Arc::clone(&self);
            self.tasks.lock().await.runner.spawn(async move {
                inner.run_queue().await;
            });
        } else {
            warn!("forcing placeholder restart after dead pipeline");
            self.notify(SupervisorEvent::MonitorIntervention {
                detail: "placeholder restarted after dead pipeline".to_string(),
            });
            let inner = Arc::clone(&self);
            self.tasks.lock().await.playback.spawn(async move {
                inner.run_placeholder().await;
            });
        }
    }
}
