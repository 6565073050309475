//! Item lifecycle: resolve, spawn, await exit, classify, retry.
//!
//! One call to `run_item` owns an item from resolution to its terminal
//! classification, including every crash-retry cycle. The caller decides
//! routing afterwards; a user-initiated stop is routed by whoever issued
//! the stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use super::core::SupervisorInner;
use super::state::{ActivePipeline, PendingStart, PlaybackItem};
use crate::events::SupervisorEvent;
use crate::pipeline::PipelineSpawner;
use crate::resolver::SourceResolver;

/// Terminal classification of one `run_item` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemOutcome {
    /// Clean exit, or crash ceiling reached and the item skipped. Either
    /// way the caller routes onwards as after a normal completion.
    Completed,
    /// Explicit stop or supersession by a newer start; the stopping party
    /// owns the routing.
    Stopped,
    /// Resolution or spawn failed; the item was reported and dropped.
    Aborted,
}

/// Backoff before retry `attempt` (1-based): 1, 2, 4, 8, 16... capped.
pub(crate) fn crash_backoff(attempt: u32, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    cap.min(Duration::from_secs(1u64 << exponent))
}

impl<R, E> SupervisorInner<R, E>
where
    R: SourceResolver + 'static,
    E: PipelineSpawner + 'static,
{
    /// Runs one item to its terminal outcome. The caller must have
    /// stopped any previous pipeline first.
    pub(crate) async fn run_item(&self, item: PlaybackItem) -> ItemOutcome {
        let reference = item.reference.clone();
        let is_placeholder = reference == self.config.stream.placeholder_reference;

        // Claim the start slot so duplicate starts and the health monitor
        // see the transition in progress.
        let claim = {
            let mut state = self.state.lock().await;
            if state
                .pending
                .as_ref()
                .is_some_and(|p| p.reference == reference)
            {
                debug!(%reference, "start already in progress");
                return ItemOutcome::Stopped;
            }
            let claim = state.next_epoch();
            state.pending = Some(PendingStart {
                reference: reference.clone(),
                claim,
            });
            claim
        };

        loop {
            let direct_url = match self.resolver.resolve(&reference).await {
                Ok(url) => url,
                Err(error) => {
                    warn!(%reference, %error, "resolution failed");
                    self.notify(SupervisorEvent::ResolveFailed {
                        reference: reference.clone(),
                        reason: error.to_string(),
                    });
                    self.release_claim(claim).await;
                    return ItemOutcome::Aborted;
                }
            };

            // Re-check the claim after the (possibly slow) resolve, take
            // over the slot from any pipeline that was installed meanwhile,
            // and pick up the placeholder resume offset. The incumbent is
            // fully stopped before our own process spawns.
            let (start_offset, incumbent) = {
                let mut state = self.state.lock().await;
                if !state.pending_claim_is(claim) {
                    debug!(%reference, "superseded during resolve");
                    return ItemOutcome::Stopped;
                }
                let incumbent = self.take_active_locked(&mut state);
                let start_offset = if is_placeholder {
                    let secs = state.placeholder.start_offset_secs();
                    (secs > 0).then_some(secs)
                } else {
                    None
                };
                (start_offset, incumbent)
            };
            if let Some(previous) = incumbent {
                debug!(
                    %reference,
                    displaced = %previous.item.reference,
                    "stopping stale incumbent before spawn"
                );
                self.stop_pipeline(previous).await;
            }

            let handle = match self.spawner.spawn(&direct_url, start_offset).await {
                Ok(handle) => handle,
                Err(error) => {
                    warn!(%reference, %error, "encoder spawn failed");
                    self.notify(SupervisorEvent::SpawnFailed {
                        reference: reference.clone(),
                        reason: error.to_string(),
                    });
                    self.release_claim(claim).await;
                    return ItemOutcome::Aborted;
                }
            };

            let (epoch, user_stop) = {
                let mut state = self.state.lock().await;
                if !state.pending_claim_is(claim) {
                    drop(state);
                    debug!(%reference, "superseded during spawn; discarding pipeline");
                    let _ = handle.force_kill();
                    handle.await_exit().await;
                    return ItemOutcome::Stopped;
                }
                // A held claim means nothing else installed since the
                // pre-spawn takeover, so the slot is empty here.
                state.pending = None;
                let epoch = state.next_epoch();
                let user_stop = Arc::new(AtomicBool::new(false));
                state.active = Some(ActivePipeline {
                    item: item.clone(),
                    handle: Arc::clone(&handle),
                    epoch,
                    user_stop: Arc::clone(&user_stop),
                });
                state.paused = false;
                if is_placeholder {
                    state.placeholder.begin_segment();
                }
                (epoch, user_stop)
            };
            info!(%reference, "pipeline running");
            self.notify(SupervisorEvent::PlaybackStarted {
                reference: reference.clone(),
                title: item.title.clone(),
            });

            let exit = handle.await_exit().await;

            {
                let mut state = self.state.lock().await;
                // Only clean up our own installation; an explicit stop may
                // already have taken the slot over.
                if state.active.as_ref().is_some_and(|a| a.epoch == epoch) {
                    if is_placeholder {
                        state.placeholder.flush();
                    }
                    state.active = None;
                    state.paused = false;
                }
            }

            if user_stop.load(Ordering::SeqCst) {
                debug!(%reference, "pipeline stopped by user");
                return ItemOutcome::Stopped;
            }

            if exit.is_clean() {
                self.state.lock().await.crash_counts.remove(&reference);
                info!(%reference, "pipeline finished cleanly");
                self.notify(SupervisorEvent::PlaybackFinished {
                    reference: reference.clone(),
                });
                return ItemOutcome::Completed;
            }

            let attempt = {
                let mut state = self.state.lock().await;
                let count = state.crash_counts.entry(reference.clone()).or_default();
                *count += 1;
                *count
            };

            if attempt > self.config.supervisor.max_crash_retries {
                self.state.lock().await.crash_counts.remove(&reference);
                warn!(%reference, attempt, "crash ceiling reached; skipping item");
                self.notify(SupervisorEvent::TooManyFailures {
                    reference: reference.clone(),
                });
                return ItemOutcome::Completed;
            }

            // Re-claim the slot for the backoff window so the monitor
            // leaves it alone.
            {
                let mut state = self.state.lock().await;
                if state.active.is_some() || state.pending.is_some() {
                    debug!(%reference, "retry superseded before backoff");
                    return ItemOutcome::Stopped;
                }
                state.pending = Some(PendingStart {
                    reference: reference.clone(),
                    claim,
                });
            }

            let delay = crash_backoff(attempt, self.config.supervisor.backoff_cap);
            warn!(
                %reference,
                attempt,
                delay_secs = delay.as_secs(),
                ?exit,
                "pipeline crashed; retrying"
            );
            self.notify(SupervisorEvent::PipelineCrashed {
                reference: reference.clone(),
                attempt,
                retry_delay_secs: delay.as_secs(),
            });
            time::sleep(delay).await;

            // A play-now or stop that arrived during the backoff sleep
            // wins; the stale retry must not clobber it.
            {
                let state = self.state.lock().await;
                if !state.pending_claim_is(claim) || state.active.is_some() {
                    debug!(%reference, "retry superseded during backoff");
                    return ItemOutcome::Stopped;
                }
            }
            // Re-run from resolution: the previous direct URL may have
            // expired.
        }
    }

    /// Runs the placeholder loop until it is stopped or superseded.
    ///
    /// Idempotent entry: yields immediately when the placeholder is
    /// already current or any start is mid-flight. A clean placeholder
    /// exit restarts it at the accumulated offset; a resolution or spawn
    /// failure gives up and leaves recovery to the health monitor.
    pub(crate) async fn run_placeholder(&self) {
        let reference = self.config.stream.placeholder_reference.clone();
        if reference.is_empty() {
            debug!("no placeholder configured");
            return;
        }
        loop {
            let incumbent = {
                let mut state = self.state.lock().await;
                if state.pending.is_some() {
                    return;
                }
                if state.current_reference() == Some(reference.as_str()) {
                    return;
                }
                self.take_active_locked(&mut state)
            };
            if let Some(active) = incumbent {
                self.stop_pipeline(active).await;
            }

            let item = PlaybackItem {
                reference: reference.clone(),
                title: Some("placeholder".to_string()),
                submitted_by: None,
            };
            match self.run_item(item).await {
                ItemOutcome::Completed => continue,
                ItemOutcome::Stopped | ItemOutcome::Aborted => return,
            }
        }
    }

    async fn release_claim(&self, claim: u64) {
        let mut state = self.state.lock().await;
        if state.pending_claim_is(claim) {
            state.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cap = Duration::from_secs(30);
        let delays: Vec<u64> = (1..=6)
            .map(|attempt| crash_backoff(attempt, cap).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30]);
    }

    #[test]
    fn backoff_never_exceeds_cap_for_large_attempts() {
        let cap = Duration::from_secs(30);
        assert_eq!(crash_backoff(40, cap), cap);
    }
}
