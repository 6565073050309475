//! Queue runner: sequential drain of the playback FIFO.
//!
//! One runner at a time (the queue-mode flag is the single-flight
//! guard). Each item runs to full completion, crash retries included,
//! before the next is popped. A failed item never aborts the runner.

use tokio::time;
use tracing::{debug, info, warn};

use super::core::SupervisorInner;
use super::lifecycle::ItemOutcome;
use crate::events::SupervisorEvent;
use crate::pipeline::PipelineSpawner;
use crate::resolver::SourceResolver;

impl<R, E> SupervisorInner<R, E>
where
    R: SourceResolver + 'static,
    E: PipelineSpawner + 'static,
{
    /// Drains the queue while queue mode holds, then hands off to the
    /// placeholder.
    pub(crate) async fn run_queue(&self) {
        info!("queue runner started");
        // True when the loop ended because the queue emptied, false when
        // a stop cleared the flag out from under it.
        let drained = loop {
            let next = {
                let mut state = self.state.lock().await;
                if !state.queue_mode {
                    debug!("queue mode cleared; runner winding down");
                    break false;
                }
                match state.queue.pop_front() {
                    Some(item) => item,
                    None => break true,
                }
            };

            let incumbent = {
                let mut state = self.state.lock().await;
                self.take_active_locked(&mut state)
            };
            if let Some(active) = incumbent {
                self.stop_pipeline(active).await;
            }

            debug!(reference = %next.reference, "queue runner advancing");
            match self.run_item(next).await {
                ItemOutcome::Completed | ItemOutcome::Stopped => {}
                ItemOutcome::Aborted => {
                    // Already reported; keep the queue moving.
                    warn!("queue item failed; continuing after delay");
                    time::sleep(self.config.supervisor.runner_error_delay).await;
                }
            }
        };

        self.state.lock().await.queue_mode = false;
        if drained {
            info!("queue drained");
            self.notify(SupervisorEvent::QueueFinished);
        } else {
            // Whoever cleared the flag already reported the stop.
            info!("queue runner stopped");
        }
        self.run_placeholder().await;
    }
}
