//! Process handle over one external encoder pipeline.
//!
//! The child is spawned in its own process group so signals reach ffmpeg
//! and anything it forks. A dedicated reaper task waits on the child
//! exactly once and fans the exit status out over a watch channel, which
//! lets any number of observers await the exit without contending for
//! `&mut Child`.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, warn};

/// Errors that can occur while controlling a pipeline process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to signal process group {pgid}: {source}")]
    Signal { pgid: i32, source: io::Error },

    #[error("Pipeline process has already exited")]
    AlreadyExited,
}

/// How a pipeline process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// Exit code 0.
    Clean,
    /// Non-zero exit code.
    Failed { code: i32 },
    /// Terminated by a signal.
    Signaled,
}

impl PipelineExit {
    /// True for a zero exit code.
    pub fn is_clean(&self) -> bool {
        matches!(self, PipelineExit::Clean)
    }

    fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => PipelineExit::Clean,
            Some(code) => PipelineExit::Failed { code },
            None => PipelineExit::Signaled,
        }
    }
}

/// Control surface over one live pipeline process.
///
/// The supervisor only ever talks to this trait, so tests can substitute
/// scripted pipelines for real encoder processes.
#[async_trait]
pub trait PipelineHandle: Send + Sync {
    /// Whether the process has not yet exited.
    fn is_alive(&self) -> bool;

    /// Waits for the process to exit and returns its classification.
    /// Completes immediately if the process already exited.
    async fn await_exit(&self) -> PipelineExit;

    /// Graceful stop: SIGCONT if suspended, SIGTERM to the group, then
    /// SIGKILL after `grace`. Returns the observed exit.
    async fn terminate(&self, grace: Duration) -> PipelineExit;

    /// Immediate SIGKILL to the group.
    ///
    /// # Errors
    /// - `ProcessError::AlreadyExited` - Process already gone
    /// - `ProcessError::Signal` - Signal delivery failed
    fn force_kill(&self) -> Result<(), ProcessError>;

    /// SIGSTOP to the group. The process keeps its resources; it must
    /// eventually be resumed or killed.
    ///
    /// # Errors
    /// - `ProcessError::AlreadyExited` - Process already gone
    /// - `ProcessError::Signal` - Signal delivery failed
    fn suspend(&self) -> Result<(), ProcessError>;

    /// SIGCONT to the group.
    ///
    /// # Errors
    /// - `ProcessError::AlreadyExited` - Process already gone
    /// - `ProcessError::Signal` - Signal delivery failed
    fn resume(&self) -> Result<(), ProcessError>;
}

/// Production pipeline handle over a real child process.
pub struct FfmpegPipeline {
    pgid: i32,
    suspended: AtomicBool,
    exit_rx: watch::Receiver<Option<PipelineExit>>,
}

impl FfmpegPipeline {
    /// Spawns `command` in a fresh process group and starts the reaper task.
    ///
    /// # Errors
    /// - `io::Error` - The process could not be spawned
    pub fn spawn(mut command: Command) -> io::Result<Arc<Self>> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("spawned child has no pid"))?;
        let pgid = pid as i32;

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let exit = match child.wait().await {
                Ok(status) => {
                    debug!(pid, %status, "pipeline process exited");
                    PipelineExit::from_status(status)
                }
                Err(error) => {
                    warn!(pid, %error, "failed to reap pipeline process");
                    PipelineExit::Signaled
                }
            };
            let _ = exit_tx.send(Some(exit));
        });

        Ok(Arc::new(Self {
            pgid,
            suspended: AtomicBool::new(false),
            exit_rx,
        }))
    }

    fn exit(&self) -> Option<PipelineExit> {
        *self.exit_rx.borrow()
    }

    fn signal_group(&self, signal: libc::c_int) -> Result<(), ProcessError> {
        if self.exit().is_some() {
            return Err(ProcessError::AlreadyExited);
        }
        // SAFETY: plain syscall on a pgid we created; errors are reported
        // through errno.
        let rc = unsafe { libc::killpg(self.pgid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(ProcessError::Signal {
                pgid: self.pgid,
                source: io::Error::last_os_error(),
            })
        }
    }
}

#[async_trait]
impl PipelineHandle for FfmpegPipeline {
    fn is_alive(&self) -> bool {
        self.exit().is_none()
    }

    async fn await_exit(&self) -> PipelineExit {
        let mut rx = self.exit_rx.clone();
        loop {
            if let Some(exit) = *rx.borrow() {
                return exit;
            }
            if rx.changed().await.is_err() {
                // Reaper dropped without reporting; treat as killed.
                return PipelineExit::Signaled;
            }
        }
    }

    async fn terminate(&self, grace: Duration) -> PipelineExit {
        if let Some(exit) = self.exit() {
            return exit;
        }
        if self.suspended.swap(false, Ordering::SeqCst) {
            // A stopped process would never see the SIGTERM.
            let _ = self.signal_group(libc::SIGCONT);
        }
        if let Err(error) = self.signal_group(libc::SIGTERM) {
            debug!(pgid = self.pgid, %error, "SIGTERM not delivered");
        }
        match time::timeout(grace, self.await_exit()).await {
            Ok(exit) => exit,
            Err(_) => {
                warn!(
                    pgid = self.pgid,
                    grace_secs = grace.as_secs(),
                    "pipeline ignored SIGTERM; escalating to SIGKILL"
                );
                let _ = self.signal_group(libc::SIGKILL);
                self.await_exit().await
            }
        }
    }

    fn force_kill(&self) -> Result<(), ProcessError> {
        self.signal_group(libc::SIGKILL)
    }

    fn suspend(&self) -> Result<(), ProcessError> {
        self.signal_group(libc::SIGSTOP)?;
        self.suspended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), ProcessError> {
        self.signal_group(libc::SIGCONT)?;
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }
}
