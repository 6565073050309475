//! Mock collaborators for testing the stream supervisor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::pipeline::{PipelineExit, PipelineHandle, PipelineSpawner, ProcessError, SpawnError};
use crate::resolver::{ResolveError, SourceResolver};

/// How a mock pipeline behaves after it is spawned.
#[derive(Debug, Clone, Copy)]
pub enum ExitScript {
    /// Runs until terminated; exits as if signaled.
    RunUntilStopped,
    /// Exits cleanly after the given playback duration.
    CleanAfter(Duration),
    /// Exits with the given non-zero code after the duration.
    CrashAfter(Duration, i32),
}

/// Scripted pipeline handle driven by the tokio clock.
pub struct MockPipeline {
    exit_tx: watch::Sender<Option<PipelineExit>>,
    suspend_count: AtomicU32,
    resume_count: AtomicU32,
}

impl MockPipeline {
    pub fn new(script: ExitScript) -> Arc<Self> {
        let (exit_tx, _) = watch::channel(None);
        let pipeline = Arc::new(Self {
            exit_tx,
            suspend_count: AtomicU32::new(0),
            resume_count: AtomicU32::new(0),
        });
        match script {
            ExitScript::RunUntilStopped => {}
            ExitScript::CleanAfter(duration) => {
                pipeline.exit_later(duration, PipelineExit::Clean);
            }
            ExitScript::CrashAfter(duration, code) => {
                pipeline.exit_later(duration, PipelineExit::Failed { code });
            }
        }
        pipeline
    }

    fn exit_later(self: &Arc<Self>, duration: Duration, exit: PipelineExit) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            pipeline.complete(exit);
        });
    }

    /// Records the exit unless one already happened.
    pub fn complete(&self, exit: PipelineExit) {
        self.exit_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(exit);
                true
            } else {
                false
            }
        });
    }

    pub fn suspend_count(&self) -> u32 {
        self.suspend_count.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> u32 {
        self.resume_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineHandle for MockPipeline {
    fn is_alive(&self) -> bool {
        self.exit_tx.borrow().is_none()
    }

    async fn await_exit(&self) -> PipelineExit {
        let mut rx = self.exit_tx.subscribe();
        loop {
            if let Some(exit) = *rx.borrow() {
                return exit;
            }
            if rx.changed().await.is_err() {
                return PipelineExit::Signaled;
            }
        }
    }

    async fn terminate(&self, _grace: Duration) -> PipelineExit {
        self.complete(PipelineExit::Signaled);
        self.await_exit().await
    }

    fn force_kill(&self) -> Result<(), ProcessError> {
        self.complete(PipelineExit::Signaled);
        Ok(())
    }

    fn suspend(&self) -> Result<(), ProcessError> {
        self.suspend_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), ProcessError> {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock resolver mapping `ref` to `direct://ref`, with scripted failures.
#[derive(Clone, Default)]
pub struct MockResolver {
    failing: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reference(&self, reference: &str) {
        self.failing.lock().unwrap().push(reference.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceResolver for MockResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError> {
        self.calls.lock().unwrap().push(reference.to_string());
        if self.failing.lock().unwrap().iter().any(|r| r == reference) {
            return Err(ResolveError::Failed {
                reference: reference.to_string(),
                reason: "mock resolution failure".to_string(),
            });
        }
        Ok(format!("direct://{reference}"))
    }
}

/// One recorded spawn request.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub url: String,
    pub offset: Option<u64>,
}

/// Mock spawner with per-URL scripts and full spawn history.
///
/// Unscripted URLs get `RunUntilStopped` pipelines. All returned handles
/// are retained so tests can assert on liveness invariants.
#[derive(Clone, Default)]
pub struct MockSpawner {
    scripts: Arc<Mutex<HashMap<String, ExitScript>>>,
    failing: Arc<Mutex<Vec<String>>>,
    records: Arc<Mutex<Vec<SpawnRecord>>>,
    handles: Arc<Mutex<Vec<Arc<MockPipeline>>>>,
    peak_alive: Arc<Mutex<usize>>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts every future spawn of `url`.
    pub fn script(&self, url: &str, script: ExitScript) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    /// Makes every future spawn of `url` fail.
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn records(&self) -> Vec<SpawnRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn spawn_count(&self, url: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    /// Number of spawned pipelines that have not yet exited.
    pub fn alive_count(&self) -> usize {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.is_alive())
            .count()
    }

    /// The most recently spawned pipeline.
    pub fn last_handle(&self) -> Option<Arc<MockPipeline>> {
        self.handles.lock().unwrap().last().cloned()
    }

    /// Highest number of simultaneously live pipelines observed at any
    /// spawn.
    pub fn peak_alive(&self) -> usize {
        *self.peak_alive.lock().unwrap()
    }
}

#[async_trait]
impl PipelineSpawner for MockSpawner {
    async fn spawn(
        &self,
        direct_url: &str,
        start_offset: Option<u64>,
    ) -> Result<Arc<dyn PipelineHandle>, SpawnError> {
        self.records.lock().unwrap().push(SpawnRecord {
            url: direct_url.to_string(),
            offset: start_offset,
        });
        if self.failing.lock().unwrap().iter().any(|u| u == direct_url) {
            return Err(SpawnError::Rejected {
                reason: "mock spawn failure".to_string(),
            });
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(direct_url)
            .copied()
            .unwrap_or(ExitScript::RunUntilStopped);
        let pipeline = MockPipeline::new(script);
        {
            let mut handles = self.handles.lock().unwrap();
            handles.push(Arc::clone(&pipeline));
            let alive = handles.iter().filter(|h| h.is_alive()).count();
            let mut peak = self.peak_alive.lock().unwrap();
            *peak = (*peak).max(alive);
        }
        Ok(pipeline as Arc<dyn PipelineHandle>)
    }
}
