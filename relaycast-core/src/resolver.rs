//! Resolver collaborator: content reference to direct media URL.
//!
//! The production resolver shells out to yt-dlp. Timeout and cookie
//! handling live here; crash retries on whatever the resolved URL is
//! used for remain the supervisor's concern.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

/// Errors that can occur while resolving a content reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Failed to start resolver process: {0}")]
    ProcessStart(io::Error),

    #[error("Resolver timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Could not resolve '{reference}': {reason}")]
    Failed { reference: String, reason: String },
}

/// Abstraction over source resolution, mockable for tests.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Turns a content reference into a directly fetchable media URL.
    ///
    /// # Errors
    /// - `ResolveError::ProcessStart` - Resolver tool could not be launched
    /// - `ResolveError::Timeout` - Resolution exceeded the configured timeout
    /// - `ResolveError::Failed` - Reference is not playable
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError>;
}

/// Production resolver invoking the yt-dlp binary.
pub struct YtDlpResolver {
    ytdlp_path: PathBuf,
    cookies_file: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpResolver {
    /// Creates a resolver with an optional cookies file and an overall
    /// per-invocation timeout.
    pub fn new(ytdlp_path: PathBuf, cookies_file: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            ytdlp_path,
            cookies_file,
            timeout,
        }
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, reference: &str) -> Result<String, ResolveError> {
        let mut command = Command::new(&self.ytdlp_path);
        command.arg("-f").arg("best").arg("-g");
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(reference);
        command.stdin(Stdio::null()).kill_on_drop(true);

        let output = match time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => return Err(ResolveError::ProcessStart(error)),
            Err(_) => {
                return Err(ResolveError::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .next()
                .unwrap_or("resolver exited with an error")
                .to_string();
            return Err(ResolveError::Failed {
                reference: reference.to_string(),
                reason,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let direct_url = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::Failed {
                reference: reference.to_string(),
                reason: "resolver returned no URL".to_string(),
            })?;

        debug!(%reference, "resolved direct media URL");
        Ok(direct_url)
    }
}
