//! Centralized configuration for Relaycast.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Relaycast components.
///
/// Groups related configuration settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct RelaycastConfig {
    pub stream: StreamConfig,
    pub supervisor: SupervisorConfig,
    pub monitor: MonitorConfig,
}

impl RelaycastConfig {
    /// Checks that the configuration describes a usable stream setup.
    ///
    /// # Errors
    /// - `RelaycastError::Configuration` - Missing endpoint or placeholder reference
    pub fn validate(&self) -> crate::Result<()> {
        if self.stream.rtmp_base_url.is_empty() {
            return Err(crate::RelaycastError::Configuration {
                reason: "outbound RTMP URL must not be empty".to_string(),
            });
        }
        if self.stream.placeholder_reference.is_empty() {
            return Err(crate::RelaycastError::Configuration {
                reason: "placeholder reference must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Outbound endpoint and encoding pipeline configuration.
///
/// Controls where the republished stream is sent and how the encoder
/// binary is invoked.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base RTMP URL of the fixed outbound endpoint
    pub rtmp_base_url: String,
    /// Stream key appended to the base URL
    pub stream_key: String,
    /// Content reference played whenever nothing else is active
    pub placeholder_reference: String,
    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to the yt-dlp binary used for source resolution
    pub ytdlp_path: PathBuf,
    /// Optional cookies file handed to the resolver
    pub cookies_file: Option<PathBuf>,
    /// Target video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Target audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
    /// Output height in pixels (width follows the aspect ratio)
    pub scale_height: u32,
}

impl StreamConfig {
    /// Full publish URL: base URL joined with the stream key.
    pub fn publish_url(&self) -> String {
        if self.stream_key.is_empty() {
            self.rtmp_base_url.clone()
        } else {
            format!(
                "{}/{}",
                self.rtmp_base_url.trim_end_matches('/'),
                self.stream_key
            )
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rtmp_base_url: "rtmp://127.0.0.1/live".to_string(),
            stream_key: String::new(),
            placeholder_reference: String::new(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            cookies_file: None,
            video_bitrate_kbps: 2500,
            audio_bitrate_kbps: 160,
            scale_height: 720,
        }
    }
}

/// Lifecycle and recovery behavior of the stream supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive crash ceiling before an item is skipped
    pub max_crash_retries: u32,
    /// Upper bound on the exponential retry backoff
    pub backoff_cap: Duration,
    /// Grace period between SIGTERM and SIGKILL when stopping a pipeline
    pub stop_grace: Duration,
    /// Overall timeout for one resolver invocation
    pub resolve_timeout: Duration,
    /// Delay before the queue runner advances past a failed item
    pub runner_error_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_crash_retries: 5,
            backoff_cap: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            resolve_timeout: Duration::from_secs(30),
            runner_error_delay: Duration::from_secs(1),
        }
    }
}

/// Health monitor reconciliation loop configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between reconciliation passes
    pub interval: Duration,
    /// Grace period granted to an item's own recovery path before the
    /// monitor forces a restart
    pub restart_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            restart_grace: Duration::from_secs(3),
        }
    }
}
