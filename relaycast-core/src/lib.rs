//! Relaycast Core - supervised republishing of video sources
//!
//! This crate provides the building blocks for a single-tenant restreaming
//! daemon: process handles over encoder pipelines, source resolution,
//! and the stream supervisor that sequences queued playback, the idle
//! placeholder loop, and crash recovery against one fixed RTMP endpoint.

pub mod config;
pub mod events;
pub mod pipeline;
pub mod resolver;
pub mod supervisor;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::RelaycastConfig;
pub use events::SupervisorEvent;
pub use pipeline::{FfmpegSpawner, PipelineExit, ProcessError, SpawnError};
pub use resolver::{ResolveError, YtDlpResolver};
pub use supervisor::{PlaybackItem, ProductionSupervisor, StatusSnapshot, StreamSupervisor};

/// Core errors that can bubble up from any Relaycast subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RelaycastError {
    #[error("Resolver error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Encoder error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelaycastError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            RelaycastError::Resolve(e) => match e {
                ResolveError::Timeout { .. } => "Source resolution timed out".to_string(),
                ResolveError::Failed { reference, .. } => {
                    format!("Could not resolve '{reference}' to a playable URL")
                }
                ResolveError::ProcessStart(_) => "Resolver tool could not be started".to_string(),
            },
            RelaycastError::Spawn(_) => "Encoder pipeline could not be started".to_string(),
            RelaycastError::Process(_) => "Pipeline process error occurred".to_string(),
            RelaycastError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
            RelaycastError::Io(_) => "File system error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelaycastError>;
