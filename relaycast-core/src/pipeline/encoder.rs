//! Encoder collaborator: spawns ffmpeg pipelines against the fixed endpoint.
//!
//! The outbound URL is fixed at construction; every spawn reads one direct
//! media URL and republishes it. A start offset supports resumable
//! playback of the placeholder loop.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use super::process::{FfmpegPipeline, PipelineHandle};
use crate::config::StreamConfig;

/// Errors that can occur while starting an encoder pipeline.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Failed to start encoder process: {0}")]
    ProcessStart(#[from] io::Error),

    #[error("Encoder rejected the request: {reason}")]
    Rejected { reason: String },
}

/// Abstraction over encoder pipeline creation, mockable for tests.
#[async_trait]
pub trait PipelineSpawner: Send + Sync {
    /// Starts a pipeline publishing `direct_url` to the outbound endpoint,
    /// seeking to `start_offset` seconds when given.
    ///
    /// # Errors
    /// - `SpawnError::ProcessStart` - Encoder binary could not be launched
    /// - `SpawnError::Rejected` - Encoder refused the input
    async fn spawn(
        &self,
        direct_url: &str,
        start_offset: Option<u64>,
    ) -> Result<Arc<dyn PipelineHandle>, SpawnError>;
}

/// Production spawner invoking the ffmpeg binary.
pub struct FfmpegSpawner {
    config: StreamConfig,
    publish_url: String,
}

impl FfmpegSpawner {
    /// Creates a spawner bound to the configured outbound endpoint.
    pub fn new(config: StreamConfig) -> Self {
        let publish_url = config.publish_url();
        Self {
            config,
            publish_url,
        }
    }

    fn build_command(&self, direct_url: &str, start_offset: Option<u64>) -> Command {
        let mut command = Command::new(&self.config.ffmpeg_path);
        command.arg("-re");
        if let Some(offset) = start_offset {
            command.arg("-ss").arg(offset.to_string());
        }
        command
            .arg("-i")
            .arg(direct_url)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("veryfast")
            .arg("-tune")
            .arg("zerolatency")
            .arg("-b:v")
            .arg(format!("{}k", self.config.video_bitrate_kbps))
            .arg("-maxrate")
            .arg(format!("{}k", self.config.video_bitrate_kbps))
            .arg("-bufsize")
            .arg(format!("{}k", self.config.video_bitrate_kbps * 2))
            .arg("-vf")
            .arg(format!("scale=-2:{}", self.config.scale_height))
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg(format!("{}k", self.config.audio_bitrate_kbps))
            .arg("-f")
            .arg("flv")
            .arg(&self.publish_url);
        command
    }
}

#[async_trait]
impl PipelineSpawner for FfmpegSpawner {
    async fn spawn(
        &self,
        direct_url: &str,
        start_offset: Option<u64>,
    ) -> Result<Arc<dyn PipelineHandle>, SpawnError> {
        let command = self.build_command(direct_url, start_offset);
        let pipeline = FfmpegPipeline::spawn(command)?;
        info!(
            offset = start_offset.unwrap_or(0),
            "encoder pipeline started"
        );
        Ok(pipeline as Arc<dyn PipelineHandle>)
    }
}
