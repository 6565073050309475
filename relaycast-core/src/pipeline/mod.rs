//! Encoder pipeline management.
//!
//! A pipeline is one external encoder process reading a direct media URL
//! and republishing it to the fixed outbound endpoint. This module owns
//! the process handle abstraction (group signals, graceful stop, exit
//! observation) and the spawner that builds the ffmpeg invocation.

pub mod encoder;
pub mod process;

pub use encoder::{FfmpegSpawner, PipelineSpawner, SpawnError};
pub use process::{FfmpegPipeline, PipelineExit, PipelineHandle, ProcessError};
