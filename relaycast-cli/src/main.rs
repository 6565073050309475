//! Relaycast CLI - operator front end for the restreaming daemon.
//!
//! Builds the production supervisor from command-line flags, starts the
//! placeholder and the health monitor, then serves a line-oriented
//! command loop on stdin.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use relaycast_core::ProductionSupervisor;
use relaycast_core::config::RelaycastConfig;
use relaycast_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "relaycast")]
#[command(about = "Supervised restreaming of video sources to a fixed RTMP endpoint")]
struct Cli {
    /// Base RTMP URL of the outbound endpoint
    #[arg(long, default_value = "rtmp://127.0.0.1/live")]
    rtmp_url: String,

    /// Stream key appended to the base URL
    #[arg(long, env = "RELAYCAST_STREAM_KEY", default_value = "", hide_env_values = true)]
    stream_key: String,

    /// Content reference played whenever nothing else is active
    #[arg(long)]
    placeholder: String,

    /// Path to the ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg_path: PathBuf,

    /// Path to the yt-dlp binary
    #[arg(long, default_value = "yt-dlp")]
    ytdlp_path: PathBuf,

    /// Cookies file handed to the resolver
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Console log level
    #[arg(long, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the full debug log (default: ./logs)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> RelaycastConfig {
        let mut config = RelaycastConfig::default();
        config.stream.rtmp_base_url = self.rtmp_url;
        config.stream.stream_key = self.stream_key;
        config.stream.placeholder_reference = self.placeholder;
        config.stream.ffmpeg_path = self.ffmpeg_path;
        config.stream.ytdlp_path = self.ytdlp_path;
        config.stream.cookies_file = self.cookies;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), cli.log_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = cli.into_config();
    config.validate()?;

    let supervisor = ProductionSupervisor::new_production(config);
    commands::run(supervisor).await
}
