use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mediawire::{FfmpegTransform, MediaTcpServer, ServerConfig, DEFAULT_CHUNK_SIZE};
use tracing::info;

/// Receive media uploads, transform them with ffmpeg and send the results back
#[derive(Parser)]
#[command(name = "media-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9001")]
    bind: String,

    /// Directory for uploads and artifacts
    #[arg(long, default_value = "processed")]
    processed_dir: PathBuf,

    /// Largest read or write per socket call
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Per-operation socket deadline in seconds, 0 to disable
    #[arg(long, default_value_t = 30)]
    io_timeout_secs: u64,

    /// ffmpeg binary to run
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ServerConfig {
        processed_dir: cli.processed_dir.clone(),
        chunk_size: cli.chunk_size,
        io_timeout: (cli.io_timeout_secs > 0).then(|| Duration::from_secs(cli.io_timeout_secs)),
    };
    let transform = FfmpegTransform::new(&cli.processed_dir).with_program(cli.ffmpeg);

    info!("Starting media server on {}", cli.bind);
    let server = MediaTcpServer::bind(&cli.bind, config, transform).await?;
    server.run().await?;

    Ok(())
}
