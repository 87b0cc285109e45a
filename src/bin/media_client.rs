use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use mediawire::transform::probe_duration;
use mediawire::{
    AspectRatio, ClientConfig, MediaTcpClient, MediaWireError, Operation, Resolution,
    DEFAULT_CHUNK_SIZE,
};
use tracing::info;

/// Send a video to a media server and download the transformed result
#[derive(Parser)]
#[command(name = "media-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:9001")]
    server: String,

    /// Directory for downloaded artifacts
    #[arg(long, default_value = "receive")]
    receive_dir: PathBuf,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Per-operation socket deadline in seconds, 0 to wait forever
    #[arg(long, default_value_t = 0)]
    io_timeout_secs: u64,

    /// Video to upload (.mp4 or .avi)
    file: PathBuf,

    #[command(subcommand)]
    operation: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-encode at a lower bitrate
    Compress,
    /// Change the resolution
    Resize {
        #[arg(long, value_enum)]
        resolution: ResolutionArg,
    },
    /// Change the display aspect ratio
    AspectRatio {
        #[arg(long, value_enum)]
        ratio: AspectRatioArg,
    },
    /// Extract the audio track as mp3
    Audio,
    /// Cut a GIF out of the video
    Gif {
        /// Start of the clip, HH:MM:SS
        #[arg(long)]
        start: String,

        /// Length of the clip in seconds
        #[arg(long)]
        duration: f64,

        /// ffprobe binary used to read the video length
        #[arg(long, default_value = "ffprobe")]
        ffprobe: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolutionArg {
    /// 1920:1080
    FullHd,
    /// 1280:720
    Hd,
    /// 720:480
    Sd,
}

#[derive(Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "16:9")]
    Wide,
    #[value(name = "4:3")]
    Standard,
    #[value(name = "1:1")]
    Square,
}

/// Parse `HH:MM:SS` into seconds.
fn parse_clock(value: &str) -> Result<u64, MediaWireError> {
    let invalid = || MediaWireError::InvalidParameters(format!("{:?} is not HH:MM:SS", value));
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.len() != 2) {
        return Err(invalid());
    }
    let mut seconds = 0u64;
    for part in parts {
        let n: u64 = part.parse().map_err(|_| invalid())?;
        seconds = seconds * 60 + n;
    }
    Ok(seconds)
}

async fn build_operation(cli: &Cli) -> Result<Operation, MediaWireError> {
    let operation = match &cli.operation {
        Command::Compress => Operation::Compress,
        Command::Resize { resolution } => Operation::Resize {
            resolution: match resolution {
                ResolutionArg::FullHd => Resolution::FullHd,
                ResolutionArg::Hd => Resolution::Hd,
                ResolutionArg::Sd => Resolution::Sd,
            },
        },
        Command::AspectRatio { ratio } => Operation::AspectRatio {
            aspect_ratio: match ratio {
                AspectRatioArg::Wide => AspectRatio::Widescreen,
                AspectRatioArg::Standard => AspectRatio::Standard,
                AspectRatioArg::Square => AspectRatio::Square,
            },
        },
        Command::Audio => Operation::ToAudio,
        Command::Gif {
            start,
            duration,
            ffprobe,
        } => {
            let operation = Operation::GifClip {
                start_time: parse_clock(start)?,
                duration: *duration,
            };
            let source_duration = probe_duration(ffprobe, &cli.file).await?;
            info!("Source is {:.2}s long", source_duration);
            operation.validate_against(source_duration)?;
            operation
        }
    };
    Ok(operation)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let operation = build_operation(&cli).await?;

    let config = ClientConfig {
        receive_dir: cli.receive_dir.clone(),
        chunk_size: cli.chunk_size,
        io_timeout: (cli.io_timeout_secs > 0).then(|| Duration::from_secs(cli.io_timeout_secs)),
    };
    let client = MediaTcpClient::new(config).await?;
    let artifact = client.process(&cli.server, &cli.file, operation).await?;

    println!(
        "Saved {} ({} bytes)",
        artifact.path.display(),
        artifact.stats.bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:00:10").unwrap(), 10);
        assert_eq!(parse_clock("01:02:03").unwrap(), 3723);
        assert!(parse_clock("1:02:03").is_err());
        assert!(parse_clock("00:10").is_err());
        assert!(parse_clock("aa:bb:cc").is_err());
    }

    #[test]
    fn test_cli_parses_gif() {
        let cli = Cli::try_parse_from([
            "media-client",
            "clip.mp4",
            "gif",
            "--start",
            "00:00:05",
            "--duration",
            "2",
        ])
        .unwrap();
        assert!(
            matches!(cli.operation, Command::Gif { duration, .. } if duration == 2.0)
        );
    }

    #[test]
    fn test_cli_parses_aspect_ratio() {
        let cli = Cli::try_parse_from([
            "media-client",
            "clip.avi",
            "aspect-ratio",
            "--ratio",
            "4:3",
        ])
        .unwrap();
        assert!(matches!(
            cli.operation,
            Command::AspectRatio {
                ratio: AspectRatioArg::Standard
            }
        ));
    }
}
