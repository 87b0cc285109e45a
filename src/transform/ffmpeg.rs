//! [`Transform`] backed by the `ffmpeg` command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Transform, TransformError, TransformRequest};
use crate::metadata::{Operation, GIF_FPS};

/// Bitrate used by the compress operation.
pub const COMPRESS_BITRATE: &str = "1M";

/// Bytes of stderr kept in a [`TransformError::Failed`].
const STDERR_TAIL: usize = 2048;

/// Runs one `ffmpeg` process per request and writes into `output_dir`.
#[derive(Debug, Clone)]
pub struct FfmpegTransform {
    output_dir: PathBuf,
    program: PathBuf,
}

impl FfmpegTransform {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            program: PathBuf::from("ffmpeg"),
        }
    }

    /// Use a specific ffmpeg binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Command-line arguments for `operation`.
    pub fn args(operation: &Operation, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];
        // Seeking before -i trims the input rather than the output.
        if let Operation::GifClip {
            start_time,
            duration,
        } = operation
        {
            args.push("-ss".into());
            args.push(start_time.to_string().into());
            args.push("-t".into());
            args.push(duration.to_string().into());
        }
        args.push("-i".into());
        args.push(input.into());

        match operation {
            Operation::Compress => {
                args.push("-b".into());
                args.push(COMPRESS_BITRATE.into());
            }
            Operation::Resize { resolution } => {
                args.push("-vf".into());
                args.push(format!("scale={}", resolution.as_scale()).into());
            }
            Operation::AspectRatio { aspect_ratio } => {
                args.push("-vf".into());
                args.push(format!("setdar={}", aspect_ratio.as_dar()).into());
            }
            Operation::ToAudio => {
                args.push("-acodec".into());
                args.push("mp3".into());
            }
            Operation::GifClip { .. } => {
                args.push("-vf".into());
                args.push(format!("fps={}", GIF_FPS).into());
                args.push("-pix_fmt".into());
                args.push("rgb24".into());
            }
        }

        args.push(output.into());
        args
    }

    async fn run(&self, request: TransformRequest<'_>) -> Result<PathBuf, TransformError> {
        let output = self
            .output_dir
            .join(request.operation.artifact_name(request.file_name));
        let args = Self::args(request.operation, request.input, &output);
        let program = self.program.display().to_string();
        debug!("Running {} {:?}", program, args);

        let result = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TransformError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(TransformError::Failed {
                program,
                status: result.status.code(),
                stderr: stderr_tail(&result.stderr),
            });
        }
        if !tokio::fs::try_exists(&output).await? {
            return Err(TransformError::MissingOutput(output));
        }

        tokio::fs::remove_file(request.input).await?;
        info!(
            "Operation {} produced {}",
            request.operation.code(),
            output.display()
        );
        Ok(output)
    }
}

impl Transform for FfmpegTransform {
    fn transform<'a>(
        &'a self,
        request: TransformRequest<'a>,
    ) -> BoxFuture<'a, Result<PathBuf, TransformError>> {
        Box::pin(self.run(request))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_TAIL) {
        Some((idx, _)) => text[idx..].to_string(),
        None => text.to_string(),
    }
}

/// Length of a media file in seconds, read with `ffprobe`.
pub async fn probe_duration(ffprobe: &Path, path: &Path) -> Result<f64, TransformError> {
    let program = ffprobe.display().to_string();
    let result = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|source| TransformError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !result.status.success() {
        return Err(TransformError::Failed {
            program,
            status: result.status.code(),
            stderr: stderr_tail(&result.stderr),
        });
    }

    let stdout = String::from_utf8_lossy(&result.stdout);
    stdout
        .trim()
        .parse::<f64>()
        .map_err(|_| {
            TransformError::Probe(format!("unexpected ffprobe output {:?}", stdout.trim()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AspectRatio, Resolution};

    fn args_of(operation: Operation) -> Vec<String> {
        FfmpegTransform::args(&operation, Path::new("in.mp4"), Path::new("out.mp4"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_compress_args() {
        assert_eq!(
            args_of(Operation::Compress),
            ["-hide_banner", "-y", "-i", "in.mp4", "-b", "1M", "out.mp4"]
        );
    }

    #[test]
    fn test_filter_args() {
        let resize = args_of(Operation::Resize {
            resolution: Resolution::Sd,
        });
        assert!(resize.contains(&"scale=720:480".to_string()));

        let aspect = args_of(Operation::AspectRatio {
            aspect_ratio: AspectRatio::Widescreen,
        });
        assert!(aspect.contains(&"setdar=16/9".to_string()));
    }

    #[test]
    fn test_gif_seeks_before_input() {
        let args = args_of(Operation::GifClip {
            start_time: 12,
            duration: 3.5,
        });
        assert_eq!(&args[2..7], ["-ss", "12", "-t", "3.5", "-i"]);
        assert!(args.ends_with(&[
            "-vf".to_string(),
            "fps=10".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "out.mp4".to_string(),
        ]));
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let long = "x".repeat(STDERR_TAIL * 2) + "final line";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("final line"));
        assert!(tail.len() <= STDERR_TAIL + 1);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a.mp4");
        std::fs::write(&input, b"x").unwrap();
        let transform =
            FfmpegTransform::new(dir.path()).with_program(dir.path().join("no-such-ffmpeg"));

        let err = transform
            .transform(TransformRequest {
                input: &input,
                file_name: "a.mp4",
                operation: &Operation::Compress,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }));
        assert!(input.exists());
    }
}
