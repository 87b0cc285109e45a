//! The media-processing capability invoked by the server.
//!
//! The server only cares whether a [`Transform`] succeeds and which file it
//! produced. [`FfmpegTransform`] does the real work; [`IdentityTransform`]
//! passes the bytes through unchanged.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use thiserror::Error;

use crate::metadata::Operation;

pub mod ffmpeg;

pub use ffmpeg::{probe_duration, FfmpegTransform};

/// Errors raised while transforming a file.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status:?}: {stderr}")]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("expected output {0} was not produced")]
    MissingOutput(PathBuf),

    #[error("could not read media duration: {0}")]
    Probe(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One unit of work for a [`Transform`].
#[derive(Debug, Clone, Copy)]
pub struct TransformRequest<'a> {
    /// Stored upload. Consumed on success.
    pub input: &'a Path,
    /// Sanitized name the client uploaded the file under.
    pub file_name: &'a str,
    pub operation: &'a Operation,
}

/// Turns a stored upload into an artifact.
///
/// On success the input file has been removed and the returned path names the
/// artifact. After a failure the input may or may not still exist.
pub trait Transform: Send + Sync {
    fn transform<'a>(
        &'a self,
        request: TransformRequest<'a>,
    ) -> BoxFuture<'a, Result<PathBuf, TransformError>>;
}

/// Renames the input to the artifact name the operation would produce.
#[derive(Debug, Clone)]
pub struct IdentityTransform {
    output_dir: PathBuf,
}

impl IdentityTransform {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Transform for IdentityTransform {
    fn transform<'a>(
        &'a self,
        request: TransformRequest<'a>,
    ) -> BoxFuture<'a, Result<PathBuf, TransformError>> {
        Box::pin(async move {
            let output = self
                .output_dir
                .join(request.operation.artifact_name(request.file_name));
            tokio::fs::rename(request.input, &output).await?;
            Ok(output)
        })
    }
}
