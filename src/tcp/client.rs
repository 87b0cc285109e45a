use std::path::Path;

use tracing::info;

use crate::config::ClientConfig;
use crate::metadata::{media_type_of, Operation, ACCEPTED_EXTENSIONS};
use crate::session::{DownloadedArtifact, UploadSession};
use crate::types::{MediaWireError, Result};

/// TCP client for the media transfer protocol
#[derive(Debug, Clone)]
pub struct MediaTcpClient {
    config: ClientConfig,
}

impl MediaTcpClient {
    /// Prepare the receive directory
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.prepare().await?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Upload `path` to the server at `addr`, request `operation` and download the result.
    ///
    /// One connection per call; it is closed whatever the outcome.
    pub async fn process(
        &self,
        addr: &str,
        path: &Path,
        operation: Operation,
    ) -> Result<DownloadedArtifact> {
        let media_type = media_type_of(path);
        if !ACCEPTED_EXTENSIONS.contains(&media_type.as_str()) {
            return Err(MediaWireError::InvalidParameters(format!(
                "{} is not one of {:?}",
                path.display(),
                ACCEPTED_EXTENSIONS
            )));
        }

        info!(
            "Requesting operation {} on {} from {}",
            operation.code(),
            path.display(),
            addr
        );
        UploadSession::connect(addr, &self.config)
            .await?
            .run(path, operation, &self.config.receive_dir)
            .await
    }
}
