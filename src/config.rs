//! Configuration values handed to the server and client constructors.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::types::{Result, DEFAULT_CHUNK_SIZE};

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where uploads are stored and artifacts are written
    pub processed_dir: PathBuf,
    /// Largest read/write per socket call
    pub chunk_size: usize,
    /// Deadline for each socket read or write; `None` waits forever
    pub io_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            processed_dir: PathBuf::from("processed"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ServerConfig {
    /// Create the processed directory if it does not exist yet.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.processed_dir).await?;
        debug!(
            "Processed directory ready at {}",
            self.processed_dir.display()
        );
        Ok(())
    }
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Where downloaded artifacts are written
    pub receive_dir: PathBuf,
    pub chunk_size: usize,
    /// Deadline for each socket operation. Unset by default because the reply
    /// only starts once the remote transform has finished.
    pub io_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive_dir: PathBuf::from("receive"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create the receive directory if it does not exist yet.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.receive_dir).await?;
        debug!("Receive directory ready at {}", self.receive_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.chunk_size, 1400);
        assert_eq!(server.processed_dir, PathBuf::from("processed"));
        assert!(server.io_timeout.is_some());

        let client = ClientConfig::default();
        assert_eq!(client.receive_dir, PathBuf::from("receive"));
        assert!(client.io_timeout.is_none());
    }

    #[tokio::test]
    async fn test_prepare_creates_nested_dirs() {
        let root = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            processed_dir: root.path().join("a/b/processed"),
            ..ServerConfig::default()
        };
        config.prepare().await.unwrap();
        config.prepare().await.unwrap();
        assert!(config.processed_dir.is_dir());
    }
}
