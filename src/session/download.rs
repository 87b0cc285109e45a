//! Receiving side of a frame, used by both the client and the server.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::connection::{Connection, TransferStats};
use crate::metadata::{from_json_bytes, sanitize_file_name, ReplyMetadata};
use crate::types::{MediaWireError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    AwaitingHeader,
    MetadataRead,
    PayloadStreaming,
    RemoteError,
    Done,
}

/// A frame head whose metadata parsed as `M`; the payload is still on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound<M> {
    pub metadata: M,
    pub media_type: String,
    pub payload_len: u64,
}

/// An artifact written to the receive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub media_type: String,
    pub stats: TransferStats,
}

/// Drives one inbound frame over a borrowed connection.
pub struct DownloadSession<'c, S> {
    conn: &'c mut Connection<S>,
    state: DownloadState,
}

impl<'c, S> DownloadSession<'c, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(conn: &'c mut Connection<S>) -> Self {
        Self {
            conn,
            state: DownloadState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    fn transition(&mut self, next: DownloadState) {
        debug!("Download {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Read the header and metadata block.
    ///
    /// Error-flagged metadata ends the session with `RemoteError`; no payload
    /// is read in that case.
    pub async fn receive_head<M>(&mut self) -> Result<Inbound<M>>
    where
        M: DeserializeOwned,
    {
        let head = self.conn.read_head().await?;

        if let Some(message) = head.remote_error()? {
            self.transition(DownloadState::RemoteError);
            if head.payload_len != 0 {
                warn!(
                    "Error frame declared a {} byte payload, ignoring it",
                    head.payload_len
                );
            }
            return Err(MediaWireError::RemoteError(message));
        }

        let metadata = from_json_bytes(&head.metadata)?;
        self.transition(DownloadState::MetadataRead);
        Ok(Inbound {
            metadata,
            media_type: head.media_type,
            payload_len: head.payload_len,
        })
    }

    /// Stream exactly `len` bytes into `sink`, driven by the declared length.
    pub async fn receive_payload<W>(&mut self, len: u64, sink: &mut W) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin,
    {
        self.transition(DownloadState::PayloadStreaming);
        let stats = self.conn.receive_payload(len, sink).await?;
        self.transition(DownloadState::Done);
        Ok(stats)
    }

    /// Consume the payload without keeping it.
    pub async fn discard_payload(&mut self, len: u64) -> Result<TransferStats> {
        self.transition(DownloadState::PayloadStreaming);
        let stats = self.conn.discard(len).await?;
        self.transition(DownloadState::Done);
        Ok(stats)
    }

    /// Receive a server reply and store its payload under `dir`.
    pub async fn download_to_dir(&mut self, dir: &Path) -> Result<DownloadedArtifact> {
        let reply: Inbound<ReplyMetadata> = self.receive_head().await?;
        let name = reply.metadata.file_name.as_deref().ok_or_else(|| {
            MediaWireError::ProtocolViolation("reply metadata has no file_name".to_string())
        })?;
        let file_name = sanitize_file_name(name)?;
        let path = dir.join(&file_name);
        info!(
            "Downloading {} ({} bytes)",
            path.display(),
            reply.payload_len
        );

        let mut file = match File::create(&path).await {
            Ok(file) => file,
            Err(e) => {
                self.discard_payload(reply.payload_len).await?;
                return Err(MediaWireError::Io(e));
            }
        };
        let stats = self.receive_payload(reply.payload_len, &mut file).await?;
        file.sync_all().await?;

        Ok(DownloadedArtifact {
            path,
            file_name,
            media_type: reply.media_type,
            stats,
        })
    }
}
