//! Per-connection handling on the server.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::codec::FrameHead;
use crate::config::ServerConfig;
use crate::connection::{Connection, TransferStats};
use crate::metadata::{
    media_type_of, sanitize_file_name, to_json_bytes, ReplyMetadata, UploadMetadata,
};
use crate::session::{DownloadSession, Inbound};
use crate::transform::{Transform, TransformRequest};
use crate::types::{Ack, MediaWireError, Result, SessionId};

/// How a single connection ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The artifact was sent back to the client.
    Served { artifact: PathBuf, stats: TransferStats },
    /// Storage failed and ack `0x01` was sent.
    Rejected(MediaWireError),
    /// An error frame was sent (or attempted) in place of a reply.
    Failed(MediaWireError),
}

/// Receives an upload, stores it, runs the transform and replies.
pub struct ServerDispatcher<T> {
    config: ServerConfig,
    transform: T,
}

impl<T: Transform> ServerDispatcher<T> {
    pub fn new(config: ServerConfig, transform: T) -> Self {
        Self { config, transform }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle one connection to completion and close it.
    ///
    /// Never returns an error: failures become an error frame for the peer.
    pub async fn handle_connection<S>(&self, stream: S, session_id: SessionId) -> ConnectionOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = Connection::new(stream)
            .with_chunk_size(self.config.chunk_size)
            .with_timeout(self.config.io_timeout);

        let outcome = match self.serve(&mut conn, session_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Session {} failed: {}", session_id, e);
                if let Err(send_err) = send_error_frame(&mut conn, &e).await {
                    warn!(
                        "Session {} could not send error frame: {}",
                        session_id, send_err
                    );
                }
                ConnectionOutcome::Failed(e)
            }
        };

        debug!("Session {} closing connection", session_id);
        conn.shutdown().await;
        outcome
    }

    async fn serve<S>(
        &self,
        conn: &mut Connection<S>,
        session_id: SessionId,
    ) -> Result<ConnectionOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (upload, file_name, input_path, stored) = {
            let mut download = DownloadSession::new(conn);
            let upload: Inbound<UploadMetadata> = download.receive_head().await?;
            info!(
                "Session {} upload {} ({}, {} bytes, operation {})",
                session_id,
                upload.metadata.file_name,
                upload.media_type,
                upload.payload_len,
                upload.metadata.operation.code()
            );

            if upload.payload_len == 0 {
                return Err(MediaWireError::NoData);
            }

            let file_name = sanitize_file_name(&upload.metadata.file_name)?;
            let input_path = self.config.processed_dir.join(&file_name);
            let stored = store(&mut download, &input_path, upload.payload_len).await;
            (upload, file_name, input_path, stored)
        };

        match stored {
            Ok(stats) => {
                info!(
                    "Session {} stored {} bytes in {} chunks",
                    session_id, stats.bytes, stats.chunks
                );
                conn.write_ack(Ack::Stored).await?;
            }
            Err(MediaWireError::Io(e)) => {
                warn!("Session {} storage failed: {}", session_id, e);
                remove_if_present(&input_path).await;
                conn.write_ack(Ack::Rejected).await?;
                return Ok(ConnectionOutcome::Rejected(MediaWireError::Io(e)));
            }
            Err(e) => {
                remove_if_present(&input_path).await;
                return Err(e);
            }
        }

        let request = TransformRequest {
            input: &input_path,
            file_name: &file_name,
            operation: &upload.metadata.operation,
        };
        let transformed = self.transform.transform(request).await;
        remove_if_present(&input_path).await;
        let artifact = transformed?;

        let stats = send_artifact(conn, &artifact).await?;
        info!(
            "Session {} sent {} ({} bytes)",
            session_id,
            artifact.display(),
            stats.bytes
        );
        Ok(ConnectionOutcome::Served { artifact, stats })
    }
}

/// Write the payload to `path`, flushed and synced before returning.
///
/// Any local failure comes back as `Io` with the payload fully consumed.
async fn store<S>(
    download: &mut DownloadSession<'_, S>,
    path: &Path,
    len: u64,
) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut file = match File::create(path).await {
        Ok(file) => file,
        Err(e) => {
            download.discard_payload(len).await?;
            return Err(MediaWireError::Io(e));
        }
    };
    let stats = download.receive_payload(len, &mut file).await?;
    file.sync_all().await?;
    Ok(stats)
}

async fn send_artifact<S>(conn: &mut Connection<S>, path: &Path) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            MediaWireError::InvalidParameters(format!(
                "artifact {} has no file name",
                path.display()
            ))
        })?;

    let metadata = to_json_bytes(&ReplyMetadata::artifact(file_name))?;
    conn.write_head(FrameHead::new(metadata, media_type_of(path), len))
        .await?;
    conn.send_payload(len, &mut file).await
}

async fn send_error_frame<S>(conn: &mut Connection<S>, err: &MediaWireError) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write_head(FrameHead::error(&err.to_string())?).await?;
    conn.flush().await
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}
