//! Sending side of an upload: the client half of the exchange.

use std::path::Path;

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

use crate::codec::{FrameHead, FrameHeadCodec};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::metadata::{media_type_of, sanitize_file_name, to_json_bytes, Operation, UploadMetadata};
use crate::session::download::{DownloadSession, DownloadedArtifact};
use crate::types::{Ack, MediaWireError, Result, HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Connected,
    HeaderSent,
    MetadataSent,
    PayloadSent,
    AwaitingAck,
    Done,
    Failed,
}

/// Uploads one file, waits for the ack and then downloads the result.
///
/// The session owns the connection; [`UploadSession::run`] consumes it and the
/// socket is shut down on every exit path.
pub struct UploadSession<S> {
    conn: Connection<S>,
    state: UploadState,
}

impl UploadSession<TcpStream> {
    /// Connect to `addr` using the client's chunk size and deadline.
    pub async fn connect(addr: &str, config: &ClientConfig) -> Result<Self> {
        debug!("Upload {:?}: connecting to {}", UploadState::Idle, addr);
        let stream = match config.io_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| MediaWireError::TimedOut("connect"))?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(MediaWireError::Transport)?;
        info!("Connected to {}", addr);

        let conn = Connection::new(stream)
            .with_chunk_size(config.chunk_size)
            .with_timeout(config.io_timeout);
        Ok(Self::new(conn))
    }
}

impl<S> UploadSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn new(conn: Connection<S>) -> Self {
        Self {
            conn,
            state: UploadState::Connected,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    fn transition(&mut self, next: UploadState) {
        debug!("Upload {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Upload `path` for `operation` and store the returned artifact in `receive_dir`.
    pub async fn run(
        mut self,
        path: &Path,
        operation: Operation,
        receive_dir: &Path,
    ) -> Result<DownloadedArtifact> {
        let result = self.drive(path, operation, receive_dir).await;
        match &result {
            Ok(artifact) => {
                self.transition(UploadState::Done);
                info!("Download succeeded: {}", artifact.path.display());
            }
            Err(e) => {
                self.transition(UploadState::Failed);
                warn!("Upload of {} failed: {}", path.display(), e);
            }
        }
        debug!("Closing socket");
        self.conn.shutdown().await;
        result
    }

    async fn drive(
        &mut self,
        path: &Path,
        operation: Operation,
        receive_dir: &Path,
    ) -> Result<DownloadedArtifact> {
        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();
        if size == 0 {
            return Err(MediaWireError::NoData);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let file_name = sanitize_file_name(name)?;
        let metadata = to_json_bytes(&UploadMetadata::new(file_name, operation))?;
        let head = FrameHead::new(metadata, media_type_of(path), size);

        let mut buf = BytesMut::new();
        FrameHeadCodec.encode(head, &mut buf)?;
        let body = buf.split_off(HEADER_LEN);

        self.conn.write_all(&buf).await?;
        self.transition(UploadState::HeaderSent);
        self.conn.write_all(&body).await?;
        self.transition(UploadState::MetadataSent);

        let stats = self.conn.send_payload(size, &mut file).await?;
        info!("Sent {} bytes in {} chunks", stats.bytes, stats.chunks);
        self.transition(UploadState::PayloadSent);

        self.transition(UploadState::AwaitingAck);
        match self.conn.read_ack().await? {
            Ack::Stored => info!("Upload succeeded"),
            Ack::Rejected => return Err(MediaWireError::UploadRejected),
        }

        DownloadSession::new(&mut self.conn)
            .download_to_dir(receive_dir)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReplyMetadata;
    use tokio::io::AsyncReadExt;

    /// Peer that reads the upload and answers with `ack`, then a reply if stored.
    async fn fake_server(stream: tokio::io::DuplexStream, ack: u8) -> Vec<u8> {
        let mut conn = Connection::new(stream);
        let head = conn.read_head().await.unwrap();
        let mut payload = Vec::new();
        conn.receive_payload(head.payload_len, &mut payload)
            .await
            .unwrap();
        conn.write_all(&[ack]).await.unwrap();
        if ack == Ack::Stored as u8 {
            let meta = to_json_bytes(&ReplyMetadata::artifact("compressed_clip.mp4")).unwrap();
            let len = payload.len() as u64;
            conn.write_head(FrameHead::new(meta, ".mp4", len)).await.unwrap();
            conn.send_payload(len, &mut &payload[..]).await.unwrap();
        }
        conn.shutdown().await;
        payload
    }

    fn source_file(dir: &Path, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn test_stored_ack_leads_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), &[1, 2, 3, 4, 5]);
        let receive = tempfile::tempdir().unwrap();

        let (client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(fake_server(server, 0x00));

        let artifact = UploadSession::new(Connection::new(client))
            .run(&source, Operation::Compress, receive.path())
            .await
            .unwrap();

        assert_eq!(server.await.unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(artifact.file_name, "compressed_clip.mp4");
        assert_eq!(std::fs::read(artifact.path).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_rejected_ack_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), b"data");
        let (client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(fake_server(server, 0x01));

        let err = UploadSession::new(Connection::new(client))
            .run(&source, Operation::ToAudio, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaWireError::UploadRejected));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_ack_is_protocol_violation() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), b"data");
        let (client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(fake_server(server, 0x02));

        let err = UploadSession::new(Connection::new(client))
            .run(&source, Operation::Compress, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaWireError::ProtocolViolation(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_frame_in_place_of_ack_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), b"data");
        let receive = tempfile::tempdir().unwrap();
        let (client, server) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut conn = Connection::new(server);
            let head = conn.read_head().await.unwrap();
            conn.discard(head.payload_len).await.unwrap();
            conn.write_head(FrameHead::error("Timed out during read").unwrap())
                .await
                .unwrap();
            conn.shutdown().await;
        });

        // The frame's leading 0x00 reads as a stored ack and the rest misparses.
        let err = UploadSession::new(Connection::new(client))
            .run(&source, Operation::Compress, receive.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaWireError::ConnectionClosed), "{:?}", err);
        assert_eq!(std::fs::read_dir(receive.path()).unwrap().count(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_is_refused_before_sending() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_file(dir.path(), b"");
        let (client, mut server) = tokio::io::duplex(64);

        let err = UploadSession::new(Connection::new(client))
            .run(&source, Operation::Compress, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaWireError::NoData));

        // Nothing but the shutdown reached the peer.
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
