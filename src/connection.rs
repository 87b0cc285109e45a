//! Exact-read / exact-write primitives over a byte stream.
//!
//! Sessions never touch the socket directly; every byte goes through a
//! [`Connection`], which bounds each call by the configured chunk size and
//! optional deadline.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::codec::{FrameHead, FrameHeadCodec};
use crate::frame::FrameHeader;
use crate::types::{Ack, MediaWireError, Result, DEFAULT_CHUNK_SIZE, HEADER_LEN};

/// Counters for one payload transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    /// Number of read or write calls the payload took.
    pub chunks: u64,
}

/// A byte stream with protocol-level read and write helpers.
pub struct Connection<S> {
    stream: S,
    chunk_size: usize,
    io_timeout: Option<Duration>,
    codec: FrameHeadCodec,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: None,
            codec: FrameHeadCodec,
        }
    }

    /// Set the largest number of bytes moved per underlying call. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Bound every read and write by `io_timeout`.
    pub fn with_timeout(mut self, io_timeout: Option<Duration>) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn deadline<T, F>(io_timeout: Option<Duration>, what: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        let res = match io_timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| MediaWireError::TimedOut(what))?,
            None => fut.await,
        };
        res.map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => MediaWireError::ConnectionClosed,
            _ => MediaWireError::Transport(e),
        })
    }

    /// Read exactly `n` bytes, or fail with `ConnectionClosed` if the stream ends first.
    pub async fn read_exact(&mut self, n: usize) -> Result<BytesMut> {
        let mut buf = BytesMut::zeroed(n);
        self.read_exact_into(&mut buf).await?;
        Ok(buf)
    }

    async fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let stream = &mut self.stream;
        Self::deadline(self.io_timeout, "read", stream.read_exact(buf)).await?;
        Ok(())
    }

    /// Write the whole buffer despite partial underlying writes.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = &mut self.stream;
        Self::deadline(self.io_timeout, "write", stream.write_all(buf)).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        let stream = &mut self.stream;
        Self::deadline(self.io_timeout, "flush", stream.flush()).await
    }

    /// Read the 8-byte header and then the metadata and media type in one call.
    pub async fn read_head(&mut self) -> Result<FrameHead> {
        let mut buf = self.read_exact(HEADER_LEN).await?;
        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&buf);
        let header = FrameHeader::decode(&raw);
        debug!(
            "Header: metadata {} bytes, media type {} bytes, payload {} bytes",
            header.metadata_len, header.media_type_len, header.payload_len
        );

        let body = self.read_exact(header.head_body_len()).await?;
        buf.extend_from_slice(&body);
        self.codec.decode(&mut buf)?.ok_or_else(|| {
            MediaWireError::ProtocolViolation("incomplete frame head".to_string())
        })
    }

    /// Send the header, then the metadata and media type.
    pub async fn write_head(&mut self, head: FrameHead) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec.encode(head, &mut buf)?;
        let body = buf.split_off(HEADER_LEN);
        self.write_all(&buf).await?;
        self.write_all(&body).await
    }

    /// Read the single ack byte.
    pub async fn read_ack(&mut self) -> Result<Ack> {
        let mut byte = [0u8; 1];
        self.read_exact_into(&mut byte).await?;
        Ack::try_from(byte[0])
    }

    pub async fn write_ack(&mut self, ack: Ack) -> Result<()> {
        self.write_all(&[ack as u8]).await?;
        self.flush().await
    }

    /// Copy exactly `len` payload bytes from the stream into `sink`.
    ///
    /// Each read asks for `min(remaining, chunk_size)` bytes. If the sink fails,
    /// the rest of the payload is still consumed so the stream stays aligned on
    /// frame boundaries; the sink error is returned afterwards.
    pub async fn receive_payload<W>(&mut self, len: u64, sink: &mut W) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut remaining = len;
        let mut stats = TransferStats::default();
        let mut sink_error: Option<std::io::Error> = None;

        while remaining > 0 {
            let n = remaining.min(self.chunk_size as u64) as usize;
            self.read_exact_into(&mut buf[..n]).await?;
            remaining -= n as u64;
            stats.bytes += n as u64;
            stats.chunks += 1;

            if sink_error.is_none() {
                if let Err(e) = sink.write_all(&buf[..n]).await {
                    warn!("Sink write failed, draining {} remaining bytes", remaining);
                    sink_error = Some(e);
                }
            }
        }

        if let Some(e) = sink_error {
            return Err(MediaWireError::Io(e));
        }
        sink.flush().await?;
        debug!("Received {} bytes in {} chunks", stats.bytes, stats.chunks);
        Ok(stats)
    }

    /// Read and drop `len` payload bytes.
    pub async fn discard(&mut self, len: u64) -> Result<TransferStats> {
        self.receive_payload(len, &mut tokio::io::sink()).await
    }

    /// Stream exactly `len` bytes from `source` to the peer.
    pub async fn send_payload<R>(&mut self, len: u64, source: &mut R) -> Result<TransferStats>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut remaining = len;
        let mut stats = TransferStats::default();

        while remaining > 0 {
            let n = remaining.min(self.chunk_size as u64) as usize;
            source
                .read_exact(&mut buf[..n])
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::UnexpectedEof => MediaWireError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "payload source shorter than declared length",
                    )),
                    _ => MediaWireError::Io(e),
                })?;
            self.write_all(&buf[..n]).await?;
            remaining -= n as u64;
            stats.bytes += n as u64;
            stats.chunks += 1;
        }

        self.flush().await?;
        debug!("Sent {} bytes in {} chunks", stats.bytes, stats.chunks);
        Ok(stats)
    }

    /// Best-effort orderly close of the write half.
    pub async fn shutdown(&mut self) {
        let stream = &mut self.stream;
        if let Err(e) = Self::deadline(self.io_timeout, "shutdown", stream.shutdown()).await {
            debug!("Shutdown failed: {}", e);
        }
    }
}
