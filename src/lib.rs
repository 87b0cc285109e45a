//! # Mediawire
//!
//! A small binary protocol for sending a media file to a remote worker over a
//! raw TCP connection, asking for a transformation, and getting the result back
//! on the same connection.
//!
//! ## Quick Start
//!
//! ```rust
//! use mediawire::frame::{decode_header, encode_header};
//!
//! // 35 bytes of metadata, ".mp4", 1 KiB of payload
//! let header = encode_header(35, 4, 1024)?;
//! assert_eq!(header, [0x00, 0x23, 0x04, 0x00, 0x00, 0x00, 0x04, 0x00]);
//! assert_eq!(decode_header(&header), (35, 4, 1024));
//! # Ok::<(), mediawire::MediaWireError>(())
//! ```
//!
//! ## Protocol Overview
//!
//! Every frame has the following wire format:
//!
//! - METADATA_LEN (2B BE): Length of the JSON metadata block
//! - MEDIA_TYPE_LEN (1B): Length of the media type string
//! - PAYLOAD_LEN (5B BE): Exact payload length
//! - METADATA: UTF-8 JSON
//! - MEDIA_TYPE: UTF-8 file extension, e.g. `.mp4`
//! - PAYLOAD: Raw bytes
//!
//! There are no delimiters; the declared lengths are the only boundaries.
//! Payloads are moved in bounded chunks, which the peer never sees.
//!
//! ## Exchange
//!
//! | Step | Direction       | Content                                  |
//! |------|-----------------|------------------------------------------|
//! | 1    | Client → Server | Upload frame (`file_name`, `operation`)  |
//! | 2    | Server → Client | Ack byte: `0x00` stored, `0x01` rejected |
//! | 3    | Server → Client | Artifact frame, or a zero-payload error frame |
//!
//! A server that fails before the payload is stored (unparsable metadata, an
//! empty payload, a stalled upload) skips the ack and answers with an error
//! frame directly.
//!
//! ### Known ambiguity
//!
//! The ack and an error frame can arrive at the same position. An error frame
//! whose metadata is shorter than 256 bytes starts with `0x00`, which the
//! client reads as [`Ack::Stored`]. It then parses the rest as a reply head at
//! the wrong offset and usually fails with
//! [`MediaWireError::ConnectionClosed`]. The server's message is lost.
//!
//! ## Operations
//!
//! | Code | Name         | Parameters                  |
//! |------|--------------|-----------------------------|
//! | 1    | compress     | none                        |
//! | 2    | resize       | `resolution`                |
//! | 3    | aspect ratio | `aspect_ratio`              |
//! | 4    | to audio     | none                        |
//! | 5    | GIF clip     | `start_time`, `duration`    |

pub mod codec;
pub mod config;
pub mod connection;
pub mod frame;
pub mod metadata;
pub mod session;
pub mod tcp;
pub mod transform;
pub mod types;

// Re-export main types for convenience
pub use types::{Ack, MediaWireError, Result, SessionId, DEFAULT_CHUNK_SIZE, HEADER_LEN};

pub use codec::{FrameHead, FrameHeadCodec};
pub use config::{ClientConfig, ServerConfig};
pub use connection::{Connection, TransferStats};
pub use frame::{decode_header, encode_header, FrameHeader};
pub use metadata::{AspectRatio, Operation, ReplyMetadata, Resolution, UploadMetadata};
pub use session::{DownloadSession, DownloadedArtifact, UploadSession};
pub use tcp::{MediaTcpClient, MediaTcpServer, ServerDispatcher};
pub use transform::{
    FfmpegTransform, IdentityTransform, Transform, TransformError, TransformRequest,
};
