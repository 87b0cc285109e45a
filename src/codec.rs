//! `tokio_util` codec for the frame head: header, metadata block and media type.
//!
//! The payload is not part of the codec. It can be gigabytes long, so it is
//! streamed separately by [`crate::connection::Connection`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::FrameHeader;
use crate::metadata::{from_json_bytes, to_json_bytes, ErrorProbe, ReplyMetadata};
use crate::types::{MediaWireError, HEADER_LEN};

/// Everything in a frame that precedes the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHead {
    /// Raw UTF-8 JSON.
    pub metadata: Bytes,
    pub media_type: String,
    pub payload_len: u64,
}

impl FrameHead {
    pub fn new(
        metadata: impl Into<Bytes>,
        media_type: impl Into<String>,
        payload_len: u64,
    ) -> Self {
        Self {
            metadata: metadata.into(),
            media_type: media_type.into(),
            payload_len,
        }
    }

    /// Zero-payload frame reporting `message` to the peer.
    pub fn error(message: &str) -> Result<Self, MediaWireError> {
        let metadata = to_json_bytes(&ReplyMetadata::failure(message))?;
        Ok(Self::new(metadata, String::new(), 0))
    }

    pub fn header(&self) -> Result<FrameHeader, MediaWireError> {
        FrameHeader::new(
            self.metadata.len() as u64,
            self.media_type.len() as u64,
            self.payload_len,
        )
    }

    /// The peer's error message, if this head carries error-flagged metadata.
    pub fn remote_error(&self) -> Result<Option<String>, MediaWireError> {
        let probe: ErrorProbe = from_json_bytes(&self.metadata)?;
        if !probe.error {
            return Ok(None);
        }
        Ok(Some(
            probe
                .error_message
                .unwrap_or_else(|| "unspecified remote error".to_string()),
        ))
    }
}

/// Codec for [`FrameHead`] values.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameHeadCodec;

impl Decoder for FrameHeadCodec {
    type Item = FrameHead;
    type Error = MediaWireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut raw = [0u8; HEADER_LEN];
        raw.copy_from_slice(&src[..HEADER_LEN]);
        let header = FrameHeader::decode(&raw);

        let total = HEADER_LEN + header.head_body_len();
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let metadata = src.split_to(header.metadata_len as usize).freeze();
        let media_type = src.split_to(header.media_type_len as usize);
        let media_type = String::from_utf8(media_type.to_vec()).map_err(|_| {
            MediaWireError::ProtocolViolation("media type is not valid UTF-8".to_string())
        })?;

        Ok(Some(FrameHead {
            metadata,
            media_type,
            payload_len: header.payload_len,
        }))
    }
}

impl Encoder<FrameHead> for FrameHeadCodec {
    type Error = MediaWireError;

    fn encode(&mut self, item: FrameHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header = item.header()?;
        dst.reserve(HEADER_LEN + header.head_body_len());
        dst.put_slice(&header.encode());
        dst.put_slice(&item.metadata);
        dst.put_slice(item.media_type.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_head() -> FrameHead {
        FrameHead::new(
            Bytes::from_static(br#"{"file_name":"a.mp4","operation":1}"#),
            ".mp4",
            1024,
        )
    }

    #[test]
    fn test_encode_layout() {
        let mut buf = BytesMut::new();
        FrameHeadCodec.encode(scenario_head(), &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_LEN + 35 + 4);
        assert_eq!(&buf[..HEADER_LEN], &[0, 35, 4, 0, 0, 0, 4, 0]);
        assert_eq!(&buf[HEADER_LEN + 35..], b".mp4");
    }

    #[test]
    fn test_decode_waits_for_full_head() {
        let mut full = BytesMut::new();
        FrameHeadCodec.encode(scenario_head(), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..HEADER_LEN + 10]);
        assert!(FrameHeadCodec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_LEN + 10);

        partial.extend_from_slice(&full[HEADER_LEN + 10..]);
        partial.extend_from_slice(b"PAYLOAD");
        let head = FrameHeadCodec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(head, scenario_head());
        // Payload bytes are left for the caller.
        assert_eq!(&partial[..], b"PAYLOAD");
    }

    #[test]
    fn test_encode_rejects_oversized_media_type() {
        let head = FrameHead::new(Bytes::new(), "x".repeat(256), 0);
        let err = FrameHeadCodec
            .encode(head, &mut BytesMut::new())
            .unwrap_err();
        assert!(matches!(err, MediaWireError::FieldOverflow { .. }));
    }

    #[test]
    fn test_error_head() {
        let head = FrameHead::error("No data to read from client").unwrap();
        assert_eq!(head.payload_len, 0);
        assert!(head.media_type.is_empty());
        assert_eq!(
            head.remote_error().unwrap().as_deref(),
            Some("No data to read from client")
        );
        assert_eq!(scenario_head().remote_error().unwrap(), None);
    }

    #[test]
    fn test_invalid_media_type_utf8() {
        let mut buf = BytesMut::new();
        buf.put_slice(&FrameHeader::new(2, 1, 0).unwrap().encode());
        buf.put_slice(b"{}");
        buf.put_u8(0xff);
        let err = FrameHeadCodec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, MediaWireError::ProtocolViolation(_)));
    }
}
