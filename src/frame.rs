//! Fixed 8-byte frame header.
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────┐
//! │ metadata len │ media type   │ payload len      │
//! │ 2 bytes BE   │ 1 byte       │ 5 bytes BE       │
//! └──────────────┴──────────────┴──────────────────┘
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::types::{
    MediaWireError, Result, HEADER_LEN, MAX_MEDIA_TYPE_LEN, MAX_METADATA_LEN, MAX_PAYLOAD_LEN,
};

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub metadata_len: u16,
    pub media_type_len: u8,
    /// Always below 2^40.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Build a header, rejecting any length that does not fit its field.
    pub fn new(metadata_len: u64, media_type_len: u64, payload_len: u64) -> Result<Self> {
        Ok(Self {
            metadata_len: check_width("metadata_json_length", metadata_len, MAX_METADATA_LEN)?
                as u16,
            media_type_len: check_width("media_type_length", media_type_len, MAX_MEDIA_TYPE_LEN)?
                as u8,
            payload_len: check_width("payload_length", payload_len, MAX_PAYLOAD_LEN)?,
        })
    }

    /// Bytes of metadata plus media type that follow the header.
    pub fn head_body_len(&self) -> usize {
        self.metadata_len as usize + self.media_type_len as usize
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        BigEndian::write_u16(&mut buf[0..2], self.metadata_len);
        buf[2] = self.media_type_len;
        BigEndian::write_uint(&mut buf[3..8], self.payload_len, 5);
        buf
    }

    /// Decode a header. Every 8-byte input is a valid header.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            metadata_len: BigEndian::read_u16(&buf[0..2]),
            media_type_len: buf[2],
            payload_len: BigEndian::read_uint(&buf[3..8], 5),
        }
    }
}

fn check_width(field: &'static str, value: u64, max: u64) -> Result<u64> {
    if value > max {
        return Err(MediaWireError::FieldOverflow { field, value, max });
    }
    Ok(value)
}

/// Encode the three header lengths into 8 bytes.
pub fn encode_header(
    metadata_len: u64,
    media_type_len: u64,
    payload_len: u64,
) -> Result<[u8; HEADER_LEN]> {
    let header = FrameHeader::new(metadata_len, media_type_len, payload_len)?;
    Ok(header.encode())
}

/// Decode 8 bytes into `(metadata_len, media_type_len, payload_len)`.
pub fn decode_header(buf: &[u8; HEADER_LEN]) -> (u16, u8, u64) {
    let header = FrameHeader::decode(buf);
    (header.metadata_len, header.media_type_len, header.payload_len)
}
