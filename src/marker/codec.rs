//! Binary marker encoding and decoding
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! offset 0:  u32 size        total marker length, 8-byte aligned
//! offset 4:  u32 checksum    computed with this field zeroed
//! offset 8:  u32 type        marker type enumeration
//! offset 12: u64 tick        monotonic identifier
//! offset 20: payload         padded with zeros to the aligned size
//! ```
//!
//! All offset arithmetic for marker traversal lives in this module;
//! callers only ever see typed views and bounds-checked slices.

use crate::error::{ErrorCode, StorageError, StorageResult};

use super::checksum::{marker_checksum, verify_marker};
use super::types::MarkerType;

/// On-disk format version, stored in every header marker
pub const DATAFILE_VERSION: u32 = 2;

/// Size of the common marker header in bytes
pub const MARKER_HEADER_SIZE: usize = 20;

/// Upper bound for a single marker
pub const MARKER_MAXIMAL_SIZE: u32 = 256 * 1024 * 1024;

pub(crate) const SIZE_OFFSET: usize = 0;
pub(crate) const CRC_OFFSET: usize = 4;
pub(crate) const CRC_SIZE: usize = 4;
pub(crate) const TYPE_OFFSET: usize = 8;
pub(crate) const TICK_OFFSET: usize = 12;

/// Rounds `value` up to the next multiple of 8
pub fn aligned_size(value: usize) -> usize {
    (value + 7) & !7
}

/// A decoded log entry.
///
/// The payload is held in its padded form: the constructor extends it
/// with zero bytes so the total marker size is 8-byte aligned. Fixed
/// payload readers consume their declared byte count; variable payloads
/// use [`strip_padding`] before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    marker_type: MarkerType,
    tick: u64,
    payload: Vec<u8>,
}

impl Marker {
    /// Build a marker, padding the payload to the alignment boundary
    pub fn new(marker_type: MarkerType, tick: u64, mut payload: Vec<u8>) -> Self {
        let padded = aligned_size(MARKER_HEADER_SIZE + payload.len()) - MARKER_HEADER_SIZE;
        payload.resize(padded, 0);
        Self {
            marker_type,
            tick,
            payload,
        }
    }

    pub fn marker_type(&self) -> MarkerType {
        self.marker_type
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// The padded payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total marker size including the header
    pub fn size(&self) -> u32 {
        (MARKER_HEADER_SIZE + self.payload.len()) as u32
    }

    /// Serialize to the on-disk representation
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with_size(self.size())
    }

    /// Serialize with an enlarged total size, filling the tail with
    /// zeros. Used for footers that must consume the remaining reserved
    /// space of a datafile exactly.
    pub fn encode_with_size(&self, total_size: u32) -> Vec<u8> {
        debug_assert!(total_size >= self.size());
        debug_assert_eq!(total_size % 8, 0);

        let mut buf = vec![0u8; total_size as usize];
        buf[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&total_size.to_le_bytes());
        buf[TYPE_OFFSET..TYPE_OFFSET + 4]
            .copy_from_slice(&self.marker_type.as_u32().to_le_bytes());
        buf[TICK_OFFSET..TICK_OFFSET + 8].copy_from_slice(&self.tick.to_le_bytes());
        buf[MARKER_HEADER_SIZE..MARKER_HEADER_SIZE + self.payload.len()]
            .copy_from_slice(&self.payload);

        // checksum last, over the complete aligned marker
        let crc = marker_checksum(&buf);
        buf[CRC_OFFSET..CRC_OFFSET + CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode a marker from the front of `data`, verifying size bounds,
    /// type and checksum.
    pub fn decode(data: &[u8]) -> StorageResult<Marker> {
        if data.len() < MARKER_HEADER_SIZE {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                format!("buffer of {} bytes cannot hold a marker header", data.len()),
            ));
        }

        let size = read_u32(data, SIZE_OFFSET) as usize;
        if size == 0 {
            return Err(StorageError::new(ErrorCode::EmptyEntry, "marker size is zero"));
        }
        if size < MARKER_HEADER_SIZE {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                format!("marker size {} below header size", size),
            ));
        }
        if size as u32 > MARKER_MAXIMAL_SIZE {
            return Err(StorageError::bad_parameter(format!(
                "marker size {} exceeds maximum",
                size
            )));
        }
        if size > data.len() {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                format!("marker size {} exceeds buffer of {} bytes", size, data.len()),
            ));
        }

        let raw_type = read_u32(data, TYPE_OFFSET);
        let marker_type = MarkerType::from_u32(raw_type).ok_or_else(|| {
            StorageError::bad_parameter(format!("unknown marker type {}", raw_type))
        })?;

        if !verify_marker(&data[..size]) {
            return Err(StorageError::new(
                ErrorCode::ChecksumFailed,
                format!("checksum mismatch in {} marker", marker_type.name()),
            ));
        }

        let tick = read_u64(data, TICK_OFFSET);
        let payload = data[MARKER_HEADER_SIZE..size].to_vec();

        Ok(Marker {
            marker_type,
            tick,
            payload,
        })
    }

    /// Cheap validity check without materializing the marker
    pub fn validate(data: &[u8]) -> bool {
        Marker::decode(data).is_ok()
    }
}

/// Strips trailing zero padding from a variable-length payload.
///
/// Safe for JSON payloads, which never end in a NUL byte.
pub fn strip_padding(payload: &[u8]) -> &[u8] {
    let mut end = payload.len();
    while end > 0 && payload[end - 1] == 0 {
        end -= 1;
    }
    &payload[..end]
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
        data[offset + 4],
        data[offset + 5],
        data[offset + 6],
        data[offset + 7],
    ])
}

/// Header marker payload: version, maximal size and datafile id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPayload {
    pub version: u32,
    pub maximal_size: u32,
    pub fid: u64,
}

impl HeaderPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.maximal_size.to_le_bytes());
        buf.extend_from_slice(&self.fid.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> StorageResult<Self> {
        if payload.len() < 16 {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                "header marker payload too short",
            ));
        }
        Ok(Self {
            version: read_u32(payload, 0),
            maximal_size: read_u32(payload, 4),
            fid: read_u64(payload, 8),
        })
    }
}

/// Footer marker payload: maximal size and real total size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterPayload {
    pub maximal_size: u32,
    pub total_size: u32,
}

impl FooterPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&self.maximal_size.to_le_bytes());
        buf.extend_from_slice(&self.total_size.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> StorageResult<Self> {
        if payload.len() < 8 {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                "footer marker payload too short",
            ));
        }
        Ok(Self {
            maximal_size: read_u32(payload, 0),
            total_size: read_u32(payload, 4),
        })
    }
}

/// Prologue marker payload: database and collection binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProloguePayload {
    pub database_id: u64,
    pub collection_id: u64,
}

impl ProloguePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.database_id.to_le_bytes());
        buf.extend_from_slice(&self.collection_id.to_le_bytes());
        buf
    }

    pub fn decode(payload: &[u8]) -> StorageResult<Self> {
        if payload.len() < 16 {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                "prologue marker payload too short",
            ));
        }
        Ok(Self {
            database_id: read_u64(payload, 0),
            collection_id: read_u64(payload, 8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_aligned_size() {
        assert_eq!(aligned_size(0), 0);
        assert_eq!(aligned_size(1), 8);
        assert_eq!(aligned_size(8), 8);
        assert_eq!(aligned_size(20), 24);
        assert_eq!(aligned_size(37), 40);
    }

    #[test]
    fn test_encode_produces_aligned_size() {
        for len in 0..32 {
            let marker = Marker::new(MarkerType::Document, 7, vec![0xAB; len]);
            let bytes = marker.encode();
            assert_eq!(bytes.len() % 8, 0);
            assert!(bytes.len() >= MARKER_HEADER_SIZE);
            assert_eq!(bytes.len(), marker.size() as usize);
        }
    }

    #[test]
    fn test_roundtrip_preserves_marker() {
        let marker = Marker::new(MarkerType::Document, 42, b"{\"name\":\"x\"}".to_vec());
        let bytes = marker.encode();
        let decoded = Marker::decode(&bytes).unwrap();
        assert_eq!(decoded, marker);
        assert_eq!(decoded.tick(), 42);
        assert_eq!(decoded.marker_type(), MarkerType::Document);
        assert_eq!(strip_padding(decoded.payload()), b"{\"name\":\"x\"}");
    }

    #[test]
    fn test_any_byte_flip_fails_checksum() {
        let marker = Marker::new(MarkerType::Remove, 9, b"payload".to_vec());
        let bytes = marker.encode();
        for i in 0..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x40;
            let result = Marker::decode(&corrupted);
            assert!(result.is_err(), "flip at byte {} decoded successfully", i);
        }
    }

    #[test]
    fn test_decode_rejects_small_size() {
        let marker = Marker::new(MarkerType::Document, 1, vec![1, 2, 3]);
        let mut bytes = marker.encode();
        bytes[0..4].copy_from_slice(&4u32.to_le_bytes());
        let err = Marker::decode(&bytes).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SizeTooSmall);
    }

    #[test]
    fn test_decode_rejects_zero_size() {
        let bytes = vec![0u8; 32];
        let err = Marker::decode(&bytes).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyEntry);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let marker = Marker::new(MarkerType::Document, 1, vec![]);
        let mut bytes = marker.encode();
        bytes[TYPE_OFFSET..TYPE_OFFSET + 4].copy_from_slice(&1234u32.to_le_bytes());
        let err = Marker::decode(&bytes).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadParameter);
    }

    #[test]
    fn test_encode_with_size_fills_tail() {
        let footer = FooterPayload {
            maximal_size: 4096,
            total_size: 4096,
        };
        let marker = Marker::new(MarkerType::Footer, 5, footer.encode());
        let bytes = marker.encode_with_size(128);
        assert_eq!(bytes.len(), 128);

        let decoded = Marker::decode(&bytes).unwrap();
        assert_eq!(decoded.marker_type(), MarkerType::Footer);
        let payload = FooterPayload::decode(decoded.payload()).unwrap();
        assert_eq!(payload, footer);
    }

    #[test]
    fn test_header_payload_roundtrip() {
        let header = HeaderPayload {
            version: DATAFILE_VERSION,
            maximal_size: 1 << 20,
            fid: 77,
        };
        let decoded = HeaderPayload::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_prologue_payload_roundtrip() {
        let prologue = ProloguePayload {
            database_id: 1,
            collection_id: 9000,
        };
        let decoded = ProloguePayload::decode(&prologue.encode()).unwrap();
        assert_eq!(decoded, prologue);
    }
}
