//! CRC32 checksums for markers
//!
//! The checksum covers the complete aligned marker with the checksum
//! field itself treated as zero during computation. Any mismatch is
//! corruption.

use crc32fast::Hasher;

use super::codec::{CRC_OFFSET, CRC_SIZE};

/// Computes the checksum of a complete marker buffer, treating the
/// checksum field as zero.
pub fn marker_checksum(marker: &[u8]) -> u32 {
    debug_assert!(marker.len() >= CRC_OFFSET + CRC_SIZE);
    let mut hasher = Hasher::new();
    hasher.update(&marker[..CRC_OFFSET]);
    hasher.update(&[0u8; CRC_SIZE]);
    hasher.update(&marker[CRC_OFFSET + CRC_SIZE..]);
    hasher.finalize()
}

/// Verifies the stored checksum of a complete marker buffer.
pub fn verify_marker(marker: &[u8]) -> bool {
    if marker.len() < CRC_OFFSET + CRC_SIZE {
        return false;
    }
    let stored = u32::from_le_bytes([
        marker[CRC_OFFSET],
        marker[CRC_OFFSET + 1],
        marker[CRC_OFFSET + 2],
        marker[CRC_OFFSET + 3],
    ]);
    marker_checksum(marker) == stored
}
