//! Recovery scan over a raw marker region
//!
//! Scanning never fails: every byte range of a damaged file is
//! classified into a scan-entry status so a recovery tool can report
//! exactly where and how a datafile went bad.

use super::codec::{aligned_size, read_u32, read_u64, MARKER_HEADER_SIZE, SIZE_OFFSET, TICK_OFFSET, TYPE_OFFSET};
use super::checksum::verify_marker;
use super::types::MarkerType;

/// Classification of one scanned byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEntryStatus {
    /// Marker decoded and verified
    EntryOk,
    /// Zero-filled region with no marker
    EmptyEntry,
    /// Marker size field is zero
    EmptySize,
    /// Marker size below the minimum header size
    SizeTooSmall,
    /// Checksum mismatch or unknown marker type
    ChecksumFailed,
}

/// One classified region of a scanned datafile
#[derive(Debug, Clone)]
pub struct ScanEntry {
    /// Byte offset of the region
    pub position: u32,
    /// Declared marker size (0 for empty regions)
    pub size: u32,
    /// Aligned size actually consumed by the scan
    pub real_size: u32,
    /// Marker tick, when readable
    pub tick: u64,
    /// Marker type, when known
    pub marker_type: Option<MarkerType>,
    pub status: ScanEntryStatus,
    /// Human-readable diagnosis for damaged entries
    pub diagnosis: Option<String>,
}

/// Aggregate result of scanning a marker region
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub entries: Vec<ScanEntry>,
    /// Number of markers classified as ok
    pub number_markers: u32,
    /// Offset one past the last decodable marker
    pub end_position: u32,
    /// True when the scan reached a verified footer marker
    pub is_sealed: bool,
}

/// Classify every byte range of `data`.
///
/// The scan walks from offset 0, consuming the aligned size of each
/// verified marker. On the first damaged entry the remainder of the
/// region is still reported (as a single trailing entry) but not
/// interpreted further, since marker boundaries can no longer be
/// trusted.
pub fn scan_region(data: &[u8]) -> ScanResult {
    let mut entries = Vec::new();
    let mut position = 0usize;
    let mut number_markers = 0u32;
    let mut is_sealed = false;

    while position + MARKER_HEADER_SIZE <= data.len() {
        let remaining = &data[position..];
        let size = read_u32(remaining, SIZE_OFFSET) as usize;

        if size == 0 {
            // distinguish an all-zero tail (normal preallocated space)
            // from a zero size followed by garbage
            let status = if remaining.iter().all(|&b| b == 0) {
                ScanEntryStatus::EmptyEntry
            } else {
                ScanEntryStatus::EmptySize
            };
            entries.push(ScanEntry {
                position: position as u32,
                size: 0,
                real_size: remaining.len() as u32,
                tick: 0,
                marker_type: None,
                status,
                diagnosis: match status {
                    ScanEntryStatus::EmptyEntry => None,
                    _ => Some("marker size is zero but region is not empty".to_string()),
                },
            });
            break;
        }

        if size < MARKER_HEADER_SIZE || position + size > data.len() {
            entries.push(ScanEntry {
                position: position as u32,
                size: size as u32,
                real_size: (data.len() - position) as u32,
                tick: 0,
                marker_type: None,
                status: ScanEntryStatus::SizeTooSmall,
                diagnosis: Some(format!(
                    "marker size {} is invalid at offset {}",
                    size, position
                )),
            });
            break;
        }

        let raw_type = read_u32(remaining, TYPE_OFFSET);
        let marker_type = MarkerType::from_u32(raw_type);
        let tick = read_u64(remaining, TICK_OFFSET);
        let real_size = aligned_size(size) as u32;

        if marker_type.is_none() || !verify_marker(&remaining[..size]) {
            entries.push(ScanEntry {
                position: position as u32,
                size: size as u32,
                real_size,
                tick,
                marker_type,
                status: ScanEntryStatus::ChecksumFailed,
                diagnosis: Some(match marker_type {
                    None => format!("unknown marker type {} at offset {}", raw_type, position),
                    Some(t) => format!(
                        "checksum mismatch in {} marker at offset {}",
                        t.name(),
                        position
                    ),
                }),
            });
            break;
        }

        let marker_type = marker_type.expect("checked above");
        entries.push(ScanEntry {
            position: position as u32,
            size: size as u32,
            real_size,
            tick,
            marker_type: Some(marker_type),
            status: ScanEntryStatus::EntryOk,
            diagnosis: None,
        });
        number_markers += 1;

        if marker_type == MarkerType::Footer {
            is_sealed = true;
            position += real_size as usize;
            break;
        }
        position += real_size as usize;
    }

    ScanResult {
        entries,
        number_markers,
        end_position: position as u32,
        is_sealed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::codec::{FooterPayload, HeaderPayload, Marker, DATAFILE_VERSION};

    fn header_marker(tick: u64) -> Vec<u8> {
        Marker::new(
            MarkerType::Header,
            tick,
            HeaderPayload {
                version: DATAFILE_VERSION,
                maximal_size: 4096,
                fid: 1,
            }
            .encode(),
        )
        .encode()
    }

    #[test]
    fn test_scan_classifies_valid_sequence() {
        let mut region = header_marker(1);
        region.extend(Marker::new(MarkerType::Document, 2, b"{\"a\":1}".to_vec()).encode());
        region.extend(vec![0u8; 64]); // preallocated tail

        let result = scan_region(&region);
        assert_eq!(result.number_markers, 2);
        assert_eq!(result.entries.len(), 3);
        assert_eq!(result.entries[0].status, ScanEntryStatus::EntryOk);
        assert_eq!(result.entries[1].status, ScanEntryStatus::EntryOk);
        assert_eq!(result.entries[2].status, ScanEntryStatus::EmptyEntry);
        assert!(!result.is_sealed);
    }

    #[test]
    fn test_scan_detects_seal() {
        let mut region = header_marker(1);
        let footer = Marker::new(
            MarkerType::Footer,
            2,
            FooterPayload {
                maximal_size: 4096,
                total_size: 128,
            }
            .encode(),
        );
        region.extend(footer.encode());

        let result = scan_region(&region);
        assert!(result.is_sealed);
        assert_eq!(result.number_markers, 2);
    }

    #[test]
    fn test_scan_classifies_corrupted_marker() {
        let mut region = header_marker(1);
        let doc_offset = region.len();
        region.extend(Marker::new(MarkerType::Document, 2, b"{\"a\":1}".to_vec()).encode());
        region[doc_offset + 24] ^= 0xFF; // corrupt payload byte

        let result = scan_region(&region);
        assert_eq!(result.number_markers, 1);
        let damaged = result.entries.last().unwrap();
        assert_eq!(damaged.status, ScanEntryStatus::ChecksumFailed);
        assert!(damaged.diagnosis.as_ref().unwrap().contains("checksum"));
    }

    #[test]
    fn test_scan_classifies_zero_size_with_garbage() {
        let mut region = header_marker(1);
        let tail = region.len();
        region.extend(vec![0u8; 32]);
        region[tail + 12] = 0xEE; // garbage after a zero size field

        let result = scan_region(&region);
        let damaged = result.entries.last().unwrap();
        assert_eq!(damaged.status, ScanEntryStatus::EmptySize);
    }

    #[test]
    fn test_scan_classifies_undersized_marker() {
        let mut region = header_marker(1);
        let tail = region.len();
        region.extend(vec![0u8; 32]);
        region[tail] = 4; // size below header size

        let result = scan_region(&region);
        let damaged = result.entries.last().unwrap();
        assert_eq!(damaged.status, ScanEntryStatus::SizeTooSmall);
    }

    #[test]
    fn test_scan_never_panics_on_garbage() {
        let garbage: Vec<u8> = (0..255u8).cycle().take(1024).collect();
        let result = scan_region(&garbage);
        assert!(!result.entries.is_empty());
    }
}
