//! Marker codec: the binary layout of log entries
//!
//! Every mutation persisted by the engine is a self-describing,
//! checksummed marker. This module owns the wire layout, checksum rules,
//! 8-byte alignment and the recovery-scan classification of damaged
//! regions. Nothing outside this module performs offset arithmetic on
//! raw marker bytes.

mod checksum;
mod codec;
mod scan;
mod types;

pub use checksum::{marker_checksum, verify_marker};
pub use codec::{
    aligned_size, strip_padding, FooterPayload, HeaderPayload, Marker, ProloguePayload,
    DATAFILE_VERSION, MARKER_HEADER_SIZE, MARKER_MAXIMAL_SIZE,
};
pub use scan::{scan_region, ScanEntry, ScanEntryStatus, ScanResult};
pub use types::MarkerType;
