//! Marker type enumeration
//!
//! Every log entry is a self-describing marker. Type values are grouped
//! by range: 1000s for datafile structure, 5000s for data and lifecycle
//! markers. The numeric values are part of the on-disk format and must
//! never change.

/// Marker types as stored in the on-disk `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MarkerType {
    /// First marker of every datafile
    Header = 1000,
    /// Final marker of a sealed datafile
    Footer = 1001,
    /// Binds the following data markers to a database/collection pair
    Prologue = 1002,

    /// Document write (insert or update)
    Document = 5000,
    /// Document removal (tombstone)
    Remove = 5001,

    /// Collection lifecycle
    CreateCollection = 5010,
    DropCollection = 5011,
    RenameCollection = 5012,
    ChangeCollection = 5013,

    /// Index lifecycle
    CreateIndex = 5020,
    DropIndex = 5021,

    /// Database lifecycle
    CreateDatabase = 5030,
    DropDatabase = 5031,

    /// Transaction boundaries, written in replicated contexts
    BeginTransaction = 5040,
    CommitTransaction = 5041,
    AbortTransaction = 5042,
}

impl MarkerType {
    /// Convert a raw type field, returning `None` for unknown values
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1000 => Some(MarkerType::Header),
            1001 => Some(MarkerType::Footer),
            1002 => Some(MarkerType::Prologue),
            5000 => Some(MarkerType::Document),
            5001 => Some(MarkerType::Remove),
            5010 => Some(MarkerType::CreateCollection),
            5011 => Some(MarkerType::DropCollection),
            5012 => Some(MarkerType::RenameCollection),
            5013 => Some(MarkerType::ChangeCollection),
            5020 => Some(MarkerType::CreateIndex),
            5021 => Some(MarkerType::DropIndex),
            5030 => Some(MarkerType::CreateDatabase),
            5031 => Some(MarkerType::DropDatabase),
            5040 => Some(MarkerType::BeginTransaction),
            5041 => Some(MarkerType::CommitTransaction),
            5042 => Some(MarkerType::AbortTransaction),
            _ => None,
        }
    }

    /// Convert to the raw on-disk value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Returns true for markers that carry document data and therefore
    /// contribute to a datafile's data tick range
    pub fn is_data_marker(self) -> bool {
        matches!(self, MarkerType::Document | MarkerType::Remove)
    }

    /// Stable name used in scan diagnostics and logs
    pub fn name(self) -> &'static str {
        match self {
            MarkerType::Header => "header",
            MarkerType::Footer => "footer",
            MarkerType::Prologue => "prologue",
            MarkerType::Document => "document",
            MarkerType::Remove => "remove",
            MarkerType::CreateCollection => "create-collection",
            MarkerType::DropCollection => "drop-collection",
            MarkerType::RenameCollection => "rename-collection",
            MarkerType::ChangeCollection => "change-collection",
            MarkerType::CreateIndex => "create-index",
            MarkerType::DropIndex => "drop-index",
            MarkerType::CreateDatabase => "create-database",
            MarkerType::DropDatabase => "drop-database",
            MarkerType::BeginTransaction => "begin-transaction",
            MarkerType::CommitTransaction => "commit-transaction",
            MarkerType::AbortTransaction => "abort-transaction",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_roundtrip() {
        for marker_type in [
            MarkerType::Header,
            MarkerType::Footer,
            MarkerType::Prologue,
            MarkerType::Document,
            MarkerType::Remove,
            MarkerType::CreateCollection,
            MarkerType::DropIndex,
            MarkerType::CommitTransaction,
        ] {
            assert_eq!(MarkerType::from_u32(marker_type.as_u32()), Some(marker_type));
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(MarkerType::from_u32(0).is_none());
        assert!(MarkerType::from_u32(999).is_none());
        assert!(MarkerType::from_u32(1100).is_none());
        assert!(MarkerType::from_u32(4999).is_none());
        assert!(MarkerType::from_u32(u32::MAX).is_none());
    }

    #[test]
    fn test_data_marker_classification() {
        assert!(MarkerType::Document.is_data_marker());
        assert!(MarkerType::Remove.is_data_marker());
        assert!(!MarkerType::Header.is_data_marker());
        assert!(!MarkerType::CreateIndex.is_data_marker());
    }
}
