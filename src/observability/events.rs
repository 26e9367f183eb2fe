//! Observable storage events
//!
//! Events are explicit and typed; every log line names exactly one.

use std::fmt;

/// Observable events in the storage engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Datafile lifecycle
    /// Datafile created (header marker written)
    DatafileCreate,
    /// Datafile sealed (footer marker written, now read-only)
    DatafileSeal,
    /// Datafile closed
    DatafileClose,
    /// Recovery scan found a damaged region
    ScanDamage,

    // Collection lifecycle
    /// Collection created
    CollectionCreate,
    /// Collection dropped
    CollectionDrop,
    /// Journal rotated to a fresh datafile
    JournalRotate,

    // Index lifecycle
    /// Secondary index created
    IndexCreate,
    /// Secondary index dropped
    IndexDrop,

    // Transactions
    /// Transaction committed
    TransactionCommit,
    /// Transaction aborted
    TransactionAbort,
}

impl Event {
    /// Stable snake_case event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Event::DatafileCreate => "datafile_create",
            Event::DatafileSeal => "datafile_seal",
            Event::DatafileClose => "datafile_close",
            Event::ScanDamage => "scan_damage",
            Event::CollectionCreate => "collection_create",
            Event::CollectionDrop => "collection_drop",
            Event::JournalRotate => "journal_rotate",
            Event::IndexCreate => "index_create",
            Event::IndexDrop => "index_drop",
            Event::TransactionCommit => "transaction_commit",
            Event::TransactionAbort => "transaction_abort",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
