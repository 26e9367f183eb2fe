//! vellumdb - append-only, marker-based document storage engine
//!
//! The engine persists every mutation as a checksummed marker in
//! append-only datafiles, keeps a primary index per collection and a
//! pluggable set of secondary indexes, and exposes document CRUD
//! through transactions with optimistic revision conflict detection.

pub mod collection;
pub mod config;
pub mod database;
pub mod datafile;
pub mod error;
pub mod index;
pub mod keygen;
pub mod marker;
pub mod observability;
pub mod tick;
pub mod transaction;

pub use collection::{Collection, CollectionKind};
pub use config::EngineConfig;
pub use database::Database;
pub use datafile::{Datafile, DatafileState};
pub use error::{ErrorCode, StorageError, StorageResult};
pub use index::{IndexDefinition, IndexRegistry, ServerRole};
pub use marker::{Marker, MarkerType};
pub use tick::TickSource;
pub use transaction::{
    OperationOptions, OperationResult, Transaction, TransactionHints, TransactionStatus,
};
