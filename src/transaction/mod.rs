//! Transactions
//!
//! A transaction is the unit of CRUD access to collections. The status
//! machine is strict: NotStarted -> Running -> Committed or Aborted,
//! and nothing else. Nested transactions (nesting level > 0) are not
//! "real": they only track status and defer all effects to the
//! top-level transaction they are embedded in.
//!
//! Individual operations take the owning collection's lock for their
//! own duration, so a transaction interleaves with others at operation
//! granularity and relies on revision preconditions for conflict
//! detection.

mod cursor;
mod operations;

pub use operations::{OperationOptions, OperationResult};

use crate::database::Database;
use crate::error::{StorageError, StorageResult};
use crate::observability::{Event, Logger, Severity};

/// Lifecycle states of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    NotStarted,
    Running,
    Committed,
    Aborted,
}

/// Optional behavior hints supplied at creation
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionHints {
    /// The transaction performs exactly one operation
    pub single_operation: bool,
    /// The transaction performs no writes
    pub read_only: bool,
}

pub struct Transaction<'db> {
    db: &'db Database,
    status: TransactionStatus,
    nesting_level: u32,
    is_real: bool,
    hints: TransactionHints,
}

impl<'db> Transaction<'db> {
    /// A top-level transaction. Call [`begin`](Self::begin) before use.
    pub fn new(db: &'db Database) -> Self {
        Transaction {
            db,
            status: TransactionStatus::NotStarted,
            nesting_level: 0,
            is_real: true,
            hints: TransactionHints::default(),
        }
    }

    /// A transaction embedded in an already-running one. Not real: it
    /// tracks status only and performs no commit or abort work itself.
    pub fn nested(db: &'db Database, nesting_level: u32) -> Self {
        Transaction {
            db,
            status: TransactionStatus::NotStarted,
            nesting_level,
            is_real: nesting_level == 0,
            hints: TransactionHints::default(),
        }
    }

    pub fn with_hints(mut self, hints: TransactionHints) -> Self {
        self.hints = hints;
        self
    }

    pub(crate) fn database(&self) -> &'db Database {
        self.db
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn nesting_level(&self) -> u32 {
        self.nesting_level
    }

    pub fn is_real(&self) -> bool {
        self.is_real
    }

    pub fn hints(&self) -> TransactionHints {
        self.hints
    }

    pub(crate) fn require_running(&self) -> StorageResult<()> {
        if self.status != TransactionStatus::Running {
            return Err(StorageError::transaction_internal(
                "transaction is not running",
            ));
        }
        Ok(())
    }

    pub(crate) fn require_writable(&self) -> StorageResult<()> {
        self.require_running()?;
        if self.hints.read_only {
            return Err(StorageError::transaction_internal(
                "transaction is read-only",
            ));
        }
        Ok(())
    }

    /// NotStarted -> Running
    pub fn begin(&mut self) -> StorageResult<()> {
        if self.status != TransactionStatus::NotStarted {
            return Err(StorageError::transaction_internal(
                "cannot begin an already started transaction",
            ));
        }
        self.status = TransactionStatus::Running;
        Ok(())
    }

    /// Running -> Committed
    pub fn commit(&mut self) -> StorageResult<()> {
        if self.status != TransactionStatus::Running {
            return Err(StorageError::transaction_internal(
                "cannot commit a transaction that is not running",
            ));
        }
        self.status = TransactionStatus::Committed;
        if self.is_real {
            Logger::log(Severity::Trace, Event::TransactionCommit.name(), &[]);
        }
        Ok(())
    }

    /// Running -> Aborted
    pub fn abort(&mut self) -> StorageResult<()> {
        if self.status != TransactionStatus::Running {
            return Err(StorageError::transaction_internal(
                "cannot abort a transaction that is not running",
            ));
        }
        self.status = TransactionStatus::Aborted;
        if self.is_real {
            Logger::log(Severity::Trace, Event::TransactionAbort.name(), &[]);
        }
        Ok(())
    }

    /// Commit on success, abort on error, passing the result through.
    /// The original error wins over any abort failure.
    pub fn finish<T>(&mut self, result: StorageResult<T>) -> StorageResult<T> {
        match result {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.abort();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorCode;
    use crate::index::ServerRole;

    fn database() -> Database {
        Database::new("test", EngineConfig::default(), ServerRole::SingleServer)
    }

    #[test]
    fn test_status_machine() {
        let db = database();
        let mut trx = Transaction::new(&db);
        assert_eq!(trx.status(), TransactionStatus::NotStarted);

        trx.begin().unwrap();
        assert_eq!(trx.status(), TransactionStatus::Running);
        assert_eq!(
            trx.begin().unwrap_err().code(),
            ErrorCode::TransactionInternal
        );

        trx.commit().unwrap();
        assert_eq!(trx.status(), TransactionStatus::Committed);
        assert!(trx.commit().is_err());
        assert!(trx.abort().is_err());
    }

    #[test]
    fn test_abort_from_running_only() {
        let db = database();
        let mut trx = Transaction::new(&db);
        assert!(trx.abort().is_err());
        trx.begin().unwrap();
        trx.abort().unwrap();
        assert_eq!(trx.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn test_finish_commits_on_ok_and_aborts_on_error() {
        let db = database();
        let mut trx = db.begin_transaction().unwrap();
        assert_eq!(trx.finish(Ok(5)).unwrap(), 5);
        assert_eq!(trx.status(), TransactionStatus::Committed);

        let mut trx = db.begin_transaction().unwrap();
        let err = trx
            .finish::<()>(Err(StorageError::bad_parameter("boom")))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadParameter);
        assert_eq!(trx.status(), TransactionStatus::Aborted);
    }

    #[test]
    fn test_nested_transactions_are_not_real() {
        let db = database();
        let mut inner = Transaction::nested(&db, 2);
        assert!(!inner.is_real());
        assert_eq!(inner.nesting_level(), 2);
        inner.begin().unwrap();
        inner.commit().unwrap();
        assert_eq!(inner.status(), TransactionStatus::Committed);
    }
}
