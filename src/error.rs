//! Unified error taxonomy for the storage engine
//!
//! Every API boundary returns `StorageResult<T>`: a taxonomy code plus a
//! human-readable message. Validation errors are detected before any
//! mutation; log-append and lock failures are transaction-fatal;
//! index-maintenance failures after a successful append are reported but
//! leave the log entry standing.

use std::fmt;
use thiserror::Error;

/// Result type used across the storage engine
pub type StorageResult<T> = Result<T, StorageError>;

/// Taxonomy codes for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed, duplicate or wrong-arity input
    BadParameter,
    /// Allocation failure during validation
    OutOfMemory,
    /// Unexpected internal state
    Internal,
    /// Attempt to create a system-managed resource directly
    Forbidden,
    /// Operation variant is intentionally unsupported
    NotImplemented,
    /// Named collection does not exist
    CollectionNotFound,
    /// Payload is not a document object (or key string where allowed)
    DocumentTypeInvalid,
    /// Document key is missing, malformed or reserved
    DocumentKeyBad,
    /// No document under the given key
    DocumentNotFound,
    /// Expected revision differs from the current revision,
    /// or a unique constraint was violated
    Conflict,
    /// Datafile cannot hold the requested marker
    DatafileFull,
    /// Datafile is sealed and permanently read-only
    DatafileSealed,
    /// Marker checksum mismatch detected during a scan
    ChecksumFailed,
    /// Marker declares a size below the minimum header size
    SizeTooSmall,
    /// Scan hit a zero-filled region
    EmptyEntry,
    /// Invalid transaction state transition requested
    TransactionInternal,
    /// Underlying I/O failure
    IoError,
}

impl ErrorCode {
    /// Returns the stable string form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadParameter => "BAD_PARAMETER",
            ErrorCode::OutOfMemory => "OUT_OF_MEMORY",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::CollectionNotFound => "COLLECTION_NOT_FOUND",
            ErrorCode::DocumentTypeInvalid => "DOCUMENT_TYPE_INVALID",
            ErrorCode::DocumentKeyBad => "DOCUMENT_KEY_BAD",
            ErrorCode::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::DatafileFull => "DATAFILE_FULL",
            ErrorCode::DatafileSealed => "DATAFILE_SEALED",
            ErrorCode::ChecksumFailed => "CHECKSUM_FAILED",
            ErrorCode::SizeTooSmall => "SIZE_TOO_SMALL",
            ErrorCode::EmptyEntry => "EMPTY_ENTRY",
            ErrorCode::TransactionInternal => "TRANSACTION_INTERNAL",
            ErrorCode::IoError => "IO_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error carrying a taxonomy code and message
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct StorageError {
    code: ErrorCode,
    message: String,
}

impl StorageError {
    /// Create an error with an explicit code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the taxonomy code
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadParameter, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    pub fn collection_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::CollectionNotFound,
            format!("collection not found: {}", name),
        )
    }

    pub fn document_type_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DocumentTypeInvalid, message)
    }

    pub fn document_key_bad(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DocumentKeyBad, message)
    }

    pub fn document_not_found(key: &str) -> Self {
        Self::new(
            ErrorCode::DocumentNotFound,
            format!("document not found: {}", key),
        )
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn datafile_full(requested: u32, remaining: u32) -> Self {
        Self::new(
            ErrorCode::DatafileFull,
            format!(
                "datafile full: requested {} bytes, {} remaining",
                requested, remaining
            ),
        )
    }

    pub fn datafile_sealed() -> Self {
        Self::new(ErrorCode::DatafileSealed, "datafile is sealed")
    }

    pub fn transaction_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransactionInternal, message)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::IoError, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_carries_code_and_message() {
        let err = StorageError::bad_parameter("duplicate attribute name");
        assert_eq!(err.code(), ErrorCode::BadParameter);
        assert_eq!(err.message(), "duplicate attribute name");
        assert_eq!(err.to_string(), "BAD_PARAMETER: duplicate attribute name");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: StorageError = io.into();
        assert_eq!(err.code(), ErrorCode::IoError);
    }

    #[test]
    fn test_datafile_full_message() {
        let err = StorageError::datafile_full(4096, 128);
        assert_eq!(err.code(), ErrorCode::DatafileFull);
        assert!(err.message().contains("4096"));
    }
}
