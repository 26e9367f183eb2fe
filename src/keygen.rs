//! Document key generation and validation
//!
//! Keys are 1 to 254 bytes from a fixed safe character set. Restore
//! mode (replaying data that already passed validation once) admits
//! system-reserved keys that regular validation rejects.

use crate::error::{StorageError, StorageResult};

/// Maximum document key length in bytes
pub const MAX_KEY_LENGTH: usize = 254;

const EXTRA_KEY_CHARS: &str = "_-:.@()+,=;$!*'%";

pub trait KeyGenerator: Send + Sync {
    /// Produce a fresh key for a document written at `tick`
    fn generate(&self, tick: u64) -> String;

    /// Validate a user-supplied key
    fn validate(&self, key: &str, is_restore: bool) -> StorageResult<()>;
}

/// Generates monotonically increasing numeric keys from ticks
pub struct TraditionalKeyGenerator;

impl TraditionalKeyGenerator {
    pub fn new() -> Self {
        TraditionalKeyGenerator
    }
}

impl Default for TraditionalKeyGenerator {
    fn default() -> Self {
        TraditionalKeyGenerator::new()
    }
}

impl KeyGenerator for TraditionalKeyGenerator {
    fn generate(&self, tick: u64) -> String {
        tick.to_string()
    }

    fn validate(&self, key: &str, is_restore: bool) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(StorageError::document_key_bad("invalid key length"));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || EXTRA_KEY_CHARS.contains(c))
        {
            return Err(StorageError::document_key_bad(
                "key contains invalid characters",
            ));
        }
        // leading underscore is reserved for system documents
        if !is_restore && key.starts_with('_') {
            return Err(StorageError::document_key_bad("key uses a reserved prefix"));
        }
        Ok(())
    }
}
