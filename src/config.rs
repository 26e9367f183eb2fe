//! Engine configuration
//!
//! Loaded from JSON (or built in code); every field has a default so a
//! bare `{}` configures a working in-memory engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::index::FULLTEXT_MIN_WORD_LENGTH_DEFAULT;

/// Default journal datafile size: 4 MiB
pub const DEFAULT_JOURNAL_SIZE: u32 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Size of each journal datafile in bytes
    pub journal_size: u32,
    /// Whether writes sync to durable storage before returning
    pub wait_for_sync: bool,
    /// Directory for datafiles. `None` keeps datafiles anonymous
    /// (in-memory), which is what tests use.
    pub data_path: Option<PathBuf>,
    /// Minimum word length for fulltext indexes
    pub fulltext_min_word_length: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            journal_size: DEFAULT_JOURNAL_SIZE,
            wait_for_sync: false,
            data_path: None,
            fulltext_min_word_length: FULLTEXT_MIN_WORD_LENGTH_DEFAULT,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.journal_size, DEFAULT_JOURNAL_SIZE);
        assert!(!config.wait_for_sync);
        assert!(config.data_path.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config =
            EngineConfig::from_json(r#"{"journal_size": 65536, "wait_for_sync": true}"#).unwrap();
        assert_eq!(config.journal_size, 65536);
        assert!(config.wait_for_sync);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(EngineConfig::from_json(r#"{"journal_sizes": 1}"#).is_err());
    }
}
