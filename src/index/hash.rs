//! Hash index
//!
//! Equality-only secondary index over one or more attribute paths.
//! Composite keys map to posting lists of document keys. Unique
//! indexes reject a second document under the same key; with
//! `deduplicate` off, a document may appear multiple times in one
//! posting list (re-inserts of the same projection).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::index::definition::IndexDefinition;
use crate::index::secondary::{
    project_fields, CollectionIndex, DocumentLocation, IndexKey, OperationMode,
};

pub struct HashIndex {
    id: u64,
    fields: Vec<String>,
    unique: bool,
    sparse: bool,
    deduplicate: bool,
    entries: HashMap<Vec<IndexKey>, Vec<String>>,
    /// reverse map for removal without re-projection surprises
    by_document: HashMap<String, Vec<IndexKey>>,
}

impl HashIndex {
    pub fn new(id: u64, definition: &IndexDefinition) -> Self {
        HashIndex {
            id,
            fields: definition.fields.clone(),
            unique: definition.unique,
            sparse: definition.sparse,
            deduplicate: definition.deduplicate,
            entries: HashMap::new(),
            by_document: HashMap::new(),
        }
    }

    /// Document keys whose projection equals the given key
    pub fn lookup(&self, key: &[IndexKey]) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl CollectionIndex for HashIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "hash"
    }

    fn insert(
        &mut self,
        doc_key: &str,
        _location: DocumentLocation,
        document: &Value,
        mode: OperationMode,
    ) -> StorageResult<()> {
        let keys = match project_fields(document, &self.fields, self.sparse) {
            Some(keys) => keys,
            None => return Ok(()),
        };

        let postings = self.entries.entry(keys.clone()).or_default();
        if self.unique && postings.iter().any(|k| k != doc_key) {
            if mode == OperationMode::Rollback {
                return Ok(());
            }
            return Err(StorageError::conflict("unique constraint violated"));
        }
        if self.deduplicate && postings.iter().any(|k| k == doc_key) {
            return Ok(());
        }
        postings.push(doc_key.to_string());
        self.by_document.insert(doc_key.to_string(), keys);
        Ok(())
    }

    fn remove(
        &mut self,
        doc_key: &str,
        _document: &Value,
        _mode: OperationMode,
    ) -> StorageResult<()> {
        if let Some(keys) = self.by_document.remove(doc_key) {
            if let Some(postings) = self.entries.get_mut(&keys) {
                postings.retain(|k| k != doc_key);
                if postings.is_empty() {
                    self.entries.remove(&keys);
                }
            }
        }
        Ok(())
    }

    fn matches_definition(&self, definition: &IndexDefinition) -> bool {
        definition.type_name == "hash"
            && definition.fields == self.fields
            && definition.unique == self.unique
            && definition.sparse == self.sparse
    }

    fn to_definition(&self) -> IndexDefinition {
        let mut def = IndexDefinition::new("hash", self.fields.clone());
        def.unique = self.unique;
        def.sparse = self.sparse;
        def.deduplicate = self.deduplicate;
        def
    }

    fn size(&self) -> usize {
        self.by_document.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn location() -> DocumentLocation {
        DocumentLocation {
            fid: 1,
            position: 0,
            revision: 1,
        }
    }

    fn index(unique: bool, sparse: bool) -> HashIndex {
        let mut def = IndexDefinition::new("hash", vec!["name".to_string()]);
        def.unique = unique;
        def.sparse = sparse;
        HashIndex::new(7, &def)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut idx = index(false, false);
        idx.insert("k1", location(), &json!({"name": "ann"}), OperationMode::Normal)
            .unwrap();
        idx.insert("k2", location(), &json!({"name": "ann"}), OperationMode::Normal)
            .unwrap();

        let key = project_fields(&json!({"name": "ann"}), &idx.fields, false).unwrap();
        assert_eq!(idx.lookup(&key), ["k1", "k2"]);
        assert_eq!(idx.size(), 2);
    }

    #[test]
    fn test_unique_violation() {
        let mut idx = index(true, false);
        idx.insert("k1", location(), &json!({"name": "ann"}), OperationMode::Normal)
            .unwrap();
        let err = idx
            .insert("k2", location(), &json!({"name": "ann"}), OperationMode::Normal)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);

        // rollback replay tolerates the violation
        idx.insert("k2", location(), &json!({"name": "ann"}), OperationMode::Rollback)
            .unwrap();
    }

    #[test]
    fn test_sparse_skips_missing_fields() {
        let mut idx = index(false, true);
        idx.insert("k1", location(), &json!({"other": 1}), OperationMode::Normal)
            .unwrap();
        assert_eq!(idx.size(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut idx = index(false, false);
        let doc = json!({"name": "bob"});
        idx.insert("k1", location(), &doc, OperationMode::Normal).unwrap();
        idx.remove("k1", &doc, OperationMode::Normal).unwrap();
        idx.remove("k1", &doc, OperationMode::Normal).unwrap();
        assert_eq!(idx.size(), 0);
    }
}
