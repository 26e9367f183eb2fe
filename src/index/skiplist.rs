//! Skiplist index
//!
//! Ordered secondary index over one or more attribute paths, backed by
//! a btree keyed on composite projections. Registered for both the
//! "skiplist" and "persistent" type names; the two differ only in how
//! they are advertised.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeBounds;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::index::definition::IndexDefinition;
use crate::index::secondary::{
    project_fields, CollectionIndex, DocumentLocation, IndexKey, OperationMode,
};

pub struct SkiplistIndex {
    id: u64,
    type_name: &'static str,
    fields: Vec<String>,
    unique: bool,
    sparse: bool,
    deduplicate: bool,
    entries: BTreeMap<Vec<IndexKey>, Vec<String>>,
    by_document: HashMap<String, Vec<IndexKey>>,
}

impl SkiplistIndex {
    pub fn new(id: u64, definition: &IndexDefinition) -> Self {
        let type_name = if definition.type_name == "persistent" {
            "persistent"
        } else {
            "skiplist"
        };
        SkiplistIndex {
            id,
            type_name,
            fields: definition.fields.clone(),
            unique: definition.unique,
            sparse: definition.sparse,
            deduplicate: definition.deduplicate,
            entries: BTreeMap::new(),
            by_document: HashMap::new(),
        }
    }

    /// Document keys whose projection falls inside the range, in key order
    pub fn lookup_range<R>(&self, range: R) -> Vec<&str>
    where
        R: RangeBounds<Vec<IndexKey>>,
    {
        self.entries
            .range(range)
            .flat_map(|(_, postings)| postings.iter().map(String::as_str))
            .collect()
    }
}

impl CollectionIndex for SkiplistIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        self.type_name
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
        definition.type_name == self.type_name
            && definition.fields == self.fields
            && definition.unique == self.unique
            && definition.sparse == self.sparse
    }

    fn to_definition(&self) -> IndexDefinition {
        let mut def = IndexDefinition::new(self.type_name, self.fields.clone());
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
    use serde_json::json;

    fn location() -> DocumentLocation {
        DocumentLocation {
            fid: 1,
            position: 0,
            revision: 1,
        }
    }

    #[test]
    fn test_range_lookup_is_ordered() {
        let def = IndexDefinition::new("skiplist", vec!["age".to_string()]);
        let mut idx = SkiplistIndex::new(3, &def);
        for (key, age) in [("a", 40), ("b", 10), ("c", 25)] {
            idx.insert(key, location(), &json!({ "age": age }), OperationMode::Normal)
                .unwrap();
        }
        let all = idx.lookup_range(..);
        assert_eq!(all, ["b", "c", "a"]);
    }

    #[test]
    fn test_persistent_alias_keeps_type_name() {
        let def = IndexDefinition::new("persistent", vec!["x".to_string()]);
        let idx = SkiplistIndex::new(4, &def);
        assert_eq!(idx.type_name(), "persistent");
        assert_eq!(idx.to_definition().type_name, "persistent");
    }

    #[test]
    fn test_remove_then_reinsert() {
        let def = IndexDefinition::new("skiplist", vec!["v".to_string()]);
        let mut idx = SkiplistIndex::new(5, &def);
        let doc = json!({"v": 1});
        idx.insert("k", location(), &doc, OperationMode::Normal).unwrap();
        idx.remove("k", &doc, OperationMode::Normal).unwrap();
        assert_eq!(idx.size(), 0);
        idx.insert("k", location(), &doc, OperationMode::Normal).unwrap();
        assert_eq!(idx.size(), 1);
    }
}
