//! Edge index
//!
//! System index over the `_from` and `_to` attributes of edge
//! documents, supporting lookups in both directions. Built internally
//! for edge collections, never creatable through the registry.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::index::definition::IndexDefinition;
use crate::index::secondary::{CollectionIndex, DocumentLocation, OperationMode};

pub struct EdgeIndex {
    id: u64,
    from: HashMap<String, HashSet<String>>,
    to: HashMap<String, HashSet<String>>,
    endpoints_by_document: HashMap<String, (String, String)>,
}

impl EdgeIndex {
    pub fn new(id: u64) -> Self {
        EdgeIndex {
            id,
            from: HashMap::new(),
            to: HashMap::new(),
            endpoints_by_document: HashMap::new(),
        }
    }

    /// Keys of edges leaving the given vertex
    pub fn lookup_from(&self, vertex: &str) -> Vec<&str> {
        self.from
            .get(vertex)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Keys of edges arriving at the given vertex
    pub fn lookup_to(&self, vertex: &str) -> Vec<&str> {
        self.to
            .get(vertex)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl CollectionIndex for EdgeIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "edge"
    }

    fn insert(
        &mut self,
        doc_key: &str,
        _location: DocumentLocation,
        document: &Value,
        mode: OperationMode,
    ) -> StorageResult<()> {
        let from = document.get("_from").and_then(Value::as_str);
        let to = document.get("_to").and_then(Value::as_str);
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                if mode == OperationMode::Rollback {
                    return Ok(());
                }
                return Err(StorageError::bad_parameter(
                    "edge document needs string _from and _to attributes",
                ));
            }
        };

        self.from
            .entry(from.to_string())
            .or_default()
            .insert(doc_key.to_string());
        self.to
            .entry(to.to_string())
            .or_default()
            .insert(doc_key.to_string());
        self.endpoints_by_document
            .insert(doc_key.to_string(), (from.to_string(), to.to_string()));
        Ok(())
    }

    fn remove(
        &mut self,
        doc_key: &str,
        _document: &Value,
        _mode: OperationMode,
    ) -> StorageResult<()> {
        if let Some((from, to)) = self.endpoints_by_document.remove(doc_key) {
            if let Some(keys) = self.from.get_mut(&from) {
                keys.remove(doc_key);
                if keys.is_empty() {
                    self.from.remove(&from);
                }
            }
            if let Some(keys) = self.to.get_mut(&to) {
                keys.remove(doc_key);
                if keys.is_empty() {
                    self.to.remove(&to);
                }
            }
        }
        Ok(())
    }

    fn matches_definition(&self, definition: &IndexDefinition) -> bool {
        definition.type_name == "edge"
    }

    fn to_definition(&self) -> IndexDefinition {
        IndexDefinition::new("edge", vec!["_from".to_string(), "_to".to_string()])
    }

    fn size(&self) -> usize {
        self.endpoints_by_document.len()
    }
}
