//! Fulltext index
//!
//! Tokenizes one string attribute into lowercase words and maps each
//! word at or above the minimum length to the documents containing it.
//! Always sparse: documents without a string value at the indexed path
//! are skipped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::error::StorageResult;
use crate::index::definition::IndexDefinition;
use crate::index::registry::FULLTEXT_MIN_WORD_LENGTH_DEFAULT;
use crate::index::secondary::{
    lookup_attribute_path, CollectionIndex, DocumentLocation, OperationMode,
};

pub struct FulltextIndex {
    id: u64,
    field: String,
    min_length: u32,
    postings: BTreeMap<String, BTreeSet<String>>,
    words_by_document: HashMap<String, Vec<String>>,
}

impl FulltextIndex {
    pub fn new(id: u64, definition: &IndexDefinition) -> Self {
        FulltextIndex {
            id,
            field: definition.fields[0].clone(),
            min_length: definition
                .min_length
                .unwrap_or(FULLTEXT_MIN_WORD_LENGTH_DEFAULT),
            postings: BTreeMap::new(),
            words_by_document: HashMap::new(),
        }
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= self.min_length as usize)
            .map(|w| w.to_lowercase())
            .collect();
        words.sort();
        words.dedup();
        words
    }

    /// Document keys containing the given word, in key order
    pub fn lookup_word(&self, word: &str) -> Vec<&str> {
        self.postings
            .get(&word.to_lowercase())
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl CollectionIndex for FulltextIndex {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "fulltext"
    }

    fn insert(
        &mut self,
        doc_key: &str,
        _location: DocumentLocation,
        document: &Value,
        _mode: OperationMode,
    ) -> StorageResult<()> {
        let text = match lookup_attribute_path(document, &self.field).and_then(Value::as_str) {
            Some(text) => text,
            None => return Ok(()),
        };
        let words = self.tokenize(text);
        for word in &words {
            self.postings
                .entry(word.clone())
                .or_default()
                .insert(doc_key.to_string());
        }
        self.words_by_document.insert(doc_key.to_string(), words);
        Ok(())
    }

    fn remove(
        &mut self,
        doc_key: &str,
        _document: &Value,
        _mode: OperationMode,
    ) -> StorageResult<()> {
        if let Some(words) = self.words_by_document.remove(doc_key) {
            for word in words {
                if let Some(keys) = self.postings.get_mut(&word) {
                    keys.remove(doc_key);
                    if keys.is_empty() {
                        self.postings.remove(&word);
                    }
                }
            }
        }
        Ok(())
    }

    fn matches_definition(&self, definition: &IndexDefinition) -> bool {
        definition.type_name == "fulltext"
            && definition.fields.len() == 1
            && definition.fields[0] == self.field
            && definition.min_length.unwrap_or(FULLTEXT_MIN_WORD_LENGTH_DEFAULT)
                == self.min_length
    }

    fn to_definition(&self) -> IndexDefinition {
        let mut def = IndexDefinition::new("fulltext", vec![self.field.clone()]);
        def.sparse = true;
        def.min_length = Some(self.min_length);
        def
    }

    fn size(&self) -> usize {
        self.words_by_document.len()
    }
}
