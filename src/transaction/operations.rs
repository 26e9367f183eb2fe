//! Document CRUD
//!
//! Every write appends a marker to the collection journal first, then
//! maintains the indexes. A primary or secondary index failure after a
//! successful append leaves the marker in the log as a benign orphaned
//! entry; secondary index changes made before the failure are rolled
//! back so the in-memory state stays consistent.
//!
//! Revision preconditions: an expected revision of 0 means "any"; a
//! non-zero expected revision that differs from the current one is a
//! conflict and the operation does not touch anything.

use serde_json::{Map, Value};

use crate::collection::CollectionState;
use crate::error::{StorageError, StorageResult};
use crate::index::{DocumentLocation, OperationMode};
use crate::marker::{Marker, MarkerType};
use crate::transaction::Transaction;

/// Per-operation options
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationOptions {
    /// Sync the journal before returning
    pub wait_for_sync: bool,
}

/// Outcome of a successful document operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// Canonical document id, "collection/key"
    pub id: String,
    /// Document key
    pub key: String,
    /// Revision tick of the affected document
    pub revision: u64,
    /// The resulting document (insert, read, update) or the removed
    /// one (remove)
    pub document: Option<Value>,
}

impl<'db> Transaction<'db> {
    /// Insert a document.
    ///
    /// `value` must be a JSON object; a `_key` member is validated and
    /// used, otherwise a key is generated. `_id` and `_rev` are always
    /// overwritten by the engine.
    pub fn insert(
        &self,
        collection_name: &str,
        value: &Value,
        options: OperationOptions,
    ) -> StorageResult<OperationResult> {
        self.require_writable()?;
        let fields = object_fields(value)?;
        let collection = self.database().collection(collection_name)?;

        let tick = self.database().ticks().next();
        let key = match fields.get("_key") {
            Some(Value::String(key)) => {
                collection.key_generator().validate(key, false)?;
                key.clone()
            }
            Some(_) => return Err(StorageError::document_key_bad("_key must be a string")),
            None => collection.key_generator().generate(tick),
        };

        let document = canonical_document(fields, collection.name(), &key, tick);
        let marker = Marker::new(
            MarkerType::Document,
            tick,
            serde_json::to_vec(&document).map_err(|e| StorageError::internal(e.to_string()))?,
        );

        let mut state = collection.write_state();
        let sync = options.wait_for_sync || self.database().config().wait_for_sync;
        let location = collection.append(&mut state, &marker, sync)?;

        // the marker is on disk; an index failure from here on leaves
        // it orphaned in the log
        state.primary.insert(&key, location)?;
        if let Err(err) = insert_secondaries(&mut state, &key, location, &document) {
            state.primary.remove(&key);
            return Err(err);
        }

        Ok(OperationResult {
            id: format!("{}/{}", collection.name(), key),
            key,
            revision: tick,
            document: Some(document),
        })
    }

    /// Read a document by key.
    ///
    /// `value` is either a key string or an object carrying `_key` and
    /// optionally `_rev` as a precondition.
    pub fn document(&self, collection_name: &str, value: &Value) -> StorageResult<OperationResult> {
        self.require_running()?;
        let collection = self.database().collection(collection_name)?;
        let (key, expected_revision) = extract_key_and_revision(value)?;

        let state = collection.read_state();
        let location = *state
            .primary
            .lookup(&key)
            .ok_or_else(|| StorageError::document_not_found(&key))?;
        check_revision(expected_revision, location.revision)?;
        let document = state.document_at(location)?;

        Ok(OperationResult {
            id: format!("{}/{}", collection.name(), key),
            key,
            revision: location.revision,
            document: Some(document),
        })
    }

    /// Patch-update a document.
    ///
    /// `value` must be an object carrying `_key` (and optionally `_rev`
    /// as a precondition); its remaining members overlay the stored
    /// document. The document gets a fresh revision.
    pub fn update(
        &self,
        collection_name: &str,
        value: &Value,
        options: OperationOptions,
    ) -> StorageResult<OperationResult> {
        self.require_writable()?;
        let patch = object_fields(value)?;
        let collection = self.database().collection(collection_name)?;
        let (key, expected_revision) = extract_key_and_revision(value)?;

        let mut state = collection.write_state();
        let old_location = *state
            .primary
            .lookup(&key)
            .ok_or_else(|| StorageError::document_not_found(&key))?;
        check_revision(expected_revision, old_location.revision)?;
        let old_document = state.document_at(old_location)?;

        let tick = self.database().ticks().next();
        let mut merged = old_document
            .as_object()
            .cloned()
            .unwrap_or_default();
        for (name, member) in patch {
            if is_system_attribute(name) {
                continue;
            }
            merged.insert(name.clone(), member.clone());
        }
        let document = canonical_document(&merged, collection.name(), &key, tick);

        let marker = Marker::new(
            MarkerType::Document,
            tick,
            serde_json::to_vec(&document).map_err(|e| StorageError::internal(e.to_string()))?,
        );
        let sync = options.wait_for_sync || self.database().config().wait_for_sync;
        let new_location = collection.append(&mut state, &marker, sync)?;

        state.primary.update_location(&key, new_location)?;
        if let Err(err) =
            replace_in_secondaries(&mut state, &key, new_location, &old_document, &document)
        {
            let _ = state.primary.update_location(&key, old_location);
            return Err(err);
        }

        Ok(OperationResult {
            id: format!("{}/{}", collection.name(), key),
            key,
            revision: tick,
            document: Some(document),
        })
    }

    /// Remove a document by key, with an optional `_rev` precondition.
    /// The result carries the removed document.
    pub fn remove(
        &self,
        collection_name: &str,
        value: &Value,
        options: OperationOptions,
    ) -> StorageResult<OperationResult> {
        self.require_writable()?;
        let collection = self.database().collection(collection_name)?;
        let (key, expected_revision) = extract_key_and_revision(value)?;

        let mut state = collection.write_state();
        let location = *state
            .primary
            .lookup(&key)
            .ok_or_else(|| StorageError::document_not_found(&key))?;
        check_revision(expected_revision, location.revision)?;
        let old_document = state.document_at(location)?;

        let tick = self.database().ticks().next();
        let marker = Marker::new(
            MarkerType::Remove,
            tick,
            serde_json::to_vec(&serde_json::json!({
                "_key": key,
                "_rev": tick.to_string(),
            }))
            .map_err(|e| StorageError::internal(e.to_string()))?,
        );
        let sync = options.wait_for_sync || self.database().config().wait_for_sync;
        collection.append(&mut state, &marker, sync)?;

        state.primary.remove(&key);
        for index in state.secondaries.iter_mut() {
            index.remove(&key, &old_document, OperationMode::Normal)?;
        }

        Ok(OperationResult {
            id: format!("{}/{}", collection.name(), key),
            key,
            revision: location.revision,
            document: Some(old_document),
        })
    }

    /// Number of live documents in a collection
    pub fn count(&self, collection_name: &str) -> StorageResult<usize> {
        self.require_running()?;
        Ok(self.database().collection(collection_name)?.num_documents())
    }
}

fn is_system_attribute(name: &str) -> bool {
    matches!(name, "_id" | "_key" | "_rev")
}

/// The payload of a write must be a single JSON object
fn object_fields(value: &Value) -> StorageResult<&Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        Value::Array(_) => Err(StorageError::not_implemented(
            "multi-document operations are not supported",
        )),
        _ => Err(StorageError::document_type_invalid(
            "document must be a JSON object",
        )),
    }
}

/// Rebuild the document with engine-owned system attributes
fn canonical_document(fields: &Map<String, Value>, collection: &str, key: &str, tick: u64) -> Value {
    let mut document = Map::with_capacity(fields.len() + 3);
    document.insert(
        "_id".to_string(),
        Value::String(format!("{}/{}", collection, key)),
    );
    document.insert("_key".to_string(), Value::String(key.to_string()));
    document.insert("_rev".to_string(), Value::String(tick.to_string()));
    for (name, member) in fields {
        if !is_system_attribute(name) {
            document.insert(name.clone(), member.clone());
        }
    }
    Value::Object(document)
}

/// Pull the key and the expected revision out of a lookup payload.
/// An absent or unparsable revision means "no precondition".
fn extract_key_and_revision(value: &Value) -> StorageResult<(String, u64)> {
    match value {
        Value::String(key) => Ok((key.clone(), 0)),
        Value::Object(fields) => {
            let key = match fields.get("_key") {
                Some(Value::String(key)) if !key.is_empty() => key.clone(),
                Some(_) => {
                    return Err(StorageError::document_key_bad("_key must be a string"))
                }
                None => return Err(StorageError::document_key_bad("missing _key attribute")),
            };
            let revision = match fields.get("_rev") {
                Some(Value::String(rev)) => rev.parse().unwrap_or(0),
                Some(Value::Number(rev)) => rev.as_u64().unwrap_or(0),
                _ => 0,
            };
            Ok((key, revision))
        }
        Value::Array(_) => Err(StorageError::not_implemented(
            "multi-document operations are not supported",
        )),
        _ => Err(StorageError::document_type_invalid(
            "expected a key string or a document object",
        )),
    }
}

fn check_revision(expected: u64, current: u64) -> StorageResult<()> {
    if expected != 0 && expected != current {
        return Err(StorageError::conflict(format!(
            "revision conflict: expected {}, found {}",
            expected, current
        )));
    }
    Ok(())
}

fn insert_secondaries(
    state: &mut CollectionState,
    key: &str,
    location: DocumentLocation,
    document: &Value,
) -> StorageResult<()> {
    for applied in 0..state.secondaries.len() {
        if let Err(err) =
            state.secondaries[applied].insert(key, location, document, OperationMode::Normal)
        {
            for index in &mut state.secondaries[..applied] {
                let _ = index.remove(key, document, OperationMode::Rollback);
            }
            return Err(err);
        }
    }
    Ok(())
}

fn replace_in_secondaries(
    state: &mut CollectionState,
    key: &str,
    location: DocumentLocation,
    old_document: &Value,
    new_document: &Value,
) -> StorageResult<()> {
    for applied in 0..state.secondaries.len() {
        let index = &mut state.secondaries[applied];
        index.remove(key, old_document, OperationMode::Normal)?;
        if let Err(err) = index.insert(key, location, new_document, OperationMode::Normal) {
            // restore the old entries in every index touched so far
            for index in &mut state.secondaries[..=applied] {
                let _ = index.remove(key, new_document, OperationMode::Rollback);
                let _ = index.insert(key, location, old_document, OperationMode::Rollback);
            }
            return Err(err);
        }
    }
    Ok(())
}
