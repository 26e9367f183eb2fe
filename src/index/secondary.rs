//! Secondary index contract
//!
//! Every index type attached to a collection implements [`CollectionIndex`].
//! Index mutation happens under the collection's write lock, so the
//! implementations are plain single-threaded data structures.
//!
//! - Insert and remove receive the full document, so indexes project
//!   their own fields
//! - `OperationMode::Rollback` replays the inverse of a failed
//!   operation; constraint violations must be tolerated there
//! - Removal of an absent entry is a no-op

use serde_json::Value;

use crate::error::StorageResult;
use crate::index::definition::IndexDefinition;

/// Where a live document revision lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLocation {
    /// Datafile id
    pub fid: u64,
    /// Marker offset within the datafile
    pub position: u32,
    /// Revision tick of the stored document
    pub revision: u64,
}

/// Distinguishes regular index maintenance from rollback replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Regular insert or remove; constraint violations are errors
    Normal,
    /// Undoing a partially applied operation; constraint violations
    /// are swallowed so the rollback always completes
    Rollback,
}

/// The contract every collection index implements
pub trait CollectionIndex: Send {
    /// Index id, unique within the collection
    fn id(&self) -> u64;

    /// Stable type name ("hash", "skiplist", "geo1", ...)
    fn type_name(&self) -> &'static str;

    /// Index the document stored at `location` under `doc_key`
    fn insert(
        &mut self,
        doc_key: &str,
        location: DocumentLocation,
        document: &Value,
        mode: OperationMode,
    ) -> StorageResult<()>;

    /// Remove the document's entries. Idempotent.
    fn remove(&mut self, doc_key: &str, document: &Value, mode: OperationMode)
        -> StorageResult<()>;

    /// Whether this index satisfies the given canonical definition, so
    /// ensure-index calls can return an existing match instead of
    /// building a duplicate
    fn matches_definition(&self, definition: &IndexDefinition) -> bool;

    /// The canonical definition describing this index
    fn to_definition(&self) -> IndexDefinition;

    /// Number of documents currently indexed
    fn size(&self) -> usize;
}

/// An order-preserving, hashable projection of a JSON value.
///
/// Floats are encoded through a total order over their bit patterns so
/// keys can live in hash maps and btrees alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Number(OrderedFloat),
    String(String),
}

/// f64 wrapper with total ordering (NaN sorts last)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderedFloat(u64);

impl OrderedFloat {
    pub fn new(value: f64) -> Self {
        // flip the bits so that the natural integer order of the
        // encoding matches the numeric order of the float
        let bits = value.to_bits();
        let encoded = if bits >> 63 == 0 {
            bits | (1 << 63)
        } else {
            !bits
        };
        OrderedFloat(encoded)
    }

    pub fn value(&self) -> f64 {
        let bits = if self.0 >> 63 == 1 {
            self.0 & !(1 << 63)
        } else {
            !self.0
        };
        f64::from_bits(bits)
    }
}

impl IndexKey {
    /// Project a JSON value into a key. Objects and arrays are not
    /// valid scalar keys and map to `None`.
    pub fn from_json(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|f| IndexKey::Number(OrderedFloat::new(f))),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Resolve a dotted attribute path ("a.b.c") inside a document
pub fn lookup_attribute_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Project the indexed fields of a document into a composite key.
///
/// Returns `None` when any field is missing or non-scalar; sparse
/// indexes skip the document in that case, non-sparse indexes key the
/// missing field as `Null`.
pub fn project_fields(document: &Value, fields: &[String], sparse: bool) -> Option<Vec<IndexKey>> {
    let mut keys = Vec::with_capacity(fields.len());
    for field in fields {
        match lookup_attribute_path(document, field).and_then(IndexKey::from_json) {
            Some(key) => keys.push(key),
            None if sparse => return None,
            None => keys.push(IndexKey::Null),
        }
    }
    Some(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_attribute_path_nested() {
        let doc = json!({"a": {"b": {"c": 42}}});
        assert_eq!(lookup_attribute_path(&doc, "a.b.c"), Some(&json!(42)));
        assert_eq!(lookup_attribute_path(&doc, "a.b.missing"), None);
        assert_eq!(lookup_attribute_path(&doc, "a.b.c.d"), None);
    }

    #[test]
    fn test_ordered_float_total_order() {
        let values = [-10.5, -1.0, 0.0, 0.25, 7.0, 1e9];
        for window in values.windows(2) {
            assert!(OrderedFloat::new(window[0]) < OrderedFloat::new(window[1]));
        }
        assert_eq!(OrderedFloat::new(3.5).value(), 3.5);
        assert_eq!(OrderedFloat::new(-3.5).value(), -3.5);
    }

    #[test]
    fn test_project_fields_sparse_skips_missing() {
        let doc = json!({"name": "x"});
        let fields = vec!["name".to_string(), "age".to_string()];
        assert_eq!(project_fields(&doc, &fields, true), None);

        let keys = project_fields(&doc, &fields, false).unwrap();
        assert_eq!(keys[1], IndexKey::Null);
    }
}
