//! Index type registry
//!
//! Maps index type names to a normalizer (validates and canonicalizes a
//! loose JSON definition) and a builder (constructs the in-memory index
//! from a canonical definition). Built-in types are registered at
//! construction; callers can register additional types.
//!
//! Normalization invariants:
//! - `fields` is a non-empty list of distinct, non-empty attribute paths
//! - arity is exact per type (geo1/fulltext take one field, geo2 two)
//! - normalization is idempotent: a canonical definition normalizes to
//!   itself
//! - "primary" and "edge" cannot be created by users

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::index::definition::IndexDefinition;
use crate::index::edge::EdgeIndex;
use crate::index::fulltext::FulltextIndex;
use crate::index::geo::GeoIndex;
use crate::index::hash::HashIndex;
use crate::index::secondary::CollectionIndex;
use crate::index::skiplist::SkiplistIndex;

/// Default minimum word length for fulltext indexes
pub const FULLTEXT_MIN_WORD_LENGTH_DEFAULT: u32 = 2;

/// The document id attribute; derived, never indexable at creation time
const RESERVED_ID_ATTRIBUTE: &str = "_id";

/// Role of this server within a deployment. Coordinators normalize geo
/// definitions with extra cluster bookkeeping flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    SingleServer,
    Coordinator,
}

impl ServerRole {
    pub fn is_coordinator(&self) -> bool {
        matches!(self, ServerRole::Coordinator)
    }
}

type Normalizer =
    Box<dyn Fn(&Value, bool, ServerRole) -> StorageResult<IndexDefinition> + Send + Sync>;
type Builder =
    Box<dyn Fn(u64, &IndexDefinition) -> StorageResult<Box<dyn CollectionIndex>> + Send + Sync>;

/// Registry of known index types
pub struct IndexRegistry {
    role: ServerRole,
    normalizers: HashMap<String, Normalizer>,
    builders: HashMap<String, Builder>,
}

impl IndexRegistry {
    pub fn new(role: ServerRole, fulltext_min_word_length: u32) -> Self {
        let mut registry = IndexRegistry {
            role,
            normalizers: HashMap::new(),
            builders: HashMap::new(),
        };
        registry.register_builtins(fulltext_min_word_length);
        registry
    }

    /// Register a custom index type. Replaces any previous registration
    /// under the same name.
    pub fn register_type(
        &mut self,
        type_name: impl Into<String>,
        normalizer: Normalizer,
        builder: Builder,
    ) {
        let type_name = type_name.into();
        self.normalizers.insert(type_name.clone(), normalizer);
        self.builders.insert(type_name, builder);
    }

    /// Validate and canonicalize a loose definition.
    ///
    /// `is_creation` is true for user-initiated index creation, which
    /// rejects system index types and the reserved `_id` attribute.
    pub fn normalize(&self, definition: &Value, is_creation: bool) -> StorageResult<IndexDefinition> {
        let type_name = definition
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| StorageError::bad_parameter("index definition has no type"))?;
        let normalizer = self.normalizers.get(type_name).ok_or_else(|| {
            StorageError::bad_parameter(format!("unknown index type '{}'", type_name))
        })?;
        normalizer(definition, is_creation, self.role)
    }

    /// Construct an index from a canonical definition
    pub fn build(
        &self,
        id: u64,
        definition: &IndexDefinition,
    ) -> StorageResult<Box<dyn CollectionIndex>> {
        let builder = self.builders.get(definition.type_name.as_str()).ok_or_else(|| {
            StorageError::bad_parameter(format!(
                "unknown index type '{}'",
                definition.type_name
            ))
        })?;
        builder(id, definition)
    }

    fn register_builtins(&mut self, fulltext_min_word_length: u32) {
        for name in ["hash", "skiplist", "persistent"] {
            self.register_type(
                name,
                Box::new(move |def, create, _| normalize_general(name, def, create)),
                match name {
                    "hash" => Box::new(|id, def: &IndexDefinition| {
                        Ok(Box::new(HashIndex::new(id, def)) as Box<dyn CollectionIndex>)
                    }),
                    _ => Box::new(move |id, def: &IndexDefinition| {
                        Ok(Box::new(SkiplistIndex::new(id, def)) as Box<dyn CollectionIndex>)
                    }),
                },
            );
        }

        self.register_type(
            "geo1",
            Box::new(|def, create, role| normalize_geo("geo1", 1, def, create, role)),
            Box::new(|id, def| Ok(Box::new(GeoIndex::new(id, def)?) as Box<dyn CollectionIndex>)),
        );
        self.register_type(
            "geo2",
            Box::new(|def, create, role| normalize_geo("geo2", 2, def, create, role)),
            Box::new(|id, def| Ok(Box::new(GeoIndex::new(id, def)?) as Box<dyn CollectionIndex>)),
        );
        // alias that picks geo1 or geo2 from the field count
        self.register_type(
            "geo",
            Box::new(|def, create, role| {
                let arity = def
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|f| f.len())
                    .unwrap_or(0);
                if arity == 2 {
                    normalize_geo("geo2", 2, def, create, role)
                } else {
                    normalize_geo("geo1", 1, def, create, role)
                }
            }),
            Box::new(|id, def| Ok(Box::new(GeoIndex::new(id, def)?) as Box<dyn CollectionIndex>)),
        );

        self.register_type(
            "fulltext",
            Box::new(move |def, create, _| {
                normalize_fulltext(def, create, fulltext_min_word_length)
            }),
            Box::new(|id, def| Ok(Box::new(FulltextIndex::new(id, def)) as Box<dyn CollectionIndex>)),
        );

        // system index types: built internally, never user-creatable
        self.register_type(
            "primary",
            Box::new(|_, create, _| normalize_system("primary", create)),
            Box::new(|_, _| {
                Err(StorageError::internal(
                    "primary index is built by the collection",
                ))
            }),
        );
        self.register_type(
            "edge",
            Box::new(|_, create, _| normalize_system("edge", create)),
            Box::new(|id, _| Ok(Box::new(EdgeIndex::new(id)) as Box<dyn CollectionIndex>)),
        );
    }
}

/// Validate the `fields` attribute of a definition.
///
/// `arity` of 0 means any positive number of fields is accepted.
fn process_index_fields(
    definition: &Value,
    arity: usize,
    is_creation: bool,
) -> StorageResult<Vec<String>> {
    let raw = definition
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::bad_parameter("index fields must be an array"))?;

    let mut fields = Vec::with_capacity(raw.len());
    for entry in raw {
        let field = entry
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                StorageError::bad_parameter("index field names must be non-empty strings")
            })?;
        if is_creation && field == RESERVED_ID_ATTRIBUTE {
            return Err(StorageError::bad_parameter(
                "_id attribute cannot be indexed",
            ));
        }
        if fields.iter().any(|f: &String| f == field) {
            return Err(StorageError::bad_parameter("duplicate index field name"));
        }
        fields.push(field.to_string());
    }

    if fields.is_empty() || (arity != 0 && fields.len() != arity) {
        return Err(StorageError::bad_parameter(
            "invalid number of index attributes",
        ));
    }

    Ok(fields)
}

fn bool_flag(definition: &Value, name: &str, default: bool) -> bool {
    definition.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// hash, skiplist and persistent share one shape
fn normalize_general(
    type_name: &str,
    definition: &Value,
    is_creation: bool,
) -> StorageResult<IndexDefinition> {
    let fields = process_index_fields(definition, 0, is_creation)?;
    let mut def = IndexDefinition::new(type_name, fields);
    def.unique = bool_flag(definition, "unique", false);
    def.sparse = bool_flag(definition, "sparse", false);
    def.deduplicate = bool_flag(definition, "deduplicate", true);
    Ok(def)
}

fn normalize_geo(
    type_name: &str,
    arity: usize,
    definition: &Value,
    is_creation: bool,
    role: ServerRole,
) -> StorageResult<IndexDefinition> {
    let fields = process_index_fields(definition, arity, is_creation)?;
    let single_field = fields.len() == 1;
    let mut def = IndexDefinition::new(type_name, fields);
    // geo indexes are always sparse and never unique
    def.sparse = true;
    def.unique = false;
    if single_field {
        def.geo_json = Some(bool_flag(definition, "geoJson", false));
    }
    if role.is_coordinator() {
        def.ignore_null = Some(true);
        def.constraint = Some(false);
    }
    Ok(def)
}

fn normalize_fulltext(
    definition: &Value,
    is_creation: bool,
    min_word_length_default: u32,
) -> StorageResult<IndexDefinition> {
    let fields = process_index_fields(definition, 1, is_creation)?;
    let mut def = IndexDefinition::new("fulltext", fields);
    def.sparse = true;
    def.unique = false;
    def.min_length = match definition.get("minLength") {
        None | Some(Value::Null) => Some(min_word_length_default),
        Some(value) => {
            let length = value
                .as_i64()
                .filter(|v| *v >= 0)
                .ok_or_else(|| StorageError::bad_parameter("minLength must be a non-negative integer"))?;
            Some(length as u32)
        }
    };
    Ok(def)
}

fn normalize_system(type_name: &str, is_creation: bool) -> StorageResult<IndexDefinition> {
    if is_creation {
        Err(StorageError::forbidden(format!(
            "cannot create {} index",
            type_name
        )))
    } else {
        Err(StorageError::internal(format!(
            "unexpected {} index definition",
            type_name
        )))
    }
}
