//! Collections
//!
//! A collection owns a write journal, a list of sealed datafiles, a
//! primary index and any number of secondary indexes. All of that
//! mutable state sits behind one RwLock; transactions take the read
//! side for lookups and the write side for mutations, so a mutation
//! observes indexes and datafiles in a consistent state.
//!
//! The journal rotates when an append does not fit: the full journal
//! is sealed, moved to the sealed list and replaced by a fresh one,
//! and the append is retried exactly once.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::config::EngineConfig;
use crate::datafile::Datafile;
use crate::error::{StorageError, StorageResult};
use crate::index::{
    CollectionIndex, DocumentLocation, EdgeIndex, IndexDefinition, IndexRegistry, OperationMode,
    PrimaryIndex,
};
use crate::keygen::{KeyGenerator, TraditionalKeyGenerator};
use crate::marker::{strip_padding, Marker, MarkerType, ProloguePayload};
use crate::observability::{Event, Logger, Severity};
use crate::tick::TickSource;

/// Whether a collection stores plain documents or edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Document,
    Edge,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id)
            .field("database_id", &self.database_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

pub struct Collection {
    id: u64,
    database_id: u64,
    name: String,
    kind: CollectionKind,
    config: EngineConfig,
    ticks: Arc<TickSource>,
    key_generator: Box<dyn KeyGenerator>,
    state: RwLock<CollectionState>,
}

pub struct CollectionState {
    pub(crate) journal: Datafile,
    pub(crate) sealed: Vec<Datafile>,
    pub(crate) primary: PrimaryIndex,
    pub(crate) secondaries: Vec<Box<dyn CollectionIndex>>,
}

impl CollectionState {
    fn datafile_for(&self, fid: u64) -> Option<&Datafile> {
        if self.journal.fid() == fid {
            return Some(&self.journal);
        }
        self.sealed.iter().find(|d| d.fid() == fid)
    }

    /// Load and parse the document stored at `location`
    pub fn document_at(&self, location: DocumentLocation) -> StorageResult<Value> {
        let datafile = self.datafile_for(location.fid).ok_or_else(|| {
            StorageError::internal(format!("no datafile with id {}", location.fid))
        })?;
        let marker = datafile.marker_at(location.position)?;
        serde_json::from_slice(strip_padding(marker.payload()))
            .map_err(|e| StorageError::internal(format!("stored document unparsable: {}", e)))
    }
}

impl Collection {
    pub fn create(
        id: u64,
        database_id: u64,
        name: impl Into<String>,
        kind: CollectionKind,
        config: EngineConfig,
        ticks: Arc<TickSource>,
    ) -> StorageResult<Self> {
        let name = name.into();
        let journal = Self::new_journal(&config, &ticks, database_id, id)?;

        let mut secondaries: Vec<Box<dyn CollectionIndex>> = Vec::new();
        if kind == CollectionKind::Edge {
            secondaries.push(Box::new(EdgeIndex::new(ticks.next())));
        }

        let collection = Collection {
            id,
            database_id,
            name,
            kind,
            config,
            ticks,
            key_generator: Box::new(TraditionalKeyGenerator::new()),
            state: RwLock::new(CollectionState {
                journal,
                sealed: Vec::new(),
                primary: PrimaryIndex::new(),
                secondaries,
            }),
        };

        {
            let mut state = collection.write_state();
            let marker = collection.lifecycle_marker(MarkerType::CreateCollection)?;
            collection.append(&mut state, &marker, collection.config.wait_for_sync)?;
        }

        Logger::log(
            Severity::Info,
            Event::CollectionCreate.name(),
            &[
                ("collection", &collection.name),
                ("id", &collection.id.to_string()),
            ],
        );
        Ok(collection)
    }

    fn new_journal(
        config: &EngineConfig,
        ticks: &Arc<TickSource>,
        database_id: u64,
        collection_id: u64,
    ) -> StorageResult<Datafile> {
        let fid = ticks.next();
        let mut journal = match &config.data_path {
            Some(dir) => {
                let path = dir.join(format!("datafile-{}.db", fid));
                Datafile::create_physical(&path, fid, config.journal_size, ticks)?
            }
            None => Datafile::create_anonymous(fid, config.journal_size, ticks)?,
        };

        // every journal opens with a prologue binding it to its collection
        let prologue = Marker::new(
            MarkerType::Prologue,
            ticks.next(),
            ProloguePayload {
                database_id,
                collection_id,
            }
            .encode(),
        );
        let offset = journal.reserve(prologue.size())?;
        journal.write_marker(offset, &prologue, false)?;
        Ok(journal)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn key_generator(&self) -> &dyn KeyGenerator {
        self.key_generator.as_ref()
    }

    /// Number of live documents
    pub fn num_documents(&self) -> usize {
        self.read_state().primary.size()
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read().expect("collection lock poisoned")
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.state.write().expect("collection lock poisoned")
    }

    /// Append a marker to the journal, rotating once when it is full.
    ///
    /// Returns the location of the appended marker; its revision is the
    /// marker's tick.
    pub(crate) fn append(
        &self,
        state: &mut CollectionState,
        marker: &Marker,
        sync: bool,
    ) -> StorageResult<DocumentLocation> {
        let offset = match state.journal.reserve(marker.size()) {
            Ok(offset) => offset,
            Err(err) if err.code() == crate::error::ErrorCode::DatafileFull => {
                self.rotate_journal(state)?;
                state.journal.reserve(marker.size())?
            }
            Err(err) => return Err(err),
        };
        state.journal.write_marker(offset, marker, sync)?;
        Ok(DocumentLocation {
            fid: state.journal.fid(),
            position: offset,
            revision: marker.tick(),
        })
    }

    fn rotate_journal(&self, state: &mut CollectionState) -> StorageResult<()> {
        let fresh = Self::new_journal(&self.config, &self.ticks, self.database_id, self.id)?;
        let mut old = std::mem::replace(&mut state.journal, fresh);
        old.seal(&self.ticks)?;
        Logger::log(
            Severity::Info,
            Event::JournalRotate.name(),
            &[
                ("collection", &self.name),
                ("sealed_fid", &old.fid().to_string()),
                ("new_fid", &state.journal.fid().to_string()),
            ],
        );
        state.sealed.push(old);
        Ok(())
    }

    /// Create a secondary index, or return the definition of an
    /// existing index that already satisfies the request.
    ///
    /// Existing documents are indexed before the new index becomes
    /// visible; a constraint violation during that backfill aborts the
    /// creation.
    pub fn ensure_index(
        &self,
        registry: &IndexRegistry,
        definition: &Value,
    ) -> StorageResult<IndexDefinition> {
        let canonical = registry.normalize(definition, true)?;

        let mut state = self.write_state();
        if let Some(existing) = state
            .secondaries
            .iter()
            .find(|idx| idx.matches_definition(&canonical))
        {
            return Ok(existing.to_definition());
        }

        let index_id = self.ticks.next();
        let mut index = registry.build(index_id, &canonical)?;

        // backfill: existing documents must satisfy the new constraints
        let mut position = crate::index::BucketPosition::start();
        let mut total = 0;
        let mut pending = Vec::new();
        while let Some((key, location)) = state.primary.lookup_sequential(&mut position, &mut total)
        {
            pending.push((key.to_string(), *location));
        }
        for (key, location) in pending {
            let document = state.document_at(location)?;
            index.insert(&key, location, &document, OperationMode::Normal)?;
        }

        let marker = Marker::new(
            MarkerType::CreateIndex,
            self.ticks.next(),
            serde_json::to_vec(&serde_json::json!({
                "id": index_id,
                "collection": self.id,
                "index": canonical,
            }))
            .map_err(|e| StorageError::internal(e.to_string()))?,
        );
        self.append(&mut state, &marker, self.config.wait_for_sync)?;

        Logger::log(
            Severity::Info,
            Event::IndexCreate.name(),
            &[
                ("collection", &self.name),
                ("id", &index_id.to_string()),
                ("type", &canonical.type_name),
            ],
        );
        state.secondaries.push(index);
        Ok(canonical)
    }

    /// Drop a secondary index by id. Returns false when no such index
    /// exists. The edge index of an edge collection cannot be dropped.
    pub fn drop_index(&self, index_id: u64) -> StorageResult<bool> {
        let mut state = self.write_state();
        let Some(pos) = state.secondaries.iter().position(|idx| idx.id() == index_id) else {
            return Ok(false);
        };
        if state.secondaries[pos].type_name() == "edge" {
            return Err(StorageError::forbidden("cannot drop the edge index"));
        }

        let marker = Marker::new(
            MarkerType::DropIndex,
            self.ticks.next(),
            serde_json::to_vec(&serde_json::json!({
                "id": index_id,
                "collection": self.id,
            }))
            .map_err(|e| StorageError::internal(e.to_string()))?,
        );
        self.append(&mut state, &marker, self.config.wait_for_sync)?;

        state.secondaries.remove(pos);
        Logger::log(
            Severity::Info,
            Event::IndexDrop.name(),
            &[("collection", &self.name), ("id", &index_id.to_string())],
        );
        Ok(true)
    }

    /// Definitions of all secondary indexes
    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        self.read_state()
            .secondaries
            .iter()
            .map(|idx| idx.to_definition())
            .collect()
    }

    fn lifecycle_marker(&self, marker_type: MarkerType) -> StorageResult<Marker> {
        let payload = serde_json::to_vec(&serde_json::json!({
            "id": self.id,
            "name": self.name,
        }))
        .map_err(|e| StorageError::internal(e.to_string()))?;
        Ok(Marker::new(marker_type, self.ticks.next(), payload))
    }

    /// Record the drop in the journal, then seal and close every
    /// datafile. Called when the database removes the collection.
    pub(crate) fn drop_and_close(&self) -> StorageResult<()> {
        {
            let mut state = self.write_state();
            if !state.journal.is_sealed() {
                let marker = self.lifecycle_marker(MarkerType::DropCollection)?;
                self.append(&mut state, &marker, self.config.wait_for_sync)?;
            }
        }
        self.close_datafiles()
    }

    /// Seal the journal and close every datafile
    pub(crate) fn close_datafiles(&self) -> StorageResult<()> {
        let mut state = self.write_state();
        if !state.journal.is_sealed() {
            state.journal.seal(&self.ticks)?;
        }
        state.journal.close()?;
        for datafile in &mut state.sealed {
            datafile.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ServerRole, FULLTEXT_MIN_WORD_LENGTH_DEFAULT};
    use serde_json::json;

    fn small_config() -> EngineConfig {
        EngineConfig {
            journal_size: 4096,
            ..EngineConfig::default()
        }
    }

    fn collection() -> Collection {
        let ticks = TickSource::new();
        Collection::create(
            1,
            1,
            "people",
            CollectionKind::Document,
            small_config(),
            ticks,
        )
        .unwrap()
    }

    fn registry() -> IndexRegistry {
        IndexRegistry::new(ServerRole::SingleServer, FULLTEXT_MIN_WORD_LENGTH_DEFAULT)
    }

    fn append_document(collection: &Collection, key: &str, doc: Value) {
        let mut state = collection.write_state();
        let tick = collection.ticks.next();
        let marker = Marker::new(
            MarkerType::Document,
            tick,
            serde_json::to_vec(&doc).unwrap(),
        );
        let location = collection.append(&mut state, &marker, false).unwrap();
        state.primary.insert(key, location).unwrap();
    }

    #[test]
    fn test_journal_rotates_when_full() {
        let collection = collection();
        // large enough that a 4 KiB journal fills after a few appends
        let blob = "x".repeat(512);
        for i in 0..20 {
            append_document(&collection, &format!("k{}", i), json!({ "blob": &blob }));
        }
        let state = collection.read_state();
        assert!(!state.sealed.is_empty());
        assert!(state.sealed.iter().all(|d| d.is_sealed()));
        assert_eq!(state.primary.size(), 20);
    }

    #[test]
    fn test_documents_survive_rotation() {
        let collection = collection();
        let blob = "y".repeat(512);
        for i in 0..20 {
            append_document(
                &collection,
                &format!("k{}", i),
                json!({ "i": i, "blob": &blob }),
            );
        }
        let state = collection.read_state();
        for i in 0..20 {
            let location = *state.primary.lookup(&format!("k{}", i)).unwrap();
            let doc = state.document_at(location).unwrap();
            assert_eq!(doc["i"], i);
        }
    }

    #[test]
    fn test_ensure_index_is_idempotent() {
        let collection = collection();
        let registry = registry();
        let def = json!({"type": "hash", "fields": ["name"]});
        let first = collection.ensure_index(&registry, &def).unwrap();
        let second = collection.ensure_index(&registry, &def).unwrap();
        assert_eq!(first, second);
        assert_eq!(collection.index_definitions().len(), 1);
    }

    #[test]
    fn test_ensure_index_backfills_existing_documents() {
        let collection = collection();
        append_document(&collection, "a", json!({"name": "ann"}));
        append_document(&collection, "b", json!({"name": "bob"}));

        let registry = registry();
        collection
            .ensure_index(&registry, &json!({"type": "hash", "fields": ["name"]}))
            .unwrap();

        let state = collection.read_state();
        assert_eq!(state.secondaries[0].size(), 2);
    }

    #[test]
    fn test_backfill_constraint_violation_aborts_creation() {
        let collection = collection();
        append_document(&collection, "a", json!({"name": "same"}));
        append_document(&collection, "b", json!({"name": "same"}));

        let registry = registry();
        let err = collection
            .ensure_index(
                &registry,
                &json!({"type": "hash", "fields": ["name"], "unique": true}),
            )
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Conflict);
        assert!(collection.index_definitions().is_empty());
    }

    #[test]
    fn test_drop_index() {
        let collection = collection();
        let registry = registry();
        collection
            .ensure_index(&registry, &json!({"type": "hash", "fields": ["name"]}))
            .unwrap();
        let id = {
            let state = collection.read_state();
            state.secondaries[0].id()
        };
        assert!(collection.drop_index(id).unwrap());
        assert!(!collection.drop_index(id).unwrap());
        assert!(collection.index_definitions().is_empty());
    }

    #[test]
    fn test_edge_collection_carries_edge_index() {
        let ticks = TickSource::new();
        let collection = Collection::create(
            2,
            1,
            "knows",
            CollectionKind::Edge,
            small_config(),
            ticks,
        )
        .unwrap();
        let defs = collection.index_definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].type_name, "edge");

        let id = {
            let state = collection.read_state();
            state.secondaries[0].id()
        };
        let err = collection.drop_index(id).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Forbidden);
    }
}
