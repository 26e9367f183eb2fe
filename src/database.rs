//! Database: the collection registry
//!
//! Owns the tick source, the index type registry and the named
//! collections. Collections are handed out as `Arc` so transactions
//! and cursors can hold them without keeping the registry locked.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::collection::{Collection, CollectionKind};
use crate::config::EngineConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::{IndexRegistry, ServerRole};
use crate::observability::{Event, Logger, Severity};
use crate::tick::TickSource;
use crate::transaction::Transaction;

pub struct Database {
    id: u64,
    name: String,
    config: EngineConfig,
    role: ServerRole,
    ticks: Arc<TickSource>,
    registry: IndexRegistry,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    pub fn new(name: impl Into<String>, config: EngineConfig, role: ServerRole) -> Self {
        let ticks = TickSource::new();
        let registry = IndexRegistry::new(role, config.fulltext_min_word_length);
        Database {
            id: 1,
            name: name.into(),
            config,
            role,
            ticks,
            registry,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ServerRole {
        self.role
    }

    pub fn is_coordinator(&self) -> bool {
        self.role.is_coordinator()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ticks(&self) -> &Arc<TickSource> {
        &self.ticks
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Create a collection. Names must be non-empty, must not start
    /// with an underscore and must not contain '/'.
    pub fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
    ) -> StorageResult<Arc<Collection>> {
        if name.is_empty() || name.starts_with('_') || name.contains('/') {
            return Err(StorageError::bad_parameter("illegal collection name"));
        }
        let mut collections = self.collections.write().expect("collection registry poisoned");
        if collections.contains_key(name) {
            return Err(StorageError::conflict(format!(
                "duplicate collection name: {}",
                name
            )));
        }
        let collection = Arc::new(Collection::create(
            self.ticks.next(),
            self.id,
            name,
            kind,
            self.config.clone(),
            Arc::clone(&self.ticks),
        )?);
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Look up a collection by name
    pub fn collection(&self, name: &str) -> StorageResult<Arc<Collection>> {
        self.collections
            .read()
            .expect("collection registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::collection_not_found(name))
    }

    /// Drop a collection, sealing and closing its datafiles
    pub fn drop_collection(&self, name: &str) -> StorageResult<()> {
        let collection = {
            let mut collections =
                self.collections.write().expect("collection registry poisoned");
            collections
                .remove(name)
                .ok_or_else(|| StorageError::collection_not_found(name))?
        };
        collection.drop_and_close()?;
        Logger::log(
            Severity::Info,
            Event::CollectionDrop.name(),
            &[("collection", name), ("id", &collection.id().to_string())],
        );
        Ok(())
    }

    /// Names of all collections, sorted
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .expect("collection registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Start a top-level transaction
    pub fn begin_transaction(&self) -> StorageResult<Transaction<'_>> {
        let mut transaction = Transaction::new(self);
        transaction.begin()?;
        Ok(transaction)
    }
}
