//! Collection read cursors
//!
//! Batched and windowed reads over the primary index scans. All of
//! these hold the collection read lock only for the duration of one
//! call, so cursor state must live with the caller; the bucket/slot
//! positions stay valid between calls because slots are never
//! compacted.

use serde_json::Value;

use crate::error::StorageResult;
use crate::index::BucketPosition;
use crate::transaction::Transaction;

impl<'db> Transaction<'db> {
    /// One pseudo-random document, or `None` when the collection is
    /// empty
    pub fn any(&self, collection_name: &str) -> StorageResult<Option<Value>> {
        self.require_running()?;
        let collection = self.database().collection(collection_name)?;
        let state = collection.read_state();

        let mut initial = BucketPosition::uninitialized();
        let mut position = BucketPosition::uninitialized();
        let mut step = 0;
        let mut total = 0;
        match state
            .primary
            .lookup_random(&mut initial, &mut position, &mut step, &mut total)
        {
            Some((_, location)) => Ok(Some(state.document_at(*location)?)),
            None => Ok(None),
        }
    }

    /// All documents in scan order, after `skip`, at most `limit`
    pub fn all(
        &self,
        collection_name: &str,
        skip: usize,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        self.require_running()?;
        let collection = self.database().collection(collection_name)?;
        let state = collection.read_state();

        let mut documents = Vec::new();
        let mut position = BucketPosition::start();
        let mut total = 0;
        let mut skipped = 0;
        while let Some((_, location)) = state.primary.lookup_sequential(&mut position, &mut total) {
            if skipped < skip {
                skipped += 1;
                continue;
            }
            if limit.is_some_and(|limit| documents.len() >= limit) {
                break;
            }
            documents.push(state.document_at(*location)?);
        }
        Ok(documents)
    }

    /// Advance a resumable scan by up to `batch_size` documents.
    ///
    /// `position` starts at [`BucketPosition::start`] and `total` at 0;
    /// both must be carried between calls. An empty batch means the
    /// scan is complete.
    pub fn read_incremental(
        &self,
        collection_name: &str,
        position: &mut BucketPosition,
        total: &mut u64,
        batch_size: usize,
    ) -> StorageResult<Vec<Value>> {
        self.require_running()?;
        let collection = self.database().collection(collection_name)?;
        let state = collection.read_state();

        let mut documents = Vec::with_capacity(batch_size);
        while documents.len() < batch_size {
            match state.primary.lookup_sequential(position, total) {
                Some((_, location)) => documents.push(state.document_at(*location)?),
                None => break,
            }
        }
        Ok(documents)
    }

    /// A window of documents in scan order.
    ///
    /// A negative `skip` counts from the end: the window covers the
    /// documents just before the last `-skip` ones, still returned in
    /// forward scan order.
    pub fn read_slice(
        &self,
        collection_name: &str,
        skip: i64,
        limit: usize,
    ) -> StorageResult<Vec<Value>> {
        self.require_running()?;
        if skip >= 0 {
            return self.all(collection_name, skip as usize, Some(limit));
        }

        let collection = self.database().collection(collection_name)?;
        let state = collection.read_state();

        let mut documents = Vec::new();
        let mut position = BucketPosition::uninitialized();
        let mut to_skip = (-skip) as u64;
        while let Some((_, location)) = state.primary.lookup_sequential_reverse(&mut position) {
            if to_skip > 0 {
                to_skip -= 1;
                continue;
            }
            if documents.len() >= limit {
                break;
            }
            documents.push(state.document_at(*location)?);
        }
        documents.reverse();
        Ok(documents)
    }
}

// exercised end to end in tests/transactions.rs
