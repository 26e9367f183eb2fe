//! Append-only datafiles
//!
//! A datafile is an append-only byte region holding a sequence of
//! markers: one header marker, zero or more data markers and, once
//! sealed, exactly one footer marker. Sealing is a one-way transition to
//! permanently read-only.
//!
//! # Invariants
//!
//! - The maximal size is fixed at creation and never grows
//! - Markers are written at 8-byte aligned offsets
//! - A sealed datafile is never mutated again
//! - Only the write cursor and the written/synced high-water marks are
//!   mutated after creation; both are protected by a lock shared with
//!   concurrent readers

mod backend;

pub use backend::{AnonymousBackend, DatafileBackend, PhysicalBackend};

use std::path::Path;
use std::sync::Mutex;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::marker::{
    aligned_size, scan_region, FooterPayload, HeaderPayload, Marker, MarkerType, ScanResult,
    DATAFILE_VERSION, MARKER_HEADER_SIZE,
};
use crate::observability::{Event, Logger, Severity};
use crate::tick::TickSource;

/// Space kept at the end of every datafile for the footer marker
const FOOTER_RESERVE: u32 = 32;

/// Once less than this much data room remains, the datafile reports
/// itself full so the collection rotates to a fresh journal
const TYPICAL_MARKER_SIZE: u32 = 256;

/// Datafile lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatafileState {
    /// Closed, no I/O possible
    Closed,
    /// Opened read-only (sealed files)
    Read,
    /// Opened for appends
    Write,
    /// An error occurred while opening
    OpenError,
    /// An error occurred while writing
    WriteError,
    /// An error occurred while renaming
    RenameError,
}

#[derive(Debug, Default)]
struct SyncState {
    /// Written up to, not including
    written: u32,
    /// Synced up to, not including
    synced: u32,
}

/// One append-only log segment.
///
/// The marker region lives in an owned buffer sized to the maximal
/// size; the backend write-throughs appended ranges for durability.
pub struct Datafile {
    fid: u64,
    state: DatafileState,
    maximal_size: u32,
    current_size: u32,
    full: bool,
    is_sealed: bool,

    tick_min: u64,
    tick_max: u64,
    data_min: u64,
    data_max: u64,

    buffer: Vec<u8>,
    backend: Box<dyn DatafileBackend>,
    sync_state: Mutex<SyncState>,
}

impl Datafile {
    /// Create an empty datafile: write the header marker and reserve
    /// footer space at the tail.
    pub fn create(
        backend: Box<dyn DatafileBackend>,
        fid: u64,
        maximal_size: u32,
        ticks: &TickSource,
    ) -> StorageResult<Self> {
        // marker offsets are 8-byte aligned, so the region size is too
        let maximal_size = maximal_size & !7;
        let header_marker = Marker::new(
            MarkerType::Header,
            ticks.next(),
            HeaderPayload {
                version: DATAFILE_VERSION,
                maximal_size,
                fid,
            }
            .encode(),
        );

        if header_marker.size() + FOOTER_RESERVE > maximal_size {
            return Err(StorageError::bad_parameter(format!(
                "maximal size {} cannot hold header and footer",
                maximal_size
            )));
        }

        let mut datafile = Self {
            fid,
            state: DatafileState::Write,
            maximal_size,
            current_size: 0,
            full: false,
            is_sealed: false,
            tick_min: 0,
            tick_max: 0,
            data_min: 0,
            data_max: 0,
            buffer: vec![0u8; maximal_size as usize],
            backend,
            sync_state: Mutex::new(SyncState::default()),
        };

        let offset = datafile.reserve(header_marker.size())?;
        datafile.write_marker(offset, &header_marker, false)?;

        Logger::log(
            Severity::Info,
            Event::DatafileCreate.name(),
            &[
                ("fid", &fid.to_string()),
                ("name", &datafile.backend.name()),
                ("maximal_size", &maximal_size.to_string()),
            ],
        );
        Ok(datafile)
    }

    /// Create a file-backed datafile at `path`
    pub fn create_physical(
        path: &Path,
        fid: u64,
        maximal_size: u32,
        ticks: &TickSource,
    ) -> StorageResult<Self> {
        let backend = PhysicalBackend::create(path, maximal_size as u64)?;
        Self::create(Box::new(backend), fid, maximal_size, ticks)
    }

    /// Create a memory-backed datafile
    pub fn create_anonymous(
        fid: u64,
        maximal_size: u32,
        ticks: &TickSource,
    ) -> StorageResult<Self> {
        Self::create(Box::new(AnonymousBackend::new()), fid, maximal_size, ticks)
    }

    /// Open an existing physical datafile, replaying its header and
    /// restoring the write cursor from a scan. Replayed ticks are folded
    /// back into the allocator so fresh ticks never collide with them.
    pub fn open(path: &Path, ticks: &TickSource) -> StorageResult<Self> {
        let buffer = std::fs::read(path)?;
        let backend = PhysicalBackend::open(path)?;

        let header = Marker::decode(&buffer).map_err(|err| {
            StorageError::new(
                ErrorCode::Internal,
                format!("cannot read datafile header: {}", err.message()),
            )
        })?;
        if header.marker_type() != MarkerType::Header {
            return Err(StorageError::internal("datafile does not start with a header marker"));
        }
        let payload = HeaderPayload::decode(header.payload())?;

        let scan = scan_region(&buffer);
        for entry in &scan.entries {
            if let Some(diagnosis) = &entry.diagnosis {
                Logger::log(
                    Severity::Warn,
                    Event::ScanDamage.name(),
                    &[
                        ("diagnosis", diagnosis.as_str()),
                        ("fid", &payload.fid.to_string()),
                        ("position", &entry.position.to_string()),
                    ],
                );
            }
        }
        let current_size = scan.end_position;
        let is_sealed = scan.is_sealed;

        let mut datafile = Self {
            fid: payload.fid,
            state: if is_sealed {
                DatafileState::Read
            } else {
                DatafileState::Write
            },
            maximal_size: payload.maximal_size,
            current_size,
            full: is_sealed,
            is_sealed,
            tick_min: 0,
            tick_max: 0,
            data_min: 0,
            data_max: 0,
            buffer,
            backend: Box::new(backend),
            sync_state: Mutex::new(SyncState {
                written: current_size,
                synced: current_size,
            }),
        };
        datafile.buffer.resize(payload.maximal_size as usize, 0);

        // restore observed tick ranges
        datafile.iterate(|_, _| true)?;
        ticks.update_max(datafile.tick_max);
        Ok(datafile)
    }

    pub fn fid(&self) -> u64 {
        self.fid
    }

    pub fn state(&self) -> DatafileState {
        self.state
    }

    pub fn maximal_size(&self) -> u32 {
        self.maximal_size
    }

    pub fn current_size(&self) -> u32 {
        self.current_size
    }

    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_physical(&self) -> bool {
        self.backend.is_physical()
    }

    pub fn name(&self) -> String {
        self.backend.name()
    }

    /// Minimum and maximum tick observed among all markers
    pub fn tick_range(&self) -> (u64, u64) {
        (self.tick_min, self.tick_max)
    }

    /// Minimum and maximum tick observed among document-carrying markers
    pub fn data_tick_range(&self) -> (u64, u64) {
        (self.data_min, self.data_max)
    }

    /// Offset synced to disk so far (not including)
    pub fn synced_up_to(&self) -> u32 {
        self.sync_state.lock().expect("sync state poisoned").synced
    }

    /// Reserve room for a marker of `size` bytes, advancing the write
    /// cursor. Fails with `DatafileFull` when the aligned size does not
    /// fit in front of the reserved footer space; the cursor is left
    /// unchanged in that case.
    pub fn reserve(&mut self, size: u32) -> StorageResult<u32> {
        if self.is_sealed {
            return Err(StorageError::datafile_sealed());
        }
        if self.state != DatafileState::Write {
            return Err(StorageError::internal(format!(
                "datafile {} is not writable",
                self.fid
            )));
        }
        if (size as usize) < MARKER_HEADER_SIZE {
            return Err(StorageError::new(
                ErrorCode::SizeTooSmall,
                format!("marker size {} below header size", size),
            ));
        }

        let aligned = aligned_size(size as usize) as u32;
        let data_room = self.maximal_size - FOOTER_RESERVE;
        if self.current_size + aligned > data_room {
            self.full = true;
            return Err(StorageError::datafile_full(
                aligned,
                data_room.saturating_sub(self.current_size),
            ));
        }

        let offset = self.current_size;
        self.current_size += aligned;
        if data_room - self.current_size < TYPICAL_MARKER_SIZE {
            self.full = true;
        }
        Ok(offset)
    }

    /// Write a marker at a previously reserved offset.
    ///
    /// With `sync` set, blocks until the bytes are durable. Sync calls
    /// are idempotent: already-synced prefixes are never re-synced.
    pub fn write_marker(&mut self, offset: u32, marker: &Marker, sync: bool) -> StorageResult<()> {
        if self.is_sealed {
            return Err(StorageError::datafile_sealed());
        }
        if self.state != DatafileState::Write {
            return Err(StorageError::internal(format!(
                "datafile {} is not writable",
                self.fid
            )));
        }

        let bytes = marker.encode();
        let end = offset as usize + bytes.len();
        if end > self.buffer.len() {
            self.state = DatafileState::WriteError;
            return Err(StorageError::internal(format!(
                "marker write beyond datafile bounds at offset {}",
                offset
            )));
        }

        self.buffer[offset as usize..end].copy_from_slice(&bytes);
        if let Err(err) = self.backend.persist(offset as u64, &bytes) {
            self.state = DatafileState::WriteError;
            return Err(err);
        }

        {
            let mut state = self.sync_state.lock().expect("sync state poisoned");
            state.written = state.written.max(end as u32);
        }
        self.update_ticks(marker);

        if sync {
            self.sync()?;
        }
        Ok(())
    }

    /// Sync written bytes to durable storage; a no-op when nothing new
    /// was written since the last sync.
    pub fn sync(&mut self) -> StorageResult<()> {
        let needs_sync = {
            let state = self.sync_state.lock().expect("sync state poisoned");
            state.synced < state.written
        };
        if !needs_sync {
            return Ok(());
        }
        if let Err(err) = self.backend.sync() {
            self.state = DatafileState::WriteError;
            return Err(err);
        }
        let mut state = self.sync_state.lock().expect("sync state poisoned");
        state.synced = state.written;
        Ok(())
    }

    /// Seal the datafile: write a footer marker sized to exactly fill
    /// the remaining reserved space and flip to read-only. One-way; a
    /// second call is an error.
    pub fn seal(&mut self, ticks: &TickSource) -> StorageResult<()> {
        if self.is_sealed {
            return Err(StorageError::datafile_sealed());
        }
        if self.state != DatafileState::Write {
            return Err(StorageError::internal(format!(
                "datafile {} is not writable",
                self.fid
            )));
        }

        let remaining = self.maximal_size - self.current_size;
        let footer = Marker::new(
            MarkerType::Footer,
            ticks.next(),
            FooterPayload {
                maximal_size: self.maximal_size,
                total_size: self.maximal_size,
            }
            .encode(),
        );

        let offset = self.current_size as usize;
        let bytes = footer.encode_with_size(remaining);
        self.buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
        if let Err(err) = self.backend.persist(offset as u64, &bytes) {
            self.state = DatafileState::WriteError;
            return Err(err);
        }

        self.current_size = self.maximal_size;
        {
            let mut state = self.sync_state.lock().expect("sync state poisoned");
            state.written = self.current_size;
        }
        self.update_ticks(&footer);
        self.sync()?;

        self.is_sealed = true;
        self.full = true;
        self.state = DatafileState::Read;

        Logger::log(
            Severity::Info,
            Event::DatafileSeal.name(),
            &[
                ("fid", &self.fid.to_string()),
                ("total_size", &self.maximal_size.to_string()),
            ],
        );
        Ok(())
    }

    /// Replay markers from offset 0 to the end of data, invoking the
    /// visitor per marker and refreshing observed tick ranges. Stops
    /// early when the visitor returns false. Never mutates the log.
    pub fn iterate<F>(&mut self, mut visitor: F) -> StorageResult<()>
    where
        F: FnMut(&Marker, u32) -> bool,
    {
        let mut offset = 0usize;
        let end = self.current_size as usize;

        while offset + MARKER_HEADER_SIZE <= end {
            let marker = match Marker::decode(&self.buffer[offset..end]) {
                Ok(m) => m,
                Err(err) if err.code() == ErrorCode::EmptyEntry => break,
                Err(err) => return Err(err),
            };
            let advance = aligned_size(marker.size() as usize);
            self.update_ticks(&marker);
            if !visitor(&marker, offset as u32) {
                break;
            }
            offset += advance;
        }
        Ok(())
    }

    /// Decode the marker at a known offset (as recorded in an index)
    pub fn marker_at(&self, offset: u32) -> StorageResult<Marker> {
        if offset as usize >= self.buffer.len() {
            return Err(StorageError::internal(format!(
                "marker offset {} beyond datafile bounds",
                offset
            )));
        }
        Marker::decode(&self.buffer[offset as usize..])
    }

    /// Classify every byte range for recovery diagnostics
    pub fn scan(&self) -> ScanResult {
        scan_region(&self.buffer[..self.maximal_size as usize])
    }

    /// Rename the underlying file. Returns false (and flips the state
    /// to `RenameError`) on failure.
    pub fn rename(&mut self, new_path: &Path) -> bool {
        match self.backend.rename(new_path) {
            Ok(()) => true,
            Err(_) => {
                self.state = DatafileState::RenameError;
                false
            }
        }
    }

    /// Close the datafile and release the backing store
    pub fn close(&mut self) -> StorageResult<()> {
        if self.state == DatafileState::Closed {
            return Ok(());
        }
        self.backend.close()?;
        self.state = DatafileState::Closed;
        Logger::log(
            Severity::Info,
            Event::DatafileClose.name(),
            &[
                ("fid", &self.fid.to_string()),
                ("name", &self.backend.name()),
            ],
        );
        Ok(())
    }

    fn update_ticks(&mut self, marker: &Marker) {
        let tick = marker.tick();
        if self.tick_min == 0 || tick < self.tick_min {
            self.tick_min = tick;
        }
        if tick > self.tick_max {
            self.tick_max = tick;
        }
        if marker.marker_type().is_data_marker() {
            if self.data_min == 0 || tick < self.data_min {
                self.data_min = tick;
            }
            if tick > self.data_max {
                self.data_max = tick;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    fn document_marker(ticks: &TickSource, payload: &[u8]) -> Marker {
        Marker::new(MarkerType::Document, ticks.next(), payload.to_vec())
    }

    #[test]
    fn test_create_writes_header() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(7, 4096, &ticks).unwrap();

        let mut seen = Vec::new();
        datafile.iterate(|m, offset| {
            seen.push((m.marker_type(), offset));
            true
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (MarkerType::Header, 0));
        assert_eq!(datafile.state(), DatafileState::Write);
    }

    #[test]
    fn test_append_and_iterate() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(1, 4096, &ticks).unwrap();

        for payload in [&b"{\"a\":1}"[..], b"{\"b\":2}", b"{\"c\":3}"] {
            let marker = document_marker(&ticks, payload);
            let offset = datafile.reserve(marker.size()).unwrap();
            datafile.write_marker(offset, &marker, false).unwrap();
        }

        let mut types = Vec::new();
        datafile.iterate(|m, _| {
            types.push(m.marker_type());
            true
        })
        .unwrap();
        assert_eq!(
            types,
            vec![
                MarkerType::Header,
                MarkerType::Document,
                MarkerType::Document,
                MarkerType::Document
            ]
        );

        let (data_min, data_max) = datafile.data_tick_range();
        assert!(data_min > 0 && data_max >= data_min);
    }

    #[test]
    fn test_reserve_rejects_oversized_marker() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(1, 1024, &ticks).unwrap();

        let cursor_before = datafile.current_size();
        let err = datafile.reserve(2048).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatafileFull);
        assert_eq!(datafile.current_size(), cursor_before);
        assert!(datafile.is_full());
    }

    #[test]
    fn test_seal_is_one_way() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(1, 4096, &ticks).unwrap();

        datafile.seal(&ticks).unwrap();
        assert!(datafile.is_sealed());
        assert_eq!(datafile.state(), DatafileState::Read);
        assert_eq!(datafile.current_size(), datafile.maximal_size());

        let err = datafile.seal(&ticks).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatafileSealed);

        // no reserve succeeds on a sealed datafile
        let err = datafile.reserve(64).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatafileSealed);
    }

    #[test]
    fn test_sealed_file_ends_with_footer() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(1, 4096, &ticks).unwrap();
        let marker = document_marker(&ticks, b"{\"k\":\"v\"}");
        let offset = datafile.reserve(marker.size()).unwrap();
        datafile.write_marker(offset, &marker, false).unwrap();
        datafile.seal(&ticks).unwrap();

        let scan = datafile.scan();
        assert!(scan.is_sealed);
        let last_ok = scan
            .entries
            .iter()
            .filter(|e| e.status == crate::marker::ScanEntryStatus::EntryOk)
            .last()
            .unwrap();
        assert_eq!(last_ok.marker_type, Some(MarkerType::Footer));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let ticks = TickSource::new();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal-9.db");
        let mut datafile = Datafile::create_physical(&path, 9, 4096, &ticks).unwrap();

        let marker = document_marker(&ticks, b"{}");
        let offset = datafile.reserve(marker.size()).unwrap();
        datafile.write_marker(offset, &marker, true).unwrap();
        let synced = datafile.synced_up_to();
        datafile.sync().unwrap();
        assert_eq!(datafile.synced_up_to(), synced);
    }

    #[test]
    fn test_open_restores_sealed_datafile() {
        let ticks = TickSource::new();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datafile-3.db");

        {
            let mut datafile = Datafile::create_physical(&path, 3, 2048, &ticks).unwrap();
            let marker = document_marker(&ticks, b"{\"persisted\":true}");
            let offset = datafile.reserve(marker.size()).unwrap();
            datafile.write_marker(offset, &marker, true).unwrap();
            datafile.seal(&ticks).unwrap();
            datafile.close().unwrap();
        }

        let mut reopened = Datafile::open(&path, &ticks).unwrap();
        assert_eq!(reopened.fid(), 3);
        assert!(reopened.is_sealed());
        assert_eq!(reopened.state(), DatafileState::Read);

        let mut documents = 0;
        reopened.iterate(|m, _| {
            if m.marker_type() == MarkerType::Document {
                documents += 1;
            }
            true
        })
        .unwrap();
        assert_eq!(documents, 1);
    }

    #[test]
    fn test_close_releases_datafile() {
        let ticks = TickSource::new();
        let mut datafile = Datafile::create_anonymous(2, 4096, &ticks).unwrap();
        datafile.close().unwrap();
        assert_eq!(datafile.state(), DatafileState::Closed);

        // a second close is a no-op
        datafile.close().unwrap();
        assert_eq!(datafile.state(), DatafileState::Closed);
    }

    #[test]
    fn test_rename_moves_physical_file() {
        let ticks = TickSource::new();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temp-5.db");
        let target = dir.path().join("datafile-5.db");

        let mut datafile = Datafile::create_physical(&path, 5, 1024, &ticks).unwrap();
        assert!(datafile.rename(&target));
        assert!(target.exists());
    }
}
