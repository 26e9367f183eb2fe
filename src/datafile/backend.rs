//! Datafile storage backends
//!
//! A datafile owns its marker region as an in-memory buffer; the backend
//! is only responsible for durability. Two implementations exist: a
//! physical file-backed one and an anonymous in-memory one used by
//! temporary collections and tests.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StorageResult;

/// Durability capability of a datafile.
///
/// `persist` is called with every appended byte range; `sync` must not
/// return until previously persisted bytes are durable.
pub trait DatafileBackend: Send {
    /// True when backed by a physical file
    fn is_physical(&self) -> bool;

    /// Display name (path for physical backends)
    fn name(&self) -> String;

    /// Write-through a byte range at the given offset
    fn persist(&mut self, offset: u64, bytes: &[u8]) -> StorageResult<()>;

    /// Block until all persisted bytes are durable
    fn sync(&mut self) -> StorageResult<()>;

    /// Move the backing store to a new location
    fn rename(&mut self, new_path: &Path) -> StorageResult<()>;

    /// Release the backing store
    fn close(&mut self) -> StorageResult<()>;
}

/// File-backed datafile storage
pub struct PhysicalBackend {
    path: PathBuf,
    file: Option<File>,
}

impl PhysicalBackend {
    /// Create the backing file, preallocated to `size` bytes
    pub fn create(path: &Path, size: u64) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(size)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Open an existing backing file for appends
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    fn file_mut(&mut self) -> StorageResult<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| crate::error::StorageError::internal("datafile backend is closed"))
    }
}

impl DatafileBackend for PhysicalBackend {
    fn is_physical(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn persist(&mut self, offset: u64, bytes: &[u8]) -> StorageResult<()> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file_mut()?.sync_data()?;
        Ok(())
    }

    fn rename(&mut self, new_path: &Path) -> StorageResult<()> {
        std::fs::rename(&self.path, new_path)?;
        self.path = new_path.to_path_buf();
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_data()?;
        }
        Ok(())
    }
}

/// Memory-only datafile storage; durability calls are no-ops
#[derive(Default)]
pub struct AnonymousBackend {
    closed: bool,
}

impl AnonymousBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DatafileBackend for AnonymousBackend {
    fn is_physical(&self) -> bool {
        false
    }

    fn name(&self) -> String {
        "anonymous".to_string()
    }

    fn persist(&mut self, _offset: u64, _bytes: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn rename(&mut self, _new_path: &Path) -> StorageResult<()> {
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.closed = true;
        Ok(())
    }
}
