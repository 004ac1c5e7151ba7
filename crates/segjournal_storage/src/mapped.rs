//! Memory-mapped file access.

use crate::access::{check_bounds, FileReader, FileWriter, ReadRegion, WriteRegion, ENTRY_HEADER_BYTES};
use crate::error::{StorageError, StorageResult};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fs::File;
use std::sync::Arc;

/// Memory-mapped access to one segment file.
///
/// The whole file is mapped once per activation. Readers take short shared
/// views of the mapping, the writer takes exclusive ones, so no reader ever
/// needs to invalidate anything and commits are free.
#[derive(Debug, Clone)]
pub struct MappedAccess {
    map: Arc<RwLock<MmapMut>>,
}

impl MappedAccess {
    pub(crate) fn open(file: &File, capacity: usize) -> StorageResult<Self> {
        // SAFETY: segment files are only modified through this mapping or
        // through positioned writes of the same process while it is active,
        // and every access to the mapped bytes is guarded by the lock.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(capacity).map_mut(file)? };
        Ok(Self {
            map: Arc::new(RwLock::new(map)),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.map.read().len()
    }

    pub(crate) fn new_reader(&self) -> MappedFileReader {
        MappedFileReader {
            map: Arc::clone(&self.map),
        }
    }

    pub(crate) fn new_writer(&self) -> MappedFileWriter {
        MappedFileWriter {
            map: Arc::clone(&self.map),
            closed: false,
        }
    }

    pub(crate) fn flush(&self) -> StorageResult<()> {
        self.map.read().flush()?;
        Ok(())
    }
}

/// A reader over the shared mapping.
pub struct MappedFileReader {
    map: Arc<RwLock<MmapMut>>,
}

impl FileReader for MappedFileReader {
    fn invalidate_cache(&mut self) {}

    fn read(&mut self, position: usize, size: usize) -> StorageResult<ReadRegion<'_>> {
        let guard = self.map.read();
        check_bounds(position, size, guard.len())?;
        Ok(ReadRegion::Mapped(RwLockReadGuard::map(guard, |map| {
            &map[position..position + size]
        })))
    }
}

/// The writer for a mapped activation.
pub struct MappedFileWriter {
    map: Arc<RwLock<MmapMut>>,
    closed: bool,
}

impl MappedFileWriter {
    fn check_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl FileWriter for MappedFileWriter {
    fn write_empty_header(&mut self, position: usize) -> StorageResult<()> {
        self.check_open()?;
        let mut map = self.map.write();
        check_bounds(position, ENTRY_HEADER_BYTES, map.len())?;
        map[position..position + ENTRY_HEADER_BYTES].fill(0);
        Ok(())
    }

    fn start_write(&mut self, position: usize, size: usize) -> StorageResult<WriteRegion<'_>> {
        self.check_open()?;
        let guard = self.map.write();
        check_bounds(position, size, guard.len())?;
        Ok(WriteRegion::Mapped(RwLockWriteGuard::map(guard, |map| {
            &mut map[position..position + size]
        })))
    }

    fn commit_write(&mut self, position: usize, size: usize) -> StorageResult<()> {
        self.check_open()?;
        check_bounds(position, size, self.map.read().len())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_open()?;
        self.map.read().flush()?;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if !self.closed {
            self.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}
