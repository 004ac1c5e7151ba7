//! File access capability traits and the backend sum type.

use crate::disk::{DiskAccess, DiskFileReader, DiskFileWriter};
use crate::error::{StorageError, StorageResult};
use crate::level::StorageLevel;
use crate::mapped::{MappedAccess, MappedFileReader, MappedFileWriter};
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use std::fs::File;
use std::ops::{Deref, DerefMut};

/// Size of one entry header, which is what [`FileWriter::write_empty_header`]
/// zeroes.
pub const ENTRY_HEADER_BYTES: usize = 8;

/// Read capabilities of an active segment file.
///
/// Each reader owns its cursor state. Two readers over the same file never
/// observe each other's buffering.
pub trait FileReader: Send {
    /// Drops any locally cached bytes so the next read reflects the file.
    fn invalidate_cache(&mut self);

    /// Reads exactly `size` bytes starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range is outside the
    /// file, [`StorageError::ShortRead`] if the file yields fewer bytes than
    /// requested, or an I/O error.
    fn read(&mut self, position: usize, size: usize) -> StorageResult<ReadRegion<'_>>;
}

/// Write capabilities of an active segment file.
///
/// There is at most one writer per activation.
pub trait FileWriter: Send {
    /// Zeroes exactly one entry header at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or the write fails.
    fn write_empty_header(&mut self, position: usize) -> StorageResult<()>;

    /// Allocates a region of `size` bytes to be filled before
    /// [`FileWriter::commit_write`] is called for the same range.
    ///
    /// The region may be a scratch buffer that is not yet part of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or the writer is closed.
    fn start_write(&mut self, position: usize, size: usize) -> StorageResult<WriteRegion<'_>>;

    /// Associates the bytes filled by the preceding
    /// [`FileWriter::start_write`] with the file at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn commit_write(&mut self, position: usize, size: usize) -> StorageResult<()>;

    /// Forces previously committed writes to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Flushes and closes the writer. Further writes fail with
    /// [`StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&mut self) -> StorageResult<()>;
}

/// Bytes returned by [`FileReader::read`].
pub enum ReadRegion<'a> {
    /// A slice of a reader's private window.
    Buffered(&'a [u8]),
    /// A shared view into the file mapping. Writers block while it is held.
    Mapped(MappedRwLockReadGuard<'a, [u8]>),
}

impl Deref for ReadRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Buffered(bytes) => bytes,
            Self::Mapped(guard) => guard,
        }
    }
}

/// Mutable bytes returned by [`FileWriter::start_write`].
pub enum WriteRegion<'a> {
    /// The writer's scratch buffer, copied to the file on commit.
    Buffered(&'a mut [u8]),
    /// An exclusive view into the file mapping.
    Mapped(MappedRwLockWriteGuard<'a, [u8]>),
}

impl Deref for WriteRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Buffered(bytes) => bytes,
            Self::Mapped(guard) => guard,
        }
    }
}

impl DerefMut for WriteRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Buffered(bytes) => bytes,
            Self::Mapped(guard) => guard,
        }
    }
}

/// An open activation of one segment file.
///
/// Created when a segment's reference count leaves zero and closed when it
/// returns to zero. Readers and the writer created from it share the
/// underlying handle or mapping.
#[derive(Debug)]
pub enum FileAccess {
    /// Buffered access through a shared file handle.
    Disk(DiskAccess),
    /// Access through a shared memory mapping.
    Mapped(MappedAccess),
}

impl FileAccess {
    /// Opens access to the first `capacity` bytes of `file`.
    ///
    /// The file must already be at least `capacity` bytes long.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is shorter than `capacity`, the handle
    /// cannot be duplicated, or the mapping fails.
    pub fn open(file: &File, level: StorageLevel, capacity: usize) -> StorageResult<Self> {
        let len = usize::try_from(file.metadata()?.len()).unwrap_or(usize::MAX);
        if len < capacity {
            return Err(StorageError::OutOfBounds {
                position: 0,
                len: capacity,
                capacity: len,
            });
        }

        Ok(match level {
            StorageLevel::Disk => Self::Disk(DiskAccess::open(file, capacity)?),
            StorageLevel::Mapped => Self::Mapped(MappedAccess::open(file, capacity)?),
        })
    }

    /// Returns the storage level of this access.
    #[must_use]
    pub fn level(&self) -> StorageLevel {
        match self {
            Self::Disk(_) => StorageLevel::Disk,
            Self::Mapped(_) => StorageLevel::Mapped,
        }
    }

    /// Returns the number of addressable bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match self {
            Self::Disk(access) => access.capacity(),
            Self::Mapped(access) => access.capacity(),
        }
    }

    /// Creates an independent reader.
    #[must_use]
    pub fn new_reader(&self) -> AccessReader {
        match self {
            Self::Disk(access) => AccessReader::Disk(access.new_reader()),
            Self::Mapped(access) => AccessReader::Mapped(access.new_reader()),
        }
    }

    /// Creates the writer for this activation.
    #[must_use]
    pub fn new_writer(&self) -> AccessWriter {
        match self {
            Self::Disk(access) => AccessWriter::Disk(access.new_writer()),
            Self::Mapped(access) => AccessWriter::Mapped(access.new_writer()),
        }
    }

    /// Releases this activation.
    ///
    /// Readers or writers still holding the handle keep it alive until they
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping cannot be flushed.
    pub fn close(self) -> StorageResult<()> {
        match self {
            Self::Disk(_) => Ok(()),
            Self::Mapped(access) => access.flush(),
        }
    }
}

/// A reader over either backend.
pub enum AccessReader {
    /// Buffered reader.
    Disk(DiskFileReader),
    /// Mapped reader.
    Mapped(MappedFileReader),
}

impl FileReader for AccessReader {
    fn invalidate_cache(&mut self) {
        match self {
            Self::Disk(reader) => reader.invalidate_cache(),
            // The mapping is always coherent.
            Self::Mapped(_) => {}
        }
    }

    fn read(&mut self, position: usize, size: usize) -> StorageResult<ReadRegion<'_>> {
        match self {
            Self::Disk(reader) => reader.read(position, size),
            Self::Mapped(reader) => reader.read(position, size),
        }
    }
}

/// A writer over either backend.
pub enum AccessWriter {
    /// Buffered writer.
    Disk(DiskFileWriter),
    /// Mapped writer.
    Mapped(MappedFileWriter),
}

impl FileWriter for AccessWriter {
    fn write_empty_header(&mut self, position: usize) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.write_empty_header(position),
            Self::Mapped(writer) => writer.write_empty_header(position),
        }
    }

    fn start_write(&mut self, position: usize, size: usize) -> StorageResult<WriteRegion<'_>> {
        match self {
            Self::Disk(writer) => writer.start_write(position, size),
            Self::Mapped(writer) => writer.start_write(position, size),
        }
    }

    fn commit_write(&mut self, position: usize, size: usize) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.commit_write(position, size),
            // Bytes written through the mapping are already visible.
            Self::Mapped(writer) => writer.commit_write(position, size),
        }
    }

    fn flush(&mut self) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.flush(),
            Self::Mapped(writer) => writer.flush(),
        }
    }

    fn close(&mut self) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.close(),
            Self::Mapped(writer) => writer.close(),
        }
    }
}

/// Checks that `position..position + len` lies within `capacity`.
pub(crate) fn check_bounds(position: usize, len: usize, capacity: usize) -> StorageResult<()> {
    match position.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            position,
            len,
            capacity,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    const CAPACITY: usize = 4096;

    fn open_file(dir: &std::path::Path) -> File {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join("segment.log"))
            .unwrap();
        file.set_len(CAPACITY as u64).unwrap();
        file
    }

    fn write_bytes(writer: &mut AccessWriter, position: usize, bytes: &[u8]) {
        let mut region = writer.start_write(position, bytes.len()).unwrap();
        region.copy_from_slice(bytes);
        drop(region);
        writer.commit_write(position, bytes.len()).unwrap();
    }

    #[test]
    fn both_levels_share_writes_with_readers() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let file = open_file(dir.path());
            let access = FileAccess::open(&file, level, CAPACITY).unwrap();
            assert_eq!(access.level(), level);
            assert_eq!(access.capacity(), CAPACITY);

            let mut writer = access.new_writer();
            let mut reader = access.new_reader();

            write_bytes(&mut writer, 100, b"hello");
            reader.invalidate_cache();
            assert_eq!(&*reader.read(100, 5).unwrap(), b"hello");

            writer.write_empty_header(100).unwrap();
            reader.invalidate_cache();
            assert_eq!(&*reader.read(100, 8).unwrap(), &[0u8; 8]);

            writer.flush().unwrap();
            writer.close().unwrap();
            access.close().unwrap();
        }
    }

    #[test]
    fn open_rejects_short_file() {
        let dir = tempdir().unwrap();
        let file = open_file(dir.path());
        let result = FileAccess::open(&file, StorageLevel::Disk, CAPACITY * 2);
        assert!(matches!(result, Err(StorageError::OutOfBounds { .. })));
    }

    #[test]
    fn reads_outside_capacity_fail() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let file = open_file(dir.path());
            let access = FileAccess::open(&file, level, CAPACITY).unwrap();
            let mut reader = access.new_reader();
            assert!(matches!(
                reader.read(CAPACITY - 4, 8),
                Err(StorageError::OutOfBounds { .. })
            ));
        }
    }

    #[test]
    fn closed_writer_rejects_writes() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let file = open_file(dir.path());
            let access = FileAccess::open(&file, level, CAPACITY).unwrap();
            let mut writer = access.new_writer();
            writer.close().unwrap();
            assert!(matches!(
                writer.start_write(0, 8),
                Err(StorageError::Closed)
            ));
        }
    }

    #[test]
    fn check_bounds_handles_overflow() {
        assert!(check_bounds(usize::MAX, 2, CAPACITY).is_err());
        assert!(check_bounds(0, CAPACITY, CAPACITY).is_ok());
        assert!(check_bounds(1, CAPACITY, CAPACITY).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn levels_agree_on_written_bytes(
            writes in prop::collection::vec(
                (0..CAPACITY - 64, prop::collection::vec(any::<u8>(), 1..64)),
                1..16,
            ),
        ) {
            let mut expected = vec![0u8; CAPACITY];
            for (position, bytes) in &writes {
                expected[*position..*position + bytes.len()].copy_from_slice(bytes);
            }

            for level in [StorageLevel::Disk, StorageLevel::Mapped] {
                let dir = tempdir().unwrap();
                let file = open_file(dir.path());
                let access = FileAccess::open(&file, level, CAPACITY).unwrap();
                let mut writer = access.new_writer();
                let mut reader = access.new_reader();
                for (position, bytes) in &writes {
                    write_bytes(&mut writer, *position, bytes);
                }
                reader.invalidate_cache();
                prop_assert_eq!(&*reader.read(0, CAPACITY).unwrap(), expected.as_slice());
            }
        }
    }
}
