//! The segment: activation state machine, reader set and index.

use super::file::SegmentFile;
use super::reader::SegmentReader;
use super::writer::SegmentWriter;
use super::SegmentOptions;
use crate::codec::{SegmentDescriptor, DESCRIPTOR_BYTES};
use crate::error::{CoreError, CoreResult};
use crate::index::{Position, SparseIndex};
use crate::types::ReaderId;
use parking_lot::{Mutex, RwLock};
use segjournal_storage::FileAccess;
use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One segment of the journal.
///
/// Segments are shared as `Arc<Segment>`. The writer and readers created
/// from a segment hold references that keep its storage active; the segment
/// itself only records reader ids, so closing it can drain them.
#[derive(Debug)]
pub struct Segment {
    /// Location of the segment file.
    path: PathBuf,
    /// Immutable descriptor.
    descriptor: SegmentDescriptor,
    /// Settings shared with the journal.
    options: SegmentOptions,
    /// Cleared by [`Segment::close`].
    open: AtomicBool,
    /// Bumped after every truncation so readers drop cached bytes.
    truncations: AtomicU64,
    /// Sampled positions of entries in this segment.
    index: RwLock<SparseIndex>,
    /// Activation state, serialized by this lock.
    state: Mutex<SegmentState>,
}

#[derive(Debug)]
struct SegmentState {
    /// Handle used to activate storage. Dropped once the segment is closed
    /// and fully released.
    handle: Option<File>,
    activation: Activation,
    readers: HashSet<ReaderId>,
}

#[derive(Debug)]
enum Activation {
    Inactive {
        position: usize,
    },
    Active {
        access: FileAccess,
        references: usize,
        position: usize,
    },
}

impl Segment {
    /// Creates a new, empty segment file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file exists or cannot be written.
    pub fn create(
        path: &Path,
        descriptor: SegmentDescriptor,
        options: SegmentOptions,
    ) -> CoreResult<Arc<Self>> {
        tracing::debug!(
            id = descriptor.id,
            first_index = descriptor.first_index,
            path = %path.display(),
            "creating segment"
        );
        Self::new(SegmentFile::create(path, descriptor)?, options)
    }

    /// Opens an existing segment file and recovers its index.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor is invalid or the file cannot be read.
    pub fn open(path: &Path, options: SegmentOptions) -> CoreResult<Arc<Self>> {
        let segment = Self::new(SegmentFile::open(path)?, options)?;
        tracing::debug!(
            id = segment.id(),
            first_index = segment.first_index(),
            last_index = segment.last_index(),
            path = %path.display(),
            "loaded segment"
        );
        Ok(segment)
    }

    /// Wraps an open segment file and replays its entries.
    ///
    /// # Errors
    ///
    /// Fails if storage cannot be activated or read.
    pub fn new(file: SegmentFile, options: SegmentOptions) -> CoreResult<Arc<Self>> {
        let SegmentFile {
            path,
            descriptor,
            handle,
        } = file;
        let segment = Arc::new(Self {
            path,
            descriptor,
            options,
            open: AtomicBool::new(true),
            truncations: AtomicU64::new(0),
            index: RwLock::new(SparseIndex::new(options.index_density)),
            state: Mutex::new(SegmentState {
                handle: Some(handle),
                activation: Activation::Inactive {
                    position: DESCRIPTOR_BYTES,
                },
                readers: HashSet::new(),
            }),
        });

        let mut writer = segment.acquire_writer()?;
        let recovered = writer.recover();
        segment.release_writer(writer)?;
        recovered?;
        Ok(segment)
    }

    /// Number of truncations applied to this segment since it was opened.
    pub(crate) fn truncation_epoch(&self) -> u64 {
        self.truncations.load(Ordering::Acquire)
    }

    pub(crate) fn mark_truncated(&self) {
        self.truncations.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.descriptor.id
    }

    /// Returns the index of the first entry this segment holds or will hold.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.descriptor.first_index
    }

    /// Returns the index of the last entry, or `first_index() - 1` if the
    /// segment is empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.index
            .read()
            .last()
            .map_or(self.first_index() - 1, |last| last.index)
    }

    /// Returns true if the segment holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().last().is_none()
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// Returns the path of the segment file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the segment file size on disk.
    ///
    /// # Errors
    ///
    /// Fails if the file metadata cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Returns the number of addressable bytes, descriptor included.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.descriptor.max_segment_size as usize
    }

    /// Returns the segment settings.
    #[must_use]
    pub fn options(&self) -> SegmentOptions {
        self.options
    }

    /// Returns true until the segment is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Returns the closest indexed position at or before `index`.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<Position> {
        self.index.read().lookup(index)
    }

    pub(crate) fn index(&self) -> &RwLock<SparseIndex> {
        &self.index
    }

    /// Returns the number of outstanding writer and reader references.
    #[must_use]
    pub fn references(&self) -> usize {
        match self.state.lock().activation {
            Activation::Inactive { .. } => 0,
            Activation::Active { references, .. } => references,
        }
    }

    /// Returns the number of readers bound to this segment.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers.len()
    }

    /// Acquires the segment's writer, activating storage if needed.
    ///
    /// At most one writer may exist per segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentClosed`] after [`Segment::close`].
    pub fn acquire_writer(self: &Arc<Self>) -> CoreResult<SegmentWriter> {
        let mut state = self.state.lock();
        let access = self.acquire(&mut state)?;
        let writer = access.new_writer();
        let reader = access.new_reader();
        let position = match state.activation {
            Activation::Active { position, .. } | Activation::Inactive { position } => position,
        };
        drop(state);

        Ok(SegmentWriter::new(
            Arc::clone(self),
            writer,
            reader,
            position,
            self.last_index(),
        ))
    }

    /// Releases the writer, remembering its position for the next
    /// activation.
    ///
    /// # Errors
    ///
    /// Fails if the final flush fails.
    pub fn release_writer(&self, writer: SegmentWriter) -> CoreResult<()> {
        let position = writer.close()?;
        let mut state = self.state.lock();
        if let Activation::Active { position: stored, .. } = &mut state.activation {
            *stored = position;
        }
        self.release(&mut state)
    }

    /// Creates a reader bound to this segment and positioned at its start.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentClosed`] after [`Segment::close`].
    pub fn create_reader(self: &Arc<Self>, id: ReaderId) -> CoreResult<SegmentReader> {
        let mut state = self.state.lock();
        let reader = self.acquire(&mut state)?.new_reader();
        state.readers.insert(id);
        drop(state);
        Ok(SegmentReader::new(id, Arc::clone(self), reader))
    }

    /// Unbinds a reader. Readers drained by [`Segment::close`] are ignored.
    ///
    /// # Errors
    ///
    /// Fails if deactivating storage fails.
    pub fn close_reader(&self, id: ReaderId) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.readers.remove(&id) {
            self.release(&mut state)?;
        }
        Ok(())
    }

    /// Closes the segment.
    ///
    /// Bound readers are drained. If the writer is still out, storage stays
    /// active until it is released. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if deactivating storage fails.
    pub fn close(&self) -> CoreResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.state.lock();
        let drained = state.readers.len();
        state.readers.clear();
        if let Activation::Active { references, .. } = &mut state.activation {
            *references -= drained.min(*references);
            if *references == 0 {
                return self.deactivate(&mut state);
            }
        } else {
            state.handle = None;
        }
        Ok(())
    }

    /// Closes the segment and removes its file.
    ///
    /// Deleting an already deleted segment succeeds.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be removed.
    pub fn delete(&self) -> CoreResult<()> {
        self.close()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(id = self.id(), path = %self.path.display(), "deleted segment");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn acquire<'a>(&self, state: &'a mut SegmentState) -> CoreResult<&'a FileAccess> {
        if !self.is_open() {
            return Err(CoreError::SegmentClosed);
        }
        if let Activation::Inactive { position } = state.activation {
            let handle = state.handle.as_ref().ok_or(CoreError::SegmentClosed)?;
            let access = FileAccess::open(handle, self.options.storage_level, self.capacity())?;
            state.activation = Activation::Active {
                access,
                references: 0,
                position,
            };
        }
        match &mut state.activation {
            Activation::Active {
                access, references, ..
            } => {
                *references += 1;
                Ok(access)
            }
            Activation::Inactive { .. } => Err(CoreError::SegmentClosed),
        }
    }

    fn release(&self, state: &mut SegmentState) -> CoreResult<()> {
        if let Activation::Active { references, .. } = &mut state.activation {
            *references = references.saturating_sub(1);
            if *references == 0 {
                return self.deactivate(state);
            }
        }
        Ok(())
    }

    fn deactivate(&self, state: &mut SegmentState) -> CoreResult<()> {
        let position = match state.activation {
            Activation::Active { position, .. } | Activation::Inactive { position } => position,
        };
        let previous = std::mem::replace(&mut state.activation, Activation::Inactive { position });
        if !self.is_open() {
            state.handle = None;
        }
        if let Activation::Active { access, .. } = previous {
            access.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::AppendOutcome;
    use segjournal_storage::StorageLevel;
    use tempfile::tempdir;

    fn options(level: StorageLevel) -> SegmentOptions {
        SegmentOptions {
            storage_level: level,
            max_entry_size: 128,
            index_density: 0.25,
        }
    }

    fn create(dir: &Path, level: StorageLevel) -> Arc<Segment> {
        Segment::create(
            &dir.join("journal-1.log"),
            SegmentDescriptor::new(1, 1, 1024),
            options(level),
        )
        .unwrap()
    }

    #[test]
    fn new_segment_is_empty_and_inactive() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = create(dir.path(), level);
            assert!(segment.is_empty());
            assert_eq!(segment.first_index(), 1);
            assert_eq!(segment.last_index(), 0);
            assert_eq!(segment.references(), 0);
            assert_eq!(segment.size().unwrap(), 1024);
        }
    }

    #[test]
    fn references_track_writer_and_readers() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = create(dir.path(), level);

            let writer = segment.acquire_writer().unwrap();
            assert_eq!(segment.references(), 1);
            let reader = segment.create_reader(ReaderId(1)).unwrap();
            assert_eq!(segment.references(), 2);
            assert_eq!(segment.reader_count(), 1);

            segment.release_writer(writer).unwrap();
            assert_eq!(segment.references(), 1);
            drop(reader);
            assert_eq!(segment.references(), 0);
            assert_eq!(segment.reader_count(), 0);
        }
    }

    #[test]
    fn reopen_recovers_entries_and_position() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let path = dir.path().join("journal-1.log");
            let segment = create(dir.path(), level);
            let mut writer = segment.acquire_writer().unwrap();
            for i in 0..10u8 {
                assert!(matches!(
                    writer.append(&[i; 10]).unwrap(),
                    AppendOutcome::Appended(_)
                ));
            }
            segment.release_writer(writer).unwrap();
            segment.close().unwrap();
            drop(segment);

            let segment = Segment::open(&path, options(level)).unwrap();
            assert_eq!(segment.last_index(), 10);
            assert_eq!(segment.lookup(10).unwrap().index, 10);

            let mut writer = segment.acquire_writer().unwrap();
            assert_eq!(writer.append(b"next").unwrap(), AppendOutcome::Appended(11));
            segment.release_writer(writer).unwrap();
        }
    }

    #[test]
    fn inactive_position_survives_deactivation() {
        let dir = tempdir().unwrap();
        let segment = create(dir.path(), StorageLevel::Disk);
        let mut writer = segment.acquire_writer().unwrap();
        writer.append(b"one").unwrap();
        segment.release_writer(writer).unwrap();
        assert_eq!(segment.references(), 0);

        let mut writer = segment.acquire_writer().unwrap();
        assert_eq!(writer.position(), DESCRIPTOR_BYTES + 8 + 3);
        assert_eq!(writer.append(b"two").unwrap(), AppendOutcome::Appended(2));
        segment.release_writer(writer).unwrap();
    }

    #[test]
    fn close_drains_readers_and_rejects_new_work() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = create(dir.path(), level);
            let first = segment.create_reader(ReaderId(1)).unwrap();
            let second = segment.create_reader(ReaderId(2)).unwrap();
            assert_eq!(segment.references(), 2);

            segment.close().unwrap();
            assert!(!segment.is_open());
            assert_eq!(segment.references(), 0);
            assert_eq!(segment.reader_count(), 0);
            assert!(matches!(
                segment.acquire_writer(),
                Err(CoreError::SegmentClosed)
            ));
            assert!(matches!(
                segment.create_reader(ReaderId(3)),
                Err(CoreError::SegmentClosed)
            ));

            // Drained readers unbinding later is harmless.
            drop(first);
            drop(second);
            segment.close().unwrap();
        }
    }

    #[test]
    fn close_with_writer_defers_deactivation() {
        let dir = tempdir().unwrap();
        let segment = create(dir.path(), StorageLevel::Mapped);
        let writer = segment.acquire_writer().unwrap();
        segment.close().unwrap();
        assert_eq!(segment.references(), 1);
        segment.release_writer(writer).unwrap();
        assert_eq!(segment.references(), 0);
    }

    #[test]
    fn delete_is_idempotent() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = create(dir.path(), level);
            let path = segment.path().to_path_buf();
            segment.delete().unwrap();
            assert!(!path.exists());
            segment.delete().unwrap();
        }
    }
}
