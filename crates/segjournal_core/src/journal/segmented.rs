//! Journal state shared by the writer and all readers.

use super::reader::{JournalReader, ReaderCursor};
use super::registry::ReaderRegistry;
use super::writer::JournalWriter;
use super::SEGMENT_BUFFER_FACTOR;
use crate::codec::SegmentDescriptor;
use crate::config::JournalConfig;
use crate::dir::JournalDir;
use crate::error::{CoreError, CoreResult};
use crate::segment::{Segment, SegmentOptions, SegmentWriter};
use crate::types::{Entry, ReaderMode};
use parking_lot::{Mutex, RwLock};
use segjournal_storage::StorageLevel;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A segmented, append-only journal of opaque entries.
///
/// Entries receive contiguous indices starting at 1. The journal is safe to
/// share between threads: writes go through the single [`JournalWriter`]
/// returned by [`Journal::writer`], reads through any number of
/// [`JournalReader`]s.
pub struct Journal {
    /// State reachable from readers.
    shared: Arc<JournalShared>,
    /// Writer of the last segment. `None` once closed.
    writer: Mutex<Option<SegmentWriter>>,
}

pub(crate) struct JournalShared {
    pub(crate) config: JournalConfig,
    options: SegmentOptions,
    /// Segments keyed by first index.
    segments: RwLock<BTreeMap<u64, Arc<Segment>>>,
    open: AtomicBool,
    commit_index: AtomicU64,
    pub(crate) registry: ReaderRegistry,
    /// Directory lock, released on close.
    dir: Mutex<Option<JournalDir>>,
}

impl Journal {
    /// Opens the journal described by `config`, creating it if needed.
    ///
    /// Existing segments are recovered. A segment that does not start right
    /// after its predecessor is deleted together with every later segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a rejected configuration,
    /// [`CoreError::JournalLocked`] if the journal is open elsewhere, or an
    /// error if a segment cannot be read.
    pub fn open(config: JournalConfig) -> CoreResult<Self> {
        config.validate()?;
        let dir = JournalDir::open(&config.directory, &config.name)?;
        let options = SegmentOptions::from(&config);

        let mut segments = load_segments(&dir, options)?;
        if segments.is_empty() {
            let descriptor = SegmentDescriptor::new(1, 1, config.max_segment_size);
            let segment = Segment::create(&dir.segment_path(1), descriptor, options)?;
            dir.sync()?;
            segments.insert(1, segment);
        }

        let last = segments
            .values()
            .next_back()
            .cloned()
            .ok_or(CoreError::JournalClosed)?;
        let writer = last.acquire_writer()?;

        tracing::debug!(
            name = %config.name,
            directory = %config.directory.display(),
            segments = segments.len(),
            last_index = writer.last_index(),
            "opened journal"
        );

        Ok(Self {
            shared: Arc::new(JournalShared {
                config,
                options,
                segments: RwLock::new(segments),
                open: AtomicBool::new(true),
                commit_index: AtomicU64::new(0),
                registry: ReaderRegistry::default(),
                dir: Mutex::new(Some(dir)),
            }),
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Returns the journal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Returns the journal directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.shared.config.directory
    }

    /// Returns the storage level of active segments.
    #[must_use]
    pub fn storage_level(&self) -> StorageLevel {
        self.shared.config.storage_level
    }

    /// Returns the configuration the journal was opened with.
    #[must_use]
    pub fn config(&self) -> &JournalConfig {
        &self.shared.config
    }

    /// Returns true until [`Journal::close`].
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Returns the index of the first retained entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn first_index(&self) -> CoreResult<u64> {
        Ok(self.shared.first_segment()?.first_index())
    }

    /// Returns the index of the last entry, or `first_index - 1` if the
    /// journal is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn last_index(&self) -> CoreResult<u64> {
        Ok(self.shared.last_segment()?.last_index())
    }

    /// Returns the highest committed index.
    #[must_use]
    pub fn commit_index(&self) -> u64 {
        self.shared.commit_index()
    }

    /// Returns the total size of all segment files.
    ///
    /// # Errors
    ///
    /// Fails after close or if file metadata cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        self.segments()?
            .iter()
            .try_fold(0u64, |total, segment| Ok(total + segment.size()?))
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.shared.segments.read().len()
    }

    /// Returns every segment ordered by first index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn segments(&self) -> CoreResult<Vec<Arc<Segment>>> {
        self.shared.check_open()?;
        Ok(self.shared.segments.read().values().cloned().collect())
    }

    /// Returns the number of open readers.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Locks and returns the journal's writer.
    ///
    /// The writer is exclusive: a second call blocks until the first
    /// [`JournalWriter`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn writer(&self) -> CoreResult<JournalWriter<'_>> {
        self.shared.check_open()?;
        let guard = self.writer.lock();
        if guard.is_none() {
            return Err(CoreError::JournalClosed);
        }
        Ok(JournalWriter::new(&self.shared, guard))
    }

    /// Opens a reader whose first entry is `index`.
    ///
    /// An index before the first retained entry starts at the first entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close, or a storage error.
    pub fn open_reader(&self, index: u64, mode: ReaderMode) -> CoreResult<JournalReader> {
        self.shared.check_open()?;
        let id = self.shared.registry.allocate_id();
        let cursor = ReaderCursor::open(&self.shared, id, index, mode)?;
        let cursor = Arc::new(Mutex::new(cursor));
        self.shared.registry.insert(id, Arc::clone(&cursor));
        Ok(JournalReader::new(id, Arc::clone(&self.shared), cursor))
    }

    /// Reads the entry at `index`, or `None` if it is not retained.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close, or a storage error.
    pub fn read(&self, index: u64) -> CoreResult<Option<Entry>> {
        let segment = self.shared.segment(index)?;
        if index < segment.first_index() || index > segment.last_index() {
            return Ok(None);
        }
        let mut reader = segment.create_reader(self.shared.registry.allocate_id())?;
        reader.reset_to(index)?;
        Ok(reader.next_entry()?.filter(|entry| entry.index() == index))
    }

    /// Returns the segment holding `index`, or the first segment if `index`
    /// precedes it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn segment(&self, index: u64) -> CoreResult<Arc<Segment>> {
        self.shared.segment(index)
    }

    /// Returns the first segment starting after `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn next_segment(&self, index: u64) -> CoreResult<Option<Arc<Segment>>> {
        self.shared.check_open()?;
        Ok(self.shared.next_segment(index))
    }

    /// Returns the first segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn first_segment(&self) -> CoreResult<Arc<Segment>> {
        self.shared.first_segment()
    }

    /// Returns the last segment, the one being appended to.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn last_segment(&self) -> CoreResult<Arc<Segment>> {
        self.shared.last_segment()
    }

    /// Returns true if compacting up to `index` would delete any segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn is_compactable(&self, index: u64) -> CoreResult<bool> {
        self.shared.check_open()?;
        let segments = self.shared.segments.read();
        Ok(match segments.range(..=index).next_back() {
            Some((&first_index, _)) => segments.range(..first_index).next().is_some(),
            None => false,
        })
    }

    /// Returns the first index that would be retained by compacting up to
    /// `index`: the first index of the segment holding `index`, or 0 if no
    /// segment starts at or before it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close.
    pub fn compactable_index(&self, index: u64) -> CoreResult<u64> {
        self.shared.check_open()?;
        Ok(self
            .shared
            .segments
            .read()
            .range(..=index)
            .next_back()
            .map_or(0, |(&first_index, _)| first_index))
    }

    /// Deletes every segment that ends before the segment holding `index`.
    ///
    /// Compaction works on whole segments, so entries before `index` may
    /// survive. Readers positioned before the new first index are moved to
    /// it. Returns the number of deleted segments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`] after close, or an error if a
    /// segment file cannot be removed.
    pub fn compact(&self, index: u64) -> CoreResult<usize> {
        self.shared.check_open()?;
        let (first_index, removed) = {
            let mut segments = self.shared.segments.write();
            let Some(first_index) = segments
                .range(..=index)
                .next_back()
                .map(|(&first_index, _)| first_index)
            else {
                return Ok(0);
            };
            let retained = segments.split_off(&first_index);
            let removed = std::mem::replace(&mut *segments, retained);
            (first_index, removed)
        };
        if removed.is_empty() {
            return Ok(0);
        }

        tracing::debug!(
            name = %self.shared.config.name,
            segments = removed.len(),
            first_index,
            "compacting journal"
        );
        self.shared
            .reset_readers(|next_index| next_index < first_index, first_index)?;
        for segment in removed.values() {
            segment.delete()?;
        }
        self.shared.sync_dir()?;
        Ok(removed.len())
    }

    /// Closes the journal and every segment, and releases the directory
    /// lock.
    ///
    /// Afterwards every operation fails with [`CoreError::JournalClosed`].
    /// Closing twice is a no-op. Blocks while a [`JournalWriter`] is held.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while flushing or closing segments.
    pub fn close(&self) -> CoreResult<()> {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(writer) = self.writer.lock().take() {
            let segment = Arc::clone(writer.segment());
            result = segment.release_writer(writer);
        }
        self.shared.registry.clear();

        let segments = std::mem::take(&mut *self.shared.segments.write());
        for segment in segments.into_values() {
            let closed = segment.close();
            if result.is_ok() {
                result = closed;
            }
        }
        self.shared.dir.lock().take();

        tracing::debug!(name = %self.shared.config.name, "closed journal");
        result
    }
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("name", &self.shared.config.name)
            .field("directory", &self.shared.config.directory)
            .field("open", &self.is_open())
            .field("segments", &self.segment_count())
            .field("commit_index", &self.commit_index())
            .finish_non_exhaustive()
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(name = %self.shared.config.name, %err, "failed to close journal");
        }
    }
}

impl JournalShared {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn check_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::JournalClosed)
        }
    }

    pub(crate) fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::Acquire)
    }

    /// Raises the commit index. Returns true if it moved.
    pub(crate) fn raise_commit_index(&self, index: u64) -> bool {
        self.commit_index.fetch_max(index, Ordering::AcqRel) < index
    }

    pub(crate) fn segment(&self, index: u64) -> CoreResult<Arc<Segment>> {
        self.check_open()?;
        let segments = self.segments.read();
        segments
            .range(..=index)
            .next_back()
            .or_else(|| segments.iter().next())
            .map(|(_, segment)| Arc::clone(segment))
            .ok_or(CoreError::JournalClosed)
    }

    pub(crate) fn next_segment(&self, index: u64) -> Option<Arc<Segment>> {
        self.segments
            .read()
            .range(index.saturating_add(1)..)
            .next()
            .map(|(_, segment)| Arc::clone(segment))
    }

    pub(crate) fn first_segment(&self) -> CoreResult<Arc<Segment>> {
        self.check_open()?;
        self.segments
            .read()
            .values()
            .next()
            .cloned()
            .ok_or(CoreError::JournalClosed)
    }

    pub(crate) fn last_segment(&self) -> CoreResult<Arc<Segment>> {
        self.check_open()?;
        self.segments
            .read()
            .values()
            .next_back()
            .cloned()
            .ok_or(CoreError::JournalClosed)
    }

    fn sync_dir(&self) -> CoreResult<()> {
        match self.dir.lock().as_ref() {
            Some(dir) => dir.sync(),
            None => Err(CoreError::JournalClosed),
        }
    }

    /// Starts a new segment after the writer's and moves the writer to it.
    pub(crate) fn roll(&self, writer: &mut SegmentWriter) -> CoreResult<()> {
        let dir = self.dir.lock();
        let dir = dir.as_ref().ok_or(CoreError::JournalClosed)?;

        let max_segment_size = self.config.max_segment_size;
        check_disk_space(dir.available_space()?, max_segment_size)?;

        let id = self.last_segment()?.id() + 1;
        let first_index = writer.next_index();
        let descriptor = SegmentDescriptor::new(id, first_index, max_segment_size);
        let segment = Segment::create(&dir.segment_path(id), descriptor, self.options)?;
        dir.sync()?;

        let next = segment.acquire_writer()?;
        self.segments.write().insert(first_index, segment);
        let previous = std::mem::replace(writer, next);
        Arc::clone(previous.segment()).release_writer(previous)
    }

    /// Discards every entry at or after `index` and repositions readers.
    ///
    /// Callers check `index` against the commit and first indices.
    pub(crate) fn rewind(&self, writer: &mut SegmentWriter, index: u64) -> CoreResult<()> {
        let (tail, removed) = {
            let mut segments = self.segments.write();
            let first_key = *segments.keys().next().ok_or(CoreError::JournalClosed)?;
            let split = index.max(first_key.saturating_add(1));
            let removed = segments.split_off(&split);
            let tail = segments
                .values()
                .next_back()
                .cloned()
                .ok_or(CoreError::JournalClosed)?;
            (tail, removed)
        };

        if !Arc::ptr_eq(writer.segment(), &tail) {
            let next = tail.acquire_writer()?;
            let previous = std::mem::replace(writer, next);
            Arc::clone(previous.segment()).release_writer(previous)?;
        }
        writer.truncate(index - 1)?;
        writer.flush()?;

        tracing::debug!(
            name = %self.config.name,
            index,
            removed_segments = removed.len(),
            "truncated journal"
        );
        self.reset_readers(|next_index| next_index >= index, index)?;
        for segment in removed.values() {
            segment.delete()?;
        }
        if !removed.is_empty() {
            self.sync_dir()?;
        }
        Ok(())
    }

    /// Moves every reader whose next index matches `predicate` to `index`.
    fn reset_readers(&self, predicate: impl Fn(u64) -> bool, index: u64) -> CoreResult<()> {
        for cursor in self.registry.snapshot() {
            let mut cursor = cursor.lock();
            if predicate(cursor.next_index()) {
                cursor.reset_to(self, index)?;
            }
        }
        Ok(())
    }
}

/// Requires room for [`SEGMENT_BUFFER_FACTOR`] segments before creating one.
fn check_disk_space(available: u64, max_segment_size: u32) -> CoreResult<()> {
    let required = u64::from(max_segment_size) * SEGMENT_BUFFER_FACTOR;
    if available < required {
        return Err(CoreError::OutOfDiskSpace {
            available,
            required,
        });
    }
    Ok(())
}

/// Opens every segment file, resolving duplicates and misalignment.
fn load_segments(
    dir: &JournalDir,
    options: SegmentOptions,
) -> CoreResult<BTreeMap<u64, Arc<Segment>>> {
    let files = dir.segment_files()?;
    let count = files.len();
    let mut loaded: BTreeMap<u64, Arc<Segment>> = BTreeMap::new();

    for (position, file) in files.into_iter().enumerate() {
        let segment = match Segment::open(&file.path, options) {
            Ok(segment) => segment,
            // A crash while creating the newest segment can leave it without
            // a descriptor.
            Err(CoreError::InvalidFormat { message }) if position + 1 == count => {
                tracing::warn!(path = %file.path.display(), %message, "discarding unreadable last segment");
                std::fs::remove_file(&file.path)?;
                continue;
            }
            Err(err) => return Err(err),
        };

        if let Some(previous) = loaded.insert(segment.first_index(), Arc::clone(&segment)) {
            // Files are visited in id order, so `previous` is older.
            tracing::warn!(
                first_index = segment.first_index(),
                kept = segment.id(),
                deleted = previous.id(),
                "duplicate segment for first index"
            );
            previous.delete()?;
        }
    }

    let mut aligned = BTreeMap::new();
    let mut expected: Option<u64> = None;
    let mut corrupted = false;
    for (first_index, segment) in loaded {
        if !corrupted && expected.is_some_and(|expected| expected != first_index) {
            tracing::warn!(
                path = %segment.path().display(),
                expected = expected.unwrap_or_default(),
                first_index,
                "segment not aligned with its predecessor, deleting it and later segments"
            );
            corrupted = true;
        }
        if corrupted {
            segment.delete()?;
            continue;
        }
        expected = Some(segment.last_index() + 1);
        aligned.insert(first_index, segment);
    }
    if corrupted {
        dir.sync()?;
    }
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, DESCRIPTOR_BYTES};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const LEVELS: [StorageLevel; 2] = [StorageLevel::Disk, StorageLevel::Mapped];

    fn config(dir: &TempDir, level: StorageLevel) -> JournalConfig {
        JournalConfig::new(dir.path())
            .storage_level(level)
            .max_segment_size(256)
            .max_entry_size(64)
            .index_density(0.25)
    }

    fn append_all(journal: &Journal, count: u64) {
        let mut writer = journal.writer().unwrap();
        for _ in 0..count {
            let expected = writer.next_index();
            assert_eq!(writer.append(&payload(expected)).unwrap(), expected);
        }
    }

    fn payload(index: u64) -> Vec<u8> {
        format!("entry-{index:04}").into_bytes()
    }

    #[test]
    fn disk_space_needs_three_segments() {
        check_disk_space(3 * 1024, 1024).unwrap();
        assert!(matches!(
            check_disk_space(3 * 1024 - 1, 1024),
            Err(CoreError::OutOfDiskSpace {
                available: 3071,
                required: 3072
            })
        ));
    }

    #[test]
    fn fresh_journal_has_one_empty_segment() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let journal = Journal::open(config(&dir, level)).unwrap();
            assert_eq!(journal.segment_count(), 1);
            assert_eq!(journal.first_index().unwrap(), 1);
            assert_eq!(journal.last_index().unwrap(), 0);
            assert_eq!(journal.commit_index(), 0);
            assert_eq!(journal.first_segment().unwrap().id(), 1);
            assert_eq!(journal.size().unwrap(), 256);
            assert!(dir.path().join("journal-1.log").exists());
        }
    }

    #[test]
    fn appends_roll_into_new_segments() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let journal = Journal::open(config(&dir, level)).unwrap();
            // 18 byte frames: 10 fit in each 256 byte segment.
            append_all(&journal, 30);

            assert_eq!(journal.last_index().unwrap(), 30);
            assert_eq!(journal.segment_count(), 3);
            let segments = journal.segments().unwrap();
            let firsts: Vec<u64> = segments.iter().map(|s| s.first_index()).collect();
            assert_eq!(firsts, vec![1, 11, 21]);
            let ids: Vec<u64> = segments.iter().map(|s| s.id()).collect();
            assert_eq!(ids, vec![1, 2, 3]);
            for pair in segments.windows(2) {
                assert_eq!(pair[0].last_index() + 1, pair[1].first_index());
            }

            for index in 1..=30 {
                assert_eq!(
                    journal.read(index).unwrap().unwrap().data().to_vec(),
                    payload(index)
                );
            }
            assert_eq!(journal.read(0).unwrap(), None);
            assert_eq!(journal.read(31).unwrap(), None);
        }
    }

    #[test]
    fn segment_lookup_helpers() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        append_all(&journal, 20);

        assert_eq!(journal.segment(0).unwrap().first_index(), 1);
        assert_eq!(journal.segment(10).unwrap().first_index(), 1);
        assert_eq!(journal.segment(11).unwrap().first_index(), 11);
        assert_eq!(journal.segment(100).unwrap().first_index(), 11);
        assert_eq!(
            journal.next_segment(1).unwrap().map(|s| s.first_index()),
            Some(11)
        );
        assert!(journal.next_segment(11).unwrap().is_none());
        assert_eq!(journal.last_segment().unwrap().first_index(), 11);
    }

    #[test]
    fn reopen_restores_entries() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let journal = Journal::open(config(&dir, level)).unwrap();
                append_all(&journal, 25);
                journal.close().unwrap();
            }
            let journal = Journal::open(config(&dir, level)).unwrap();
            assert_eq!(journal.last_index().unwrap(), 25);
            assert_eq!(journal.commit_index(), 0);
            assert_eq!(journal.writer().unwrap().append(b"more").unwrap(), 26);
            assert_eq!(&journal.read(26).unwrap().unwrap().data()[..], b"more");
        }
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        assert!(matches!(
            Journal::open(config(&dir, StorageLevel::Disk)),
            Err(CoreError::JournalLocked)
        ));
        journal.close().unwrap();
        Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Journal::open(config(&dir, StorageLevel::Disk).index_density(2.0)),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn closed_journal_rejects_everything() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        append_all(&journal, 3);
        let mut reader = journal.open_reader(1, ReaderMode::All).unwrap();
        journal.close().unwrap();
        journal.close().unwrap();

        assert!(!journal.is_open());
        assert!(matches!(journal.writer(), Err(CoreError::JournalClosed)));
        assert!(matches!(journal.first_index(), Err(CoreError::JournalClosed)));
        assert!(matches!(journal.read(1), Err(CoreError::JournalClosed)));
        assert!(matches!(journal.compact(1), Err(CoreError::JournalClosed)));
        assert!(matches!(
            journal.open_reader(1, ReaderMode::All),
            Err(CoreError::JournalClosed)
        ));
        assert!(matches!(reader.try_next(), Err(CoreError::JournalClosed)));
        assert_eq!(journal.reader_count(), 0);
    }

    #[test]
    fn compaction_is_segment_granular_and_idempotent() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let journal = Journal::open(config(&dir, level)).unwrap();
            append_all(&journal, 30);

            assert!(!journal.is_compactable(5).unwrap());
            assert_eq!(journal.compactable_index(5).unwrap(), 1);
            assert!(journal.is_compactable(15).unwrap());
            assert_eq!(journal.compactable_index(15).unwrap(), 11);

            assert_eq!(journal.compact(15).unwrap(), 1);
            assert_eq!(journal.first_index().unwrap(), 11);
            assert!(!dir.path().join("journal-1.log").exists());
            assert_eq!(journal.compact(15).unwrap(), 0);
            assert_eq!(journal.first_index().unwrap(), 11);

            // Never deletes the segment being written.
            assert_eq!(journal.compact(1_000).unwrap(), 1);
            assert_eq!(journal.segment_count(), 1);
            assert_eq!(journal.first_index().unwrap(), 21);
            assert_eq!(journal.last_index().unwrap(), 30);
            assert_eq!(journal.read(9).unwrap(), None);
            assert!(journal.read(21).unwrap().is_some());
        }
    }

    #[test]
    fn compaction_moves_lagging_readers() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        append_all(&journal, 20);
        let mut lagging = journal.open_reader(2, ReaderMode::All).unwrap();
        let mut ahead = journal.open_reader(15, ReaderMode::All).unwrap();

        journal.compact(12).unwrap();
        assert_eq!(lagging.next_index(), 11);
        assert_eq!(lagging.try_next().unwrap().unwrap().index(), 11);
        assert_eq!(ahead.next_index(), 15);
        assert_eq!(ahead.try_next().unwrap().unwrap().index(), 15);
    }

    #[test]
    fn misaligned_segments_are_deleted_on_open() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let journal = Journal::open(config(&dir, level)).unwrap();
                append_all(&journal, 30);
                journal.close().unwrap();
            }
            // Empty segment 2 so segment 3 no longer follows it.
            let path = dir.path().join("journal-2.log");
            let mut bytes = fs::read(&path).unwrap();
            bytes[DESCRIPTOR_BYTES..].fill(0);
            fs::write(&path, bytes).unwrap();

            let journal = Journal::open(config(&dir, level)).unwrap();
            assert_eq!(journal.segment_count(), 2);
            assert_eq!(journal.last_index().unwrap(), 10);
            assert!(dir.path().join("journal-2.log").exists());
            assert!(!dir.path().join("journal-3.log").exists());
            assert_eq!(journal.writer().unwrap().append(b"resume").unwrap(), 11);
        }
    }

    #[test]
    fn duplicate_first_index_keeps_newest() {
        let dir = tempdir().unwrap();
        let options = SegmentOptions::from(&config(&dir, StorageLevel::Disk));
        for id in [1u64, 2] {
            let segment = Segment::create(
                &dir.path().join(format!("journal-{id}.log")),
                SegmentDescriptor::new(id, 1, 256),
                options,
            )
            .unwrap();
            let mut writer = segment.acquire_writer().unwrap();
            writer.append(format!("from-{id}").as_bytes()).unwrap();
            segment.release_writer(writer).unwrap();
            segment.close().unwrap();
        }

        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        assert_eq!(journal.segment_count(), 1);
        assert_eq!(journal.first_segment().unwrap().id(), 2);
        assert!(!dir.path().join("journal-1.log").exists());
        assert_eq!(&journal.read(1).unwrap().unwrap().data()[..], b"from-2");
    }

    #[test]
    fn unreadable_last_segment_is_discarded() {
        let dir = tempdir().unwrap();
        {
            let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
            append_all(&journal, 5);
        }
        fs::write(dir.path().join("journal-2.log"), [0u8; 256]).unwrap();

        let journal = Journal::open(config(&dir, StorageLevel::Disk)).unwrap();
        assert_eq!(journal.segment_count(), 1);
        assert_eq!(journal.last_index().unwrap(), 5);
        assert!(!dir.path().join("journal-2.log").exists());
    }

    #[test]
    fn corrupt_tail_truncates_visible_log() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let journal = Journal::open(config(&dir, level)).unwrap();
                append_all(&journal, 5);
            }
            // Flip a payload byte of entry 4.
            let path = dir.path().join("journal-1.log");
            let mut bytes = fs::read(&path).unwrap();
            let frame = encode(&payload(1)).unwrap().len();
            bytes[DESCRIPTOR_BYTES + 3 * frame + 10] ^= 0xFF;
            fs::write(&path, bytes).unwrap();

            let journal = Journal::open(config(&dir, level)).unwrap();
            assert_eq!(journal.last_index().unwrap(), 3);
            assert_eq!(journal.writer().unwrap().append(b"again").unwrap(), 4);
            assert_eq!(&journal.read(4).unwrap().unwrap().data()[..], b"again");
            assert_eq!(journal.read(5).unwrap(), None);
        }
    }
}
