//! Journal readers.

use super::registry::CursorHandle;
use super::segmented::JournalShared;
use crate::error::CoreResult;
use crate::segment::SegmentReader;
use crate::types::{Entry, ReaderId, ReaderMode};
use std::fmt;
use std::sync::Arc;

/// Position of one reader, shared with the journal so truncation and
/// compaction can move it.
#[derive(Debug)]
pub(crate) struct ReaderCursor {
    mode: ReaderMode,
    reader: SegmentReader,
    current: Option<Entry>,
}

impl ReaderCursor {
    pub(crate) fn open(
        shared: &JournalShared,
        id: ReaderId,
        index: u64,
        mode: ReaderMode,
    ) -> CoreResult<Self> {
        let segment = shared.segment(index)?;
        let mut reader = segment.create_reader(id)?;
        reader.reset_to(index)?;
        let current = reader.current_entry().cloned();
        Ok(Self {
            mode,
            reader,
            current,
        })
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.reader.next_index()
    }

    /// Positions the cursor so the next entry is `index`, switching segments
    /// if needed.
    pub(crate) fn reset_to(&mut self, shared: &JournalShared, index: u64) -> CoreResult<()> {
        let segment = shared.segment(index)?;
        if !Arc::ptr_eq(self.reader.segment(), &segment) {
            self.reader = segment.create_reader(self.reader.id())?;
        }
        self.reader.reset_to(index)?;
        self.current = self.reader.current_entry().cloned();
        Ok(())
    }

    fn has_next(&mut self, shared: &JournalShared) -> CoreResult<bool> {
        loop {
            let next_index = self.reader.next_index();
            if self.mode == ReaderMode::Commits && next_index > shared.commit_index() {
                return Ok(false);
            }
            if !self.reader.segment().is_open() {
                // The segment was removed before this cursor was moved off it.
                self.reset_to(shared, next_index)?;
            }
            if self.reader.has_next()? {
                return Ok(true);
            }

            let Some(next) = shared.next_segment(self.reader.segment().first_index()) else {
                return Ok(false);
            };
            if next.first_index() != next_index {
                return Ok(false);
            }
            self.reader = next.create_reader(self.reader.id())?;
        }
    }

    fn next(&mut self, shared: &JournalShared) -> CoreResult<Option<Entry>> {
        if !self.has_next(shared)? {
            return Ok(None);
        }
        let entry = self.reader.next_entry()?;
        if entry.is_some() {
            self.current.clone_from(&entry);
        }
        Ok(entry)
    }
}

/// A forward cursor over the journal.
///
/// Readers in [`ReaderMode::Commits`] stop at the commit index, which is
/// checked on every call, so entries become visible as they are committed.
/// Readers implement [`Iterator`]; iteration ends at the current end of the
/// journal and can be resumed later.
pub struct JournalReader {
    id: ReaderId,
    shared: Arc<JournalShared>,
    cursor: CursorHandle,
}

impl JournalReader {
    pub(crate) fn new(id: ReaderId, shared: Arc<JournalShared>, cursor: CursorHandle) -> Self {
        Self { id, shared, cursor }
    }

    /// Returns the reader id.
    #[must_use]
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// Returns which entries this reader exposes.
    #[must_use]
    pub fn mode(&self) -> ReaderMode {
        self.cursor.lock().mode
    }

    /// Returns the first index of the journal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`](crate::CoreError::JournalClosed)
    /// after close.
    pub fn first_index(&self) -> CoreResult<u64> {
        Ok(self.shared.first_segment()?.first_index())
    }

    /// Returns the index of the next entry to be read.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.cursor.lock().next_index()
    }

    /// Returns the index of the last entry read, or `next_index - 1`.
    #[must_use]
    pub fn current_index(&self) -> u64 {
        self.next_index() - 1
    }

    /// Returns the last entry read.
    #[must_use]
    pub fn current_entry(&self) -> Option<Entry> {
        self.cursor.lock().current.clone()
    }

    /// Returns true if [`JournalReader::try_next`] would return an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`](crate::CoreError::JournalClosed)
    /// after close, or a storage error.
    pub fn has_next(&self) -> CoreResult<bool> {
        self.shared.check_open()?;
        self.cursor.lock().has_next(&self.shared)
    }

    /// Reads the next entry, or returns `None` at the end of the visible
    /// journal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalClosed`](crate::CoreError::JournalClosed)
    /// after close, or a storage error.
    pub fn try_next(&mut self) -> CoreResult<Option<Entry>> {
        self.shared.check_open()?;
        self.cursor.lock().next(&self.shared)
    }

    /// Rewinds to the first retained entry.
    ///
    /// # Errors
    ///
    /// See [`JournalReader::try_next`].
    pub fn reset(&mut self) -> CoreResult<()> {
        let first_index = self.first_index()?;
        self.reset_to(first_index)
    }

    /// Positions the reader so the next entry is `index`.
    ///
    /// An index before the first retained entry moves to the first entry;
    /// an index past the end moves to the end.
    ///
    /// # Errors
    ///
    /// See [`JournalReader::try_next`].
    pub fn reset_to(&mut self, index: u64) -> CoreResult<()> {
        self.shared.check_open()?;
        self.cursor.lock().reset_to(&self.shared, index)
    }
}

impl Iterator for JournalReader {
    type Item = CoreResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

impl fmt::Debug for JournalReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalReader")
            .field("id", &self.id)
            .field("next_index", &self.next_index())
            .finish_non_exhaustive()
    }
}

impl Drop for JournalReader {
    fn drop(&mut self) {
        self.shared.registry.remove(self.id);
    }
}
