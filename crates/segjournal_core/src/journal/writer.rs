//! The journal's single writer.

use super::segmented::JournalShared;
use crate::error::{CoreError, CoreResult};
use crate::segment::{AppendOutcome, SegmentWriter};
use parking_lot::MutexGuard;
use std::fmt;

/// Exclusive write access to a journal.
///
/// Obtained from [`Journal::writer`](super::Journal::writer). Holding it
/// blocks other writers and [`Journal::close`](super::Journal::close).
pub struct JournalWriter<'a> {
    shared: &'a JournalShared,
    guard: MutexGuard<'a, Option<SegmentWriter>>,
}

impl<'a> JournalWriter<'a> {
    pub(crate) fn new(
        shared: &'a JournalShared,
        guard: MutexGuard<'a, Option<SegmentWriter>>,
    ) -> Self {
        Self { shared, guard }
    }

    fn current(&mut self) -> CoreResult<&mut SegmentWriter> {
        self.shared.check_open()?;
        self.guard.as_mut().ok_or(CoreError::JournalClosed)
    }

    /// Returns the index of the last entry.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.guard.as_ref().map_or(0, SegmentWriter::last_index)
    }

    /// Returns the index the next append will receive.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.last_index() + 1
    }

    /// Appends an entry and returns its index.
    ///
    /// Starts a new segment if the current one is full.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntryTooLarge`] or [`CoreError::EmptyEntry`]
    /// without side effects, [`CoreError::OutOfDiskSpace`] if a new segment
    /// is needed but space is short, or a storage error.
    pub fn append(&mut self, data: &[u8]) -> CoreResult<u64> {
        let shared = self.shared;
        let writer = self.current()?;
        if let AppendOutcome::Appended(index) = writer.append(data)? {
            return Ok(index);
        }

        shared.roll(writer)?;
        match writer.append(data)? {
            AppendOutcome::Appended(index) => Ok(index),
            AppendOutcome::SegmentFull => Err(CoreError::entry_too_large(
                data.len(),
                shared.config.segment_payload_capacity(),
            )),
        }
    }

    /// Marks every entry up to `index` as committed.
    ///
    /// The commit index never moves backwards; committing a lower index is a
    /// no-op. Flushes the current segment if configured to.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index` is past the last
    /// entry.
    pub fn commit(&mut self, index: u64) -> CoreResult<()> {
        let shared = self.shared;
        let writer = self.current()?;
        if index > writer.last_index() {
            return Err(CoreError::index_out_of_range(format!(
                "cannot commit {index} past last index {}",
                writer.last_index()
            )));
        }
        if shared.raise_commit_index(index) && shared.config.flush_on_commit {
            writer.flush()?;
        }
        Ok(())
    }

    /// Discards every entry at or after `index`.
    ///
    /// An `index` past the last entry is a no-op. Whole segments after the
    /// new tail are deleted and readers positioned past it are moved back.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index` is at or below the
    /// commit index or before the first retained entry.
    pub fn truncate(&mut self, index: u64) -> CoreResult<()> {
        self.check_rewind(index)?;
        let shared = self.shared;
        let writer = self.current()?;
        if index > writer.last_index() {
            return Ok(());
        }
        shared.rewind(writer, index)
    }

    /// Rewinds the journal so the next append receives `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index` is at or below the
    /// commit index, before the first retained entry, or past
    /// `last_index + 1`.
    pub fn reset(&mut self, index: u64) -> CoreResult<()> {
        self.check_rewind(index)?;
        let shared = self.shared;
        let writer = self.current()?;
        let next_index = writer.next_index();
        if index > next_index {
            return Err(CoreError::index_out_of_range(format!(
                "cannot reset to {index} past next index {next_index}"
            )));
        }
        if index == next_index {
            return Ok(());
        }
        shared.rewind(writer, index)
    }

    /// Forces appended entries to stable storage.
    ///
    /// # Errors
    ///
    /// Fails if the sync fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.current()?.flush()
    }

    fn check_rewind(&self, index: u64) -> CoreResult<()> {
        self.shared.check_open()?;
        let commit_index = self.shared.commit_index();
        if index <= commit_index {
            return Err(CoreError::index_out_of_range(format!(
                "cannot rewind to {index} at or below commit index {commit_index}"
            )));
        }
        let first_index = self.shared.first_segment()?.first_index();
        if index < first_index {
            return Err(CoreError::index_out_of_range(format!(
                "cannot rewind to {index} before first index {first_index}"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for JournalWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalWriter")
            .field("last_index", &self.last_index())
            .field("commit_index", &self.shared.commit_index())
            .finish()
    }
}
