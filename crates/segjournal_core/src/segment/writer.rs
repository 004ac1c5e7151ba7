//! Appending to a segment.

use super::store::Segment;
use super::read_frame;
use crate::codec::{encode_into, framed_len, DESCRIPTOR_BYTES, ENTRY_HEADER_BYTES};
use crate::error::{CoreError, CoreResult};
use segjournal_storage::{AccessReader, AccessWriter, FileReader, FileWriter};
use std::fmt;
use std::sync::Arc;

/// Result of [`SegmentWriter::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was written with this index.
    Appended(u64),
    /// The entry does not fit in the space left in this segment.
    SegmentFull,
}

/// The single writer of a segment.
///
/// Every append writes the frame followed by an empty header, so the entry
/// after the last one always reads as "no entry", even over bytes left by an
/// earlier truncation.
pub struct SegmentWriter {
    /// Segment being written.
    segment: Arc<Segment>,
    /// Storage writer for this activation.
    writer: AccessWriter,
    /// Storage reader used to replay entries during recovery and truncation.
    reader: AccessReader,
    /// Position of the next frame.
    position: usize,
    /// Index of the last entry, `first_index - 1` if empty.
    last_index: u64,
}

impl SegmentWriter {
    pub(crate) fn new(
        segment: Arc<Segment>,
        writer: AccessWriter,
        reader: AccessReader,
        position: usize,
        last_index: u64,
    ) -> Self {
        Self {
            segment,
            writer,
            reader,
            position,
            last_index,
        }
    }

    /// Returns the segment this writer appends to.
    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns the index of the last entry, or `first_index - 1` if empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// Returns the index the next append will receive.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.last_index + 1
    }

    /// Returns the position of the next frame.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true if nothing has been appended to the segment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position == DESCRIPTOR_BYTES
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntryTooLarge`] if the payload exceeds the entry
    /// limit or could not fit even in an empty segment, and
    /// [`CoreError::EmptyEntry`] for an empty payload. Neither writes
    /// anything.
    pub fn append(&mut self, payload: &[u8]) -> CoreResult<AppendOutcome> {
        let options = self.segment.options();
        if payload.len() > options.max_entry_size {
            return Err(CoreError::entry_too_large(
                payload.len(),
                options.max_entry_size,
            ));
        }
        if payload.is_empty() {
            return Err(CoreError::EmptyEntry);
        }

        let frame_len = framed_len(payload.len());
        let capacity = self.segment.capacity();
        if self.position + frame_len + ENTRY_HEADER_BYTES > capacity {
            if self.is_empty() {
                return Err(CoreError::entry_too_large(
                    payload.len(),
                    capacity.saturating_sub(DESCRIPTOR_BYTES + 2 * ENTRY_HEADER_BYTES),
                ));
            }
            tracing::trace!(
                segment = self.segment.id(),
                position = self.position,
                size = payload.len(),
                "segment full"
            );
            return Ok(AppendOutcome::SegmentFull);
        }

        let size = frame_len + ENTRY_HEADER_BYTES;
        let mut region = self.writer.start_write(self.position, size)?;
        encode_into(&mut region, payload);
        region[frame_len..].fill(0);
        drop(region);
        self.writer.commit_write(self.position, size)?;

        self.last_index += 1;
        self.segment
            .index()
            .write()
            .record(self.last_index, self.position as u32);
        self.position += frame_len;
        Ok(AppendOutcome::Appended(self.last_index))
    }

    /// Discards every entry after `index`.
    ///
    /// An `index` below the segment's first index empties the segment.
    ///
    /// # Errors
    ///
    /// Fails if storage cannot be read or written.
    pub fn truncate(&mut self, index: u64) -> CoreResult<()> {
        if index >= self.last_index {
            return Ok(());
        }

        let first_index = self.segment.first_index();
        if index < first_index {
            self.segment.index().write().truncate(0);
            self.position = DESCRIPTOR_BYTES;
            self.last_index = first_index - 1;
        } else {
            self.segment.index().write().truncate(index);
            self.reset(index)?;
        }
        self.writer.write_empty_header(self.position)?;
        self.segment.mark_truncated();
        Ok(())
    }

    /// Replays entries from the closest indexed position at or before
    /// `index`, keeping at most those up to `index`, and re-records their
    /// positions in the segment's index.
    ///
    /// # Errors
    ///
    /// Fails if storage cannot be read.
    pub fn reset(&mut self, index: u64) -> CoreResult<()> {
        let first_index = self.segment.first_index();
        let start = self.segment.lookup(index);
        let (mut position, mut last_index) = match start {
            Some(found) => (found.position as usize, found.index - 1),
            None => (DESCRIPTOR_BYTES, first_index - 1),
        };

        let capacity = self.segment.capacity();
        let max_entry_size = self.segment.options().max_entry_size;
        self.reader.invalidate_cache();

        let mut sparse = self.segment.index().write();
        sparse.truncate(last_index);
        while last_index < index {
            let Some((len, ())) =
                read_frame(&mut self.reader, position, capacity, max_entry_size, |_| ())?
            else {
                break;
            };
            last_index += 1;
            sparse.record(last_index, position as u32);
            position += len;
        }
        drop(sparse);

        self.position = position;
        self.last_index = last_index;
        Ok(())
    }

    /// Replays the whole segment and clears a torn tail.
    pub(crate) fn recover(&mut self) -> CoreResult<()> {
        self.reset(u64::MAX)?;

        let capacity = self.segment.capacity();
        if self.position + ENTRY_HEADER_BYTES <= capacity {
            let torn = self
                .reader
                .read(self.position, ENTRY_HEADER_BYTES)?
                .iter()
                .any(|&b| b != 0);
            if torn {
                tracing::warn!(
                    segment = self.segment.id(),
                    position = self.position,
                    last_index = self.last_index,
                    "discarding torn entry after last valid entry"
                );
                self.writer.write_empty_header(self.position)?;
                self.writer.flush()?;
            }
        }
        Ok(())
    }

    /// Forces appended entries to stable storage.
    ///
    /// # Errors
    ///
    /// Fails if the sync fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and closes the storage writer, returning the next position.
    pub(crate) fn close(mut self) -> CoreResult<usize> {
        self.writer.close()?;
        Ok(self.position)
    }
}

impl fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("segment", &self.segment.id())
            .field("position", &self.position)
            .field("last_index", &self.last_index)
            .finish_non_exhaustive()
    }
}
