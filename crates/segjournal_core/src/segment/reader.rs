//! Reading a segment.

use super::store::Segment;
use super::read_frame;
use crate::codec::DESCRIPTOR_BYTES;
use crate::error::{CoreError, CoreResult};
use crate::types::{Entry, ReaderId};
use bytes::Bytes;
use segjournal_storage::{AccessReader, FileReader};
use std::fmt;
use std::sync::Arc;

/// A restartable forward cursor over one segment.
///
/// The reader looks one entry ahead: [`SegmentReader::has_next`] decodes the
/// next entry and keeps it until [`SegmentReader::next_entry`] hands it out.
/// A missing, oversized or corrupt frame means there is no next entry yet.
pub struct SegmentReader {
    /// Id the segment knows this reader by.
    id: ReaderId,
    /// Segment being read.
    segment: Arc<Segment>,
    /// Storage reader for this activation.
    reader: AccessReader,
    /// Position of the next frame.
    position: usize,
    /// Index of the entry at `position`.
    next_index: u64,
    /// Last entry returned.
    current: Option<Entry>,
    /// Decoded entry at `position` and its framed length.
    peeked: Option<(Entry, usize)>,
    /// Segment truncation epoch the cached bytes belong to.
    epoch: u64,
}

impl SegmentReader {
    pub(crate) fn new(id: ReaderId, segment: Arc<Segment>, reader: AccessReader) -> Self {
        let next_index = segment.first_index();
        let epoch = segment.truncation_epoch();
        Self {
            id,
            segment,
            reader,
            position: DESCRIPTOR_BYTES,
            next_index,
            current: None,
            peeked: None,
            epoch,
        }
    }

    /// Returns the reader id.
    #[must_use]
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// Returns the segment being read.
    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns the first index of the segment.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.segment.first_index()
    }

    /// Returns the index of the last entry returned, or `first_index - 1`.
    #[must_use]
    pub fn current_index(&self) -> u64 {
        self.next_index - 1
    }

    /// Returns the last entry returned.
    #[must_use]
    pub fn current_entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    /// Returns the index of the next entry.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Returns true if another entry can be read.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentClosed`] once the segment is closed, or a
    /// storage error.
    pub fn has_next(&mut self) -> CoreResult<bool> {
        let epoch = self.segment.truncation_epoch();
        if epoch != self.epoch {
            // Bytes past the cut may have been rewritten.
            self.epoch = epoch;
            self.peeked = None;
            self.reader.invalidate_cache();
        }
        if self.peeked.is_some() {
            return Ok(true);
        }
        if !self.segment.is_open() {
            return Err(CoreError::SegmentClosed);
        }

        let mut peeked = self.read_next()?;
        if peeked.is_none() && matches!(self.reader, AccessReader::Disk(_)) {
            // The window may predate the writer's latest commit.
            self.reader.invalidate_cache();
            peeked = self.read_next()?;
        }
        self.peeked = peeked;
        Ok(self.peeked.is_some())
    }

    /// Returns the next entry, or `None` if there is none yet.
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::has_next`].
    pub fn next_entry(&mut self) -> CoreResult<Option<Entry>> {
        if !self.has_next()? {
            return Ok(None);
        }
        let Some((entry, len)) = self.peeked.take() else {
            return Ok(None);
        };
        self.position += len;
        self.next_index += 1;
        self.current = Some(entry.clone());
        Ok(Some(entry))
    }

    /// Rewinds to the first entry of the segment.
    pub fn reset(&mut self) {
        self.position = DESCRIPTOR_BYTES;
        self.next_index = self.segment.first_index();
        self.current = None;
        self.peeked = None;
        self.epoch = self.segment.truncation_epoch();
        self.reader.invalidate_cache();
    }

    /// Positions the reader so the next entry returned is `index`.
    ///
    /// Starts from the closest indexed entry before `index` and scans
    /// forward. If the segment ends first, the reader stops at its end.
    ///
    /// # Errors
    ///
    /// See [`SegmentReader::has_next`].
    pub fn reset_to(&mut self, index: u64) -> CoreResult<()> {
        self.reset();
        if index <= self.segment.first_index() {
            return Ok(());
        }

        if let Some(found) = self.segment.lookup(index - 1) {
            self.position = found.position as usize;
            self.next_index = found.index;
        }
        while self.next_index < index {
            if self.next_entry()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn read_next(&mut self) -> CoreResult<Option<(Entry, usize)>> {
        let index = self.next_index;
        let frame = read_frame(
            &mut self.reader,
            self.position,
            self.segment.capacity(),
            self.segment.options().max_entry_size,
            |payload| Entry::new(index, Bytes::copy_from_slice(payload)),
        )?;
        Ok(frame.map(|(len, entry)| (entry, len)))
    }
}

impl fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentReader")
            .field("id", &self.id)
            .field("segment", &self.segment.id())
            .field("position", &self.position)
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if let Err(err) = self.segment.close_reader(self.id) {
            tracing::warn!(reader = %self.id, segment = self.segment.id(), %err, "failed to release segment reader");
        }
    }
}
