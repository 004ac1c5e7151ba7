//! Segments: one file, one sparse index, shared access for one writer and
//! many readers.
//!
//! A segment's storage is activated lazily. The first writer or reader opens
//! a [`FileAccess`](segjournal_storage::FileAccess) over the file and the
//! last one to leave closes it again:
//!
//! ```text
//! Inactive { position } --acquire--> Active { access, references, position }
//!        ^                                            |
//!        +------------- release (references == 0) ----+
//! ```

mod file;
mod reader;
mod store;
mod writer;

pub use file::SegmentFile;
pub use reader::SegmentReader;
pub use store::Segment;
pub use writer::{AppendOutcome, SegmentWriter};

pub(crate) use file::read_descriptor;

use crate::codec::{decode, Decoded, ENTRY_HEADER_BYTES};
use crate::config::JournalConfig;
use segjournal_storage::{FileReader, StorageLevel, StorageResult};

/// Per-segment settings derived from the journal configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    /// Backend used while the segment is active.
    pub storage_level: StorageLevel,
    /// Maximum payload size accepted and decoded.
    pub max_entry_size: usize,
    /// Sparse index density.
    pub index_density: f64,
}

impl From<&JournalConfig> for SegmentOptions {
    fn from(config: &JournalConfig) -> Self {
        Self {
            storage_level: config.storage_level,
            max_entry_size: config.max_entry_size as usize,
            index_density: config.index_density,
        }
    }
}

/// Reads the frame at `position` and hands its payload to `f`.
///
/// Returns the framed length along with `f`'s result, or `None` if there is
/// no valid entry at `position`: a zero or oversized length, a frame running
/// past `capacity`, or a checksum mismatch.
pub(crate) fn read_frame<R, T>(
    reader: &mut R,
    position: usize,
    capacity: usize,
    max_entry_size: usize,
    f: impl FnOnce(&[u8]) -> T,
) -> StorageResult<Option<(usize, T)>>
where
    R: FileReader + ?Sized,
{
    if position.saturating_add(ENTRY_HEADER_BYTES) > capacity {
        return Ok(None);
    }

    let needed = match decode(&reader.read(position, ENTRY_HEADER_BYTES)?, max_entry_size) {
        Decoded::Incomplete { needed } => needed,
        Decoded::Invalid | Decoded::Frame(_) => return Ok(None),
    };
    if position.saturating_add(needed) > capacity {
        return Ok(None);
    }

    let region = reader.read(position, needed)?;
    match decode(&region, max_entry_size) {
        Decoded::Frame(frame) if frame.is_intact() => Ok(Some((needed, f(frame.payload)))),
        _ => Ok(None),
    }
}
