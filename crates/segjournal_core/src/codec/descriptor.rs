//! The 64-byte segment descriptor.
//!
//! ```text
//! offset  size  field
//! 0       4     version
//! 4       8     id
//! 12      8     first index
//! 20      4     max segment size
//! 24      4     max entries (legacy, written as 0)
//! 28      8     updated (unix millis)
//! 36      1     locked
//! 37      27    reserved (zero)
//! ```

use crate::error::{CoreError, CoreResult};
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of the descriptor at the start of every segment file.
pub const DESCRIPTOR_BYTES: usize = 64;

/// Descriptor format version written by this crate.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Immutable metadata of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Format version.
    pub version: u32,
    /// Segment id, increasing in creation order.
    pub id: u64,
    /// Index of the first entry in the segment.
    pub first_index: u64,
    /// Size of the segment file, descriptor included.
    pub max_segment_size: u32,
    /// Legacy entry limit. Written as zero and ignored on read.
    pub max_entries: u32,
    /// Creation time in unix milliseconds.
    pub updated: i64,
    /// Legacy lock flag.
    pub locked: bool,
}

impl SegmentDescriptor {
    /// Creates a descriptor for a new segment stamped with the current time.
    #[must_use]
    pub fn new(id: u64, first_index: u64, max_segment_size: u32) -> Self {
        let updated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default();
        Self {
            version: DESCRIPTOR_VERSION,
            id,
            first_index,
            max_segment_size,
            max_entries: 0,
            updated,
            locked: false,
        }
    }

    /// Serializes the descriptor.
    #[must_use]
    pub fn encode(&self) -> [u8; DESCRIPTOR_BYTES] {
        let mut buf = [0u8; DESCRIPTOR_BYTES];
        buf[0..4].copy_from_slice(&self.version.to_be_bytes());
        buf[4..12].copy_from_slice(&self.id.to_be_bytes());
        buf[12..20].copy_from_slice(&self.first_index.to_be_bytes());
        buf[20..24].copy_from_slice(&self.max_segment_size.to_be_bytes());
        buf[24..28].copy_from_slice(&self.max_entries.to_be_bytes());
        buf[28..36].copy_from_slice(&self.updated.to_be_bytes());
        buf[36] = u8::from(self.locked);
        buf
    }

    /// Parses and validates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the buffer is too short, the
    /// version is unknown, or a field is out of range.
    pub fn decode(buf: &[u8]) -> CoreResult<Self> {
        if buf.len() < DESCRIPTOR_BYTES {
            return Err(CoreError::invalid_format(format!(
                "descriptor truncated: {} of {DESCRIPTOR_BYTES} bytes",
                buf.len()
            )));
        }

        let version = read_u32(buf, 0);
        if version != DESCRIPTOR_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported descriptor version {version}"
            )));
        }

        let id = read_u64(buf, 4);
        let first_index = read_u64(buf, 12);
        // Both fields are signed on disk.
        if id == 0 || id > i64::MAX as u64 {
            return Err(CoreError::invalid_format(format!("invalid segment id {id}")));
        }
        if first_index == 0 || first_index > i64::MAX as u64 {
            return Err(CoreError::invalid_format(format!(
                "invalid first index {first_index}"
            )));
        }

        let max_segment_size = read_u32(buf, 20);
        if max_segment_size as usize <= DESCRIPTOR_BYTES {
            return Err(CoreError::invalid_format(format!(
                "invalid max segment size {max_segment_size}"
            )));
        }

        Ok(Self {
            version,
            id,
            first_index,
            max_segment_size,
            max_entries: read_u32(buf, 24),
            updated: read_u64(buf, 28) as i64,
            locked: buf[36] != 0,
        })
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(bytes)
}
