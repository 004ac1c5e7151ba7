//! Error types for SegJournal core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in journal operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error. Always fatal for the segment involved.
    #[error("storage error: {0}")]
    Storage(#[from] segjournal_storage::StorageError),

    /// I/O error outside of segment access (directory, descriptor, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Entry payload exceeds the configured or physical limit.
    #[error("entry too large: {size} bytes exceeds limit of {limit} bytes")]
    EntryTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum accepted payload size.
        limit: usize,
    },

    /// Empty payloads cannot be framed; a zero length marks the end of a segment.
    #[error("entry payload must not be empty")]
    EmptyEntry,

    /// Not enough usable disk space to allocate another segment.
    #[error("out of disk space: {available} bytes available, {required} required")]
    OutOfDiskSpace {
        /// Usable bytes on the journal's file system.
        available: u64,
        /// Bytes required before a new segment may be created.
        required: u64,
    },

    /// Index operation outside the permitted range.
    #[error("index out of range: {message}")]
    IndexOutOfRange {
        /// Description of the violated bound.
        message: String,
    },

    /// The journal has been closed.
    #[error("journal not open")]
    JournalClosed,

    /// The segment has been closed.
    #[error("segment not open")]
    SegmentClosed,

    /// Another process holds the journal's directory lock.
    #[error("journal locked: another process has exclusive access")]
    JournalLocked,

    /// Segment file or descriptor is not in a recognized format.
    #[error("invalid journal format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected setting.
        message: String,
    },
}

impl CoreError {
    /// Creates an entry too large error.
    pub fn entry_too_large(size: usize, limit: usize) -> Self {
        Self::EntryTooLarge { size, limit }
    }

    /// Creates an index out of range error.
    pub fn index_out_of_range(message: impl Into<String>) -> Self {
        Self::IndexOutOfRange {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
