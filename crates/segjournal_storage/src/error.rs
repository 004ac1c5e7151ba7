//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while accessing a segment file.
///
/// Every variant is fatal to the operation that produced it. Callers above
/// this layer never retry; they surface the error and leave their own state
/// as it was before the call.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file returned fewer bytes than requested.
    ///
    /// Segment files are preallocated, so this indicates corruption below
    /// the entry checksum layer.
    #[error("short read at position {position}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// The requested read position.
        position: usize,
        /// The number of bytes requested.
        expected: usize,
        /// The number of bytes actually available.
        actual: usize,
    },

    /// The requested range lies outside the file.
    #[error("range out of bounds: position {position}, len {len}, capacity {capacity}")]
    OutOfBounds {
        /// The requested position.
        position: usize,
        /// The requested length.
        len: usize,
        /// The size of the file.
        capacity: usize,
    },

    /// The writer has been closed.
    #[error("file access is closed")]
    Closed,
}
