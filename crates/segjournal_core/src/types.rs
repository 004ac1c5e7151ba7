//! Core type definitions for SegJournal.

use bytes::Bytes;
use std::fmt;

/// A journal entry: an opaque payload and the index it was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    index: u64,
    data: Bytes,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(index: u64, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    /// Returns the entry's index.
    #[must_use]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Returns the payload bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the entry and returns its payload.
    #[must_use]
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Returns the payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry:{} ({} bytes)", self.index, self.data.len())
    }
}

/// Opaque identifier of an open journal reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReaderId(pub u64);

impl ReaderId {
    /// Creates a reader ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reader:{}", self.0)
    }
}

/// Which entries a journal reader exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReaderMode {
    /// Every appended entry.
    #[default]
    All,
    /// Only entries at or below the commit index.
    Commits,
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Commits => f.write_str("commits"),
        }
    }
}
