//! Storage level selection.

use std::fmt;
use std::str::FromStr;

/// Selects how segment files are accessed while a segment is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageLevel {
    /// Positioned reads and writes through a file handle, with a private
    /// read window per reader.
    #[default]
    Disk,
    /// One shared memory mapping of the whole segment file.
    Mapped,
}

impl StorageLevel {
    /// Returns the lowercase name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Mapped => "mapped",
        }
    }
}

impl fmt::Display for StorageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "mapped" | "mmap" => Ok(Self::Mapped),
            other => Err(format!("unknown storage level: {other}")),
        }
    }
}
