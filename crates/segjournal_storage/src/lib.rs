//! # SegJournal Storage
//!
//! File access backends for SegJournal segment files.
//!
//! This crate provides the lowest-level storage abstraction for SegJournal.
//! A [`FileAccess`] is an **opaque byte store** over one preallocated
//! segment file. It does not interpret entry frames or descriptors.
//!
//! ## Design Principles
//!
//! - One access per segment activation, shared by one writer and any number
//!   of readers
//! - Reads return exactly the requested bytes or fail
//! - Writes are two-phase: fill a region, then commit it
//! - Any I/O failure is fatal and reported as a [`StorageError`]
//!
//! ## Available Backends
//!
//! - [`StorageLevel::Disk`] - positioned I/O with a private window per reader
//! - [`StorageLevel::Mapped`] - one shared memory mapping of the file
//!
//! ## Example
//!
//! ```rust
//! use segjournal_storage::{FileAccess, FileReader, FileWriter, StorageLevel};
//!
//! let file = tempfile::tempfile().unwrap();
//! file.set_len(4096).unwrap();
//!
//! let access = FileAccess::open(&file, StorageLevel::Disk, 4096).unwrap();
//! let mut writer = access.new_writer();
//! let mut region = writer.start_write(64, 5).unwrap();
//! region.copy_from_slice(b"hello");
//! drop(region);
//! writer.commit_write(64, 5).unwrap();
//!
//! let mut reader = access.new_reader();
//! assert_eq!(&*reader.read(64, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod disk;
mod error;
mod level;
mod mapped;

pub use access::{
    AccessReader, AccessWriter, FileAccess, FileReader, FileWriter, ReadRegion, WriteRegion,
    ENTRY_HEADER_BYTES,
};
pub use disk::{DiskAccess, DiskFileReader, DiskFileWriter};
pub use error::{StorageError, StorageResult};
pub use level::StorageLevel;
pub use mapped::{MappedAccess, MappedFileReader, MappedFileWriter};
