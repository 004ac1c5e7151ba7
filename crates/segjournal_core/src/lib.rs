//! # SegJournal Core
//!
//! Segmented append-only journal engine.
//!
//! This crate provides:
//! - Entry framing with CRC-32 checksums
//! - Preallocated segment files with a fixed 64-byte descriptor
//! - Sparse in-memory position indexes
//! - A journal of segments with one writer and many readers
//! - Truncation, reset, commit tracking and whole-segment compaction
//! - Offline scanning for inspection tools
//!
//! ## Example
//!
//! ```rust
//! use segjournal_core::{Journal, JournalConfig, ReaderMode};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let journal = Journal::open(JournalConfig::new(dir.path())).unwrap();
//!
//! let index = journal.writer().unwrap().append(b"hello").unwrap();
//! assert_eq!(index, 1);
//!
//! let mut reader = journal.open_reader(1, ReaderMode::All).unwrap();
//! let entry = reader.try_next().unwrap().unwrap();
//! assert_eq!(&entry.data()[..], b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod dir;
mod error;
pub mod index;
pub mod journal;
pub mod scan;
pub mod segment;
mod types;

pub use codec::SegmentDescriptor;
pub use config::JournalConfig;
pub use error::{CoreError, CoreResult};
pub use journal::{Journal, JournalReader, JournalWriter};
pub use scan::{scan_journal, scan_segment, JournalScan, ScanIssue, SegmentReport};
pub use segment::{Segment, SegmentOptions};
pub use segjournal_storage::StorageLevel;
pub use types::{Entry, ReaderId, ReaderMode};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
