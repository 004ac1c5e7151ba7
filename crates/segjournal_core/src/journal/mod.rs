//! The segmented journal.
//!
//! A [`Journal`] is an ordered set of segments keyed by first index. It hands
//! out one [`JournalWriter`] at a time and any number of [`JournalReader`]s.
//!
//! ```rust
//! use segjournal_core::{Journal, JournalConfig, ReaderMode};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let journal = Journal::open(JournalConfig::new(dir.path()).max_segment_size(4096)).unwrap();
//!
//! {
//!     let mut writer = journal.writer().unwrap();
//!     assert_eq!(writer.append(b"first").unwrap(), 1);
//!     assert_eq!(writer.append(b"second").unwrap(), 2);
//!     writer.commit(1).unwrap();
//! }
//!
//! let reader = journal.open_reader(1, ReaderMode::Commits).unwrap();
//! let entries: Vec<_> = reader.map(Result::unwrap).collect();
//! assert_eq!(entries.len(), 1);
//! assert_eq!(&entries[0].data()[..], b"first");
//! ```

mod reader;
mod registry;
mod segmented;
mod writer;

pub use reader::JournalReader;
pub use segmented::Journal;
pub use writer::JournalWriter;

/// New segments are only created while this many segments' worth of disk
/// space remains available.
pub const SEGMENT_BUFFER_FACTOR: u64 = 3;
