//! Test fixtures and journal helpers.
//!
//! Provides temporary journals for both storage levels, sized so that a
//! handful of entries already spans several segments.

use segjournal_core::{Entry, Journal, JournalConfig, ReaderMode, StorageLevel};
use std::path::Path;
use tempfile::TempDir;

/// Both storage levels, for tests that run against each.
pub const LEVELS: [StorageLevel; 2] = [StorageLevel::Disk, StorageLevel::Mapped];

/// Segment size used by fixtures. Holds ten [`payload`] entries.
pub const SMALL_SEGMENT_SIZE: u32 = 256;

/// Entry size limit used by fixtures.
pub const SMALL_ENTRY_SIZE: u32 = 64;

/// Number of [`payload`] entries that fit in one fixture segment.
pub const ENTRIES_PER_SEGMENT: u64 = 10;

/// The payload fixtures write at `index`: `entry-NNNN`, ten bytes for
/// indices below 10000.
pub fn payload(index: u64) -> Vec<u8> {
    format!("entry-{index:04}").into_bytes()
}

/// Returns the fixture configuration rooted at `directory`.
pub fn small_config(directory: &Path, level: StorageLevel) -> JournalConfig {
    JournalConfig::new(directory)
        .storage_level(level)
        .max_segment_size(SMALL_SEGMENT_SIZE)
        .max_entry_size(SMALL_ENTRY_SIZE)
        .index_density(0.25)
}

/// A journal in a temporary directory, deleted on drop.
pub struct TestJournal {
    /// The journal instance.
    pub journal: Journal,
    /// Configuration used to open it.
    pub config: JournalConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestJournal {
    /// Creates a journal with small segments at `level`.
    pub fn new(level: StorageLevel) -> Self {
        Self::with_config(level, |config| config)
    }

    /// Creates a disk-backed journal with small segments.
    pub fn disk() -> Self {
        Self::new(StorageLevel::Disk)
    }

    /// Creates a memory-mapped journal with small segments.
    pub fn mapped() -> Self {
        Self::new(StorageLevel::Mapped)
    }

    /// Creates a journal from the small configuration adjusted by `f`.
    pub fn with_config(
        level: StorageLevel,
        f: impl FnOnce(JournalConfig) -> JournalConfig,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = f(small_config(temp_dir.path(), level));
        let journal = Journal::open(config.clone()).expect("Failed to open journal");
        Self {
            journal,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the journal directory.
    pub fn path(&self) -> &Path {
        &self.config.directory
    }

    /// Closes the journal and opens it again from disk.
    pub fn reopen(&mut self) {
        self.journal.close().expect("Failed to close journal");
        self.journal = Journal::open(self.config.clone()).expect("Failed to reopen journal");
    }

    /// Closes the journal and runs `f` on the directory before reopening it.
    pub fn reopen_after(&mut self, f: impl FnOnce(&JournalConfig)) {
        self.journal.close().expect("Failed to close journal");
        f(&self.config);
        self.journal = Journal::open(self.config.clone()).expect("Failed to reopen journal");
    }

    /// Appends `count` [`payload`] entries and returns their indices.
    pub fn fill(&self, count: u64) -> Vec<u64> {
        let mut writer = self.journal.writer().expect("Failed to acquire writer");
        (0..count)
            .map(|_| {
                let index = writer.next_index();
                writer.append(&payload(index)).expect("Failed to append")
            })
            .collect()
    }

    /// Reads every retained entry.
    pub fn read_all(&self) -> Vec<Entry> {
        let first_index = self.journal.first_index().expect("Failed to read first index");
        self.journal
            .open_reader(first_index, ReaderMode::All)
            .expect("Failed to open reader")
            .map(|entry| entry.expect("Failed to read entry"))
            .collect()
    }

    /// Asserts that the journal holds exactly the [`payload`] entries in
    /// `first..=last`.
    pub fn assert_payloads(&self, first: u64, last: u64) {
        let entries = self.read_all();
        let indices: Vec<u64> = entries.iter().map(Entry::index).collect();
        assert_eq!(indices, (first..=last).collect::<Vec<_>>());
        for entry in entries {
            assert_eq!(
                entry.data().to_vec(),
                payload(entry.index()),
                "payload mismatch at {}",
                entry.index()
            );
        }
    }
}

impl std::ops::Deref for TestJournal {
    type Target = Journal;

    fn deref(&self) -> &Self::Target {
        &self.journal
    }
}

/// Runs `f` against a fresh small journal at each storage level.
///
/// # Example
///
/// ```rust
/// use segjournal_testkit::{for_each_level, ENTRIES_PER_SEGMENT};
///
/// for_each_level(|journal| {
///     journal.fill(ENTRIES_PER_SEGMENT + 1);
///     assert_eq!(journal.segment_count(), 2);
/// });
/// ```
pub fn for_each_level(mut f: impl FnMut(&mut TestJournal)) {
    for level in LEVELS {
        let mut journal = TestJournal::new(level);
        f(&mut journal);
    }
}
