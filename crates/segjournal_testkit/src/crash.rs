//! Crash recovery testing for SegJournal.
//!
//! A crash leaves the newest segment in one of a few recognizable states.
//! This module reproduces those states on a closed journal's files and
//! checks what survives the next open.
//!
//! ## Usage
//!
//! ```rust
//! use segjournal_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//! use segjournal_core::StorageLevel;
//!
//! let result = CrashRecoveryHarness::new(StorageLevel::Disk).run(CrashPoint::TornHeader, 15);
//! assert!(result.passed, "{result:?}");
//! ```

use crate::fixtures::{payload, TestJournal};
use segjournal_core::codec::{encode, DESCRIPTOR_BYTES, ENTRY_HEADER_BYTES};
use segjournal_core::dir::list_segment_files;
use segjournal_core::scan::scan_segment;
use segjournal_core::{JournalConfig, StorageLevel};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// States a crash can leave the newest segment in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The empty header after the last entry has a stray checksum.
    TornHeader,
    /// A frame was written but only part of its payload reached disk.
    PartialPayload,
    /// The last entry's payload was damaged after being written.
    CorruptLastEntry,
    /// The preallocated tail of the file was lost.
    ShortFile,
    /// A new segment was created but its descriptor never reached disk.
    MissingDescriptor,
}

impl CrashPoint {
    /// All crash points.
    pub const ALL: [CrashPoint; 5] = [
        CrashPoint::TornHeader,
        CrashPoint::PartialPayload,
        CrashPoint::CorruptLastEntry,
        CrashPoint::ShortFile,
        CrashPoint::MissingDescriptor,
    ];

    /// Returns how many of `written` entries survive this crash.
    pub fn surviving(self, written: u64) -> u64 {
        match self {
            CrashPoint::CorruptLastEntry => written.saturating_sub(1),
            _ => written,
        }
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// What was tested.
    pub crash_point: CrashPoint,
    /// Expected entries after recovery.
    pub expected_entries: u64,
    /// Actual entries after recovery.
    pub actual_entries: u64,
    /// Any error message.
    pub error: Option<String>,
}

/// Writes entries, injects a crash state, reopens and checks the journal.
#[derive(Debug, Clone, Copy)]
pub struct CrashRecoveryHarness {
    level: StorageLevel,
}

impl CrashRecoveryHarness {
    /// Creates a harness using small segments at `level`.
    pub fn new(level: StorageLevel) -> Self {
        Self { level }
    }

    /// Writes `count` entries, injects `point` and verifies recovery.
    ///
    /// After recovery the surviving entries must read back intact and the
    /// next append must continue right after them.
    pub fn run(&self, point: CrashPoint, count: u64) -> CrashRecoveryResult {
        let mut journal = TestJournal::new(self.level);
        journal.fill(count);

        let mut injected = Ok(());
        journal.reopen_after(|config| injected = inject(config, point));
        let expected = point.surviving(count);
        let mut result = CrashRecoveryResult {
            passed: false,
            crash_point: point,
            expected_entries: expected,
            actual_entries: 0,
            error: None,
        };
        if let Err(err) = injected {
            result.error = Some(format!("injection failed: {err}"));
            return result;
        }

        let entries = journal.read_all();
        result.actual_entries = entries.len() as u64;
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.data().to_vec() != payload(entry.index()))
        {
            result.error = Some(format!("entry {} has the wrong payload", entry.index()));
            return result;
        }
        if result.actual_entries != expected {
            result.error = Some(format!(
                "expected {expected} entries, found {}",
                result.actual_entries
            ));
            return result;
        }

        let next = journal
            .writer()
            .and_then(|mut writer| writer.append(&payload(expected + 1)));
        match next {
            Ok(index) if index == expected + 1 => result.passed = true,
            Ok(index) => result.error = Some(format!("next append got index {index}")),
            Err(err) => result.error = Some(format!("next append failed: {err}")),
        }
        result
    }

    /// Runs every crash point.
    pub fn run_all(&self, count: u64) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL
            .iter()
            .map(|&point| self.run(point, count))
            .collect()
    }
}

/// Applies `point` to the newest segment of the closed journal `config`
/// describes.
///
/// # Errors
///
/// Returns an error if the files cannot be read or written.
pub fn inject(config: &JournalConfig, point: CrashPoint) -> std::io::Result<()> {
    let last = last_segment_path(config)?;
    let max_entry_size = config.max_entry_size as usize;
    let report = scan_segment(&last, max_entry_size).map_err(std::io::Error::other)?;
    let tail = report.valid_bytes as u64;

    match point {
        CrashPoint::TornHeader => overwrite(&last, tail + 4, &[0xde, 0xad, 0xbe, 0xef]),
        CrashPoint::PartialPayload => {
            let frame = encode(&payload(report.last_index() + 1)).map_err(std::io::Error::other)?;
            overwrite(&last, tail, &frame[..ENTRY_HEADER_BYTES + 4])
        }
        CrashPoint::CorruptLastEntry => {
            let last_entry = tail
                .checked_sub(payload(report.last_index()).len() as u64)
                .filter(|&position| position > DESCRIPTOR_BYTES as u64)
                .ok_or_else(|| std::io::Error::other("no entry to corrupt"))?;
            overwrite(&last, last_entry, b"X")
        }
        CrashPoint::ShortFile => OpenOptions::new().write(true).open(&last)?.set_len(tail),
        CrashPoint::MissingDescriptor => {
            let id = report.descriptor.id + 1;
            fs::write(config.segment_path(id), [0u8; DESCRIPTOR_BYTES / 2])
        }
    }
}

/// Writes `bytes` at `position` in `path` and syncs.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn overwrite(path: &Path, position: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(position))?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn last_segment_path(config: &JournalConfig) -> std::io::Result<PathBuf> {
    list_segment_files(&config.directory, &config.name)
        .map_err(std::io::Error::other)?
        .pop()
        .map(|file| file.path)
        .ok_or_else(|| std::io::Error::other("journal has no segments"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ENTRIES_PER_SEGMENT, LEVELS};

    #[test]
    fn every_crash_point_recovers() {
        for level in LEVELS {
            for result in CrashRecoveryHarness::new(level).run_all(ENTRIES_PER_SEGMENT + 5) {
                assert!(result.passed, "{level}: {result:?}");
            }
        }
    }

    #[test]
    fn crash_in_first_segment_recovers() {
        let harness = CrashRecoveryHarness::new(StorageLevel::Disk);
        for point in [
            CrashPoint::TornHeader,
            CrashPoint::PartialPayload,
            CrashPoint::CorruptLastEntry,
        ] {
            let result = harness.run(point, 3);
            assert!(result.passed, "{result:?}");
        }
    }

    #[test]
    fn corrupting_the_only_entry_leaves_an_empty_journal() {
        let result = CrashRecoveryHarness::new(StorageLevel::Mapped)
            .run(CrashPoint::CorruptLastEntry, 1);
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual_entries, 0);
    }

    #[test]
    fn injection_needs_segments() {
        let dir = tempfile::tempdir().unwrap();
        let config = JournalConfig::new(dir.path());
        assert!(inject(&config, CrashPoint::TornHeader).is_err());
    }
}
