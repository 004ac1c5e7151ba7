//! Offline inspection of segment files.
//!
//! Scanning reads files directly without taking the directory lock or
//! repairing anything, so it is safe to run against a journal that another
//! process has open. Results may then trail the live journal.

use crate::codec::{decode, Decoded, SegmentDescriptor, DESCRIPTOR_BYTES, ENTRY_HEADER_BYTES};
use crate::dir::list_segment_files;
use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};

/// Why a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    /// An all-zero header follows the last entry.
    Clean,
    /// No room remains for another header.
    Full,
    /// A header with a zero length but non-zero checksum.
    TornHeader,
    /// A length above the entry size limit.
    OversizedLength,
    /// A frame extending past the end of the segment.
    Truncated,
    /// A frame whose checksum does not match its payload.
    ChecksumMismatch,
}

impl ScanEnd {
    /// Returns true if the segment ended without damage.
    #[must_use]
    pub fn is_clean(self) -> bool {
        matches!(self, Self::Clean | Self::Full)
    }

    /// Returns a short description.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Full => "full",
            Self::TornHeader => "torn header",
            Self::OversizedLength => "length above entry limit",
            Self::Truncated => "frame past end of segment",
            Self::ChecksumMismatch => "checksum mismatch",
        }
    }
}

/// An entry found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Entry index.
    pub index: u64,
    /// Byte offset of the frame within the file.
    pub position: usize,
    /// Payload.
    pub data: Bytes,
}

/// Summary of one segment file.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    /// File scanned.
    pub path: PathBuf,
    /// Decoded descriptor.
    pub descriptor: SegmentDescriptor,
    /// Actual file length.
    pub file_len: u64,
    /// Number of valid entries.
    pub entry_count: u64,
    /// Offset just past the last valid entry.
    pub valid_bytes: usize,
    /// Why the scan stopped.
    pub end: ScanEnd,
}

impl SegmentReport {
    /// Returns the first index covered by the segment.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.descriptor.first_index
    }

    /// Returns the index of the last valid entry, or `first_index - 1`.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.descriptor.first_index + self.entry_count - 1
    }
}

/// A problem found across the segments of a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanIssue {
    /// A segment file whose descriptor cannot be decoded.
    Unreadable {
        /// File path.
        path: PathBuf,
        /// Decoding error.
        message: String,
    },
    /// Two segments starting at the same index.
    DuplicateFirstIndex {
        /// Shared first index.
        first_index: u64,
        /// Older segment id.
        older: u64,
        /// Newer segment id.
        newer: u64,
    },
    /// A segment that does not continue from its predecessor.
    Misaligned {
        /// Segment id.
        id: u64,
        /// Index the segment should start at.
        expected: u64,
        /// Index it starts at.
        actual: u64,
    },
    /// A segment whose entries end in damaged data.
    DamagedTail {
        /// Segment id.
        id: u64,
        /// Offset of the damaged frame.
        position: usize,
        /// What was found.
        end: ScanEnd,
    },
    /// A file whose length differs from its descriptor's segment size.
    SizeMismatch {
        /// Segment id.
        id: u64,
        /// Size recorded in the descriptor.
        expected: u64,
        /// Actual file length.
        actual: u64,
    },
}

impl std::fmt::Display for ScanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable { path, message } => {
                write!(f, "{}: unreadable descriptor: {message}", path.display())
            }
            Self::DuplicateFirstIndex {
                first_index,
                older,
                newer,
            } => write!(
                f,
                "segments {older} and {newer} both start at index {first_index}"
            ),
            Self::Misaligned {
                id,
                expected,
                actual,
            } => write!(
                f,
                "segment {id} starts at index {actual}, expected {expected}"
            ),
            Self::DamagedTail { id, position, end } => {
                write!(f, "segment {id}: {} at offset {position}", end.describe())
            }
            Self::SizeMismatch {
                id,
                expected,
                actual,
            } => write!(f, "segment {id} is {actual} bytes, expected {expected}"),
        }
    }
}

/// Summary of every segment file of one journal.
#[derive(Debug, Clone, Default)]
pub struct JournalScan {
    /// Readable segments in id order.
    pub segments: Vec<SegmentReport>,
    /// Problems found.
    pub issues: Vec<ScanIssue>,
}

impl JournalScan {
    /// Returns true if no issues were found.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns the total number of valid entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.segments.iter().map(|segment| segment.entry_count).sum()
    }
}

/// Scans one segment file, calling `visit` for each valid entry.
///
/// # Errors
///
/// Returns [`CoreError::InvalidFormat`] if the descriptor is unreadable, or
/// an I/O error.
pub fn scan_segment_with(
    path: &Path,
    max_entry_size: usize,
    mut visit: impl FnMut(ScannedEntry),
) -> CoreResult<SegmentReport> {
    let contents = Bytes::from(fs::read(path)?);
    let descriptor = SegmentDescriptor::decode(&contents).map_err(|err| match err {
        CoreError::InvalidFormat { message } => {
            CoreError::invalid_format(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;

    let capacity = contents.len().min(descriptor.max_segment_size as usize);
    let mut position = DESCRIPTOR_BYTES;
    let mut index = descriptor.first_index;
    let end = loop {
        let Some(header) = contents.get(position..position + ENTRY_HEADER_BYTES) else {
            break ScanEnd::Full;
        };
        if position + ENTRY_HEADER_BYTES > capacity {
            break ScanEnd::Full;
        }
        match decode(&contents[position..capacity], max_entry_size) {
            Decoded::Frame(frame) if frame.is_intact() => {
                let len = frame.framed_len();
                visit(ScannedEntry {
                    index,
                    position,
                    data: contents.slice(position + ENTRY_HEADER_BYTES..position + len),
                });
                position += len;
                index += 1;
            }
            Decoded::Frame(_) => break ScanEnd::ChecksumMismatch,
            Decoded::Incomplete { .. } => break ScanEnd::Truncated,
            Decoded::Invalid if header.iter().all(|&byte| byte == 0) => break ScanEnd::Clean,
            Decoded::Invalid if header[..4] == [0; 4] => break ScanEnd::TornHeader,
            Decoded::Invalid => break ScanEnd::OversizedLength,
        }
    };

    Ok(SegmentReport {
        path: path.to_path_buf(),
        descriptor,
        file_len: contents.len() as u64,
        entry_count: index - descriptor.first_index,
        valid_bytes: position,
        end,
    })
}

/// Scans one segment file.
///
/// # Errors
///
/// See [`scan_segment_with`].
pub fn scan_segment(path: &Path, max_entry_size: usize) -> CoreResult<SegmentReport> {
    scan_segment_with(path, max_entry_size, |_| {})
}

/// Scans every segment file of the journal `name` in `directory`.
///
/// Unreadable descriptors are reported as issues rather than errors.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or a file cannot be
/// read.
pub fn scan_journal(directory: &Path, name: &str, max_entry_size: usize) -> CoreResult<JournalScan> {
    let mut scan = JournalScan::default();
    for file in list_segment_files(directory, name)? {
        match scan_segment(&file.path, max_entry_size) {
            Ok(report) => scan.segments.push(report),
            Err(CoreError::InvalidFormat { message }) => scan.issues.push(ScanIssue::Unreadable {
                path: file.path,
                message,
            }),
            Err(err) => return Err(err),
        }
    }

    for report in &scan.segments {
        let expected = u64::from(report.descriptor.max_segment_size);
        if report.file_len != expected {
            scan.issues.push(ScanIssue::SizeMismatch {
                id: report.descriptor.id,
                expected,
                actual: report.file_len,
            });
        }
        if !report.end.is_clean() {
            scan.issues.push(ScanIssue::DamagedTail {
                id: report.descriptor.id,
                position: report.valid_bytes,
                end: report.end,
            });
        }
    }

    let mut ordered: Vec<&SegmentReport> = scan.segments.iter().collect();
    ordered.sort_by_key(|report| (report.first_index(), report.descriptor.id));
    let mut expected: Option<u64> = None;
    for pair in ordered.windows(2) {
        if pair[0].first_index() == pair[1].first_index() {
            scan.issues.push(ScanIssue::DuplicateFirstIndex {
                first_index: pair[0].first_index(),
                older: pair[0].descriptor.id,
                newer: pair[1].descriptor.id,
            });
        }
    }
    ordered.dedup_by_key(|report| report.first_index());
    for report in ordered {
        if let Some(expected) = expected.filter(|&expected| expected != report.first_index()) {
            scan.issues.push(ScanIssue::Misaligned {
                id: report.descriptor.id,
                expected,
                actual: report.first_index(),
            });
        }
        expected = Some(report.last_index() + 1);
    }

    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JournalConfig;
    use crate::journal::Journal;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::{tempdir, TempDir};

    fn write_journal(dir: &TempDir, count: u64) {
        let journal = Journal::open(
            JournalConfig::new(dir.path())
                .max_segment_size(256)
                .max_entry_size(64),
        )
        .unwrap();
        let mut writer = journal.writer().unwrap();
        for _ in 0..count {
            let index = writer.next_index();
            writer
                .append(format!("entry-{index:04}").as_bytes())
                .unwrap();
        }
        writer.flush().unwrap();
    }

    fn overwrite(path: &Path, position: u64, bytes: &[u8]) {
        let mut file = OpenOptions::new().write(true).open(path).unwrap();
        file.seek(SeekFrom::Start(position)).unwrap();
        file.write_all(bytes).unwrap();
        file.sync_all().unwrap();
    }

    #[test]
    fn healthy_journal() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 25);

        let scan = scan_journal(dir.path(), "journal", 64).unwrap();
        assert!(scan.is_healthy(), "{:?}", scan.issues);
        assert_eq!(scan.entry_count(), 25);
        assert_eq!(scan.segments.len(), 3);
        assert!(scan.segments.iter().all(|report| report.end == ScanEnd::Clean));
        assert_eq!(scan.segments[0].entry_count, 10);
        assert_eq!(scan.segments[2].first_index(), 21);
        assert_eq!(scan.segments[2].last_index(), 25);
    }

    #[test]
    fn visits_entries_in_order() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 4);

        let mut seen = Vec::new();
        let report = scan_segment_with(&dir.path().join("journal-1.log"), 64, |entry| {
            seen.push(entry)
        })
        .unwrap();
        assert_eq!(report.entry_count, 4);
        assert_eq!(seen[0].position, DESCRIPTOR_BYTES);
        assert_eq!(seen[3].index, 4);
        assert_eq!(&seen[3].data[..], b"entry-0004");
        assert_eq!(report.valid_bytes, DESCRIPTOR_BYTES + 4 * 18);
    }

    #[test]
    fn empty_segment_has_no_entries() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 0);
        let report = scan_segment(&dir.path().join("journal-1.log"), 64).unwrap();
        assert_eq!(report.entry_count, 0);
        assert_eq!(report.last_index(), 0);
        assert_eq!(report.end, ScanEnd::Clean);
    }

    #[test]
    fn reports_checksum_damage() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 5);
        let path = dir.path().join("journal-1.log");
        // Flip a payload byte of the third entry.
        overwrite(&path, (DESCRIPTOR_BYTES + 2 * 18 + 8) as u64, b"X");

        let scan = scan_journal(dir.path(), "journal", 64).unwrap();
        assert_eq!(scan.entry_count(), 2);
        assert_eq!(
            scan.issues,
            vec![ScanIssue::DamagedTail {
                id: 1,
                position: DESCRIPTOR_BYTES + 2 * 18,
                end: ScanEnd::ChecksumMismatch,
            }]
        );
    }

    #[test]
    fn reports_torn_header() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 2);
        let path = dir.path().join("journal-1.log");
        overwrite(&path, (DESCRIPTOR_BYTES + 2 * 18 + 4) as u64, &[1, 2, 3, 4]);

        let report = scan_segment(&path, 64).unwrap();
        assert_eq!(report.entry_count, 2);
        assert_eq!(report.end, ScanEnd::TornHeader);
        assert!(!report.end.is_clean());
    }

    #[test]
    fn reports_unreadable_and_misaligned_segments() {
        let dir = tempdir().unwrap();
        write_journal(&dir, 25);
        fs::remove_file(dir.path().join("journal-2.log")).unwrap();
        fs::write(dir.path().join("journal-9.log"), b"garbage").unwrap();

        let scan = scan_journal(dir.path(), "journal", 64).unwrap();
        assert!(!scan.is_healthy());
        assert!(scan
            .issues
            .iter()
            .any(|issue| matches!(issue, ScanIssue::Unreadable { .. })));
        assert!(scan.issues.contains(&ScanIssue::Misaligned {
            id: 3,
            expected: 11,
            actual: 21,
        }));
    }
}
