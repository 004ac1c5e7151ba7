//! Benchmark utilities.

use rand::Rng;
use segjournal_core::{Journal, JournalConfig, StorageLevel};
use tempfile::TempDir;

/// Segment size used by journal benchmarks.
pub const BENCH_SEGMENT_SIZE: u32 = 4 * 1024 * 1024;

/// Generate random entry data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random payloads.
pub fn generate_payloads(count: usize, payload_size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(payload_size)).collect()
}

/// Open a journal in a fresh temporary directory.
///
/// The directory is removed when the returned [`TempDir`] is dropped, so it
/// must outlive the journal.
pub fn temp_journal(level: StorageLevel) -> (TempDir, Journal) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let journal = Journal::open(
        JournalConfig::new(dir.path())
            .storage_level(level)
            .max_segment_size(BENCH_SEGMENT_SIZE),
    )
    .expect("Failed to open journal");
    (dir, journal)
}

/// Open a journal already holding `payloads`.
pub fn populated_journal(level: StorageLevel, payloads: &[Vec<u8>]) -> (TempDir, Journal) {
    let (dir, journal) = temp_journal(level);
    {
        let mut writer = journal.writer().expect("Failed to acquire writer");
        for payload in payloads {
            writer.append(payload).expect("Failed to append");
        }
        let last_index = writer.last_index();
        writer.commit(last_index).expect("Failed to commit");
    }
    (dir, journal)
}
