//! Stress tests for SegJournal.
//!
//! These tests verify behavior under heavy load and concurrent access.

use segjournal_core::{Entry, Journal, ReaderMode};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of entries to append.
    pub operations: usize,
    /// Number of concurrent readers.
    pub readers: usize,
    /// Payload size in bytes, at least 8.
    pub entry_size: usize,
    /// Commit after this many appends.
    pub commit_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            readers: 4,
            entry_size: 128,
            commit_every: 16,
        }
    }
}

/// Builds a payload that records its own index.
pub fn stress_payload(index: u64, size: usize) -> Vec<u8> {
    let mut data = vec![(index % 251) as u8; size.max(8)];
    data[..8].copy_from_slice(&index.to_be_bytes());
    data
}

/// Returns true if `entry` holds the payload [`stress_payload`] built for
/// its index.
pub fn is_stress_payload(entry: &Entry) -> bool {
    entry.len() >= 8 && *entry.data() == stress_payload(entry.index(), entry.len())
}

fn append_batch(journal: &Journal, config: &StressConfig, count: usize) -> (usize, usize) {
    let mut successful = 0usize;
    let mut failed = 0usize;
    let Ok(mut writer) = journal.writer() else {
        return (0, count);
    };
    for _ in 0..count {
        let index = writer.next_index();
        match writer.append(&stress_payload(index, config.entry_size)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }
    let last_index = writer.last_index();
    if writer.commit(last_index).is_err() {
        failed += 1;
    }
    (successful, failed)
}

/// Run a sequential append stress test.
pub fn stress_sequential_appends(journal: &Journal, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    let mut remaining = config.operations;
    while remaining > 0 {
        let batch = remaining.min(config.commit_every.max(1));
        let (ok, err) = append_batch(journal, config, batch);
        successful += ok;
        failed += err;
        remaining -= batch;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test over the whole journal.
pub fn stress_sequential_reads(journal: &Journal, config: &StressConfig) -> StressTestResult {
    if journal.last_index().unwrap_or(0) == 0 {
        stress_sequential_appends(journal, config);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    let first_index = journal.first_index().unwrap_or(1);
    match journal.open_reader(first_index, ReaderMode::All) {
        Ok(reader) => {
            for entry in reader {
                match entry {
                    Ok(entry) if is_stress_payload(&entry) => successful += 1,
                    _ => failed += 1,
                }
            }
        }
        Err(_) => failed += 1,
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run readers tailing the commit index while one writer appends.
///
/// Every reader must observe each committed entry exactly once, in order.
pub fn stress_concurrent_readers(journal: Arc<Journal>, config: &StressConfig) -> StressTestResult {
    tail_while_writing(journal, config, 0)
}

/// Like [`stress_concurrent_readers`], but the writer also compacts the
/// journal behind the readers.
///
/// Readers that fall behind a compaction skip ahead, so they must observe
/// strictly increasing indices rather than every entry.
pub fn stress_compaction_while_reading(
    journal: Arc<Journal>,
    config: &StressConfig,
) -> StressTestResult {
    tail_while_writing(journal, config, config.commit_every.max(1) * 4)
}

fn tail_while_writing(
    journal: Arc<Journal>,
    config: &StressConfig,
    compact_every: usize,
) -> StressTestResult {
    let start = Instant::now();
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let strict = compact_every == 0;

    let handles: Vec<_> = (0..config.readers)
        .filter_map(|_| {
            let reader = journal.open_reader(1, ReaderMode::Commits).ok()?;
            let journal = Arc::clone(&journal);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let done = Arc::clone(&done);

            Some(thread::spawn(move || {
                let mut reader = reader;
                let mut last_seen = 0u64;
                loop {
                    match reader.try_next() {
                        Ok(Some(entry)) => {
                            let in_order = if strict {
                                entry.index() == last_seen + 1
                            } else {
                                entry.index() > last_seen
                            };
                            if in_order && is_stress_payload(&entry) {
                                successful.fetch_add(1, Ordering::Relaxed);
                            } else {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                            last_seen = entry.index();
                        }
                        Ok(None) => {
                            if done.load(Ordering::Acquire)
                                && reader.next_index() > journal.commit_index()
                            {
                                break;
                            }
                            thread::yield_now();
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                    }
                }
            }))
        })
        .collect();
    let missing_readers = config.readers - handles.len();

    let mut written_ok = 0usize;
    let mut written_err = 0usize;
    let mut remaining = config.operations;
    let mut since_compaction = 0usize;
    while remaining > 0 {
        let batch = remaining.min(config.commit_every.max(1));
        let (ok, err) = append_batch(&journal, config, batch);
        written_ok += ok;
        written_err += err;
        remaining -= batch;

        since_compaction += batch;
        if compact_every > 0 && since_compaction >= compact_every {
            since_compaction = 0;
            let target = journal.commit_index().saturating_sub(compact_every as u64);
            if journal.compact(target).is_err() {
                written_err += 1;
            }
        }
    }
    done.store(true, Ordering::Release);

    for handle in handles {
        if handle.join().is_err() {
            failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    StressTestResult::new(
        written_ok + successful.load(Ordering::Relaxed),
        written_err + missing_readers + failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
