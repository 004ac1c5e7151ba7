//! Property-based test generators using proptest.
//!
//! Provides payload strategies and a sequence-of-operations strategy that
//! is checked against [`JournalModel`], a plain in-memory journal.

use proptest::prelude::*;
use segjournal_core::{CoreResult, Journal, ReaderMode};

/// Strategy for generating non-empty payloads up to `max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Strategy for generating a batch of payloads.
pub fn payloads_strategy(max_len: usize, count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(max_len), 0..=count)
}

/// One operation against a journal.
///
/// Positional arguments are fractions of the currently valid range so that
/// every generated operation is legal when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    /// Append a payload.
    Append(Vec<u8>),
    /// Commit somewhere between the commit index and the last index.
    Commit(u8),
    /// Truncate somewhere after the commit index.
    Truncate(u8),
    /// Compact somewhere between the first and the commit index.
    Compact(u8),
    /// Close and reopen the journal.
    Reopen,
}

/// Strategy for generating operation sequences, weighted towards appends.
pub fn journal_ops_strategy(max_len: usize, count: usize) -> impl Strategy<Value = Vec<JournalOp>> {
    let op = prop_oneof![
        8 => payload_strategy(max_len).prop_map(JournalOp::Append),
        2 => any::<u8>().prop_map(JournalOp::Commit),
        2 => any::<u8>().prop_map(JournalOp::Truncate),
        1 => any::<u8>().prop_map(JournalOp::Compact),
        1 => Just(JournalOp::Reopen),
    ];
    prop::collection::vec(op, 1..=count)
}

/// Picks a point in `low..=high` at `fraction / 255` of the way.
fn pick(low: u64, high: u64, fraction: u8) -> u64 {
    low + (high - low) * u64::from(fraction) / 255
}

/// A plain in-memory journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalModel {
    /// Index of `entries[0]`.
    pub first_index: u64,
    /// Retained entries.
    pub entries: Vec<Vec<u8>>,
    /// Highest committed index.
    pub commit_index: u64,
}

impl Default for JournalModel {
    fn default() -> Self {
        Self {
            first_index: 1,
            entries: Vec::new(),
            commit_index: 0,
        }
    }
}

impl JournalModel {
    /// Returns the index of the last entry, or `first_index - 1`.
    pub fn last_index(&self) -> u64 {
        self.first_index + self.entries.len() as u64 - 1
    }

    /// Applies `op` to both the model and `journal`.
    ///
    /// Compaction removes whole segments, so the model takes the journal's
    /// new first index. A reopen resets the commit index, which is not
    /// persisted.
    ///
    /// # Errors
    ///
    /// Returns any error the journal raises.
    pub fn apply(&mut self, journal: &mut Journal, op: &JournalOp) -> CoreResult<()> {
        match op {
            JournalOp::Append(data) => {
                let index = journal.writer()?.append(data)?;
                assert_eq!(index, self.last_index() + 1, "append index");
                self.entries.push(data.clone());
            }
            JournalOp::Commit(fraction) => {
                let index = pick(self.commit_index, self.last_index(), *fraction);
                journal.writer()?.commit(index)?;
                self.commit_index = self.commit_index.max(index);
            }
            JournalOp::Truncate(fraction) => {
                let low = (self.commit_index + 1).max(self.first_index);
                let high = self.last_index() + 1;
                if low <= high {
                    let index = pick(low, high, *fraction);
                    journal.writer()?.truncate(index)?;
                    self.entries.truncate((index - self.first_index) as usize);
                }
            }
            JournalOp::Compact(fraction) => {
                if self.commit_index >= self.first_index {
                    let index = pick(self.first_index, self.commit_index, *fraction);
                    journal.compact(index)?;
                    let first_index = journal.first_index()?;
                    self.entries.drain(..(first_index - self.first_index) as usize);
                    self.first_index = first_index;
                }
            }
            JournalOp::Reopen => {
                let config = journal.config().clone();
                journal.close()?;
                *journal = Journal::open(config)?;
                self.commit_index = 0;
            }
        }
        Ok(())
    }

    /// Asserts that `journal` holds exactly the model's entries.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading.
    pub fn check(&self, journal: &Journal) -> CoreResult<()> {
        assert_eq!(journal.first_index()?, self.first_index, "first index");
        assert_eq!(journal.last_index()?, self.last_index(), "last index");
        assert_eq!(journal.commit_index(), self.commit_index, "commit index");

        let reader = journal.open_reader(self.first_index, ReaderMode::All)?;
        let mut count = 0;
        for (entry, expected) in reader.zip(&self.entries) {
            let entry = entry?;
            assert_eq!(entry.index(), self.first_index + count, "entry index");
            assert_eq!(&entry.data()[..], &expected[..], "entry {}", entry.index());
            count += 1;
        }
        assert_eq!(count, self.entries.len() as u64, "entry count");
        Ok(())
    }
}
