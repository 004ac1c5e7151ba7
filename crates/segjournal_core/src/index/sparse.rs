//! Sparse index from entry index to file position.
//!
//! Only every `N`-th entry is recorded, where `N = ceil(1 / density)`, so a
//! lookup lands at or before the target and the caller scans forward from
//! there. The most recently recorded entry is always remembered, which lets
//! appends resume without a scan.

use std::collections::BTreeMap;

/// An entry index and the file position of its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Entry index.
    pub index: u64,
    /// Byte offset of the frame within the segment file.
    pub position: u32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(index: u64, position: u32) -> Self {
        Self { index, position }
    }
}

/// Sampled mapping of entry indices to file positions.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    interval: u64,
    positions: BTreeMap<u64, u32>,
    last: Option<Position>,
}

impl SparseIndex {
    /// Creates an empty index sampling at the given density.
    #[must_use]
    pub fn new(density: f64) -> Self {
        let interval = (1.0 / density).ceil();
        let interval = if interval.is_finite() && interval >= 1.0 {
            interval as u64
        } else {
            1
        };
        Self {
            interval,
            positions: BTreeMap::new(),
            last: None,
        }
    }

    /// Returns the sampling interval.
    #[must_use]
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// Records the position of entry `index`.
    ///
    /// The entry is kept if it falls on the sampling interval. It always
    /// becomes [`SparseIndex::last`].
    pub fn record(&mut self, index: u64, position: u32) {
        debug_assert!(self.last.map_or(true, |last| last.index < index));
        if index % self.interval == 0 {
            self.positions.insert(index, position);
        }
        self.last = Some(Position::new(index, position));
    }

    /// Returns the closest known position at or before `index`.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<Position> {
        let sampled = self
            .positions
            .range(..=index)
            .next_back()
            .map(|(&index, &position)| Position::new(index, position));
        match (sampled, self.last) {
            (Some(sampled), Some(last)) if last.index <= index && last.index > sampled.index => {
                Some(last)
            }
            (None, Some(last)) if last.index <= index => Some(last),
            (sampled, _) => sampled,
        }
    }

    /// Drops every position above `index`.
    ///
    /// Afterwards [`SparseIndex::last`] is the highest sampled position at or
    /// below `index`, which may be behind the real last entry.
    pub fn truncate(&mut self, index: u64) {
        if self.last.is_some_and(|last| last.index <= index) {
            return;
        }
        self.positions.split_off(&(index.saturating_add(1)));
        self.last = self
            .positions
            .last_key_value()
            .map(|(&index, &position)| Position::new(index, position));
    }

    /// Returns the most recently recorded position.
    #[must_use]
    pub const fn last(&self) -> Option<Position> {
        self.last
    }

    /// Returns the number of sampled positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if nothing has been sampled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(density: f64, count: u64) -> SparseIndex {
        let mut index = SparseIndex::new(density);
        for i in 1..=count {
            index.record(i, (i * 10) as u32);
        }
        index
    }

    #[test]
    fn interval_is_ceiling_of_inverse_density() {
        assert_eq!(SparseIndex::new(0.5).interval(), 2);
        assert_eq!(SparseIndex::new(0.25).interval(), 4);
        assert_eq!(SparseIndex::new(0.3).interval(), 4);
        assert_eq!(SparseIndex::new(0.005).interval(), 200);
    }

    #[test]
    fn samples_every_interval() {
        let index = filled(0.25, 10);
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(3), None);
        assert_eq!(index.lookup(4), Some(Position::new(4, 40)));
        assert_eq!(index.lookup(7), Some(Position::new(4, 40)));
        assert_eq!(index.lookup(8), Some(Position::new(8, 80)));
    }

    #[test]
    fn last_is_always_tracked() {
        let index = filled(0.25, 10);
        assert_eq!(index.last(), Some(Position::new(10, 100)));
        assert_eq!(index.lookup(10), Some(Position::new(10, 100)));
        assert_eq!(index.lookup(100), Some(Position::new(10, 100)));
        assert_eq!(index.lookup(9), Some(Position::new(8, 80)));
    }

    #[test]
    fn truncate_drops_later_positions() {
        let mut index = filled(0.25, 10);
        index.truncate(6);
        assert_eq!(index.len(), 1);
        assert_eq!(index.last(), Some(Position::new(4, 40)));
        assert_eq!(index.lookup(10), Some(Position::new(4, 40)));

        index.truncate(0);
        assert!(index.is_empty());
        assert_eq!(index.last(), None);
        assert_eq!(index.lookup(10), None);
    }

    #[test]
    fn truncate_past_last_is_noop() {
        let mut index = filled(0.25, 10);
        index.truncate(12);
        assert_eq!(index.last(), Some(Position::new(10, 100)));
    }

    proptest! {
        #[test]
        fn lookup_is_a_floor(count in 1u64..300, density in 0.01f64..0.99, target in 0u64..400) {
            let index = filled(density, count);
            match index.lookup(target) {
                Some(found) => {
                    prop_assert!(found.index <= target);
                    prop_assert_eq!(u64::from(found.position), found.index * 10);
                    let next_sample = (found.index / index.interval() + 1) * index.interval();
                    prop_assert!(next_sample > target.min(count) || found.index == count.min(target));
                }
                None => prop_assert!(target < index.interval() && target < count),
            }
        }
    }
}
