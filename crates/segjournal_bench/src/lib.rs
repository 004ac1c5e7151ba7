//! Shared helpers for SegJournal benchmarks.

pub mod utils;
