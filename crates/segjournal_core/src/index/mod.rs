//! In-memory position indexes over segment files.

mod sparse;

pub use sparse::{Position, SparseIndex};
