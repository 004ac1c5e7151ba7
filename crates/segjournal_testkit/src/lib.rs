//! # SegJournal Testkit
//!
//! Test utilities for SegJournal.
//!
//! This crate provides:
//! - Journal fixtures for both storage levels
//! - Crash-tail injection and recovery checks
//! - Property-based generators and a reference model of the journal
//! - Stress testing with concurrent readers
//! - Golden byte-layout checks for the on-disk format
//!
//! ## Usage
//!
//! ```rust
//! use segjournal_testkit::prelude::*;
//!
//! for_each_level(|journal| {
//!     let index = journal.writer().unwrap().append(&payload(1)).unwrap();
//!     assert_eq!(index, 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod golden;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use golden::*;
pub use stress::*;
