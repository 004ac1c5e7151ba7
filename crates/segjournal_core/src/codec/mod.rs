//! Binary layout of segment files.
//!
//! A segment file is a fixed 64-byte descriptor followed by framed entries:
//!
//! ```text
//! [0, 64)                descriptor
//! [64, maxSegmentSize)   [length:u32][checksum:u32][payload] ...
//! ```
//!
//! All integers are big-endian. A `length` of zero marks the end of the
//! entries.

mod descriptor;
mod frame;

pub use descriptor::{SegmentDescriptor, DESCRIPTOR_BYTES, DESCRIPTOR_VERSION};
pub use frame::{checksum, decode, encode, encode_into, framed_len, Decoded, Frame, ENTRY_HEADER_BYTES};
