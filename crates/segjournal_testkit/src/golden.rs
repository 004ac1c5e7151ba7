//! Golden byte-layout checks for the on-disk format.
//!
//! The vectors below were produced independently of this crate and pin the
//! descriptor and frame layouts, byte order included.

use segjournal_core::codec::{encode, SegmentDescriptor, DESCRIPTOR_BYTES};

/// A named byte vector with its expected hex encoding.
#[derive(Debug, Clone, Copy)]
pub struct GoldenVector {
    /// Name used in failure messages.
    pub name: &'static str,
    /// Expected bytes, hex-encoded.
    pub hex: &'static str,
}

/// Frame of the payload `hello`.
pub const FRAME_HELLO: GoldenVector = GoldenVector {
    name: "frame_hello",
    hex: "000000053610a68668656c6c6f",
};

/// Header of the frame of the payload `entry-0001`.
pub const FRAME_HEADER_ENTRY_0001: GoldenVector = GoldenVector {
    name: "frame_header_entry_0001",
    hex: "0000000a5cac3f58",
};

/// Descriptor with id 7, first index 1001, 4096-byte segments, updated at
/// 1700000000000 ms, unlocked.
pub const DESCRIPTOR_7: GoldenVector = GoldenVector {
    name: "descriptor_7",
    hex: "00000001000000000000000700000000000003e900001000000000000000018bcfe568\
          0000000000000000000000000000000000000000000000000000000000",
};

/// Returns the descriptor [`DESCRIPTOR_7`] encodes.
pub fn descriptor_7() -> SegmentDescriptor {
    SegmentDescriptor {
        updated: 1_700_000_000_000,
        ..SegmentDescriptor::new(7, 1001, 4096)
    }
}

/// Hex-encodes bytes.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Decodes a hex string.
///
/// # Panics
///
/// Panics if the string is not valid hex.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "odd-length hex string");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("invalid hex"))
        .collect()
}

/// Asserts that `actual` matches `vector`.
///
/// # Panics
///
/// Panics with both encodings if the bytes differ.
pub fn assert_golden(vector: &GoldenVector, actual: &[u8]) {
    let expected = hex_decode(vector.hex);
    if actual != expected.as_slice() {
        panic!(
            "Golden vector '{}' failed:\n\
             Expected ({} bytes): {}\n\
             Actual ({} bytes): {}",
            vector.name,
            expected.len(),
            vector.hex,
            actual.len(),
            hex_encode(actual)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{payload, TestJournal, LEVELS};
    use segjournal_core::codec::ENTRY_HEADER_BYTES;
    use std::fs;

    #[test]
    fn hex_round_trip() {
        assert_eq!(hex_decode("00ff10"), vec![0x00, 0xff, 0x10]);
        assert_eq!(hex_encode(&[0xab, 0x01]), "ab01");
    }

    #[test]
    fn frame_layout() {
        assert_golden(&FRAME_HELLO, &encode(b"hello").unwrap());
        let frame = encode(&payload(1)).unwrap();
        assert_golden(&FRAME_HEADER_ENTRY_0001, &frame[..ENTRY_HEADER_BYTES]);
    }

    #[test]
    fn descriptor_layout() {
        let descriptor = descriptor_7();
        let encoded = descriptor.encode();
        assert_eq!(encoded.len(), DESCRIPTOR_BYTES);
        assert_golden(&DESCRIPTOR_7, &encoded);
        assert_eq!(
            SegmentDescriptor::decode(&hex_decode(DESCRIPTOR_7.hex)).unwrap(),
            descriptor
        );
    }

    #[test]
    fn segment_file_layout() {
        for level in LEVELS {
            let mut journal = TestJournal::new(level);
            journal.fill(1);
            journal.reopen_after(|config| {
                let bytes = fs::read(config.segment_path(1)).unwrap();
                assert_eq!(bytes.len(), config.max_segment_size as usize);
                assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
                let frame = &bytes[DESCRIPTOR_BYTES..];
                assert_golden(&FRAME_HEADER_ENTRY_0001, &frame[..ENTRY_HEADER_BYTES]);
                assert_eq!(&frame[ENTRY_HEADER_BYTES..18], b"entry-0001");
                assert!(frame[18..].iter().all(|&byte| byte == 0));
            });
        }
    }
}
