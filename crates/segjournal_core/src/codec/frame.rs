//! Entry framing: `[length:u32][checksum:u32][payload]`.

use crate::error::{CoreError, CoreResult};
use bytes::{BufMut, BytesMut};

/// Size of the fixed entry header.
pub const ENTRY_HEADER_BYTES: usize = segjournal_storage::ENTRY_HEADER_BYTES;

/// Computes the CRC-32 (IEEE) of a payload.
#[must_use]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Returns the framed size of a payload of `len` bytes.
#[must_use]
pub const fn framed_len(len: usize) -> usize {
    ENTRY_HEADER_BYTES + len
}

/// Encodes a payload into a freshly allocated frame.
///
/// # Errors
///
/// Returns [`CoreError::EntryTooLarge`] if the payload length does not fit
/// the 32-bit length field.
pub fn encode(payload: &[u8]) -> CoreResult<BytesMut> {
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::entry_too_large(payload.len(), u32::MAX as usize))?;
    let mut buf = BytesMut::with_capacity(framed_len(payload.len()));
    buf.put_u32(len);
    buf.put_u32(checksum(payload));
    buf.put_slice(payload);
    Ok(buf)
}

/// Encodes a payload into the front of `dest`.
///
/// `dest` must be at least [`framed_len`] bytes long and the payload length
/// must fit in a `u32`. Bytes past the frame are left untouched.
pub fn encode_into(dest: &mut [u8], payload: &[u8]) {
    debug_assert!(u32::try_from(payload.len()).is_ok());
    let len = payload.len() as u32;
    dest[0..4].copy_from_slice(&len.to_be_bytes());
    dest[4..8].copy_from_slice(&checksum(payload).to_be_bytes());
    dest[ENTRY_HEADER_BYTES..framed_len(payload.len())].copy_from_slice(payload);
}

/// A decoded frame borrowing its payload from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Checksum stored in the header.
    pub checksum: u32,
    /// Payload bytes.
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// Returns true if the stored checksum matches the payload.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        checksum(self.payload) == self.checksum
    }

    /// Returns the framed size.
    #[must_use]
    pub fn framed_len(&self) -> usize {
        framed_len(self.payload.len())
    }
}

/// Outcome of decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<'a> {
    /// A complete frame. Its checksum has not been verified.
    Frame(Frame<'a>),
    /// The buffer ends before the frame does. `needed` is the full framed
    /// size if the header was readable, otherwise the header size.
    Incomplete {
        /// Bytes needed to decode.
        needed: usize,
    },
    /// No entry here: zero length, or a length above the limit.
    Invalid,
}

/// Decodes the frame at the start of `buf`.
///
/// A zero length or a length above `max_entry_size` yields
/// [`Decoded::Invalid`]. Checksums are left to the caller; a mismatch marks
/// the end of valid data rather than an error.
#[must_use]
pub fn decode(buf: &[u8], max_entry_size: usize) -> Decoded<'_> {
    let Some(header) = buf.get(..ENTRY_HEADER_BYTES) else {
        return Decoded::Incomplete {
            needed: ENTRY_HEADER_BYTES,
        };
    };
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if length == 0 || length > max_entry_size {
        return Decoded::Invalid;
    }
    let checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    match buf.get(ENTRY_HEADER_BYTES..framed_len(length)) {
        Some(payload) => Decoded::Frame(Frame { checksum, payload }),
        None => Decoded::Incomplete {
            needed: framed_len(length),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_big_endian_header() {
        let frame = encode(b"abc").unwrap();
        assert_eq!(frame.len(), 11);
        assert_eq!(&frame[0..4], &[0, 0, 0, 3]);
        assert_eq!(&frame[4..8], &checksum(b"abc").to_be_bytes());
        assert_eq!(&frame[8..], b"abc");
    }

    #[test]
    fn crc_matches_ieee_reference() {
        // Standard CRC-32 check value.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn zero_length_is_invalid() {
        assert_eq!(decode(&[0u8; 16], 1024), Decoded::Invalid);
    }

    #[test]
    fn oversized_length_is_invalid() {
        let frame = encode(&[7u8; 32]).unwrap();
        assert_eq!(decode(&frame, 31), Decoded::Invalid);
        assert!(matches!(decode(&frame, 32), Decoded::Frame(_)));
    }

    #[test]
    fn short_buffers_are_incomplete() {
        let frame = encode(b"hello").unwrap();
        assert_eq!(
            decode(&frame[..5], 1024),
            Decoded::Incomplete {
                needed: ENTRY_HEADER_BYTES
            }
        );
        assert_eq!(
            decode(&frame[..10], 1024),
            Decoded::Incomplete { needed: 13 }
        );
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut frame = encode(b"hello").unwrap().to_vec();
        frame[9] ^= 0x01;
        match decode(&frame, 1024) {
            Decoded::Frame(decoded) => assert!(!decoded.is_intact()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encode_into_leaves_tail_untouched() {
        let mut dest = [0xAAu8; 16];
        encode_into(&mut dest, b"xy");
        assert_eq!(&dest[..10], &encode(b"xy").unwrap()[..]);
        assert_eq!(&dest[10..], &[0xAA; 6]);
    }

    proptest! {
        #[test]
        fn decode_recovers_payload(payload in proptest::collection::vec(any::<u8>(), 1..512)) {
            let frame = encode(&payload).unwrap();
            match decode(&frame, 512) {
                Decoded::Frame(decoded) => {
                    prop_assert!(decoded.is_intact());
                    prop_assert_eq!(decoded.payload, &payload[..]);
                    prop_assert_eq!(decoded.framed_len(), frame.len());
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn single_bit_flips_are_detected(
            payload in proptest::collection::vec(any::<u8>(), 1..128),
            bit in 0usize..1024,
        ) {
            let mut frame = encode(&payload).unwrap().to_vec();
            let bit = bit % (payload.len() * 8);
            frame[ENTRY_HEADER_BYTES + bit / 8] ^= 1 << (bit % 8);
            if let Decoded::Frame(decoded) = decode(&frame, 128) {
                prop_assert!(!decoded.is_intact());
            }
        }
    }
}
