//! Order-preserving encoding for bucket path segments.
//!
//! Bucket paths are composed into flat engine keys by concatenating encoded
//! segments and appending the leaf key raw. The encoding escapes `0x00` as
//! `0x00 0xFF` and terminates each segment with `0x00 0x00`, which keeps
//! byte-wise comparison of encoded keys equal to segment-wise comparison of
//! the paths and makes distinct paths prefix-free.

use crate::error::{StorageError, StorageResult};

const ESCAPE: u8 = 0x00;
const ESCAPED_NULL: u8 = 0xFF;
const TERMINATOR: [u8; 2] = [0x00, 0x00];

/// Appends the encoded form of `segment` to `buf`.
pub fn push_segment(buf: &mut Vec<u8>, segment: &[u8]) {
    for &byte in segment {
        if byte == ESCAPE {
            buf.extend_from_slice(&[ESCAPE, ESCAPED_NULL]);
        } else {
            buf.push(byte);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

/// Encodes a single segment.
pub fn encode_segment(segment: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(segment.len() + 2);
    push_segment(&mut buf, segment);
    buf
}

/// Returns a key that sorts after every key inside `segment`'s bucket and
/// before the first key of the next sibling segment.
///
/// Encoded segments end in `0x00 0x00`; bumping the final byte to `0x01`
/// yields the tightest such bound.
pub fn segment_past(segment: &[u8]) -> Vec<u8> {
    let mut buf = encode_segment(segment);
    let last = buf.last_mut().expect("encoded segment is never empty");
    *last = 0x01;
    buf
}

/// Decodes the first encoded segment of `encoded`.
///
/// Returns the segment and the number of input bytes consumed, including the
/// terminator.
pub fn decode_segment(encoded: &[u8]) -> StorageResult<(Vec<u8>, usize)> {
    let mut segment = Vec::new();
    let mut i = 0;
    while i < encoded.len() {
        if encoded[i] != ESCAPE {
            segment.push(encoded[i]);
            i += 1;
            continue;
        }
        match encoded.get(i + 1) {
            Some(&ESCAPED_NULL) => {
                segment.push(ESCAPE);
                i += 2;
            }
            Some(&0x00) => return Ok((segment, i + 2)),
            Some(&other) => {
                return Err(StorageError::corrupted(format!(
                    "invalid escape byte {other:#04x} in segment"
                )))
            }
            None => break,
        }
    }
    Err(StorageError::corrupted("unterminated segment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip() {
        let cases: Vec<&[u8]> = vec![
            b"",
            b"users",
            b"user_1",
            &[0x00],
            &[0x00, 0xFF],
            &[0xFF, 0x00],
            &[0x00, 0x00, 0x00],
        ];

        for case in cases {
            let encoded = encode_segment(case);
            let (decoded, consumed) = decode_segment(&encoded).unwrap();
            assert_eq!(decoded, case);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn decode_consumes_only_first_segment() {
        let mut buf = Vec::new();
        push_segment(&mut buf, b"users");
        push_segment(&mut buf, b"user_1");

        let (first, consumed) = decode_segment(&buf).unwrap();
        assert_eq!(first, b"users");

        let (second, _) = decode_segment(&buf[consumed..]).unwrap();
        assert_eq!(second, b"user_1");
    }

    #[test]
    fn ordering_matches_raw_bytes() {
        let values: Vec<&[u8]> = vec![b"", b"a", b"a\x00b", b"ab", b"b"];
        let encoded: Vec<_> = values.iter().map(|v| encode_segment(v)).collect();

        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn segment_past_bounds_the_bucket() {
        let past = segment_past(b"users");
        // Every key inside the bucket starts with the encoded segment.
        assert!(encode_segment(b"users") < past);
        assert!({
            let mut inner = encode_segment(b"users");
            inner.extend_from_slice(b"00000000");
            inner < past
        });
        // The next sibling sorts after the bound.
        assert!(past < encode_segment(b"usersx"));
        assert!(past < encode_segment(b"userz"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(segment in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encoded = encode_segment(&segment);
            let (decoded, consumed) = decode_segment(&encoded).unwrap();
            prop_assert_eq!(decoded, segment);
            prop_assert_eq!(consumed, encoded.len());
        }

        #[test]
        fn prop_order_preserving(
            a in proptest::collection::vec(any::<u8>(), 0..64),
            b in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let (ea, eb) = (encode_segment(&a), encode_segment(&b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}
