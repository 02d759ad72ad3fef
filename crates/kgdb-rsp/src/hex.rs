//! Hex encoding and decoding of binary payloads.
//!
//! Register and memory contents cross the wire as lowercase hex pairs,
//! one pair per byte, most significant nibble first.

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Decode a single ASCII hex digit, accepting both cases.
#[must_use]
pub fn from_hex_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Append the lowercase hex rendering of `bytes` to `dst`.
pub fn push_hex(dst: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        dst.push(HEX_DIGITS[usize::from(b >> 4)]);
        dst.push(HEX_DIGITS[usize::from(b & 0xf)]);
    }
}

/// Decode a run of hex pairs back into bytes.
///
/// Returns `None` if `src` has odd length or contains a non-hex byte.
#[must_use]
pub fn decode_hex(src: &[u8]) -> Option<Vec<u8>> {
    if src.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(src.len() / 2);
    for pair in src.chunks_exact(2) {
        let hi = from_hex_digit(pair[0])?;
        let lo = from_hex_digit(pair[1])?;
        out.push((hi << 4) | lo);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_digit() {
        assert_eq!(from_hex_digit(b'0'), Some(0));
        assert_eq!(from_hex_digit(b'9'), Some(9));
        assert_eq!(from_hex_digit(b'a'), Some(10));
        assert_eq!(from_hex_digit(b'F'), Some(15));
        assert_eq!(from_hex_digit(b'g'), None);
        assert_eq!(from_hex_digit(b','), None);
    }

    #[test]
    fn test_push_hex_lowercase() {
        let mut out = Vec::new();
        push_hex(&mut out, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(out, b"deadbeef");
    }

    #[test]
    fn test_decode_hex_round_trip() {
        let decoded = decode_hex(b"00ff10Ab").unwrap();
        assert_eq!(decoded, [0x00, 0xff, 0x10, 0xab]);
    }

    #[test]
    fn test_decode_hex_rejects_bad_input() {
        assert_eq!(decode_hex(b"abc"), None);
        assert_eq!(decode_hex(b"zz"), None);
    }
}
