//! Dialog route parameter codec
//!
//! The `(hash_entry, hash_slot)` pair is written as two reverse-hex numbers
//! (least significant nibble first) joined by [`SEPARATOR`]:
//!
//! ```text
//!   entry = 0x1a, slot = 0x2f3   →   "a1.3f2"
//! ```
//!
//! The encoding is what peers echo back in the Route header of in-dialog
//! requests, so it must stay stable for the life of a dialog.

use crate::errors::{DialogError, DialogResult};

/// Separator between the entry and slot parts
pub const SEPARATOR: char = '.';

/// Longest reverse-hex run that fits a `u32`
const MAX_HEX_DIGITS: usize = 8;

/// Encode a table address as a route parameter value
pub fn encode(entry: u32, slot: u32) -> String {
    let mut out = String::with_capacity(2 * MAX_HEX_DIGITS + 1);
    push_reverse_hex(&mut out, entry);
    out.push(SEPARATOR);
    push_reverse_hex(&mut out, slot);
    out
}

/// Decode a route parameter value into `(entry, slot)`
pub fn decode(value: &str) -> DialogResult<(u32, u32)> {
    let (entry, slot) = value
        .split_once(SEPARATOR)
        .ok_or_else(|| DialogError::route_param(value, "missing separator"))?;
    Ok((parse_reverse_hex(value, entry)?, parse_reverse_hex(value, slot)?))
}

fn push_reverse_hex(out: &mut String, mut n: u32) {
    if n == 0 {
        out.push('0');
        return;
    }
    while n != 0 {
        let digit = n & 0xf;
        // digit < 16 so the conversion cannot fail
        out.push(char::from_digit(digit, 16).unwrap_or('0'));
        n >>= 4;
    }
}

fn parse_reverse_hex(value: &str, part: &str) -> DialogResult<u32> {
    if part.is_empty() {
        return Err(DialogError::route_param(value, "empty component"));
    }
    if part.len() > MAX_HEX_DIGITS {
        return Err(DialogError::route_param(value, "component too long"));
    }
    let mut result: u32 = 0;
    for c in part.chars().rev() {
        let digit = c
            .to_digit(16)
            .ok_or_else(|| DialogError::route_param(value, format!("invalid hex digit '{}'", c)))?;
        result = (result << 4) | digit;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode(0, 1), "0.1");
        assert_eq!(encode(0x1a, 0x2f3), "a1.3f2");
        assert_eq!(encode(u32::MAX, 16), "ffffffff.01");
    }

    #[test]
    fn test_decode_accepts_uppercase() {
        assert_eq!(decode("A1.3F2").unwrap(), (0x1a, 0x2f3));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("a1").is_err());
        assert!(decode(".1").is_err());
        assert!(decode("1.").is_err());
        assert!(decode("g1.1").is_err());
        assert!(decode("123456789.1").is_err());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(entry in any::<u32>(), slot in 1u32..) {
            prop_assert_eq!(decode(&encode(entry, slot)).unwrap(), (entry, slot));
        }
    }
}
