//! Unpadded base-36 integers for frame payloads.
//!
//! Digits are `0-9a-z`, lowercase only. Width is 1..=11 digits; the
//! widest permitted value is 2^53 − 1 so payloads survive any peer
//! that models integers as IEEE-754 doubles.

use crate::frame::DecodeError;

/// Largest integer the wire format carries.
pub const MAX_SAFE_INT: u64 = (1 << 53) - 1;

/// Maximum payload width in digits.
pub const MAX_DIGITS: usize = 11;

/// Encodes `value` as unpadded lowercase base-36.
///
/// Values are produced by counters and millisecond cooldowns, all of
/// which stay far below [`MAX_SAFE_INT`]; the bound is asserted in
/// debug builds.
pub fn encode(value: u64) -> String {
    debug_assert!(value <= MAX_SAFE_INT, "value exceeds the wire range");

    if value == 0 {
        return "0".into();
    }

    let mut digits = [0u8; MAX_DIGITS];
    let mut rest = value;
    let mut used = 0;
    while rest > 0 {
        let d = (rest % 36) as u8;
        digits[used] = if d < 10 { b'0' + d } else { b'a' + d - 10 };
        rest /= 36;
        used += 1;
    }

    digits[..used].iter().rev().map(|b| *b as char).collect()
}

/// Decodes an unpadded lowercase base-36 payload.
///
/// # Errors
///
/// Returns [`DecodeError::BadInteger`] when the payload is empty,
/// wider than [`MAX_DIGITS`], contains a character outside `0-9a-z`,
/// or exceeds [`MAX_SAFE_INT`].
pub fn decode(text: &str) -> Result<u64, DecodeError> {
    let bad = |reason: String| DecodeError::BadInteger { reason };

    if text.is_empty() {
        return Err(bad("empty integer payload".into()));
    }
    if text.len() > MAX_DIGITS {
        return Err(bad(format!(
            "integer payload is {} digits, maximum {MAX_DIGITS}",
            text.len()
        )));
    }

    let mut value: u64 = 0;
    for c in text.chars() {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'a'..='z' => c as u64 - 'a' as u64 + 10,
            other => {
                return Err(bad(format!("invalid base-36 digit '{other}'")));
            }
        };
        value = value * 36 + digit;
    }

    if value > MAX_SAFE_INT {
        return Err(bad(format!("{value} exceeds the 53-bit wire range")));
    }

    Ok(value)
}
