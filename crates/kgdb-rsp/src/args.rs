//! Cursor over the argument bytes of a packet.
//!
//! Commands carry printable-ASCII arguments after the command byte, for
//! example `m4000,10` or `Z0,4000,4`. The cursor consumes hex numbers
//! and literal separators in order and leaves the remainder (register or
//! memory payloads) accessible as a slice.

use crate::hex::from_hex_digit;

/// Longest accepted hex number: one `u64`, two digits per byte.
const MAX_HEX_DIGITS: usize = 2 * size_of::<u64>();

/// Argument cursor over a packet payload.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    buf: &'a [u8],
}

impl<'a> Args<'a> {
    /// Wrap the argument bytes following the command byte.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Consume a hex number, returning its value and the digit count.
    ///
    /// A leading `-` negates (two's complement), as hosts send `-1` for
    /// "all threads". Stops at the first non-hex byte; zero digits
    /// yields `(0, 0)` and consumes nothing but the sign.
    pub fn hex_u64_counted(&mut self) -> (u64, usize) {
        let mut val: u64 = 0;
        let mut digits = 0;
        let negate = self.buf.first() == Some(&b'-');
        if negate {
            self.buf = &self.buf[1..];
        }
        while digits < MAX_HEX_DIGITS {
            let Some(&ch) = self.buf.first() else { break };
            let Some(nibble) = from_hex_digit(ch) else {
                break;
            };
            val = (val << 4) | u64::from(nibble);
            digits += 1;
            self.buf = &self.buf[1..];
        }
        if negate {
            val = val.wrapping_neg();
        }
        (val, digits)
    }

    /// Consume a hex number, discarding the digit count.
    pub fn hex_u64(&mut self) -> u64 {
        self.hex_u64_counted().0
    }

    /// Consume one literal byte; `false` if the next byte differs.
    pub fn expect(&mut self, ch: u8) -> bool {
        if self.buf.first() == Some(&ch) {
            self.buf = &self.buf[1..];
            true
        } else {
            false
        }
    }

    /// Consume and return the next byte, if any.
    pub fn next_byte(&mut self) -> Option<u8> {
        let (&first, rest) = self.buf.split_first()?;
        self.buf = rest;
        Some(first)
    }

    /// Unconsumed bytes.
    #[must_use]
    pub const fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// `true` once every byte has been consumed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
