//! 10-bit AM sequence number space.
//!
//! There is deliberately no `PartialOrd` on [`SequenceNumber`]: ordering only
//! exists relative to a window base, through [`SequenceNumber::offset_from`].

use std::fmt;
use std::ops::{Add, Sub};

pub const SN_BITS: u32 = 10;
pub const SN_MODULUS: u16 = 1 << SN_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(u16);

impl SequenceNumber {
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    /// Build from any integer, reduced modulo 1024.
    pub fn new(value: u16) -> Self {
        Self(value % SN_MODULUS)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Slot index for SN-indexed tables.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// `(b - a) mod 1024`
    pub fn distance(a: SequenceNumber, b: SequenceNumber) -> u16 {
        b.0.wrapping_sub(a.0).wrapping_add(SN_MODULUS) % SN_MODULUS
    }

    /// Position of `self` counted from `base`, i.e. `distance(base, self)`.
    pub fn offset_from(self, base: SequenceNumber) -> u16 {
        Self::distance(base, self)
    }

    /// `base <= self < base + window` in modular terms.
    pub fn in_window(self, base: SequenceNumber, window: u16) -> bool {
        self.offset_from(base) < window
    }

    pub fn next(self) -> Self {
        self + 1
    }

    pub fn prev(self) -> Self {
        self - 1
    }
}

impl Add<u16> for SequenceNumber {
    type Output = SequenceNumber;

    fn add(self, rhs: u16) -> SequenceNumber {
        SequenceNumber(((self.0 as u32 + rhs as u32) % SN_MODULUS as u32) as u16)
    }
}

impl Sub<u16> for SequenceNumber {
    type Output = SequenceNumber;

    fn sub(self, rhs: u16) -> SequenceNumber {
        let rhs = rhs % SN_MODULUS;
        SequenceNumber((self.0 + SN_MODULUS - rhs) % SN_MODULUS)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
