//! Sequence number arithmetic over the circular 32-bit sequence space.
//!
//! RFC 793 (3.3)
//!
//! It is essential to remember that the actual sequence number space is
//! finite, though very large. This space ranges from 0 to 2**32 - 1. Since the
//! space is finite, all arithmetic dealing with sequence numbers must be
//! performed modulo 2**32.
//!
//! `a < b` holds iff `(b - a) mod 2**32` lies within `(0, 2**31)`. Two numbers
//! exactly `2**31` apart are unordered in both directions.

/// Half of the sequence space.
const HALF: u32 = 1 << 31;

/// Returns `true` if `lhs` precedes `rhs`.
#[inline]
pub fn seq_lt(lhs: u32, rhs: u32) -> bool {
    let dist = rhs.wrapping_sub(lhs);
    dist != 0 && dist < HALF
}

/// Returns `true` if `lhs` precedes or equals `rhs`.
#[inline]
pub fn seq_le(lhs: u32, rhs: u32) -> bool {
    lhs == rhs || seq_lt(lhs, rhs)
}

/// Returns `true` if `lhs` follows `rhs`.
#[inline]
pub fn seq_gt(lhs: u32, rhs: u32) -> bool {
    seq_lt(rhs, lhs)
}

/// Returns `true` if `lhs` follows or equals `rhs`.
#[inline]
pub fn seq_ge(lhs: u32, rhs: u32) -> bool {
    seq_le(rhs, lhs)
}

/// Returns the earlier of two sequence numbers.
#[inline]
pub fn seq_min(lhs: u32, rhs: u32) -> u32 {
    if seq_lt(lhs, rhs) { lhs } else { rhs }
}

/// Returns the later of two sequence numbers.
#[inline]
pub fn seq_max(lhs: u32, rhs: u32) -> u32 {
    if seq_gt(lhs, rhs) { lhs } else { rhs }
}

/// Returns `true` if `start <= x < end` in sequence space.
#[inline]
pub fn seq_in_range(start: u32, x: u32, end: u32) -> bool {
    seq_le(start, x) && seq_lt(x, end)
}
