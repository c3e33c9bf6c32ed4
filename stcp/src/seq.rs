//! Wrap-around-safe sequence number comparisons.
//!
//! Sequence numbers live in a 32-bit circular space.  Two numbers are
//! ordered by the sign of their wrapping difference, which is correct as long
//! as they are less than `2^31` apart (always the case for any window this
//! protocol uses).

/// `true` when `a` comes strictly before `b` in sequence space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `true` when `a` comes before or equals `b` in sequence space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

/// `true` when `a` comes strictly after `b` in sequence space.
#[inline]
pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

/// `true` when `a` comes after or equals `b` in sequence space.
#[inline]
pub fn seq_ge(a: u32, b: u32) -> bool {
    seq_le(b, a)
}

/// `true` when `lo < x <= hi` in sequence space.
#[inline]
pub fn seq_in_half_open(x: u32, lo: u32, hi: u32) -> bool {
    seq_lt(lo, x) && seq_le(x, hi)
}
