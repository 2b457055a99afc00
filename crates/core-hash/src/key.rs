//! Join key hashing.
//!
//! The directory takes its slot from the *high* bits of the hash, so the
//! hash must spread entropy upward. For i32 keys that is Knuth's
//! multiplicative (Fibonacci) hashing; for packed string references the
//! same multiplier is followed by an xor-shift so the reference's
//! high-field bits (table, column, flags) cannot dominate the slot.

/// 2^64 / phi, Knuth's multiplicative hashing constant.
const FIBONACCI: u64 = 11_400_714_819_323_198_485;

/// A key the unchained table can build on and probe with.
pub trait JoinKey: Copy + Eq + Send + Sync + 'static {
    fn join_hash(self) -> u64;
}

impl JoinKey for i32 {
    #[inline]
    fn join_hash(self) -> u64 {
        (self as u32 as u64).wrapping_mul(FIBONACCI)
    }
}

/// Packed string references compare by raw bits; hashing mixes all 64.
impl JoinKey for u64 {
    #[inline]
    fn join_hash(self) -> u64 {
        let h = self.wrapping_mul(FIBONACCI);
        h ^ (h >> 29)
    }
}
