//! The 64-bit packed string reference.
//!
//! A VARCHAR value is carried through the engine as a reference into its
//! source pages instead of an owned string; only finalization copies
//! bytes. Field layout, low to high:
//!
//! ```text
//! [offset: 20][page: 24][column: 8][table: 8][flags: 4]
//! ```
//!
//! `offset` indexes the page's non-null strings (the offsets-table slot),
//! not a byte position. References from the same source column compare
//! equal iff they address the same logical string, so raw 64-bit equality
//! stands in for string equality on the join path.

use bitflags::bitflags;

bitflags! {
    /// The reference's 4-bit flag field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RefFlags: u8 {
        const NULL = 0b0001;
        const LONG = 0b0010;
    }
}

const OFFSET_BITS: u32 = 20;
const PAGE_BITS: u32 = 24;
const COLUMN_BITS: u32 = 8;
const TABLE_BITS: u32 = 8;

const PAGE_SHIFT: u32 = OFFSET_BITS;
const COLUMN_SHIFT: u32 = OFFSET_BITS + PAGE_BITS;
const TABLE_SHIFT: u32 = COLUMN_SHIFT + COLUMN_BITS;
const FLAGS_SHIFT: u32 = TABLE_SHIFT + TABLE_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringRef(u64);

impl StringRef {
    pub fn pack(table: u8, column: u8, page: u32, offset: u32, flags: RefFlags) -> Self {
        debug_assert!(page < (1 << PAGE_BITS));
        debug_assert!(offset < (1 << OFFSET_BITS));
        let mut raw = 0u64;
        raw |= u64::from(offset & ((1 << OFFSET_BITS) - 1));
        raw |= u64::from(page & ((1 << PAGE_BITS) - 1)) << PAGE_SHIFT;
        raw |= u64::from(column) << COLUMN_SHIFT;
        raw |= u64::from(table) << TABLE_SHIFT;
        raw |= u64::from(flags.bits()) << FLAGS_SHIFT;
        Self(raw)
    }

    /// The reference every null VARCHAR value carries.
    pub fn null() -> Self {
        Self::pack(0, 0, 0, 0, RefFlags::NULL)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn table(self) -> u8 {
        ((self.0 >> TABLE_SHIFT) & ((1 << TABLE_BITS) - 1)) as u8
    }

    pub fn column(self) -> u8 {
        ((self.0 >> COLUMN_SHIFT) & ((1 << COLUMN_BITS) - 1)) as u8
    }

    pub fn page(self) -> u32 {
        ((self.0 >> PAGE_SHIFT) & ((1 << PAGE_BITS) - 1)) as u32
    }

    pub fn offset(self) -> u32 {
        (self.0 & ((1 << OFFSET_BITS) - 1)) as u32
    }

    pub fn flags(self) -> RefFlags {
        RefFlags::from_bits_truncate((self.0 >> FLAGS_SHIFT) as u8)
    }

    pub fn is_null(self) -> bool {
        self.flags().contains(RefFlags::NULL)
    }

    pub fn is_long(self) -> bool {
        self.flags().contains(RefFlags::LONG)
    }
}
