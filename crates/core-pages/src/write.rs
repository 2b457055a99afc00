//! Page writers: append row values, emit pages in the engine's binary
//! page format.
//!
//! Used by the finalizer to turn column buffers back into pages and by
//! tests to build input tables.

use crate::page::{
    fixed_page_capacity, Page, LONG_CONTINUATION, LONG_STARTER, PAGE_HEADER_BYTES, PAGE_SIZE,
};
use crate::{Column, DataType};

/// Largest string that still fits alone in a fresh regular page
/// (header + one offset entry + one bitmap byte). Anything longer spills
/// into a starter + continuation chain.
pub const MAX_INLINE_STRING: usize = PAGE_SIZE - PAGE_HEADER_BYTES - 2 - 1;

/// Largest fragment a long-string page can carry.
const FRAGMENT_CAPACITY: usize = PAGE_SIZE - PAGE_HEADER_BYTES;

/// Fixed-width payload element.
pub trait FixedWidth: Copy {
    const DATA_TYPE: DataType;
    const WIDTH: usize;
    fn store(self, dst: &mut [u8]);
}

impl FixedWidth for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
    const WIDTH: usize = 4;
    fn store(self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.to_le_bytes());
    }
}

impl FixedWidth for i64 {
    const DATA_TYPE: DataType = DataType::Int64;
    const WIDTH: usize = 8;
    fn store(self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.to_le_bytes());
    }
}

impl FixedWidth for f64 {
    const DATA_TYPE: DataType = DataType::Float64;
    const WIDTH: usize = 8;
    fn store(self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.to_le_bytes());
    }
}

/// Writer for I32/I64/F64 columns. Null rows occupy a zeroed payload slot
/// and a cleared validity bit.
pub struct FixedColumnWriter<T: FixedWidth> {
    pages: Vec<Page>,
    pending: Vec<Option<T>>,
}

impl<T: FixedWidth> FixedColumnWriter<T> {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Option<T>) {
        self.pending.push(value);
        if self.pending.len() == fixed_page_capacity(T::WIDTH) {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let rows = self.pending.len();
        let mut page = Page::new();
        page.put_u16(0, rows as u16);
        let mut non_null = 0u16;
        for (i, value) in self.pending.iter().enumerate() {
            let base = PAGE_HEADER_BYTES + i * T::WIDTH;
            if let Some(v) = value {
                v.store(&mut page.bytes_mut()[base..base + T::WIDTH]);
                page.bitmap_set(rows, i, true);
                non_null += 1;
            }
        }
        page.put_u16(2, non_null);
        self.pages.push(page);
        self.pending.clear();
    }

    pub fn finish(mut self) -> Column {
        self.flush();
        Column {
            data_type: T::DATA_TYPE,
            pages: self.pages,
        }
    }
}

impl<T: FixedWidth> Default for FixedColumnWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer for VARCHAR columns. Regular pages fill greedily; strings that
/// cannot fit alone in a fresh page spill into a starter page followed by
/// continuation pages (one logical row per chain).
pub struct VarcharColumnWriter {
    pages: Vec<Page>,
    rows: usize,
    validity: Vec<bool>,
    offsets: Vec<u16>,
    bytes: Vec<u8>,
}

impl VarcharColumnWriter {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            rows: 0,
            validity: Vec::new(),
            offsets: Vec::new(),
            bytes: Vec::new(),
        }
    }

    fn fits(&self, extra_bytes: usize, extra_offset: usize) -> bool {
        PAGE_HEADER_BYTES
            + (self.offsets.len() + extra_offset) * 2
            + self.bytes.len()
            + extra_bytes
            + (self.rows + 1).div_ceil(8)
            <= PAGE_SIZE
    }

    pub fn push(&mut self, value: Option<&[u8]>) {
        match value {
            None => {
                if !self.fits(0, 0) {
                    self.flush();
                }
                self.validity.push(false);
                self.rows += 1;
            }
            Some(s) if s.len() > MAX_INLINE_STRING => {
                self.flush();
                self.write_long(s);
            }
            Some(s) => {
                if !self.fits(s.len(), 1) {
                    self.flush();
                }
                self.bytes.extend_from_slice(s);
                self.offsets.push(self.bytes.len() as u16);
                self.validity.push(true);
                self.rows += 1;
            }
        }
    }

    pub fn push_str(&mut self, value: Option<&str>) {
        self.push(value.map(str::as_bytes));
    }

    fn flush(&mut self) {
        if self.rows == 0 {
            return;
        }
        let mut page = Page::new();
        page.put_u16(0, self.rows as u16);
        page.put_u16(2, self.offsets.len() as u16);
        for (i, end) in self.offsets.iter().enumerate() {
            page.put_u16(PAGE_HEADER_BYTES + i * 2, *end);
        }
        let data_base = PAGE_HEADER_BYTES + self.offsets.len() * 2;
        page.bytes_mut()[data_base..data_base + self.bytes.len()].copy_from_slice(&self.bytes);
        for (row, &not_null) in self.validity.iter().enumerate() {
            page.bitmap_set(self.rows, row, not_null);
        }
        self.pages.push(page);
        self.rows = 0;
        self.validity.clear();
        self.offsets.clear();
        self.bytes.clear();
    }

    fn write_long(&mut self, s: &[u8]) {
        let mut remaining = s;
        let mut first = true;
        while first || !remaining.is_empty() {
            let take = remaining.len().min(FRAGMENT_CAPACITY);
            let mut page = Page::new();
            page.put_u16(0, if first { LONG_STARTER } else { LONG_CONTINUATION });
            page.put_u16(2, take as u16);
            page.bytes_mut()[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + take]
                .copy_from_slice(&remaining[..take]);
            self.pages.push(page);
            remaining = &remaining[take..];
            first = false;
        }
    }

    pub fn finish(mut self) -> Column {
        self.flush();
        Column {
            data_type: DataType::Varchar,
            pages: self.pages,
        }
    }
}

impl Default for VarcharColumnWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an I32 column from literal rows.
pub fn i32_column(values: &[Option<i32>]) -> Column {
    let mut w = FixedColumnWriter::<i32>::new();
    for v in values {
        w.push(*v);
    }
    w.finish()
}

/// Build a VARCHAR column from literal rows.
pub fn varchar_column(values: &[Option<&str>]) -> Column {
    let mut w = VarcharColumnWriter::new();
    for v in values {
        w.push_str(*v);
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageKind;

    #[test]
    fn i32_writer_splits_pages() {
        let cap = fixed_page_capacity(4);
        let values: Vec<Option<i32>> = (0..cap as i32 + 3).map(Some).collect();
        let col = i32_column(&values);
        assert_eq!(col.pages.len(), 2);
        assert_eq!(col.pages[0].row_count() as usize, cap);
        assert_eq!(col.pages[1].row_count(), 3);
        assert_eq!(col.row_count(), cap + 3);
        assert!(col.pages[0].bitmap_all_ones());
    }

    #[test]
    fn i32_writer_records_nulls() {
        let col = i32_column(&[Some(1), None, Some(3)]);
        let page = &col.pages[0];
        assert_eq!(page.row_count(), 3);
        assert_eq!(page.non_null_count(), 2);
        assert!(page.bitmap_get(3, 0));
        assert!(!page.bitmap_get(3, 1));
        assert!(page.bitmap_get(3, 2));
        assert!(!page.bitmap_all_ones());
        assert_eq!(page.i32_at(2), 3);
    }

    #[test]
    fn varchar_writer_offsets() {
        let col = varchar_column(&[Some("ab"), None, Some("cde")]);
        let page = &col.pages[0];
        assert_eq!(page.row_count(), 3);
        assert_eq!(page.non_null_count(), 2);
        // End offsets over the concatenated payload "abcde".
        assert_eq!(page.u16_at(PAGE_HEADER_BYTES), 2);
        assert_eq!(page.u16_at(PAGE_HEADER_BYTES + 2), 5);
        assert!(!page.bitmap_get(3, 1));
    }

    #[test]
    fn long_string_chain() {
        let body = "x".repeat(MAX_INLINE_STRING + FRAGMENT_CAPACITY + 10);
        let col = varchar_column(&[Some("short"), Some(&body), Some("tail")]);
        let kinds: Vec<PageKind> = col.pages.iter().map(Page::kind).collect();
        assert_eq!(
            kinds,
            vec![
                PageKind::Regular(1),
                PageKind::LongStarter,
                PageKind::LongContinuation,
                PageKind::LongContinuation,
                PageKind::Regular(1),
            ]
        );
        assert_eq!(col.row_count(), 3);
    }
}
