//! Paged columnar storage: the on-page binary formats, the page catalog
//! types (`Column`, `ColumnarTable`), the 64-bit packed string reference,
//! and the resolver that turns a reference back into bytes.
//!
//! Pages are fixed 8 KiB blocks. Fixed-width pages carry a little-endian
//! payload after a 4-byte header and an end-aligned validity bitmap.
//! VARCHAR pages carry an offsets table over concatenated string bytes;
//! strings too large for a single page spill into a starter page followed
//! by continuation pages, marked by row-count sentinels.

pub mod error;
pub mod page;
pub mod resolve;
pub mod strref;
pub mod write;

pub use error::PageError;
pub use page::{Page, PageKind, LONG_CONTINUATION, LONG_STARTER, PAGE_HEADER_BYTES, PAGE_SIZE};
pub use resolve::StringResolver;
pub use strref::{RefFlags, StringRef};
pub use write::{FixedColumnWriter, FixedWidth, VarcharColumnWriter};

/// Column value types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Int64,
    Float64,
    Varchar,
}

impl DataType {
    /// Payload width in bytes for fixed-width types; `None` for VARCHAR.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Int32 => Some(4),
            DataType::Int64 => Some(8),
            DataType::Float64 => Some(8),
            DataType::Varchar => None,
        }
    }
}

/// One column of an input or output table: a type tag plus its pages.
pub struct Column {
    pub data_type: DataType,
    pub pages: Vec<Page>,
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            pages: Vec::new(),
        }
    }

    /// Total row count across pages. Long-string starter pages count as a
    /// single row; continuation pages count as zero.
    pub fn row_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| match p.kind() {
                PageKind::Regular(rows) => rows as usize,
                PageKind::LongStarter => 1,
                PageKind::LongContinuation => 0,
            })
            .sum()
    }
}

/// An ordered sequence of equal-length columns.
pub struct ColumnarTable {
    pub num_rows: usize,
    pub columns: Vec<Column>,
}

impl ColumnarTable {
    pub fn new(num_rows: usize, columns: Vec<Column>) -> Self {
        Self { num_rows, columns }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}
