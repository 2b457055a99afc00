//! Packed-reference resolution against the page catalog.

use crate::error::PageError;
use crate::page::{Page, PageKind, PAGE_HEADER_BYTES, PAGE_SIZE};
use crate::strref::StringRef;
use crate::ColumnarTable;

/// Resolves [`StringRef`]s into byte slices over a set of input tables.
///
/// Regular references borrow straight from the source page; long-string
/// references are assembled from their starter + continuation chain into
/// the caller's scratch buffer and borrow from it. The returned slice is
/// valid for the shorter of the two borrows.
pub struct StringResolver<'a> {
    tables: &'a [ColumnarTable],
}

impl<'a> StringResolver<'a> {
    pub fn new(tables: &'a [ColumnarTable]) -> Self {
        Self { tables }
    }

    pub fn resolve<'s>(
        &'s self,
        r: StringRef,
        scratch: &'s mut Vec<u8>,
    ) -> Result<&'s [u8], PageError> {
        let bad = |reason| PageError::BadReference {
            raw: r.raw(),
            reason,
        };

        if r.is_null() {
            return Err(bad("null reference dereferenced"));
        }

        let table = self
            .tables
            .get(r.table() as usize)
            .ok_or_else(|| bad("table index out of range"))?;
        let column = table
            .columns
            .get(r.column() as usize)
            .ok_or_else(|| bad("column index out of range"))?;
        let page_idx = r.page() as usize;
        let page = column
            .pages
            .get(page_idx)
            .ok_or_else(|| bad("page index out of range"))?;

        match page.kind() {
            PageKind::LongStarter => {
                scratch.clear();
                append_fragment(page, scratch)?;
                for follow in &column.pages[page_idx + 1..] {
                    if follow.kind() != PageKind::LongContinuation {
                        break;
                    }
                    append_fragment(follow, scratch)?;
                }
                Ok(&scratch[..])
            }
            PageKind::LongContinuation => Err(bad("reference into a continuation page")),
            PageKind::Regular(rows) => {
                let non_null = page.non_null_count() as usize;
                let offset = r.offset() as usize;
                if offset >= non_null {
                    return Err(bad("offset past the page's non-null strings"));
                }
                let offsets_base = PAGE_HEADER_BYTES;
                let data_base = offsets_base + non_null * 2;
                let start = if offset == 0 {
                    0
                } else {
                    page.u16_at(offsets_base + (offset - 1) * 2) as usize
                };
                let end = page.u16_at(offsets_base + offset * 2) as usize;
                let bitmap_bytes = (rows as usize).div_ceil(8);
                if start > end || data_base + end > PAGE_SIZE - bitmap_bytes {
                    return Err(bad("string bytes outside the page payload"));
                }
                Ok(&page.bytes()[data_base + start..data_base + end])
            }
        }
    }
}

fn append_fragment(page: &Page, scratch: &mut Vec<u8>) -> Result<(), PageError> {
    let len = page.non_null_count() as usize;
    if PAGE_HEADER_BYTES + len > PAGE_SIZE {
        return Err(PageError::MalformedPage("fragment length past page end"));
    }
    scratch.extend_from_slice(&page.bytes()[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + len]);
    Ok(())
}
