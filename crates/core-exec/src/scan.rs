//! Scan: admit an input table's columns into a column buffer.
//!
//! I32 columns with fully set validity bitmaps get a zero-copy view;
//! everything else materializes. VARCHAR rows materialize as packed
//! references only, with the reference's offset field set to the row's
//! index among the page's non-null strings.

use ahash::AHashMap;
use core_columns::{
    zero_copy_admissible, ColumnBuffer, ColumnView, MaterializedColumn, TaggedValue,
    ZeroCopyColumn,
};
use core_pages::{Column, DataType, PageKind, RefFlags, StringRef};
use core_plan::{EngineError, OutputAttr, Plan, ScanNode};
use tracing::debug;

pub fn scan_to_buffer<'p>(
    plan: &'p Plan,
    scan: &ScanNode,
    output_attrs: &[OutputAttr],
) -> Result<ColumnBuffer<'p>, EngineError> {
    let table = &plan.inputs[scan.base_table];
    let mut buffer = ColumnBuffer::new(output_attrs.iter().map(|a| a.data_type).collect());
    buffer.num_rows = table.num_rows;

    for attr in output_attrs {
        let column = &table.columns[attr.source];
        let view = match attr.data_type {
            DataType::Int32 if zero_copy_admissible(column) => {
                debug!(
                    target: "exec.scan",
                    table = scan.base_table,
                    column = attr.source,
                    "zero_copy_admitted"
                );
                ColumnView::ZeroCopy(ZeroCopyColumn::new(column))
            }
            DataType::Int32 => materialize_fixed(column, |p, i| TaggedValue::I32(p.i32_at(i)))?,
            DataType::Int64 => materialize_fixed(column, |p, i| TaggedValue::I64(p.i64_at(i)))?,
            DataType::Float64 => materialize_fixed(column, |p, i| TaggedValue::F64(p.f64_at(i)))?,
            DataType::Varchar => materialize_varchar(scan.base_table, attr.source, column)?,
        };
        if view.len() != table.num_rows {
            return Err(EngineError::InvariantViolation(
                "scanned column row count diverges from table",
            ));
        }
        buffer.columns.push(view);
    }
    buffer.assert_aligned();
    Ok(buffer)
}

fn materialize_fixed<'p>(
    column: &Column,
    read: impl Fn(&core_pages::Page, usize) -> TaggedValue,
) -> Result<ColumnView<'p>, EngineError> {
    let mut out = MaterializedColumn::new();
    for page in &column.pages {
        let rows = match page.kind() {
            PageKind::Regular(rows) => rows as usize,
            _ => {
                return Err(EngineError::InvariantViolation(
                    "long-string page in fixed-width column",
                ))
            }
        };
        for row in 0..rows {
            if page.bitmap_get(rows, row) {
                out.append(read(page, row));
            } else {
                out.append(TaggedValue::Null);
            }
        }
    }
    Ok(ColumnView::Materialized(out))
}

/// Materialize a VARCHAR column as packed references, canonicalized so
/// that equal strings within the column share one reference. Reference
/// equality then stands in for string equality on the join path.
fn materialize_varchar<'p>(
    table_idx: usize,
    col_idx: usize,
    column: &Column,
) -> Result<ColumnView<'p>, EngineError> {
    let mut out = MaterializedColumn::new();
    let mut canonical: AHashMap<Vec<u8>, StringRef> = AHashMap::new();
    for (page_idx, page) in column.pages.iter().enumerate() {
        match page.kind() {
            PageKind::Regular(rows) => {
                let rows = rows as usize;
                let non_null = page.non_null_count() as usize;
                let mut non_null_idx = 0usize;
                for row in 0..rows {
                    if page.bitmap_get(rows, row) {
                        let r = StringRef::pack(
                            table_idx as u8,
                            col_idx as u8,
                            page_idx as u32,
                            non_null_idx as u32,
                            RefFlags::empty(),
                        );
                        let bytes = regular_page_string(page, non_null_idx, non_null);
                        let r = *canonical.entry(bytes.to_vec()).or_insert(r);
                        out.append(TaggedValue::Str(r));
                        non_null_idx += 1;
                    } else {
                        out.append(TaggedValue::Null);
                    }
                }
            }
            PageKind::LongStarter => {
                let r = StringRef::pack(
                    table_idx as u8,
                    col_idx as u8,
                    page_idx as u32,
                    0,
                    RefFlags::LONG,
                );
                let bytes = long_chain_bytes(column, page_idx);
                let r = *canonical.entry(bytes).or_insert(r);
                out.append(TaggedValue::Str(r));
            }
            // Continuations carry no rows of their own.
            PageKind::LongContinuation => {}
        }
    }
    Ok(ColumnView::Materialized(out))
}

/// The `idx`-th non-null string of a regular VARCHAR page.
fn regular_page_string(page: &core_pages::Page, idx: usize, non_null: usize) -> &[u8] {
    let offsets_base = core_pages::PAGE_HEADER_BYTES;
    let data_base = offsets_base + non_null * 2;
    let start = if idx == 0 {
        0
    } else {
        page.u16_at(offsets_base + (idx - 1) * 2) as usize
    };
    let end = page.u16_at(offsets_base + idx * 2) as usize;
    &page.bytes()[data_base + start..data_base + end]
}

/// Concatenate the starter + continuation fragments beginning at
/// `starter_idx`.
fn long_chain_bytes(column: &Column, starter_idx: usize) -> Vec<u8> {
    let header = core_pages::PAGE_HEADER_BYTES;
    let mut bytes = Vec::new();
    for (i, page) in column.pages.iter().enumerate().skip(starter_idx) {
        if i > starter_idx && page.kind() != PageKind::LongContinuation {
            break;
        }
        let len = page.non_null_count() as usize;
        bytes.extend_from_slice(&page.bytes()[header..header + len]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_pages::write::{i32_column, varchar_column};
    use core_pages::{ColumnarTable, StringResolver};
    use core_plan::Node;

    fn plan_of(table: ColumnarTable, attrs: Vec<OutputAttr>) -> Plan {
        Plan::new(vec![Node::scan(0, attrs)], 0, vec![table])
    }

    #[test]
    fn clean_i32_column_admits_zero_copy() {
        let col = i32_column(&[Some(1), Some(2), Some(3)]);
        let plan = plan_of(
            ColumnarTable::new(3, vec![col]),
            vec![OutputAttr::new(0, DataType::Int32)],
        );
        let scan = ScanNode { base_table: 0 };
        let buf = scan_to_buffer(&plan, &scan, &plan.nodes[0].output_attrs).unwrap();
        assert!(buf.columns[0].is_zero_copy());
        assert_eq!(buf.columns[0].get(1), TaggedValue::I32(2));
    }

    #[test]
    fn nullable_i32_column_materializes() {
        let col = i32_column(&[Some(1), None, Some(3)]);
        let plan = plan_of(
            ColumnarTable::new(3, vec![col]),
            vec![OutputAttr::new(0, DataType::Int32)],
        );
        let scan = ScanNode { base_table: 0 };
        let buf = scan_to_buffer(&plan, &scan, &plan.nodes[0].output_attrs).unwrap();
        assert!(!buf.columns[0].is_zero_copy());
        assert_eq!(buf.columns[0].get(0), TaggedValue::I32(1));
        assert_eq!(buf.columns[0].get(1), TaggedValue::Null);
        assert_eq!(buf.columns[0].get(2), TaggedValue::I32(3));
    }

    #[test]
    fn equal_strings_share_one_canonical_reference() {
        let col = varchar_column(&[Some("dup"), Some("other"), Some("dup")]);
        let plan = plan_of(
            ColumnarTable::new(3, vec![col]),
            vec![OutputAttr::new(0, DataType::Varchar)],
        );
        let scan = ScanNode { base_table: 0 };
        let buf = scan_to_buffer(&plan, &scan, &plan.nodes[0].output_attrs).unwrap();
        let r0 = buf.columns[0].get(0).as_str_ref().unwrap();
        let r1 = buf.columns[0].get(1).as_str_ref().unwrap();
        let r2 = buf.columns[0].get(2).as_str_ref().unwrap();
        assert_eq!(r0, r2);
        assert_ne!(r0, r1);
    }

    #[test]
    fn varchar_scan_produces_resolvable_refs() {
        let col = varchar_column(&[Some("alpha"), None, Some("beta")]);
        let plan = plan_of(
            ColumnarTable::new(3, vec![col]),
            vec![OutputAttr::new(0, DataType::Varchar)],
        );
        let scan = ScanNode { base_table: 0 };
        let buf = scan_to_buffer(&plan, &scan, &plan.nodes[0].output_attrs).unwrap();

        let resolver = StringResolver::new(&plan.inputs);
        let mut scratch = Vec::new();
        let r0 = buf.columns[0].get(0).as_str_ref().unwrap();
        assert_eq!(resolver.resolve(r0, &mut scratch).unwrap(), b"alpha");
        assert_eq!(buf.columns[0].get(1), TaggedValue::Null);
        let r2 = buf.columns[0].get(2).as_str_ref().unwrap();
        assert_eq!(resolver.resolve(r2, &mut scratch).unwrap(), b"beta");
    }
}
