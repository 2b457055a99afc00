//! Shared fixtures: literal-table construction, plan builders, and a
//! page-format decoder for asserting on executed results.
#![allow(dead_code)] // each test binary uses a subset

use core_pages::write::{i32_column, varchar_column};
use core_pages::{Column, ColumnarTable, DataType, PageKind, PAGE_HEADER_BYTES};
use core_plan::{JoinNode, Node, OutputAttr, Plan};

/// A decoded output cell, comparable and sortable for order-insensitive
/// assertions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cell {
    Null,
    I(i32),
    S(String),
}

pub fn int_table(columns: &[&[Option<i32>]]) -> ColumnarTable {
    let rows = columns.first().map(|c| c.len()).unwrap_or(0);
    ColumnarTable::new(rows, columns.iter().map(|c| i32_column(c)).collect())
}

/// Table with one i32 column and one varchar column.
pub fn int_str_table(ints: &[Option<i32>], strs: &[Option<&str>]) -> ColumnarTable {
    assert_eq!(ints.len(), strs.len());
    ColumnarTable::new(ints.len(), vec![i32_column(ints), varchar_column(strs)])
}

/// Plan: single scan over table 0 projecting all its columns.
pub fn scan_plan(table: ColumnarTable) -> Plan {
    let attrs: Vec<OutputAttr> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| OutputAttr::new(i, c.data_type))
        .collect();
    Plan::new(vec![Node::scan(0, attrs)], 0, vec![table])
}

/// Plan: `scan(t0) JOIN scan(t1)` on the given key columns, projecting
/// `output` over the concatenated left-then-right schemas.
pub fn join_plan(
    left: ColumnarTable,
    right: ColumnarTable,
    build_left: bool,
    left_attr: usize,
    right_attr: usize,
    output: Vec<OutputAttr>,
) -> Plan {
    let left_attrs: Vec<OutputAttr> = left
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| OutputAttr::new(i, c.data_type))
        .collect();
    let right_attrs: Vec<OutputAttr> = right
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| OutputAttr::new(i, c.data_type))
        .collect();
    let join = Node::join(
        JoinNode {
            build_left,
            left: 0,
            right: 1,
            left_attr,
            right_attr,
        },
        output,
    );
    Plan::new(
        vec![
            Node::scan(0, left_attrs),
            Node::scan(1, right_attrs),
            join,
        ],
        2,
        vec![left, right],
    )
}

/// Decode an output table back into rows of cells.
pub fn table_rows(table: &ColumnarTable) -> Vec<Vec<Cell>> {
    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); table.num_rows];
    for column in &table.columns {
        match column.data_type {
            DataType::Int32 => decode_i32(column, &mut rows),
            DataType::Varchar => decode_varchar(column, &mut rows),
            other => panic!("decoder does not cover {other:?}"),
        }
    }
    rows
}

/// Rows sorted for order-insensitive comparison.
pub fn sorted_rows(table: &ColumnarTable) -> Vec<Vec<Cell>> {
    let mut rows = table_rows(table);
    rows.sort();
    rows
}

fn decode_i32(column: &Column, rows: &mut [Vec<Cell>]) {
    let mut row_idx = 0usize;
    for page in &column.pages {
        let PageKind::Regular(n) = page.kind() else {
            panic!("sentinel page in i32 column");
        };
        let n = n as usize;
        for i in 0..n {
            let cell = if page.bitmap_get(n, i) {
                Cell::I(page.i32_at(i))
            } else {
                Cell::Null
            };
            rows[row_idx].push(cell);
            row_idx += 1;
        }
    }
    assert_eq!(row_idx, rows.len(), "i32 column row count mismatch");
}

fn decode_varchar(column: &Column, rows: &mut [Vec<Cell>]) {
    let mut row_idx = 0usize;
    let mut page_idx = 0usize;
    while page_idx < column.pages.len() {
        let page = &column.pages[page_idx];
        match page.kind() {
            PageKind::Regular(n) => {
                let n = n as usize;
                let non_null = page.non_null_count() as usize;
                let data_base = PAGE_HEADER_BYTES + non_null * 2;
                let mut seen_non_null = 0usize;
                for i in 0..n {
                    if page.bitmap_get(n, i) {
                        let start = if seen_non_null == 0 {
                            0
                        } else {
                            page.u16_at(PAGE_HEADER_BYTES + (seen_non_null - 1) * 2) as usize
                        };
                        let end = page.u16_at(PAGE_HEADER_BYTES + seen_non_null * 2) as usize;
                        let bytes = &page.bytes()[data_base + start..data_base + end];
                        rows[row_idx].push(Cell::S(String::from_utf8(bytes.to_vec()).unwrap()));
                        seen_non_null += 1;
                    } else {
                        rows[row_idx].push(Cell::Null);
                    }
                    row_idx += 1;
                }
                page_idx += 1;
            }
            PageKind::LongStarter => {
                let mut bytes = Vec::new();
                let len = page.non_null_count() as usize;
                bytes.extend_from_slice(&page.bytes()[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + len]);
                page_idx += 1;
                while page_idx < column.pages.len()
                    && column.pages[page_idx].kind() == PageKind::LongContinuation
                {
                    let cont = &column.pages[page_idx];
                    let len = cont.non_null_count() as usize;
                    bytes.extend_from_slice(
                        &cont.bytes()[PAGE_HEADER_BYTES..PAGE_HEADER_BYTES + len],
                    );
                    page_idx += 1;
                }
                rows[row_idx].push(Cell::S(String::from_utf8(bytes).unwrap()));
                row_idx += 1;
            }
            PageKind::LongContinuation => panic!("continuation without starter"),
        }
    }
    assert_eq!(row_idx, rows.len(), "varchar column row count mismatch");
}
