//! Long strings (starter + continuation chains) surviving scan, join,
//! and finalization byte-for-byte.

mod common;

use common::{join_plan, scan_plan, table_rows, Cell};
use core_exec::execute;
use core_pages::write::{i32_column, varchar_column, MAX_INLINE_STRING};
use core_pages::{ColumnarTable, DataType};
use core_plan::{EngineConfig, OutputAttr};

fn long_body(len: usize) -> String {
    (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect()
}

#[test]
fn scan_finalize_round_trips_long_strings() {
    let body = long_body(MAX_INLINE_STRING * 2 + 123);
    let strs = vec![Some("short"), Some(body.as_str()), None, Some("tail")];
    let table_in = ColumnarTable::new(4, vec![varchar_column(&strs)]);
    let plan = scan_plan(table_in);
    let table = execute(&plan, &EngineConfig::default()).unwrap();
    assert_eq!(
        table_rows(&table),
        vec![
            vec![Cell::S("short".into())],
            vec![Cell::S(body.clone())],
            vec![Cell::Null],
            vec![Cell::S("tail".into())],
        ]
    );
}

#[test]
fn join_output_materializes_long_strings() {
    let body = long_body(MAX_INLINE_STRING + 77);
    let left = ColumnarTable::new(
        2,
        vec![
            i32_column(&[Some(7), Some(8)]),
            varchar_column(&[Some(body.as_str()), Some("b")]),
        ],
    );
    let right = ColumnarTable::new(1, vec![i32_column(&[Some(7)])]);
    let plan = join_plan(
        left,
        right,
        true,
        0,
        0,
        vec![
            OutputAttr::new(0, DataType::Int32),
            OutputAttr::new(1, DataType::Varchar),
        ],
    );
    let table = execute(&plan, &EngineConfig::default()).unwrap();
    assert_eq!(
        table_rows(&table),
        vec![vec![Cell::I(7), Cell::S(body)]]
    );
}
