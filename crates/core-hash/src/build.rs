//! High-level build entry points: from a column view to a probe-ready
//! table, choosing serial vs. partitioned and the zero-copy fast path.
//!
//! Null keys never enter the table; joins simply cannot match them. An
//! empty build side is not an error here, it just yields an empty table
//! the caller can short-circuit on.

use crate::parallel::{build_partitioned, build_partitioned_zero_copy};
use crate::table::{Tuple, UnchainedTable};
use core_columns::{ColumnView, PageCursor, TaggedValue};
use core_pages::DataType;
use core_plan::{EngineConfig, EngineError};
use core_slab::GlobalArena;
use tracing::debug;

/// Build an i32-keyed table over `view`'s non-null keys.
pub fn build_i32_table(
    view: &ColumnView<'_>,
    config: &EngineConfig,
    global: &GlobalArena,
) -> Result<UnchainedTable<i32>, EngineError> {
    let rows = view.len();
    let threads = config.effective_threads();

    if let Some(zero_copy) = view.as_zero_copy() {
        // No nulls by admission; keys come straight off the pages.
        if rows >= config.build_parallel_min_rows && threads > 1 {
            return build_partitioned_zero_copy(
                zero_copy,
                threads,
                config.target_bucket_load,
                global,
            );
        }
        return Ok(UnchainedTable::build_from_zero_copy(
            zero_copy,
            config.target_bucket_load,
        ));
    }

    let mut entries = Vec::with_capacity(rows);
    let mut cursor = PageCursor::default();
    for row in 0..rows {
        match view.get_cached(row, &mut cursor) {
            TaggedValue::Null => continue,
            TaggedValue::I32(key) => entries.push(Tuple {
                key,
                row_id: row as u32,
            }),
            other => {
                return Err(EngineError::UnsupportedKeyType {
                    found: other.data_type().unwrap_or(DataType::Int32),
                    row: Some(row),
                })
            }
        }
    }
    debug!(target: "hash.build", rows, keys = entries.len(), "gathered_build_entries");

    if entries.len() >= config.build_parallel_min_rows && threads > 1 {
        build_partitioned(&entries, threads, config.target_bucket_load, global)
    } else {
        Ok(UnchainedTable::build(&entries, config.target_bucket_load))
    }
}

/// Build a packed-reference-keyed table for the VARCHAR join path.
/// Serial by contract; reference equality stands in for string equality.
pub fn build_ref_table(
    view: &ColumnView<'_>,
    config: &EngineConfig,
) -> Result<UnchainedTable<u64>, EngineError> {
    let rows = view.len();
    let mut entries = Vec::with_capacity(rows);
    let mut cursor = PageCursor::default();
    for row in 0..rows {
        match view.get_cached(row, &mut cursor) {
            TaggedValue::Null => continue,
            TaggedValue::Str(r) if r.is_null() => continue,
            TaggedValue::Str(r) => entries.push(Tuple {
                key: r.raw(),
                row_id: row as u32,
            }),
            other => {
                return Err(EngineError::UnsupportedKeyType {
                    found: other.data_type().unwrap_or(DataType::Varchar),
                    row: Some(row),
                })
            }
        }
    }
    debug!(target: "hash.build", rows, keys = entries.len(), "gathered_ref_entries");
    Ok(UnchainedTable::build(&entries, config.target_bucket_load))
}
