//! Hash-join operator: build one side, probe the other with work
//! stealing, materialize directly into pre-sized output pages.
//!
//! Output row order is the concatenation, in thread id order, of each
//! worker's emission order; workers emit in the scan order of the blocks
//! they stole. Callers needing a specific order must sort.

use crate::steal::WorkQueue;
use core_columns::{ColumnBuffer, ColumnView, MaterializedColumn, PageCursor, TaggedValue};
use core_hash::{build_i32_table, build_ref_table, JoinKey, UnchainedTable};
use core_pages::DataType;
use core_plan::{EngineConfig, EngineError, JoinNode, OutputAttr, Plan};
use core_slab::GlobalArena;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Per-join lifecycle, tracked for tracing and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinPhase {
    Pending,
    ChildrenDone,
    HashBuilt,
    Probed,
    Materialized,
    Emitted,
    BuildFailed,
    ProbeFailed,
}

/// An emitted match, already oriented as (left row, right row).
#[derive(Clone, Copy)]
struct OutPair {
    left_row: u32,
    right_row: u32,
}

struct SourceMap {
    from_left: bool,
    index: usize,
}

pub(crate) fn execute_join<'p>(
    plan: &'p Plan,
    node_idx: usize,
    join: &JoinNode,
    left: &ColumnBuffer<'p>,
    right: &ColumnBuffer<'p>,
    output_attrs: &[OutputAttr],
    config: &EngineConfig,
) -> Result<ColumnBuffer<'p>, EngineError> {
    let left_key = plan.nodes[join.left].output_attrs[join.left_attr].data_type;
    let right_key = plan.nodes[join.right].output_attrs[join.right_attr].data_type;

    let mut exec = JoinExec {
        build_left: join.build_left,
        left,
        right,
        left_col: join.left_attr,
        right_col: join.right_attr,
        output_attrs,
        config,
        node: node_idx,
        phase: JoinPhase::Pending,
    };
    exec.advance(JoinPhase::ChildrenDone);

    if left_key != right_key {
        let probe_side = if join.build_left { right_key } else { left_key };
        exec.advance(JoinPhase::BuildFailed);
        return Err(EngineError::UnsupportedKeyType {
            found: probe_side,
            row: None,
        });
    }
    match left_key {
        DataType::Int32 => exec.run_i32(),
        DataType::Varchar => exec.run_refs(),
        other => {
            exec.advance(JoinPhase::BuildFailed);
            Err(EngineError::UnsupportedKeyType {
                found: other,
                row: None,
            })
        }
    }
}

struct JoinExec<'a, 'p> {
    build_left: bool,
    left: &'a ColumnBuffer<'p>,
    right: &'a ColumnBuffer<'p>,
    left_col: usize,
    right_col: usize,
    output_attrs: &'a [OutputAttr],
    config: &'a EngineConfig,
    node: usize,
    phase: JoinPhase,
}

impl<'a, 'p> JoinExec<'a, 'p> {
    fn advance(&mut self, phase: JoinPhase) {
        self.phase = phase;
        debug!(target: "exec.join", node = self.node, phase = ?phase, "phase");
    }

    fn sides(&self) -> (&'a ColumnBuffer<'p>, &'a ColumnBuffer<'p>, usize, usize) {
        if self.build_left {
            (self.left, self.right, self.left_col, self.right_col)
        } else {
            (self.right, self.left, self.right_col, self.left_col)
        }
    }

    /// Primary path: i32 keys, parallel work-stealing probe.
    fn run_i32(&mut self) -> Result<ColumnBuffer<'p>, EngineError> {
        let (build_buf, probe_buf, build_col, probe_col) = self.sides();

        // Per-join scratch: every slab block is released when this
        // arena drops at the end of the join.
        let global = GlobalArena::new(self.config.global_block_bytes);
        let table = match build_i32_table(&build_buf.columns[build_col], self.config, &global) {
            Ok(table) => table,
            Err(err) => {
                self.advance(JoinPhase::BuildFailed);
                warn!(target: "exec.join", node = self.node, %err, "build_failed");
                return Err(err);
            }
        };
        self.advance(JoinPhase::HashBuilt);
        if table.is_empty() {
            debug!(target: "exec.join", node = self.node, "empty_build_side");
            self.advance(JoinPhase::Emitted);
            return Ok(self.empty_output());
        }

        let probe_view = &probe_buf.columns[probe_col];
        let n_probe = probe_buf.num_rows;
        let threads = if n_probe >= self.config.probe_parallel_min_rows {
            self.config.effective_threads()
        } else {
            1
        };
        let queue = WorkQueue::new(
            n_probe,
            threads,
            self.config.work_block_min,
            self.config.blocks_per_thread,
        );
        let failed = AtomicBool::new(false);
        let build_left = self.build_left;

        let worker = |_tid: usize| -> Result<Vec<OutPair>, EngineError> {
            let mut local = Vec::with_capacity(n_probe / threads + 256);
            let mut cursor = PageCursor::default();
            while let Some(range) = queue.steal() {
                if failed.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(zero_copy) = probe_view.as_zero_copy() {
                    // Contiguous block: keep a page cursor instead of
                    // re-locating every row.
                    let offsets = zero_copy.page_offsets();
                    let mut page_idx = offsets.partition_point(|&o| o <= range.start) - 1;
                    let mut base = offsets[page_idx];
                    let mut next = offsets[page_idx + 1];
                    let mut page = &zero_copy.source().pages[page_idx];
                    for j in range {
                        while j >= next {
                            page_idx += 1;
                            base = offsets[page_idx];
                            next = offsets[page_idx + 1];
                            page = &zero_copy.source().pages[page_idx];
                        }
                        let key = page.i32_at(j - base);
                        push_matches(&table, key, j, build_left, &mut local);
                    }
                } else {
                    for j in range {
                        match probe_view.get_cached(j, &mut cursor) {
                            TaggedValue::Null => continue,
                            TaggedValue::I32(key) => {
                                push_matches(&table, key, j, build_left, &mut local)
                            }
                            other => {
                                failed.store(true, Ordering::Relaxed);
                                return Err(EngineError::UnsupportedKeyType {
                                    found: other.data_type().unwrap_or(DataType::Int32),
                                    row: Some(j),
                                });
                            }
                        }
                    }
                }
            }
            Ok(local)
        };

        let results: Vec<Result<Vec<OutPair>, EngineError>> = if threads == 1 {
            vec![worker(0)]
        } else {
            let worker = &worker;
            std::thread::scope(|s| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| s.spawn(move || worker(t)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(EngineError::InvariantViolation("probe worker panicked"))
                        })
                    })
                    .collect()
            })
        };

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(pairs) => outputs.push(pairs),
                Err(err) => {
                    self.advance(JoinPhase::ProbeFailed);
                    warn!(target: "exec.join", node = self.node, %err, "probe_failed");
                    return Err(err);
                }
            }
        }
        debug!(
            target: "exec.join",
            node = self.node,
            build_rows = table.len(),
            probe_rows = n_probe,
            threads,
            "probe_complete"
        );
        self.advance(JoinPhase::Probed);
        self.materialize(&outputs)
    }

    /// VARCHAR path: packed-reference equality, serial probe.
    fn run_refs(&mut self) -> Result<ColumnBuffer<'p>, EngineError> {
        let (build_buf, probe_buf, build_col, probe_col) = self.sides();
        let table = match build_ref_table(&build_buf.columns[build_col], self.config) {
            Ok(table) => table,
            Err(err) => {
                self.advance(JoinPhase::BuildFailed);
                warn!(target: "exec.join", node = self.node, %err, "build_failed");
                return Err(err);
            }
        };
        self.advance(JoinPhase::HashBuilt);
        if table.is_empty() {
            self.advance(JoinPhase::Emitted);
            return Ok(self.empty_output());
        }

        let probe_view = &probe_buf.columns[probe_col];
        let mut local = Vec::new();
        let mut cursor = PageCursor::default();
        for j in 0..probe_buf.num_rows {
            match probe_view.get_cached(j, &mut cursor) {
                TaggedValue::Null => continue,
                TaggedValue::Str(r) if r.is_null() => continue,
                TaggedValue::Str(r) => {
                    push_matches(&table, r.raw(), j, self.build_left, &mut local)
                }
                other => {
                    self.advance(JoinPhase::ProbeFailed);
                    return Err(EngineError::UnsupportedKeyType {
                        found: other.data_type().unwrap_or(DataType::Varchar),
                        row: Some(j),
                    });
                }
            }
        }
        self.advance(JoinPhase::Probed);
        self.materialize(std::slice::from_ref(&local))
    }

    /// One deterministic writer: walk thread outputs in thread id order,
    /// store each output column by direct index into pre-sized pages.
    fn materialize(&mut self, outputs: &[Vec<OutPair>]) -> Result<ColumnBuffer<'p>, EngineError> {
        let total: usize = outputs.iter().map(Vec::len).sum();
        let left_cols = self.left.num_cols();
        let map: Vec<SourceMap> = self
            .output_attrs
            .iter()
            .map(|attr| {
                if attr.source < left_cols {
                    SourceMap {
                        from_left: true,
                        index: attr.source,
                    }
                } else {
                    SourceMap {
                        from_left: false,
                        index: attr.source - left_cols,
                    }
                }
            })
            .collect();

        let mut columns: Vec<MaterializedColumn> = self
            .output_attrs
            .iter()
            .map(|_| MaterializedColumn::with_rows(total))
            .collect();
        let mut caches = vec![PageCursor::default(); map.len()];

        let mut out_idx = 0usize;
        for thread_pairs in outputs {
            for pair in thread_pairs {
                for (col, source) in map.iter().enumerate() {
                    let value = if source.from_left {
                        self.left.columns[source.index]
                            .get_cached(pair.left_row as usize, &mut caches[col])
                    } else {
                        self.right.columns[source.index]
                            .get_cached(pair.right_row as usize, &mut caches[col])
                    };
                    columns[col].set(out_idx, value);
                }
                out_idx += 1;
            }
        }
        self.advance(JoinPhase::Materialized);

        let buffer = ColumnBuffer {
            columns: columns.into_iter().map(ColumnView::Materialized).collect(),
            num_rows: total,
            types: self.output_attrs.iter().map(|a| a.data_type).collect(),
        };
        debug!(target: "exec.join", node = self.node, out_rows = total, "emitted");
        self.advance(JoinPhase::Emitted);
        Ok(buffer)
    }

    fn empty_output(&self) -> ColumnBuffer<'p> {
        ColumnBuffer {
            columns: self
                .output_attrs
                .iter()
                .map(|_| ColumnView::Materialized(MaterializedColumn::new()))
                .collect(),
            num_rows: 0,
            types: self.output_attrs.iter().map(|a| a.data_type).collect(),
        }
    }
}

/// Scan the probed slot range, filter by exact key equality, emit pairs
/// oriented by the build side.
#[inline]
fn push_matches<K: JoinKey>(
    table: &UnchainedTable<K>,
    key: K,
    probe_row: usize,
    build_left: bool,
    out: &mut Vec<OutPair>,
) {
    for tuple in table.probe(key) {
        if tuple.key != key {
            continue;
        }
        out.push(if build_left {
            OutPair {
                left_row: tuple.row_id,
                right_row: probe_row as u32,
            }
        } else {
            OutPair {
                left_row: probe_row as u32,
                right_row: tuple.row_id,
            }
        });
    }
}
