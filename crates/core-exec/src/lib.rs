//! Plan execution: recursive dispatch over the plan tree, the hash-join
//! operator, and finalization of the root buffer into a columnar table.
//!
//! `execute` either returns a table matching the root schema or fails
//! with the first error any operator raised; no partial result is ever
//! visible, and all per-join scratch is released by slab teardown.

pub mod finalize;
pub mod join;
pub mod scan;
pub mod steal;

pub use finalize::finalize;
pub use scan::scan_to_buffer;

use core_columns::ColumnBuffer;
use core_pages::ColumnarTable;
use core_plan::{EngineConfig, EngineError, NodeKind, Plan};
use tracing::info_span;

/// Execute a validated plan tree to a columnar result table.
pub fn execute(plan: &Plan, config: &EngineConfig) -> Result<ColumnarTable, EngineError> {
    plan.validate()?;
    let root = execute_node(plan, plan.root, config)?;
    finalize(plan, &root, &plan.nodes[plan.root].output_attrs)
}

fn execute_node<'p>(
    plan: &'p Plan,
    node_idx: usize,
    config: &EngineConfig,
) -> Result<ColumnBuffer<'p>, EngineError> {
    let node = &plan.nodes[node_idx];
    match &node.kind {
        NodeKind::Scan(scan) => {
            let _span = info_span!("scan", node = node_idx).entered();
            scan::scan_to_buffer(plan, scan, &node.output_attrs)
        }
        NodeKind::Join(join_node) => {
            let left = execute_node(plan, join_node.left, config)?;
            let right = execute_node(plan, join_node.right, config)?;
            let _span = info_span!("join", node = node_idx).entered();
            join::execute_join(
                plan,
                node_idx,
                join_node,
                &left,
                &right,
                &node.output_attrs,
                config,
            )
        }
    }
}
