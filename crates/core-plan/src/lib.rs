//! Plan tree, ingestion-time validation, engine configuration, and the
//! engine-wide error type.
//!
//! Plan nodes refer to their children by index into the plan's node
//! array; there is no owning recursion and no cycles. `Plan::validate`
//! enforces that shape once at ingestion so the executor can index
//! without re-checking.

pub mod config;
pub mod error;

pub use config::{load_from, EngineConfig};
pub use error::EngineError;

use core_pages::{ColumnarTable, DataType};

/// One projected column of a node's output: the source column index and
/// its type. For scans the source indexes the base table's columns; for
/// joins it indexes the concatenated left-then-right child schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputAttr {
    pub source: usize,
    pub data_type: DataType,
}

impl OutputAttr {
    pub fn new(source: usize, data_type: DataType) -> Self {
        Self { source, data_type }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanNode {
    pub base_table: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct JoinNode {
    /// Which side the planner asks to insert into the hash table. The
    /// output column order is always left-then-right regardless.
    pub build_left: bool,
    pub left: usize,
    pub right: usize,
    /// Join key column within the left child's output schema.
    pub left_attr: usize,
    /// Join key column within the right child's output schema.
    pub right_attr: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum NodeKind {
    Scan(ScanNode),
    Join(JoinNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub output_attrs: Vec<OutputAttr>,
}

impl Node {
    pub fn scan(base_table: usize, output_attrs: Vec<OutputAttr>) -> Self {
        Self {
            kind: NodeKind::Scan(ScanNode { base_table }),
            output_attrs,
        }
    }

    pub fn join(join: JoinNode, output_attrs: Vec<OutputAttr>) -> Self {
        Self {
            kind: NodeKind::Join(join),
            output_attrs,
        }
    }

    /// Output column count.
    pub fn arity(&self) -> usize {
        self.output_attrs.len()
    }
}

/// A query plan: the node array, the root index, and the input tables
/// the leaves scan.
pub struct Plan {
    pub nodes: Vec<Node>,
    pub root: usize,
    pub inputs: Vec<ColumnarTable>,
}

impl Plan {
    pub fn new(nodes: Vec<Node>, root: usize, inputs: Vec<ColumnarTable>) -> Self {
        Self { nodes, root, inputs }
    }

    /// Validate indices and tree shape reachable from the root.
    ///
    /// Checks: root and child indices in bounds, no node reached twice
    /// (shared subtrees and cycles are both rejected), scan base tables
    /// and attribute sources in bounds, and output attribute types
    /// consistent with their sources.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.root >= self.nodes.len() {
            return Err(EngineError::UnsupportedPlanShape(format!(
                "root index {} out of range ({} nodes)",
                self.root,
                self.nodes.len()
            )));
        }
        let mut visited = vec![false; self.nodes.len()];
        self.validate_node(self.root, &mut visited)
    }

    fn validate_node(&self, idx: usize, visited: &mut [bool]) -> Result<(), EngineError> {
        if visited[idx] {
            return Err(EngineError::UnsupportedPlanShape(format!(
                "node {idx} reached twice (shared or cyclic plan)"
            )));
        }
        visited[idx] = true;

        let node = &self.nodes[idx];
        match node.kind {
            NodeKind::Scan(scan) => {
                let table = self.inputs.get(scan.base_table).ok_or_else(|| {
                    EngineError::UnsupportedPlanShape(format!(
                        "scan {} references missing table {}",
                        idx, scan.base_table
                    ))
                })?;
                for attr in &node.output_attrs {
                    let column = table.columns.get(attr.source).ok_or_else(|| {
                        EngineError::UnsupportedPlanShape(format!(
                            "scan {} projects missing column {}",
                            idx, attr.source
                        ))
                    })?;
                    if column.data_type != attr.data_type {
                        return Err(EngineError::UnsupportedPlanShape(format!(
                            "scan {} column {} declared {:?} but stored {:?}",
                            idx, attr.source, attr.data_type, column.data_type
                        )));
                    }
                }
            }
            NodeKind::Join(join) => {
                for child in [join.left, join.right] {
                    if child >= self.nodes.len() {
                        return Err(EngineError::UnsupportedPlanShape(format!(
                            "join {idx} references missing node {child}"
                        )));
                    }
                }
                self.validate_node(join.left, visited)?;
                self.validate_node(join.right, visited)?;

                let left = &self.nodes[join.left];
                let right = &self.nodes[join.right];
                if join.left_attr >= left.arity() || join.right_attr >= right.arity() {
                    return Err(EngineError::UnsupportedPlanShape(format!(
                        "join {idx} key attribute out of range"
                    )));
                }
                let left_arity = left.arity();
                for attr in &node.output_attrs {
                    let source_type = if attr.source < left_arity {
                        left.output_attrs[attr.source].data_type
                    } else if attr.source - left_arity < right.arity() {
                        right.output_attrs[attr.source - left_arity].data_type
                    } else {
                        return Err(EngineError::UnsupportedPlanShape(format!(
                            "join {idx} projects missing source {}",
                            attr.source
                        )));
                    };
                    if source_type != attr.data_type {
                        return Err(EngineError::UnsupportedPlanShape(format!(
                            "join {idx} source {} declared {:?} but produces {:?}",
                            attr.source, attr.data_type, source_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_pages::write::i32_column;

    fn one_table() -> Vec<ColumnarTable> {
        let col = i32_column(&[Some(1), Some(2)]);
        vec![ColumnarTable::new(2, vec![col])]
    }

    fn scan_node() -> Node {
        Node::scan(0, vec![OutputAttr::new(0, DataType::Int32)])
    }

    #[test]
    fn valid_single_scan() {
        let plan = Plan::new(vec![scan_node()], 0, one_table());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn root_out_of_range() {
        let plan = Plan::new(vec![scan_node()], 5, one_table());
        assert!(matches!(
            plan.validate(),
            Err(EngineError::UnsupportedPlanShape(_))
        ));
    }

    #[test]
    fn shared_child_rejected() {
        let join = Node::join(
            JoinNode {
                build_left: true,
                left: 0,
                right: 0,
                left_attr: 0,
                right_attr: 0,
            },
            vec![
                OutputAttr::new(0, DataType::Int32),
                OutputAttr::new(1, DataType::Int32),
            ],
        );
        let plan = Plan::new(vec![scan_node(), join], 1, one_table());
        assert!(matches!(
            plan.validate(),
            Err(EngineError::UnsupportedPlanShape(_))
        ));
    }

    #[test]
    fn type_mismatch_rejected() {
        let node = Node::scan(0, vec![OutputAttr::new(0, DataType::Varchar)]);
        let plan = Plan::new(vec![node], 0, one_table());
        assert!(matches!(
            plan.validate(),
            Err(EngineError::UnsupportedPlanShape(_))
        ));
    }

    #[test]
    fn join_over_two_scans_validates() {
        let join = Node::join(
            JoinNode {
                build_left: true,
                left: 0,
                right: 1,
                left_attr: 0,
                right_attr: 0,
            },
            vec![
                OutputAttr::new(0, DataType::Int32),
                OutputAttr::new(1, DataType::Int32),
            ],
        );
        let plan = Plan::new(vec![scan_node(), scan_node(), join], 2, one_table());
        assert!(plan.validate().is_ok());
    }
}
