//! Engine-wide error taxonomy.
//!
//! The engine is fail-fast: the first error raised in any operator or
//! worker cancels the query and surfaces from `execute`. An empty build
//! side is not an error; operators detect it and short-circuit to an
//! empty result.

use core_pages::{DataType, PageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A join key column has a type the executor does not probe. The row
    /// index is attached when the mismatch is discovered mid-scan.
    #[error("unsupported join key type {found:?}{}", fmt_row(.row))]
    UnsupportedKeyType { found: DataType, row: Option<usize> },

    /// A malformed packed string reference (or page) surfaced from the
    /// page catalog.
    #[error(transparent)]
    BadReference(#[from] PageError),

    #[error("out of memory while allocating {0}")]
    OutOfMemory(&'static str),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(&'static str),

    /// The plan tree failed ingestion-time validation.
    #[error("unsupported plan shape: {0}")]
    UnsupportedPlanShape(String),

    /// A null value reached a context that forbids materializing nulls.
    #[error("cannot materialize null value at row {row}")]
    CannotMaterializeNull { row: usize },
}

fn fmt_row(row: &Option<usize>) -> String {
    match row {
        Some(r) => format!(" at row {r}"),
        None => String::new(),
    }
}
