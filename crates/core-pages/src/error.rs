//! Page-layer error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    /// A packed string reference pointed outside the catalog or at bytes
    /// that do not decode as a string.
    #[error("bad string reference {raw:#018x}: {reason}")]
    BadReference { raw: u64, reason: &'static str },

    /// A page violated its own layout (offsets past the payload, a
    /// continuation chain without a starter, ...).
    #[error("malformed page: {0}")]
    MalformedPage(&'static str),
}
