//! The unchained hash table and its builders.
//!
//! `table` holds the directory + flat tuple array with per-slot Bloom
//! tags; `parallel` is the partition-parallel construction (chunk lists
//! over the three-level slab, phases separated by scope barriers);
//! `build` picks the path (serial, partitioned, zero-copy fast path) from
//! the input shape and configuration.

pub mod bloom;
pub mod build;
pub mod chunk;
pub mod key;
pub mod parallel;
mod shared;
pub mod table;

pub use build::{build_i32_table, build_ref_table};
pub use key::JoinKey;
pub use table::{directory_size, Tuple, UnchainedTable, MAX_DIRECTORY, MIN_DIRECTORY};
