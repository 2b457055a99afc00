//! Partition-parallel table construction.
//!
//! Phase A: workers partition disjoint input stripes into per-slot chunk
//! lists, allocating from their own slab arenas; no sharing, no atomics.
//! Phase B: workers own slots round-robin and merge counts + Bloom tags
//! across every phase-A list.
//! Phase C: single-threaded prefix sum into end offsets; allocate the
//! tuple array.
//! Phase D: the same slot owners copy triples into their slots' ranges,
//! walking source lists in thread index order, which makes the slot-local
//! tuple order identical to the serial build's.
//!
//! Barriers between phases are `std::thread::scope` joins. No probe runs
//! until the table is fully assembled.

use crate::bloom;
use crate::chunk::{ChunkList, TmpEntry};
use crate::key::JoinKey;
use crate::shared::SharedSlice;
use crate::table::{directory_size, Tuple, UnchainedTable};
use core_columns::ZeroCopyColumn;
use core_plan::EngineError;
use core_slab::{AllocFailure, GlobalArena, ThreadArena};
use std::mem::MaybeUninit;
use std::thread;
use tracing::debug;

/// Parallel build from pre-gathered (key, row id) entries.
pub fn build_partitioned<K: JoinKey>(
    entries: &[Tuple<K>],
    threads: usize,
    target_load: usize,
    global: &GlobalArena,
) -> Result<UnchainedTable<K>, EngineError> {
    let n = entries.len();
    let dir_size = directory_size(n, target_load);
    let shift = 64 - dir_size.trailing_zeros();
    let mask = (dir_size - 1) as u64;
    let threads = threads.clamp(1, n.max(1));
    debug!(target: "hash.build", rows = n, dir_size, threads, "partitioned_build");

    let mut lists = new_lists::<K>(threads, dir_size);
    let mut arenas: Vec<ThreadArena<'_>> =
        (0..threads).map(|_| ThreadArena::new(global)).collect();

    let stripe = n.div_ceil(threads);
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(threads);
        for (t, (lists_t, arena_t)) in lists.iter_mut().zip(arenas.iter_mut()).enumerate() {
            let begin = t * stripe;
            let end = n.min(begin + stripe);
            if begin >= end {
                break;
            }
            let stripe_entries = &entries[begin..end];
            handles.push(s.spawn(move || -> Result<(), AllocFailure> {
                for e in stripe_entries {
                    let h = e.key.join_hash();
                    let slot = ((h >> shift) & mask) as usize;
                    lists_t[slot].push(
                        TmpEntry {
                            key: e.key,
                            row_id: e.row_id,
                            tag: bloom::tag_from_hash(h),
                        },
                        arena_t,
                    )?;
                }
                Ok(())
            }));
        }
        join_workers(handles)
    })?;

    merge_phases(&lists, dir_size, threads)
}

/// Parallel build reading i32 keys straight from a zero-copy view's
/// source pages; each stripe keeps a page cursor instead of re-locating
/// every row.
pub fn build_partitioned_zero_copy(
    view: &ZeroCopyColumn<'_>,
    threads: usize,
    target_load: usize,
    global: &GlobalArena,
) -> Result<UnchainedTable<i32>, EngineError> {
    let n = view.len();
    let dir_size = directory_size(n, target_load);
    let shift = 64 - dir_size.trailing_zeros();
    let mask = (dir_size - 1) as u64;
    let threads = threads.clamp(1, n.max(1));
    debug!(target: "hash.build", rows = n, dir_size, threads, "partitioned_build_zero_copy");

    let mut lists = new_lists::<i32>(threads, dir_size);
    let mut arenas: Vec<ThreadArena<'_>> =
        (0..threads).map(|_| ThreadArena::new(global)).collect();

    let stripe = n.div_ceil(threads);
    thread::scope(|s| {
        let mut handles = Vec::with_capacity(threads);
        for (t, (lists_t, arena_t)) in lists.iter_mut().zip(arenas.iter_mut()).enumerate() {
            let begin = t * stripe;
            let end = n.min(begin + stripe);
            if begin >= end {
                break;
            }
            handles.push(s.spawn(move || -> Result<(), AllocFailure> {
                let offsets = view.page_offsets();
                let mut page_idx = offsets.partition_point(|&o| o <= begin) - 1;
                let mut base = offsets[page_idx];
                let mut next = offsets[page_idx + 1];
                let mut page = &view.source().pages[page_idx];
                for row in begin..end {
                    while row >= next {
                        page_idx += 1;
                        base = offsets[page_idx];
                        next = offsets[page_idx + 1];
                        page = &view.source().pages[page_idx];
                    }
                    let key = page.i32_at(row - base);
                    let h = key.join_hash();
                    let slot = ((h >> shift) & mask) as usize;
                    lists_t[slot].push(
                        TmpEntry {
                            key,
                            row_id: row as u32,
                            tag: bloom::tag_from_hash(h),
                        },
                        arena_t,
                    )?;
                }
                Ok(())
            }));
        }
        join_workers(handles)
    })?;

    merge_phases(&lists, dir_size, threads)
}

fn new_lists<K: JoinKey>(threads: usize, dir_size: usize) -> Vec<Vec<ChunkList<K>>> {
    (0..threads)
        .map(|_| (0..dir_size).map(|_| ChunkList::new()).collect())
        .collect()
}

fn join_workers(
    handles: Vec<thread::ScopedJoinHandle<'_, Result<(), AllocFailure>>>,
) -> Result<(), EngineError> {
    for handle in handles {
        handle
            .join()
            .map_err(|_| EngineError::InvariantViolation("build worker panicked"))?
            .map_err(|_| EngineError::OutOfMemory("partition chunk"))?;
    }
    Ok(())
}

/// Phases B-D over the phase-A lists.
fn merge_phases<K: JoinKey>(
    lists: &[Vec<ChunkList<K>>],
    dir_size: usize,
    workers: usize,
) -> Result<UnchainedTable<K>, EngineError> {
    // Phase B: per-slot counts and Bloom tags, slots owned round-robin.
    let mut counts = vec![0u32; dir_size];
    let mut blooms = vec![0u16; dir_size];
    {
        let counts_cell = SharedSlice::new(&mut counts);
        let blooms_cell = SharedSlice::new(&mut blooms);
        thread::scope(|s| {
            for t in 0..workers {
                let counts_cell = &counts_cell;
                let blooms_cell = &blooms_cell;
                s.spawn(move || {
                    let mut slot = t;
                    while slot < dir_size {
                        let mut count = 0u32;
                        let mut bloom_acc = 0u16;
                        for src in lists {
                            for chunk in src[slot].chunks() {
                                count += chunk.len();
                                for e in chunk.entries() {
                                    bloom_acc |= e.tag;
                                }
                            }
                        }
                        // SAFETY: worker t owns exactly the slots with
                        // slot % workers == t; owners are disjoint and the
                        // scope join orders these writes before any read.
                        unsafe {
                            counts_cell.set(slot, count);
                            blooms_cell.set(slot, bloom_acc);
                        }
                        slot += workers;
                    }
                });
            }
        });
    }

    // Phase C: prefix sums into end offsets, then the tuple allocation.
    let mut dir = vec![0u32; dir_size];
    let mut cumulative = 0u32;
    for (slot, count) in counts.iter().enumerate() {
        cumulative += count;
        dir[slot] = cumulative;
    }
    let total = cumulative as usize;
    let mut tuples: Vec<Tuple<K>> = Vec::with_capacity(total);

    // Phase D: scatter, same slot ownership; writers touch disjoint
    // ranges of the tuple array.
    {
        let cell = SharedSlice::new(tuples.spare_capacity_mut());
        let dir_ref = &dir;
        thread::scope(|s| {
            for t in 0..workers {
                let cell = &cell;
                s.spawn(move || {
                    let mut slot = t;
                    while slot < dir_size {
                        let mut pos = if slot == 0 { 0 } else { dir_ref[slot - 1] } as usize;
                        for src in lists {
                            for chunk in src[slot].chunks() {
                                for e in chunk.entries() {
                                    // SAFETY: slot ranges partition
                                    // [0, total) and each owner writes its
                                    // range exactly once before the join.
                                    unsafe {
                                        cell.set(
                                            pos,
                                            MaybeUninit::new(Tuple {
                                                key: e.key,
                                                row_id: e.row_id,
                                            }),
                                        );
                                    }
                                    pos += 1;
                                }
                            }
                        }
                        slot += workers;
                    }
                });
            }
        });
    }
    // SAFETY: phase B counted every triple, the prefix sums partition
    // [0, total), and phase D wrote each position exactly once.
    unsafe { tuples.set_len(total) };

    Ok(UnchainedTable::from_parts(dir, blooms, tuples))
}
