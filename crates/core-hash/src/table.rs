//! The unchained hash table: a directory of end offsets over one flat
//! tuple array, with a 16-bit Bloom tag per directory slot.
//!
//! Build is count -> prefix-sum -> scatter: tuples end up contiguous and
//! grouped by slot, so a probe is at most two reads (bloom + directory)
//! plus a short linear scan of the slot's range. There is no chaining and
//! no pointer chasing.

use crate::bloom;
use crate::key::JoinKey;
use core_columns::ZeroCopyColumn;

/// Smallest directory (2^10 slots).
pub const MIN_DIRECTORY: usize = 1 << 10;
/// Largest directory (2^18 slots).
pub const MAX_DIRECTORY: usize = 1 << 18;

/// One build-side entry: the key and its row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuple<K> {
    pub key: K,
    pub row_id: u32,
}

/// Directory size for `n` tuples at `target_load` mean entries per slot,
/// clamped to `[MIN_DIRECTORY, MAX_DIRECTORY]`.
pub fn directory_size(n: usize, target_load: usize) -> usize {
    let desired = n / target_load.max(1);
    desired
        .next_power_of_two()
        .clamp(MIN_DIRECTORY, MAX_DIRECTORY)
}

pub struct UnchainedTable<K> {
    /// End offsets: slot `i` owns `tuples[dir[i-1]..dir[i]]`, `dir[-1] = 0`.
    dir: Vec<u32>,
    blooms: Vec<u16>,
    tuples: Vec<Tuple<K>>,
    mask: u64,
    shift: u32,
}

impl<K: JoinKey> UnchainedTable<K> {
    /// Serial count/prefix/scatter build.
    pub fn build(entries: &[Tuple<K>], target_load: usize) -> Self {
        let dir_size = directory_size(entries.len(), target_load);
        let shift = 64 - dir_size.trailing_zeros();
        let mask = (dir_size - 1) as u64;

        let mut counts = vec![0u32; dir_size];
        let mut blooms = vec![0u16; dir_size];
        for e in entries {
            let h = e.key.join_hash();
            let slot = ((h >> shift) & mask) as usize;
            counts[slot] += 1;
            bloom::add(&mut blooms[slot], bloom::tag_from_hash(h));
        }

        let mut dir = vec![0u32; dir_size];
        let mut cumulative = 0u32;
        for (slot, count) in counts.iter().enumerate() {
            cumulative += count;
            dir[slot] = cumulative;
        }

        let mut tuples: Vec<Tuple<K>> = Vec::with_capacity(cumulative as usize);

        // Per-slot write cursors start at each slot's begin offset.
        let mut write_at = counts;
        let mut begin = 0u32;
        for slot in 0..dir_size {
            let end = dir[slot];
            write_at[slot] = begin;
            begin = end;
        }

        // Scatter into place. The spare capacity is filled index-by-index
        // and the length fixed up afterwards.
        let spare = tuples.spare_capacity_mut();
        for e in entries {
            let h = e.key.join_hash();
            let slot = ((h >> shift) & mask) as usize;
            let pos = write_at[slot] as usize;
            write_at[slot] += 1;
            spare[pos].write(*e);
        }
        // SAFETY: the counts summed to `cumulative`, and each slot cursor
        // wrote exactly its count, so indices 0..cumulative are all
        // initialized.
        unsafe { tuples.set_len(cumulative as usize) };

        Self {
            dir,
            blooms,
            tuples,
            mask,
            shift,
        }
    }

    /// Assemble a table from parts produced by the partitioned builder.
    pub(crate) fn from_parts(dir: Vec<u32>, blooms: Vec<u16>, tuples: Vec<Tuple<K>>) -> Self {
        let dir_size = dir.len();
        debug_assert!(dir_size.is_power_of_two());
        Self {
            dir,
            blooms,
            tuples,
            mask: (dir_size - 1) as u64,
            shift: 64 - dir_size.trailing_zeros(),
        }
    }

    /// Probe: Bloom gate, then the slot's contiguous range. The caller
    /// scans the returned slice and filters by exact key equality.
    #[inline]
    pub fn probe(&self, key: K) -> &[Tuple<K>] {
        let h = key.join_hash();
        let slot = ((h >> self.shift) & self.mask) as usize;
        if !bloom::may_contain(self.blooms[slot], bloom::tag_from_hash(h)) {
            return &[];
        }
        let begin = if slot == 0 { 0 } else { self.dir[slot - 1] } as usize;
        let end = self.dir[slot] as usize;
        &self.tuples[begin..end]
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn directory_len(&self) -> usize {
        self.dir.len()
    }

    /// All tuples, grouped by slot (diagnostics and tests).
    pub fn tuples(&self) -> &[Tuple<K>] {
        &self.tuples
    }
}

impl UnchainedTable<i32> {
    /// Fast-path serial build reading i32 keys straight from the source
    /// pages of a zero-copy view (no intermediate entry vector).
    pub fn build_from_zero_copy(view: &ZeroCopyColumn<'_>, target_load: usize) -> Self {
        let n = view.len();
        let dir_size = directory_size(n, target_load);
        let shift = 64 - dir_size.trailing_zeros();
        let mask = (dir_size - 1) as u64;

        let mut counts = vec![0u32; dir_size];
        let mut blooms = vec![0u16; dir_size];
        let offsets = view.page_offsets();
        for page_idx in 0..offsets.len() - 1 {
            let page = &view.source().pages[page_idx];
            for slot_i in 0..offsets[page_idx + 1] - offsets[page_idx] {
                let h = page.i32_at(slot_i).join_hash();
                let slot = ((h >> shift) & mask) as usize;
                counts[slot] += 1;
                bloom::add(&mut blooms[slot], bloom::tag_from_hash(h));
            }
        }

        let mut dir = vec![0u32; dir_size];
        let mut cumulative = 0u32;
        for (slot, count) in counts.iter().enumerate() {
            cumulative += count;
            dir[slot] = cumulative;
        }

        let mut tuples: Vec<Tuple<i32>> = Vec::with_capacity(cumulative as usize);
        let mut write_at = counts;
        let mut begin = 0u32;
        for slot in 0..dir_size {
            let end = dir[slot];
            write_at[slot] = begin;
            begin = end;
        }
        let spare = tuples.spare_capacity_mut();
        for page_idx in 0..offsets.len() - 1 {
            let base = offsets[page_idx];
            let page = &view.source().pages[page_idx];
            for slot_i in 0..offsets[page_idx + 1] - base {
                let key = page.i32_at(slot_i);
                let h = key.join_hash();
                let slot = ((h >> shift) & mask) as usize;
                let pos = write_at[slot] as usize;
                write_at[slot] += 1;
                spare[pos].write(Tuple {
                    key,
                    row_id: (base + slot_i) as u32,
                });
            }
        }
        // SAFETY: same counting argument as `build`.
        unsafe { tuples.set_len(cumulative as usize) };

        UnchainedTable {
            dir,
            blooms,
            tuples,
            mask,
            shift,
        }
    }
}
