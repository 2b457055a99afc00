//! Three-level slab allocator for per-build scratch memory.
//!
//! Level 1, [`GlobalArena`]: owns every large block, serves fresh blocks
//! under a single mutex, frees everything in bulk on drop.
//! Level 2, [`ThreadArena`]: per worker; borrows blocks from the global
//! arena and bump-allocates; `reset` rewinds the cursors but keeps the
//! blocks for reuse by the next build.
//! Level 3, [`PartitionCursor`]: a per-(thread, slot) sub-cursor refilled
//! from the thread arena in 64 KiB carve-outs.
//!
//! There is no per-object free. Every pointer handed out is valid until
//! the owning [`GlobalArena`] is dropped; the arenas' borrow structure
//! (`ThreadArena<'g>` holds `&'g GlobalArena`) enforces that ordering at
//! compile time. The only lock is the global block list's mutex, taken
//! once per block acquisition.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Alignment of every block handed out by the global arena; covers all
/// chunk and cursor alignments the builder asks for.
const BLOCK_ALIGN: usize = 16;

/// Refill granularity of partition cursors.
pub const PARTITION_REFILL_BYTES: usize = 64 << 10;

/// Allocation failed (the process allocator returned null or the request
/// was unrepresentable).
#[derive(Debug, Error)]
#[error("slab allocation of {bytes} bytes failed")]
pub struct AllocFailure {
    pub bytes: usize,
}

#[derive(Clone, Copy)]
struct RawBlock {
    ptr: NonNull<u8>,
    bytes: usize,
}

// RawBlock is a registry entry for memory owned by the GlobalArena; the
// pointer itself carries no thread affinity.
unsafe impl Send for RawBlock {}

#[inline]
fn align_up(x: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (x + align - 1) & !(align - 1)
}

/// Level 1: process of record for every slab block of one build context.
pub struct GlobalArena {
    default_block_bytes: usize,
    blocks: Mutex<Vec<RawBlock>>,
}

impl GlobalArena {
    pub fn new(default_block_bytes: usize) -> Self {
        Self {
            default_block_bytes,
            blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn default_block_bytes(&self) -> usize {
        self.default_block_bytes
    }

    /// Allocate and register a fresh block of at least `min_bytes`.
    fn alloc_block(&self, min_bytes: usize) -> Result<RawBlock, AllocFailure> {
        let bytes = min_bytes.max(self.default_block_bytes);
        let layout =
            Layout::from_size_align(bytes, BLOCK_ALIGN).map_err(|_| AllocFailure { bytes })?;
        // SAFETY: layout has non-zero size (default_block_bytes >= 1 and
        // callers never request zero-sized blocks).
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(AllocFailure { bytes })?;
        let block = RawBlock { ptr, bytes };
        self.blocks
            .lock()
            .map_err(|_| AllocFailure { bytes })?
            .push(block);
        debug!(target: "slab", bytes, "global_block_acquired");
        Ok(block)
    }

    /// Number of blocks currently owned (diagnostics).
    pub fn block_count(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }
}

impl Drop for GlobalArena {
    fn drop(&mut self) {
        let blocks = self.blocks.get_mut().map(std::mem::take).unwrap_or_default();
        for block in blocks {
            // SAFETY: each block was allocated by `alloc_block` with this
            // exact layout and is freed exactly once here.
            unsafe {
                let layout = Layout::from_size_align_unchecked(block.bytes, BLOCK_ALIGN);
                dealloc(block.ptr.as_ptr(), layout);
            }
        }
    }
}

struct OwnedBlock {
    ptr: NonNull<u8>,
    bytes: usize,
}

/// Level 2: one per worker thread during a build.
pub struct ThreadArena<'g> {
    global: &'g GlobalArena,
    owned: Vec<OwnedBlock>,
    /// First owned block not yet handed back out since the last reset.
    next_reuse: usize,
    cur: Option<usize>,
    cur_off: usize,
}

// SAFETY: the arena's pointers reference blocks owned by the (Sync)
// GlobalArena it borrows; the arena itself is used by one thread at a
// time (it is moved or mutably borrowed into exactly one worker).
unsafe impl Send for ThreadArena<'_> {}

impl<'g> ThreadArena<'g> {
    pub fn new(global: &'g GlobalArena) -> Self {
        Self {
            global,
            owned: Vec::new(),
            next_reuse: 0,
            cur: None,
            cur_off: 0,
        }
    }

    /// Rewind all cursors, keeping owned blocks for reuse.
    pub fn reset(&mut self) {
        self.next_reuse = 0;
        self.cur = None;
        self.cur_off = 0;
    }

    /// Bump-allocate `bytes` aligned to `align` (a power of two, at most
    /// [`BLOCK_ALIGN`] for block-start alignment to hold).
    pub fn alloc(&mut self, bytes: usize, align: usize) -> Result<NonNull<u8>, AllocFailure> {
        debug_assert!(align <= BLOCK_ALIGN);
        loop {
            if let Some(i) = self.cur {
                let block = &self.owned[i];
                let base = block.ptr.as_ptr() as usize + self.cur_off;
                let pad = align_up(base, align) - base;
                if self.cur_off + pad + bytes <= block.bytes {
                    self.cur_off += pad;
                    // SAFETY: cur_off + bytes is within the block, so the
                    // offset pointer is in-bounds and non-null.
                    let p = unsafe { NonNull::new_unchecked(block.ptr.as_ptr().add(self.cur_off)) };
                    self.cur_off += bytes;
                    return Ok(p);
                }
            }
            self.acquire_block(bytes + align)?;
        }
    }

    fn acquire_block(&mut self, min_bytes: usize) -> Result<(), AllocFailure> {
        // Prefer rewound blocks from earlier builds.
        if self.next_reuse < self.owned.len() && self.owned[self.next_reuse].bytes >= min_bytes {
            self.cur = Some(self.next_reuse);
            self.cur_off = 0;
            self.next_reuse += 1;
            return Ok(());
        }
        let block = self.global.alloc_block(min_bytes)?;
        self.owned.push(OwnedBlock {
            ptr: block.ptr,
            bytes: block.bytes,
        });
        self.next_reuse = self.owned.len();
        self.cur = Some(self.owned.len() - 1);
        self.cur_off = 0;
        Ok(())
    }

    /// Level 3 allocation: carve from `cursor`, refilling it from this
    /// arena in [`PARTITION_REFILL_BYTES`] steps when exhausted.
    pub fn alloc_from_partition(
        &mut self,
        cursor: &mut PartitionCursor,
        bytes: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocFailure> {
        let mut base = cursor.ptr as usize;
        let mut pad = align_up(base, align).wrapping_sub(base);
        if cursor.ptr.is_null() || pad + bytes > cursor.remaining {
            let take = (bytes + align).max(PARTITION_REFILL_BYTES);
            let fresh = self.alloc(take, align)?;
            cursor.ptr = fresh.as_ptr();
            cursor.remaining = take;
            base = cursor.ptr as usize;
            pad = 0;
        }
        // SAFETY: pad + bytes <= remaining, so the aligned pointer and the
        // advanced cursor both stay inside the carve-out.
        unsafe {
            let p = NonNull::new_unchecked((base + pad) as *mut u8);
            cursor.ptr = cursor.ptr.add(pad + bytes);
            cursor.remaining -= pad + bytes;
            Ok(p)
        }
    }
}

/// Level 3: a per-(thread, slot) bump cursor carved from a thread arena.
#[derive(Clone, Copy)]
pub struct PartitionCursor {
    ptr: *mut u8,
    remaining: usize,
}

impl PartitionCursor {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            remaining: 0,
        }
    }
}

impl Default for PartitionCursor {
    fn default() -> Self {
        Self::empty()
    }
}

// SAFETY: a cursor is an offset into arena memory; it is only ever used
// by the thread that owns the corresponding ThreadArena.
unsafe impl Send for PartitionCursor {}
