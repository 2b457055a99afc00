//! Fixed-capacity chunk lists for the partitioned build.
//!
//! During phase A each worker appends (key, row id, bloom tag) triples to
//! one list per directory slot. Chunks come from the slab's partition
//! cursors, so appends are pointer bumps and the whole structure is
//! discarded wholesale when the build ends; nothing here is freed
//! individually.

use crate::key::JoinKey;
use core_slab::{AllocFailure, PartitionCursor, ThreadArena};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Entries per chunk.
pub const CHUNK_CAPACITY: usize = 256;

/// A build triple awaiting its final scatter position.
#[derive(Debug, Clone, Copy)]
pub struct TmpEntry<K> {
    pub key: K,
    pub row_id: u32,
    pub tag: u16,
}

/// One fixed-capacity link of a chunk list. Lives in slab memory.
pub struct Chunk<K> {
    next: *mut Chunk<K>,
    len: u32,
    items: [MaybeUninit<TmpEntry<K>>; CHUNK_CAPACITY],
}

impl<K: JoinKey> Chunk<K> {
    /// The initialized prefix of `items`.
    #[inline]
    pub fn entries(&self) -> &[TmpEntry<K>] {
        // SAFETY: `len` counts exactly the initialized prefix; only
        // `ChunkList::push` advances it, one written entry at a time.
        unsafe { std::slice::from_raw_parts(self.items.as_ptr().cast::<TmpEntry<K>>(), self.len as usize) }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Per-(thread, slot) intrusive list of chunks plus the slot's partition
/// cursor.
///
/// Aliasing discipline: a list is written by exactly one worker during
/// phase A; after the phase barrier it is only read (phases B and D),
/// shared immutably across workers. The `Send`/`Sync` impls rely on that
/// phase separation and on the chunks living in arena memory that
/// outlives the build.
pub struct ChunkList<K> {
    head: *mut Chunk<K>,
    tail: *mut Chunk<K>,
    cursor: PartitionCursor,
}

unsafe impl<K: JoinKey> Send for ChunkList<K> {}
unsafe impl<K: JoinKey> Sync for ChunkList<K> {}

impl<K: JoinKey> ChunkList<K> {
    pub fn new() -> Self {
        Self {
            head: std::ptr::null_mut(),
            tail: std::ptr::null_mut(),
            cursor: PartitionCursor::empty(),
        }
    }

    /// Append a triple, linking a fresh chunk from this slot's partition
    /// cursor when the tail fills up.
    pub fn push(&mut self, entry: TmpEntry<K>, arena: &mut ThreadArena<'_>) -> Result<(), AllocFailure> {
        // SAFETY: head/tail point at chunks this list allocated from the
        // arena; they are valid for the arena's lifetime and only this
        // worker mutates them during phase A.
        unsafe {
            if self.tail.is_null() || (*self.tail).len as usize == CHUNK_CAPACITY {
                let fresh = alloc_chunk::<K>(arena, &mut self.cursor)?;
                if self.head.is_null() {
                    self.head = fresh.as_ptr();
                } else {
                    (*self.tail).next = fresh.as_ptr();
                }
                self.tail = fresh.as_ptr();
            }
            let tail = &mut *self.tail;
            tail.items[tail.len as usize].write(entry);
            tail.len += 1;
        }
        Ok(())
    }

    /// Iterate chunks head to tail (phase B/D readers, post-barrier).
    pub fn chunks(&self) -> ChunkIter<'_, K> {
        ChunkIter {
            cur: self.head,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }
}

impl<K: JoinKey> Default for ChunkList<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_chunk<K: JoinKey>(
    arena: &mut ThreadArena<'_>,
    cursor: &mut PartitionCursor,
) -> Result<NonNull<Chunk<K>>, AllocFailure> {
    let raw = arena.alloc_from_partition(
        cursor,
        std::mem::size_of::<Chunk<K>>(),
        std::mem::align_of::<Chunk<K>>(),
    )?;
    let chunk = raw.cast::<Chunk<K>>();
    // SAFETY: the allocation is sized and aligned for Chunk<K>; only the
    // header needs initializing, `items` stays MaybeUninit.
    unsafe {
        let c = chunk.as_ptr();
        (*c).next = std::ptr::null_mut();
        (*c).len = 0;
    }
    Ok(chunk)
}

pub struct ChunkIter<'a, K> {
    cur: *const Chunk<K>,
    _marker: PhantomData<&'a Chunk<K>>,
}

impl<'a, K: JoinKey> Iterator for ChunkIter<'a, K> {
    type Item = &'a Chunk<K>;

    fn next(&mut self) -> Option<&'a Chunk<K>> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: non-null chunk pointers in a list are valid for the
        // arena's lifetime, which outlives 'a (the list borrow).
        let chunk = unsafe { &*self.cur };
        self.cur = chunk.next;
        Some(chunk)
    }
}
