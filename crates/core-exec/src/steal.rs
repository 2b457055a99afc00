//! Work distribution for the parallel probe: a single atomic cursor over
//! the probe row range, advanced by `fetch_add(block)` per steal.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct WorkQueue {
    counter: AtomicUsize,
    total: usize,
    block: usize,
}

impl WorkQueue {
    /// Block size targets `blocks_per_thread` steals per worker, floored
    /// at `min_block` so tiny tails do not thrash the counter.
    pub fn new(total: usize, threads: usize, min_block: usize, blocks_per_thread: usize) -> Self {
        let denominator = threads.max(1) * blocks_per_thread.max(1);
        let block = (total / denominator).max(min_block).max(1);
        Self {
            counter: AtomicUsize::new(0),
            total,
            block,
        }
    }

    /// Claim the next block; `None` once the range is exhausted. The
    /// counter is the only shared state, and the stolen rows are read
    /// only, so relaxed ordering suffices.
    #[inline]
    pub fn steal(&self) -> Option<Range<usize>> {
        let begin = self.counter.fetch_add(self.block, Ordering::Relaxed);
        if begin >= self.total {
            return None;
        }
        Some(begin..self.total.min(begin + self.block))
    }

    pub fn block_size(&self) -> usize {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_cover_the_range_exactly_once() {
        let queue = WorkQueue::new(10_000, 4, 256, 16);
        let mut covered = vec![false; 10_000];
        while let Some(range) = queue.steal() {
            for i in range {
                assert!(!covered[i], "row {i} stolen twice");
                covered[i] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn min_block_floors_small_inputs() {
        let queue = WorkQueue::new(100, 8, 256, 16);
        assert_eq!(queue.block_size(), 256);
        assert_eq!(queue.steal(), Some(0..100));
        assert_eq!(queue.steal(), None);
    }

    #[test]
    fn empty_range_steals_nothing() {
        let queue = WorkQueue::new(0, 4, 256, 16);
        assert_eq!(queue.steal(), None);
    }

    #[test]
    fn concurrent_stealing_partitions_work() {
        let queue = WorkQueue::new(100_000, 8, 64, 16);
        let total: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut seen = 0usize;
                        while let Some(range) = queue.steal() {
                            seen += range.len();
                        }
                        seen
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(total, 100_000);
    }
}
