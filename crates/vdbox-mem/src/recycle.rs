//! # Recycle Pool
//!
//! Ring of per-frame resource slots shared with in-flight GPU work.
//!
//! The ring index advances monotonically and wraps modulo the depth. Each
//! slot remembers the fence of the submission that last used it and can be
//! handed out again only once the GPU has signalled that fence.
//!
//! ```text
//!   acquire(completed) ──► slot[i % depth] ──► commit(i) ──► fence f
//!         ▲                                                   │
//!         └──────── completed >= f makes the slot free ◄──────┘
//! ```

use arrayvec::ArrayVec;

use vdbox_core::{Error, Result};

// =============================================================================
// RECYCLE SLOT
// =============================================================================

/// One slot of the ring
#[derive(Debug, Clone)]
pub struct RecycleSlot<T> {
    /// Slot payload
    pub value: T,
    /// Fence of the last submission using the slot
    fence: Option<u64>,
}

impl<T> RecycleSlot<T> {
    /// Fence the slot waits on
    pub fn fence(&self) -> Option<u64> {
        self.fence
    }

    /// Free once `completed_fence` has been reached
    pub fn is_free(&self, completed_fence: u64) -> bool {
        self.fence.map_or(true, |f| completed_fence >= f)
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct RecycleStats {
    /// Slots handed out
    pub acquires: u64,
    /// Acquires refused because the slot was in flight
    pub busy: u64,
    /// Ring wraps
    pub wraps: u64,
}

// =============================================================================
// RECYCLE POOL
// =============================================================================

/// Fence-gated ring of `depth <= N` slots
#[derive(Debug)]
pub struct RecyclePool<T, const N: usize> {
    slots: ArrayVec<RecycleSlot<T>, N>,
    /// Monotonic acquire counter
    next: u64,
    /// Next fence value to hand out
    next_fence: u64,
    stats: RecycleStats,
}

impl<T, const N: usize> RecyclePool<T, N> {
    /// Create a ring of `depth` slots initialised by `init(index)`
    pub fn new(depth: usize, mut init: impl FnMut(usize) -> T) -> Result<Self> {
        if depth == 0 || depth > N {
            return Err(Error::InvalidParameter);
        }
        let slots = (0..depth)
            .map(|i| RecycleSlot {
                value: init(i),
                fence: None,
            })
            .collect();
        Ok(Self {
            slots,
            next: 0,
            next_fence: 1,
            stats: RecycleStats::default(),
        })
    }

    /// Number of slots
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Index the next acquire will return
    pub fn current_index(&self) -> usize {
        (self.next % self.slots.len() as u64) as usize
    }

    /// Take the next slot in ring order
    ///
    /// Fails with `ResourceBusy` while the GPU still owns the slot; the ring
    /// does not advance in that case.
    pub fn acquire(&mut self, completed_fence: u64) -> Result<(usize, &mut T)> {
        let index = self.current_index();
        if !self.slots[index].is_free(completed_fence) {
            self.stats.busy += 1;
            log::debug!("recycle slot {} busy (completed fence {})", index, completed_fence);
            return Err(Error::ResourceBusy);
        }

        self.next += 1;
        self.stats.acquires += 1;
        if self.next % self.slots.len() as u64 == 0 {
            self.stats.wraps += 1;
        }
        Ok((index, &mut self.slots[index].value))
    }

    /// Record a submission on slot `index` and return its fence
    pub fn commit(&mut self, index: usize) -> Result<u64> {
        let slot = self.slots.get_mut(index).ok_or(Error::NotFound)?;
        let fence = self.next_fence;
        slot.fence = Some(fence);
        self.next_fence += 1;
        Ok(fence)
    }

    /// Slot by index
    pub fn get(&self, index: usize) -> Option<&RecycleSlot<T>> {
        self.slots.get(index)
    }

    /// Mutable payload by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).map(|s| &mut s.value)
    }

    /// Iterate payloads in index order
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|s| &mut s.value)
    }

    /// Statistics
    pub fn stats(&self) -> &RecycleStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bounds() {
        assert_eq!(RecyclePool::<u32, 4>::new(0, |_| 0).err(), Some(Error::InvalidParameter));
        assert_eq!(RecyclePool::<u32, 4>::new(5, |_| 0).err(), Some(Error::InvalidParameter));
        assert_eq!(RecyclePool::<u32, 4>::new(3, |i| i as u32).unwrap().depth(), 3);
    }

    #[test]
    fn test_ring_order_and_wrap() {
        let mut pool = RecyclePool::<usize, 8>::new(3, |i| i * 10).unwrap();
        let mut seen = [0usize; 4];
        for s in seen.iter_mut() {
            let (index, value) = pool.acquire(0).unwrap();
            *s = *value;
            assert_eq!(*value, index * 10);
        }
        assert_eq!(seen, [0, 10, 20, 0]);
        assert_eq!(pool.stats().wraps, 1);
    }

    #[test]
    fn test_busy_until_fence_completes() {
        let mut pool = RecyclePool::<u8, 2>::new(2, |_| 0).unwrap();
        let (a, _) = pool.acquire(0).unwrap();
        let fa = pool.commit(a).unwrap();
        let (b, _) = pool.acquire(0).unwrap();
        let fb = pool.commit(b).unwrap();
        assert!(fb > fa);

        // Slot 0 comes round again while its fence is outstanding
        assert_eq!(pool.acquire(fa - 1).err(), Some(Error::ResourceBusy));
        assert_eq!(pool.current_index(), a);

        let (again, _) = pool.acquire(fa).unwrap();
        assert_eq!(again, a);
        assert_eq!(pool.stats().busy, 1);
    }

    #[test]
    fn test_commit_unknown_slot() {
        let mut pool = RecyclePool::<u8, 2>::new(1, |_| 0).unwrap();
        assert_eq!(pool.commit(5), Err(Error::NotFound));
    }
}
