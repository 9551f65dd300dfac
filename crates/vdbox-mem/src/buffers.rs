//! # Internal Buffer Set
//!
//! Lazily allocates the HCP scratch buffers for the current frame geometry
//! and grows them when a frame no longer fits.
//!
//! Allocations only ever grow: the geometry used for a resize is the maximum
//! of what was allocated and what the frame needs, so alternating between two
//! resolutions does not thrash the allocator.

use hashbrown::HashMap;

use vdbox_core::{GpuAddr, ResourceAllocator, ResourceHandle, Result};

use crate::rowstore::{RowstoreCache, RowstoreKind, RowstoreRegistry};
use crate::sizing::{compute_size, needs_realloc, AllocatedGeometry, BufferKind, SizeParams};

// =============================================================================
// BUFFER DESCRIPTOR
// =============================================================================

/// One internal buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Buffer kind
    pub kind: BufferKind,
    /// Allocated size in bytes (0 while unallocated)
    pub size: u32,
    /// Geometry the allocation was sized for
    pub allocated: Option<AllocatedGeometry>,
    /// Rowstore state when a cache partition stands in for the buffer
    pub rowstore: Option<RowstoreCache>,
    /// Allocator handle
    pub handle: Option<ResourceHandle>,
}

impl BufferDescriptor {
    const fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            size: 0,
            allocated: None,
            rowstore: None,
            handle: None,
        }
    }

    /// Served from the rowstore cache this frame
    pub fn uses_rowstore(&self) -> bool {
        self.rowstore.is_some_and(|r| r.enabled)
    }
}

/// Buffer set statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSetStats {
    /// First-time allocations
    pub allocations: u64,
    /// Grow-and-replace allocations
    pub reallocations: u64,
    /// Frames a buffer was served from a rowstore cache
    pub rowstore_hits: u64,
    /// Bytes currently allocated
    pub bytes_allocated: u64,
}

// =============================================================================
// BUFFER SET
// =============================================================================

/// Internal buffers keyed by kind
#[derive(Debug, Default)]
pub struct BufferSet {
    buffers: HashMap<BufferKind, BufferDescriptor>,
    stats: BufferSetStats,
}

impl BufferSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every buffer of the standard large enough for `params`
    ///
    /// Buffers covered by an enabled rowstore partition are skipped; an
    /// existing allocation for them is kept for later frames.
    pub fn prepare(
        &mut self,
        params: &SizeParams,
        rowstore: &RowstoreRegistry,
        allocator: &mut dyn ResourceAllocator,
    ) -> Result<()> {
        for &kind in BufferKind::for_standard(params.standard) {
            let cache = RowstoreKind::for_buffer(params.standard, kind).map(|k| rowstore.get(k));
            let desc = self
                .buffers
                .entry(kind)
                .or_insert_with(|| BufferDescriptor::new(kind));
            desc.rowstore = cache;

            if desc.uses_rowstore() {
                self.stats.rowstore_hits += 1;
                continue;
            }

            let Some(allocated) = desc.allocated else {
                let size = compute_size(kind, params)?;
                let handle = allocator.allocate(kind.resource_kind(), size)?;
                log::debug!("alloc {} {} bytes", kind.name(), size);

                desc.size = size;
                desc.handle = Some(handle);
                desc.allocated = Some(params.allocated());
                self.stats.allocations += 1;
                self.stats.bytes_allocated += size as u64;
                continue;
            };

            if !needs_realloc(kind, params, &allocated)? {
                continue;
            }

            let grown = SizeParams {
                width: params.width.max(allocated.width),
                height: params.height.max(allocated.height),
                lcu: params.lcu.max(allocated.lcu),
                max_frame_size: params.max_frame_size.max(allocated.frame_size),
                ..*params
            };
            let size = compute_size(kind, &grown)?;
            let handle = allocator.allocate(kind.resource_kind(), size)?;
            if let Some(old) = desc.handle.replace(handle) {
                allocator.free(old)?;
            }
            log::debug!("realloc {} {} -> {} bytes", kind.name(), desc.size, size);

            self.stats.bytes_allocated = self.stats.bytes_allocated - desc.size as u64 + size as u64;
            desc.size = size;
            desc.allocated = Some(grown.allocated());
            self.stats.reallocations += 1;
        }
        Ok(())
    }

    /// Descriptor of a kind
    pub fn get(&self, kind: BufferKind) -> Option<&BufferDescriptor> {
        self.buffers.get(&kind)
    }

    /// Allocator handle of a kind unless the rowstore serves it
    pub fn active_handle(&self, kind: BufferKind) -> Option<ResourceHandle> {
        self.get(kind).filter(|d| !d.uses_rowstore()).and_then(|d| d.handle)
    }

    /// GPU address of a kind, `None` when unallocated or cache-served
    pub fn address(&self, kind: BufferKind, allocator: &dyn ResourceAllocator) -> Result<Option<GpuAddr>> {
        self.active_handle(kind).map(|h| allocator.address(h)).transpose()
    }

    /// Free every allocation
    pub fn release(&mut self, allocator: &mut dyn ResourceAllocator) -> Result<()> {
        for desc in self.buffers.values_mut() {
            if let Some(handle) = desc.handle.take() {
                allocator.free(handle)?;
            }
            desc.allocated = None;
            desc.size = 0;
        }
        self.stats.bytes_allocated = 0;
        Ok(())
    }

    /// Statistics
    pub fn stats(&self) -> &BufferSetStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::testing::CountingAllocator;
    use vdbox_core::{ChromaFormat, RowstoreSupport, Standard};

    use crate::rowstore::RowstoreParams;

    fn no_rowstore() -> RowstoreRegistry {
        RowstoreRegistry::new(RowstoreSupport::empty())
    }

    #[test]
    fn test_first_frame_allocates_every_kind_once() {
        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new();
        let params = SizeParams::hevc(1920, 1080);

        set.prepare(&params, &no_rowstore(), &mut alloc).unwrap();
        assert_eq!(alloc.allocation_count(), BufferKind::HEVC.len());
        assert_eq!(set.get(BufferKind::DeblockLine).unwrap().size, 61440);

        set.prepare(&params, &no_rowstore(), &mut alloc).unwrap();
        assert_eq!(alloc.allocation_count(), BufferKind::HEVC.len());
    }

    #[test]
    fn test_resolution_increase_reallocates_once() {
        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new();
        set.prepare(&SizeParams::hevc(1920, 1080), &no_rowstore(), &mut alloc).unwrap();
        let first = alloc.allocation_count();

        let uhd = SizeParams::hevc(3840, 2160);
        set.prepare(&uhd, &no_rowstore(), &mut alloc).unwrap();
        let grown = alloc.allocation_count() - first;

        // Everything but the frame-size tracked streamout depends on geometry
        assert_eq!(grown, BufferKind::HEVC.len() - 1);
        assert_eq!(alloc.free_count(), grown);
        assert_eq!(set.stats().reallocations, grown as u64);
        assert_eq!(
            set.get(BufferKind::DeblockLine).unwrap().size,
            compute_size(BufferKind::DeblockLine, &uhd).unwrap()
        );

        set.prepare(&uhd, &no_rowstore(), &mut alloc).unwrap();
        assert_eq!(alloc.allocation_count() - first, grown);
    }

    #[test]
    fn test_never_shrinks() {
        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new();
        set.prepare(&SizeParams::hevc(3840, 1080), &no_rowstore(), &mut alloc).unwrap();
        set.prepare(&SizeParams::hevc(1920, 2160), &no_rowstore(), &mut alloc).unwrap();

        let line = set.get(BufferKind::DeblockLine).unwrap();
        assert_eq!(line.allocated.unwrap().width, 3840);
        let col = set.get(BufferKind::DeblockTileColumn).unwrap();
        assert_eq!(col.allocated.unwrap().height, 2160);
        assert_eq!(col.allocated.unwrap().width, 3840);
    }

    #[test]
    fn test_rowstore_skips_allocation() {
        let mut rowstore = RowstoreRegistry::new(RowstoreSupport::all());
        rowstore.update(&RowstoreParams {
            standard: Standard::Hevc,
            width: 1920,
            bit_depth_minus8: 0,
            chroma_format: ChromaFormat::Yuv420,
        });

        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new();
        set.prepare(&SizeParams::hevc(1920, 1080), &rowstore, &mut alloc).unwrap();

        assert_eq!(alloc.allocation_count(), BufferKind::HEVC.len() - 3);
        assert!(set.get(BufferKind::SaoLine).unwrap().uses_rowstore());
        assert_eq!(set.address(BufferKind::SaoLine, &alloc), Ok(None));
        assert!(set.address(BufferKind::SaoTileLine, &alloc).unwrap().is_some());
        assert_eq!(set.stats().rowstore_hits, 3);
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new().fail_after(2);
        let err = set.prepare(&SizeParams::hevc(1920, 1080), &no_rowstore(), &mut alloc);
        assert_eq!(err, Err(vdbox_core::Error::AllocationFailed));
    }

    #[test]
    fn test_release() {
        let mut set = BufferSet::new();
        let mut alloc = CountingAllocator::new();
        set.prepare(&SizeParams::vp9(640, 480), &no_rowstore(), &mut alloc).unwrap();
        set.release(&mut alloc).unwrap();
        assert_eq!(alloc.free_count(), BufferKind::VP9.len());
        assert_eq!(set.stats().bytes_allocated, 0);
    }
}
