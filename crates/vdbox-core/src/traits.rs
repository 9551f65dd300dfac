//! # VDBOX Collaborator Traits
//!
//! The encode layer never owns memory, never submits, and never reads the
//! registry. It talks to three collaborators instead.
//!
//! ## Trait Map
//!
//! ```text
//! EncodePipeline
//!    │
//!    ├── ResourceAllocator  (allocate / lock / unlock / free)
//!    │
//!    ├── CommandSink        (capacity-checked command buffer cursor)
//!    │
//!    └── SettingsSource     (user feature overrides, read once)
//! ```

use crate::error::Result;
use crate::types::*;

// =============================================================================
// RESOURCE ALLOCATOR
// =============================================================================

/// What an allocation is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Hardware scratch line / column buffer
    Scratch,
    /// Streamout written by the PAK (CABAC, CU records, sizes)
    Streamout,
    /// Statistics written by PAK / VDEnc
    Statistics,
    /// HuC DMEM block
    Dmem,
    /// Second-level batch buffer
    BatchBuffer,
}

bitflags::bitflags! {
    /// Hints for the allocator
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// CPU writes through lock()
        const CPU_VISIBLE = 1 << 0;
        /// Contents must be zero on first use
        const ZERO_INIT = 1 << 1;
        /// Page-aligned base address
        const PAGE_ALIGNED = 1 << 2;
    }
}

impl ResourceKind {
    /// Default allocation hints for this kind
    pub const fn default_flags(self) -> AllocFlags {
        match self {
            Self::Scratch => AllocFlags::empty(),
            Self::Streamout => AllocFlags::ZERO_INIT,
            Self::Statistics => AllocFlags::ZERO_INIT.union(AllocFlags::PAGE_ALIGNED),
            Self::Dmem | Self::BatchBuffer => AllocFlags::CPU_VISIBLE,
        }
    }
}

/// Resource allocation collaborator
///
/// Sizes are in bytes and already cache-line aligned by the caller.
pub trait ResourceAllocator {
    /// Allocate a linear buffer
    fn allocate(&mut self, kind: ResourceKind, size: u32) -> Result<ResourceHandle>;

    /// GPU address of an allocation, as written into command address fields
    fn address(&self, handle: ResourceHandle) -> Result<GpuAddr>;

    /// Map an allocation for CPU writes
    fn lock(&mut self, handle: ResourceHandle) -> Result<&mut [u8]>;

    /// Release a CPU mapping
    fn unlock(&mut self, handle: ResourceHandle) -> Result<()>;

    /// Free an allocation
    fn free(&mut self, handle: ResourceHandle) -> Result<()>;
}

// =============================================================================
// COMMAND SINK
// =============================================================================

/// Command buffer cursor
///
/// `append` is all-or-nothing: on `CommandBufferFull` no byte is written and
/// the cursor does not move.
pub trait CommandSink {
    /// Bytes still available
    fn remaining(&self) -> usize;

    /// Bytes written so far
    fn used(&self) -> usize;

    /// Append bytes and advance the cursor
    fn append(&mut self, bytes: &[u8]) -> Result<()>;
}

// =============================================================================
// SETTINGS SOURCE
// =============================================================================

/// User feature / registry settings
pub trait SettingsSource {
    /// Boolean setting, `None` when the key is absent
    fn read_bool(&self, key: &str) -> Option<bool>;

    /// Integer setting, `None` when the key is absent
    fn read_u32(&self, key: &str) -> Option<u32>;
}

/// Settings source with no overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettings;

impl SettingsSource for NoSettings {
    fn read_bool(&self, _key: &str) -> Option<bool> {
        None
    }

    fn read_u32(&self, _key: &str) -> Option<u32> {
        None
    }
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(GpuAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(ResourceHandle: Send, Sync, Copy);
static_assertions::assert_impl_all!(FrameSize: Send, Sync, Copy);
static_assertions::assert_impl_all!(crate::error::Error: Send, Sync, Copy);
static_assertions::assert_obj_safe!(ResourceAllocator, CommandSink, SettingsSource);
