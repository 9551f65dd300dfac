//! # Test Collaborators
//!
//! In-memory stand-ins for the allocator, command buffer and settings store.
//! Available to dependent crates through the `testing` feature.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::traits::{CommandSink, ResourceAllocator, ResourceKind, SettingsSource};
use crate::types::{align_up_u64, GpuAddr, ResourceHandle, PAGE_SIZE};

// =============================================================================
// VEC SINK
// =============================================================================

/// Fixed-capacity command buffer backed by a `Vec`
#[derive(Debug, Clone)]
pub struct VecSink {
    bytes: Vec<u8>,
    capacity: usize,
}

impl VecSink {
    /// Create a sink holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Raw bytes written
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Written bytes as little-endian dwords
    pub fn dwords(&self) -> Vec<u32> {
        self.bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Discard everything written
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl CommandSink for VecSink {
    fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    fn used(&self) -> usize {
        self.bytes.len()
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::CommandBufferFull);
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

// =============================================================================
// COUNTING ALLOCATOR
// =============================================================================

/// One allocation made through [`CountingAllocator`]
#[derive(Debug, Clone)]
pub struct MockAllocation {
    /// Usage
    pub kind: ResourceKind,
    /// Requested size
    pub size: u32,
    /// Assigned GPU address
    pub addr: GpuAddr,
    /// Backing storage
    pub data: Vec<u8>,
    /// Currently locked
    pub locked: bool,
    /// Freed
    pub freed: bool,
}

/// Allocator that records every call
#[derive(Debug, Clone)]
pub struct CountingAllocator {
    allocations: Vec<MockAllocation>,
    next_addr: u64,
    fail_after: Option<usize>,
    frees: usize,
}

impl CountingAllocator {
    /// Create an allocator that never fails
    pub fn new() -> Self {
        Self {
            allocations: Vec::new(),
            next_addr: 0x1_0000_0000,
            fail_after: None,
            frees: 0,
        }
    }

    /// Fail every allocation after the first `count`
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Total allocations made
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Allocations made for a given kind
    pub fn count_of(&self, kind: ResourceKind) -> usize {
        self.allocations.iter().filter(|a| a.kind == kind).count()
    }

    /// Total frees made
    pub fn free_count(&self) -> usize {
        self.frees
    }

    /// Allocation record for a handle
    pub fn get(&self, handle: ResourceHandle) -> Option<&MockAllocation> {
        self.allocations.get(handle.raw() as usize)
    }

    /// Contents of an allocation
    pub fn contents(&self, handle: ResourceHandle) -> Option<&[u8]> {
        self.get(handle).map(|a| a.data.as_slice())
    }

    fn entry(&mut self, handle: ResourceHandle) -> Result<&mut MockAllocation> {
        match self.allocations.get_mut(handle.raw() as usize) {
            Some(a) if !a.freed => Ok(a),
            _ => Err(Error::NotFound),
        }
    }
}

impl Default for CountingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceAllocator for CountingAllocator {
    fn allocate(&mut self, kind: ResourceKind, size: u32) -> Result<ResourceHandle> {
        if self.fail_after.is_some_and(|n| self.allocations.len() >= n) {
            return Err(Error::AllocationFailed);
        }
        if size == 0 {
            return Err(Error::InvalidParameter);
        }

        let addr = GpuAddr::new(self.next_addr);
        self.next_addr = align_up_u64(self.next_addr + size as u64, PAGE_SIZE as u64);

        let handle = ResourceHandle::new(self.allocations.len() as u32);
        self.allocations.push(MockAllocation {
            kind,
            size,
            addr,
            data: vec![0; size as usize],
            locked: false,
            freed: false,
        });
        Ok(handle)
    }

    fn address(&self, handle: ResourceHandle) -> Result<GpuAddr> {
        match self.get(handle) {
            Some(a) if !a.freed => Ok(a.addr),
            _ => Err(Error::NotFound),
        }
    }

    fn lock(&mut self, handle: ResourceHandle) -> Result<&mut [u8]> {
        let entry = self.entry(handle)?;
        if entry.locked {
            return Err(Error::LockFailed);
        }
        entry.locked = true;
        Ok(entry.data.as_mut_slice())
    }

    fn unlock(&mut self, handle: ResourceHandle) -> Result<()> {
        let entry = self.entry(handle)?;
        entry.locked = false;
        Ok(())
    }

    fn free(&mut self, handle: ResourceHandle) -> Result<()> {
        let entry = self.entry(handle)?;
        entry.freed = true;
        self.frees += 1;
        Ok(())
    }
}

// =============================================================================
// MAP SETTINGS
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Setting {
    Bool(bool),
    U32(u32),
}

/// Settings store backed by a map
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: BTreeMap<String, Setting>,
}

impl MapSettings {
    /// Empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a boolean key
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Setting::Bool(value));
    }

    /// Set an integer key
    pub fn set_u32(&mut self, key: &str, value: u32) {
        self.values.insert(key.to_string(), Setting::U32(value));
    }
}

impl SettingsSource for MapSettings {
    fn read_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Setting::Bool(b) => Some(*b),
            Setting::U32(v) => Some(*v != 0),
        }
    }

    fn read_u32(&self, key: &str) -> Option<u32> {
        match self.values.get(key)? {
            Setting::U32(v) => Some(*v),
            Setting::Bool(b) => Some(*b as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_all_or_nothing() {
        let mut sink = VecSink::with_capacity(8);
        sink.append(&[1, 2, 3, 4]).unwrap();
        assert_eq!(sink.append(&[0; 8]), Err(Error::CommandBufferFull));
        assert_eq!(sink.used(), 4);
        assert_eq!(sink.dwords(), vec![0x0403_0201]);
    }

    #[test]
    fn test_allocator_lifecycle() {
        let mut alloc = CountingAllocator::new();
        let h = alloc.allocate(ResourceKind::Dmem, 192).unwrap();
        alloc.lock(h).unwrap()[0] = 0xAA;
        assert_eq!(alloc.lock(h).err(), Some(Error::LockFailed));
        alloc.unlock(h).unwrap();
        assert_eq!(alloc.contents(h).unwrap()[0], 0xAA);
        alloc.free(h).unwrap();
        assert_eq!(alloc.address(h), Err(Error::NotFound));
    }

    #[test]
    fn test_allocator_failure_injection() {
        let mut alloc = CountingAllocator::new().fail_after(1);
        assert!(alloc.allocate(ResourceKind::Scratch, 64).is_ok());
        assert_eq!(alloc.allocate(ResourceKind::Scratch, 64), Err(Error::AllocationFailed));
    }
}
