//! # MI Commands
//!
//! Memory-interface commands shared by every engine: flushes, immediate
//! stores, register access and batch termination.

use vdbox_core::{GpuAddr, Result};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::CommandRecord;

command_fields! {
    /// MI_FLUSH_DW
    MiFlushDw {
        video_pipeline_cache_invalidate = 0 [7:7],
        post_sync_operation = 0 [15:14],
    }
}

command_fields! {
    /// MI_LOAD_REGISTER_IMM
    MiLoadRegisterImm {
        register_offset = 1 [22:2],
        data = 2 [31:0],
    }
}

command_fields! {
    /// MI_STORE_REGISTER_MEM
    MiStoreRegisterMem {
        register_offset = 1 [22:2],
    }
}

/// Post-sync operation of MI_FLUSH_DW
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum PostSync {
    /// No write
    #[default]
    None = 0,
    /// Write the immediate data
    WriteImmediate = 1,
    /// Write the timestamp
    WriteTimestamp = 3,
}

// =============================================================================
// COMMANDS
// =============================================================================

/// MI_NOOP
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl EncodeCommand for Noop {
    const ID: CommandId = CommandId::MiNoop;

    fn fill(&self, _gen: &GenerationDescriptor, _rec: &mut CommandRecord) -> Result<()> {
        Ok(())
    }
}

/// MI_BATCH_BUFFER_END
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchBufferEnd;

impl EncodeCommand for BatchBufferEnd {
    const ID: CommandId = CommandId::MiBatchBufferEnd;

    fn fill(&self, _gen: &GenerationDescriptor, _rec: &mut CommandRecord) -> Result<()> {
        Ok(())
    }
}

/// MI_FLUSH_DW
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushDw {
    /// Invalidate the video pipeline caches
    pub video_pipeline_cache_invalidate: bool,
    /// Post-sync write
    pub post_sync: PostSync,
    /// Post-sync destination
    pub address: GpuAddr,
    /// Post-sync immediate data
    pub data: u64,
}

impl EncodeCommand for FlushDw {
    const ID: CommandId = CommandId::MiFlushDw;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set_bool(mi_flush_dw::VIDEO_PIPELINE_CACHE_INVALIDATE, self.video_pipeline_cache_invalidate)?;
        rec.set(mi_flush_dw::POST_SYNC_OPERATION, self.post_sync as u32)?;
        if self.post_sync != PostSync::None {
            rec.set_address(1, self.address)?;
            rec.set_dword(3, self.data as u32)?;
            rec.set_dword(4, (self.data >> 32) as u32)?;
        }
        Ok(())
    }
}

/// MI_STORE_DATA_IMM (single dword)
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreDataImm {
    /// Destination
    pub address: GpuAddr,
    /// Value
    pub value: u32,
}

impl EncodeCommand for StoreDataImm {
    const ID: CommandId = CommandId::MiStoreDataImm;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set_address(1, self.address)?;
        rec.set_dword(3, self.value)
    }
}

/// MI_LOAD_REGISTER_IMM
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadRegisterImm {
    /// MMIO offset
    pub register: u32,
    /// Value
    pub data: u32,
}

impl EncodeCommand for LoadRegisterImm {
    const ID: CommandId = CommandId::MiLoadRegisterImm;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set(mi_load_register_imm::REGISTER_OFFSET, self.register >> 2)?;
        rec.set(mi_load_register_imm::DATA, self.data)
    }
}

/// MI_STORE_REGISTER_MEM
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreRegisterMem {
    /// MMIO offset
    pub register: u32,
    /// Destination
    pub address: GpuAddr,
}

impl EncodeCommand for StoreRegisterMem {
    const ID: CommandId = CommandId::MiStoreRegisterMem;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set(mi_store_register_mem::REGISTER_OFFSET, self.register >> 2)?;
        rec.set_address(2, self.address)
    }
}
