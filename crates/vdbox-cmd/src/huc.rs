//! # HuC Commands
//!
//! Commands that hand the bitrate-control firmware its DMEM block and the
//! buffers it reads and writes.

use vdbox_core::{Error, GpuAddr, Result};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::{CommandRecord, Field};

command_fields! {
    /// HUC_PIPE_MODE_SELECT
    HucPipeModeSelect {
        indirect_stream_out = 1 [4:4],
        stream_object = 1 [10:10],
    }
}

command_fields! {
    /// HUC_DMEM_STATE
    HucDmemState {
        destination = 4 [16:6],
        length = 5 [16:6],
    }
}

command_fields! {
    /// HUC_START
    HucStart {
        last_stream_object = 1 [0:0],
    }
}

const MOCS: Field = Field::bits(0, 1, 6);

/// Virtual address regions of HUC_VIRTUAL_ADDR_STATE
pub const HUC_REGIONS: usize = 16;

/// Largest DMEM block the firmware accepts
pub const MAX_DMEM_SIZE: u32 = 0x1_0000;

/// HUC_PIPE_MODE_SELECT
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeModeSelect {
    /// Firmware writes through the indirect streamout
    pub indirect_stream_out: bool,
    /// Stream-object mode
    pub stream_object: bool,
}

impl EncodeCommand for PipeModeSelect {
    const ID: CommandId = CommandId::HucPipeModeSelect;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set_bool(huc_pipe_mode_select::INDIRECT_STREAM_OUT, self.indirect_stream_out)?;
        rec.set_bool(huc_pipe_mode_select::STREAM_OBJECT, self.stream_object)
    }
}

/// HUC_DMEM_STATE
#[derive(Debug, Clone, Copy, Default)]
pub struct DmemState {
    /// DMEM block in graphics memory
    pub source: GpuAddr,
    /// Load offset inside the firmware data memory, 64-byte aligned
    pub destination: u32,
    /// Bytes to load; rounded up to 64
    pub length: u32,
    /// Cacheability index
    pub mocs: u8,
}

impl EncodeCommand for DmemState {
    const ID: CommandId = CommandId::HucDmemState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        if self.source.is_null() {
            return Err(Error::NullParameter);
        }
        if self.destination % 64 != 0 || self.length == 0 || self.destination + self.length > MAX_DMEM_SIZE {
            return Err(Error::InvalidParameter);
        }
        rec.set_address(1, self.source)?;
        rec.set_dword(3, MOCS.encode(self.mocs as u32))?;
        rec.set(huc_dmem_state::DESTINATION, self.destination >> 6)?;
        rec.set(huc_dmem_state::LENGTH, vdbox_core::align_up(self.length, 64) >> 6)
    }
}

/// One region of HUC_VIRTUAL_ADDR_STATE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Buffer address
    pub address: GpuAddr,
    /// Cacheability index
    pub mocs: u8,
}

/// HUC_VIRTUAL_ADDR_STATE
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualAddrState {
    /// Regions by index; the firmware decides what each one holds
    pub regions: [Option<Region>; HUC_REGIONS],
}

impl VirtualAddrState {
    /// Bind `region` to buffer `address`
    pub fn bind(&mut self, region: usize, address: GpuAddr, mocs: u8) -> Result<()> {
        let slot = self.regions.get_mut(region).ok_or(Error::InvalidParameter)?;
        *slot = Some(Region { address, mocs });
        Ok(())
    }
}

impl EncodeCommand for VirtualAddrState {
    const ID: CommandId = CommandId::HucVirtualAddrState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        for (i, region) in self.regions.iter().enumerate() {
            if let Some(region) = region {
                let dw = 1 + 3 * i;
                rec.set_address(dw, region.address)?;
                rec.set_dword(dw + 2, MOCS.encode(region.mocs as u32))?;
            }
        }
        Ok(())
    }
}

/// HUC_START
#[derive(Debug, Clone, Copy)]
pub struct Start {
    /// Last stream object of the workload
    pub last_stream_object: bool,
}

impl Default for Start {
    fn default() -> Self {
        Self {
            last_stream_object: true,
        }
    }
}

impl EncodeCommand for Start {
    const ID: CommandId = CommandId::HucStart;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set_bool(huc_start::LAST_STREAM_OBJECT, self.last_stream_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::Generation;

    fn gen12() -> &'static GenerationDescriptor {
        GenerationDescriptor::for_generation(Generation::Gen12)
    }

    #[test]
    fn test_dmem_state() {
        let cmd = DmemState {
            source: GpuAddr::new(0x2_0000),
            destination: 0x40,
            length: 100,
            mocs: 1,
        };
        let rec = cmd.encode(gen12()).unwrap();
        assert_eq!(rec.dwords(), [0x7582_0004, 0x2_0000, 0, 1 << 1, 0x40, 128]);
    }

    #[test]
    fn test_dmem_state_validation() {
        let null = DmemState {
            length: 64,
            ..DmemState::default()
        };
        assert_eq!(null.encode(gen12()).unwrap_err(), Error::NullParameter);

        let unaligned = DmemState {
            source: GpuAddr::new(0x1000),
            destination: 8,
            length: 64,
            mocs: 0,
        };
        assert_eq!(unaligned.encode(gen12()).unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn test_virtual_addr_regions() {
        let mut cmd = VirtualAddrState::default();
        cmd.bind(0, GpuAddr::new(0x1000), 2).unwrap();
        cmd.bind(15, GpuAddr::new(0x1_0000_2000), 2).unwrap();
        assert_eq!(cmd.bind(16, GpuAddr::new(0x3000), 2), Err(Error::InvalidParameter));

        let rec = cmd.encode(gen12()).unwrap();
        let dw = rec.dwords();
        assert_eq!(dw.len(), 49);
        assert_eq!(dw[1..4], [0x1000, 0, 4]);
        assert_eq!(dw[46..49], [0x2000, 1, 4]);
        assert_eq!(dw[4], 0);
    }

    #[test]
    fn test_start_and_pipe_mode() {
        assert_eq!(Start::default().encode(gen12()).unwrap().dwords(), [0x75A1_0000, 1]);
        let mode = PipeModeSelect {
            indirect_stream_out: false,
            stream_object: false,
        };
        assert_eq!(mode.encode(gen12()).unwrap().dwords(), [0x7580_0001, 0, 0]);
        assert_eq!(
            Start::default()
                .encode(GenerationDescriptor::for_generation(Generation::Gen9))
                .unwrap_err(),
            Error::PlatformNotSupported
        );
    }
}
