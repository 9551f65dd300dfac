//! # VDEnc Commands
//!
//! Front-end (motion search / mode decision) commands. They exist from Gen11
//! on; on Gen9 every command resolves to `PlatformNotSupported`.

use vdbox_core::{ChromaFormat, Error, GpuAddr, PictureParams, Result, SliceParams, SliceType, Standard};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{Capabilities, CommandId, GenerationDescriptor};
use crate::hcp::{BufferAddress, CtbPosition, PixelFormat};
use crate::record::{CommandRecord, Field};

command_fields! {
    /// VDENC_PIPE_MODE_SELECT
    VdencPipeModeSelect {
        standard_select = 1 [3:0],
        scalability_mode = 1 [4:4],
        frame_statistics_streamout = 1 [5:5],
        pak_object_streamout = 1 [6:6],
        tlb_prefetch = 1 [7:7],
        pak_threshold_check = 1 [8:8],
        streamin = 1 [9:9],
        bit_depth = 1 [14:12],
        chroma_type = 1 [16:15],
        random_access = 1 [18:18],
        tile_replay = 1 [25:25],
    }
}

command_fields! {
    /// VDENC_SRC_SURFACE_STATE / VDENC_REF_SURFACE_STATE
    VdencSurfaceState {
        width_minus1 = 2 [17:4],
        height_minus1 = 2 [31:18],
        tiled = 3 [1:1],
        pitch_minus1 = 3 [19:3],
        surface_format = 3 [31:27],
        y_offset_for_u = 4 [14:0],
        y_offset_for_v = 5 [14:0],
    }
}

command_fields! {
    /// VDENC_WALKER_STATE
    VdencWalkerState {
        start_y = 1 [8:0],
        start_x = 1 [24:16],
        first_super_slice = 1 [28:28],
        next_y = 2 [9:0],
        next_x = 2 [25:16],
        log2_weight_denom_luma = 3 [2:0],
        hevc_log2_weight_denom_luma = 3 [6:4],
        num_par_engine = 3 [10:9],
        tile_row_store_select = 3 [16:16],
        tile_number = 3 [31:24],
        tile_start_ctb_y = 4 [15:0],
        tile_start_ctb_x = 4 [31:16],
        tile_width = 5 [15:0],
        tile_height = 5 [31:16],
        streamin_offset_enable = 6 [0:0],
        streamin_offset = 6 [31:6],
        rowstore_offset_enable = 7 [0:0],
        rowstore_offset = 7 [31:6],
        streamout_offset_enable = 8 [0:0],
        streamout_offset = 8 [31:6],
        lcu_streamout_offset_enable = 9 [0:0],
        lcu_streamout_offset = 9 [31:6],
    }
}

command_fields! {
    /// VDENC_WEIGHTSOFFSETS_STATE
    VdencWeightsOffsetsState {
        weight_fwd0 = 1 [7:0],
        offset_fwd0 = 1 [15:8],
        weight_fwd1 = 1 [23:16],
        offset_fwd1 = 1 [31:24],
        weight_fwd2 = 2 [7:0],
        offset_fwd2 = 2 [15:8],
        weight_bwd0 = 2 [23:16],
        offset_bwd0 = 2 [31:24],
    }
}

command_fields! {
    /// VDENC_CONTROL_STATE
    VdencControlState {
        vdenc_initialization = 1 [1:1],
    }
}

const MOCS: Field = Field::bits(0, 1, 6);
const ROWSTORE_CACHE_SELECT: Field = Field::bits(0, 12, 12);

fn require(gen: &GenerationDescriptor, caps: Capabilities) -> Result<()> {
    if gen.has(caps) {
        Ok(())
    } else {
        log::debug!("{}: missing {:?}", gen.generation.name(), caps);
        Err(Error::PlatformNotSupported)
    }
}

// =============================================================================
// PIPE MODE SELECT
// =============================================================================

/// VDENC_PIPE_MODE_SELECT
#[derive(Debug, Clone, Copy)]
pub struct PipeModeSelect {
    /// Codec standard
    pub standard: Standard,
    /// Tile-parallel scalability
    pub scalability: bool,
    /// Frame statistics streamout
    pub frame_statistics_streamout: bool,
    /// PAK object streamout
    pub pak_object_streamout: bool,
    /// TLB prefetch
    pub tlb_prefetch: bool,
    /// Slice-size threshold check (dynamic slice sizing)
    pub pak_threshold_check: bool,
    /// Per-LCU stream-in surface
    pub streamin: bool,
    /// Bit depth of the encoded samples
    pub bit_depth: u8,
    /// Chroma format
    pub chroma_format: ChromaFormat,
    /// Random-access GOP (backward references present)
    pub random_access: bool,
    /// Tile replay
    pub tile_replay: bool,
}

impl Default for PipeModeSelect {
    fn default() -> Self {
        Self {
            standard: Standard::Hevc,
            scalability: false,
            frame_statistics_streamout: true,
            pak_object_streamout: true,
            tlb_prefetch: true,
            pak_threshold_check: false,
            streamin: false,
            bit_depth: 8,
            chroma_format: ChromaFormat::Yuv420,
            random_access: false,
            tile_replay: false,
        }
    }
}

impl EncodeCommand for PipeModeSelect {
    const ID: CommandId = CommandId::VdencPipeModeSelect;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use vdenc_pipe_mode_select as f;

        let standard = match self.standard {
            Standard::Hevc => 3,
            Standard::Vp9 => {
                require(gen, Capabilities::VP9_ENCODE)?;
                4
            }
        };
        let bit_depth = match self.bit_depth {
            8 => 0,
            10 => {
                require(gen, Capabilities::TEN_BIT)?;
                2
            }
            _ => return Err(Error::InvalidParameter),
        };
        let chroma = match self.chroma_format {
            ChromaFormat::Yuv420 => 1,
            ChromaFormat::Yuv444 => {
                require(gen, Capabilities::YUV444)?;
                3
            }
            _ => return Err(Error::InvalidParameter),
        };
        if self.tile_replay {
            require(gen, Capabilities::TILE_REPLAY)?;
        }
        if self.scalability {
            require(gen, Capabilities::SCALABILITY)?;
        }

        rec.set(f::STANDARD_SELECT, standard)?;
        rec.set_bool(f::SCALABILITY_MODE, self.scalability)?;
        rec.set_bool(f::FRAME_STATISTICS_STREAMOUT, self.frame_statistics_streamout)?;
        rec.set_bool(f::PAK_OBJECT_STREAMOUT, self.pak_object_streamout)?;
        rec.set_bool(f::TLB_PREFETCH, self.tlb_prefetch)?;
        rec.set_bool(f::PAK_THRESHOLD_CHECK, self.pak_threshold_check)?;
        rec.set_bool(f::STREAMIN, self.streamin)?;
        rec.set(f::BIT_DEPTH, bit_depth)?;
        rec.set(f::CHROMA_TYPE, chroma)?;
        rec.set_bool(f::RANDOM_ACCESS, self.random_access)?;
        rec.set_bool(f::TILE_REPLAY, self.tile_replay)
    }
}

// =============================================================================
// SURFACE STATE
// =============================================================================

/// Geometry of a source or reference surface
#[derive(Debug, Clone, Copy)]
pub struct Surface {
    /// Pixel format
    pub format: PixelFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in rows
    pub height: u32,
    /// Row pitch in bytes
    pub pitch: u32,
    /// Tile-Y layout
    pub tiled: bool,
    /// Row offset of the U (or UV) plane
    pub u_offset: u32,
    /// Row offset of the V plane
    pub v_offset: u32,
}

impl Surface {
    /// Planar surface with chroma right below the luma
    pub fn planar(format: PixelFormat, width: u32, height: u32, pitch: u32) -> Self {
        Self {
            format,
            width,
            height,
            pitch,
            tiled: true,
            u_offset: height,
            v_offset: height,
        }
    }

    fn fill(&self, rec: &mut CommandRecord, reference: bool) -> Result<()> {
        use vdenc_surface_state as f;

        if self.width == 0 || self.height == 0 || self.pitch == 0 {
            return Err(Error::InvalidParameter);
        }
        let format = match (self.format, reference) {
            (PixelFormat::Nv12, _) => 4,
            (PixelFormat::P010, false) => 8,
            // references are written by the PAK in the variant layout
            (PixelFormat::P010, true) => 12,
            (PixelFormat::Yuy2, _) => 0,
            (PixelFormat::Ayuv, _) => 2,
            (PixelFormat::Y410, _) => 10,
            (PixelFormat::Y210, _) => return Err(Error::InvalidParameter),
        };
        rec.set(f::WIDTH_MINUS1, self.width - 1)?;
        rec.set(f::HEIGHT_MINUS1, self.height - 1)?;
        rec.set_bool(f::TILED, self.tiled)?;
        rec.set(f::PITCH_MINUS1, self.pitch - 1)?;
        rec.set(f::SURFACE_FORMAT, format)?;
        rec.set(f::Y_OFFSET_FOR_U, self.u_offset)?;
        rec.set(f::Y_OFFSET_FOR_V, self.v_offset)
    }
}

/// VDENC_SRC_SURFACE_STATE
#[derive(Debug, Clone, Copy)]
pub struct SrcSurfaceState(pub Surface);

impl EncodeCommand for SrcSurfaceState {
    const ID: CommandId = CommandId::VdencSrcSurfaceState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        self.0.fill(rec, false)
    }
}

/// VDENC_REF_SURFACE_STATE
#[derive(Debug, Clone, Copy)]
pub struct RefSurfaceState(pub Surface);

impl EncodeCommand for RefSurfaceState {
    const ID: CommandId = CommandId::VdencRefSurfaceState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        self.0.fill(rec, true)
    }
}

// =============================================================================
// PIPE BUFFER ADDRESSES
// =============================================================================

/// Slots of VDENC_PIPE_BUF_ADDR_STATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum VdencSlot {
    DsFwdRef0,
    DsFwdRef1,
    OriginalSource,
    Streamin,
    RowStoreScratch,
    ColocatedMv,
    FwdRef0,
    FwdRef1,
    FwdRef2,
    BwdRef0,
    Statistics,
    DsFwdRef04x,
    CuRecord,
    LcuPakObject,
    TileRowStore,
    CumulativeCu,
}

impl VdencSlot {
    /// Number of slots
    pub const COUNT: usize = 16;

    /// All slots in command order
    pub const ALL: [Self; Self::COUNT] = [
        Self::DsFwdRef0,
        Self::DsFwdRef1,
        Self::OriginalSource,
        Self::Streamin,
        Self::RowStoreScratch,
        Self::ColocatedMv,
        Self::FwdRef0,
        Self::FwdRef1,
        Self::FwdRef2,
        Self::BwdRef0,
        Self::Statistics,
        Self::DsFwdRef04x,
        Self::CuRecord,
        Self::LcuPakObject,
        Self::TileRowStore,
        Self::CumulativeCu,
    ];

    /// First dword of the slot's address
    pub const fn dword(self) -> usize {
        match self {
            Self::DsFwdRef0 => 1,
            Self::DsFwdRef1 => 4,
            Self::OriginalSource => 10,
            Self::Streamin => 13,
            Self::RowStoreScratch => 16,
            Self::ColocatedMv => 19,
            Self::FwdRef0 => 22,
            Self::FwdRef1 => 25,
            Self::FwdRef2 => 28,
            Self::BwdRef0 => 31,
            Self::Statistics => 34,
            Self::DsFwdRef04x => 37,
            Self::CuRecord => 43,
            Self::LcuPakObject => 46,
            Self::TileRowStore => 62,
            Self::CumulativeCu => 65,
        }
    }
}

/// VDENC_PIPE_BUF_ADDR_STATE
#[derive(Debug, Clone, Default)]
pub struct PipeBufAddr {
    slots: [Option<BufferAddress>; VdencSlot::COUNT],
    /// Cacheability index
    pub mocs: u8,
}

impl PipeBufAddr {
    /// Point `slot` at `addr`
    pub fn set(&mut self, slot: VdencSlot, addr: BufferAddress) {
        self.slots[slot as usize] = Some(addr);
    }

    /// Point `slot` at graphics memory
    pub fn set_memory(&mut self, slot: VdencSlot, addr: GpuAddr) {
        self.set(slot, BufferAddress::Memory(addr));
    }

    /// Current address of `slot`
    pub fn get(&self, slot: VdencSlot) -> Option<BufferAddress> {
        self.slots[slot as usize]
    }
}

impl EncodeCommand for PipeBufAddr {
    const ID: CommandId = CommandId::VdencPipeBufAddrState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        for slot in VdencSlot::ALL {
            let dw = slot.dword();
            let (low, high, rowstore) = match self.get(slot) {
                Some(BufferAddress::Memory(addr)) if !addr.is_null() => (addr.low(), addr.high(), false),
                Some(BufferAddress::Rowstore(offset)) => (offset << 6, 0, true),
                _ => continue,
            };
            rec.set_dword(dw, low)?;
            rec.set_dword(dw + 1, high)?;
            rec.set_dword(
                dw + 2,
                MOCS.encode(self.mocs as u32) | ROWSTORE_CACHE_SELECT.encode(rowstore as u32),
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// WALKER
// =============================================================================

/// VDENC_WALKER_STATE
///
/// Offsets are in 64-byte units; `None` leaves the offset disabled.
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct WalkerState {
    pub start: CtbPosition,
    pub next: CtbPosition,
    pub first_super_slice: bool,
    pub luma_log2_weight_denom: u8,
    pub num_pipes: u8,
    pub tile_row_store_select: bool,
    pub tile_number: u8,
    /// Tile origin in CTBs
    pub tile_start: CtbPosition,
    /// Tile size in pixels, minus one
    pub tile_width_minus1: u16,
    pub tile_height_minus1: u16,
    pub streamin_offset: Option<u32>,
    pub rowstore_offset: Option<u32>,
    pub streamout_offset: Option<u32>,
    pub lcu_streamout_offset: Option<u32>,
}

fn set_offset(rec: &mut CommandRecord, enable: Field, field: Field, offset: Option<u32>) -> Result<()> {
    if let Some(offset) = offset {
        rec.set_bool(enable, true)?;
        rec.set(field, offset)?;
    }
    Ok(())
}

impl EncodeCommand for WalkerState {
    const ID: CommandId = CommandId::VdencWalkerState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use vdenc_walker_state as f;

        rec.set(f::START_Y, self.start.y)?;
        rec.set(f::START_X, self.start.x)?;
        rec.set_bool(f::FIRST_SUPER_SLICE, self.first_super_slice)?;
        rec.set(f::NEXT_Y, self.next.y)?;
        rec.set(f::NEXT_X, self.next.x)?;
        rec.set(f::HEVC_LOG2_WEIGHT_DENOM_LUMA, self.luma_log2_weight_denom as u32)?;
        rec.set(f::NUM_PAR_ENGINE, self.num_pipes as u32)?;
        rec.set_bool(f::TILE_ROW_STORE_SELECT, self.tile_row_store_select)?;
        rec.set(f::TILE_NUMBER, self.tile_number as u32)?;
        rec.set(f::TILE_START_CTB_Y, self.tile_start.y)?;
        rec.set(f::TILE_START_CTB_X, self.tile_start.x)?;
        rec.set(f::TILE_WIDTH, self.tile_width_minus1 as u32)?;
        rec.set(f::TILE_HEIGHT, self.tile_height_minus1 as u32)?;

        set_offset(rec, f::STREAMIN_OFFSET_ENABLE, f::STREAMIN_OFFSET, self.streamin_offset)?;
        set_offset(rec, f::ROWSTORE_OFFSET_ENABLE, f::ROWSTORE_OFFSET, self.rowstore_offset)?;
        set_offset(rec, f::STREAMOUT_OFFSET_ENABLE, f::STREAMOUT_OFFSET, self.streamout_offset)?;
        set_offset(
            rec,
            f::LCU_STREAMOUT_OFFSET_ENABLE,
            f::LCU_STREAMOUT_OFFSET,
            self.lcu_streamout_offset,
        )
    }
}

// =============================================================================
// WEIGHTS / OFFSETS
// =============================================================================

/// VDENC_WEIGHTSOFFSETS_STATE
///
/// Luma weights of the first three forward references and the first
/// backward reference, as absolute weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightsOffsetsState {
    /// Forward reference weights
    pub fwd_weight: [i8; 3],
    /// Forward reference offsets
    pub fwd_offset: [i8; 3],
    /// Backward reference weight
    pub bwd_weight: i8,
    /// Backward reference offset
    pub bwd_offset: i8,
}

impl Default for WeightsOffsetsState {
    fn default() -> Self {
        Self {
            fwd_weight: [1; 3],
            fwd_offset: [0; 3],
            bwd_weight: 1,
            bwd_offset: 0,
        }
    }
}

impl WeightsOffsetsState {
    /// Weights of `slice`; unit weights unless explicit weighting applies
    ///
    /// Offsets of high-bit-depth content are scaled down to 8-bit precision.
    pub fn for_slice(pic: &PictureParams, slice: &SliceParams, bit_depth_luma_minus8: u8) -> Self {
        let weighted = match slice.slice_type {
            SliceType::P => pic.weighted_pred,
            SliceType::B => pic.weighted_bipred,
            SliceType::I => false,
        };
        if !weighted {
            return Self::default();
        }

        let denom = 1i32 << slice.luma_log2_weight_denom.min(7);
        let shift = bit_depth_luma_minus8 as u32;
        let weight = |list: usize, i: usize| -> i8 {
            (slice.weights[list].luma_weight_delta[i] as i32 + denom).clamp(-128, 127) as i8
        };
        let offset = |list: usize, i: usize| -> i8 {
            ((slice.weights[list].luma_offset[i] as i32) >> shift).clamp(-128, 127) as i8
        };

        let mut state = Self::default();
        let l0 = slice.num_ref_l0().min(3) as usize;
        for i in 0..l0 {
            state.fwd_weight[i] = weight(0, i);
            state.fwd_offset[i] = offset(0, i);
        }
        if slice.num_ref_l1() > 0 {
            state.bwd_weight = weight(1, 0);
            state.bwd_offset = offset(1, 0);
        }
        state
    }
}

impl EncodeCommand for WeightsOffsetsState {
    const ID: CommandId = CommandId::VdencWeightsOffsetsState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use vdenc_weights_offsets_state as f;

        rec.set_signed(f::WEIGHT_FWD0, self.fwd_weight[0] as i32)?;
        rec.set_signed(f::OFFSET_FWD0, self.fwd_offset[0] as i32)?;
        rec.set_signed(f::WEIGHT_FWD1, self.fwd_weight[1] as i32)?;
        rec.set_signed(f::OFFSET_FWD1, self.fwd_offset[1] as i32)?;
        rec.set_signed(f::WEIGHT_FWD2, self.fwd_weight[2] as i32)?;
        rec.set_signed(f::OFFSET_FWD2, self.fwd_offset[2] as i32)?;
        rec.set_signed(f::WEIGHT_BWD0, self.bwd_weight as i32)?;
        rec.set_signed(f::OFFSET_BWD0, self.bwd_offset as i32)
    }
}

// =============================================================================
// CONTROL STATE
// =============================================================================

/// VDENC_CONTROL_STATE
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlState {
    /// Reset the VDEnc pipe before the frame
    pub initialize: bool,
}

impl EncodeCommand for ControlState {
    const ID: CommandId = CommandId::VdencControlState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        rec.set_bool(vdenc_control_state::VDENC_INITIALIZATION, self.initialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::Generation;

    fn gen(g: Generation) -> &'static GenerationDescriptor {
        GenerationDescriptor::for_generation(g)
    }

    #[test]
    fn test_gen9_not_supported() {
        let gen9 = gen(Generation::Gen9);
        assert_eq!(
            PipeModeSelect::default().encode(gen9).unwrap_err(),
            Error::PlatformNotSupported
        );
        assert_eq!(WalkerState::default().encode(gen9).unwrap_err(), Error::PlatformNotSupported);
    }

    #[test]
    fn test_pipe_mode_select_bits() {
        let cmd = PipeModeSelect {
            bit_depth: 10,
            random_access: true,
            ..PipeModeSelect::default()
        };
        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.dwords()[0], 0x7080_0004);
        assert_eq!(rec.get(vdenc_pipe_mode_select::STANDARD_SELECT), Some(3));
        assert_eq!(rec.get(vdenc_pipe_mode_select::BIT_DEPTH), Some(2));
        assert_eq!(rec.get(vdenc_pipe_mode_select::CHROMA_TYPE), Some(1));
        assert_eq!(rec.get(vdenc_pipe_mode_select::RANDOM_ACCESS), Some(1));
    }

    #[test]
    fn test_tile_replay_gen12_only() {
        let cmd = PipeModeSelect {
            tile_replay: true,
            ..PipeModeSelect::default()
        };
        assert_eq!(
            cmd.encode(gen(Generation::Gen11)).unwrap_err(),
            Error::PlatformNotSupported
        );
        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(vdenc_pipe_mode_select::TILE_REPLAY), Some(1));
    }

    #[test]
    fn test_pipe_mode_select_rejects_422() {
        let cmd = PipeModeSelect {
            chroma_format: ChromaFormat::Yuv422,
            ..PipeModeSelect::default()
        };
        assert_eq!(cmd.encode(gen(Generation::Gen12)).unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn test_surface_formats() {
        let surface = Surface::planar(PixelFormat::P010, 1920, 1080, 3840);
        let src = SrcSurfaceState(surface).encode(gen(Generation::Gen12)).unwrap();
        let reference = RefSurfaceState(surface).encode(gen(Generation::Gen12)).unwrap();

        assert_eq!(src.get(vdenc_surface_state::SURFACE_FORMAT), Some(8));
        assert_eq!(reference.get(vdenc_surface_state::SURFACE_FORMAT), Some(12));
        assert_eq!(src.get(vdenc_surface_state::WIDTH_MINUS1), Some(1919));
        assert_eq!(src.get(vdenc_surface_state::HEIGHT_MINUS1), Some(1079));
        assert_eq!(src.get(vdenc_surface_state::PITCH_MINUS1), Some(3839 & 0x1FFFF));
        assert_eq!(src.get(vdenc_surface_state::Y_OFFSET_FOR_U), Some(1080));

        let y210 = Surface::planar(PixelFormat::Y210, 1920, 1080, 7680);
        assert_eq!(
            SrcSurfaceState(y210).encode(gen(Generation::Gen12)).unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn test_pipe_buf_addr_rowstore() {
        let mut cmd = PipeBufAddr {
            mocs: 2,
            ..PipeBufAddr::default()
        };
        cmd.set(VdencSlot::RowStoreScratch, BufferAddress::Rowstore(0x80));
        cmd.set_memory(VdencSlot::OriginalSource, GpuAddr::new(0x4000));

        let rec = cmd.encode(gen(Generation::Gen11)).unwrap();
        let dw = rec.dwords();
        assert_eq!(dw.len(), 71);
        assert_eq!(dw[10..13], [0x4000, 0, 2 << 1]);
        assert_eq!(dw[16..19], [0x80 << 6, 0, (2 << 1) | (1 << 12)]);
        assert_eq!(dw[22], 0);
    }

    #[test]
    fn test_walker_offsets() {
        let cmd = WalkerState {
            start: CtbPosition { x: 3, y: 2 },
            next: CtbPosition { x: 0, y: 5 },
            first_super_slice: true,
            tile_number: 4,
            tile_width_minus1: 1023,
            tile_height_minus1: 511,
            streamin_offset: Some(0x10),
            ..WalkerState::default()
        };
        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        let dw = rec.dwords();
        assert_eq!(dw[1], 2 | (3 << 16) | (1 << 28));
        assert_eq!(dw[2], 5);
        assert_eq!(dw[3], 4 << 24);
        assert_eq!(dw[5], 1023 | (511 << 16));
        assert_eq!(dw[6], 1 | (0x10 << 6));
        assert_eq!(dw[7], 0);
    }

    #[test]
    fn test_weights_from_slice() {
        let pic = PictureParams {
            weighted_pred: true,
            ..PictureParams::default()
        };
        let mut slice = SliceParams {
            slice_type: SliceType::P,
            luma_log2_weight_denom: 6,
            num_ref_idx_l0_active_minus1: 1,
            ..SliceParams::default()
        };
        slice.weights[0].luma_weight_delta[0] = -4;
        slice.weights[0].luma_offset[1] = -20;

        let state = WeightsOffsetsState::for_slice(&pic, &slice, 2);
        assert_eq!(state.fwd_weight, [60, 64, 1]);
        assert_eq!(state.fwd_offset, [0, -5, 0]);
        assert_eq!(state.bwd_weight, 1);

        let rec = state.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.dwords()[1], 60 | (64 << 16) | (0xFB << 24));

        let unweighted = WeightsOffsetsState::for_slice(&PictureParams::default(), &slice, 0);
        assert_eq!(unweighted, WeightsOffsetsState::default());
    }

    #[test]
    fn test_control_state() {
        let rec = ControlState { initialize: true }.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.dwords(), [0x708B_0000, 2]);
    }
}
