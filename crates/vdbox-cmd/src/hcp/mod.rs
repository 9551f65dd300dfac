//! # HCP Commands
//!
//! State commands of the HEVC codec pipe. Each parameter block is filled
//! generically, then the active generation's override patches the bits that
//! moved or appeared on that generation.
//!
//! ```text
//!  per frame                         per tile          per slice
//!  ┌──────────────────────────┐     ┌─────────────┐   ┌──────────────────┐
//!  │ PIPE_MODE_SELECT         │     │ TILE_CODING │   │ REF_IDX_STATE    │
//!  │ SURFACE_STATE x3         │────►│             │──►│ WEIGHTOFFSET     │
//!  │ PIPE_BUF_ADDR_STATE      │     └─────────────┘   │ SLICE_STATE      │
//!  │ IND_OBJ_BASE_ADDR_STATE  │                       │ PAK_INSERT_OBJECT│
//!  │ QM / FQM                 │                       └──────────────────┘
//!  │ PIC_STATE                │
//!  └──────────────────────────┘
//! ```

pub mod insert;
pub mod qm;

use arrayvec::ArrayVec;

use vdbox_core::{
    ChromaFormat, Error, GpuAddr, PictureParams, Result, SequenceParams, SliceParams, SliceType,
    Standard, WeightTable, MAX_REFS_PER_LIST,
};

use crate::command_fields;
use crate::encoder::EncodeCommand;
use crate::generation::{CommandId, GenerationDescriptor};
use crate::record::{CommandRecord, Field};

// =============================================================================
// FIELD LAYOUTS
// =============================================================================

command_fields! {
    /// HCP_PIPE_MODE_SELECT
    HcpPipeModeSelect {
        codec_select = 1 [0:0],
        deblocker_streamout = 1 [1:1],
        pak_pipeline_streamout = 1 [2:2],
        pic_status_error_report = 1 [3:3],
        codec_standard_select = 1 [7:5],
        advanced_rate_control = 1 [9:9],
        vdenc_mode = 1 [10:10],
        rdoq = 1 [11:11],
        pak_frame_level_streamout = 1 [12:12],
        multi_engine_mode = 1 [14:13],
        pipe_working_mode = 1 [16:15],
        tile_based_engine = 1 [17:17],
    }
}

command_fields! {
    /// HCP_SURFACE_STATE
    HcpSurfaceState {
        pitch_minus1 = 1 [16:0],
        surface_id = 1 [31:28],
        y_offset_for_u = 2 [14:0],
        surface_format = 2 [31:27],
        y_offset_for_v = 3 [31:16],
    }
}

command_fields! {
    /// HCP_PIC_STATE
    HcpPicState {
        width_in_min_cb_minus1 = 1 [10:0],
        transform_skip = 1 [15:15],
        height_in_min_cb_minus1 = 1 [26:16],
        min_cu_size = 2 [1:0],
        ctb_size = 2 [3:2],
        min_tu_size = 2 [5:4],
        max_tu_size = 2 [7:6],
        chroma_subsampling = 2 [31:29],
        sao_enabled = 4 [3:3],
        pcm_enabled = 4 [4:4],
        cu_qp_delta_enabled = 4 [5:5],
        diff_cu_qp_delta_depth = 4 [7:6],
        constrained_intra_pred = 4 [9:9],
        sign_data_hiding = 4 [13:13],
        loop_filter_across_tiles = 4 [15:15],
        tiles_enabled = 4 [17:17],
        weighted_bipred = 4 [18:18],
        weighted_pred = 4 [19:19],
        transform_skip_enabled = 4 [22:22],
        amp_enabled = 4 [23:23],
        strong_intra_smoothing = 4 [26:26],
        cb_qp_offset = 5 [4:0],
        cr_qp_offset = 5 [9:5],
        max_transform_hierarchy_depth_intra = 5 [12:10],
        max_transform_hierarchy_depth_inter = 5 [15:13],
        bit_depth_chroma_minus8 = 5 [26:24],
        bit_depth_luma_minus8 = 5 [29:27],
        lcu_max_bitsize_allowed = 6 [15:0],
        non_first_pass = 6 [16:16],
        lcu_max_size_report_mask = 6 [24:24],
        frame_bitrate_max_report_mask = 6 [25:25],
        frame_bitrate_min_report_mask = 6 [26:26],
        rho_domain_rate_control = 19 [6:6],
        frame_qp = 19 [13:8],
        pak_dynamic_slice_mode = 19 [14:14],
        first_slice_segment_in_pic = 19 [16:16],
        nal_unit_type_flag = 19 [17:17],
        slice_pic_parameter_set_id = 19 [23:18],
        sse_enable = 19 [24:24],
        rdoq_enable = 19 [25:25],
        temporal_mvp_disable = 19 [31:31],
        intra_tu_count_based_rdoq_disable = 20 [6:6],
        slice_size_threshold = 21 [31:0],
        target_slice_size = 22 [31:0],
        rdoq_intra_tu_threshold = 37 [15:0],
        rdoq_tu_threshold_16x16 = 38 [15:0],
        rdoq_tu_threshold_32x32 = 38 [31:16],
    }
}

command_fields! {
    /// HCP_SLICE_STATE
    HcpSliceState {
        start_ctb_x = 1 [9:0],
        start_ctb_y = 1 [25:16],
        next_ctb_x = 2 [9:0],
        next_ctb_y = 2 [26:16],
        slice_type = 3 [1:0],
        last_slice_of_pic = 3 [2:2],
        slice_qp_sign = 3 [3:3],
        temporal_mvp = 3 [5:5],
        slice_qp = 3 [11:6],
        cb_qp_offset = 3 [16:12],
        cr_qp_offset = 3 [21:17],
        last_slice_of_tile = 3 [24:24],
        last_slice_of_tile_column = 3 [25:25],
        deblocking_disabled = 4 [0:0],
        tc_offset_div2 = 4 [4:1],
        beta_offset_div2 = 4 [8:5],
        loop_filter_across_slices = 4 [10:10],
        sao_chroma = 4 [11:11],
        sao_luma = 4 [12:12],
        mvd_l1_zero = 4 [13:13],
        is_low_delay = 4 [14:14],
        collocated_from_l0 = 4 [15:15],
        chroma_log2_weight_denom = 4 [18:16],
        luma_log2_weight_denom = 4 [21:19],
        cabac_init = 4 [22:22],
        max_merge_idx = 4 [25:23],
        collocated_ref_idx = 4 [28:26],
        header_length = 5 [15:0],
        round_intra = 6 [23:20],
        round_inter = 6 [29:26],
        cabac_zero_word_insertion = 7 [1:1],
        emulation_byte_insertion = 7 [2:2],
        tail_insertion = 7 [8:8],
        slice_data = 7 [9:9],
        header_insertion = 7 [10:10],
        indirect_pak_bse_offset = 8 [28:6],
        transform_skip_lambda = 9 [15:0],
        original_start_ctb_x = 11 [9:0],
        original_start_ctb_y = 11 [25:16],
    }
}

command_fields! {
    /// HCP_REF_IDX_STATE
    HcpRefIdxState {
        list = 1 [0:0],
        num_active_minus1 = 1 [4:1],
        tb = 2 [7:0],
        frame_id = 2 [10:8],
        chroma_weight = 2 [11:11],
        luma_weight = 2 [12:12],
        long_term = 2 [13:13],
    }
}

command_fields! {
    /// HCP_WEIGHTOFFSET_STATE
    HcpWeightOffsetState {
        list = 1 [0:0],
        luma_weight_delta = 2 [7:0],
        luma_offset = 2 [15:8],
        luma_offset_msb = 2 [31:24],
        chroma_weight0 = 18 [7:0],
        chroma_offset0 = 18 [15:8],
        chroma_weight1 = 18 [23:16],
        chroma_offset1 = 18 [31:24],
        chroma_offset_msb = 34 [31:0],
    }
}

command_fields! {
    /// HCP_TILE_CODING
    HcpTileCoding {
        active_be_pipes = 1 [7:0],
        row_store_select = 1 [8:8],
        column_store_select = 1 [9:9],
        num_tile_columns = 1 [31:16],
        column_position = 2 [9:0],
        non_first_pass_tile = 2 [10:10],
        row_position = 2 [25:16],
        is_last_in_row = 2 [30:30],
        is_last_in_column = 2 [31:31],
        height_in_min_cb_minus1 = 3 [10:0],
        width_in_min_cb_minus1 = 3 [26:16],
        bitstream_offset_enable = 4 [0:0],
        bitstream_offset = 4 [31:6],
        pak_frame_statistics_offset = 5 [31:6],
        cu_level_streamout_offset = 6 [31:6],
        slice_size_streamout_offset = 7 [31:6],
        cu_record_offset = 8 [31:6],
        sse_rowstore_offset = 9 [31:6],
        sao_rowstore_offset = 10 [31:6],
        tile_size_streamout_offset = 11 [31:6],
        vp9_probability_counter_offset = 12 [31:6],
        tile_number = 17 [13:8],
    }
}

/// Memory-object attribute dword: cacheability control index
const MOCS: Field = Field::bits(0, 1, 6);
/// Memory-object attribute dword: address points into the rowstore cache
const ROWSTORE_CACHE_SELECT: Field = Field::bits(0, 12, 12);

fn set_attributes(rec: &mut CommandRecord, dword: usize, mocs: u8, rowstore: bool) -> Result<()> {
    let attr = MOCS.encode(mocs as u32) | ROWSTORE_CACHE_SELECT.encode(rowstore as u32);
    rec.set_dword(dword, attr)
}

// =============================================================================
// PIPE MODE SELECT
// =============================================================================

/// Engine role when several VDBOXes share a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MultiEngineMode {
    /// One engine encodes the whole frame
    #[default]
    Single = 0,
    /// Leftmost pipe
    Left = 1,
    /// Rightmost pipe
    Right = 2,
    /// Any pipe in between
    Middle = 3,
}

/// HCP_PIPE_MODE_SELECT
#[derive(Debug, Clone, Copy)]
pub struct PipeModeSelect {
    /// Codec standard
    pub standard: Standard,
    /// Driven by the VDEnc front end
    pub vdenc: bool,
    /// Bitrate control adjusts PAK passes
    pub advanced_rate_control: bool,
    /// PAK object streamout
    pub pak_streamout: bool,
    /// Frame-level PAK statistics streamout
    pub frame_statistics_streamout: bool,
    /// Rate-distortion optimized quantization
    pub rdoq: bool,
    /// Engine role under scalability
    pub multi_engine_mode: MultiEngineMode,
    /// Scalable (tile-parallel) pipe working mode
    pub scalable: bool,
    /// Tile-based replay
    pub tile_based_replay: bool,
}

impl Default for PipeModeSelect {
    fn default() -> Self {
        Self {
            standard: Standard::Hevc,
            vdenc: true,
            advanced_rate_control: false,
            pak_streamout: false,
            frame_statistics_streamout: true,
            rdoq: false,
            multi_engine_mode: MultiEngineMode::Single,
            scalable: false,
            tile_based_replay: false,
        }
    }
}

impl EncodeCommand for PipeModeSelect {
    const ID: CommandId = CommandId::HcpPipeModeSelect;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        let standard = match self.standard {
            Standard::Hevc => 0,
            Standard::Vp9 => 1,
        };
        // codec select 1 = encode
        rec.set(hcp_pipe_mode_select::CODEC_SELECT, 1)?;
        rec.set_bool(hcp_pipe_mode_select::PAK_PIPELINE_STREAMOUT, self.pak_streamout)?;
        rec.set_bool(hcp_pipe_mode_select::PIC_STATUS_ERROR_REPORT, false)?;
        rec.set(hcp_pipe_mode_select::CODEC_STANDARD_SELECT, standard)?;
        rec.set_bool(hcp_pipe_mode_select::ADVANCED_RATE_CONTROL, self.advanced_rate_control)?;
        rec.set_bool(hcp_pipe_mode_select::VDENC_MODE, self.vdenc)?;
        rec.set_bool(hcp_pipe_mode_select::PAK_FRAME_LEVEL_STREAMOUT, self.frame_statistics_streamout)?;
        (gen.overrides.pipe_mode_select)(self, rec)
    }
}

/// Gen11: RDOQ enable
pub fn gen11_pipe_mode_select(params: &PipeModeSelect, rec: &mut CommandRecord) -> Result<()> {
    rec.set_bool(hcp_pipe_mode_select::RDOQ, params.rdoq)
}

/// Gen12: RDOQ plus the scalability controls
pub fn gen12_pipe_mode_select(params: &PipeModeSelect, rec: &mut CommandRecord) -> Result<()> {
    gen11_pipe_mode_select(params, rec)?;
    rec.set(hcp_pipe_mode_select::MULTI_ENGINE_MODE, params.multi_engine_mode as u32)?;
    rec.set_bool(hcp_pipe_mode_select::PIPE_WORKING_MODE, params.scalable)?;
    rec.set_bool(hcp_pipe_mode_select::TILE_BASED_ENGINE, params.tile_based_replay)
}

// =============================================================================
// SURFACE STATE
// =============================================================================

/// Which picture a surface state describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SurfaceId {
    /// Reconstructed picture
    Recon = 0,
    /// Source picture
    Source = 1,
    /// Reference pictures
    Reference = 2,
}

/// Memory layout of a YUV surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 8-bit 4:2:0, interleaved chroma
    #[default]
    Nv12,
    /// 10-bit 4:2:0 in 16-bit containers
    P010,
    /// 8-bit packed 4:2:2
    Yuy2,
    /// 10-bit packed 4:2:2
    Y210,
    /// 8-bit packed 4:4:4
    Ayuv,
    /// 10-bit packed 4:4:4
    Y410,
}

impl PixelFormat {
    /// Samples stored in 16-bit containers
    pub const fn is_10bit(self) -> bool {
        matches!(self, Self::P010 | Self::Y210 | Self::Y410)
    }
}

/// HCP surface-format codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum SurfaceFormat {
    Yuy2 = 0,
    Ayuv = 2,
    P010Variant = 3,
    Planar4208 = 4,
    Y216Y210 = 8,
    Y410 = 10,
    Y416 = 12,
    P010 = 13,
    Y216Variant = 17,
    Y416Variant = 18,
    Yuy2Variant = 19,
    Ayuv4444Variant = 20,
}

impl SurfaceFormat {
    /// Decode a surface-format code
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Yuy2,
            2 => Self::Ayuv,
            3 => Self::P010Variant,
            4 => Self::Planar4208,
            8 => Self::Y216Y210,
            10 => Self::Y410,
            12 => Self::Y416,
            13 => Self::P010,
            17 => Self::Y216Variant,
            18 => Self::Y416Variant,
            19 => Self::Yuy2Variant,
            20 => Self::Ayuv4444Variant,
            _ => return None,
        })
    }
}

impl From<PixelFormat> for SurfaceFormat {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Nv12 => Self::Planar4208,
            PixelFormat::P010 => Self::P010,
            PixelFormat::Yuy2 => Self::Yuy2,
            PixelFormat::Y210 => Self::Y216Y210,
            PixelFormat::Ayuv => Self::Ayuv,
            PixelFormat::Y410 => Self::Y410,
        }
    }
}

/// HCP_SURFACE_STATE
#[derive(Debug, Clone, Copy)]
pub struct SurfaceState {
    /// Picture described
    pub id: SurfaceId,
    /// Pixel format of the allocation
    pub format: PixelFormat,
    /// Row pitch in bytes
    pub pitch: u32,
    /// Height in rows
    pub height: u32,
    /// Row offset of the U (or UV) plane
    pub u_offset: u32,
    /// Row offset of the V plane
    pub v_offset: u32,
    /// Chroma format of the sequence
    pub chroma_format: ChromaFormat,
    /// Luma bit depth minus eight of the sequence
    pub bit_depth_luma_minus8: u8,
}

impl SurfaceState {
    /// Surface state for a planar picture of `height` rows
    pub fn planar(id: SurfaceId, format: PixelFormat, pitch: u32, height: u32, seq: &SequenceParams) -> Self {
        Self {
            id,
            format,
            pitch,
            height,
            u_offset: height,
            v_offset: height,
            chroma_format: seq.chroma_format,
            bit_depth_luma_minus8: seq.bit_depth_luma_minus8,
        }
    }
}

impl EncodeCommand for SurfaceState {
    const ID: CommandId = CommandId::HcpSurfaceState;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        if self.pitch == 0 {
            return Err(Error::InvalidParameter);
        }
        rec.set(hcp_surface_state::PITCH_MINUS1, self.pitch - 1)?;
        rec.set(hcp_surface_state::SURFACE_ID, self.id as u32)?;
        rec.set(hcp_surface_state::Y_OFFSET_FOR_U, self.u_offset)?;
        rec.set(hcp_surface_state::SURFACE_FORMAT, SurfaceFormat::from(self.format) as u32)?;
        rec.set(hcp_surface_state::Y_OFFSET_FOR_V, self.v_offset)?;
        (gen.overrides.surface_state)(self, rec)
    }
}

/// Gen11+: format from the sequence chroma format and bit depth
///
/// Recon and reference surfaces use the "variant" layouts for 4:2:2 and
/// 4:4:4, whose chroma planes sit at fixed multiples of the picture height.
pub fn gen11_surface_state(params: &SurfaceState, rec: &mut CommandRecord) -> Result<()> {
    use SurfaceFormat as F;

    let source = params.id == SurfaceId::Source;
    let high_bit_depth = params.bit_depth_luma_minus8 > 0;
    let surf_10bit = params.format.is_10bit();

    let format = match params.chroma_format {
        ChromaFormat::Yuv422 => match (high_bit_depth, source) {
            (true, true) if surf_10bit => F::Y216Y210,
            (true, true) => F::Yuy2,
            (true, false) => F::Y216Variant,
            (false, true) => F::Yuy2,
            (false, false) => F::Yuy2Variant,
        },
        ChromaFormat::Yuv444 => match (params.bit_depth_luma_minus8, source) {
            (0, true) => F::Ayuv,
            (0, false) => F::Ayuv4444Variant,
            (1..=2, true) if surf_10bit => F::Y410,
            (1..=2, true) => F::Ayuv,
            (1..=2, false) => F::Y416Variant,
            _ => F::Y416,
        },
        ChromaFormat::Yuv420 | ChromaFormat::Monochrome => match (high_bit_depth, source) {
            (true, true) if surf_10bit => F::P010,
            (true, true) => F::Planar4208,
            (true, false) => F::P010Variant,
            (false, _) => F::Planar4208,
        },
    };

    let (u, v) = match format {
        F::Y416Variant | F::Ayuv4444Variant => (params.height, params.height * 2),
        F::Y216Variant | F::Yuy2Variant => (params.height, params.height),
        _ => (params.u_offset, params.u_offset),
    };

    rec.set(hcp_surface_state::SURFACE_FORMAT, format as u32)?;
    rec.set(hcp_surface_state::Y_OFFSET_FOR_U, u)?;
    rec.set(hcp_surface_state::Y_OFFSET_FOR_V, v)
}

// =============================================================================
// PIPE BUFFER ADDRESSES
// =============================================================================

/// Where a buffer slot points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAddress {
    /// Graphics memory
    Memory(GpuAddr),
    /// Offset into the on-chip rowstore cache
    Rowstore(u32),
}

/// Fixed slots of HCP_PIPE_BUF_ADDR_STATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BufferSlot {
    DecodedPicture,
    DeblockLine,
    DeblockTileLine,
    DeblockTileColumn,
    MetadataLine,
    MetadataTileLine,
    MetadataTileColumn,
    SaoLine,
    SaoTileLine,
    SaoTileColumn,
    CurrentMvTemporal,
    OriginalSource,
    Streamout,
    SliceSizeStreamout,
    LcuIldbStreamout,
    Vp9Probability,
    Vp9SegmentId,
    Vp9HvdLine,
    Vp9HvdTile,
    SaoRowstore,
    FrameStatistics,
    SseSourcePixel,
    ScalabilitySliceState,
    CabacStreamout,
    MvUpRightColumn,
    IntraPredUpRightColumn,
    IntraPredLeftReconColumn,
}

impl BufferSlot {
    /// Number of slots
    pub const COUNT: usize = 27;

    /// First dword of the slot's address; its attribute dword follows it
    pub const fn dword(self) -> usize {
        match self {
            Self::DecodedPicture => 1,
            Self::DeblockLine => 4,
            Self::DeblockTileLine => 7,
            Self::DeblockTileColumn => 10,
            Self::MetadataLine => 13,
            Self::MetadataTileLine => 16,
            Self::MetadataTileColumn => 19,
            Self::SaoLine => 22,
            Self::SaoTileLine => 25,
            Self::SaoTileColumn => 28,
            Self::CurrentMvTemporal => 31,
            Self::OriginalSource => 54,
            Self::Streamout => 57,
            Self::SliceSizeStreamout => 60,
            Self::LcuIldbStreamout => 63,
            Self::Vp9Probability => 83,
            Self::Vp9SegmentId => 86,
            Self::Vp9HvdLine => 89,
            Self::Vp9HvdTile => 92,
            Self::SaoRowstore => 95,
            Self::FrameStatistics => 98,
            Self::SseSourcePixel => 101,
            Self::ScalabilitySliceState => 104,
            Self::CabacStreamout => 107,
            Self::MvUpRightColumn => 110,
            Self::IntraPredUpRightColumn => 113,
            Self::IntraPredLeftReconColumn => 116,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

const REFERENCE_BASE: usize = 37;
const REFERENCE_ATTR: usize = 53;
const COLLOCATED_MV_BASE: usize = 66;
const COLLOCATED_MV_ATTR: usize = 82;

/// Reference and collocated-MV entries per list
pub const MAX_PIPE_REFERENCES: usize = 8;

/// HCP_PIPE_BUF_ADDR_STATE
#[derive(Debug, Clone, Default)]
pub struct PipeBufAddr {
    slots: [Option<BufferAddress>; BufferSlot::COUNT],
    /// Reference pictures
    pub references: [Option<GpuAddr>; MAX_PIPE_REFERENCES],
    /// Collocated motion-vector buffers of the references
    pub collocated_mv: [Option<GpuAddr>; MAX_PIPE_REFERENCES],
    /// Cacheability index written to every attribute dword in use
    pub mocs: u8,
}

impl PipeBufAddr {
    /// Point `slot` at `addr`
    pub fn set(&mut self, slot: BufferSlot, addr: BufferAddress) {
        self.slots[slot.index()] = Some(addr);
    }

    /// Current address of `slot`
    pub fn get(&self, slot: BufferSlot) -> Option<BufferAddress> {
        self.slots[slot.index()]
    }

    /// Point `slot` at graphics memory
    pub fn set_memory(&mut self, slot: BufferSlot, addr: GpuAddr) {
        self.set(slot, BufferAddress::Memory(addr));
    }
}

impl EncodeCommand for PipeBufAddr {
    const ID: CommandId = CommandId::HcpPipeBufAddrState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        const SLOTS: [BufferSlot; BufferSlot::COUNT] = [
            BufferSlot::DecodedPicture,
            BufferSlot::DeblockLine,
            BufferSlot::DeblockTileLine,
            BufferSlot::DeblockTileColumn,
            BufferSlot::MetadataLine,
            BufferSlot::MetadataTileLine,
            BufferSlot::MetadataTileColumn,
            BufferSlot::SaoLine,
            BufferSlot::SaoTileLine,
            BufferSlot::SaoTileColumn,
            BufferSlot::CurrentMvTemporal,
            BufferSlot::OriginalSource,
            BufferSlot::Streamout,
            BufferSlot::SliceSizeStreamout,
            BufferSlot::LcuIldbStreamout,
            BufferSlot::Vp9Probability,
            BufferSlot::Vp9SegmentId,
            BufferSlot::Vp9HvdLine,
            BufferSlot::Vp9HvdTile,
            BufferSlot::SaoRowstore,
            BufferSlot::FrameStatistics,
            BufferSlot::SseSourcePixel,
            BufferSlot::ScalabilitySliceState,
            BufferSlot::CabacStreamout,
            BufferSlot::MvUpRightColumn,
            BufferSlot::IntraPredUpRightColumn,
            BufferSlot::IntraPredLeftReconColumn,
        ];

        for slot in SLOTS {
            let dw = slot.dword();
            match self.get(slot) {
                Some(BufferAddress::Memory(addr)) if !addr.is_null() => {
                    rec.set_address(dw, addr)?;
                    set_attributes(rec, dw + 2, self.mocs, false)?;
                }
                Some(BufferAddress::Rowstore(offset)) => {
                    rec.set_dword(dw, offset << 6)?;
                    set_attributes(rec, dw + 2, self.mocs, true)?;
                }
                _ => {}
            }
        }

        let mut any_ref = false;
        for (i, addr) in self.references.iter().enumerate() {
            if let Some(addr) = addr {
                rec.set_address(REFERENCE_BASE + 2 * i, *addr)?;
                any_ref = true;
            }
        }
        if any_ref {
            set_attributes(rec, REFERENCE_ATTR, self.mocs, false)?;
        }

        let mut any_mv = false;
        for (i, addr) in self.collocated_mv.iter().enumerate() {
            if let Some(addr) = addr {
                rec.set_address(COLLOCATED_MV_BASE + 2 * i, *addr)?;
                any_mv = true;
            }
        }
        if any_mv {
            set_attributes(rec, COLLOCATED_MV_ATTR, self.mocs, false)?;
        }
        Ok(())
    }
}

// =============================================================================
// INDIRECT OBJECT BASE ADDRESSES
// =============================================================================

/// HCP_IND_OBJ_BASE_ADDR_STATE
#[derive(Debug, Clone, Copy, Default)]
pub struct IndObjBaseAddr {
    /// Output bitstream
    pub bitstream: GpuAddr,
    /// Bytes available to the bitstream
    pub bitstream_size: u32,
    /// CU records from the VDEnc front end
    pub cu_object: GpuAddr,
    /// PAK BSE (bitstream encoder) object
    pub pak_bse: GpuAddr,
    /// Bytes available to the PAK BSE object
    pub pak_bse_size: u32,
    /// VP9 compressed header
    pub vp9_compressed_header: GpuAddr,
    /// VP9 probability counters
    pub vp9_prob_counter: GpuAddr,
    /// VP9 probability deltas
    pub vp9_prob_deltas: GpuAddr,
    /// Per-tile record streamout
    pub tile_record: GpuAddr,
    /// CU statistics streamout
    pub cu_stats: GpuAddr,
    /// Cacheability index
    pub mocs: u8,
}

impl IndObjBaseAddr {
    fn set_region(&self, rec: &mut CommandRecord, dw: usize, addr: GpuAddr) -> Result<()> {
        if addr.is_null() {
            return Ok(());
        }
        rec.set_address(dw, addr)?;
        set_attributes(rec, dw + 2, self.mocs, false)
    }
}

impl EncodeCommand for IndObjBaseAddr {
    const ID: CommandId = CommandId::HcpIndObjBaseAddrState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        self.set_region(rec, 1, self.bitstream)?;
        if !self.bitstream.is_null() {
            rec.set_address(4, self.bitstream.offset(self.bitstream_size as u64))?;
        }
        self.set_region(rec, 6, self.cu_object)?;
        self.set_region(rec, 9, self.pak_bse)?;
        if !self.pak_bse.is_null() {
            rec.set_address(12, self.pak_bse.offset(self.pak_bse_size as u64))?;
        }
        self.set_region(rec, 14, self.vp9_compressed_header)?;
        self.set_region(rec, 17, self.vp9_prob_counter)?;
        self.set_region(rec, 20, self.vp9_prob_deltas)?;
        self.set_region(rec, 23, self.tile_record)?;
        self.set_region(rec, 26, self.cu_stats)
    }
}

// =============================================================================
// PICTURE STATE
// =============================================================================

/// Upper bound on the bits one CTB may produce
///
/// A request of zero, or above the raw CTB size times 5/3, is replaced by
/// that bound.
pub fn lcu_max_bitsize(seq: &SequenceParams, requested: u32) -> u32 {
    let samples = 1u32 << (2 * seq.log2_lcu() as u32);
    let with_chroma = match seq.chroma_format {
        ChromaFormat::Yuv420 => samples * 3 / 2,
        ChromaFormat::Yuv422 => samples * 2,
        ChromaFormat::Yuv444 => samples * 3,
        ChromaFormat::Monochrome => samples,
    };
    let raw = 5 * (with_chroma * (seq.bit_depth_luma_minus8 as u32 + 8)) / 3;
    if requested == 0 || requested > raw { raw } else { requested }
}

/// Intra TU count above which RDOQ is skipped
///
/// `percent` of the 16x16 blocks of the frame, split across `pipes` when
/// the frame is encoded tile-parallel.
pub fn rdoq_intra_tu_threshold(width: u32, height: u32, percent: u32, pipes: u32) -> u16 {
    let mut threshold = ((width as u64 * height as u64 * percent as u64) / 100) >> 8;
    if pipes > 1 {
        threshold /= pipes as u64;
    }
    threshold.min(u16::MAX as u64) as u16
}

/// HCP_PIC_STATE
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct PicState {
    pub width_in_min_cb_minus1: u16,
    pub height_in_min_cb_minus1: u16,
    pub log2_min_cb_minus3: u8,
    pub log2_ctb_minus3: u8,
    pub log2_min_tu_minus2: u8,
    pub log2_max_tu_minus2: u8,
    pub chroma_format: ChromaFormat,
    pub sao_enabled: bool,
    pub cu_qp_delta_enabled: bool,
    pub diff_cu_qp_delta_depth: u8,
    pub sign_data_hiding: bool,
    pub loop_filter_across_tiles: bool,
    pub tiles_enabled: bool,
    pub weighted_pred: bool,
    pub weighted_bipred: bool,
    pub transform_skip_enabled: bool,
    pub amp_enabled: bool,
    pub strong_intra_smoothing: bool,
    pub cb_qp_offset: i8,
    pub cr_qp_offset: i8,
    pub max_transform_hierarchy_depth_intra: u8,
    pub max_transform_hierarchy_depth_inter: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub lcu_max_bitsize: u32,
    /// Second and later PAK passes of a BRC frame
    pub non_first_pass: bool,
    /// Report frames over / under the BRC size bounds
    pub frame_size_reports: bool,
    pub frame_qp: u8,
    pub rho_domain_rate_control: bool,
    /// Dynamic slice sizing target in bytes, `None` when disabled
    pub slice_size_control: Option<u32>,
    pub sse_enable: bool,
    pub rdoq_enable: bool,
    pub temporal_mvp_enabled: bool,
    pub rdoq_intra_tu_threshold: u16,
    pub rdoq_tu_threshold_16x16: u16,
    pub rdoq_tu_threshold_32x32: u16,
}

impl PicState {
    /// Derive the picture state of one frame
    pub fn new(seq: &SequenceParams, pic: &PictureParams) -> Result<Self> {
        let lcu = seq.lcu_size()?;
        let slice_size_control = match (seq.slice_size_control, pic.max_slice_size_bytes) {
            (true, 0) => return Err(Error::InvalidParameter),
            (true, bytes) => Some(bytes),
            (false, _) => None,
        };

        Ok(Self {
            width_in_min_cb_minus1: seq.frame_width_in_min_cb_minus1,
            height_in_min_cb_minus1: seq.frame_height_in_min_cb_minus1,
            log2_min_cb_minus3: seq.log2_min_coding_block_size_minus3,
            log2_ctb_minus3: lcu.log2() - 3,
            log2_min_tu_minus2: 0,
            // 32x32 transforms
            log2_max_tu_minus2: 3,
            chroma_format: seq.chroma_format,
            sao_enabled: seq.sao_enabled,
            cu_qp_delta_enabled: pic.cu_qp_delta_enabled,
            diff_cu_qp_delta_depth: pic.diff_cu_qp_delta_depth,
            sign_data_hiding: pic.sign_data_hiding,
            loop_filter_across_tiles: pic.loop_filter_across_tiles,
            tiles_enabled: pic.tiles_enabled,
            weighted_pred: pic.weighted_pred,
            weighted_bipred: pic.weighted_bipred,
            transform_skip_enabled: pic.transform_skip_enabled,
            amp_enabled: true,
            strong_intra_smoothing: false,
            cb_qp_offset: pic.cb_qp_offset,
            cr_qp_offset: pic.cr_qp_offset,
            max_transform_hierarchy_depth_intra: 0,
            max_transform_hierarchy_depth_inter: 0,
            bit_depth_luma_minus8: seq.bit_depth_luma_minus8,
            bit_depth_chroma_minus8: seq.bit_depth_chroma_minus8,
            lcu_max_bitsize: lcu_max_bitsize(seq, pic.lcu_max_bitsize_allowed),
            non_first_pass: false,
            frame_size_reports: seq.rate_control.is_brc(),
            frame_qp: pic.qp_y.max(0) as u8,
            rho_domain_rate_control: false,
            slice_size_control,
            sse_enable: true,
            rdoq_enable: false,
            temporal_mvp_enabled: seq.temporal_mvp_enabled,
            rdoq_intra_tu_threshold: 0,
            rdoq_tu_threshold_16x16: 0,
            rdoq_tu_threshold_32x32: 0,
        })
    }
}

impl EncodeCommand for PicState {
    const ID: CommandId = CommandId::HcpPicState;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_pic_state as f;

        rec.set(f::WIDTH_IN_MIN_CB_MINUS1, self.width_in_min_cb_minus1 as u32)?;
        rec.set_bool(f::TRANSFORM_SKIP, self.transform_skip_enabled)?;
        rec.set(f::HEIGHT_IN_MIN_CB_MINUS1, self.height_in_min_cb_minus1 as u32)?;

        rec.set(f::MIN_CU_SIZE, self.log2_min_cb_minus3 as u32)?;
        rec.set(f::CTB_SIZE, self.log2_ctb_minus3 as u32)?;
        rec.set(f::MIN_TU_SIZE, self.log2_min_tu_minus2 as u32)?;
        rec.set(f::MAX_TU_SIZE, self.log2_max_tu_minus2 as u32)?;
        rec.set(f::CHROMA_SUBSAMPLING, self.chroma_format.idc() as u32)?;

        rec.set_bool(f::SAO_ENABLED, self.sao_enabled)?;
        rec.set_bool(f::PCM_ENABLED, false)?;
        rec.set_bool(f::CU_QP_DELTA_ENABLED, self.cu_qp_delta_enabled)?;
        rec.set(f::DIFF_CU_QP_DELTA_DEPTH, self.diff_cu_qp_delta_depth as u32)?;
        rec.set_bool(f::CONSTRAINED_INTRA_PRED, false)?;
        rec.set_bool(f::SIGN_DATA_HIDING, self.sign_data_hiding)?;
        rec.set_bool(f::LOOP_FILTER_ACROSS_TILES, self.loop_filter_across_tiles)?;
        rec.set_bool(f::TILES_ENABLED, self.tiles_enabled)?;
        rec.set_bool(f::WEIGHTED_BIPRED, self.weighted_bipred)?;
        rec.set_bool(f::WEIGHTED_PRED, self.weighted_pred)?;
        rec.set_bool(f::TRANSFORM_SKIP_ENABLED, self.transform_skip_enabled)?;
        rec.set_bool(f::AMP_ENABLED, self.amp_enabled)?;
        rec.set_bool(f::STRONG_INTRA_SMOOTHING, self.strong_intra_smoothing)?;

        rec.set_signed(f::CB_QP_OFFSET, self.cb_qp_offset as i32)?;
        rec.set_signed(f::CR_QP_OFFSET, self.cr_qp_offset as i32)?;
        rec.set(f::MAX_TRANSFORM_HIERARCHY_DEPTH_INTRA, self.max_transform_hierarchy_depth_intra as u32)?;
        rec.set(f::MAX_TRANSFORM_HIERARCHY_DEPTH_INTER, self.max_transform_hierarchy_depth_inter as u32)?;
        rec.set(f::BIT_DEPTH_CHROMA_MINUS8, self.bit_depth_chroma_minus8 as u32)?;
        rec.set(f::BIT_DEPTH_LUMA_MINUS8, self.bit_depth_luma_minus8 as u32)?;

        rec.set(f::LCU_MAX_BITSIZE_ALLOWED, self.lcu_max_bitsize.min(u16::MAX as u32))?;
        rec.set_bool(f::NON_FIRST_PASS, self.non_first_pass)?;
        rec.set_bool(f::LCU_MAX_SIZE_REPORT_MASK, self.frame_size_reports)?;
        rec.set_bool(f::FRAME_BITRATE_MAX_REPORT_MASK, self.frame_size_reports)?;
        rec.set_bool(f::FRAME_BITRATE_MIN_REPORT_MASK, self.frame_size_reports)?;

        if self.rho_domain_rate_control {
            rec.set_bool(f::RHO_DOMAIN_RATE_CONTROL, true)?;
            rec.set(f::FRAME_QP, self.frame_qp as u32)?;
        }
        rec.set_bool(f::FIRST_SLICE_SEGMENT_IN_PIC, true)?;
        rec.set_bool(f::NAL_UNIT_TYPE_FLAG, true)?;
        rec.set_bool(f::SSE_ENABLE, self.sse_enable)?;
        rec.set_bool(f::RDOQ_ENABLE, self.rdoq_enable)?;
        rec.set_bool(f::TEMPORAL_MVP_DISABLE, !self.temporal_mvp_enabled)?;
        rec.set_bool(f::INTRA_TU_COUNT_BASED_RDOQ_DISABLE, self.rdoq_enable && self.rdoq_intra_tu_threshold > 0)?;

        if let Some(bytes) = self.slice_size_control {
            rec.set_bool(f::PAK_DYNAMIC_SLICE_MODE, true)?;
            rec.set(f::SLICE_SIZE_THRESHOLD, bytes)?;
            rec.set(f::TARGET_SLICE_SIZE, bytes)?;
        }

        (gen.overrides.pic_state)(self, rec)
    }
}

/// Gen12: RDOQ TU-count thresholds
pub fn gen12_pic_state(params: &PicState, rec: &mut CommandRecord) -> Result<()> {
    if !params.rdoq_enable {
        return Ok(());
    }
    rec.set(hcp_pic_state::RDOQ_INTRA_TU_THRESHOLD, params.rdoq_intra_tu_threshold as u32)?;
    rec.set(hcp_pic_state::RDOQ_TU_THRESHOLD_16X16, params.rdoq_tu_threshold_16x16 as u32)?;
    rec.set(hcp_pic_state::RDOQ_TU_THRESHOLD_32X32, params.rdoq_tu_threshold_32x32 as u32)
}

// =============================================================================
// SLICE STATE
// =============================================================================

/// CTB coordinates of a raster address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtbPosition {
    /// Column in CTBs
    pub x: u32,
    /// Row in CTBs
    pub y: u32,
}

impl CtbPosition {
    /// Position of raster address `address` in a picture `width_in_ctb` wide
    pub fn from_address(address: u32, width_in_ctb: u32) -> Result<Self> {
        if width_in_ctb == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            x: address % width_in_ctb,
            y: address / width_in_ctb,
        })
    }
}

/// HCP_SLICE_STATE
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct SliceState {
    pub start: CtbPosition,
    /// First CTB of the following slice, `(0, 0)` after the last one
    pub next: CtbPosition,
    /// Start of the slice before tile replay moved it
    pub original_start: CtbPosition,
    pub slice_type: SliceType,
    pub last_slice_of_pic: bool,
    pub last_slice_of_tile: bool,
    pub last_slice_of_tile_column: bool,
    pub slice_qp: i32,
    pub cb_qp_offset: i8,
    pub cr_qp_offset: i8,
    pub temporal_mvp: bool,
    pub deblocking_disabled: bool,
    pub tc_offset_div2: i8,
    pub beta_offset_div2: i8,
    pub loop_filter_across_slices: bool,
    pub sao_luma: bool,
    pub sao_chroma: bool,
    pub is_low_delay: bool,
    pub collocated_from_l0: bool,
    pub luma_log2_weight_denom: u8,
    pub chroma_log2_weight_denom: u8,
    pub cabac_init: bool,
    pub max_merge_idx: u8,
    pub collocated_ref_idx: u8,
    pub round_intra: u8,
    pub round_inter: u8,
    /// CABAC zero words are appended by the PAK (not under VDEnc)
    pub cabac_zero_word_insertion: bool,
    /// End-of-sequence / end-of-stream tail follows the slice data
    pub tail_insertion: bool,
    /// Bytes of headers inserted ahead of the slice data
    pub header_bytes_inserted: u32,
    pub transform_skip_lambda: u16,
}

impl SliceState {
    /// Slice state of `slice`, followed by `next` (or none for the last slice)
    pub fn new(
        seq: &SequenceParams,
        pic: &PictureParams,
        slice: &SliceParams,
        next: Option<&SliceParams>,
    ) -> Result<Self> {
        let lcu = seq.lcu_size()?;
        let width_in_ctb = seq.frame_size().width_in_lcu(lcu);
        let start = CtbPosition::from_address(slice.slice_segment_address, width_in_ctb)?;
        let next_pos = match next {
            Some(next) => CtbPosition::from_address(next.slice_segment_address, width_in_ctb)?,
            None => CtbPosition::default(),
        };
        let last = next.is_none();
        let weighted = pic.weighted_pred || pic.weighted_bipred;

        Ok(Self {
            start,
            next: next_pos,
            original_start: start,
            slice_type: slice.slice_type,
            last_slice_of_pic: last,
            last_slice_of_tile: last,
            last_slice_of_tile_column: last,
            slice_qp: pic.qp_y as i32 + slice.slice_qp_delta as i32,
            cb_qp_offset: slice.slice_cb_qp_offset,
            cr_qp_offset: slice.slice_cr_qp_offset,
            temporal_mvp: slice.slice_temporal_mvp_enable,
            deblocking_disabled: slice.deblocking_filter_disabled,
            tc_offset_div2: slice.tc_offset_div2,
            beta_offset_div2: slice.beta_offset_div2,
            loop_filter_across_slices: false,
            sao_luma: slice.sao_luma,
            sao_chroma: slice.sao_chroma,
            is_low_delay: seq.low_delay,
            collocated_from_l0: slice.collocated_from_l0,
            luma_log2_weight_denom: if weighted { slice.luma_log2_weight_denom } else { 0 },
            chroma_log2_weight_denom: if weighted { slice.chroma_log2_weight_denom } else { 0 },
            cabac_init: slice.cabac_init,
            max_merge_idx: slice.max_num_merge_cand.saturating_sub(1),
            collocated_ref_idx: 0,
            round_intra: 10,
            round_inter: 4,
            cabac_zero_word_insertion: false,
            tail_insertion: last && (pic.last_picture_in_sequence || pic.last_picture_in_stream),
            header_bytes_inserted: 0,
            transform_skip_lambda: 0,
        })
    }
}

impl EncodeCommand for SliceState {
    const ID: CommandId = CommandId::HcpSliceState;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_slice_state as f;

        rec.set(f::START_CTB_X, self.start.x)?;
        rec.set(f::START_CTB_Y, self.start.y)?;
        rec.set(f::NEXT_CTB_X, self.next.x)?;
        rec.set(f::NEXT_CTB_Y, self.next.y)?;

        rec.set(f::SLICE_TYPE, self.slice_type as u32)?;
        rec.set_bool(f::LAST_SLICE_OF_PIC, self.last_slice_of_pic)?;
        rec.set_bool(f::SLICE_QP_SIGN, self.slice_qp < 0)?;
        rec.set_bool(f::TEMPORAL_MVP, self.temporal_mvp)?;
        rec.set(f::SLICE_QP, self.slice_qp.unsigned_abs())?;
        rec.set_signed(f::CB_QP_OFFSET, self.cb_qp_offset as i32)?;
        rec.set_signed(f::CR_QP_OFFSET, self.cr_qp_offset as i32)?;
        rec.set_bool(f::LAST_SLICE_OF_TILE, self.last_slice_of_tile)?;
        rec.set_bool(f::LAST_SLICE_OF_TILE_COLUMN, self.last_slice_of_tile_column)?;

        rec.set_bool(f::DEBLOCKING_DISABLED, self.deblocking_disabled)?;
        rec.set_signed(f::TC_OFFSET_DIV2, self.tc_offset_div2 as i32)?;
        rec.set_signed(f::BETA_OFFSET_DIV2, self.beta_offset_div2 as i32)?;
        rec.set_bool(f::LOOP_FILTER_ACROSS_SLICES, self.loop_filter_across_slices)?;
        rec.set_bool(f::SAO_CHROMA, self.sao_chroma)?;
        rec.set_bool(f::SAO_LUMA, self.sao_luma)?;
        rec.set_bool(f::MVD_L1_ZERO, false)?;
        rec.set_bool(f::IS_LOW_DELAY, self.is_low_delay)?;
        rec.set_bool(f::COLLOCATED_FROM_L0, self.collocated_from_l0)?;
        rec.set(f::CHROMA_LOG2_WEIGHT_DENOM, self.chroma_log2_weight_denom as u32)?;
        rec.set(f::LUMA_LOG2_WEIGHT_DENOM, self.luma_log2_weight_denom as u32)?;
        rec.set_bool(f::CABAC_INIT, self.cabac_init)?;
        rec.set(f::MAX_MERGE_IDX, self.max_merge_idx as u32)?;
        let collocated = if self.temporal_mvp && self.slice_type != SliceType::I {
            self.collocated_ref_idx as u32
        } else {
            0
        };
        rec.set(f::COLLOCATED_REF_IDX, collocated)?;

        rec.set(f::ROUND_INTRA, self.round_intra as u32)?;
        rec.set(f::ROUND_INTER, self.round_inter as u32)?;

        rec.set_bool(f::CABAC_ZERO_WORD_INSERTION, self.cabac_zero_word_insertion)?;
        rec.set_bool(f::EMULATION_BYTE_INSERTION, true)?;
        rec.set_bool(f::TAIL_INSERTION, self.tail_insertion)?;
        rec.set_bool(f::SLICE_DATA, true)?;
        rec.set_bool(f::HEADER_INSERTION, true)?;
        rec.set(f::INDIRECT_PAK_BSE_OFFSET, self.header_bytes_inserted >> 6)?;
        rec.set(f::TRANSFORM_SKIP_LAMBDA, self.transform_skip_lambda as u32)?;

        (gen.overrides.slice_state)(self, rec)
    }
}

/// Gen12: original slice start for tile replay
pub fn gen12_slice_state(params: &SliceState, rec: &mut CommandRecord) -> Result<()> {
    rec.set(hcp_slice_state::ORIGINAL_START_CTB_X, params.original_start.x)?;
    rec.set(hcp_slice_state::ORIGINAL_START_CTB_Y, params.original_start.y)
}

// =============================================================================
// REFERENCE INDEX / WEIGHT OFFSET
// =============================================================================

/// One active reference of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefEntry {
    /// POC distance, current minus reference
    pub poc_diff: i32,
    /// Index into the pipe reference slots
    pub frame_id: u8,
    /// Long-term reference
    pub long_term: bool,
    /// Explicit luma weights present
    pub luma_weight: bool,
    /// Explicit chroma weights present
    pub chroma_weight: bool,
}

/// HCP_REF_IDX_STATE
#[derive(Debug, Clone)]
pub struct RefIdxState {
    /// Reference list (0 or 1)
    pub list: u8,
    /// Active references
    pub entries: ArrayVec<RefEntry, MAX_REFS_PER_LIST>,
}

impl RefIdxState {
    /// Reference list `list` of a slice; the entry count must match the
    /// slice's active reference count for that list
    pub fn new(list: u8, slice: &SliceParams, entries: &[RefEntry]) -> Result<Self> {
        let active = match list {
            0 => slice.num_ref_l0(),
            1 => slice.num_ref_l1(),
            _ => return Err(Error::InvalidParameter),
        } as usize;
        if active == 0 || entries.len() != active {
            return Err(Error::InvalidParameter);
        }
        let entries = entries.iter().copied().collect();
        Ok(Self { list, entries })
    }
}

impl EncodeCommand for RefIdxState {
    const ID: CommandId = CommandId::HcpRefIdxState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_ref_idx_state as f;

        if self.entries.is_empty() {
            return Err(Error::InvalidParameter);
        }
        rec.set(f::LIST, self.list as u32)?;
        rec.set(f::NUM_ACTIVE_MINUS1, self.entries.len() as u32 - 1)?;
        for (i, entry) in self.entries.iter().enumerate() {
            let i = i as u16;
            rec.set_signed(f::TB.offset(i), entry.poc_diff.clamp(-128, 127))?;
            rec.set(f::FRAME_ID.offset(i), entry.frame_id as u32)?;
            rec.set_bool(f::CHROMA_WEIGHT.offset(i), entry.chroma_weight)?;
            rec.set_bool(f::LUMA_WEIGHT.offset(i), entry.luma_weight)?;
            rec.set_bool(f::LONG_TERM.offset(i), entry.long_term)?;
        }
        Ok(())
    }
}

/// HCP_WEIGHTOFFSET_STATE
#[derive(Debug, Clone, Copy)]
pub struct WeightOffsetState {
    /// Reference list (0 or 1)
    pub list: u8,
    /// Explicit weights of the list
    pub table: WeightTable,
}

impl WeightOffsetState {
    /// Weight-offset state for list `list` of `slice`, if the picture uses
    /// explicit weighted prediction on it
    pub fn for_slice(pic: &PictureParams, slice: &SliceParams, list: u8) -> Option<Self> {
        let applies = match (slice.slice_type, list) {
            (SliceType::P, 0) => pic.weighted_pred,
            (SliceType::B, 0 | 1) => pic.weighted_bipred,
            _ => false,
        };
        applies.then(|| Self {
            list,
            table: slice.weights[list as usize],
        })
    }
}

fn msb(offset: i16) -> u32 {
    ((offset as u16) >> 8) as u32
}

impl EncodeCommand for WeightOffsetState {
    const ID: CommandId = CommandId::HcpWeightOffsetState;

    fn fill(&self, _gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_weight_offset_state as f;

        let t = &self.table;
        rec.set(f::LIST, self.list as u32)?;
        for i in 0..MAX_REFS_PER_LIST {
            let dw = i as u16;
            rec.set_signed(f::LUMA_WEIGHT_DELTA.offset(dw), t.luma_weight_delta[i] as i32)?;
            rec.set_signed(f::LUMA_OFFSET.offset(dw), t.luma_offset[i] as i32)?;
            rec.set(f::LUMA_OFFSET_MSB.offset(dw), msb(t.luma_offset[i]))?;

            rec.set_signed(f::CHROMA_WEIGHT0.offset(dw), t.chroma_weight_delta[i][0] as i32)?;
            rec.set_signed(f::CHROMA_OFFSET0.offset(dw), t.chroma_offset[i][0] as i32)?;
            rec.set_signed(f::CHROMA_WEIGHT1.offset(dw), t.chroma_weight_delta[i][1] as i32)?;
            rec.set_signed(f::CHROMA_OFFSET1.offset(dw), t.chroma_offset[i][1] as i32)?;
        }

        let chroma_msb = |i: usize, c: usize| {
            t.chroma_offset.get(i).map_or(0, |off| msb(off[c]) & 0xFF)
        };
        for k in 0..8u16 {
            let i = 2 * k as usize;
            let packed = chroma_msb(i, 0)
                | chroma_msb(i + 1, 0) << 8
                | chroma_msb(i, 1) << 16
                | chroma_msb(i + 1, 1) << 24;
            rec.set(f::CHROMA_OFFSET_MSB.offset(k), packed)?;
        }
        Ok(())
    }
}

// =============================================================================
// TILE CODING
// =============================================================================

/// HCP_TILE_CODING
///
/// Offsets are in 64-byte units into the respective per-frame buffers.
#[derive(Debug, Clone, Copy, Default)]
#[allow(missing_docs)]
pub struct TileCoding {
    pub active_pipes: u8,
    pub row_store_select: bool,
    pub column_store_select: bool,
    pub num_tile_columns: u16,
    /// Tile origin in CTBs
    pub column_position: u16,
    pub row_position: u16,
    pub non_first_pass: bool,
    pub is_last_in_row: bool,
    pub is_last_in_column: bool,
    pub width_in_min_cb_minus1: u16,
    pub height_in_min_cb_minus1: u16,
    /// Bitstream partition of the tile, `None` when the tile shares the
    /// frame bitstream
    pub bitstream_offset: Option<u32>,
    pub pak_frame_statistics_offset: u32,
    pub cu_level_streamout_offset: u32,
    pub slice_size_streamout_offset: u32,
    pub cu_record_offset: u32,
    pub sse_rowstore_offset: u32,
    pub sao_rowstore_offset: u32,
    pub tile_size_streamout_offset: u32,
    pub vp9_probability_counter_offset: u32,
    /// Raster index of the tile
    pub tile_number: u8,
}

impl EncodeCommand for TileCoding {
    const ID: CommandId = CommandId::HcpTileCoding;

    fn fill(&self, gen: &GenerationDescriptor, rec: &mut CommandRecord) -> Result<()> {
        use hcp_tile_coding as f;

        rec.set(f::ACTIVE_BE_PIPES, self.active_pipes.max(1) as u32)?;
        rec.set_bool(f::ROW_STORE_SELECT, self.row_store_select)?;
        rec.set_bool(f::COLUMN_STORE_SELECT, self.column_store_select)?;
        rec.set(f::NUM_TILE_COLUMNS, self.num_tile_columns as u32)?;

        rec.set(f::COLUMN_POSITION, self.column_position as u32)?;
        rec.set_bool(f::NON_FIRST_PASS_TILE, self.non_first_pass)?;
        rec.set(f::ROW_POSITION, self.row_position as u32)?;
        rec.set_bool(f::IS_LAST_IN_ROW, self.is_last_in_row)?;
        rec.set_bool(f::IS_LAST_IN_COLUMN, self.is_last_in_column)?;

        rec.set(f::HEIGHT_IN_MIN_CB_MINUS1, self.height_in_min_cb_minus1 as u32)?;
        rec.set(f::WIDTH_IN_MIN_CB_MINUS1, self.width_in_min_cb_minus1 as u32)?;

        if let Some(offset) = self.bitstream_offset {
            rec.set_bool(f::BITSTREAM_OFFSET_ENABLE, true)?;
            rec.set(f::BITSTREAM_OFFSET, offset)?;
        }
        rec.set(f::PAK_FRAME_STATISTICS_OFFSET, self.pak_frame_statistics_offset)?;
        rec.set(f::CU_LEVEL_STREAMOUT_OFFSET, self.cu_level_streamout_offset)?;
        rec.set(f::SLICE_SIZE_STREAMOUT_OFFSET, self.slice_size_streamout_offset)?;
        rec.set(f::CU_RECORD_OFFSET, self.cu_record_offset)?;
        rec.set(f::SSE_ROWSTORE_OFFSET, self.sse_rowstore_offset)?;
        rec.set(f::SAO_ROWSTORE_OFFSET, self.sao_rowstore_offset)?;
        rec.set(f::TILE_SIZE_STREAMOUT_OFFSET, self.tile_size_streamout_offset)?;
        rec.set(f::VP9_PROBABILITY_COUNTER_OFFSET, self.vp9_probability_counter_offset)?;

        (gen.overrides.tile_coding)(self, rec)
    }
}

/// Gen12: tile number for the scalable pipe
pub fn gen12_tile_coding(params: &TileCoding, rec: &mut CommandRecord) -> Result<()> {
    rec.set(hcp_tile_coding::TILE_NUMBER, params.tile_number as u32)
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::const_assert_eq!(BufferSlot::IntraPredLeftReconColumn.dword() + 3, 119);
static_assertions::const_assert_eq!(COLLOCATED_MV_BASE + 2 * MAX_PIPE_REFERENCES, COLLOCATED_MV_ATTR);
static_assertions::const_assert_eq!(REFERENCE_BASE + 2 * MAX_PIPE_REFERENCES, REFERENCE_ATTR);
static_assertions::assert_impl_all!(PipeBufAddr: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::{Generation, RateControlMode};

    fn gen(g: Generation) -> &'static GenerationDescriptor {
        GenerationDescriptor::for_generation(g)
    }

    #[test]
    fn test_pipe_mode_select_per_generation() {
        let cmd = PipeModeSelect {
            rdoq: true,
            multi_engine_mode: MultiEngineMode::Left,
            scalable: true,
            ..PipeModeSelect::default()
        };

        let gen9 = cmd.encode(gen(Generation::Gen9)).unwrap();
        assert_eq!(gen9.get(hcp_pipe_mode_select::RDOQ), Some(0));
        assert_eq!(gen9.get(hcp_pipe_mode_select::VDENC_MODE), Some(1));

        let gen11 = cmd.encode(gen(Generation::Gen11)).unwrap();
        assert_eq!(gen11.get(hcp_pipe_mode_select::RDOQ), Some(1));
        assert_eq!(gen11.get(hcp_pipe_mode_select::MULTI_ENGINE_MODE), Some(0));

        let gen12 = cmd.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(gen12.dwords().len(), 7);
        assert_eq!(gen12.get(hcp_pipe_mode_select::MULTI_ENGINE_MODE), Some(1));
        assert_eq!(gen12.get(hcp_pipe_mode_select::PIPE_WORKING_MODE), Some(1));
    }

    #[test]
    fn test_surface_format_generic() {
        let seq = SequenceParams::default();
        let cmd = SurfaceState::planar(SurfaceId::Source, PixelFormat::Nv12, 1920, 1088, &seq);
        let rec = cmd.encode(gen(Generation::Gen9)).unwrap();
        assert_eq!(rec.get(hcp_surface_state::PITCH_MINUS1), Some(1919));
        assert_eq!(rec.get(hcp_surface_state::SURFACE_ID), Some(1));
        assert_eq!(rec.get(hcp_surface_state::SURFACE_FORMAT), Some(SurfaceFormat::Planar4208 as u32));
        assert_eq!(rec.get(hcp_surface_state::Y_OFFSET_FOR_U), Some(1088));
    }

    #[test]
    fn test_surface_format_444_variants() {
        let seq = SequenceParams {
            chroma_format: ChromaFormat::Yuv444,
            bit_depth_luma_minus8: 2,
            bit_depth_chroma_minus8: 2,
            ..SequenceParams::default()
        };
        let recon = SurfaceState::planar(SurfaceId::Recon, PixelFormat::Y410, 7680, 1088, &seq);
        let rec = recon.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_surface_state::SURFACE_FORMAT), Some(SurfaceFormat::Y416Variant as u32));
        assert_eq!(rec.get(hcp_surface_state::Y_OFFSET_FOR_U), Some(1088));
        assert_eq!(rec.get(hcp_surface_state::Y_OFFSET_FOR_V), Some(2176));

        let source = SurfaceState::planar(SurfaceId::Source, PixelFormat::Y410, 7680, 1088, &seq);
        let rec = source.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_surface_state::SURFACE_FORMAT), Some(SurfaceFormat::Y410 as u32));
    }

    #[test]
    fn test_surface_format_420_10bit() {
        let seq = SequenceParams {
            bit_depth_luma_minus8: 2,
            bit_depth_chroma_minus8: 2,
            ..SequenceParams::default()
        };
        let reference = SurfaceState::planar(SurfaceId::Reference, PixelFormat::P010, 3840, 1088, &seq);
        let rec = reference.encode(gen(Generation::Gen11)).unwrap();
        assert_eq!(
            SurfaceFormat::from_code(rec.get(hcp_surface_state::SURFACE_FORMAT).unwrap()),
            Some(SurfaceFormat::P010Variant)
        );
        assert_eq!(rec.get(hcp_surface_state::Y_OFFSET_FOR_V), Some(1088));
    }

    #[test]
    fn test_surface_zero_pitch_rejected() {
        let seq = SequenceParams::default();
        let cmd = SurfaceState::planar(SurfaceId::Recon, PixelFormat::Nv12, 0, 1088, &seq);
        assert_eq!(cmd.encode(gen(Generation::Gen12)).unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn test_pipe_buf_addr_slots() {
        let mut cmd = PipeBufAddr {
            mocs: 3,
            ..PipeBufAddr::default()
        };
        cmd.set_memory(BufferSlot::DecodedPicture, GpuAddr::new(0x1_0000_1000));
        cmd.set(BufferSlot::DeblockLine, BufferAddress::Rowstore(0x100));
        cmd.set_memory(BufferSlot::MetadataLine, GpuAddr::null());
        cmd.references[1] = Some(GpuAddr::new(0x8000));

        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        let dw = rec.dwords();
        assert_eq!(dw.len(), 121);
        assert_eq!(dw[1..4], [0x1000, 1, 3 << 1]);
        assert_eq!(dw[4..7], [0x100 << 6, 0, (3 << 1) | (1 << 12)]);
        assert_eq!(dw[13..16], [0, 0, 0]);
        assert_eq!(dw[39], 0x8000);
        assert_eq!(dw[53], 3 << 1);
        assert_eq!(dw[82], 0);
    }

    #[test]
    fn test_ind_obj_upper_bound() {
        let cmd = IndObjBaseAddr {
            bitstream: GpuAddr::new(0x10_0000),
            bitstream_size: 0x2_0000,
            ..IndObjBaseAddr::default()
        };
        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.dwords()[1], 0x10_0000);
        assert_eq!(rec.dwords()[4], 0x12_0000);
        assert_eq!(rec.dwords()[6], 0);
    }

    #[test]
    fn test_pic_state_fields() {
        let seq = SequenceParams {
            slice_size_control: true,
            rate_control: RateControlMode::Cbr,
            ..SequenceParams::default()
        };
        let pic = PictureParams {
            max_slice_size_bytes: 1500,
            cb_qp_offset: -2,
            ..PictureParams::default()
        };
        let state = PicState::new(&seq, &pic).unwrap();
        let rec = state.encode(gen(Generation::Gen12)).unwrap();

        assert_eq!(rec.get(hcp_pic_state::WIDTH_IN_MIN_CB_MINUS1), Some(239));
        assert_eq!(rec.get(hcp_pic_state::CTB_SIZE), Some(3));
        assert_eq!(rec.get(hcp_pic_state::MAX_TU_SIZE), Some(3));
        assert_eq!(rec.get(hcp_pic_state::CHROMA_SUBSAMPLING), Some(1));
        assert_eq!(rec.get(hcp_pic_state::CB_QP_OFFSET), Some(0x1E));
        assert_eq!(rec.get(hcp_pic_state::PAK_DYNAMIC_SLICE_MODE), Some(1));
        assert_eq!(rec.get(hcp_pic_state::SLICE_SIZE_THRESHOLD), Some(1500));
        assert_eq!(rec.get(hcp_pic_state::TARGET_SLICE_SIZE), Some(1500));
        assert_eq!(rec.get(hcp_pic_state::FRAME_BITRATE_MAX_REPORT_MASK), Some(1));
        assert_eq!(rec.get(hcp_pic_state::LCU_MAX_BITSIZE_ALLOWED), Some(0xFFFF));
    }

    #[test]
    fn test_pic_state_slice_size_control_needs_size() {
        let seq = SequenceParams {
            slice_size_control: true,
            ..SequenceParams::default()
        };
        assert_eq!(
            PicState::new(&seq, &PictureParams::default()).unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn test_pic_state_rdoq_thresholds_gen12_only() {
        let mut state = PicState::new(&SequenceParams::default(), &PictureParams::default()).unwrap();
        state.rdoq_enable = true;
        state.rdoq_intra_tu_threshold = rdoq_intra_tu_threshold(1920, 1088, 50, 1);

        let rec = state.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_pic_state::RDOQ_INTRA_TU_THRESHOLD), Some(4080));
        assert_eq!(rec.get(hcp_pic_state::RDOQ_ENABLE), Some(1));

        let rec = state.encode(gen(Generation::Gen11)).unwrap();
        assert_eq!(rec.dwords().len(), 31);
    }

    #[test]
    fn test_rdoq_threshold_split_and_clamp() {
        assert_eq!(rdoq_intra_tu_threshold(1920, 1088, 50, 2), 2040);
        assert_eq!(rdoq_intra_tu_threshold(16384, 16384, 100, 1), u16::MAX);
    }

    #[test]
    fn test_lcu_max_bitsize_clamp() {
        let seq = SequenceParams {
            log2_max_coding_block_size_minus3: 2,
            ..SequenceParams::default()
        };
        // 32x32 4:2:0 8-bit: 1024 * 3/2 * 8 * 5/3
        assert_eq!(lcu_max_bitsize(&seq, 0), 20480);
        assert_eq!(lcu_max_bitsize(&seq, 1000), 1000);
        assert_eq!(lcu_max_bitsize(&seq, 50000), 20480);
    }

    #[test]
    fn test_slice_addresses_and_terminator() {
        let seq = SequenceParams::default();
        let pic = PictureParams {
            qp_y: 2,
            ..PictureParams::default()
        };
        let first = SliceParams {
            slice_segment_address: 0,
            slice_qp_delta: -5,
            ..SliceParams::default()
        };
        let second = SliceParams {
            slice_segment_address: 45,
            ..SliceParams::default()
        };

        let state = SliceState::new(&seq, &pic, &first, Some(&second)).unwrap();
        assert_eq!(state.next, CtbPosition { x: 15, y: 1 });
        assert!(!state.last_slice_of_pic);
        let rec = state.encode(gen(Generation::Gen11)).unwrap();
        assert_eq!(rec.get(hcp_slice_state::SLICE_QP_SIGN), Some(1));
        assert_eq!(rec.get(hcp_slice_state::SLICE_QP), Some(3));
        assert_eq!(rec.get(hcp_slice_state::NEXT_CTB_X), Some(15));

        let last = SliceState::new(&seq, &pic, &second, None).unwrap();
        assert_eq!(last.start, CtbPosition { x: 15, y: 1 });
        assert_eq!(last.next, CtbPosition::default());
        let rec = last.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_slice_state::LAST_SLICE_OF_PIC), Some(1));
        assert_eq!(rec.get(hcp_slice_state::ORIGINAL_START_CTB_X), Some(15));
        assert_eq!(rec.get(hcp_slice_state::ORIGINAL_START_CTB_Y), Some(1));
    }

    #[test]
    fn test_slice_tail_insertion_on_last_picture() {
        let seq = SequenceParams::default();
        let pic = PictureParams {
            last_picture_in_stream: true,
            ..PictureParams::default()
        };
        let state = SliceState::new(&seq, &pic, &SliceParams::default(), None).unwrap();
        let rec = state.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_slice_state::TAIL_INSERTION), Some(1));
    }

    #[test]
    fn test_ref_idx_entries() {
        let slice = SliceParams {
            slice_type: SliceType::P,
            num_ref_idx_l0_active_minus1: 1,
            ..SliceParams::default()
        };
        let entries = [
            RefEntry {
                poc_diff: 1,
                frame_id: 0,
                ..RefEntry::default()
            },
            RefEntry {
                poc_diff: -300,
                frame_id: 1,
                long_term: true,
                ..RefEntry::default()
            },
        ];
        assert!(RefIdxState::new(1, &slice, &entries).is_err());
        let state = RefIdxState::new(0, &slice, &entries).unwrap();
        let rec = state.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.get(hcp_ref_idx_state::NUM_ACTIVE_MINUS1), Some(1));
        assert_eq!(rec.dwords()[2], 1);
        assert_eq!(rec.dwords()[3], 0x80 | (1 << 8) | (1 << 13));
    }

    #[test]
    fn test_weight_offset_msb_packing() {
        let mut table = WeightTable::default();
        table.luma_offset[0] = -2;
        table.chroma_offset[0] = [0x100, -1];
        table.chroma_offset[1] = [0x200, 0];
        table.chroma_offset[14] = [0x300, 0];
        let cmd = WeightOffsetState { list: 1, table };
        let rec = cmd.encode(gen(Generation::Gen11)).unwrap();
        let dw = rec.dwords();

        assert_eq!(dw[1], 1);
        assert_eq!(dw[2], 0xFF00_FE00);
        assert_eq!(dw[34], 0x01 | (0x02 << 8) | (0xFF << 16));
        assert_eq!(dw[41], 0x03);
    }

    #[test]
    fn test_weight_offset_applies_per_slice_type() {
        let pic = PictureParams {
            weighted_pred: true,
            ..PictureParams::default()
        };
        let p = SliceParams {
            slice_type: SliceType::P,
            ..SliceParams::default()
        };
        let b = SliceParams {
            slice_type: SliceType::B,
            ..SliceParams::default()
        };
        assert!(WeightOffsetState::for_slice(&pic, &p, 0).is_some());
        assert!(WeightOffsetState::for_slice(&pic, &p, 1).is_none());
        assert!(WeightOffsetState::for_slice(&pic, &b, 0).is_none());
    }

    #[test]
    fn test_tile_coding_number_gen12() {
        let cmd = TileCoding {
            num_tile_columns: 2,
            column_position: 15,
            column_store_select: true,
            bitstream_offset: Some(0x40),
            cu_record_offset: 3,
            tile_number: 1,
            ..TileCoding::default()
        };
        let rec = cmd.encode(gen(Generation::Gen12)).unwrap();
        assert_eq!(rec.dwords().len(), 20);
        assert_eq!(rec.dwords()[1], 1 | (1 << 9) | (2 << 16));
        assert_eq!(rec.dwords()[4], 1 | (0x40 << 6));
        assert_eq!(rec.dwords()[8], 3 << 6);
        assert_eq!(rec.get(hcp_tile_coding::TILE_NUMBER), Some(1));

        let rec = cmd.encode(gen(Generation::Gen11)).unwrap();
        assert_eq!(rec.dwords().len(), 13);
    }
}
