//! # Codec Parameters
//!
//! Sequence, picture and slice parameters as delivered by the DDI layer.
//!
//! The core treats these as read-only input. The only mutation allowed is the
//! orchestrator's derived-field step on [`PictureParams`].

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::types::{ChromaFormat, CodingType, FrameSize, LcuSize, SliceType, BRC_KBPS};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum tile columns in a picture
pub const MAX_TILE_COLUMNS: usize = 20;

/// Maximum tile rows in a picture
pub const MAX_TILE_ROWS: usize = 22;

/// Maximum reference entries per list
pub const MAX_REFS_PER_LIST: usize = 15;

/// Maximum hierarchical level reported for a B picture
pub const MAX_HIERARCHY_LEVEL: u8 = 4;

/// Smallest accepted ICQ quality factor
pub const MIN_ICQ_QUALITY_FACTOR: u8 = 1;

/// Largest accepted ICQ quality factor
pub const MAX_ICQ_QUALITY_FACTOR: u8 = 51;

// =============================================================================
// RATE CONTROL ENUMS
// =============================================================================

/// Rate-control method requested for the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RateControlMode {
    /// Constant QP (no bitrate control)
    #[default]
    Cqp,
    /// Constant bitrate
    Cbr,
    /// Variable bitrate
    Vbr,
    /// Intelligent constant quality
    Icq,
    /// Video conferencing mode
    Vcm,
    /// Quality-defined VBR
    Qvbr,
}

impl RateControlMode {
    /// Whether the HuC bitrate-control firmware drives this mode
    #[inline]
    pub const fn is_brc(self) -> bool {
        !matches!(self, Self::Cqp)
    }
}

/// Frame size tolerance (low-delay BRC selector)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameSizeTolerance {
    /// Normal tolerance
    #[default]
    Normal,
    /// Sliding-window tolerance
    Low,
    /// Low-delay BRC
    ExtremelyLow,
}

/// CU-level (LCU) rate-control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MbBrcMode {
    /// Driver decides from target usage
    #[default]
    Internal,
    /// Forced on
    Enabled,
    /// Forced off
    Disabled,
}

/// Frame rate as a rational number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    /// Numerator
    pub numerator: u32,
    /// Denominator
    pub denominator: u32,
}

impl FrameRate {
    /// Create a frame rate
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Frames per second, rejecting a zero denominator
    pub fn fps(self) -> Result<f64> {
        if self.denominator == 0 || self.numerator == 0 {
            return Err(Error::InvalidParameter);
        }
        Ok(self.numerator as f64 / self.denominator as f64)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

// =============================================================================
// SEQUENCE PARAMETERS
// =============================================================================

/// Per-sequence parameters
#[derive(Debug, Clone)]
pub struct SequenceParams {
    /// Picture width in minimum coding blocks, minus one
    pub frame_width_in_min_cb_minus1: u16,
    /// Picture height in minimum coding blocks, minus one
    pub frame_height_in_min_cb_minus1: u16,
    /// log2 of the minimum coding block size, minus three
    pub log2_min_coding_block_size_minus3: u8,
    /// log2 of the CTB size, minus three
    pub log2_max_coding_block_size_minus3: u8,
    /// Luma bit depth minus eight
    pub bit_depth_luma_minus8: u8,
    /// Chroma bit depth minus eight
    pub bit_depth_chroma_minus8: u8,
    /// Chroma format
    pub chroma_format: ChromaFormat,
    /// SAO enabled for the sequence
    pub sao_enabled: bool,
    /// Temporal MVP enabled for the sequence
    pub temporal_mvp_enabled: bool,
    /// GOP length in pictures
    pub gop_pic_size: u16,
    /// Distance between anchor pictures
    pub gop_ref_dist: u8,
    /// B pictures per hierarchy level
    pub num_b_in_gop: [u32; 3],
    /// Rate-control method
    pub rate_control: RateControlMode,
    /// Target bitrate in kbps
    pub target_bitrate_kbps: u32,
    /// Maximum bitrate in kbps
    pub max_bitrate_kbps: u32,
    /// Minimum bitrate in kbps
    pub min_bitrate_kbps: u32,
    /// VBV buffer size in bits
    pub vbv_buffer_size_bits: u32,
    /// Initial VBV fullness in bits
    pub init_vbv_fullness_bits: u32,
    /// Frame rate
    pub frame_rate: FrameRate,
    /// Frame size tolerance
    pub frame_size_tolerance: FrameSizeTolerance,
    /// LCU rate-control request
    pub mb_brc: MbBrcMode,
    /// ICQ / QVBR quality factor
    pub icq_quality_factor: u8,
    /// Dynamic slice-size conformance
    pub slice_size_control: bool,
    /// BRC reset requested with this sequence
    pub reset_brc: bool,
    /// Low-delay GOP (no backward references)
    pub low_delay: bool,
    /// Hierarchical GOP
    pub hierarchical: bool,
    /// Target usage (1 = quality ... 7 = speed)
    pub target_usage: u8,
    /// Adaptive CQP requested
    pub qp_adjustment: bool,
    /// User limit on I frame size in bytes (0 = none)
    pub user_max_i_frame_size: u32,
    /// User limit on P/B frame size in bytes (0 = none)
    pub user_max_pb_frame_size: u32,
    /// general_level_idc (30 x major + 3 x minor)
    pub level_idc: u8,
}

impl SequenceParams {
    /// log2 of the minimum coding block size
    #[inline]
    pub const fn log2_min_cb(&self) -> u8 {
        self.log2_min_coding_block_size_minus3 + 3
    }

    /// log2 of the CTB size
    #[inline]
    pub const fn log2_lcu(&self) -> u8 {
        self.log2_max_coding_block_size_minus3 + 3
    }

    /// CTB size, rejecting sizes the HCP cannot encode
    pub fn lcu_size(&self) -> Result<LcuSize> {
        LcuSize::from_log2(self.log2_lcu()).ok_or(Error::InvalidParameter)
    }

    /// Picture width in minimum coding blocks
    #[inline]
    pub const fn width_in_min_cb(&self) -> u32 {
        self.frame_width_in_min_cb_minus1 as u32 + 1
    }

    /// Picture height in minimum coding blocks
    #[inline]
    pub const fn height_in_min_cb(&self) -> u32 {
        self.frame_height_in_min_cb_minus1 as u32 + 1
    }

    /// Picture size in pixels
    pub const fn frame_size(&self) -> FrameSize {
        FrameSize::new(
            self.width_in_min_cb() << self.log2_min_cb(),
            self.height_in_min_cb() << self.log2_min_cb(),
        )
    }

    /// Largest of luma and chroma bit depth
    pub const fn max_bit_depth(&self) -> u8 {
        let luma = self.bit_depth_luma_minus8;
        let chroma = self.bit_depth_chroma_minus8;
        8 + if luma > chroma { luma } else { chroma }
    }

    /// Target bitrate in bits per second
    #[inline]
    pub const fn target_bitrate_bps(&self) -> u32 {
        self.target_bitrate_kbps.saturating_mul(BRC_KBPS)
    }

    /// Whether the low-delay BRC algorithm is selected
    #[inline]
    pub const fn is_low_delay_brc(&self) -> bool {
        matches!(self.frame_size_tolerance, FrameSizeTolerance::ExtremelyLow)
    }
}

impl Default for SequenceParams {
    fn default() -> Self {
        // 1920x1088 in 8x8 minimum coding blocks, 64x64 CTBs, 8-bit 4:2:0
        Self {
            frame_width_in_min_cb_minus1: 239,
            frame_height_in_min_cb_minus1: 135,
            log2_min_coding_block_size_minus3: 0,
            log2_max_coding_block_size_minus3: 3,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            chroma_format: ChromaFormat::Yuv420,
            sao_enabled: true,
            temporal_mvp_enabled: true,
            gop_pic_size: 30,
            gop_ref_dist: 1,
            num_b_in_gop: [0; 3],
            rate_control: RateControlMode::Cqp,
            target_bitrate_kbps: 0,
            max_bitrate_kbps: 0,
            min_bitrate_kbps: 0,
            vbv_buffer_size_bits: 0,
            init_vbv_fullness_bits: 0,
            frame_rate: FrameRate::default(),
            frame_size_tolerance: FrameSizeTolerance::Normal,
            mb_brc: MbBrcMode::Internal,
            icq_quality_factor: 0,
            slice_size_control: false,
            reset_brc: false,
            low_delay: true,
            hierarchical: false,
            target_usage: 4,
            qp_adjustment: false,
            user_max_i_frame_size: 0,
            user_max_pb_frame_size: 0,
            level_idc: 123,
        }
    }
}

// =============================================================================
// PICTURE PARAMETERS
// =============================================================================

/// Per-picture parameters
#[derive(Debug, Clone)]
pub struct PictureParams {
    /// Picture coding type
    pub coding_type: CodingType,
    /// Picture QP
    pub qp_y: i8,
    /// Hierarchical level plus one (0 = not hierarchical)
    pub hierarchical_level_plus1: u8,
    /// Tiling enabled
    pub tiles_enabled: bool,
    /// Tile columns minus one
    pub num_tile_columns_minus1: u8,
    /// Tile rows minus one
    pub num_tile_rows_minus1: u8,
    /// Tile column widths in CTBs (last column is derived)
    pub tile_column_width: [u16; MAX_TILE_COLUMNS],
    /// Tile row heights in CTBs (last row is derived)
    pub tile_row_height: [u16; MAX_TILE_ROWS],
    /// In-loop filtering across tile boundaries
    pub loop_filter_across_tiles: bool,
    /// Transform skip enabled
    pub transform_skip_enabled: bool,
    /// CU QP delta enabled
    pub cu_qp_delta_enabled: bool,
    /// CU QP delta depth
    pub diff_cu_qp_delta_depth: u8,
    /// PPS Cb QP offset
    pub cb_qp_offset: i8,
    /// PPS Cr QP offset
    pub cr_qp_offset: i8,
    /// Weighted prediction on P slices
    pub weighted_pred: bool,
    /// Weighted prediction on B slices
    pub weighted_bipred: bool,
    /// Sign data hiding
    pub sign_data_hiding: bool,
    /// Lower QP bound for BRC
    pub brc_min_qp: u8,
    /// Upper QP bound for BRC
    pub brc_max_qp: u8,
    /// Upper bound on bits per LCU (0 = derive)
    pub lcu_max_bitsize_allowed: u32,
    /// Maximum slice size in bytes under slice-size control
    pub max_slice_size_bytes: u32,
    /// Last picture of the sequence
    pub last_picture_in_sequence: bool,
    /// Last picture of the stream
    pub last_picture_in_stream: bool,
    /// Status report feedback number (frame id)
    pub status_report_feedback_number: u32,
    /// Number of regions of interest
    pub num_roi: u8,
}

impl PictureParams {
    /// Number of tile columns
    #[inline]
    pub const fn tile_columns(&self) -> u32 {
        if self.tiles_enabled { self.num_tile_columns_minus1 as u32 + 1 } else { 1 }
    }

    /// Number of tile rows
    #[inline]
    pub const fn tile_rows(&self) -> u32 {
        if self.tiles_enabled { self.num_tile_rows_minus1 as u32 + 1 } else { 1 }
    }
}

impl Default for PictureParams {
    fn default() -> Self {
        Self {
            coding_type: CodingType::I,
            qp_y: 26,
            hierarchical_level_plus1: 0,
            tiles_enabled: false,
            num_tile_columns_minus1: 0,
            num_tile_rows_minus1: 0,
            tile_column_width: [0; MAX_TILE_COLUMNS],
            tile_row_height: [0; MAX_TILE_ROWS],
            loop_filter_across_tiles: true,
            transform_skip_enabled: false,
            cu_qp_delta_enabled: true,
            diff_cu_qp_delta_depth: 0,
            cb_qp_offset: 0,
            cr_qp_offset: 0,
            weighted_pred: false,
            weighted_bipred: false,
            sign_data_hiding: false,
            brc_min_qp: 10,
            brc_max_qp: 51,
            lcu_max_bitsize_allowed: 0,
            max_slice_size_bytes: 0,
            last_picture_in_sequence: false,
            last_picture_in_stream: false,
            status_report_feedback_number: 0,
            num_roi: 0,
        }
    }
}

// =============================================================================
// SLICE PARAMETERS
// =============================================================================

/// Explicit weighted-prediction table for one reference list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightTable {
    /// Delta luma weight per reference
    pub luma_weight_delta: [i8; MAX_REFS_PER_LIST],
    /// Luma offset per reference
    pub luma_offset: [i16; MAX_REFS_PER_LIST],
    /// Delta chroma weight per reference and component
    pub chroma_weight_delta: [[i8; 2]; MAX_REFS_PER_LIST],
    /// Chroma offset per reference and component
    pub chroma_offset: [[i16; 2]; MAX_REFS_PER_LIST],
}

/// Per-slice parameters
#[derive(Debug, Clone)]
pub struct SliceParams {
    /// First CTB of the slice in raster order
    pub slice_segment_address: u32,
    /// CTBs covered by the slice
    pub num_lcus_in_slice: u32,
    /// Slice type
    pub slice_type: SliceType,
    /// QP delta against the picture QP
    pub slice_qp_delta: i8,
    /// Slice Cb QP offset
    pub slice_cb_qp_offset: i8,
    /// Slice Cr QP offset
    pub slice_cr_qp_offset: i8,
    /// Temporal MVP enabled for the slice
    pub slice_temporal_mvp_enable: bool,
    /// Active L0 references minus one
    pub num_ref_idx_l0_active_minus1: u8,
    /// Active L1 references minus one
    pub num_ref_idx_l1_active_minus1: u8,
    /// Deblocking disabled in the slice header
    pub deblocking_filter_disabled: bool,
    /// beta_offset_div2
    pub beta_offset_div2: i8,
    /// tc_offset_div2
    pub tc_offset_div2: i8,
    /// SAO on luma
    pub sao_luma: bool,
    /// SAO on chroma
    pub sao_chroma: bool,
    /// Collocated picture taken from L0
    pub collocated_from_l0: bool,
    /// Merge candidates (1..=5)
    pub max_num_merge_cand: u8,
    /// CABAC init flag
    pub cabac_init: bool,
    /// Luma weight denominator (log2)
    pub luma_log2_weight_denom: u8,
    /// Chroma weight denominator (log2)
    pub chroma_log2_weight_denom: u8,
    /// Explicit weights for L0 and L1
    pub weights: [WeightTable; 2],
}

impl SliceParams {
    /// Active references in list 0 (zero for I slices)
    pub const fn num_ref_l0(&self) -> u8 {
        match self.slice_type {
            SliceType::I => 0,
            _ => self.num_ref_idx_l0_active_minus1 + 1,
        }
    }

    /// Active references in list 1 (zero unless B slice)
    pub const fn num_ref_l1(&self) -> u8 {
        match self.slice_type {
            SliceType::B => self.num_ref_idx_l1_active_minus1 + 1,
            _ => 0,
        }
    }
}

impl Default for SliceParams {
    fn default() -> Self {
        Self {
            slice_segment_address: 0,
            num_lcus_in_slice: 0,
            slice_type: SliceType::I,
            slice_qp_delta: 0,
            slice_cb_qp_offset: 0,
            slice_cr_qp_offset: 0,
            slice_temporal_mvp_enable: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
            deblocking_filter_disabled: false,
            beta_offset_div2: 0,
            tc_offset_div2: 0,
            sao_luma: true,
            sao_chroma: true,
            collocated_from_l0: true,
            max_num_merge_cand: 5,
            cabac_init: false,
            luma_log2_weight_denom: 6,
            chroma_log2_weight_denom: 6,
            weights: [WeightTable::default(); 2],
        }
    }
}

// =============================================================================
// PACKED HEADERS
// =============================================================================

/// A bit-exact header (VPS/SPS/PPS/slice header) produced by the packer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedHeader {
    /// Header bytes, last byte possibly partial
    pub data: Vec<u8>,
    /// Valid bits in `data`
    pub bit_length: u32,
    /// Leading bytes the hardware must not emulation-prevent
    pub skip_emulation_bytes: u8,
    /// Emulation prevention required
    pub emulation_required: bool,
}

// =============================================================================
// QUANTIZATION MATRICES
// =============================================================================

/// HEVC scaling lists (inverse quantization matrices)
///
/// Lists are indexed `3 * prediction_type + color_component`, 32x32 lists by
/// prediction type only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantMatrix {
    /// 4x4 lists
    pub list_4x4: [[u8; 16]; 6],
    /// 8x8 lists
    pub list_8x8: [[u8; 64]; 6],
    /// 16x16 lists (8x8 representation)
    pub list_16x16: [[u8; 64]; 6],
    /// 32x32 lists (8x8 representation)
    pub list_32x32: [[u8; 64]; 2],
    /// 16x16 DC coefficients
    pub dc_16x16: [u8; 6],
    /// 32x32 DC coefficients
    pub dc_32x32: [u8; 2],
}

impl QuantMatrix {
    /// Flat scaling lists (every entry 16)
    pub const fn flat() -> Self {
        Self {
            list_4x4: [[16; 16]; 6],
            list_8x8: [[16; 64]; 6],
            list_16x16: [[16; 64]; 6],
            list_32x32: [[16; 64]; 2],
            dc_16x16: [16; 6],
            dc_32x32: [16; 2],
        }
    }
}

impl Default for QuantMatrix {
    fn default() -> Self {
        Self::flat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_geometry() {
        let seq = SequenceParams::default();
        assert_eq!(seq.frame_size(), FrameSize::new(1920, 1088));
        assert_eq!(seq.lcu_size(), Ok(LcuSize::Lcu64));
        assert_eq!(seq.max_bit_depth(), 8);
    }

    #[test]
    fn test_invalid_lcu_size() {
        let seq = SequenceParams {
            log2_max_coding_block_size_minus3: 4,
            ..SequenceParams::default()
        };
        assert_eq!(seq.lcu_size(), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_frame_rate_zero_denominator() {
        assert_eq!(FrameRate::new(30, 0).fps(), Err(Error::InvalidParameter));
        assert_eq!(FrameRate::new(60, 2).fps(), Ok(30.0));
    }

    #[test]
    fn test_reference_counts() {
        let mut slice = SliceParams {
            num_ref_idx_l0_active_minus1: 1,
            num_ref_idx_l1_active_minus1: 2,
            ..SliceParams::default()
        };
        assert_eq!((slice.num_ref_l0(), slice.num_ref_l1()), (0, 0));
        slice.slice_type = SliceType::B;
        assert_eq!((slice.num_ref_l0(), slice.num_ref_l1()), (2, 3));
    }

    #[test]
    fn test_rate_control_brc() {
        assert!(!RateControlMode::Cqp.is_brc());
        assert!(RateControlMode::Icq.is_brc());
        assert!(RateControlMode::Cbr.is_brc());
    }
}
