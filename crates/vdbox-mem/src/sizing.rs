//! # Internal Buffer Sizing
//!
//! Closed-form sizes of the HCP scratch buffers and the rules that decide
//! whether an existing allocation is still large enough.
//!
//! Every size is a multiple of the 64-byte cache line. HEVC sizes are derived
//! from the picture in 16x16 units (the smallest CTB, so the result covers any
//! CTB size up to the one requested); VP9 sizes from 64x64 superblocks.
//!
//! ```text
//!   SizeParams ──► compute_size(kind) ──► bytes
//!        │
//!        └──────► needs_realloc(kind, &allocated) ──► bool
//!                        │
//!                        └── tracking(kind) picks exactly one predicate
//! ```

use vdbox_core::{
    align_up, div_ceil, ChromaFormat, Error, LcuSize, ResourceKind, Result, Standard,
    CACHELINE_SIZE,
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Worst-case CU/TU record bytes per 16x16 unit, 8-bit 4:2:0
pub const WORST_CASE_CU_TU_INFO: u32 = 4 * CACHELINE_SIZE;

/// Worst-case CU/TU record bytes per 16x16 unit, range extensions
pub const WORST_CASE_CU_TU_INFO_REXT: u32 = 6 * CACHELINE_SIZE;

/// VP9 superblock size in pixels
pub const VP9_SUPERBLOCK_SIZE: u32 = 64;

/// Intra-prediction column store, 4:2:2 / 4:4:4 `[bit depth 8/10][lcu 16/32/64]`
static INTRA_PRED_COLUMN_REXT: [[u32; 3]; 2] = [[1, 2, 3], [2, 3, 6]];

/// Intra-prediction column store, 4:2:0 / monochrome
static INTRA_PRED_COLUMN: [[u32; 3]; 2] = [[1, 1, 2], [1, 2, 4]];

/// SAO line store, 4:2:0 / 4:2:2
static SAO_LINE: [[u32; 3]; 2] = [[2, 3, 5], [2, 3, 5]];

/// SAO line store, 4:4:4
static SAO_LINE_444: [[u32; 3]; 2] = [[2, 4, 7], [3, 4, 8]];

/// SAO tile column store `[4:2:0 / 4:2:2 / 4:4:4][lcu 16/32/64]`
static SAO_TILE_COLUMN: [[u32; 3]; 3] = [[4, 5, 9], [5, 7, 12], [5, 7, 12]];

// =============================================================================
// BUFFER KIND
// =============================================================================

/// Internal scratch buffer of the HCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// Deblocking filter line buffer
    DeblockLine,
    /// Deblocking filter tile line buffer
    DeblockTileLine,
    /// Deblocking filter tile column buffer
    DeblockTileColumn,
    /// Motion vector up-right column store
    MvUpRightColumn,
    /// Metadata line buffer
    MetadataLine,
    /// Metadata tile line buffer
    MetadataTileLine,
    /// Metadata tile column buffer
    MetadataTileColumn,
    /// Intra prediction up-right column store
    IntraPredUpRightColumn,
    /// Intra prediction left recon column store
    IntraPredLeftReconColumn,
    /// SAO line buffer
    SaoLine,
    /// SAO tile line buffer
    SaoTileLine,
    /// SAO tile column buffer
    SaoTileColumn,
    /// Current picture motion vector temporal buffer
    CurrentMvTemporal,
    /// Collocated motion vector temporal buffer (VP9)
    CollocatedMvTemporal,
    /// CABAC streamout
    CabacStreamout,
    /// Segment id buffer (VP9)
    SegmentId,
    /// HVD line buffer (VP9)
    HvdLine,
    /// HVD tile buffer (VP9)
    HvdTile,
}

impl BufferKind {
    /// Kinds a HEVC encode allocates
    pub const HEVC: [BufferKind; 14] = [
        Self::DeblockLine,
        Self::DeblockTileLine,
        Self::DeblockTileColumn,
        Self::MvUpRightColumn,
        Self::MetadataLine,
        Self::MetadataTileLine,
        Self::MetadataTileColumn,
        Self::IntraPredUpRightColumn,
        Self::IntraPredLeftReconColumn,
        Self::SaoLine,
        Self::SaoTileLine,
        Self::SaoTileColumn,
        Self::CurrentMvTemporal,
        Self::CabacStreamout,
    ];

    /// Kinds a VP9 encode allocates
    pub const VP9: [BufferKind; 14] = [
        Self::DeblockLine,
        Self::DeblockTileLine,
        Self::DeblockTileColumn,
        Self::MetadataLine,
        Self::MetadataTileLine,
        Self::MetadataTileColumn,
        Self::IntraPredUpRightColumn,
        Self::IntraPredLeftReconColumn,
        Self::CurrentMvTemporal,
        Self::CollocatedMvTemporal,
        Self::CabacStreamout,
        Self::SegmentId,
        Self::HvdLine,
        Self::HvdTile,
    ];

    /// Kinds used by a standard
    pub fn for_standard(standard: Standard) -> &'static [BufferKind] {
        match standard {
            Standard::Hevc => &Self::HEVC,
            Standard::Vp9 => &Self::VP9,
        }
    }

    /// Allocator usage hint
    pub const fn resource_kind(self) -> ResourceKind {
        match self {
            Self::CabacStreamout => ResourceKind::Streamout,
            _ => ResourceKind::Scratch,
        }
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeblockLine => "dblk_line",
            Self::DeblockTileLine => "dblk_tile_line",
            Self::DeblockTileColumn => "dblk_tile_col",
            Self::MvUpRightColumn => "mv_up_rt_col",
            Self::MetadataLine => "meta_line",
            Self::MetadataTileLine => "meta_tile_line",
            Self::MetadataTileColumn => "meta_tile_col",
            Self::IntraPredUpRightColumn => "intra_pred_up_rt_col",
            Self::IntraPredLeftReconColumn => "intra_pred_lft_recon_col",
            Self::SaoLine => "sao_line",
            Self::SaoTileLine => "sao_tile_line",
            Self::SaoTileColumn => "sao_tile_col",
            Self::CurrentMvTemporal => "curr_mv_temporal",
            Self::CollocatedMvTemporal => "coll_mv_temporal",
            Self::CabacStreamout => "cabac_streamout",
            Self::SegmentId => "segment_id",
            Self::HvdLine => "hvd_line",
            Self::HvdTile => "hvd_tile",
        }
    }
}

// =============================================================================
// SIZE PARAMETERS
// =============================================================================

/// Geometry a buffer size is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeParams {
    /// Codec standard
    pub standard: Standard,
    /// Picture width in pixels
    pub width: u32,
    /// Picture height in pixels
    pub height: u32,
    /// Largest of luma / chroma bit depth
    pub max_bit_depth: u8,
    /// Chroma format
    pub chroma_format: ChromaFormat,
    /// CTB size (HEVC)
    pub lcu: LcuSize,
    /// Worst-case compressed frame size in bytes
    pub max_frame_size: u32,
}

impl SizeParams {
    /// HEVC parameters with default 8-bit 4:2:0 64x64 CTBs
    pub const fn hevc(width: u32, height: u32) -> Self {
        Self {
            standard: Standard::Hevc,
            width,
            height,
            max_bit_depth: 8,
            chroma_format: ChromaFormat::Yuv420,
            lcu: LcuSize::Lcu64,
            max_frame_size: 0,
        }
    }

    /// VP9 parameters with default 8-bit 4:2:0
    pub const fn vp9(width: u32, height: u32) -> Self {
        Self {
            standard: Standard::Vp9,
            ..Self::hevc(width, height)
        }
    }

    /// Geometry to remember once a buffer of this size is allocated
    pub const fn allocated(&self) -> AllocatedGeometry {
        AllocatedGeometry {
            width: self.width,
            height: self.height,
            lcu: self.lcu,
            frame_size: self.max_frame_size,
        }
    }

    const fn is_high_bit_depth(&self) -> bool {
        self.max_bit_depth > 8
    }

    const fn bit_depth_index(&self) -> usize {
        if self.max_bit_depth == 8 { 0 } else { 1 }
    }
}

/// Geometry an existing allocation was sized for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Largest CTB size allocated for
    pub lcu: LcuSize,
    /// Frame size in bytes allocated for
    pub frame_size: u32,
}

// =============================================================================
// SIZE COMPUTATION
// =============================================================================

/// Size in bytes of an internal buffer
///
/// Returns `InvalidParameter` for a kind the standard does not use or a
/// chroma format the kind cannot serve.
pub fn compute_size(kind: BufferKind, params: &SizeParams) -> Result<u32> {
    if params.width == 0 || params.height == 0 {
        return Err(Error::InvalidParameter);
    }
    match params.standard {
        Standard::Hevc => hevc_size(kind, params),
        Standard::Vp9 => vp9_size(kind, params),
    }
}

fn hevc_size(kind: BufferKind, p: &SizeParams) -> Result<u32> {
    let width_in_ctb = div_ceil(p.width, 16);
    let height_in_ctb = div_ceil(p.height, 16);
    let base_units = 1u32 << (p.lcu.log2() - 2);
    let bit_depth_mult = if p.is_high_bit_depth() { 2 } else { 1 };
    let lcu = p.lcu.table_index();
    let lcu64_mult = if p.lcu == LcuSize::Lcu64 { 2 } else { 1 };

    let size = match kind {
        BufferKind::DeblockLine | BufferKind::DeblockTileLine => {
            // 4:4:4 carries 1.5x the chroma samples
            let doubled = if p.chroma_format == ChromaFormat::Yuv444 { 3 } else { 2 };
            let row = (doubled * base_units * 128 * bit_depth_mult + 511) / 512;
            row * CACHELINE_SIZE * width_in_ctb
        }
        BufferKind::DeblockTileColumn => {
            let doubled = if p.chroma_format == ChromaFormat::Yuv420 { 2 } else { 3 };
            let col = (doubled * base_units * 128 * bit_depth_mult + 3 * 128 * bit_depth_mult + 511) / 512;
            col * CACHELINE_SIZE * height_in_ctb
        }
        BufferKind::MvUpRightColumn | BufferKind::MetadataTileColumn => {
            lcu64_mult * CACHELINE_SIZE * height_in_ctb
        }
        BufferKind::MetadataLine | BufferKind::MetadataTileLine => {
            lcu64_mult * CACHELINE_SIZE * width_in_ctb
        }
        BufferKind::IntraPredUpRightColumn | BufferKind::IntraPredLeftReconColumn => {
            let table = match p.chroma_format {
                ChromaFormat::Yuv422 | ChromaFormat::Yuv444 => &INTRA_PRED_COLUMN_REXT,
                _ => &INTRA_PRED_COLUMN,
            };
            table[p.bit_depth_index()][lcu] * CACHELINE_SIZE * height_in_ctb
        }
        BufferKind::SaoLine | BufferKind::SaoTileLine => {
            let table = match p.chroma_format {
                ChromaFormat::Yuv444 => &SAO_LINE_444,
                _ => &SAO_LINE,
            };
            table[p.bit_depth_index()][lcu] * CACHELINE_SIZE * width_in_ctb
        }
        BufferKind::SaoTileColumn => {
            let format = match p.chroma_format {
                ChromaFormat::Monochrome => return Err(Error::InvalidParameter),
                other => other.idc() as usize - 1,
            };
            SAO_TILE_COLUMN[format][lcu] * CACHELINE_SIZE * height_in_ctb
        }
        BufferKind::CurrentMvTemporal => {
            let mvt = (div_ceil(p.width, 64) * div_ceil(p.height, 16) + 1) & !1;
            let mvtb = (div_ceil(p.width, 32) * div_ceil(p.height, 32) + 1) & !1;
            mvt.max(mvtb) * CACHELINE_SIZE
        }
        BufferKind::CabacStreamout => {
            let units = width_in_ctb * height_in_ctb;
            cabac_streamout_size(units, p)
        }
        BufferKind::CollocatedMvTemporal
        | BufferKind::SegmentId
        | BufferKind::HvdLine
        | BufferKind::HvdTile => return Err(Error::InvalidParameter),
    };
    Ok(size)
}

fn vp9_size(kind: BufferKind, p: &SizeParams) -> Result<u32> {
    let width_in_sb = div_ceil(p.width, VP9_SUPERBLOCK_SIZE);
    let height_in_sb = div_ceil(p.height, VP9_SUPERBLOCK_SIZE);
    let high = p.is_high_bit_depth();

    // (deblock row, deblock column, intra prediction) multipliers
    let (dblk_row, dblk_col, intra) = match p.chroma_format {
        ChromaFormat::Yuv420 if high => (36, 34, 4),
        ChromaFormat::Yuv420 => (18, 17, 2),
        ChromaFormat::Yuv444 if high => (54, 50, 6),
        ChromaFormat::Yuv444 => (27, 25, 3),
        _ => return Err(Error::InvalidParameter),
    };

    let size = match kind {
        BufferKind::DeblockLine | BufferKind::DeblockTileLine => width_in_sb * dblk_row * CACHELINE_SIZE,
        BufferKind::DeblockTileColumn => height_in_sb * dblk_col * CACHELINE_SIZE,
        BufferKind::MetadataLine | BufferKind::MetadataTileLine => width_in_sb * 5 * CACHELINE_SIZE,
        BufferKind::MetadataTileColumn => height_in_sb * 5 * CACHELINE_SIZE,
        BufferKind::CurrentMvTemporal | BufferKind::CollocatedMvTemporal => {
            width_in_sb * height_in_sb * 9 * CACHELINE_SIZE
        }
        BufferKind::SegmentId => width_in_sb * height_in_sb * CACHELINE_SIZE,
        BufferKind::HvdLine | BufferKind::HvdTile => width_in_sb * CACHELINE_SIZE,
        BufferKind::IntraPredUpRightColumn | BufferKind::IntraPredLeftReconColumn => {
            intra * height_in_sb * CACHELINE_SIZE
        }
        BufferKind::CabacStreamout => {
            // 8x8 minimum coding blocks per superblock row / column
            let units = (width_in_sb * 8) * (height_in_sb * 8);
            cabac_streamout_size(units, p)
        }
        BufferKind::MvUpRightColumn
        | BufferKind::SaoLine
        | BufferKind::SaoTileLine
        | BufferKind::SaoTileColumn => return Err(Error::InvalidParameter),
    };
    Ok(size)
}

fn cabac_streamout_size(units: u32, p: &SizeParams) -> u32 {
    let cu_info = if p.chroma_format == ChromaFormat::Yuv420 && p.max_bit_depth == 8 {
        WORST_CASE_CU_TU_INFO
    } else {
        WORST_CASE_CU_TU_INFO_REXT
    };
    let raw = units
        .saturating_mul(cu_info)
        .saturating_add(units)
        .saturating_add(p.max_frame_size.saturating_mul(3));
    align_up(raw.min(u32::MAX - CACHELINE_SIZE), CACHELINE_SIZE)
}

// =============================================================================
// REALLOCATION
// =============================================================================

/// Which dimensions an allocation depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// Grows with picture width
    Width,
    /// Grows with picture height
    Height,
    /// Grows with width or a larger CTB
    WidthOrLcu,
    /// Grows with height or a larger CTB
    HeightOrLcu,
    /// Grows with width, or when the CTB first becomes 64x64
    WidthOrLcuGrowsTo64,
    /// Grows with height, or when the CTB first becomes 64x64
    HeightOrLcuGrowsTo64,
    /// Intra-prediction rule: 8-bit 4:2:0 behaves like `HeightOrLcuGrowsTo64`,
    /// everything else like `HeightOrLcu`
    IntraPred,
    /// Grows with width or height
    Both,
    /// Grows with the compressed frame size
    FrameSize,
}

/// Tracking class of a kind under a standard
pub fn tracking(kind: BufferKind, standard: Standard) -> Result<Tracking> {
    use BufferKind as K;

    let class = match (standard, kind) {
        (Standard::Hevc, K::DeblockLine | K::DeblockTileLine | K::SaoLine | K::SaoTileLine) => {
            Tracking::WidthOrLcu
        }
        (Standard::Hevc, K::DeblockTileColumn | K::SaoTileColumn) => Tracking::HeightOrLcu,
        (Standard::Hevc, K::MetadataLine | K::MetadataTileLine) => Tracking::WidthOrLcuGrowsTo64,
        (Standard::Hevc, K::MvUpRightColumn | K::MetadataTileColumn) => Tracking::HeightOrLcuGrowsTo64,
        (Standard::Hevc, K::IntraPredUpRightColumn | K::IntraPredLeftReconColumn) => Tracking::IntraPred,
        (Standard::Hevc, K::CurrentMvTemporal) => Tracking::Both,
        (Standard::Hevc, K::CabacStreamout) => Tracking::FrameSize,

        (
            Standard::Vp9,
            K::MetadataLine | K::MetadataTileLine | K::DeblockLine | K::DeblockTileLine | K::HvdLine | K::HvdTile,
        ) => Tracking::Width,
        (
            Standard::Vp9,
            K::DeblockTileColumn | K::MetadataTileColumn | K::IntraPredUpRightColumn | K::IntraPredLeftReconColumn,
        ) => Tracking::Height,
        (Standard::Vp9, K::CurrentMvTemporal | K::CollocatedMvTemporal | K::SegmentId) => Tracking::Both,
        (Standard::Vp9, K::CabacStreamout) => Tracking::FrameSize,

        _ => return Err(Error::InvalidParameter),
    };
    Ok(class)
}

/// Whether an allocation sized for `allocated` is too small for `new`
pub fn needs_realloc(kind: BufferKind, new: &SizeParams, allocated: &AllocatedGeometry) -> Result<bool> {
    let class = tracking(kind, new.standard)?;

    // VP9 compares superblock counts
    let (width, height, width_alloc, height_alloc) = match new.standard {
        Standard::Hevc => (new.width, new.height, allocated.width, allocated.height),
        Standard::Vp9 => (
            div_ceil(new.width, VP9_SUPERBLOCK_SIZE),
            div_ceil(new.height, VP9_SUPERBLOCK_SIZE),
            div_ceil(allocated.width, VP9_SUPERBLOCK_SIZE),
            div_ceil(allocated.height, VP9_SUPERBLOCK_SIZE),
        ),
    };

    let lcu_grew = new.lcu > allocated.lcu;
    let grew_to_64 = allocated.lcu < LcuSize::Lcu64 && new.lcu == LcuSize::Lcu64;

    let realloc = match class {
        Tracking::Width => width > width_alloc,
        Tracking::Height => height > height_alloc,
        Tracking::WidthOrLcu => width > width_alloc || lcu_grew,
        Tracking::HeightOrLcu => height > height_alloc || lcu_grew,
        Tracking::WidthOrLcuGrowsTo64 => grew_to_64 || width > width_alloc,
        Tracking::HeightOrLcuGrowsTo64 => grew_to_64 || height > height_alloc,
        Tracking::IntraPred => {
            if new.max_bit_depth == 8 && new.chroma_format == ChromaFormat::Yuv420 {
                grew_to_64 || height > height_alloc
            } else {
                height > height_alloc || lcu_grew
            }
        }
        Tracking::Both => width > width_alloc || height > height_alloc,
        Tracking::FrameSize => new.max_frame_size > allocated.frame_size,
    };
    Ok(realloc)
}

static_assertions::const_assert_eq!(WORST_CASE_CU_TU_INFO % CACHELINE_SIZE, 0);
static_assertions::const_assert_eq!(WORST_CASE_CU_TU_INFO_REXT % CACHELINE_SIZE, 0);
static_assertions::assert_impl_all!(BufferKind: Send, Sync, Copy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deblock_line_1080p() {
        let params = SizeParams::hevc(1920, 1080);
        assert_eq!(compute_size(BufferKind::DeblockLine, &params), Ok(61440));
        assert_eq!(compute_size(BufferKind::DeblockTileLine, &params), Ok(61440));
    }

    #[test]
    fn test_sizes_cache_line_multiple() {
        let mut params = SizeParams::hevc(1283, 719);
        params.max_frame_size = 12345;
        for &kind in BufferKind::for_standard(Standard::Hevc) {
            let size = compute_size(kind, &params).unwrap();
            assert_eq!(size % CACHELINE_SIZE, 0, "{}", kind.name());
            assert!(size > 0);
        }

        let mut params = SizeParams::vp9(1283, 719);
        params.max_frame_size = 777;
        for &kind in BufferKind::for_standard(Standard::Vp9) {
            assert_eq!(compute_size(kind, &params).unwrap() % CACHELINE_SIZE, 0);
        }
    }

    #[test]
    fn test_sizes_monotonic() {
        let dims = [(176, 144), (640, 480), (1280, 720), (1920, 1080), (3840, 2160), (8192, 4320)];
        for &kind in BufferKind::for_standard(Standard::Hevc) {
            for lcu in [LcuSize::Lcu16, LcuSize::Lcu32, LcuSize::Lcu64] {
                let mut prev = 0;
                for (w, h) in dims {
                    let params = SizeParams { lcu, max_bit_depth: 10, ..SizeParams::hevc(w, h) };
                    let size = compute_size(kind, &params).unwrap();
                    assert!(size >= prev, "{} shrank at {}x{}", kind.name(), w, h);
                    prev = size;
                }
            }
        }
    }

    #[test]
    fn test_sao_tile_column_rejects_monochrome() {
        let params = SizeParams {
            chroma_format: ChromaFormat::Monochrome,
            ..SizeParams::hevc(1920, 1080)
        };
        assert_eq!(compute_size(BufferKind::SaoTileColumn, &params), Err(Error::InvalidParameter));
        assert!(compute_size(BufferKind::SaoLine, &params).is_ok());
    }

    #[test]
    fn test_kind_not_used_by_standard() {
        assert_eq!(
            compute_size(BufferKind::SegmentId, &SizeParams::hevc(64, 64)),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            compute_size(BufferKind::SaoLine, &SizeParams::vp9(64, 64)),
            Err(Error::InvalidParameter)
        );
        let vp9_422 = SizeParams { chroma_format: ChromaFormat::Yuv422, ..SizeParams::vp9(64, 64) };
        assert_eq!(compute_size(BufferKind::HvdLine, &vp9_422), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_vp9_sizes() {
        let params = SizeParams::vp9(1920, 1080);
        // 30 x 17 superblocks
        assert_eq!(compute_size(BufferKind::DeblockLine, &params), Ok(30 * 18 * 64));
        assert_eq!(compute_size(BufferKind::DeblockTileColumn, &params), Ok(17 * 17 * 64));
        assert_eq!(compute_size(BufferKind::SegmentId, &params), Ok(30 * 17 * 64));
        assert_eq!(compute_size(BufferKind::HvdTile, &params), Ok(30 * 64));
    }

    #[test]
    fn test_realloc_width_kinds() {
        let old = SizeParams::hevc(1920, 1080);
        let new = SizeParams::hevc(3840, 2160);
        let allocated = old.allocated();
        assert_eq!(needs_realloc(BufferKind::DeblockLine, &new, &allocated), Ok(true));
        assert_eq!(needs_realloc(BufferKind::DeblockLine, &old, &allocated), Ok(false));

        let narrower = SizeParams::hevc(1280, 2160);
        assert_eq!(needs_realloc(BufferKind::DeblockLine, &narrower, &allocated), Ok(false));
        assert_eq!(needs_realloc(BufferKind::DeblockTileColumn, &narrower, &allocated), Ok(true));
    }

    #[test]
    fn test_realloc_lcu_growth() {
        let small = SizeParams { lcu: LcuSize::Lcu32, ..SizeParams::hevc(1920, 1080) };
        let allocated = small.allocated();
        let big = SizeParams::hevc(1920, 1080);
        assert_eq!(needs_realloc(BufferKind::SaoLine, &big, &allocated), Ok(true));
        assert_eq!(needs_realloc(BufferKind::MetadataLine, &big, &allocated), Ok(true));
        assert_eq!(needs_realloc(BufferKind::CurrentMvTemporal, &big, &allocated), Ok(false));

        let from16 = SizeParams { lcu: LcuSize::Lcu16, ..small };
        let to32 = small;
        assert_eq!(needs_realloc(BufferKind::MetadataLine, &to32, &from16.allocated()), Ok(false));
        assert_eq!(needs_realloc(BufferKind::SaoLine, &to32, &from16.allocated()), Ok(true));
    }

    #[test]
    fn test_realloc_intra_pred_rule() {
        let from16 = SizeParams { lcu: LcuSize::Lcu16, ..SizeParams::hevc(1920, 1080) };
        let to32 = SizeParams { lcu: LcuSize::Lcu32, ..from16 };
        assert_eq!(
            needs_realloc(BufferKind::IntraPredUpRightColumn, &to32, &from16.allocated()),
            Ok(false)
        );
        let to32_10bit = SizeParams { max_bit_depth: 10, ..to32 };
        assert_eq!(
            needs_realloc(BufferKind::IntraPredUpRightColumn, &to32_10bit, &from16.allocated()),
            Ok(true)
        );
    }

    #[test]
    fn test_realloc_frame_size_and_idempotence() {
        let mut new = SizeParams::hevc(1920, 1080);
        new.max_frame_size = 1000;
        let mut allocated = new.allocated();
        allocated.frame_size = 999;
        let first = needs_realloc(BufferKind::CabacStreamout, &new, &allocated);
        assert_eq!(first, Ok(true));
        assert_eq!(needs_realloc(BufferKind::CabacStreamout, &new, &allocated), first);
        assert_eq!(needs_realloc(BufferKind::CabacStreamout, &new, &new.allocated()), Ok(false));
    }

    #[test]
    fn test_realloc_vp9_superblock_granularity() {
        let allocated = SizeParams::vp9(1900, 1080).allocated();
        // 1920 is still 30 superblocks
        assert_eq!(needs_realloc(BufferKind::HvdLine, &SizeParams::vp9(1920, 1080), &allocated), Ok(false));
        assert_eq!(needs_realloc(BufferKind::HvdLine, &SizeParams::vp9(1921, 1080), &allocated), Ok(true));
        assert_eq!(
            needs_realloc(BufferKind::MvUpRightColumn, &SizeParams::vp9(64, 64), &allocated),
            Err(Error::InvalidParameter)
        );
    }
}
