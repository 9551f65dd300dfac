//! # VDBOX Core Types
//!
//! Fundamental type definitions used across the encode stack.
//!
//! These types provide:
//! - Strong typing for GPU addresses and resource handles
//! - Hardware enumerations (chroma format, LCU size, generation)
//! - Alignment helpers shared by sizing and partitioning code

use core::fmt;
use core::ops::Add;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Hardware cache line size in bytes
pub const CACHELINE_SIZE: u32 = 64;

/// Page size used for page-aligned statistics regions
pub const PAGE_SIZE: u32 = 4096;

/// Bitrate unit of the DDI layer (kbps to bps)
pub const BRC_KBPS: u32 = 1000;

/// Largest QP for 8-bit HEVC
pub const MAX_QP_8BIT: u8 = 51;

/// Round `value` up to a power-of-two `alignment`
#[inline]
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Round `value` up to a power-of-two `alignment` (64-bit)
#[inline]
pub const fn align_up_u64(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Ceiling division
#[inline]
pub const fn div_ceil(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

// =============================================================================
// GPU ADDRESS
// =============================================================================

/// GPU Virtual Address
///
/// This is an address in the GPU's graphics address space, as written into
/// buffer-address command fields. It is not a CPU pointer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GpuAddr(u64);

impl GpuAddr {
    /// Create a new GPU address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null GPU address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Low dword as written into command address fields
    #[inline]
    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    /// High dword as written into command address fields
    #[inline]
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl Add<u64> for GpuAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr(0x{:016x})", self.0)
    }
}

impl fmt::Display for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// RESOURCE HANDLE
// =============================================================================

/// Opaque handle issued by the resource allocator collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ResourceHandle(u32);

impl ResourceHandle {
    /// Wrap a raw allocator handle
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw handle value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// =============================================================================
// CHROMA FORMAT
// =============================================================================

/// Chroma subsampling, encoded as the HCP chroma-format field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ChromaFormat {
    /// Luma only
    Monochrome = 0,
    /// 4:2:0
    #[default]
    Yuv420 = 1,
    /// 4:2:2
    Yuv422 = 2,
    /// 4:4:4
    Yuv444 = 3,
}

impl ChromaFormat {
    /// Decode the HCP chroma-format idc
    pub const fn from_idc(idc: u8) -> Option<Self> {
        match idc {
            0 => Some(Self::Monochrome),
            1 => Some(Self::Yuv420),
            2 => Some(Self::Yuv422),
            3 => Some(Self::Yuv444),
            _ => None,
        }
    }

    /// HCP chroma-format idc
    #[inline]
    pub const fn idc(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// LCU SIZE
// =============================================================================

/// Largest coding unit (CTB) size supported by the HCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LcuSize {
    /// 16x16
    Lcu16,
    /// 32x32
    Lcu32,
    /// 64x64
    Lcu64,
}

impl LcuSize {
    /// From log2 of the CTB size
    pub const fn from_log2(log2: u8) -> Option<Self> {
        match log2 {
            4 => Some(Self::Lcu16),
            5 => Some(Self::Lcu32),
            6 => Some(Self::Lcu64),
            _ => None,
        }
    }

    /// log2 of the CTB size
    #[inline]
    pub const fn log2(self) -> u8 {
        match self {
            Self::Lcu16 => 4,
            Self::Lcu32 => 5,
            Self::Lcu64 => 6,
        }
    }

    /// CTB size in pixels
    #[inline]
    pub const fn pixels(self) -> u32 {
        1 << self.log2()
    }

    /// Column index into the per-LCU-size constant tables
    #[inline]
    pub const fn table_index(self) -> usize {
        (self.log2() - 4) as usize
    }
}

// =============================================================================
// GENERATION / STANDARD
// =============================================================================

/// Silicon generation of the VDBOX
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generation {
    /// Gen9 (HCP without VDEnc HEVC)
    Gen9,
    /// Gen11 (Ice Lake)
    Gen11,
    /// Gen12 (Tiger Lake)
    Gen12,
}

impl Generation {
    /// Human readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gen9 => "gen9",
            Self::Gen11 => "gen11",
            Self::Gen12 => "gen12",
        }
    }
}

/// Video standard driven through the HCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Standard {
    /// H.265 / HEVC
    Hevc,
    /// VP9
    Vp9,
}

// =============================================================================
// PICTURE / SLICE TYPES
// =============================================================================

/// Picture coding type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodingType {
    /// Intra picture
    #[default]
    I,
    /// Predicted picture
    P,
    /// Bi-predicted picture
    B,
}

/// HEVC slice type as encoded in HCP_SLICE_STATE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SliceType {
    /// B slice
    B = 0,
    /// P slice
    P = 1,
    /// I slice
    #[default]
    I = 2,
}

// =============================================================================
// FRAME GEOMETRY
// =============================================================================

/// Picture dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    /// Create a frame size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width in CTBs of the given size
    #[inline]
    pub const fn width_in_lcu(self, lcu: LcuSize) -> u32 {
        div_ceil(self.width, lcu.pixels())
    }

    /// Height in CTBs of the given size
    #[inline]
    pub const fn height_in_lcu(self, lcu: LcuSize) -> u32 {
        div_ceil(self.height, lcu.pixels())
    }

    /// Total CTBs in the picture
    #[inline]
    pub const fn lcu_count(self, lcu: LcuSize) -> u32 {
        self.width_in_lcu(lcu) * self.height_in_lcu(lcu)
    }
}
