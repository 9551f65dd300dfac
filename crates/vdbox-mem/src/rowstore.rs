//! # Rowstore Cache Registry
//!
//! The VDBOX has a small on-chip row cache that can stand in for some of the
//! line buffers sized in [`crate::sizing`]. Whether a cache is usable, and at
//! which base address, depends on the picture width, bit depth and chroma
//! format of the current frame.
//!
//! `supported` comes from the platform configuration and never changes.
//! `enabled` / `address` are recomputed by [`RowstoreRegistry::update`] and
//! only ever touched on a supported cache.

use vdbox_core::{ChromaFormat, RowstoreSupport, Standard};

use crate::sizing::BufferKind;

// =============================================================================
// THRESHOLDS / BASE ADDRESSES
// =============================================================================

/// Widest picture served by the first cache partition
pub const PICWIDTH_1920: u32 = 1920;

/// Widest picture served by any cache partition
pub const PICWIDTH_3840: u32 = 3840;

/// HEVC deblocking filter base, non-4:4:4, width <= 1920
pub const HEVC_DF_BASE_NON444_1920: u32 = 64;

/// HEVC SAO base, 8-bit, width <= 1920
pub const HEVC_SAO_BASE_8BIT_1920: u32 = 128;

/// HEVC SAO base, 4:4:4 above 8-bit, width <= 1920
pub const HEVC_SAO_BASE_444_10BIT_1920: u32 = 192;

/// VP9 deblocking filter base, width <= 1920
pub const VP9_DF_BASE_1920: u32 = 64;

/// VP9 DAT base, width <= 1920
pub const VP9_DAT_BASE_1920: u32 = 32;

/// VP9 DAT base, 1920 < width <= 3840
pub const VP9_DAT_BASE_3840: u32 = 128;

/// VDEnc base, 4:4:4 above 8-bit or VP9 1920 < width <= 3840
pub const VDENC_BASE_1920: u32 = 360;

/// VDEnc base, HEVC 1920 < width <= 3840
pub const VDENC_BASE_3840: u32 = 480;

/// VDEnc base, VP9 width <= 1920, not 8-bit 4:2:0 / 4:2:2
pub const VDENC_VP9_BASE_1920: u32 = 180;

/// VDEnc base, VP9 width <= 1920, 8-bit non-4:4:4
pub const VDENC_VP9_BASE_1920_8BIT: u32 = 570;

// =============================================================================
// TYPES
// =============================================================================

/// Rowstore cache partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowstoreKind {
    /// HEVC metadata (DAT)
    HevcDat,
    /// HEVC deblocking filter
    HevcDf,
    /// HEVC SAO
    HevcSao,
    /// VP9 HVD line
    Vp9Hvd,
    /// VP9 metadata (DAT)
    Vp9Dat,
    /// VP9 deblocking filter
    Vp9Df,
    /// VDEnc intra row store
    Vdenc,
}

impl RowstoreKind {
    /// Every partition, in registry order
    pub const ALL: [RowstoreKind; 7] = [
        Self::HevcDat,
        Self::HevcDf,
        Self::HevcSao,
        Self::Vp9Hvd,
        Self::Vp9Dat,
        Self::Vp9Df,
        Self::Vdenc,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Platform flag advertising this partition
    pub const fn support_flag(self) -> RowstoreSupport {
        match self {
            Self::HevcDat => RowstoreSupport::HEVC_DAT,
            Self::HevcDf => RowstoreSupport::HEVC_DF,
            Self::HevcSao => RowstoreSupport::HEVC_SAO,
            Self::Vp9Hvd => RowstoreSupport::VP9_HVD,
            Self::Vp9Dat => RowstoreSupport::VP9_DAT,
            Self::Vp9Df => RowstoreSupport::VP9_DF,
            Self::Vdenc => RowstoreSupport::VDENC,
        }
    }

    /// Scratch buffer the cache stands in for
    pub const fn replaces(self) -> Option<BufferKind> {
        match self {
            Self::HevcDat | Self::Vp9Dat => Some(BufferKind::MetadataLine),
            Self::HevcDf | Self::Vp9Df => Some(BufferKind::DeblockLine),
            Self::HevcSao => Some(BufferKind::SaoLine),
            Self::Vp9Hvd => Some(BufferKind::HvdLine),
            Self::Vdenc => None,
        }
    }

    /// Partition that stands in for `buffer` under `standard`
    pub const fn for_buffer(standard: Standard, buffer: BufferKind) -> Option<RowstoreKind> {
        match (standard, buffer) {
            (Standard::Hevc, BufferKind::MetadataLine) => Some(Self::HevcDat),
            (Standard::Hevc, BufferKind::DeblockLine) => Some(Self::HevcDf),
            (Standard::Hevc, BufferKind::SaoLine) => Some(Self::HevcSao),
            (Standard::Vp9, BufferKind::MetadataLine) => Some(Self::Vp9Dat),
            (Standard::Vp9, BufferKind::DeblockLine) => Some(Self::Vp9Df),
            (Standard::Vp9, BufferKind::HvdLine) => Some(Self::Vp9Hvd),
            _ => None,
        }
    }
}

/// State of one cache partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowstoreCache {
    /// Platform exposes the partition
    pub supported: bool,
    /// Partition serves the current frame
    pub enabled: bool,
    /// Base address within the cache, in cache lines
    pub address: u32,
}

/// Frame geometry the rowstore rules depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowstoreParams {
    /// Codec standard
    pub standard: Standard,
    /// Picture width in pixels
    pub width: u32,
    /// Bit depth minus eight
    pub bit_depth_minus8: u8,
    /// Chroma format
    pub chroma_format: ChromaFormat,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Per-partition rowstore state
#[derive(Debug, Clone)]
pub struct RowstoreRegistry {
    caches: [RowstoreCache; 7],
}

impl RowstoreRegistry {
    /// Create a registry; `support` is fixed for the registry's lifetime
    pub fn new(support: RowstoreSupport) -> Self {
        let mut caches = [RowstoreCache::default(); 7];
        for kind in RowstoreKind::ALL {
            caches[kind.index()].supported = support.contains(kind.support_flag());
        }
        Self { caches }
    }

    /// Current state of a partition
    pub fn get(&self, kind: RowstoreKind) -> RowstoreCache {
        self.caches[kind.index()]
    }

    /// Base address when the partition is enabled
    pub fn enabled_address(&self, kind: RowstoreKind) -> Option<u32> {
        let cache = self.get(kind);
        cache.enabled.then_some(cache.address)
    }

    /// Whether the scratch buffer for `buffer` is served from the cache
    pub fn covers(&self, standard: Standard, buffer: BufferKind) -> bool {
        RowstoreKind::for_buffer(standard, buffer).is_some_and(|kind| self.get(kind).enabled)
    }

    /// Recompute enable state and addresses for a frame
    pub fn update(&mut self, params: &RowstoreParams) {
        match params.standard {
            Standard::Hevc => self.update_hevc(params),
            Standard::Vp9 => self.update_vp9(params),
        }
        self.update_vdenc(params);

        log::debug!(
            "rowstore {:?} w={}: dat={:?} df={:?} sao={:?} vdenc={:?}",
            params.standard,
            params.width,
            self.enabled_address(RowstoreKind::HevcDat),
            self.enabled_address(RowstoreKind::HevcDf),
            self.enabled_address(RowstoreKind::HevcSao),
            self.enabled_address(RowstoreKind::Vdenc),
        );
    }

    fn set(&mut self, kind: RowstoreKind, enabled: bool, address: u32) {
        let cache = &mut self.caches[kind.index()];
        if cache.supported {
            cache.enabled = enabled;
            cache.address = if enabled { address } else { 0 };
        }
    }

    fn update_hevc(&mut self, p: &RowstoreParams) {
        let is_444 = p.chroma_format == ChromaFormat::Yuv444;

        // (dat, df, sao) as (enabled, address)
        let (dat, df, sao) = if p.width <= PICWIDTH_1920 {
            match (p.bit_depth_minus8 > 0, is_444) {
                (true, true) => ((true, 0), (false, 0), (true, HEVC_SAO_BASE_444_10BIT_1920)),
                (true, false) => ((true, 0), (true, HEVC_DF_BASE_NON444_1920), (false, 0)),
                (false, true) => ((false, 0), (true, 0), (true, HEVC_SAO_BASE_8BIT_1920)),
                (false, false) => (
                    (true, 0),
                    (true, HEVC_DF_BASE_NON444_1920),
                    (true, HEVC_SAO_BASE_8BIT_1920),
                ),
            }
        } else if p.width <= PICWIDTH_3840 {
            ((false, 0), (false, 0), (true, 0))
        } else {
            ((false, 0), (false, 0), (false, 0))
        };

        self.set(RowstoreKind::HevcDat, dat.0, dat.1);
        self.set(RowstoreKind::HevcDf, df.0, df.1);
        self.set(RowstoreKind::HevcSao, sao.0, sao.1);
    }

    fn update_vp9(&mut self, p: &RowstoreParams) {
        if p.width > PICWIDTH_3840 {
            self.set(RowstoreKind::Vp9Hvd, false, 0);
            self.set(RowstoreKind::Vp9Dat, false, 0);
            self.set(RowstoreKind::Vp9Df, false, 0);
            return;
        }

        self.set(RowstoreKind::Vp9Hvd, true, 0);

        let small_420_8bit =
            p.chroma_format == ChromaFormat::Yuv420 && p.bit_depth_minus8 == 0 && p.width <= PICWIDTH_1920;
        if small_420_8bit {
            self.set(RowstoreKind::Vp9Dat, false, 0);
            self.set(RowstoreKind::Vp9Df, true, VP9_DF_BASE_1920);
        } else {
            let dat = if p.width <= PICWIDTH_1920 { VP9_DAT_BASE_1920 } else { VP9_DAT_BASE_3840 };
            self.set(RowstoreKind::Vp9Dat, true, dat);
            self.set(RowstoreKind::Vp9Df, false, 0);
        }
    }

    fn update_vdenc(&mut self, p: &RowstoreParams) {
        let high = p.bit_depth_minus8 > 0;
        let is_444 = p.chroma_format == ChromaFormat::Yuv444;

        let address = match p.standard {
            Standard::Hevc if p.width > PICWIDTH_1920 && p.width <= PICWIDTH_3840 => Some(VDENC_BASE_3840),
            Standard::Hevc if p.width <= PICWIDTH_1920 && is_444 && high => Some(VDENC_BASE_1920),
            Standard::Hevc => None,
            Standard::Vp9 if p.width <= PICWIDTH_1920 => {
                if !high && !is_444 {
                    Some(VDENC_VP9_BASE_1920_8BIT)
                } else {
                    Some(VDENC_VP9_BASE_1920)
                }
            }
            Standard::Vp9 if p.width <= PICWIDTH_3840 => Some(VDENC_BASE_1920),
            Standard::Vp9 => None,
        };

        match address {
            Some(addr) => self.set(RowstoreKind::Vdenc, true, addr),
            None => self.set(RowstoreKind::Vdenc, false, 0),
        }
    }
}
