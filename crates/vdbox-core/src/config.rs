//! # Encoder Configuration
//!
//! Per-device configuration, built once from a preset and the user settings.
//!
//! ```text
//! EncoderConfig::gen12()  ──►  from_settings(&settings)  ──►  validate()
//!     (const preset)           (registry overrides)          (range checks)
//! ```

use crate::error::{Error, Result};
use crate::traits::SettingsSource;
use crate::types::Generation;

// =============================================================================
// SETTING KEYS
// =============================================================================

/// User-setting keys read by [`EncoderConfig::from_settings`]
pub mod keys {
    /// Disable the HEVC deblocking-line rowstore cache
    pub const DISABLE_HEVC_DAT_ROWSTORE: &str = "Disable HEVC DAT RowStore Cache";
    /// Disable the HEVC deblocking-filter rowstore cache
    pub const DISABLE_HEVC_DF_ROWSTORE: &str = "Disable HEVC DF RowStore Cache";
    /// Disable the HEVC SAO rowstore cache
    pub const DISABLE_HEVC_SAO_ROWSTORE: &str = "Disable HEVC SAO RowStore Cache";
    /// Disable the VP9 HVD rowstore cache
    pub const DISABLE_VP9_HVD_ROWSTORE: &str = "Disable VP9 HVD RowStore Cache";
    /// Disable the VP9 DAT rowstore cache
    pub const DISABLE_VP9_DAT_ROWSTORE: &str = "Disable VP9 DAT RowStore Cache";
    /// Disable the VP9 DF rowstore cache
    pub const DISABLE_VP9_DF_ROWSTORE: &str = "Disable VP9 DF RowStore Cache";
    /// Disable the VDEnc rowstore cache
    pub const DISABLE_VDENC_ROWSTORE: &str = "Disable VDENC RowStore Cache";
    /// Recycle ring depth
    pub const RECYCLE_DEPTH: &str = "Encode Recycle Buffer Depth";
    /// Maximum BRC PAK passes
    pub const BRC_PASSES: &str = "HEVC VDEnc BRC Passes";
    /// Tile replay override
    pub const TILE_REPLAY: &str = "HEVC VDEnc Tile Replay Enable";
    /// RDOQ override
    pub const RDOQ: &str = "HEVC RDOQ Enable";
}

// =============================================================================
// LIMITS
// =============================================================================

/// Largest recycle ring accepted
pub const MAX_RECYCLE_DEPTH: u32 = 16;

/// Largest BRC pass count accepted
pub const MAX_BRC_PASSES: u8 = 4;

bitflags::bitflags! {
    /// Rowstore caches the platform exposes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RowstoreSupport: u32 {
        /// HEVC deblocking line (DAT)
        const HEVC_DAT = 1 << 0;
        /// HEVC deblocking filter
        const HEVC_DF = 1 << 1;
        /// HEVC SAO
        const HEVC_SAO = 1 << 2;
        /// VP9 HVD line
        const VP9_HVD = 1 << 3;
        /// VP9 DAT
        const VP9_DAT = 1 << 4;
        /// VP9 deblocking filter
        const VP9_DF = 1 << 5;
        /// VDEnc line
        const VDENC = 1 << 6;
    }
}

// =============================================================================
// ENCODER CONFIG
// =============================================================================

/// Encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Silicon generation
    pub generation: Generation,
    /// Recycle ring depth
    pub recycle_depth: u32,
    /// Maximum BRC PAK passes per frame
    pub brc_passes: u8,
    /// Rowstore caches the platform supports
    pub rowstore: RowstoreSupport,
    /// Tile replay (per-tile BRC passes)
    pub tile_replay: bool,
    /// Rate-distortion optimized quantization
    pub rdoq: bool,
    /// Staging command buffer capacity in bytes
    pub staging_capacity: u32,
    /// Configuration name for debugging
    pub name: &'static str,
}

impl EncoderConfig {
    /// Gen9 configuration (terminal, no VDEnc HEVC)
    pub const fn gen9() -> Self {
        Self {
            generation: Generation::Gen9,
            recycle_depth: 6,
            brc_passes: 1,
            rowstore: RowstoreSupport::empty(),
            tile_replay: false,
            rdoq: false,
            staging_capacity: 64 * 1024,
            name: "gen9",
        }
    }

    /// Gen11 configuration
    pub const fn gen11() -> Self {
        Self {
            generation: Generation::Gen11,
            recycle_depth: 6,
            brc_passes: 2,
            rowstore: RowstoreSupport::all(),
            tile_replay: false,
            rdoq: true,
            staging_capacity: 256 * 1024,
            name: "gen11",
        }
    }

    /// Gen12 configuration
    pub const fn gen12() -> Self {
        Self {
            generation: Generation::Gen12,
            recycle_depth: 6,
            brc_passes: 2,
            rowstore: RowstoreSupport::all(),
            tile_replay: true,
            rdoq: true,
            staging_capacity: 256 * 1024,
            name: "gen12",
        }
    }

    /// Preset for a generation
    pub const fn for_generation(generation: Generation) -> Self {
        match generation {
            Generation::Gen9 => Self::gen9(),
            Generation::Gen11 => Self::gen11(),
            Generation::Gen12 => Self::gen12(),
        }
    }

    /// Apply user-setting overrides
    ///
    /// Rowstore keys can only disable a cache the preset supports.
    pub fn from_settings(mut self, settings: &dyn SettingsSource) -> Self {
        const ROWSTORE_KEYS: [(&str, RowstoreSupport); 7] = [
            (keys::DISABLE_HEVC_DAT_ROWSTORE, RowstoreSupport::HEVC_DAT),
            (keys::DISABLE_HEVC_DF_ROWSTORE, RowstoreSupport::HEVC_DF),
            (keys::DISABLE_HEVC_SAO_ROWSTORE, RowstoreSupport::HEVC_SAO),
            (keys::DISABLE_VP9_HVD_ROWSTORE, RowstoreSupport::VP9_HVD),
            (keys::DISABLE_VP9_DAT_ROWSTORE, RowstoreSupport::VP9_DAT),
            (keys::DISABLE_VP9_DF_ROWSTORE, RowstoreSupport::VP9_DF),
            (keys::DISABLE_VDENC_ROWSTORE, RowstoreSupport::VDENC),
        ];

        for (key, flag) in ROWSTORE_KEYS {
            if settings.read_bool(key) == Some(true) {
                self.rowstore.remove(flag);
            }
        }

        if let Some(depth) = settings.read_u32(keys::RECYCLE_DEPTH) {
            self.recycle_depth = depth;
        }
        if let Some(passes) = settings.read_u32(keys::BRC_PASSES) {
            self.brc_passes = passes.min(u8::MAX as u32) as u8;
        }
        if let Some(replay) = settings.read_bool(keys::TILE_REPLAY) {
            self.tile_replay = replay;
        }
        if let Some(rdoq) = settings.read_bool(keys::RDOQ) {
            self.rdoq = rdoq;
        }

        log::debug!(
            "vdbox config {}: rowstore={:?} recycle={} passes={}",
            self.name,
            self.rowstore,
            self.recycle_depth,
            self.brc_passes
        );
        self
    }

    /// Range-check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.recycle_depth == 0 || self.recycle_depth > MAX_RECYCLE_DEPTH {
            return Err(Error::InvalidParameter);
        }
        if self.brc_passes == 0 || self.brc_passes > MAX_BRC_PASSES {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::gen12()
    }
}
