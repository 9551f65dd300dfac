//! # BRC Constant Tables
//!
//! Threshold and gain tables copied verbatim into the DMEM blocks, plus the
//! coefficients of the closed-form deviation thresholds.

// =============================================================================
// DEVIATION THRESHOLDS
// =============================================================================

/// Deviation thresholds per table (negative half + positive half)
pub const NUM_DEV_THRESHOLDS: usize = 8;

/// Frame rate the deviation curves were tuned at
pub const DEV_STD_FPS: f64 = 30.0;

/// Lower clamp of the bits-per-frame to VBV ratio
pub const BPS_RATIO_LOW: f64 = 0.1;

/// Upper clamp of the bits-per-frame to VBV ratio
pub const BPS_RATIO_HIGH: f64 = 3.5;

/// Multiplier of the positive P/B (and I) thresholds
pub const POS_MULT_PB: f64 = 50.0;

/// Multiplier of every negative threshold
pub const NEG_MULT_PB: f64 = -50.0;

/// Multiplier of the positive VBR thresholds
pub const POS_MULT_VBR: f64 = 100.0;

/// I picture curve, negative side
pub const DEV_THRESH_I_NEG: [f64; 4] = [0.80, 0.60, 0.34, 0.2];
/// I picture curve, positive side
pub const DEV_THRESH_I_POS: [f64; 4] = [0.2, 0.4, 0.66, 0.9];
/// P/B picture curve, negative side
pub const DEV_THRESH_PB_NEG: [f64; 4] = [0.90, 0.66, 0.46, 0.3];
/// P/B picture curve, positive side
pub const DEV_THRESH_PB_POS: [f64; 4] = [0.3, 0.46, 0.70, 0.90];
/// VBR curve, negative side
pub const DEV_THRESH_VBR_NEG: [f64; 4] = [0.90, 0.70, 0.50, 0.3];
/// VBR curve, positive side
pub const DEV_THRESH_VBR_POS: [f64; 4] = [0.4, 0.5, 0.75, 0.90];

/// Fixed P/B thresholds of the low-delay algorithm
pub const LOW_DELAY_DEV_THRESH_PB: [i8; 8] = [-45, -33, -23, -15, -8, 0, 15, 25];
/// Fixed VBR thresholds of the low-delay algorithm
pub const LOW_DELAY_DEV_THRESH_VBR: [i8; 8] = [-45, -35, -25, -15, -8, 0, 20, 40];
/// Fixed I thresholds of the low-delay algorithm
pub const LOW_DELAY_DEV_THRESH_I: [i8; 8] = [-40, -30, -17, -10, -5, 0, 10, 20];

// =============================================================================
// RATE THRESHOLDS
// =============================================================================

/// Instantaneous rate thresholds, P pictures
pub const INST_RATE_THRESH_P: [i8; 4] = [40, 60, 80, 120];
/// Instantaneous rate thresholds, B pictures
pub const INST_RATE_THRESH_B: [i8; 4] = [35, 60, 80, 120];
/// Instantaneous rate thresholds, I pictures
pub const INST_RATE_THRESH_I: [i8; 4] = [40, 60, 90, 115];

/// Estimated rate thresholds (same for every picture type)
pub const EST_RATE_THRESH: [u8; 7] = [4, 8, 12, 16, 20, 24, 28];

// =============================================================================
// GAIN ADJUSTMENT
// =============================================================================

/// Frame counts where the gain adjustment steps
pub const START_G_ADJ_FRAME: [u16; 4] = [10, 50, 100, 150];
/// Gain adjustment multipliers
pub const START_G_ADJ_MULT: [u8; 5] = [1, 1, 3, 2, 1];
/// Gain adjustment divisors
pub const START_G_ADJ_DIV: [u8; 5] = [40, 5, 5, 3, 1];

/// Rate ratio buckets in percent
pub const RATE_RATIO_THRESHOLD: [u8; 7] = [40, 75, 97, 103, 125, 160, 0];
/// QP delta per rate ratio bucket (two's complement)
pub const RATE_RATIO_THRESHOLD_QP: [u8; 8] = [253, 254, 255, 0, 1, 2, 3, 0];

// =============================================================================
// ADAPTIVE SECOND PASS / SLIDING WINDOW
// =============================================================================

/// Upper frame-size threshold for the adaptive second pass
pub const TOP_FRM_SZ_THR_FOR_ADAPT_2PASS: u8 = 32;
/// Lower frame-size threshold for the adaptive second pass
pub const BOT_FRM_SZ_THR_FOR_ADAPT_2PASS: u8 = 24;
/// Upper QP delta threshold for the adaptive second pass
pub const TOP_QP_DELTA_THR_FOR_ADAPT_2PASS: u8 = 2;
/// Lower QP delta threshold for the adaptive second pass
pub const BOT_QP_DELTA_THR_FOR_ADAPT_2PASS: u8 = 1;

/// Longest sliding window in frames
pub const MAX_SLIDING_WINDOW: u32 = 60;
/// Sliding window maximum rate ratio in percent
pub const SLIDING_WINDOW_MAX_RATE_RATIO: u8 = 120;

// =============================================================================
// UPDATE DEFAULTS
// =============================================================================

/// QP deltas for the four SAD zones when CU-level BRC is on
pub const SAD_ZONE_DELTA_QP: [i8; 4] = [-5, -2, 2, 5];
/// QP delta for zero motion
pub const MV_ZERO_DELTA_QP: i8 = -4;
/// QP deltas for the three motion zones
pub const MV_ZONE_DELTA_QP: [i8; 3] = [-2, 0, 2];

/// Scene change threshold on the previous picture's intra percentage
pub const SCENE_CHG_PREV_INTRA_PCT: u8 = 96;
/// Scene change threshold on the current picture's intra percentage
pub const SCENE_CHG_CUR_INTRA_PCT: u8 = 192;

/// Re-encode when the QP rises by more than this
pub const RE_ENCODE_POSITIVE_QP_DELTA: i8 = 4;
/// Re-encode when the QP drops by more than this
pub const RE_ENCODE_NEGATIVE_QP_DELTA: i8 = -10;

/// Weight histogram block size in the VDEnc statistics (256 dwords)
pub const WEIGHT_HIST_SIZE: u16 = 1024;

/// Default log2 weight denominator under weighted prediction
pub const DEFAULT_LOG2_WEIGHT_DENOM: i8 = 6;

/// CTB size the firmware assumes in its update math
pub const FIRMWARE_LOG_LCU_SIZE: u8 = 6;

// =============================================================================
// LEVEL LIMITS
// =============================================================================

/// Per-level maximum luma sample rate and picture size in bytes
///
/// Keyed by general_level_idc. Unknown levels fall back to level 3.0.
pub const fn level_limits(level_idc: u8) -> (u64, u64) {
    match level_idc {
        30 => (552_960, 36_864),
        60 => (3_686_400, 122_880),
        63 => (7_372_800, 245_760),
        90 => (16_588_800, 552_760),
        93 => (33_177_600, 983_040),
        120 => (66_846_720, 2_228_224),
        123 => (133_693_440, 2_228_224),
        150 => (267_386_880, 8_912_896),
        153 => (534_773_760, 8_912_896),
        156 => (1_069_547_520, 8_912_896),
        180 => (1_069_547_520, 35_651_584),
        183 => (2_139_095_040, 35_651_584),
        186 => (4_278_190_080, 35_651_584),
        _ => (16_588_800, 552_760),
    }
}

/// Slices a picture of the level may carry, 0 when the level is unknown
///
/// `level` is general_level_idc / 3 (41 for level 4.1).
pub const fn max_slices_for_level(level: u8) -> u16 {
    match level {
        10 | 20 => 16,
        21 => 20,
        30 => 30,
        31 => 40,
        40 | 41 => 75,
        50..=52 => 200,
        60..=62 => 600,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_limits_fallback() {
        assert_eq!(level_limits(123), (133_693_440, 2_228_224));
        assert_eq!(level_limits(7), level_limits(90));
    }

    #[test]
    fn test_max_slices() {
        assert_eq!(max_slices_for_level(41), 75);
        assert_eq!(max_slices_for_level(51), 200);
        assert_eq!(max_slices_for_level(99), 0);
    }
}
