//! # BRC Update
//!
//! Per-pass update DMEM block. The firmware reads it together with the
//! previous pass statistics and rewrites the QPs inside the second-level
//! batch, so the block also carries the byte offsets of the commands it
//! patches.

use vdbox_core::{
    CodingType, Conflict, Error, FrameSizeTolerance, Generation, MbBrcMode, PictureParams, RateControlMode, Result,
    SequenceParams, SliceParams,
};

use crate::dmem::BrcUpdateDmem;
use crate::init::{lcu_brc_enabled, validate};
use crate::tables::*;

/// Weight histogram blocks rotated between the current picture and its references
pub const HISTORY_BLOCKS: u32 = 4;

/// `OpMode` bit: bitrate control (ACQP included)
pub const OP_MODE_BRC: u8 = 0x1;
/// `OpMode` bit: weighted prediction
pub const OP_MODE_WP: u8 = 0x2;
/// `OpMode` value of tile-replay BRC
pub const OP_MODE_TILE_REPLAY: u8 = 0x8;

/// Command offset the firmware must leave alone
pub const NO_PATCH: u16 = 0xFFFF;

// =============================================================================
// FRAME TYPE
// =============================================================================

/// Picture class the firmware keeps separate statistics for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// P picture or low-delay B
    PorLowDelayB = 0,
    /// Random-access B, first pyramid level
    B = 1,
    /// Intra picture
    I = 2,
    /// Second pyramid level
    B1 = 3,
    /// Third pyramid level
    B2 = 4,
}

impl FrameType {
    /// Classify a picture for the given generation
    ///
    /// Gen11 firmware only separates intra pictures. Gen12 follows the
    /// hierarchy level when a pyramid is in use; a hierarchy level outside
    /// 1..=4, or a low-delay picture on the fourth level, is rejected.
    pub fn classify(gen: Generation, seq: &SequenceParams, pic: &PictureParams) -> Result<Self> {
        if pic.coding_type == CodingType::I {
            return Ok(Self::I);
        }
        if gen != Generation::Gen12 {
            return Ok(Self::PorLowDelayB);
        }

        let pyramid = seq.hierarchical && seq.gop_ref_dist != 3;
        if !pyramid {
            return Ok(match pic.coding_type {
                CodingType::B if !seq.low_delay => Self::B,
                _ => Self::PorLowDelayB,
            });
        }

        match pic.hierarchical_level_plus1 {
            0 if seq.low_delay => Ok(Self::PorLowDelayB),
            0 => Ok(match pic.coding_type {
                CodingType::B => Self::B,
                _ => Self::PorLowDelayB,
            }),
            1 => Ok(Self::PorLowDelayB),
            2 => Ok(Self::B),
            3 => Ok(Self::B1),
            4 if !seq.low_delay => Ok(Self::B2),
            level => {
                log::debug!("hierarchy level {} not representable (low delay {})", level, seq.low_delay);
                Err(Error::InvalidParameter)
            }
        }
    }
}

// =============================================================================
// INPUTS
// =============================================================================

/// Where the patched commands sit inside the second-level batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchLayout {
    /// Bytes of the batch the firmware reads
    pub slb_data_size: u16,
    /// First command group offset
    pub cmd1_start: u16,
    /// Second command group offset
    pub cmd2_start: u16,
    /// HCP_PIC_STATE offset
    pub pic_state_start: u16,
}

/// Everything one update pass depends on
#[derive(Debug, Clone, Copy)]
pub struct UpdateInputs<'a> {
    /// Hardware generation
    pub generation: Generation,
    /// Sequence parameters
    pub seq: &'a SequenceParams,
    /// Picture parameters
    pub pic: &'a PictureParams,
    /// Slices of the picture, first slice supplies the reference counts
    pub slices: &'a [SliceParams],
    /// Frame number, starts at 1
    pub frame_id: u32,
    /// Pass index, 0-based
    pub pass: u8,
    /// Passes the frame may take
    pub max_passes: u8,
    /// Weighted prediction runs on the GPU for this picture
    pub weighted_prediction: bool,
    /// Tile-replay BRC
    pub tile_replay: bool,
    /// Command positions in the batch
    pub batch: BatchLayout,
}

// =============================================================================
// UPDATE BLOCK
// =============================================================================

/// Build the update DMEM block of one pass
pub fn build_update_dmem(inputs: &UpdateInputs<'_>) -> Result<BrcUpdateDmem> {
    let seq = inputs.seq;
    let pic = inputs.pic;

    validate(seq)?;
    if inputs.max_passes == 0 || inputs.pass >= inputs.max_passes {
        return Err(Conflict::PassOutOfRange.into());
    }
    let first = inputs.slices.first().ok_or(Error::NullParameter)?;
    if inputs.slices.len() > u8::MAX as usize {
        return Err(Error::InvalidParameter);
    }

    let low_delay_brc = seq.frame_size_tolerance == FrameSizeTolerance::ExtremelyLow;
    let frame_type = FrameType::classify(inputs.generation, seq, pic)?;

    let mut dmem = BrcUpdateDmem {
        target_size: if low_delay_brc {
            seq.init_vbv_fullness_bits
        } else {
            seq.init_vbv_fullness_bits.min(seq.vbv_buffer_size_bits)
        },
        frame_id: inputs.frame_id,
        start_g_adj_frame: START_G_ADJ_FRAME,
        target_slice_size: pic.max_slice_size_bytes.min(u16::MAX as u32) as u16,
        slb_data_size_in_bytes: inputs.batch.slb_data_size,
        pic_state_start_in_bytes: inputs.batch.pic_state_start,
        cmd1_start_in_bytes: inputs.batch.cmd1_start,
        cmd2_start_in_bytes: inputs.batch.cmd2_start,
        pipe_mode_select_start_in_bytes: NO_PATCH,
        max_num_slice_allowed: max_slices_for_level(seq.level_idc / 3),
        current_frame_type: frame_type as u8,
        num_ref_l0: first.num_ref_idx_l0_active_minus1 + 1,
        num_ref_l1: first.num_ref_idx_l1_active_minus1 + 1,
        num_slices: inputs.slices.len() as u8,
        cqp_qp_value: (pic.qp_y as i16 + first.slice_qp_delta as i16).clamp(0, u8::MAX as i16) as u8,
        cqp_frac_qp: 0,
        max_num_pass: inputs.max_passes,
        g_rate_ratio_threshold: RATE_RATIO_THRESHOLD,
        start_g_adj_mult: START_G_ADJ_MULT,
        start_g_adj_div: START_G_ADJ_DIV,
        g_rate_ratio_threshold_qp: RATE_RATIO_THRESHOLD_QP,
        scene_chg_prev_intra_pct_threshold: SCENE_CHG_PREV_INTRA_PCT,
        scene_chg_cur_intra_pct_threshold: SCENE_CHG_CUR_INTRA_PCT,
        ip_average_coeff: if low_delay_brc { 0 } else { 64 },
        current_pass: inputs.pass,
        disabled_feature: 0,
        sliding_window_enable: (seq.frame_size_tolerance == FrameSizeTolerance::Low) as u8,
        log_lcu_size: FIRMWARE_LOG_LCU_SIZE,
        re_encode_positive_qp_delta_thr: RE_ENCODE_POSITIVE_QP_DELTA,
        re_encode_negative_qp_delta_thr: match inputs.generation {
            Generation::Gen12 => RE_ENCODE_NEGATIVE_QP_DELTA,
            _ => -5,
        },
        ..BrcUpdateDmem::default()
    };

    // Current picture and references rotate through four histogram blocks
    // in the order 0, 3, 2, 1
    let circular = inputs.frame_id.wrapping_sub(1) % HISTORY_BLOCKS;
    let block = |k: u32| (((k + circular) % HISTORY_BLOCKS) as u16) * WEIGHT_HIST_SIZE;
    dmem.current_data_offset = block(0);
    dmem.ref_data_offset[0] = block(3);
    dmem.ref_data_offset[1] = block(2);
    dmem.ref_data_offset[2] = block(1);

    dmem.op_mode = if inputs.tile_replay && inputs.generation == Generation::Gen12 {
        OP_MODE_TILE_REPLAY
    } else if inputs.weighted_prediction && inputs.pass > 0 {
        OP_MODE_BRC | OP_MODE_WP
    } else {
        OP_MODE_BRC
    };

    let qp_adjust = seq.rate_control == RateControlMode::Icq && seq.qp_adjustment;
    if qp_adjust || seq.mb_brc != MbBrcMode::Disabled || lcu_brc_enabled(seq, pic) {
        [
            dmem.delta_qp_for_sad_zone0,
            dmem.delta_qp_for_sad_zone1,
            dmem.delta_qp_for_sad_zone2,
            dmem.delta_qp_for_sad_zone3,
        ] = SAD_ZONE_DELTA_QP;
        dmem.delta_qp_for_mv_zero = MV_ZERO_DELTA_QP;
        [dmem.delta_qp_for_mv_zone0, dmem.delta_qp_for_mv_zone1, dmem.delta_qp_for_mv_zone2] = MV_ZONE_DELTA_QP;
    }

    if inputs.weighted_prediction {
        dmem.luma_log2_weight_denom = DEFAULT_LOG2_WEIGHT_DENOM;
        dmem.chroma_log2_weight_denom = DEFAULT_LOG2_WEIGHT_DENOM;
    }

    log::trace!(
        "BRC update frame {} pass {}/{}: type {:?}, op mode {:#x}",
        inputs.frame_id,
        inputs.pass,
        inputs.max_passes,
        frame_type,
        dmem.op_mode
    );
    Ok(dmem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::{FrameRate, SliceType};

    fn cbr() -> SequenceParams {
        SequenceParams {
            rate_control: RateControlMode::Cbr,
            target_bitrate_kbps: 4000,
            max_bitrate_kbps: 4000,
            vbv_buffer_size_bits: 4_000_000,
            init_vbv_fullness_bits: 8_000_000,
            frame_rate: FrameRate::new(30, 1),
            ..SequenceParams::default()
        }
    }

    fn p_slice() -> SliceParams {
        SliceParams {
            slice_type: SliceType::P,
            num_ref_idx_l0_active_minus1: 1,
            slice_qp_delta: -2,
            ..SliceParams::default()
        }
    }

    fn inputs<'a>(
        seq: &'a SequenceParams,
        pic: &'a PictureParams,
        slices: &'a [SliceParams],
        pass: u8,
    ) -> UpdateInputs<'a> {
        UpdateInputs {
            generation: Generation::Gen12,
            seq,
            pic,
            slices,
            frame_id: 6,
            pass,
            max_passes: 2,
            weighted_prediction: false,
            tile_replay: false,
            batch: BatchLayout {
                slb_data_size: 1024,
                cmd1_start: 128,
                cmd2_start: 512,
                pic_state_start: 256,
            },
        }
    }

    #[test]
    fn test_update_block() {
        let seq = cbr();
        let pic = PictureParams {
            coding_type: CodingType::P,
            qp_y: 30,
            ..PictureParams::default()
        };
        let slices = [p_slice(), p_slice()];
        let dmem = build_update_dmem(&inputs(&seq, &pic, &slices, 1)).unwrap();

        assert_eq!(dmem.target_size, 4_000_000);
        assert_eq!(dmem.frame_id, 6);
        assert_eq!(dmem.pipe_mode_select_start_in_bytes, NO_PATCH);
        assert_eq!(dmem.pic_state_start_in_bytes, 256);
        assert_eq!(dmem.max_num_slice_allowed, 75);
        assert_eq!(dmem.num_slices, 2);
        assert_eq!(dmem.num_ref_l0, 2);
        assert_eq!(dmem.cqp_qp_value, 28);
        assert_eq!(dmem.current_pass, 1);
        assert_eq!(dmem.op_mode, OP_MODE_BRC);
        assert_eq!(dmem.current_frame_type, FrameType::PorLowDelayB as u8);
        assert_eq!(dmem.ip_average_coeff, 64);
        assert_eq!(dmem.log_lcu_size, 6);
        assert_eq!(dmem.re_encode_negative_qp_delta_thr, -10);
        // Frame 6 -> circular index 1
        assert_eq!(dmem.current_data_offset, 1024);
        assert_eq!(dmem.ref_data_offset[..3], [0, 3072, 2048]);
        assert_eq!(dmem.delta_qp_for_sad_zone0, -5);
    }

    #[test]
    fn test_pass_out_of_range() {
        let seq = cbr();
        let pic = PictureParams::default();
        let slices = [p_slice()];
        let err = build_update_dmem(&inputs(&seq, &pic, &slices, 2)).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::PassOutOfRange));
    }

    #[test]
    fn test_low_delay_target_and_wp() {
        let seq = SequenceParams {
            frame_size_tolerance: FrameSizeTolerance::ExtremelyLow,
            ..cbr()
        };
        let pic = PictureParams {
            coding_type: CodingType::P,
            ..PictureParams::default()
        };
        let slices = [p_slice()];
        let mut inp = inputs(&seq, &pic, &slices, 0);
        inp.weighted_prediction = true;
        inp.generation = Generation::Gen11;

        let first = build_update_dmem(&inp).unwrap();
        assert_eq!(first.target_size, 8_000_000);
        assert_eq!(first.ip_average_coeff, 0);
        assert_eq!(first.op_mode, OP_MODE_BRC);
        assert_eq!(first.luma_log2_weight_denom, 6);
        assert_eq!(first.re_encode_negative_qp_delta_thr, -5);

        inp.pass = 1;
        assert_eq!(build_update_dmem(&inp).unwrap().op_mode, OP_MODE_BRC | OP_MODE_WP);
    }

    #[test]
    fn test_frame_type_pyramid() {
        let seq = SequenceParams {
            hierarchical: true,
            gop_ref_dist: 4,
            low_delay: false,
            ..cbr()
        };
        let mut pic = PictureParams {
            coding_type: CodingType::B,
            ..PictureParams::default()
        };
        let expected = [
            (1, FrameType::PorLowDelayB),
            (2, FrameType::B),
            (3, FrameType::B1),
            (4, FrameType::B2),
        ];
        for (level, ty) in expected {
            pic.hierarchical_level_plus1 = level;
            assert_eq!(FrameType::classify(Generation::Gen12, &seq, &pic), Ok(ty));
        }

        pic.hierarchical_level_plus1 = 5;
        assert_eq!(FrameType::classify(Generation::Gen12, &seq, &pic), Err(Error::InvalidParameter));

        let ldb = SequenceParams { low_delay: true, ..seq.clone() };
        pic.hierarchical_level_plus1 = 4;
        assert_eq!(FrameType::classify(Generation::Gen12, &ldb, &pic), Err(Error::InvalidParameter));

        // Gen11 only tells intra apart
        assert_eq!(FrameType::classify(Generation::Gen11, &seq, &pic), Ok(FrameType::PorLowDelayB));
    }

    #[test]
    fn test_tile_replay_op_mode() {
        let seq = cbr();
        let pic = PictureParams::default();
        let slices = [SliceParams::default()];
        let mut inp = inputs(&seq, &pic, &slices, 0);
        inp.tile_replay = true;
        let dmem = build_update_dmem(&inp).unwrap();
        assert_eq!(dmem.op_mode, OP_MODE_TILE_REPLAY);
        assert_eq!(dmem.current_frame_type, FrameType::I as u8);
    }
}
