//! # BRC Init / Reset
//!
//! Builds the init DMEM block loaded once per BRC epoch, and the derived
//! values it carries: the profile-level frame size limit, the starting QPs
//! and the buffer deviation thresholds.
//!
//! ```text
//!  SequenceParams ─┬─► validate ──► rates / VBV / GOP / QP range
//!  PictureParams  ─┘                      │
//!                                         ├─► deviation thresholds
//!                                         │     (curve or low-delay table)
//!                                         ├─► init QP (I/P, B)
//!                                         └─► BrcInitDmem
//! ```

use libm::{floor, log10, pow};

use vdbox_core::{
    ChromaFormat, CodingType, Conflict, Error, FrameSizeTolerance, Generation, MbBrcMode, PictureParams,
    RateControlMode, Result, SequenceParams, BRC_KBPS, MAX_ICQ_QUALITY_FACTOR, MAX_QP_8BIT, MIN_ICQ_QUALITY_FACTOR,
};

use crate::dmem::BrcInitDmem;
use crate::tables::*;

/// Lowest QP the firmware accepts as a lower bound
pub const MIN_BRC_QP: u8 = 10;

// =============================================================================
// BRC FUNCTION
// =============================================================================

/// Which firmware entry the init block selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BrcFunction {
    /// First frame of the stream
    Init = 0,
    /// Bitrate or resolution changed mid-stream
    Reset = 2,
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Reject sequences the BRC firmware cannot run
///
/// Constant QP is a configuration conflict, ICQ / QVBR need a quality factor
/// in range and every other mode needs a VBV buffer.
pub fn validate(seq: &SequenceParams) -> Result<()> {
    match seq.rate_control {
        RateControlMode::Cqp => return Err(Conflict::BrcUnderConstantQp.into()),
        RateControlMode::Icq | RateControlMode::Qvbr => {
            if !(MIN_ICQ_QUALITY_FACTOR..=MAX_ICQ_QUALITY_FACTOR).contains(&seq.icq_quality_factor) {
                log::debug!("ICQ quality factor {} out of range", seq.icq_quality_factor);
                return Err(Error::InvalidParameter);
            }
        }
        _ => {}
    }
    if seq.rate_control != RateControlMode::Icq && seq.vbv_buffer_size_bits == 0 {
        log::debug!("BRC with a zero VBV buffer");
        return Err(Error::InvalidParameter);
    }
    seq.frame_rate.fps()?;
    Ok(())
}

/// Whether CU-level rate control runs for this picture
pub fn lcu_brc_enabled(seq: &SequenceParams, pic: &PictureParams) -> bool {
    if !seq.rate_control.is_brc() {
        return false;
    }
    let mut enabled = match seq.mb_brc {
        MbBrcMode::Internal => seq.target_usage == 1,
        MbBrcMode::Disabled => false,
        MbBrcMode::Enabled => true,
    };
    if matches!(seq.rate_control, RateControlMode::Icq | RateControlMode::Qvbr) || pic.num_roi > 0 {
        enabled = true;
    }
    // VCM is frame-level only
    enabled && seq.rate_control != RateControlMode::Vcm
}

// =============================================================================
// DERIVED VALUES
// =============================================================================

/// Largest coded frame in bytes the profile, level and user limits allow
pub fn profile_level_max_frame_size(seq: &SequenceParams, coding_type: CodingType) -> Result<u32> {
    let fps = seq.frame_rate.fps()?;
    let level_idc = seq.level_idc;

    let min_cr: f64 = match level_idc {
        150 | 186 => 6.0,
        151..=u8::MAX => 8.0,
        94..=149 => 4.0,
        _ => 2.0,
    };

    let depth = seq.bit_depth_luma_minus8;
    let (format_factor, cr_scale) = match seq.chroma_format {
        ChromaFormat::Monochrome => (
            match depth {
                0 => 1.0,
                8 => 2.0,
                _ => 1.5,
            },
            1.0,
        ),
        ChromaFormat::Yuv420 => (
            match depth {
                2 => 1.875,
                4 => 2.25,
                _ => 1.5,
            },
            1.0,
        ),
        ChromaFormat::Yuv422 => (
            match depth {
                2 => 2.5,
                4 => 3.0,
                _ => 1.5,
            },
            0.5,
        ),
        ChromaFormat::Yuv444 => (
            match depth {
                2 => 3.75,
                4 => 4.5,
                _ => 3.0,
            },
            0.5,
        ),
    };

    let (max_luma_sps, max_bytes_per_pic) = level_limits(level_idc);
    let rate_bound = (max_luma_sps as f64 / fps * (format_factor / (cr_scale * min_cr))) as u64;

    let user = if coding_type != CodingType::I && seq.user_max_pb_frame_size > 0 {
        seq.user_max_pb_frame_size
    } else {
        seq.user_max_i_frame_size
    };

    let mut limit = max_bytes_per_pic.min(rate_bound);
    if user != 0 {
        limit = limit.min(user as u64);
    }
    let frame = seq.frame_size();
    Ok(limit.min(frame.width as u64 * frame.height as u64) as u32)
}

/// Starting QPs `(I/P, B)` from the bits available per pixel
///
/// The estimate is a log-linear fit of QP against bits per frame, nudged
/// for short GOPs and clamped to the picture's BRC QP range.
pub fn compute_init_qp(seq: &SequenceParams, pic: &PictureParams) -> Result<(u8, u8)> {
    const X0: f64 = 0.0;
    const Y0: f64 = 1.19;
    const X1: f64 = 1.75;
    const Y1: f64 = 1.75;

    let (min_qp, max_qp) = qp_range(pic)?;
    let clip = |qp: i32| qp.clamp(min_qp as i32, max_qp as i32);
    let fps = seq.frame_rate.fps()?;

    let frame = seq.frame_size();
    let frame_bytes = (frame.width * frame.height * 3) >> 1;
    let bps = seq.target_bitrate_kbps as f64 * BRC_KBPS as f64;

    let mut qp_ip = if bps > 0.0 {
        let bits_ratio = frame_bytes as f64 * 2.0 / 3.0 * (fps / bps);
        let exponent = (log10(bits_ratio) - X0) * (Y1 - Y0) / (X1 - X0) + Y0;
        floor(1.0 / 1.2 * pow(10.0, exponent) + 0.5) as i32
    } else {
        max_qp as i32
    };
    qp_ip += 2;

    let gop_size = seq.gop_pic_size.max(1) as i32;
    if gop_size == 1 {
        qp_ip += 12;
    } else if gop_size < 15 {
        qp_ip += (14 - gop_size) >> 1;
    }

    qp_ip = clip(qp_ip) - 1;
    if qp_ip < 0 {
        qp_ip = 1;
    }

    let mut qp_b = clip((((qp_ip + qp_ip) * 563) >> 10) + 1);

    // Rare intra pictures leave more bits for the rest of the GOP
    let step = if gop_size > 300 { 8 } else { 2 };
    qp_ip -= step;
    qp_b -= step;

    Ok((clip(qp_ip) as u8, clip(qp_b) as u8))
}

/// Clamped BRC QP range of a picture
///
/// The lower bound never drops below 10; an upper bound under 10 means
/// "unset" and selects 51.
pub fn qp_range(pic: &PictureParams) -> Result<(u8, u8)> {
    let min_qp = pic.brc_min_qp.max(MIN_BRC_QP);
    let max_qp = if pic.brc_max_qp < MIN_BRC_QP {
        MAX_QP_8BIT
    } else {
        pic.brc_max_qp.min(MAX_QP_8BIT)
    };
    if min_qp > max_qp {
        return Err(Error::InvalidParameter);
    }
    Ok((min_qp, max_qp))
}

/// Thresholds `(P/B, VBR, I)` derived from bits per frame against the VBV
fn deviation_thresholds(dmem: &BrcInitDmem) -> ([i8; 8], [i8; 8], [i8; 8]) {
    let fps = dmem.frame_rate_m as f64 / dmem.frame_rate_d as f64;
    let bits_per_frame = floor(dmem.max_rate as f64 * 100.0 / (fps * 100.0));

    let ratio = if dmem.buf_size == 0 {
        BPS_RATIO_HIGH
    } else {
        (bits_per_frame / (dmem.buf_size as f64 / DEV_STD_FPS)).clamp(BPS_RATIO_LOW, BPS_RATIO_HIGH)
    };

    let mut pb = [0i8; NUM_DEV_THRESHOLDS];
    let mut vbr = [0i8; NUM_DEV_THRESHOLDS];
    let mut intra = [0i8; NUM_DEV_THRESHOLDS];
    let half = NUM_DEV_THRESHOLDS / 2;

    for i in 0..half {
        pb[i] = (NEG_MULT_PB * pow(DEV_THRESH_PB_NEG[i], ratio)) as i8;
        pb[i + half] = (POS_MULT_PB * pow(DEV_THRESH_PB_POS[i], ratio)) as i8;

        intra[i] = (NEG_MULT_PB * pow(DEV_THRESH_I_NEG[i], ratio)) as i8;
        intra[i + half] = (POS_MULT_PB * pow(DEV_THRESH_I_POS[i], ratio)) as i8;

        vbr[i] = (NEG_MULT_PB * pow(DEV_THRESH_VBR_NEG[i], ratio)) as i8;
        vbr[i + half] = (POS_MULT_VBR * pow(DEV_THRESH_VBR_POS[i], ratio)) as i8;
    }
    (pb, vbr, intra)
}

/// BRCFlag value of the low-delay algorithm
const fn low_delay_algorithm(gen: Generation) -> u8 {
    match gen {
        Generation::Gen12 => 4,
        _ => 5,
    }
}

// =============================================================================
// INIT BLOCK
// =============================================================================

/// Build the init / reset DMEM block
///
/// Fails before producing anything when the sequence does not describe a
/// BRC mode, see [`validate`].
pub fn build_init_dmem(
    gen: Generation,
    function: BrcFunction,
    seq: &SequenceParams,
    pic: &PictureParams,
) -> Result<BrcInitDmem> {
    validate(seq)?;

    let frame = seq.frame_size();
    let lcu = seq.lcu_size()?;
    let (min_qp, max_qp) = qp_range(pic)?;

    if seq.vbv_buffer_size_bits < seq.init_vbv_fullness_bits {
        log::warn!(
            "VBV size {} below initial fullness {}, clamping",
            seq.vbv_buffer_size_bits,
            seq.init_vbv_fullness_bits
        );
    }

    let mut dmem = BrcInitDmem {
        brc_func: function as u32,
        user_max_frame: profile_level_max_frame_size(seq, pic.coding_type)?,
        init_buf_full: seq.init_vbv_fullness_bits.min(seq.vbv_buffer_size_bits),
        buf_size: seq.vbv_buffer_size_bits,
        target_bitrate: seq.target_bitrate_kbps.saturating_mul(BRC_KBPS),
        max_rate: seq.max_bitrate_kbps.saturating_mul(BRC_KBPS),
        min_rate: 0,
        frame_rate_m: seq.frame_rate.numerator,
        frame_rate_d: seq.frame_rate.denominator,
        ..BrcInitDmem::default()
    };

    dmem.profile_level_max_frame_pb = if seq.user_max_pb_frame_size > 0 {
        profile_level_max_frame_size(seq, CodingType::B)?
    } else {
        dmem.user_max_frame
    };

    let algorithm = match seq.rate_control {
        RateControlMode::Cbr => 1,
        RateControlMode::Vbr | RateControlMode::Qvbr => 2,
        RateControlMode::Vcm => 3,
        _ => 0,
    };
    if matches!(seq.rate_control, RateControlMode::Icq | RateControlMode::Qvbr) {
        dmem.acqp = seq.icq_quality_factor as u32;
    }
    dmem.set_brc_algorithm(if seq.is_low_delay_brc() {
        low_delay_algorithm(gen)
    } else {
        algorithm
    });
    dmem.set_slice_size_control(seq.slice_size_control);

    dmem.cu_qp_ctrl = match seq.mb_brc {
        MbBrcMode::Internal | MbBrcMode::Enabled => 3,
        MbBrcMode::Disabled => 0,
    };

    // GOP counts exclude the leading I picture
    dmem.gop_p = seq.gop_pic_size.saturating_sub(seq.num_b_in_gop[0] as u16).saturating_sub(1);
    dmem.gop_b = seq.num_b_in_gop[0] as u16;
    dmem.gop_b1 = seq.num_b_in_gop[1] as u16;
    dmem.gop_b2 = seq.num_b_in_gop[2] as u16;
    dmem.frame_width = frame.width as u16;
    dmem.frame_height = frame.height as u16;

    dmem.min_qp = min_qp;
    dmem.max_qp = max_qp;
    dmem.max_brc_level = 1;
    let depth = if seq.bit_depth_luma_minus8 == 2 { 10 } else { 8 };
    dmem.luma_bit_depth = depth;
    dmem.chroma_bit_depth = depth;

    dmem.low_delay_mode = seq.is_low_delay_brc() as u8;
    if seq.frame_size_tolerance == FrameSizeTolerance::ExtremelyLow {
        dmem.dev_thresh_pb0 = LOW_DELAY_DEV_THRESH_PB;
        dmem.dev_thresh_vbr0 = LOW_DELAY_DEV_THRESH_VBR;
        dmem.dev_thresh_i0 = LOW_DELAY_DEV_THRESH_I;
    } else {
        let (pb, vbr, intra) = deviation_thresholds(&dmem);
        dmem.dev_thresh_pb0 = pb;
        dmem.dev_thresh_vbr0 = vbr;
        dmem.dev_thresh_i0 = intra;
    }

    dmem.inst_rate_thresh_p0 = INST_RATE_THRESH_P;
    dmem.inst_rate_thresh_b0 = INST_RATE_THRESH_B;
    dmem.inst_rate_thresh_i0 = INST_RATE_THRESH_I;
    dmem.est_rate_thresh_p0 = EST_RATE_THRESH;
    dmem.est_rate_thresh_b0 = EST_RATE_THRESH;
    dmem.est_rate_thresh_i0 = EST_RATE_THRESH;

    let (qp_ip, qp_b) = compute_init_qp(seq, pic)?;
    dmem.init_qp_ip = qp_ip;
    dmem.init_qp_b = qp_b;

    dmem.top_frm_sz_thr_for_adapt_2pass = TOP_FRM_SZ_THR_FOR_ADAPT_2PASS;
    dmem.bot_frm_sz_thr_for_adapt_2pass = BOT_FRM_SZ_THR_FOR_ADAPT_2PASS;
    dmem.top_qp_delta_thr_for_adapt_2pass = TOP_QP_DELTA_THR_FOR_ADAPT_2PASS;
    dmem.bot_qp_delta_thr_for_adapt_2pass = BOT_QP_DELTA_THR_FOR_ADAPT_2PASS;

    let whole_fps = seq.frame_rate.numerator / seq.frame_rate.denominator;
    dmem.sliding_window_size = whole_fps.min(MAX_SLIDING_WINDOW);
    dmem.sliding_window_max_rate_ratio = SLIDING_WINDOW_MAX_RATE_RATIO;
    dmem.cb_qp_offset = -1;
    dmem.cr_qp_offset = -1;

    if gen == Generation::Gen12 {
        dmem.max_log_cu_size = lcu.log2() as u16;
        dmem.frame_width_in_lcu = frame.width_in_lcu(lcu) as u16;
        dmem.frame_height_in_lcu = frame.height_in_lcu(lcu) as u16;
        dmem.brc_pyramid_enable = (seq.hierarchical && seq.gop_ref_dist != 3) as u8;
        dmem.is_low_delay = seq.low_delay as u8;
    }

    log::debug!(
        "BRC {:?}: flag {:#x}, target {} bps, VBV {} bits, init QP {}/{}",
        function,
        dmem.brc_flag,
        dmem.target_bitrate,
        dmem.buf_size,
        qp_ip,
        qp_b
    );
    Ok(dmem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::FrameRate;

    fn cbr() -> SequenceParams {
        SequenceParams {
            rate_control: RateControlMode::Cbr,
            target_bitrate_kbps: 5000,
            max_bitrate_kbps: 5000,
            vbv_buffer_size_bits: 10_000_000,
            init_vbv_fullness_bits: 5_000_000,
            frame_rate: FrameRate::new(30, 1),
            ..SequenceParams::default()
        }
    }

    #[test]
    fn test_constant_qp_conflict() {
        let seq = SequenceParams::default();
        let err = build_init_dmem(Generation::Gen12, BrcFunction::Init, &seq, &PictureParams::default()).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::BrcUnderConstantQp));
    }

    #[test]
    fn test_zero_vbv_rejected() {
        let seq = SequenceParams {
            vbv_buffer_size_bits: 0,
            ..cbr()
        };
        assert_eq!(validate(&seq), Err(Error::InvalidParameter));

        // ICQ carries no VBV
        let icq = SequenceParams {
            rate_control: RateControlMode::Icq,
            icq_quality_factor: 26,
            vbv_buffer_size_bits: 0,
            ..cbr()
        };
        assert_eq!(validate(&icq), Ok(()));
    }

    #[test]
    fn test_icq_factor_range() {
        for factor in [0u8, 52] {
            let seq = SequenceParams {
                rate_control: RateControlMode::Qvbr,
                icq_quality_factor: factor,
                ..cbr()
            };
            assert_eq!(validate(&seq), Err(Error::InvalidParameter));
        }
    }

    #[test]
    fn test_cbr_init_block() {
        let dmem = build_init_dmem(Generation::Gen11, BrcFunction::Init, &cbr(), &PictureParams::default()).unwrap();
        assert_eq!(dmem.brc_func, 0);
        assert_eq!(dmem.brc_algorithm(), 1);
        assert!(!dmem.slice_size_control());
        assert_eq!(dmem.target_bitrate, 5_000_000);
        assert_eq!(dmem.init_buf_full, 5_000_000);
        assert_eq!(dmem.gop_p, 29);
        assert_eq!(dmem.frame_width, 1920);
        assert_eq!(dmem.frame_height, 1088);
        assert_eq!((dmem.min_qp, dmem.max_qp), (10, 51));
        assert_eq!(dmem.cu_qp_ctrl, 3);
        assert_eq!(dmem.sliding_window_size, 30);
        assert_eq!(dmem.user_max_frame, 1_671_168);
        assert_eq!(dmem.profile_level_max_frame_pb, 1_671_168);
        assert_eq!((dmem.cb_qp_offset, dmem.cr_qp_offset), (-1, -1));
        // Gen11 leaves the tile-based fields alone
        assert_eq!(dmem.frame_width_in_lcu, 0);
    }

    #[test]
    fn test_deviation_thresholds_from_curve() {
        let dmem = build_init_dmem(Generation::Gen12, BrcFunction::Init, &cbr(), &PictureParams::default()).unwrap();
        assert_eq!(dmem.dev_thresh_pb0, [-47, -40, -33, -27, 27, 33, 41, 47]);
        assert_eq!(dmem.dev_thresh_vbr0, [-47, -41, -35, -27, 63, 70, 86, 94]);
        assert_eq!(dmem.dev_thresh_i0, [-44, -38, -29, -22, 22, 31, 40, 47]);
        assert_eq!(dmem.frame_width_in_lcu, 30);
        assert_eq!(dmem.frame_height_in_lcu, 17);
        assert_eq!(dmem.max_log_cu_size, 6);
    }

    #[test]
    fn test_low_delay_tables_and_flag() {
        let seq = SequenceParams {
            frame_size_tolerance: FrameSizeTolerance::ExtremelyLow,
            slice_size_control: true,
            ..cbr()
        };
        let pic = PictureParams {
            max_slice_size_bytes: 1500,
            ..PictureParams::default()
        };
        let gen11 = build_init_dmem(Generation::Gen11, BrcFunction::Reset, &seq, &pic).unwrap();
        let gen12 = build_init_dmem(Generation::Gen12, BrcFunction::Reset, &seq, &pic).unwrap();

        assert_eq!(gen11.brc_func, 2);
        assert_eq!(gen11.brc_algorithm(), 5);
        assert_eq!(gen12.brc_algorithm(), 4);
        assert!(gen12.slice_size_control());
        assert_eq!(gen12.low_delay_mode, 1);
        assert_eq!(gen12.dev_thresh_pb0, LOW_DELAY_DEV_THRESH_PB);
        assert_eq!(gen12.dev_thresh_i0, LOW_DELAY_DEV_THRESH_I);
    }

    #[test]
    fn test_init_qp() {
        assert_eq!(compute_init_qp(&cbr(), &PictureParams::default()), Ok((28, 31)));

        // All-intra adds 12 before clamping
        let intra_only = SequenceParams {
            gop_pic_size: 1,
            ..cbr()
        };
        let (ip, _) = compute_init_qp(&intra_only, &PictureParams::default()).unwrap();
        assert_eq!(ip, 40);
    }

    #[test]
    fn test_qp_range_clamps() {
        let pic = PictureParams {
            brc_min_qp: 2,
            brc_max_qp: 5,
            ..PictureParams::default()
        };
        assert_eq!(qp_range(&pic), Ok((10, 51)));

        let inverted = PictureParams {
            brc_min_qp: 40,
            brc_max_qp: 20,
            ..PictureParams::default()
        };
        assert_eq!(qp_range(&inverted), Err(Error::InvalidParameter));
    }

    #[test]
    fn test_lcu_brc_rules() {
        let pic = PictureParams::default();
        let tu4 = cbr();
        assert!(!lcu_brc_enabled(&tu4, &pic));

        let tu1 = SequenceParams { target_usage: 1, ..cbr() };
        assert!(lcu_brc_enabled(&tu1, &pic));

        let roi = PictureParams { num_roi: 2, ..PictureParams::default() };
        assert!(lcu_brc_enabled(&tu4, &roi));

        let vcm = SequenceParams {
            rate_control: RateControlMode::Vcm,
            mb_brc: MbBrcMode::Enabled,
            ..cbr()
        };
        assert!(!lcu_brc_enabled(&vcm, &pic));
    }
}
