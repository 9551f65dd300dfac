//! # BRC DMEM Blocks
//!
//! The two 192-byte parameter blocks the HuC bitrate-control firmware loads
//! into its data memory.
//!
//! ```text
//!   BrcInitDmem    (once per BRC epoch: init or reset)
//!   ┌────────────┬───────────┬──────────┬───────────┬────────────────┐
//!   │ rates, VBV │ GOP, size │ QP range │ threshold │ tile-based BRC │
//!   │   0..44    │  44..64   │  58..64  │  64..144  │    144..192    │
//!   └────────────┴───────────┴──────────┴───────────┴────────────────┘
//!
//!   BrcUpdateDmem  (once per frame and pass)
//!   ┌────────────┬────────────┬──────────┬─────────────┬──────────────┐
//!   │ target, id │ SLB layout │ frame    │ gain tables │ tile, LTR    │
//!   │   0..72    │  72..106   │ 106..114 │  114..160   │   160..192   │
//!   └────────────┴────────────┴──────────┴─────────────┴──────────────┘
//! ```
//!
//! Both structs are `#[repr(C)]` with no implicit padding, so they are
//! plain old data and serialize with `bytemuck::bytes_of`.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use vdbox_core::{Error, Result};

/// Size of either DMEM block in bytes
pub const DMEM_SIZE: usize = 192;

/// `slice_size_control` bit inside [`BrcInitDmem::brc_flag`]
pub const SSC_FLAG: u8 = 0x80;

// =============================================================================
// INIT BLOCK
// =============================================================================

/// BRC init / reset parameter block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BrcInitDmem {
    /// 0 = init, 2 = reset
    pub brc_func: u32,
    /// Largest frame in bytes for I pictures
    pub user_max_frame: u32,
    /// Initial VBV fullness in bits
    pub init_buf_full: u32,
    /// VBV size in bits
    pub buf_size: u32,
    /// Target bitrate in bits per second
    pub target_bitrate: u32,
    /// Maximum bitrate in bits per second
    pub max_rate: u32,
    /// Minimum bitrate in bits per second
    pub min_rate: u32,
    /// Frame rate numerator
    pub frame_rate_m: u32,
    /// Frame rate denominator
    pub frame_rate_d: u32,
    /// Luma log2 weight denominator
    pub luma_log2_weight_denom: u32,
    /// Chroma log2 weight denominator
    pub chroma_log2_weight_denom: u32,
    /// Bits 0..=6 BRC algorithm, bit 7 slice-size control
    pub brc_flag: u8,
    /// Reserved
    pub reserved0: u8,
    /// P pictures per GOP
    pub gop_p: u16,
    /// B pictures per GOP (level 1)
    pub gop_b: u16,
    /// Frame width in pixels
    pub frame_width: u16,
    /// Frame height in pixels
    pub frame_height: u16,
    /// B pictures per GOP (level 2)
    pub gop_b1: u16,
    /// B pictures per GOP (level 3)
    pub gop_b2: u16,
    /// Smallest QP the firmware may pick
    pub min_qp: u8,
    /// Largest QP the firmware may pick
    pub max_qp: u8,
    /// Deepest hierarchy level
    pub max_brc_level: u8,
    /// Luma bit depth
    pub luma_bit_depth: u8,
    /// Chroma bit depth
    pub chroma_bit_depth: u8,
    /// CU-level QP control: bit 0 I pictures, bit 1 P/B pictures
    pub cu_qp_ctrl: u8,
    /// Reserved
    pub reserved1: [u8; 4],
    /// Buffer deviation thresholds, P/B pictures
    pub dev_thresh_pb0: [i8; 8],
    /// Buffer deviation thresholds, VBR
    pub dev_thresh_vbr0: [i8; 8],
    /// Buffer deviation thresholds, I pictures
    pub dev_thresh_i0: [i8; 8],
    /// Instantaneous rate thresholds, P pictures
    pub inst_rate_thresh_p0: [i8; 4],
    /// Instantaneous rate thresholds, B pictures
    pub inst_rate_thresh_b0: [i8; 4],
    /// Instantaneous rate thresholds, I pictures
    pub inst_rate_thresh_i0: [i8; 4],
    /// Low-delay BRC
    pub low_delay_mode: u8,
    /// Initial QP for I/P pictures
    pub init_qp_ip: u8,
    /// Initial QP for B pictures
    pub init_qp_b: u8,
    /// QP delta threshold for the adaptive second pass
    pub qp_delta_thr_for_adapt_2pass: u8,
    /// Upper frame-size threshold for the adaptive second pass
    pub top_frm_sz_thr_for_adapt_2pass: u8,
    /// Lower frame-size threshold for the adaptive second pass
    pub bot_frm_sz_thr_for_adapt_2pass: u8,
    /// QP selection for the first pass
    pub qp_select_for_first_pass: u8,
    /// MB header compensation
    pub mb_header_compensation: u8,
    /// Carry overshoot into the next frame
    pub over_shoot_carry_flag: u8,
    /// Overshoot percentage that skips a frame
    pub over_shoot_skip_frame_pct: u8,
    /// Estimated rate thresholds, P pictures
    pub est_rate_thresh_p0: [u8; 7],
    /// Estimated rate thresholds, B pictures
    pub est_rate_thresh_b0: [u8; 7],
    /// Estimated rate thresholds, I pictures
    pub est_rate_thresh_i0: [u8; 7],
    /// QP for P pictures
    pub qp_p: u8,
    /// Stream-in surface enable
    pub stream_in_surface_enable: u8,
    /// Stream-in ROI enable
    pub stream_in_roi_enable: u8,
    /// Timing budget enable
    pub timing_budget_enable: u8,
    /// Upper QP delta threshold for the adaptive second pass
    pub top_qp_delta_thr_for_adapt_2pass: u8,
    /// Lower QP delta threshold for the adaptive second pass
    pub bot_qp_delta_thr_for_adapt_2pass: u8,
    /// Reserved
    pub reserved2: u8,
    /// Network trace enable
    pub network_trace_enable: u8,
    /// Low-delay scene-change frame-size enable
    pub low_delay_scene_change_x_frame_size_enable: u8,
    /// ICQ / QVBR quality factor
    pub acqp: u32,
    /// Sliding window size in frames
    pub sliding_window_size: u32,
    /// Sliding window maximum rate ratio in percent
    pub sliding_window_max_rate_ratio: u8,
    /// Reserved
    pub reserved3: u8,
    /// Cb QP offset
    pub cb_qp_offset: i8,
    /// Cr QP offset
    pub cr_qp_offset: i8,
    /// Largest frame in bytes for P/B pictures
    pub profile_level_max_frame_pb: u32,
    /// Sliding-window RC (tile-based BRC)
    pub slide_window_rc: u16,
    /// log2 of the CTB size
    pub max_log_cu_size: u16,
    /// Frame width in CTBs
    pub frame_width_in_lcu: u16,
    /// Frame height in CTBs
    pub frame_height_in_lcu: u16,
    /// Hierarchical GOP rate control
    pub brc_pyramid_enable: u8,
    /// Long-term reference enable
    pub long_term_ref_enable: u8,
    /// Long-term reference interval
    pub long_term_ref_interval: u16,
    /// Long-term references driven by the application
    pub long_term_ref_msdk: u8,
    /// Low-delay GOP
    pub is_low_delay: u8,
    /// Reserved
    pub reserved4: u16,
    /// Reserved
    pub reserved5: [u32; 4],
}

impl BrcInitDmem {
    /// BRC algorithm field
    #[inline]
    pub const fn brc_algorithm(&self) -> u8 {
        self.brc_flag & !SSC_FLAG
    }

    /// Slice-size control field
    #[inline]
    pub const fn slice_size_control(&self) -> bool {
        self.brc_flag & SSC_FLAG != 0
    }

    /// Set the BRC algorithm, keeping the slice-size control bit
    #[inline]
    pub fn set_brc_algorithm(&mut self, algorithm: u8) {
        self.brc_flag = (self.brc_flag & SSC_FLAG) | (algorithm & !SSC_FLAG);
    }

    /// Set the slice-size control bit
    #[inline]
    pub fn set_slice_size_control(&mut self, enabled: bool) {
        if enabled {
            self.brc_flag |= SSC_FLAG;
        } else {
            self.brc_flag &= !SSC_FLAG;
        }
    }

    /// Raw firmware bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Copy into a locked DMEM buffer
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        write_block(self.as_bytes(), out)
    }
}

impl Default for BrcInitDmem {
    fn default() -> Self {
        Self::zeroed()
    }
}

// =============================================================================
// UPDATE BLOCK
// =============================================================================

/// BRC per-frame, per-pass parameter block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BrcUpdateDmem {
    /// Target VBV level in bits
    pub target_size: u32,
    /// Frame number
    pub frame_id: u32,
    /// L0 reference frame numbers
    pub ref_l0_frame_id: [u32; 8],
    /// L1 reference frame numbers
    pub ref_l1_frame_id: [u32; 8],
    /// Frame counts where the gain adjustment changes
    pub start_g_adj_frame: [u16; 4],
    /// Slice-size control target in bytes
    pub target_slice_size: u16,
    /// Bytes of the second-level batch the firmware rewrites
    pub slb_data_size_in_bytes: u16,
    /// Offset of HCP_PIC_STATE in the batch, `0xFFFF` when absent
    pub pic_state_start_in_bytes: u16,
    /// Offset of the second command group
    pub cmd2_start_in_bytes: u16,
    /// Offset of the first command group
    pub cmd1_start_in_bytes: u16,
    /// Offset of the pipe mode select, `0xFFFF` when absent
    pub pipe_mode_select_start_in_bytes: u16,
    /// Weight histogram block of the current picture
    pub current_data_offset: u16,
    /// Weight histogram blocks of the references
    pub ref_data_offset: [u16; 5],
    /// Slice limit for the level
    pub max_num_slice_allowed: u16,
    /// Bit 0 BRC, bit 1 weighted prediction, 4/8 tile-based
    pub op_mode: u8,
    /// Firmware frame type (see [`FrameType`](crate::update::FrameType))
    pub current_frame_type: u8,
    /// Active L0 references
    pub num_ref_l0: u8,
    /// Active L1 references
    pub num_ref_l1: u8,
    /// Slices in the picture
    pub num_slices: u8,
    /// Picture QP for ICQ
    pub cqp_qp_value: u8,
    /// Fractional QP
    pub cqp_frac_qp: u8,
    /// BRC passes per frame
    pub max_num_pass: u8,
    /// Rate ratio thresholds
    pub g_rate_ratio_threshold: [u8; 7],
    /// Gain adjustment multipliers
    pub start_g_adj_mult: [u8; 5],
    /// Gain adjustment divisors
    pub start_g_adj_div: [u8; 5],
    /// QP deltas per rate-ratio bucket
    pub g_rate_ratio_threshold_qp: [u8; 8],
    /// Scene change: previous picture intra percentage
    pub scene_chg_prev_intra_pct_threshold: u8,
    /// Scene change: current picture intra percentage
    pub scene_chg_cur_intra_pct_threshold: u8,
    /// I/P size averaging coefficient
    pub ip_average_coeff: u8,
    /// Pass index, 0-based
    pub current_pass: u8,
    /// QP delta for zero motion
    pub delta_qp_for_mv_zero: i8,
    /// QP delta for motion zone 0
    pub delta_qp_for_mv_zone0: i8,
    /// QP delta for motion zone 1
    pub delta_qp_for_mv_zone1: i8,
    /// QP delta for motion zone 2
    pub delta_qp_for_mv_zone2: i8,
    /// QP delta for SAD zone 0
    pub delta_qp_for_sad_zone0: i8,
    /// QP delta for SAD zone 1
    pub delta_qp_for_sad_zone1: i8,
    /// QP delta for SAD zone 2
    pub delta_qp_for_sad_zone2: i8,
    /// QP delta for SAD zone 3
    pub delta_qp_for_sad_zone3: i8,
    /// QP delta for ROI 0
    pub delta_qp_for_roi0: i8,
    /// QP delta for ROI 1
    pub delta_qp_for_roi1: i8,
    /// QP delta for ROI 2
    pub delta_qp_for_roi2: i8,
    /// QP delta for ROI 3
    pub delta_qp_for_roi3: i8,
    /// Luma log2 weight denominator
    pub luma_log2_weight_denom: i8,
    /// Chroma log2 weight denominator
    pub chroma_log2_weight_denom: i8,
    /// Bit 0 disables chroma weights
    pub disabled_feature: u8,
    /// Sliding window rate control
    pub sliding_window_enable: u8,
    /// log2 of the CTB size the firmware assumes
    pub log_lcu_size: u8,
    /// Network trace entry
    pub network_trace_entry: u16,
    /// Low-delay scene-change frame size
    pub low_delay_scene_change_x_frame_size: u16,
    /// QP delta above which a frame is re-encoded
    pub re_encode_positive_qp_delta_thr: i8,
    /// QP delta below which a frame is re-encoded
    pub re_encode_negative_qp_delta_thr: i8,
    /// Tile rows minus one for tile-row BRC calls
    pub max_num_tile_huc_call_minus1: u8,
    /// Tile-row BRC call index
    pub tile_huc_call_index: u8,
    /// Tile-row BRC pass index, 1-based
    pub tile_huc_call_pass_index: u8,
    /// Tile-row BRC pass count
    pub tile_huc_call_pass_max: u8,
    /// CTBs in the tile row
    pub tile_size_in_lcu: u16,
    /// Minimum frame size in bits
    pub tx_size_in_bits_per_frame: u32,
    /// First tile of the call
    pub start_tile_idx: u8,
    /// Last tile of the call
    pub end_tile_idx: u8,
    /// Frames skipped since the last update
    pub num_frame_skipped: u16,
    /// Bytes of the skipped frames
    pub skip_frame_size: u32,
    /// Slice header bits
    pub slice_header_size: u32,
    /// Current picture is a long-term reference
    pub is_long_term_ref: u8,
    /// Reserved
    pub reserved: [u8; 3],
}

impl BrcUpdateDmem {
    /// Raw firmware bytes
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Copy into a locked DMEM buffer
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        write_block(self.as_bytes(), out)
    }
}

impl Default for BrcUpdateDmem {
    fn default() -> Self {
        Self::zeroed()
    }
}

fn write_block(block: &[u8], out: &mut [u8]) -> Result<()> {
    let dst = out.get_mut(..block.len()).ok_or(Error::CapacityExceeded)?;
    dst.copy_from_slice(block);
    Ok(())
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

const_assert_eq!(core::mem::size_of::<BrcInitDmem>(), DMEM_SIZE);
const_assert_eq!(core::mem::size_of::<BrcUpdateDmem>(), DMEM_SIZE);

static_assertions::assert_impl_all!(BrcInitDmem: Send, Sync, Copy, Pod);
static_assertions::assert_impl_all!(BrcUpdateDmem: Send, Sync, Copy, Pod);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_field_positions() {
        let mut dmem = BrcInitDmem::default();
        dmem.target_bitrate = 0x0403_0201;
        dmem.gop_p = 0xBEEF;
        dmem.set_brc_algorithm(2);
        dmem.set_slice_size_control(true);
        dmem.cb_qp_offset = -1;

        let bytes = dmem.as_bytes();
        assert_eq!(bytes.len(), DMEM_SIZE);
        assert_eq!(bytes[16..20], [1, 2, 3, 4]);
        assert_eq!(bytes[44], 0x82);
        assert_eq!(bytes[46..48], [0xEF, 0xBE]);
        assert_eq!(bytes[154], 0xFF);
        assert_eq!(dmem.brc_algorithm(), 2);
        assert!(dmem.slice_size_control());
    }

    #[test]
    fn test_update_field_positions() {
        let mut dmem = BrcUpdateDmem::default();
        dmem.start_g_adj_frame = [10, 50, 100, 150];
        dmem.log_lcu_size = 6;
        dmem.re_encode_negative_qp_delta_thr = -10;

        let bytes = dmem.as_bytes();
        assert_eq!(bytes[72..74], [10, 0]);
        assert_eq!(bytes[78..80], [150, 0]);
        assert_eq!(bytes[159], 6);
        assert_eq!(bytes[165], 0xF6);
    }

    #[test]
    fn test_write_to_checks_capacity() {
        let dmem = BrcUpdateDmem::default();
        let mut small = [0u8; 128];
        assert_eq!(dmem.write_to(&mut small), Err(Error::CapacityExceeded));

        let mut buf = [0xAAu8; 256];
        dmem.write_to(&mut buf).unwrap();
        assert!(buf[..DMEM_SIZE].iter().all(|&b| b == 0));
        assert_eq!(buf[DMEM_SIZE], 0xAA);
    }
}
