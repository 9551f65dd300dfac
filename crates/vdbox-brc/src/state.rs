//! # BRC State
//!
//! Tracks whether the firmware holds a valid rate-control context and when
//! it has to be (re)initialized.
//!
//! ```text
//!                  first frame
//!  Uninitialized ──────────────► Initialized(epoch) ──► Updated ──► Updated ...
//!                                      ▲                   │
//!                                      └───────────────────┘
//!                          resolution / rate change or explicit reset
//! ```

use vdbox_core::{FrameRate, FrameSize, RateControlMode, Result, SequenceParams};

use crate::init::{validate, BrcFunction};

/// Lifecycle of the firmware rate-control context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrcPhase {
    /// No init block has been sent
    #[default]
    Uninitialized,
    /// Init block sent for this epoch, no update yet
    Initialized {
        /// Init / reset count
        epoch: u32,
    },
    /// At least one update has run in the epoch
    Updated {
        /// Init / reset count
        epoch: u32,
        /// Frames updated since the last init
        frames: u32,
    },
}

/// Parameters whose change forces a reset
#[derive(Debug, Clone, Copy, PartialEq)]
struct RateSnapshot {
    frame: FrameSize,
    rate_control: RateControlMode,
    target_kbps: u32,
    max_kbps: u32,
    vbv_bits: u32,
    frame_rate: FrameRate,
}

impl RateSnapshot {
    fn of(seq: &SequenceParams) -> Self {
        Self {
            frame: seq.frame_size(),
            rate_control: seq.rate_control,
            target_kbps: seq.target_bitrate_kbps,
            max_kbps: seq.max_bitrate_kbps,
            vbv_bits: seq.vbv_buffer_size_bits,
            frame_rate: seq.frame_rate,
        }
    }
}

/// Rate-control state of one stream
#[derive(Debug, Clone, Default)]
pub struct BrcState {
    phase: BrcPhase,
    last: Option<RateSnapshot>,
}

impl BrcState {
    /// Fresh state, nothing sent to the firmware yet
    pub const fn new() -> Self {
        Self {
            phase: BrcPhase::Uninitialized,
            last: None,
        }
    }

    /// Current phase
    pub const fn phase(&self) -> BrcPhase {
        self.phase
    }

    /// Init / reset count, 0 before the first init
    pub const fn epoch(&self) -> u32 {
        match self.phase {
            BrcPhase::Uninitialized => 0,
            BrcPhase::Initialized { epoch } | BrcPhase::Updated { epoch, .. } => epoch,
        }
    }

    /// Decide whether this frame needs an init block
    ///
    /// Returns the firmware function to run, or `None` when the context of
    /// the current epoch is still valid. Constant QP is rejected before the
    /// state changes.
    pub fn begin_frame(&mut self, seq: &SequenceParams) -> Result<Option<BrcFunction>> {
        validate(seq)?;

        let snapshot = RateSnapshot::of(seq);
        let function = match (self.phase, self.last) {
            (BrcPhase::Uninitialized, _) | (_, None) => Some(BrcFunction::Init),
            (_, Some(last)) if last != snapshot => Some(BrcFunction::Reset),
            _ if seq.reset_brc => {
                if seq.rate_control == RateControlMode::Icq {
                    log::warn!("BRC reset ignored under ICQ");
                    None
                } else {
                    Some(BrcFunction::Reset)
                }
            }
            _ => None,
        };

        if let Some(function) = function {
            let epoch = self.epoch() + 1;
            log::debug!("BRC {:?}, epoch {}", function, epoch);
            self.phase = BrcPhase::Initialized { epoch };
            self.last = Some(snapshot);
        }
        Ok(function)
    }

    /// Record a completed update pass sequence for the frame
    pub fn mark_updated(&mut self) {
        self.phase = match self.phase {
            BrcPhase::Uninitialized => BrcPhase::Uninitialized,
            BrcPhase::Initialized { epoch } => BrcPhase::Updated { epoch, frames: 1 },
            BrcPhase::Updated { epoch, frames } => BrcPhase::Updated {
                epoch,
                frames: frames.saturating_add(1),
            },
        };
    }

    /// Forget the firmware context, the next frame re-initializes
    pub fn invalidate(&mut self) {
        self.phase = BrcPhase::Uninitialized;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdbox_core::{Conflict, Error};

    fn vbr() -> SequenceParams {
        SequenceParams {
            rate_control: RateControlMode::Vbr,
            target_bitrate_kbps: 3000,
            max_bitrate_kbps: 6000,
            vbv_buffer_size_bits: 6_000_000,
            init_vbv_fullness_bits: 3_000_000,
            frame_rate: FrameRate::new(30, 1),
            ..SequenceParams::default()
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut state = BrcState::new();
        let seq = vbr();
        assert_eq!(state.epoch(), 0);

        assert_eq!(state.begin_frame(&seq), Ok(Some(BrcFunction::Init)));
        assert_eq!(state.phase(), BrcPhase::Initialized { epoch: 1 });
        state.mark_updated();

        assert_eq!(state.begin_frame(&seq), Ok(None));
        state.mark_updated();
        assert_eq!(state.phase(), BrcPhase::Updated { epoch: 1, frames: 2 });
    }

    #[test]
    fn test_reset_on_change() {
        let mut state = BrcState::new();
        let seq = vbr();
        state.begin_frame(&seq).unwrap();
        state.mark_updated();

        let faster = SequenceParams {
            target_bitrate_kbps: 4000,
            ..seq.clone()
        };
        assert_eq!(state.begin_frame(&faster), Ok(Some(BrcFunction::Reset)));
        assert_eq!(state.epoch(), 2);

        let bigger = SequenceParams {
            frame_width_in_min_cb_minus1: 479,
            ..faster.clone()
        };
        assert_eq!(state.begin_frame(&bigger), Ok(Some(BrcFunction::Reset)));

        let explicit = SequenceParams {
            reset_brc: true,
            ..bigger
        };
        assert_eq!(state.begin_frame(&explicit), Ok(Some(BrcFunction::Reset)));
        assert_eq!(state.epoch(), 4);
    }

    #[test]
    fn test_icq_ignores_explicit_reset() {
        let mut state = BrcState::new();
        let icq = SequenceParams {
            rate_control: RateControlMode::Icq,
            icq_quality_factor: 24,
            ..vbr()
        };
        state.begin_frame(&icq).unwrap();
        let reset = SequenceParams { reset_brc: true, ..icq };
        assert_eq!(state.begin_frame(&reset), Ok(None));
        assert_eq!(state.epoch(), 1);
    }

    #[test]
    fn test_constant_qp_leaves_state() {
        let mut state = BrcState::new();
        let err = state.begin_frame(&SequenceParams::default()).unwrap_err();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::BrcUnderConstantQp));
        assert_eq!(state.phase(), BrcPhase::Uninitialized);
    }
}
