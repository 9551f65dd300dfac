//! # VDBOX Bitrate Control
//!
//! Parameter blocks for the HuC bitrate-control firmware. The driver side
//! never computes QPs frame by frame; it describes the stream once per epoch
//! (init / reset) and hands the firmware one update block per pass, plus the
//! lambda tables the firmware copies into the encoder state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           vdbox-brc                              │
//! │                                                                  │
//! │   SequenceParams ──► BrcState::begin_frame ──► Init / Reset?     │
//! │                                │                                 │
//! │               ┌────────────────┼──────────────────┐              │
//! │               ▼                ▼                  ▼              │
//! │        build_init_dmem   build_update_dmem   LambdaTables        │
//! │        (BrcInitDmem)     (BrcUpdateDmem)     (const data)        │
//! │               │                │                  │              │
//! │               └──────► 192-byte DMEM blobs ◄──────┘              │
//! │                        (loaded by HUC_DMEM_STATE)                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every builder validates the sequence first: constant QP yields
//! `ConfigurationConflict`, a zero VBV buffer or an out-of-range ICQ
//! quality factor yields `InvalidParameter`, and nothing is produced.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod dmem;
pub mod init;
pub mod lambda;
pub mod state;
pub mod tables;
pub mod update;

// Re-exports
pub use dmem::{BrcInitDmem, BrcUpdateDmem, DMEM_SIZE};
pub use init::{build_init_dmem, compute_init_qp, lcu_brc_enabled, profile_level_max_frame_size, BrcFunction};
pub use lambda::{LambdaTables, HUC_QP_RANGE, LAMBDA_CONST_DATA_SIZE};
pub use state::{BrcPhase, BrcState};
pub use update::{build_update_dmem, BatchLayout, FrameType, UpdateInputs};
