//! # VDBOX Encode
//!
//! Per-frame orchestration of an HEVC encode on the VDEnc + HCP pipe: tile
//! partitioning, slice placement and the pipeline that sequences buffer
//! management, bitrate control and command serialization for one frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          vdbox-encode                            │
//! │                                                                  │
//! │  ┌────────────────┐  ┌────────────────┐  ┌───────────────────┐   │
//! │  │ TilePartitioner│  │ slice placement│  │  EncodePipeline   │   │
//! │  │ (grid, offsets,│─►│ (tile of each  │─►│  (validate, size, │   │
//! │  │  bitstream)    │  │  slice, CTBs)  │  │   BRC, serialize) │   │
//! │  └────────────────┘  └────────────────┘  └─────────┬─────────┘   │
//! │                                                    │             │
//! │        vdbox-mem ◄──── vdbox-brc ◄──── vdbox-cmd ◄─┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod pipeline;
pub mod slice;
pub mod tile;

// Re-exports
pub use pipeline::{EncodePipeline, FrameParams, FrameSubmission, FrameSurfaces, ReferencePicture, RECYCLE_SLOTS};
pub use slice::{assign_tiles, check_lcu_count, slice_addresses, slice_in_tile, SliceAddress, SliceInTile, SlicePlacement};
pub use tile::{TileBudget, TileDescriptor, TilePartitioner, TileStatisticsLayout};

static_assertions::const_assert!(RECYCLE_SLOTS >= 2);
static_assertions::const_assert_eq!(slice::MAX_SLICES, 70);
