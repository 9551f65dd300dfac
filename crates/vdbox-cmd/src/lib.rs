//! # VDBOX Commands
//!
//! Construction of the MI, HCP, VDEnc and HuC commands that drive an HEVC
//! encode on the video box.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           vdbox-cmd                              │
//! │                                                                  │
//! │   parameter block ──► EncodeCommand::fill ──► CommandRecord      │
//! │        (hcp, vdenc,          │                    │              │
//! │         huc, mi)             │                    ▼              │
//! │                              │             CommandWriter         │
//! │                              ▼                    │              │
//! │                   GenerationDescriptor            ▼              │
//! │                   (layouts, capabilities,   CommandSink          │
//! │                    overrides)               (cursor / staging)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are sized by the active generation's layout table. The generic
//! fill of every command is shared; a generation only contributes the bits
//! that differ through its override table. Asking for a command the
//! generation lacks yields `Error::PlatformNotSupported`.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod cursor;
pub mod encoder;
pub mod generation;
pub mod hcp;
pub mod huc;
pub mod mi;
pub mod record;
pub mod vdenc;

// Re-exports
pub use cursor::{CommandCursor, StagingBuffer};
pub use encoder::{CommandWriter, EncodeCommand, WriterStats};
pub use generation::{Capabilities, CommandId, GenerationDescriptor, Overrides};
pub use record::{CommandLayout, CommandRecord, Field};
