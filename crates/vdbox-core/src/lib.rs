//! # VDBOX Core
//!
//! Foundational types, codec parameters and collaborator traits for the
//! VDBOX HEVC encode layer.
//!
//! Everything the command and rate-control layers consume from the outside
//! world enters through this crate: the DDI-level sequence / picture / slice
//! parameters, and the three external services (resource allocation,
//! command-buffer cursor, user settings).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       vdbox-core                            │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Params    │  │   Types     │  │      Error          │  │
//! │  │ (Sequence,  │  │ (GpuAddr,   │  │    Handling         │  │
//! │  │  Picture,   │  │  Chroma,    │  │                     │  │
//! │  │  Slice)     │  │  Geometry)  │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │  ┌─────────────────────────────┐  ┌─────────────────────┐   │
//! │  │  Traits (Allocator, Sink,   │  │   EncoderConfig     │   │
//! │  │          Settings)          │  │                     │   │
//! │  └─────────────────────────────┘  └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod config;
pub mod error;
pub mod params;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports for convenience
pub use config::{EncoderConfig, RowstoreSupport};
pub use error::{Conflict, Error, Result};
pub use params::*;
pub use traits::*;
pub use types::*;
