//! # VDBOX Memory Management
//!
//! Internal scratch buffers of the HCP / VDEnc pipeline: how big they must
//! be, when they must grow, when an on-chip rowstore cache replaces them, and
//! how per-frame resources are recycled across in-flight submissions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      VDBOX Memory System                        │
//! │                                                                 │
//! │  ┌───────────────────┐         ┌───────────────────────────┐    │
//! │  │  Sizing           │         │   Rowstore Registry       │    │
//! │  │  (closed-form     │         │   (on-chip cache enable   │    │
//! │  │   size, realloc)  │         │    and base address)      │    │
//! │  └─────────┬─────────┘         └─────────────┬─────────────┘    │
//! │            │                                 │                  │
//! │  ┌─────────┴─────────────────────────────────┴───────────────┐  │
//! │  │                     BufferSet                             │  │
//! │  │   (per-kind descriptor, lazy allocate / grow via the      │  │
//! │  │    allocator collaborator)                                │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │   RecyclePool<T, N>  (fence-gated ring of frame slots)    │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod buffers;
pub mod recycle;
pub mod rowstore;
pub mod sizing;

// Re-exports
pub use buffers::{BufferDescriptor, BufferSet, BufferSetStats};
pub use recycle::{RecyclePool, RecycleSlot, RecycleStats};
pub use rowstore::{RowstoreCache, RowstoreKind, RowstoreParams, RowstoreRegistry};
pub use sizing::{compute_size, needs_realloc, AllocatedGeometry, BufferKind, SizeParams, Tracking};
