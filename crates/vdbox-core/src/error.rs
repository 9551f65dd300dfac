//! # VDBOX Error Handling
//!
//! Error taxonomy shared by every VDBOX crate.
//!
//! Error handling in VDBOX follows these principles:
//! - Every sub-step returns a status; nothing is recovered silently
//! - `PlatformNotSupported` is a legitimate terminal result, distinct from
//!   `InvalidParameter`
//! - Errors are `Copy` so the orchestrator can surface the first one unchanged

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// VDBOX Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// VDBOX unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Parameter Errors
    // =========================================================================
    /// Out-of-range or unsupported input (buffer kind, chroma format, ...)
    InvalidParameter,
    /// A required parameter block was not supplied
    NullParameter,
    /// Two parameters contradict each other
    ConfigurationConflict(Conflict),

    // =========================================================================
    // Platform Errors
    // =========================================================================
    /// Valid request not implemented for the active generation / standard
    PlatformNotSupported,

    // =========================================================================
    // Capacity Errors
    // =========================================================================
    /// Command buffer has no room for the record being appended
    CommandBufferFull,
    /// Scratch or staging storage is smaller than the frame requires
    CapacityExceeded,

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// Ring slot still referenced by an unfinished submission
    ResourceBusy,
    /// Allocator collaborator refused the request
    AllocationFailed,
    /// Resource could not be mapped for CPU access
    LockFailed,
    /// Resource handle or buffer kind is not registered
    NotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Parameters
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NullParameter => write!(f, "missing parameter block"),
            Self::ConfigurationConflict(c) => write!(f, "configuration conflict: {}", c),

            // Platform
            Self::PlatformNotSupported => write!(f, "not supported on this platform"),

            // Capacity
            Self::CommandBufferFull => write!(f, "command buffer full"),
            Self::CapacityExceeded => write!(f, "capacity exceeded"),

            // Resources
            Self::ResourceBusy => write!(f, "resource still in flight"),
            Self::AllocationFailed => write!(f, "allocation failed"),
            Self::LockFailed => write!(f, "resource lock failed"),
            Self::NotFound => write!(f, "resource not found"),
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Contradicting parameter combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// Bitrate control requested while the sequence is constant-QP
    BrcUnderConstantQp,
    /// Tiling requested on a generation / configuration without tile support
    TilesUnsupported,
    /// Slice-size control combined with tiles
    SliceSizeControlWithTiles,
    /// Pass index beyond the configured BRC pass count
    PassOutOfRange,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrcUnderConstantQp => write!(f, "BRC requested in constant-QP mode"),
            Self::TilesUnsupported => write!(f, "tiles not supported"),
            Self::SliceSizeControlWithTiles => write!(f, "slice size control with tiles"),
            Self::PassOutOfRange => write!(f, "BRC pass index out of range"),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<Conflict> for Error {
    fn from(c: Conflict) -> Self {
        Error::ConfigurationConflict(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_conflict_conversion() {
        let err: Error = Conflict::BrcUnderConstantQp.into();
        assert_eq!(err, Error::ConfigurationConflict(Conflict::BrcUnderConstantQp));
        assert_ne!(err, Error::InvalidParameter);
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::CommandBufferFull.to_string(), "command buffer full");
        assert_eq!(
            Error::from(Conflict::PassOutOfRange).to_string(),
            "configuration conflict: BRC pass index out of range"
        );
    }
}
