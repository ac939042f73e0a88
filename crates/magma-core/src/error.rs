//! # MAGMA Error Handling
//!
//! Error types for the buffer streaming stack.
//!
//! Errors fall in three groups:
//! - Resource creation failures, which the strategy factory recovers from by
//!   falling back to a less demanding strategy
//! - Synchronization failures, which mean the device is gone and the
//!   emulation session cannot continue
//! - Usage errors reported by device backends
//!
//! Precondition violations by callers are not errors; they are asserted.

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// MAGMA Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// MAGMA unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation not supported by this device
    NotSupported,
    /// Out of host memory
    OutOfMemory,

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// The device rejected buffer creation
    BufferCreationFailed,
    /// The device refused to map the buffer
    MappingFailed,
    /// Buffer handle does not name a live buffer
    InvalidBuffer,
    /// Write would run past the end of a region
    BufferOverflow,
    /// Every streaming strategy failed to initialize
    NoStreamBuffer,

    // =========================================================================
    // Synchronization Errors
    // =========================================================================
    /// The device was lost while work was outstanding
    DeviceLost,
    /// A completion token could not be created or waited on
    FenceFailed,
}

impl Error {
    /// Whether this error means the device can no longer be trusted.
    ///
    /// Callers treat these as fatal for the emulation session.
    pub const fn is_device_loss(self) -> bool {
        matches!(self, Self::DeviceLost | Self::FenceFailed)
    }

    /// Whether this error came from resource creation and a fallback
    /// strategy may still succeed.
    pub const fn is_creation_failure(self) -> bool {
        matches!(
            self,
            Self::NotSupported
                | Self::OutOfMemory
                | Self::BufferCreationFailed
                | Self::MappingFailed
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::OutOfMemory => write!(f, "out of memory"),

            // Resource
            Self::BufferCreationFailed => write!(f, "buffer creation failed"),
            Self::MappingFailed => write!(f, "buffer mapping failed"),
            Self::InvalidBuffer => write!(f, "invalid buffer handle"),
            Self::BufferOverflow => write!(f, "buffer overflow"),
            Self::NoStreamBuffer => write!(f, "no streaming buffer available"),

            // Synchronization
            Self::DeviceLost => write!(f, "device lost"),
            Self::FenceFailed => write!(f, "completion fence failed"),
        }
    }
}

impl core::error::Error for Error {}

static_assertions::assert_impl_all!(Error: Send, Sync, Copy);
