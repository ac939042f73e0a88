//! # MAGMA Core
//!
//! Foundational traits, types, and abstractions shared by the MAGMA
//! streaming crates.
//!
//! This crate defines the seam between the buffer streaming machinery and
//! whatever device actually owns the memory: a GL context, a Vulkan
//! translation layer, or a scripted mock in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      magma-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Traits    │  │   Types     │  │       Sync          │  │
//! │  │ (GpuBackend,│  │ (Handle,    │  │ (CompletionToken,   │  │
//! │  │  DeviceCaps)│  │  Target)    │  │  Timeline)          │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │                  ┌─────────────────────┐                    │
//! │                  │   Error Handling    │                    │
//! │                  └─────────────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod sync;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use sync::{CompletionToken, Timeline, TimelineToken};
pub use traits::*;
pub use types::*;
