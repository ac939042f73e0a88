//! # MAGMA Streaming Buffers
//!
//! Per-frame vertex and uniform data streamed from the CPU into a single
//! reusable GPU buffer while the GPU consumes earlier frames asynchronously.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         StreamBuffer                             │
//! │        (capability-probing factory, tagged strategy enum)        │
//! │                                                                  │
//! │  ┌────────────────┐  ┌───────────────────┐  ┌─────────────────┐  │
//! │  │  ShadowCopy    │  │ DiscardAndReplace │  │ PersistentMapped│  │
//! │  │ staging + sub  │  │ staging + orphan  │  │  mapped ring    │  │
//! │  │  range upload  │  │  whole-store      │  │       │         │  │
//! │  └────────────────┘  └───────────────────┘  │  RingTracker    │  │
//! │                                             │  (16 segments,  │  │
//! │                                             │  token slots)   │  │
//! │                                             └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                 GpuBackend + CompletionToken (magma-core)
//! ```
//!
//! ## Protocol
//!
//! ```ignore
//! let mut stream = StreamBuffer::create(device, BufferTarget::Vertex, 4 << 20)?;
//! let mut region = stream.allocate(stride, bytes_needed)?;
//! let written = region.write_pod(0, &vertices)?;
//! stream.commit(written)?;
//! stream.bind();
//! // issue draws reading [region offset, region offset + written)
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

/// Precondition check: debug builds always, release builds with `validation`.
///
/// Violations are caller bugs, never runtime conditions.
macro_rules! stream_assert {
    ($($arg:tt)*) => {
        if cfg!(feature = "validation") {
            assert!($($arg)*);
        } else {
            debug_assert!($($arg)*);
        }
    };
}

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod buffer;
pub mod config;
pub mod factory;
pub mod mapping;
pub mod persistent;
pub mod staging;
pub mod stats;
pub mod stream;
pub mod tracker;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-exports
pub use config::StreamConfig;
pub use mapping::MappingResult;
pub use persistent::PersistentMappedBuffer;
pub use staging::{DiscardReplaceBuffer, ShadowCopyBuffer};
pub use stats::StreamStats;
pub use stream::{StrategyKind, StreamBuffer};
pub use tracker::{Reservation, RingTracker};

pub use magma_core::{BufferTarget, CompletionToken, DeviceCaps, Error, GpuBackend, Result};

/// Number of synchronization segments a persistent ring is divided into
pub const SEGMENT_COUNT: usize = 16;
