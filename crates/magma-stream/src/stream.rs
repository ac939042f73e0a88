//! # Stream Buffer
//!
//! The strategy-agnostic face of a streaming buffer. The set of strategies is
//! closed, so they are variants of one enum rather than trait objects.

use core::fmt;

use magma_core::{BufferHandle, BufferTarget, GpuBackend, Result};

use crate::buffer::BufferObject;
use crate::config::StreamConfig;
use crate::factory;
use crate::mapping::MappingResult;
use crate::persistent::PersistentMappedBuffer;
use crate::staging::{DiscardReplaceBuffer, ShadowCopyBuffer};
use crate::stats::StreamStats;

/// Which strategy backs a [`StreamBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// CPU staging copy, uploaded in place
    ShadowCopy,
    /// CPU staging copy, uploaded by orphaning the store
    DiscardAndReplace,
    /// Persistently mapped ring with completion tokens
    PersistentMapped,
}

impl StrategyKind {
    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            Self::ShadowCopy => "shadow copy",
            Self::DiscardAndReplace => "discard and replace",
            Self::PersistentMapped => "persistent mapped",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A transient-data buffer streamed to the device each frame
///
/// Use it as a strict `allocate` → write → `commit` → `bind` cycle from a
/// single producer thread.
#[derive(Debug)]
pub enum StreamBuffer<B: GpuBackend> {
    /// See [`ShadowCopyBuffer`]
    ShadowCopy(ShadowCopyBuffer<B>),
    /// See [`DiscardReplaceBuffer`]
    DiscardAndReplace(DiscardReplaceBuffer<B>),
    /// See [`PersistentMappedBuffer`]
    PersistentMapped(PersistentMappedBuffer<B>),
}

impl<B: GpuBackend> StreamBuffer<B> {
    /// Create the best streaming buffer `backend` supports
    pub fn create(backend: B, target: BufferTarget, size: u32) -> Result<Self> {
        factory::create(backend, target, size, &StreamConfig::default())
    }

    /// Create the best streaming buffer `backend` supports under `config`
    pub fn create_with_config(
        backend: B,
        target: BufferTarget,
        size: u32,
        config: &StreamConfig,
    ) -> Result<Self> {
        factory::create(backend, target, size, config)
    }

    fn object(&self) -> &BufferObject<B> {
        match self {
            Self::ShadowCopy(s) => s.buffer(),
            Self::DiscardAndReplace(s) => s.buffer(),
            Self::PersistentMapped(s) => s.buffer(),
        }
    }

    /// Strategy in use
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::ShadowCopy(_) => StrategyKind::ShadowCopy,
            Self::DiscardAndReplace(_) => StrategyKind::DiscardAndReplace,
            Self::PersistentMapped(_) => StrategyKind::PersistentMapped,
        }
    }

    /// Binding target
    pub fn target(&self) -> BufferTarget {
        self.object().target()
    }

    /// Device buffer identifier
    pub fn buffer_id(&self) -> BufferHandle {
        self.object().handle()
    }

    /// Capacity in bytes
    pub fn size(&self) -> u32 {
        self.object().size()
    }

    /// Counters
    pub fn stats(&self) -> &StreamStats {
        match self {
            Self::ShadowCopy(s) => s.stats(),
            Self::DiscardAndReplace(s) => s.stats(),
            Self::PersistentMapped(s) => s.stats(),
        }
    }

    /// Make this buffer the source for subsequent device work
    pub fn bind(&self) {
        self.object().bind();
    }

    /// Clear this buffer's binding
    pub fn unbind(&self) {
        self.object().unbind();
    }

    /// Get a writable region of at least `min_size` bytes at `alignment`.
    ///
    /// May block until the device has finished reading the region. Fails
    /// only if the device is lost while waiting.
    pub fn allocate(&mut self, alignment: u32, min_size: u32) -> Result<MappingResult<'_>> {
        match self {
            Self::ShadowCopy(s) => Ok(s.allocate(alignment, min_size)),
            Self::DiscardAndReplace(s) => Ok(s.allocate(alignment, min_size)),
            Self::PersistentMapped(s) => s.allocate(alignment, min_size),
        }
    }

    /// Finish writing `used` bytes at the last allocated region
    pub fn commit(&mut self, used: u32) -> Result<()> {
        match self {
            Self::ShadowCopy(s) => s.commit(used),
            Self::DiscardAndReplace(s) => s.commit(used),
            Self::PersistentMapped(s) => s.commit(used),
        }
    }

    /// Release the buffer, waiting for the device to finish with it first.
    ///
    /// Dropping does the same but can only log a failed wait.
    pub fn destroy(self) -> Result<()> {
        match self {
            Self::PersistentMapped(s) => s.destroy(),
            Self::ShadowCopy(_) | Self::DiscardAndReplace(_) => Ok(()),
        }
    }
}
