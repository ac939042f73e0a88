//! # MAGMA Core Traits
//!
//! The device seam used by the streaming strategies.
//!
//! ```text
//! GpuBackend
//!    │
//!    ├── capabilities()      -> DeviceCaps
//!    ├── buffer lifecycle    (create / delete / bind)
//!    ├── uploads             (sub data / orphaning data)
//!    ├── persistent mapping  (map / unmap / flush range)
//!    └── insert_fence()      -> CompletionToken
//! ```

use core::fmt;
use core::ptr::NonNull;

use crate::error::Result;
use crate::sync::CompletionToken;
use crate::types::*;

// =============================================================================
// DEVICE CAPABILITIES
// =============================================================================

bitflags::bitflags! {
    /// Streaming-relevant capabilities reported by a device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCaps: u32 {
        /// In-place sub-range updates of mutable storage
        const BUFFER_SUB_DATA = 1 << 0;
        /// Replacing a buffer's whole backing store (orphaning)
        const BUFFER_ORPHANING = 1 << 1;
        /// Immutable storage that stays mapped while in use
        const PERSISTENT_MAPPING = 1 << 2;
        /// Completion fences the host can wait on
        const FENCE_SYNC = 1 << 3;
        /// Coherent persistent mappings
        const COHERENT_MAPPING = 1 << 4;
        /// Explicit flush of a mapped byte range
        const EXPLICIT_FLUSH = 1 << 5;
    }
}

impl DeviceCaps {
    /// Capabilities of a typical desktop GL 4.4 driver
    pub const DESKTOP: Self = Self::all();

    /// Capabilities of a GL 3.3 / ES 3.0 driver without buffer storage
    pub const LEGACY: Self = Self::BUFFER_SUB_DATA
        .union(Self::BUFFER_ORPHANING)
        .union(Self::FENCE_SYNC);

    /// Whether a persistently mapped, fence-synchronized ring can be built.
    ///
    /// Needs at least one way of making mapped writes visible: a coherent
    /// mapping or an explicit range flush.
    pub const fn supports_persistent_streaming(self) -> bool {
        self.contains(Self::PERSISTENT_MAPPING.union(Self::FENCE_SYNC))
            && self.intersects(Self::COHERENT_MAPPING.union(Self::EXPLICIT_FLUSH))
    }
}

// =============================================================================
// STORAGE AND MAPPING FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Flags for immutable buffer storage
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StorageFlags: u32 {
        /// Host may map for writing
        const MAP_WRITE = 1 << 1;
        /// Mapping may stay live while the device uses the buffer
        const MAP_PERSISTENT = 1 << 6;
        /// Host writes become visible without a flush
        const MAP_COHERENT = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Access flags for a buffer mapping
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapAccess: u32 {
        /// Host writes through the mapping
        const WRITE = 1 << 1;
        /// Host flushes written ranges explicitly
        const FLUSH_EXPLICIT = 1 << 4;
        /// Mapping stays live while the device uses the buffer
        const PERSISTENT = 1 << 6;
        /// Writes are coherent with the device
        const COHERENT = 1 << 7;
    }
}

impl StorageFlags {
    /// Storage flags for a persistent write-only streaming ring
    pub const fn persistent_stream(coherent: bool) -> Self {
        if coherent {
            Self::MAP_WRITE
                .union(Self::MAP_PERSISTENT)
                .union(Self::MAP_COHERENT)
        } else {
            Self::MAP_WRITE.union(Self::MAP_PERSISTENT)
        }
    }
}

impl MapAccess {
    /// Map access for a persistent write-only streaming ring
    pub const fn persistent_stream(coherent: bool) -> Self {
        if coherent {
            Self::WRITE.union(Self::PERSISTENT).union(Self::COHERENT)
        } else {
            Self::WRITE.union(Self::PERSISTENT).union(Self::FLUSH_EXPLICIT)
        }
    }
}

/// How a buffer's storage is allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStorage {
    /// Resizable storage updated with data uploads
    Mutable(UsageHint),
    /// Fixed-size storage that may be mapped
    Immutable(StorageFlags),
}

// =============================================================================
// GPU BACKEND TRAIT
// =============================================================================

/// Device operations the streaming strategies are built on
///
/// A backend is a cheap, clonable handle onto a device context. Every
/// streaming buffer keeps its own clone so teardown can run from `Drop`.
///
/// # Safety
///
/// Implementors guarantee that a pointer returned by [`map_buffer`] is valid
/// for writes of the requested size, and stays valid and unaliased by the
/// backend until [`unmap_buffer`] or [`delete_buffer`] is called for that
/// buffer.
///
/// [`map_buffer`]: GpuBackend::map_buffer
/// [`unmap_buffer`]: GpuBackend::unmap_buffer
/// [`delete_buffer`]: GpuBackend::delete_buffer
pub unsafe trait GpuBackend: Clone + fmt::Debug {
    /// Completion token produced by [`insert_fence`](GpuBackend::insert_fence)
    type Token: CompletionToken;

    /// Query streaming capabilities
    fn capabilities(&self) -> DeviceCaps;

    /// Create a buffer of `size` bytes bound to `target`
    fn create_buffer(
        &self,
        target: BufferTarget,
        size: u32,
        storage: BufferStorage,
    ) -> Result<BufferHandle>;

    /// Release a buffer
    fn delete_buffer(&self, buffer: BufferHandle);

    /// Bind a buffer to a target, or clear the target with `None`
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>);

    /// Update `data.len()` bytes of mutable storage in place
    fn buffer_sub_data(&self, buffer: BufferHandle, offset: u32, data: &[u8]) -> Result<()>;

    /// Replace the whole backing store of mutable storage with `data`
    fn buffer_data(&self, buffer: BufferHandle, data: &[u8], usage: UsageHint) -> Result<()>;

    /// Map the first `size` bytes of a buffer into host memory
    fn map_buffer(&self, buffer: BufferHandle, size: u32, access: MapAccess)
        -> Result<NonNull<u8>>;

    /// Unmap a previously mapped buffer
    fn unmap_buffer(&self, buffer: BufferHandle);

    /// Make host writes to `[offset, offset + len)` visible to the device
    fn flush_mapped_range(&self, buffer: BufferHandle, offset: u32, len: u32);

    /// Insert a fence after all work submitted so far
    fn insert_fence(&self) -> Result<Self::Token>;
}
