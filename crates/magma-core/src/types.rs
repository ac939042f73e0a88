//! # MAGMA Core Types
//!
//! Fundamental type definitions shared by the streaming stack.
//!
//! These types provide:
//! - Strongly typed resource handles
//! - Buffer binding targets and their GL encodings
//! - Alignment helpers for byte offsets

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

// =============================================================================
// HANDLE TYPES
// =============================================================================

/// Opaque handle to a device resource
///
/// Handles are type-safe wrappers that prevent mixing different resource types.
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: PhantomData<T>,
}

impl<T> Handle<T> {
    /// Create a new handle
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Create a null handle
    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Get the raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

// Manual impls: the marker types carry no data and need not be Copy.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = core::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "Handle<{}>({})", short, self.id)
    }
}

// Marker types for handles
/// Marker for buffer handle
#[derive(Debug)]
pub struct BufferMarker;

/// Handle to a device buffer object
pub type BufferHandle = Handle<BufferMarker>;

// =============================================================================
// BUFFER TARGETS
// =============================================================================

/// Intended use-class of a buffer
///
/// The target decides which binding point `bind`/`unbind` touch on the
/// device, so a vertex stream and a uniform stream can be bound at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Vertex,
    /// Index data
    Index,
    /// Uniform block data
    Uniform,
    /// Texture upload source
    PixelUnpack,
    /// Shader storage data
    ShaderStorage,
    /// Indirect draw arguments
    DrawIndirect,
}

impl BufferTarget {
    /// GL binding point enum for this target
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::Vertex => 0x8892,        // GL_ARRAY_BUFFER
            Self::Index => 0x8893,         // GL_ELEMENT_ARRAY_BUFFER
            Self::Uniform => 0x8A11,       // GL_UNIFORM_BUFFER
            Self::PixelUnpack => 0x88EC,   // GL_PIXEL_UNPACK_BUFFER
            Self::ShaderStorage => 0x90D2, // GL_SHADER_STORAGE_BUFFER
            Self::DrawIndirect => 0x8F3F,  // GL_DRAW_INDIRECT_BUFFER
        }
    }

    /// Target for a GL binding point enum
    pub const fn from_gl_enum(value: u32) -> Option<Self> {
        match value {
            0x8892 => Some(Self::Vertex),
            0x8893 => Some(Self::Index),
            0x8A11 => Some(Self::Uniform),
            0x88EC => Some(Self::PixelUnpack),
            0x90D2 => Some(Self::ShaderStorage),
            0x8F3F => Some(Self::DrawIndirect),
            _ => None,
        }
    }

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Index => "index",
            Self::Uniform => "uniform",
            Self::PixelUnpack => "pixel-unpack",
            Self::ShaderStorage => "shader-storage",
            Self::DrawIndirect => "draw-indirect",
        }
    }
}

impl fmt::Display for BufferTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Usage hint for mutable buffer storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageHint {
    /// Written once per use, drawn a few times
    StreamDraw,
    /// Rewritten repeatedly, drawn many times
    DynamicDraw,
    /// Written once, drawn many times
    StaticDraw,
}

impl UsageHint {
    /// GL usage enum
    pub const fn gl_enum(self) -> u32 {
        match self {
            Self::StreamDraw => 0x88E0,  // GL_STREAM_DRAW
            Self::DynamicDraw => 0x88E8, // GL_DYNAMIC_DRAW
            Self::StaticDraw => 0x88E4,  // GL_STATIC_DRAW
        }
    }
}

// =============================================================================
// ALIGNMENT
// =============================================================================

/// Round `value` up to a multiple of `alignment`.
///
/// Alignments are not required to be powers of two: vertex strides such as
/// 12 or 20 bytes are valid alignments. Saturates at `u32::MAX`.
#[inline]
pub const fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return value;
    }
    let rem = value % alignment;
    if rem == 0 {
        value
    } else {
        value.saturating_add(alignment - rem)
    }
}

static_assertions::assert_impl_all!(BufferHandle: Send, Sync, Copy);
static_assertions::assert_impl_all!(BufferTarget: Send, Sync, Copy);
