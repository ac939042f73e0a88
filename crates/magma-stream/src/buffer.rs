//! # Buffer Object
//!
//! Identity shared by every strategy: the device buffer, its binding target
//! and its fixed capacity. Owns the device buffer and deletes it on drop.

use magma_core::{BufferHandle, BufferStorage, BufferTarget, GpuBackend, Result};

/// A device buffer owned by a streaming strategy
#[derive(Debug)]
pub struct BufferObject<B: GpuBackend> {
    backend: B,
    target: BufferTarget,
    handle: BufferHandle,
    size: u32,
}

impl<B: GpuBackend> BufferObject<B> {
    /// Create a device buffer. On failure nothing is left on the device.
    pub(crate) fn create(
        backend: B,
        target: BufferTarget,
        size: u32,
        storage: BufferStorage,
    ) -> Result<Self> {
        let handle = backend.create_buffer(target, size, storage)?;
        log::debug!(
            "created {} buffer {} ({} bytes, {:?})",
            target,
            handle.id(),
            size,
            storage
        );

        Ok(Self {
            backend,
            target,
            handle,
            size,
        })
    }

    /// Device backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Binding target
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    /// Device buffer handle
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Capacity in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Make this buffer the source for subsequent device work
    pub fn bind(&self) {
        self.backend.bind_buffer(self.target, Some(self.handle));
    }

    /// Clear this buffer's target binding
    pub fn unbind(&self) {
        self.backend.bind_buffer(self.target, None);
    }
}

impl<B: GpuBackend> Drop for BufferObject<B> {
    fn drop(&mut self) {
        log::debug!("deleting {} buffer {}", self.target, self.handle.id());
        self.backend.delete_buffer(self.handle);
    }
}
