//! # Staging Strategies
//!
//! Strategies that write into a CPU-side shadow of the whole buffer and
//! upload on commit. Neither sub-allocates: every `allocate` hands out the
//! full staging area at offset 0, and the driver's own dependency tracking
//! keeps in-flight device reads safe.
//!
//! - [`ShadowCopyBuffer`] updates the device buffer in place with a
//!   sub-range upload.
//! - [`DiscardReplaceBuffer`] replaces the whole backing store on every
//!   commit, letting the driver orphan the old storage instead of stalling
//!   on it.

use alloc::vec::Vec;

use magma_core::{BufferStorage, BufferTarget, Error, GpuBackend, Result, UsageHint};

use crate::buffer::BufferObject;
use crate::mapping::MappingResult;
use crate::stats::StreamStats;

// =============================================================================
// STAGING AREA
// =============================================================================

/// CPU copy of the full buffer
#[derive(Debug)]
struct StagingArea {
    bytes: Vec<u8>,
}

impl StagingArea {
    fn new(size: u32) -> Result<Self> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size as usize)
            .map_err(|_| Error::OutOfMemory)?;
        bytes.resize(size as usize, 0);
        Ok(Self { bytes })
    }

    fn map(&mut self, alignment: u32, min_size: u32) -> MappingResult<'_> {
        stream_assert!(alignment > 0, "alignment must be non-zero");
        stream_assert!(
            min_size as usize <= self.bytes.len(),
            "allocation of {} bytes exceeds buffer capacity {}",
            min_size,
            self.bytes.len()
        );
        MappingResult::new(&mut self.bytes, 0, alignment)
    }

    fn committed(&self, used: u32) -> &[u8] {
        stream_assert!(
            used as usize <= self.bytes.len(),
            "commit of {} bytes exceeds buffer capacity {}",
            used,
            self.bytes.len()
        );
        &self.bytes[..(used as usize).min(self.bytes.len())]
    }
}

// =============================================================================
// SHADOW COPY
// =============================================================================

/// Staging copy uploaded with an in-place sub-range update
#[derive(Debug)]
pub struct ShadowCopyBuffer<B: GpuBackend> {
    staging: StagingArea,
    stats: StreamStats,
    buffer: BufferObject<B>,
}

impl<B: GpuBackend> ShadowCopyBuffer<B> {
    /// Create the device buffer and its staging copy
    pub fn create(backend: B, target: BufferTarget, size: u32) -> Result<Self> {
        let buffer = BufferObject::create(
            backend,
            target,
            size,
            BufferStorage::Mutable(UsageHint::StreamDraw),
        )?;
        let staging = StagingArea::new(size)?;

        Ok(Self {
            staging,
            stats: StreamStats::default(),
            buffer,
        })
    }

    /// Device buffer
    pub fn buffer(&self) -> &BufferObject<B> {
        &self.buffer
    }

    /// Counters
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Hand out the whole staging area
    pub fn allocate(&mut self, alignment: u32, min_size: u32) -> MappingResult<'_> {
        self.stats.allocations += 1;
        self.staging.map(alignment, min_size)
    }

    /// Upload the first `used` staging bytes
    pub fn commit(&mut self, used: u32) -> Result<()> {
        if used == 0 {
            return Ok(());
        }

        let data = self.staging.committed(used);
        self.buffer.bind();
        self.buffer
            .backend()
            .buffer_sub_data(self.buffer.handle(), 0, data)?;

        self.stats.uploads += 1;
        self.stats.record_commit(used);
        Ok(())
    }
}

// =============================================================================
// DISCARD AND REPLACE
// =============================================================================

/// Staging copy uploaded by replacing the whole backing store
#[derive(Debug)]
pub struct DiscardReplaceBuffer<B: GpuBackend> {
    staging: StagingArea,
    stats: StreamStats,
    buffer: BufferObject<B>,
}

impl<B: GpuBackend> DiscardReplaceBuffer<B> {
    /// Create the device buffer and its staging copy
    pub fn create(backend: B, target: BufferTarget, size: u32) -> Result<Self> {
        let buffer = BufferObject::create(
            backend,
            target,
            size,
            BufferStorage::Mutable(UsageHint::StreamDraw),
        )?;
        let staging = StagingArea::new(size)?;

        Ok(Self {
            staging,
            stats: StreamStats::default(),
            buffer,
        })
    }

    /// Device buffer
    pub fn buffer(&self) -> &BufferObject<B> {
        &self.buffer
    }

    /// Counters
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Hand out the whole staging area
    pub fn allocate(&mut self, alignment: u32, min_size: u32) -> MappingResult<'_> {
        self.stats.allocations += 1;
        self.staging.map(alignment, min_size)
    }

    /// Replace the device storage with the first `used` staging bytes
    pub fn commit(&mut self, used: u32) -> Result<()> {
        if used == 0 {
            return Ok(());
        }

        let data = self.staging.committed(used);
        self.buffer.bind();
        self.buffer
            .backend()
            .buffer_data(self.buffer.handle(), data, UsageHint::StreamDraw)?;

        self.stats.uploads += 1;
        self.stats.record_commit(used);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockEvent, MockFailures};
    use magma_core::DeviceCaps;

    #[test]
    fn test_shadow_copy_uploads_in_place() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream = ShadowCopyBuffer::create(device.clone(), BufferTarget::Vertex, 256).unwrap();
        let handle = stream.buffer().handle();

        let mut region = stream.allocate(16, 64);
        assert_eq!(region.offset(), 0);
        assert_eq!(region.aligned_index(), 0);
        assert_eq!(region.units_available(), 16);
        region.write(0, &[0xAB; 40]).unwrap();
        stream.commit(40).unwrap();

        let contents = device.contents(handle).unwrap();
        assert_eq!(contents.len(), 256);
        assert_eq!(&contents[..40], &[0xABu8; 40]);
        assert_eq!(&contents[40..], &[0u8; 216][..]);
        assert_eq!(
            &device.events()[1..],
            &[
                MockEvent::Bind(BufferTarget::Vertex, Some(handle)),
                MockEvent::SubData { buffer: handle, offset: 0, len: 40 },
            ]
        );
        assert_eq!(stream.stats().uploads, 1);
        assert_eq!(stream.stats().bytes_committed, 40);
    }

    #[test]
    fn test_discard_replaces_store() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream =
            DiscardReplaceBuffer::create(device.clone(), BufferTarget::Uniform, 256).unwrap();
        let handle = stream.buffer().handle();

        let mut region = stream.allocate(4, 16);
        region.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        stream.commit(8).unwrap();

        // Orphaning leaves a store exactly as large as the upload
        assert_eq!(device.contents(handle).unwrap(), [1u8, 2, 3, 4, 5, 6, 7, 8]);
        assert!(device
            .events()
            .contains(&MockEvent::Data { buffer: handle, len: 8 }));
    }

    #[test]
    fn test_empty_commit_issues_no_upload() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream = ShadowCopyBuffer::create(device.clone(), BufferTarget::Vertex, 64).unwrap();
        device.clear_events();

        let _ = stream.allocate(4, 0);
        stream.commit(0).unwrap();
        assert!(device.events().is_empty());
        assert_eq!(stream.stats().commits, 0);
        assert_eq!(stream.stats().allocations, 1);
    }

    #[test]
    fn test_creation_failure_leaves_nothing_behind() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        device.set_failures(MockFailures::CREATE_MUTABLE);
        assert_eq!(
            ShadowCopyBuffer::create(device.clone(), BufferTarget::Vertex, 64).err(),
            Some(Error::BufferCreationFailed)
        );
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_drop_deletes_buffer() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let stream = DiscardReplaceBuffer::create(device.clone(), BufferTarget::Index, 64).unwrap();
        let handle = stream.buffer().handle();
        drop(stream);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.events().last(), Some(&MockEvent::Delete(handle)));
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn test_oversized_allocate_panics() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream = ShadowCopyBuffer::create(device, BufferTarget::Vertex, 64).unwrap();
        let _ = stream.allocate(4, 65);
    }

    #[test]
    #[should_panic(expected = "alignment must be non-zero")]
    fn test_zero_alignment_panics() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream = DiscardReplaceBuffer::create(device, BufferTarget::Vertex, 64).unwrap();
        let _ = stream.allocate(0, 16);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn test_oversized_commit_panics() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let mut stream = ShadowCopyBuffer::create(device, BufferTarget::Vertex, 64).unwrap();
        let _ = stream.allocate(4, 16);
        let _ = stream.commit(65);
    }
}
