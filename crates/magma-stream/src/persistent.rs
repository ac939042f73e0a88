//! # Persistent Mapped Ring
//!
//! Zero-copy streaming: the buffer is mapped once for its whole life and the
//! producer writes straight into it. A [`RingTracker`] fences segments as the
//! cursor moves past them and waits on those fences before handing the same
//! bytes out again, so up to `SEGMENT_COUNT - 1` segments can be in flight
//! before the producer has to block.

use core::ptr::NonNull;

use magma_core::{
    BufferStorage, BufferTarget, DeviceCaps, Error, GpuBackend, MapAccess, Result, StorageFlags,
};

use crate::buffer::BufferObject;
use crate::config::StreamConfig;
use crate::mapping::MappingResult;
use crate::stats::StreamStats;
use crate::tracker::RingTracker;

/// Persistently mapped, fence-synchronized ring buffer
#[derive(Debug)]
pub struct PersistentMappedBuffer<B: GpuBackend> {
    // Field order is drop order: tokens go before the buffer object.
    tracker: RingTracker<B::Token>,
    /// Host mapping; `None` once torn down
    mapped: Option<NonNull<u8>>,
    coherent: bool,
    /// Capacity reported by the last `allocate`
    reported: u32,
    stats: StreamStats,
    buffer: BufferObject<B>,
}

// SAFETY: the mapping is only touched through `&mut self`, and the backend
// guarantees it stays valid until unmapped by this buffer.
unsafe impl<B> Send for PersistentMappedBuffer<B>
where
    B: GpuBackend + Send,
    B::Token: Send,
{
}

/// Pick coherent or explicitly flushed mapping for `caps`.
///
/// Falls back to whichever mode the device has when the requested one is
/// missing; a device with neither cannot host a persistent ring.
fn resolve_coherence(caps: DeviceCaps, want_coherent: bool) -> Result<bool> {
    let coherent = caps.contains(DeviceCaps::COHERENT_MAPPING);
    let flush = caps.contains(DeviceCaps::EXPLICIT_FLUSH);

    match (want_coherent, coherent, flush) {
        (true, true, _) => Ok(true),
        (false, _, true) => Ok(false),
        (true, false, true) => {
            log::warn!("coherent mapping unsupported, flushing committed ranges explicitly");
            Ok(false)
        }
        (false, true, false) => {
            log::warn!("explicit range flush unsupported, using a coherent mapping");
            Ok(true)
        }
        (_, false, false) => Err(Error::NotSupported),
    }
}

impl<B: GpuBackend> PersistentMappedBuffer<B> {
    /// Create immutable storage and map it for the buffer's lifetime
    pub fn create(
        backend: B,
        target: BufferTarget,
        size: u32,
        config: &StreamConfig,
    ) -> Result<Self> {
        let caps = backend.capabilities();
        if !caps.supports_persistent_streaming() {
            return Err(Error::NotSupported);
        }
        let coherent = resolve_coherence(caps, config.coherent)?;

        let buffer = BufferObject::create(
            backend,
            target,
            size,
            BufferStorage::Immutable(StorageFlags::persistent_stream(coherent)),
        )?;

        // A failed map drops `buffer`, which deletes the storage again
        let mapped = buffer.backend().map_buffer(
            buffer.handle(),
            size,
            MapAccess::persistent_stream(coherent),
        )?;

        log::debug!(
            "{}: persistent {} ring of {} bytes ({})",
            config.display_label(),
            target,
            size,
            if coherent { "coherent" } else { "explicit flush" }
        );

        Ok(Self {
            tracker: RingTracker::new(size),
            mapped: Some(mapped),
            coherent,
            reported: 0,
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

    /// Whether mapped writes are coherent (no flush on commit)
    pub fn is_coherent(&self) -> bool {
        self.coherent
    }

    /// Segment bookkeeping
    pub fn tracker(&self) -> &RingTracker<B::Token> {
        &self.tracker
    }

    /// Reserve at least `min_size` bytes at `alignment`, waiting for the
    /// device if the bytes are still in use.
    pub fn allocate(&mut self, alignment: u32, min_size: u32) -> Result<MappingResult<'_>> {
        let backend = self.buffer.backend();
        let reservation = self
            .tracker
            .reserve(alignment, min_size, || backend.insert_fence())?;

        self.stats.allocations += 1;
        self.stats.tokens_issued += reservation.tokens_issued as u64;
        self.stats.blocking_waits += reservation.blocking_waits as u64;
        if reservation.wrapped {
            self.stats.wraps += 1;
        }
        self.reported = reservation.available;

        let Some(mapped) = self.mapped else {
            return Err(Error::MappingFailed);
        };

        // SAFETY: the backend keeps the mapping valid for `size` bytes until
        // unmapped, and `offset + available <= size` by construction of the
        // reservation. The returned slice borrows `self` mutably, so no two
        // regions are alive at once.
        let data = unsafe {
            core::slice::from_raw_parts_mut(
                mapped.as_ptr().add(reservation.offset as usize),
                reservation.available as usize,
            )
        };
        Ok(MappingResult::new(data, reservation.offset, alignment))
    }

    /// Finish the write of `used` bytes at the last allocation
    pub fn commit(&mut self, used: u32) -> Result<()> {
        stream_assert!(
            used <= self.reported,
            "commit of {} bytes exceeds the {} bytes allocated",
            used,
            self.reported
        );

        if !self.coherent && used > 0 {
            self.buffer.backend().flush_mapped_range(
                self.buffer.handle(),
                self.tracker.cursor(),
                used,
            );
        }

        self.tracker.advance(used);
        self.reported = self.reported.saturating_sub(used);
        self.stats.record_commit(used);
        Ok(())
    }

    /// Drain every outstanding token, then unmap. Idempotent.
    fn teardown(&mut self) -> Result<()> {
        if self.mapped.take().is_none() {
            return Ok(());
        }

        let drained = self.tracker.drain();
        self.buffer.backend().unmap_buffer(self.buffer.handle());

        let drained = drained?;
        log::debug!(
            "persistent ring {} drained {} tokens",
            self.buffer.handle().id(),
            drained
        );
        Ok(())
    }

    /// Tear down, reporting a device loss seen while draining.
    ///
    /// The buffer is released either way.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }
}

impl<B: GpuBackend> Drop for PersistentMappedBuffer<B> {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::error!(
                "persistent ring {} torn down after {}",
                self.buffer.handle().id(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockEvent, MockFailures};
    use alloc::vec::Vec;

    fn ring(device: &MockDevice, size: u32) -> PersistentMappedBuffer<MockDevice> {
        PersistentMappedBuffer::create(
            device.clone(),
            BufferTarget::Vertex,
            size,
            &StreamConfig::default(),
        )
        .unwrap()
    }

    fn waits(device: &MockDevice) -> Vec<u64> {
        device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Wait(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_segment_example_wraps_after_first_fence() {
        // 100-byte segments
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 1600);

        let mut offsets = Vec::new();
        for _ in 0..17 {
            let region = stream.allocate(16, 90).unwrap();
            offsets.push(region.offset());
            stream.commit(90).unwrap();
        }

        // 90 bytes aligned to 16 advances 96 bytes per allocation
        for (i, offset) in offsets.iter().take(16).enumerate() {
            assert_eq!(*offset, i as u32 * 96);
        }
        // 16 * 96 = 1536, and 1536 + 90 > 1600: the 17th wraps
        assert_eq!(offsets[16], 0);
        assert_eq!(stream.stats().wraps, 1);

        // The wrap waited on segment 0's token (timeline value 1) first
        assert_eq!(waits(&device).first(), Some(&1));
    }

    #[test]
    fn test_round_trip_contents() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 1024);
        let handle = stream.buffer().handle();

        let mut region = stream.allocate(4, 8).unwrap();
        region.write(0, &[9, 8, 7, 6]).unwrap();
        stream.commit(4).unwrap();

        let mut region = stream.allocate(16, 32).unwrap();
        let offset = region.offset() as usize;
        assert_eq!(offset, 16);
        let pattern: Vec<u8> = (0..32).collect();
        region.write(0, &pattern).unwrap();
        stream.commit(32).unwrap();

        let contents = device.contents(handle).unwrap();
        assert_eq!(&contents[..4], &[9u8, 8, 7, 6]);
        assert_eq!(&contents[offset..offset + 32], &pattern[..]);
    }

    #[test]
    fn test_non_coherent_flushes_exact_range() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = PersistentMappedBuffer::create(
            device.clone(),
            BufferTarget::Uniform,
            512,
            &StreamConfig::default().non_coherent(),
        )
        .unwrap();
        let handle = stream.buffer().handle();
        assert!(!stream.is_coherent());

        stream.allocate(64, 40).unwrap();
        stream.commit(40).unwrap();
        stream.allocate(64, 10).unwrap();
        stream.commit(10).unwrap();

        let flushes: Vec<MockEvent> = device
            .events()
            .into_iter()
            .filter(|event| matches!(event, MockEvent::Flush { .. }))
            .collect();
        assert_eq!(
            flushes,
            [
                MockEvent::Flush { buffer: handle, offset: 0, len: 40 },
                MockEvent::Flush { buffer: handle, offset: 64, len: 10 },
            ]
        );
    }

    #[test]
    fn test_coherent_never_flushes() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 512);
        stream.allocate(4, 100).unwrap();
        stream.commit(100).unwrap();
        assert!(!device
            .events()
            .iter()
            .any(|event| matches!(event, MockEvent::Flush { .. })));
    }

    #[test]
    fn test_coherence_substitution() {
        let flush_only = DeviceCaps::PERSISTENT_MAPPING
            | DeviceCaps::FENCE_SYNC
            | DeviceCaps::EXPLICIT_FLUSH;
        assert_eq!(resolve_coherence(flush_only, true), Ok(false));

        let coherent_only = DeviceCaps::PERSISTENT_MAPPING
            | DeviceCaps::FENCE_SYNC
            | DeviceCaps::COHERENT_MAPPING;
        assert_eq!(resolve_coherence(coherent_only, false), Ok(true));
        assert_eq!(resolve_coherence(DeviceCaps::DESKTOP, false), Ok(false));

        let neither = DeviceCaps::PERSISTENT_MAPPING | DeviceCaps::FENCE_SYNC;
        assert_eq!(resolve_coherence(neither, true), Err(Error::NotSupported));
    }

    #[test]
    fn test_capacity_never_covers_a_fenced_segment() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 1000);

        for i in 0..200u32 {
            let size = 13 + (i * 37) % 180;
            let region = stream.allocate(8, size).unwrap();
            let start = region.offset();
            let end = start + region.capacity();
            assert!(region.capacity() >= size);
            assert!(end <= 1000);
            assert!(start < 1000);

            let tracker = stream.tracker();
            let first = tracker.segment_for_offset(start);
            let last = tracker.segment_for_offset(end - 1);
            for segment in first..=last {
                assert!(!tracker.has_token(segment), "segment {} still fenced", segment);
            }
            stream.commit(size).unwrap();
        }
    }

    #[test]
    fn test_drain_on_destroy_waits_before_release() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 1600);
        let handle = stream.buffer().handle();

        for _ in 0..10 {
            stream.allocate(4, 100).unwrap();
            stream.commit(100).unwrap();
        }
        stream.allocate(4, 1).unwrap();
        let outstanding = stream.tracker().outstanding();
        assert_eq!(outstanding, 10);
        assert!(device.is_mapped(handle));
        device.clear_events();

        stream.destroy().unwrap();
        assert!(!device.is_mapped(handle));

        let events = device.events();
        let wait_count = events
            .iter()
            .filter(|event| matches!(event, MockEvent::Wait(_)))
            .count();
        assert_eq!(wait_count, outstanding);

        let unmap = events.iter().position(|e| *e == MockEvent::Unmap(handle)).unwrap();
        let delete = events.iter().position(|e| *e == MockEvent::Delete(handle)).unwrap();
        let last_wait = events
            .iter()
            .rposition(|event| matches!(event, MockEvent::Wait(_)))
            .unwrap();
        assert!(last_wait < unmap);
        assert!(unmap < delete);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_drop_drains_like_destroy() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 400);
        let handle = stream.buffer().handle();
        stream.allocate(1, 300).unwrap();
        stream.commit(300).unwrap();
        stream.allocate(1, 50).unwrap();
        device.clear_events();

        drop(stream);

        let events = device.events();
        assert!(matches!(events.first(), Some(MockEvent::Wait(_))));
        assert_eq!(
            &events[events.len() - 2..],
            &[MockEvent::Unmap(handle), MockEvent::Delete(handle)]
        );
    }

    #[test]
    fn test_device_loss_is_fatal() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 400);
        device.set_auto_complete(false);

        stream.allocate(1, 390).unwrap();
        stream.commit(390).unwrap();
        device.lose_device();

        let err = stream.allocate(1, 100).unwrap_err();
        assert!(err.is_device_loss());
        // Retrying never hands out the ring while its fences are unwaited
        assert_eq!(stream.allocate(1, 100).err(), Some(Error::DeviceLost));
        assert!(stream.tracker().has_token(0));

        // Teardown still releases the buffer and reports the loss
        assert_eq!(stream.destroy(), Err(Error::DeviceLost));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_map_failure_releases_storage() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        device.set_failures(MockFailures::MAP);
        let result = PersistentMappedBuffer::create(
            device.clone(),
            BufferTarget::Vertex,
            256,
            &StreamConfig::default(),
        );
        assert_eq!(result.err(), Some(Error::MappingFailed));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_blocking_waits_only_when_device_behind() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 1600);

        // The consumer keeps up: every token is complete before it is needed
        for _ in 0..40 {
            stream.allocate(4, 100).unwrap();
            stream.commit(100).unwrap();
            device.complete_all();
        }
        assert!(stream.stats().wraps >= 2);
        assert_eq!(stream.stats().blocking_waits, 0);

        // The consumer stalls: the next wrap has to wait
        for _ in 0..20 {
            stream.allocate(4, 100).unwrap();
            stream.commit(100).unwrap();
        }
        assert!(stream.stats().blocking_waits > 0);
    }

    #[test]
    fn test_fence_failure_is_reported_and_retried() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 400);
        stream.allocate(1, 300).unwrap();
        stream.commit(300).unwrap();

        // Fencing segments 0..12 fails on the first one
        device.set_failures(MockFailures::FENCE);
        assert_eq!(stream.allocate(1, 10).err(), Some(Error::FenceFailed));
        assert_eq!(stream.tracker().outstanding(), 0);

        device.set_failures(MockFailures::empty());
        let region = stream.allocate(1, 10).unwrap();
        assert_eq!(region.offset(), 300);
        assert_eq!(stream.tracker().outstanding(), 12);

        device.clear_events();
        assert_eq!(stream.destroy(), Ok(()));
        let waits = device
            .events()
            .iter()
            .filter(|event| matches!(event, MockEvent::Wait(_)))
            .count();
        assert_eq!(waits, 12);
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    #[should_panic(expected = "exceeds the")]
    fn test_oversized_commit_panics() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 400);
        stream.allocate(4, 8).unwrap();
        let _ = stream.commit(401);
    }

    #[test]
    #[should_panic(expected = "exceeds ring capacity")]
    fn test_oversized_allocate_panics() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut stream = ring(&device, 400);
        let _ = stream.allocate(4, 401);
    }

    static_assertions::assert_impl_all!(PersistentMappedBuffer<MockDevice>: Send);
}
