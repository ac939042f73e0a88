//! # Mock Device
//!
//! An in-memory [`GpuBackend`] for tests. Buffers live in host memory, every
//! call is recorded as a [`MockEvent`], and fences are points on a shared
//! [`Timeline`] that tests (or a consumer thread) complete by hand.
//!
//! By default a wait completes its own token, as if the device caught up the
//! moment the host blocked. Turn that off with
//! [`set_auto_complete`](MockDevice::set_auto_complete) to model a stalled or
//! lost device.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use magma_core::{
    BufferHandle, BufferStorage, BufferTarget, CompletionToken, DeviceCaps, Error, GpuBackend,
    MapAccess, Result, Timeline, TimelineToken, UsageHint,
};
use spin::Mutex;

bitflags::bitflags! {
    /// Device calls the mock should fail
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MockFailures: u32 {
        /// Creating mutable storage fails
        const CREATE_MUTABLE = 1 << 0;
        /// Creating immutable storage fails
        const CREATE_IMMUTABLE = 1 << 1;
        /// Mapping fails
        const MAP = 1 << 2;
        /// Inserting a fence fails
        const FENCE = 1 << 3;
    }
}

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Buffer created
    Create {
        /// New buffer
        buffer: BufferHandle,
        /// Requested size
        size: u32,
        /// Requested storage
        storage: BufferStorage,
    },
    /// Buffer deleted
    Delete(BufferHandle),
    /// Target bound or cleared
    Bind(BufferTarget, Option<BufferHandle>),
    /// In-place upload
    SubData {
        /// Destination
        buffer: BufferHandle,
        /// Byte offset
        offset: u32,
        /// Bytes uploaded
        len: u32,
    },
    /// Whole-store replacement
    Data {
        /// Destination
        buffer: BufferHandle,
        /// New store size
        len: u32,
    },
    /// Buffer mapped
    Map(BufferHandle),
    /// Buffer unmapped
    Unmap(BufferHandle),
    /// Mapped range flushed
    Flush {
        /// Mapped buffer
        buffer: BufferHandle,
        /// Byte offset
        offset: u32,
        /// Bytes flushed
        len: u32,
    },
    /// Fence inserted at a timeline value
    Fence(u64),
    /// Host waited on a timeline value
    Wait(u64),
}

#[derive(Debug)]
struct MockBuffer {
    storage: BufferStorage,
    data: Box<[u8]>,
    mapped: bool,
}

#[derive(Debug)]
struct MockState {
    caps: DeviceCaps,
    next_buffer: u64,
    buffers: BTreeMap<u64, MockBuffer>,
    events: Vec<MockEvent>,
    failures: MockFailures,
    auto_complete: bool,
}

impl MockState {
    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut MockBuffer> {
        self.buffers
            .get_mut(&handle.id())
            .ok_or(Error::InvalidBuffer)
    }
}

/// Host-memory device with a scripted timeline
#[derive(Debug, Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    timeline: Arc<Timeline>,
}

impl MockDevice {
    /// Create a device advertising `caps`
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                caps,
                next_buffer: 1,
                buffers: BTreeMap::new(),
                events: Vec::new(),
                failures: MockFailures::empty(),
                auto_complete: true,
            })),
            timeline: Arc::new(Timeline::new()),
        }
    }

    /// Make the listed calls fail from now on
    pub fn set_failures(&self, failures: MockFailures) {
        self.state.lock().failures = failures;
    }

    /// Whether a wait completes its own token
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().auto_complete = enabled;
    }

    /// Retire device work up to timeline value `value`
    pub fn complete_through(&self, value: u64) {
        self.timeline.signal(value);
    }

    /// Retire all device work issued so far
    pub fn complete_all(&self) {
        self.timeline.signal_all();
    }

    /// Last retired timeline value
    pub fn completed_value(&self) -> u64 {
        self.timeline.completed()
    }

    /// Fences inserted so far
    pub fn issued_tokens(&self) -> u64 {
        self.timeline.issued()
    }

    /// Lose the device: pending waits fail
    pub fn lose_device(&self) {
        self.timeline.mark_lost();
    }

    /// Shared completion timeline
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Copy of a buffer's current store
    pub fn contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.buffers.get(&handle.id()).map(|b| b.data.to_vec())
    }

    /// Every call recorded since creation or the last clear
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    /// Forget recorded calls
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Buffers created and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Whether `handle` is currently mapped
    pub fn is_mapped(&self, handle: BufferHandle) -> bool {
        let state = self.state.lock();
        state.buffers.get(&handle.id()).is_some_and(|b| b.mapped)
    }
}

/// Fence on a [`MockDevice`] timeline
#[derive(Debug)]
pub struct MockToken {
    token: TimelineToken,
    device: MockDevice,
}

impl MockToken {
    /// Timeline value this token waits for
    pub fn value(&self) -> u64 {
        self.token.value()
    }
}

impl CompletionToken for MockToken {
    fn is_satisfied(&self) -> bool {
        self.token.is_satisfied()
    }

    fn wait(&mut self) -> Result<()> {
        let value = self.token.value();
        let auto_complete = {
            let mut state = self.device.state.lock();
            state.events.push(MockEvent::Wait(value));
            state.auto_complete
        };
        if auto_complete && !self.device.timeline.is_lost() {
            self.device.timeline.signal(value);
        }
        self.token.wait()
    }
}

// SAFETY: mapped pointers point into a boxed slice owned by the device state.
// The box is never reallocated while the buffer exists and is only freed by
// `delete_buffer`; the mock never touches it while mapped except to copy it
// out for inspection.
unsafe impl GpuBackend for MockDevice {
    type Token = MockToken;

    fn capabilities(&self) -> DeviceCaps {
        self.state.lock().caps
    }

    fn create_buffer(
        &self,
        _target: BufferTarget,
        size: u32,
        storage: BufferStorage,
    ) -> Result<BufferHandle> {
        let mut state = self.state.lock();
        if size == 0 {
            return Err(Error::InvalidParameter);
        }

        let failure = match storage {
            BufferStorage::Mutable(_) => MockFailures::CREATE_MUTABLE,
            BufferStorage::Immutable(_) => {
                if !state.caps.contains(DeviceCaps::PERSISTENT_MAPPING) {
                    return Err(Error::NotSupported);
                }
                MockFailures::CREATE_IMMUTABLE
            }
        };
        if state.failures.contains(failure) {
            return Err(Error::BufferCreationFailed);
        }

        let handle = BufferHandle::new(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(
            handle.id(),
            MockBuffer {
                storage,
                data: vec![0u8; size as usize].into_boxed_slice(),
                mapped: false,
            },
        );
        state.events.push(MockEvent::Create {
            buffer: handle,
            size,
            storage,
        });
        Ok(handle)
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer.id());
        state.events.push(MockEvent::Delete(buffer));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.state.lock().events.push(MockEvent::Bind(target, buffer));
    }

    fn buffer_sub_data(&self, buffer: BufferHandle, offset: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.caps.contains(DeviceCaps::BUFFER_SUB_DATA) {
            return Err(Error::NotSupported);
        }

        let store = state.buffer_mut(buffer)?;
        let start = offset as usize;
        let dst = start
            .checked_add(data.len())
            .and_then(|end| store.data.get_mut(start..end))
            .ok_or(Error::InvalidParameter)?;
        dst.copy_from_slice(data);

        state.events.push(MockEvent::SubData {
            buffer,
            offset,
            len: data.len() as u32,
        });
        Ok(())
    }

    fn buffer_data(&self, buffer: BufferHandle, data: &[u8], _usage: UsageHint) -> Result<()> {
        let mut state = self.state.lock();
        if !state.caps.contains(DeviceCaps::BUFFER_ORPHANING) {
            return Err(Error::NotSupported);
        }

        let store = state.buffer_mut(buffer)?;
        if matches!(store.storage, BufferStorage::Immutable(_)) {
            return Err(Error::NotSupported);
        }
        store.data = data.to_vec().into_boxed_slice();

        state.events.push(MockEvent::Data {
            buffer,
            len: data.len() as u32,
        });
        Ok(())
    }

    fn map_buffer(&self, buffer: BufferHandle, size: u32, _access: MapAccess) -> Result<NonNull<u8>> {
        let mut state = self.state.lock();
        if state.failures.contains(MockFailures::MAP) {
            return Err(Error::MappingFailed);
        }

        let store = state.buffer_mut(buffer)?;
        if store.mapped || size as usize > store.data.len() {
            return Err(Error::MappingFailed);
        }
        store.mapped = true;
        let ptr = NonNull::new(store.data.as_mut_ptr()).ok_or(Error::MappingFailed)?;

        state.events.push(MockEvent::Map(buffer));
        Ok(ptr)
    }

    fn unmap_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.lock();
        if let Ok(store) = state.buffer_mut(buffer) {
            store.mapped = false;
        }
        state.events.push(MockEvent::Unmap(buffer));
    }

    fn flush_mapped_range(&self, buffer: BufferHandle, offset: u32, len: u32) {
        self.state.lock().events.push(MockEvent::Flush {
            buffer,
            offset,
            len,
        });
    }

    fn insert_fence(&self) -> Result<MockToken> {
        let mut state = self.state.lock();
        if state.failures.contains(MockFailures::FENCE) {
            return Err(Error::FenceFailed);
        }

        let token = TimelineToken::issue(&self.timeline);
        state.events.push(MockEvent::Fence(token.value()));
        Ok(MockToken {
            token,
            device: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_data_bounds() {
        let device = MockDevice::new(DeviceCaps::LEGACY);
        let handle = device
            .create_buffer(
                BufferTarget::Vertex,
                8,
                BufferStorage::Mutable(UsageHint::StreamDraw),
            )
            .unwrap();
        assert_eq!(device.buffer_sub_data(handle, 4, &[1, 2, 3, 4]), Ok(()));
        assert_eq!(
            device.buffer_sub_data(handle, 5, &[1, 2, 3, 4]),
            Err(Error::InvalidParameter)
        );
        assert_eq!(device.contents(handle).unwrap(), [0u8, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fences_follow_the_timeline() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut first = device.insert_fence().unwrap();
        let second = device.insert_fence().unwrap();
        assert_eq!((first.value(), second.value()), (1, 2));
        assert!(!first.is_satisfied());

        device.complete_through(1);
        assert!(first.is_satisfied());
        assert!(!second.is_satisfied());
        assert_eq!(first.wait(), Ok(()));
        assert_eq!(device.issued_tokens(), 2);
    }

    #[test]
    fn test_lost_device_fails_waits() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let mut token = device.insert_fence().unwrap();
        device.lose_device();
        assert_eq!(token.wait(), Err(Error::DeviceLost));
        assert_eq!(device.events().last(), Some(&MockEvent::Wait(1)));
    }

    #[test]
    fn test_orphaning_immutable_storage_is_rejected() {
        let device = MockDevice::new(DeviceCaps::DESKTOP);
        let handle = device
            .create_buffer(
                BufferTarget::Uniform,
                64,
                BufferStorage::Immutable(magma_core::StorageFlags::persistent_stream(true)),
            )
            .unwrap();
        assert_eq!(
            device.buffer_data(handle, &[0; 4], UsageHint::StreamDraw),
            Err(Error::NotSupported)
        );
    }
}
