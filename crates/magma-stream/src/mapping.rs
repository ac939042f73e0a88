//! # Mapping Results
//!
//! The writable window handed out by `allocate`.

use core::ops::{Deref, DerefMut};

use magma_core::{Error, Result};

/// A producer-writable region of a streaming buffer
///
/// The region borrows the buffer mutably, so it must be dropped before the
/// matching `commit`. Its length is the capacity reported by the allocation;
/// committing more than that is a caller bug.
#[derive(Debug)]
pub struct MappingResult<'a> {
    data: &'a mut [u8],
    offset: u32,
    alignment: u32,
}

impl<'a> MappingResult<'a> {
    pub(crate) fn new(data: &'a mut [u8], offset: u32, alignment: u32) -> Self {
        Self {
            data,
            offset,
            alignment,
        }
    }

    /// Byte offset of this region within the device buffer
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Offset in units of the requested alignment.
    ///
    /// With a vertex stride as the alignment this is the base vertex of the
    /// region.
    pub fn aligned_index(&self) -> u32 {
        self.offset / self.alignment
    }

    /// Whole alignment units available from `offset` before a wrap
    pub fn units_available(&self) -> u32 {
        self.capacity() / self.alignment
    }

    /// Writable bytes in this region
    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    /// Alignment the region was requested with
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Raw pointer to the start of the region
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    /// Copy `bytes` in at byte `at` of the region, returning the end offset
    /// of the write within the region.
    pub fn write(&mut self, at: usize, bytes: &[u8]) -> Result<u32> {
        let end = at.checked_add(bytes.len()).ok_or(Error::BufferOverflow)?;
        let dst = self.data.get_mut(at..end).ok_or(Error::BufferOverflow)?;
        dst.copy_from_slice(bytes);
        Ok(end as u32)
    }

    /// Copy plain-old-data values in at byte `at` of the region, returning
    /// the end offset of the write within the region.
    pub fn write_pod<T: bytemuck::Pod>(&mut self, at: usize, values: &[T]) -> Result<u32> {
        self.write(at, bytemuck::cast_slice(values))
    }
}

impl Deref for MappingResult<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl DerefMut for MappingResult<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Vertex {
        x: f32,
        y: f32,
        color: u32,
    }

    #[test]
    fn test_units_and_index() {
        let mut backing = [0u8; 100];
        let region = MappingResult::new(&mut backing, 96, 16);
        assert_eq!(region.aligned_index(), 6);
        assert_eq!(region.units_available(), 6);
        assert_eq!(region.capacity(), 100);
    }

    #[test]
    fn test_write_pod_layout() {
        let mut backing = [0u8; 48];
        let mut region = MappingResult::new(&mut backing, 0, 12);
        let verts = [
            Vertex { x: 1.0, y: 2.0, color: 0xff00_00ff },
            Vertex { x: 3.0, y: 4.0, color: 0x00ff_00ff },
        ];
        assert_eq!(region.write_pod(12, &verts), Ok(36));
        assert_eq!(&region[12..16], &1.0f32.to_ne_bytes());
        assert_eq!(&region[32..36], &0x00ff_00ffu32.to_ne_bytes());
        assert_eq!(&region[..12], &[0u8; 12]);
    }

    #[test]
    fn test_write_past_end_is_rejected() {
        let mut backing = [0u8; 8];
        let mut region = MappingResult::new(&mut backing, 0, 4);
        assert_eq!(region.write(4, &[1, 2, 3, 4]), Ok(8));
        assert_eq!(region.write(5, &[1, 2, 3, 4]), Err(Error::BufferOverflow));
        assert_eq!(region.write(usize::MAX, &[1]), Err(Error::BufferOverflow));
    }
}
