//! Device memory allocations

use ash::vk;
use std::ffi::c_void;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;
use crate::error::{VulkanError, VulkanResult};

/// Range of a memory object, as (offset, size)
///
/// `size` may be `vk::WHOLE_SIZE` to reach the end of the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRange {
    /// Offset from the start of the allocation
    pub offset: vk::DeviceSize,
    /// Length in bytes or `vk::WHOLE_SIZE`
    pub size: vk::DeviceSize,
}

impl MappedRange {
    /// The whole allocation
    pub const WHOLE: Self = Self {
        offset: 0,
        size: vk::WHOLE_SIZE,
    };

    /// Range starting at `offset` spanning `size` bytes
    pub fn new(offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self { offset, size }
    }
}

impl Default for MappedRange {
    fn default() -> Self {
        Self::WHOLE
    }
}

/// A single `vkAllocateMemory` allocation
pub struct DeviceMemory {
    object: GpuObject<Device, vk::DeviceMemory>,
    size: vk::DeviceSize,
    memory_type_index: u32,
}

impl DeviceMemory {
    /// Allocate `size` bytes from memory type `memory_type_index`
    pub fn allocate(device: &Rc<Device>, size: vk::DeviceSize, memory_type_index: u32) -> Option<Self> {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        match unsafe { device.raw().allocate_memory(&alloc_info, None) } {
            Ok(handle) => Some(Self {
                object: GpuObject::new(device, handle),
                size,
                memory_type_index,
            }),
            Err(result) => {
                log::error!("Failed to allocate {size} bytes from memory type {memory_type_index}: {result}");
                None
            }
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory type the allocation came from
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    /// Map `size` bytes starting at `offset` into host address space
    pub fn map(
        &self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        flags: vk::MemoryMapFlags,
    ) -> VulkanResult<*mut c_void> {
        let device = self.object.require_parent()?;
        unsafe {
            device
                .raw()
                .map_memory(self.handle(), offset, size, flags)
                .map_err(VulkanError::api("vkMapMemory"))
        }
    }

    /// Make host writes in `ranges` visible to the device
    pub fn flush_mapped_ranges(&self, ranges: &[MappedRange]) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        let native = self.native_ranges(ranges);
        unsafe {
            device
                .raw()
                .flush_mapped_memory_ranges(&native)
                .map_err(VulkanError::api("vkFlushMappedMemoryRanges"))
        }
    }

    /// Make device writes in `ranges` visible to the host
    pub fn invalidate_mapped_ranges(&self, ranges: &[MappedRange]) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        let native = self.native_ranges(ranges);
        unsafe {
            device
                .raw()
                .invalidate_mapped_memory_ranges(&native)
                .map_err(VulkanError::api("vkInvalidateMappedMemoryRanges"))
        }
    }

    /// Release the host mapping
    pub fn unmap(&self) -> VulkanResult<()> {
        let device = self.object.require_parent()?;
        unsafe { device.raw().unmap_memory(self.handle()) };
        Ok(())
    }

    fn native_ranges(&self, ranges: &[MappedRange]) -> Vec<vk::MappedMemoryRange> {
        ranges
            .iter()
            .map(|range| {
                vk::MappedMemoryRange::builder()
                    .memory(self.handle())
                    .offset(range.offset)
                    .size(range.size)
                    .build()
            })
            .collect()
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().free_memory(handle, None);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_is_whole() {
        assert_eq!(MappedRange::default(), MappedRange::WHOLE);
        assert_eq!(MappedRange::WHOLE.size, vk::WHOLE_SIZE);
        assert_eq!(MappedRange::new(64, 128).offset, 64);
    }
}
