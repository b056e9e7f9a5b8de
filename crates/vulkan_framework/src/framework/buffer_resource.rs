//! Buffer plus bound device memory, created in one call

use ash::vk;
use std::ptr::NonNull;
use std::rc::Rc;

use super::{allocate_bound_memory, bind_or_release};
use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{Buffer, BufferBuilder, Device, DeviceMemory, MappedRange, PhysicalDevice};

/// What to create for a [`BufferResource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferResourceCreateInfo {
    /// Registry key
    pub name: String,
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// Buffer usage
    pub usage: vk::BufferUsageFlags,
    /// Required memory properties, `HOST_VISIBLE` by default
    pub memory_properties: vk::MemoryPropertyFlags,
}

impl Default for BufferResourceCreateInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE,
        }
    }
}

impl BufferResourceCreateInfo {
    /// Fully specified create info
    pub fn new(
        name: impl Into<String>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            memory_properties,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Mapping {
    ptr: NonNull<u8>,
    offset: vk::DeviceSize,
    len: usize,
    requested_size: vk::DeviceSize,
}

/// Buffer with its own memory allocation
///
/// Memory is mapped between [`BufferResource::map_memory`] and
/// [`BufferResource::unmap_memory`]; writes go through
/// [`BufferResource::flush_data`] in between. Only one mapping is live at a time.
pub struct BufferResource {
    buffer: Buffer,
    memory: DeviceMemory,
    mapping: Option<Mapping>,
    info: BufferResourceCreateInfo,
}

impl BufferResource {
    /// Create the buffer, allocate matching memory and bind it at offset 0
    pub fn create(
        physical_device: &PhysicalDevice,
        device: &Rc<Device>,
        info: &BufferResourceCreateInfo,
    ) -> VulkanResult<Self> {
        let buffer = BufferBuilder::new()
            .set_size(info.size)
            .set_usage(info.usage)
            .build(device)
            .ok_or(VulkanError::BuildFailed { object: "buffer" })?;

        let requirements = buffer.memory_requirements()?;
        let memory = allocate_bound_memory(physical_device, device, &requirements, info.memory_properties)?;
        let (buffer, memory) = bind_or_release(buffer, memory, |buffer, memory| buffer.bind_memory(memory, 0))?;

        log::debug!(
            "Created buffer '{}' ({} bytes, {:?}, memory type {})",
            info.name,
            info.size,
            info.usage,
            memory.memory_type_index()
        );
        Ok(Self {
            buffer,
            memory,
            mapping: None,
            info: info.clone(),
        })
    }

    /// Registry key
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Create info the resource was built from
    pub fn create_info(&self) -> &BufferResourceCreateInfo {
        &self.info
    }

    /// The buffer object
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The backing allocation
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// Whether a host mapping is live
    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Map `size` bytes at `offset`; `vk::WHOLE_SIZE` maps to the end
    pub fn map_memory(&mut self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        if self.mapping.is_some() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("buffer '{}' is already mapped", self.info.name),
            });
        }
        let len = mapped_len(self.memory.size(), offset, size).map_err(|reason| VulkanError::InvalidOperation {
            reason: format!("buffer '{}': {reason}", self.info.name),
        })?;
        let len = usize::try_from(len).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("mapping of {len} bytes does not fit the address space"),
        })?;

        let raw = self.memory.map(offset, size, vk::MemoryMapFlags::empty())?;
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or(VulkanError::InvalidOperation {
            reason: format!("vkMapMemory returned null for buffer '{}'", self.info.name),
        })?;
        log::trace!("Mapped {len} bytes of buffer '{}' at offset {offset}", self.info.name);
        self.mapping = Some(Mapping {
            ptr,
            offset,
            len,
            requested_size: size,
        });
        Ok(())
    }

    /// Copy `data` to the start of the mapping and flush the mapped range
    pub fn flush_data(&self, data: &[u8]) -> VulkanResult<()> {
        let mapping = self.require_mapping()?;
        self.flush_data_ranges(
            data,
            &[MappedRange::new(mapping.offset, mapping.requested_size)],
        )
    }

    /// Copy `data` to the start of the mapping and flush `ranges`
    ///
    /// Ranges are offsets into the allocation, not into the mapping.
    pub fn flush_data_ranges(&self, data: &[u8], ranges: &[MappedRange]) -> VulkanResult<()> {
        let mapping = self.require_mapping()?;
        if data.len() > mapping.len {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{} bytes do not fit the {} byte mapping of buffer '{}'",
                    data.len(),
                    mapping.len,
                    self.info.name
                ),
            });
        }
        // SAFETY: the mapping covers `mapping.len` bytes and stays live until unmap
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapping.ptr.as_ptr(), data.len());
        }
        self.memory.flush_mapped_ranges(ranges)
    }

    /// Read `len` bytes from the start of the mapping after invalidating it
    pub fn read_mapped(&self, len: usize) -> VulkanResult<Vec<u8>> {
        let mapping = self.require_mapping()?;
        if len > mapping.len {
            return Err(VulkanError::InvalidOperation {
                reason: format!("cannot read {len} bytes from a {} byte mapping", mapping.len),
            });
        }
        self.memory
            .invalidate_mapped_ranges(&[MappedRange::new(mapping.offset, mapping.requested_size)])?;
        // SAFETY: bounds checked against the live mapping above
        let bytes = unsafe { std::slice::from_raw_parts(mapping.ptr.as_ptr(), len) };
        Ok(bytes.to_vec())
    }

    /// Release the host mapping
    ///
    /// The resource stays mapped if the native unmap cannot be issued.
    pub fn unmap_memory(&mut self) -> VulkanResult<()> {
        if self.mapping.is_none() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("buffer '{}' is not mapped", self.info.name),
            });
        }
        self.memory.unmap()?;
        self.mapping = None;
        log::trace!("Unmapped buffer '{}'", self.info.name);
        Ok(())
    }

    fn require_mapping(&self) -> VulkanResult<Mapping> {
        self.mapping.ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("buffer '{}' is not mapped", self.info.name),
        })
    }
}

/// Bytes covered by mapping `size` at `offset` of a `memory_size` allocation
fn mapped_len(
    memory_size: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
) -> Result<vk::DeviceSize, String> {
    if offset >= memory_size {
        return Err(format!("offset {offset} is outside the {memory_size} byte allocation"));
    }
    let available = memory_size - offset;
    match size {
        vk::WHOLE_SIZE => Ok(available),
        0 => Err("cannot map zero bytes".to_string()),
        size if size > available => Err(format!(
            "{size} bytes at offset {offset} overrun the {memory_size} byte allocation"
        )),
        size => Ok(size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    fn host_info(size: vk::DeviceSize) -> BufferResourceCreateInfo {
        BufferResourceCreateInfo::new(
            "staging",
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    #[test]
    fn test_default_create_info_is_host_visible() {
        let info = BufferResourceCreateInfo::default();
        assert_eq!(info.memory_properties, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(info.name.is_empty());
    }

    #[test]
    fn test_map_flush_unmap_round_trip() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut resource = BufferResource::create(&gpu.physical_device, &gpu.device, &host_info(64)).unwrap();
        assert!(resource.buffer().is_valid());

        let data: Vec<u8> = (0..64).collect();
        resource.map_memory(vk::WHOLE_SIZE, 0).unwrap();
        resource.flush_data(&data).unwrap();
        resource.unmap_memory().unwrap();

        resource.map_memory(vk::WHOLE_SIZE, 0).unwrap();
        assert_eq!(resource.read_mapped(64).unwrap(), data);
        resource.unmap_memory().unwrap();
    }

    #[test]
    fn test_mapping_state_is_enforced() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut resource = BufferResource::create(&gpu.physical_device, &gpu.device, &host_info(16)).unwrap();
        assert!(matches!(
            resource.flush_data(&[1, 2, 3]),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(resource.unmap_memory().is_err());

        resource.map_memory(vk::WHOLE_SIZE, 0).unwrap();
        assert!(resource.map_memory(vk::WHOLE_SIZE, 0).is_err());
        let oversized = vec![0u8; resource.memory().size() as usize + 1];
        assert!(resource.flush_data(&oversized).is_err());
        resource.unmap_memory().unwrap();
    }

    #[test]
    fn test_mapped_len_bounds() {
        assert_eq!(mapped_len(64, 0, vk::WHOLE_SIZE), Ok(64));
        assert_eq!(mapped_len(64, 16, vk::WHOLE_SIZE), Ok(48));
        assert_eq!(mapped_len(64, 16, 48), Ok(48));
        assert!(mapped_len(64, 64, vk::WHOLE_SIZE).is_err());
        assert!(mapped_len(64, 100, 4).is_err());
        assert!(mapped_len(64, 16, 49).is_err());
        assert!(mapped_len(64, 0, 0).is_err());
    }

    #[test]
    fn test_out_of_range_mapping_is_rejected() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut resource = BufferResource::create(&gpu.physical_device, &gpu.device, &host_info(16)).unwrap();
        let memory_size = resource.memory().size();

        assert!(matches!(
            resource.map_memory(vk::WHOLE_SIZE, memory_size),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            resource.map_memory(memory_size + 1, 0),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(!resource.is_mapped());

        resource.map_memory(memory_size, 0).unwrap();
        resource.unmap_memory().unwrap();
    }

    #[test]
    fn test_failed_unmap_keeps_mapping() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut resource = BufferResource::create(&gpu.physical_device, &gpu.device, &host_info(16)).unwrap();
        resource.map_memory(vk::WHOLE_SIZE, 0).unwrap();

        drop(gpu);
        assert!(matches!(
            resource.unmap_memory(),
            Err(VulkanError::ParentDropped { .. })
        ));
        assert!(resource.is_mapped());
    }

    #[test]
    fn test_unsatisfiable_properties_fail() {
        let Some(gpu) = headless() else {
            return;
        };
        let info = BufferResourceCreateInfo::new(
            "impossible",
            16,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::from_raw(1 << 30),
        );
        assert!(matches!(
            BufferResource::create(&gpu.physical_device, &gpu.device, &info),
            Err(VulkanError::NoSuitableMemoryType { .. })
        ));
    }
}
