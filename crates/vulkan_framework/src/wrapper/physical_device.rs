//! Physical device queries, memory-type selection and device selection

use ash::vk;
use std::rc::Rc;

use super::instance::Instance;
use super::object::GpuObject;
use super::surface::Surface;
use crate::error::{VulkanError, VulkanResult};

/// A GPU enumerated from an instance
///
/// Physical devices are not destroyed; the wrapper only keeps the handle and a
/// weak link to the instance needed for every query.
pub struct PhysicalDevice {
    object: GpuObject<Instance, vk::PhysicalDevice>,
}

impl PhysicalDevice {
    /// Wrap a handle enumerated from `instance`
    pub fn new(instance: &Rc<Instance>, handle: vk::PhysicalDevice) -> Self {
        Self {
            object: GpuObject::new(instance, handle),
        }
    }

    /// Native handle
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }

    /// Owning instance, `None` if it was dropped
    pub fn instance(&self) -> Option<Rc<Instance>> {
        self.object.parent()
    }

    fn require_instance(&self) -> VulkanResult<Rc<Instance>> {
        self.object.require_parent()
    }

    /// Device properties and limits
    pub fn properties(&self) -> VulkanResult<vk::PhysicalDeviceProperties> {
        let instance = self.require_instance()?;
        Ok(unsafe { instance.raw().get_physical_device_properties(self.handle()) })
    }

    /// Supported core features
    pub fn features(&self) -> VulkanResult<vk::PhysicalDeviceFeatures> {
        let instance = self.require_instance()?;
        Ok(unsafe { instance.raw().get_physical_device_features(self.handle()) })
    }

    /// Memory heaps and types
    pub fn memory_properties(&self) -> VulkanResult<vk::PhysicalDeviceMemoryProperties> {
        let instance = self.require_instance()?;
        Ok(unsafe { instance.raw().get_physical_device_memory_properties(self.handle()) })
    }

    /// Queue families in index order
    pub fn queue_family_properties(&self) -> VulkanResult<Vec<vk::QueueFamilyProperties>> {
        let instance = self.require_instance()?;
        Ok(unsafe {
            instance
                .raw()
                .get_physical_device_queue_family_properties(self.handle())
        })
    }

    /// Lowest memory type index allowed by `type_filter` whose flags contain `properties`
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        find_memory_type_index(&self.memory_properties()?, type_filter, properties)
    }

    /// First graphics-capable queue family that can present to `surface`
    pub fn surface_supported_queue_family_index(
        &self,
        surface: &Surface,
    ) -> VulkanResult<Option<u32>> {
        let families = self.queue_family_properties()?;
        for (index, family) in (0u32..).zip(families.iter()) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && surface.supports_present(self.handle(), index)?
            {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Surface capabilities for this device
    pub fn surface_capabilities(&self, surface: &Surface) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        surface.capabilities(self.handle())
    }

    /// Preferred surface format
    ///
    /// Picks B8G8R8A8_SRGB with SRGB_NONLINEAR when offered, otherwise the first
    /// format the surface reports.
    pub fn surface_format(&self, surface: &Surface) -> VulkanResult<vk::SurfaceFormatKHR> {
        let formats = surface.formats(self.handle())?;
        choose_surface_format(&formats).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "surface reports no formats".to_string(),
        })
    }

    /// Present modes supported for `surface`
    pub fn surface_present_modes(&self, surface: &Surface) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        surface.present_modes(self.handle())
    }

    /// First candidate format whose tiling features contain `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        let instance = self.require_instance()?;
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    instance
                        .raw()
                        .get_physical_device_format_properties(self.handle(), format)
                };
                let supported = match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features,
                    _ => props.optimal_tiling_features,
                };
                supported.contains(features)
            })
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("none of {candidates:?} supports {features:?} with {tiling:?}"),
            })
    }

    /// Highest sample count usable for both colour and depth framebuffers
    pub fn max_usable_sample_count(&self) -> VulkanResult<vk::SampleCountFlags> {
        let limits = self.properties()?.limits;
        Ok(highest_sample_count(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        ))
    }
}

/// Select the lowest memory type index matching both filter and property flags
///
/// `type_filter` is the `memory_type_bits` of a resource's memory requirements:
/// bit `i` set means type `i` is acceptable. There is no fallback to a type with
/// fewer properties.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType {
            type_filter,
            properties,
        })
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

fn highest_sample_count(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// True if any queue family shares at least one bit with `flags`
pub fn any_family_supports(families: &[vk::QueueFamilyProperties], flags: vk::QueueFlags) -> bool {
    families.iter().any(|family| family.queue_flags.intersects(flags))
}

/// Filters enumerated physical devices down to the usable ones
///
/// Filters left unset do not constrain the result. `select` returns an empty
/// list when nothing survives.
#[derive(Default)]
pub struct PhysicalDeviceSelector<'a> {
    device_type: Option<vk::PhysicalDeviceType>,
    queue_types: Option<vk::QueueFlags>,
    surface: Option<&'a Surface>,
}

impl<'a> PhysicalDeviceSelector<'a> {
    /// Selector without filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only devices of `device_type`
    pub fn filter_by_device_type(&mut self, device_type: vk::PhysicalDeviceType) -> &mut Self {
        self.device_type = Some(device_type);
        self
    }

    /// Keep devices where some queue family supports any of `flags`
    pub fn filter_by_queue_types(&mut self, flags: vk::QueueFlags) -> &mut Self {
        self.queue_types = Some(flags);
        self
    }

    /// Keep devices with a graphics queue family that can present to `surface`
    pub fn filter_by_surface_support(&mut self, surface: &'a Surface) -> &mut Self {
        self.surface = Some(surface);
        self
    }

    /// Enumerate the instance's devices and apply the filters
    pub fn select(&self, instance: &Rc<Instance>) -> Vec<Rc<PhysicalDevice>> {
        let handles = match unsafe { instance.raw().enumerate_physical_devices() } {
            Ok(handles) if !handles.is_empty() => handles,
            Ok(_) => {
                log::error!("Failed to find Vulkan supported GPUs");
                return Vec::new();
            }
            Err(result) => {
                log::error!("Failed to enumerate GPUs: {result}");
                return Vec::new();
            }
        };

        let selected: Vec<_> = handles
            .into_iter()
            .map(|handle| PhysicalDevice::new(instance, handle))
            .filter(|device| self.accepts(device))
            .map(Rc::new)
            .collect();

        if selected.is_empty() {
            log::warn!("No physical device passed the selection filters");
        }
        selected
    }

    fn accepts(&self, device: &PhysicalDevice) -> bool {
        if let Some(device_type) = self.device_type {
            match device.properties() {
                Ok(props) if props.device_type == device_type => {}
                _ => return false,
            }
        }
        if let Some(flags) = self.queue_types {
            match device.queue_family_properties() {
                Ok(families) if any_family_supports(&families, flags) => {}
                _ => return false,
            }
        }
        if let Some(surface) = self.surface {
            return matches!(device.surface_supported_queue_family_index(surface), Ok(Some(_)));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_table(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            *slot = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props
    }

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_memory_type_picks_lowest_match() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let table = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(
            find_memory_type_index(&table, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
        assert_eq!(
            find_memory_type_index(&table, 0b111, vk::MemoryPropertyFlags::empty()).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let table = memory_table(&[host, host, host]);
        assert_eq!(find_memory_type_index(&table, 0b100, host).unwrap(), 2);
    }

    #[test]
    fn test_find_memory_type_requires_superset() {
        let table = memory_table(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let err = find_memory_type_index(&table, 0b11, wanted).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::NoSuitableMemoryType { type_filter: 0b11, .. }
        ));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut table = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        table.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type_index(&table, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn test_queue_filter_any_bit() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        assert!(any_family_supports(&families, vk::QueueFlags::COMPUTE));
        assert!(any_family_supports(
            &families,
            vk::QueueFlags::SPARSE_BINDING | vk::QueueFlags::TRANSFER
        ));
        assert!(!any_family_supports(&families, vk::QueueFlags::PROTECTED));
        assert!(!any_family_supports(&[], vk::QueueFlags::GRAPHICS));
    }

    #[test]
    fn test_surface_format_preference() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_highest_sample_count() {
        let counts = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(highest_sample_count(counts), vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            highest_sample_count(vk::SampleCountFlags::empty()),
            vk::SampleCountFlags::TYPE_1
        );
    }

    #[test]
    fn test_selector_with_unsupported_queue_flag_is_empty() {
        let Some(instance) = crate::wrapper::InstanceBuilder::new().build() else {
            eprintln!("Vulkan not available, skipping");
            return;
        };
        let selected = PhysicalDeviceSelector::new()
            .filter_by_queue_types(vk::QueueFlags::from_raw(1 << 30))
            .select(&instance);
        assert!(selected.is_empty());
    }
}
