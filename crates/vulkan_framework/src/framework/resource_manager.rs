//! Name-keyed owner of every declarative resource

use ash::vk;
use std::collections::HashMap;
use std::rc::Rc;

use super::buffer_resource::{BufferResource, BufferResourceCreateInfo};
use super::descriptor_registry::{DescriptorRegistry, DescriptorResourceCreateInfo};
use super::descriptor_updater::{DescriptorUpdateInfo, DescriptorUpdater};
use super::image_resource::{full_copy_region, ImageResource, ImageResourceCreateInfo};
use super::sampler_resource::{SamplerResource, SamplerResourceCreateInfo};
use super::shader_resource::{ShaderLoader, ShaderModulesCreateInfo, ShaderResource};
use super::texture::TextureData;
use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{
    Buffer, CommandPool, DescriptorSet, DescriptorSetLayout, Device, Image, ImageView, PhysicalDevice, Queue,
    Sampler, ShaderModule,
};

/// Everything [`ResourceManager::create_resources`] should build
///
/// Sections left as `None` are skipped.
#[derive(Debug, Clone, Default)]
pub struct ResourceDescriptor {
    /// Buffers
    pub buffers: Option<Vec<BufferResourceCreateInfo>>,
    /// Images
    pub images: Option<Vec<ImageResourceCreateInfo>>,
    /// Samplers
    pub samplers: Option<Vec<SamplerResourceCreateInfo>>,
    /// Shader modules
    pub shaders: Option<ShaderModulesCreateInfo>,
    /// Descriptor pool, layouts and sets
    pub descriptors: Option<DescriptorResourceCreateInfo>,
}

/// Buffers, images, samplers, shader modules and descriptors keyed by name
///
/// Creation is not transactional: when one entry of a batch fails, the
/// entries created before it stay registered and the error is returned.
pub struct ResourceManager {
    updater: DescriptorUpdater,
    registry: Option<DescriptorRegistry>,
    shaders: ShaderResource,
    samplers: HashMap<String, SamplerResource>,
    images: HashMap<String, ImageResource>,
    buffers: HashMap<String, BufferResource>,
    device: Rc<Device>,
    physical_device: Rc<PhysicalDevice>,
}

impl ResourceManager {
    /// Empty manager creating resources on `device`
    pub fn new(physical_device: &Rc<PhysicalDevice>, device: &Rc<Device>) -> Self {
        Self {
            updater: DescriptorUpdater::new(),
            registry: None,
            shaders: ShaderResource::new(),
            samplers: HashMap::new(),
            images: HashMap::new(),
            buffers: HashMap::new(),
            device: Rc::clone(device),
            physical_device: Rc::clone(physical_device),
        }
    }

    /// The device resources are created on
    pub fn device(&self) -> &Rc<Device> {
        &self.device
    }

    /// Apply every section of `descriptor`: buffers, images, samplers, shaders, descriptors
    pub fn create_resources(&mut self, descriptor: &ResourceDescriptor) -> VulkanResult<()> {
        if let Some(buffers) = &descriptor.buffers {
            self.create_buffers(buffers)?;
        }
        if let Some(images) = &descriptor.images {
            self.create_images(images)?;
        }
        if let Some(samplers) = &descriptor.samplers {
            self.create_samplers(samplers)?;
        }
        if let Some(shaders) = &descriptor.shaders {
            self.create_shader_modules(shaders)?;
        }
        if let Some(descriptors) = &descriptor.descriptors {
            self.create_descriptor_sets(descriptors)?;
        }
        Ok(())
    }

    /// Create one [`BufferResource`] per entry, keyed by its name
    pub fn create_buffers(&mut self, infos: &[BufferResourceCreateInfo]) -> VulkanResult<()> {
        for info in infos {
            let resource = BufferResource::create(&self.physical_device, &self.device, info)?;
            self.buffers.insert(info.name.clone(), resource);
        }
        Ok(())
    }

    /// Create one [`ImageResource`] per entry, keyed by its name
    pub fn create_images(&mut self, infos: &[ImageResourceCreateInfo]) -> VulkanResult<()> {
        for info in infos {
            let resource = ImageResource::create(&self.physical_device, &self.device, info)?;
            self.images.insert(info.name.clone(), resource);
        }
        Ok(())
    }

    /// Create one [`SamplerResource`] per entry, keyed by its name
    pub fn create_samplers(&mut self, infos: &[SamplerResourceCreateInfo]) -> VulkanResult<()> {
        for info in infos {
            let resource = SamplerResource::create(&self.device, info)?;
            self.samplers.insert(info.name.clone(), resource);
        }
        Ok(())
    }

    /// Replace the shader modules with those in `info`, read from disk
    pub fn create_shader_modules(&mut self, info: &ShaderModulesCreateInfo) -> VulkanResult<()> {
        self.shaders = ShaderResource::new();
        self.shaders.create_shaders(&self.device, info)
    }

    /// Replace the shader modules with those in `info`, read through `loader`
    pub fn create_shader_modules_with(
        &mut self,
        info: &ShaderModulesCreateInfo,
        loader: &dyn ShaderLoader,
    ) -> VulkanResult<()> {
        self.shaders = ShaderResource::new();
        self.shaders.create_shaders_with(&self.device, info, loader)
    }

    /// Replace the descriptor registry with one built from `info`
    pub fn create_descriptor_sets(&mut self, info: &DescriptorResourceCreateInfo) -> VulkanResult<()> {
        self.updater = DescriptorUpdater::new();
        let registry = self.registry.insert(DescriptorRegistry::new(&self.device));
        registry.create_descriptors(info)
    }

    /// Queue every request in `info` and apply them as one batch
    pub fn update_descriptor_set(&mut self, info: &DescriptorUpdateInfo) -> VulkanResult<usize> {
        let registry = self.registry.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor sets must be created before they are updated".to_string(),
        })?;
        self.updater.add_update_info(info);
        self.updater.apply_updates(registry, self.device.as_ref())
    }

    /// Buffer object registered as `name`
    pub fn buffer(&self, name: &str) -> VulkanResult<&Buffer> {
        self.buffer_resource(name).map(BufferResource::buffer)
    }

    /// Buffer resource registered as `name`
    pub fn buffer_resource(&self, name: &str) -> VulkanResult<&BufferResource> {
        self.buffers
            .get(name)
            .ok_or_else(|| VulkanError::not_found("buffer", name))
    }

    /// Mutable buffer resource registered as `name`, for mapping
    pub fn buffer_resource_mut(&mut self, name: &str) -> VulkanResult<&mut BufferResource> {
        self.buffers
            .get_mut(name)
            .ok_or_else(|| VulkanError::not_found("buffer", name))
    }

    /// Image object registered as `name`
    pub fn image(&self, name: &str) -> VulkanResult<&Image> {
        self.image_resource(name).map(ImageResource::image)
    }

    /// Image resource registered as `name`
    pub fn image_resource(&self, name: &str) -> VulkanResult<&ImageResource> {
        self.images
            .get(name)
            .ok_or_else(|| VulkanError::not_found("image", name))
    }

    /// View `view` of image `image`
    pub fn image_view(&self, image: &str, view: &str) -> VulkanResult<&ImageView> {
        self.image_resource(image)?.image_view(view)
    }

    /// Sampler registered as `name`
    pub fn sampler(&self, name: &str) -> VulkanResult<&Sampler> {
        self.samplers
            .get(name)
            .map(SamplerResource::sampler)
            .ok_or_else(|| VulkanError::not_found("sampler", name))
    }

    /// Shader module registered as `name`
    pub fn shader_module(&self, name: &str) -> VulkanResult<&ShaderModule> {
        self.shaders.shader_module(name)
    }

    /// Descriptor set layout registered as `name`
    pub fn descriptor_layout(&self, name: &str) -> VulkanResult<&DescriptorSetLayout> {
        self.registry
            .as_ref()
            .ok_or_else(|| VulkanError::not_found("descriptor set layout", name))?
            .descriptor_layout(name)
    }

    /// Descriptor set registered as `name`
    pub fn descriptor_set(&self, name: &str) -> VulkanResult<&DescriptorSet> {
        self.registry
            .as_ref()
            .ok_or_else(|| VulkanError::not_found("descriptor set", name))?
            .descriptor_set(name)
    }

    /// The descriptor registry, once created
    pub fn descriptor_registry_mut(&mut self) -> Option<&mut DescriptorRegistry> {
        self.registry.as_mut()
    }

    /// Map buffer `name`, copy `data` to its start, flush and unmap
    pub fn set_buffer<T: bytemuck::Pod>(&mut self, name: &str, data: &[T]) -> VulkanResult<()> {
        let resource = self.buffer_resource_mut(name)?;
        resource.map_memory(vk::WHOLE_SIZE, 0)?;
        let written = resource.flush_data(bytemuck::cast_slice(data));
        let unmapped = resource.unmap_memory();
        written.and(unmapped)
    }

    /// Upload `staging` into image `name` and leave it shader-readable
    ///
    /// Runs UNDEFINED -> TRANSFER_DST, the copy, then TRANSFER_DST ->
    /// SHADER_READ_ONLY, each submitted and waited on separately.
    pub fn set_image_from_buffer(
        &self,
        pool: &Rc<CommandPool>,
        queue: &Queue,
        name: &str,
        staging: &Buffer,
        dimensions: vk::Extent3D,
    ) -> VulkanResult<()> {
        let image = self.image_resource(name)?;
        image.change_image_layout(
            pool,
            queue,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        image.copy_data_from_buffer(pool, queue, staging, full_copy_region(dimensions))?;
        image.change_image_layout(
            pool,
            queue,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    /// Stage `texture` in a temporary host-visible buffer and upload it into image `name`
    ///
    /// The texture must be non-empty and match the image's format and extent;
    /// otherwise nothing is recorded.
    pub fn set_image_from_texture(
        &self,
        pool: &Rc<CommandPool>,
        queue: &Queue,
        name: &str,
        texture: &TextureData,
    ) -> VulkanResult<()> {
        let image = self.image_resource(name)?;
        check_texture_fits(texture, image.format(), image.extent()).map_err(|reason| {
            VulkanError::InvalidOperation {
                reason: format!("cannot upload into image '{name}': {reason}"),
            }
        })?;

        let mut staging = BufferResource::create(
            &self.physical_device,
            &self.device,
            &BufferResourceCreateInfo::new(
                format!("{name}.staging"),
                texture.pixels().len() as vk::DeviceSize,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        )?;
        staging.map_memory(vk::WHOLE_SIZE, 0)?;
        staging.flush_data(texture.pixels())?;
        staging.unmap_memory()?;
        self.set_image_from_buffer(pool, queue, name, staging.buffer(), texture.extent())
    }

    /// Drop buffer `name`
    pub fn delete_buffer(&mut self, name: &str) -> VulkanResult<()> {
        self.buffers
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("buffer", name))
    }

    /// Drop image `name` with its views and memory
    pub fn delete_image(&mut self, name: &str) -> VulkanResult<()> {
        self.images
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("image", name))
    }

    /// Drop sampler `name`
    pub fn delete_sampler(&mut self, name: &str) -> VulkanResult<()> {
        self.samplers
            .remove(name)
            .map(drop)
            .ok_or_else(|| VulkanError::not_found("sampler", name))
    }

    /// Drop shader module `name`
    pub fn delete_shader_module(&mut self, name: &str) -> VulkanResult<()> {
        self.shaders.delete_shader_module(name)
    }
}

fn check_texture_fits(texture: &TextureData, format: vk::Format, extent: vk::Extent3D) -> Result<(), String> {
    if texture.pixels().is_empty() {
        return Err(format!("texture is empty ({}x{})", texture.width(), texture.height()));
    }
    if texture.format() != format {
        return Err(format!("texture is {:?}, image is {format:?}", texture.format()));
    }
    if texture.extent() != extent {
        let actual = texture.extent();
        return Err(format!(
            "texture is {}x{}x{}, image is {}x{}x{}",
            actual.width, actual.height, actual.depth, extent.width, extent.height, extent.depth
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::descriptor_registry::{DescriptorLayoutInfo, DescriptorSetInfo};
    use crate::framework::descriptor_updater::BufferWriteRequest;
    use crate::framework::image_resource::ImageViewCreateInfo;
    use crate::wrapper::test_support::headless;

    fn vbo_info() -> BufferResourceCreateInfo {
        BufferResourceCreateInfo::new(
            "vbo",
            1024,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    fn descriptor_info() -> DescriptorResourceCreateInfo {
        DescriptorResourceCreateInfo {
            max_sets: 1,
            pool_sizes: vec![vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1,
            }],
            layouts: vec![DescriptorLayoutInfo {
                name: "L".into(),
                bindings: vec![vk::DescriptorSetLayoutBinding::builder()
                    .binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX)
                    .build()],
            }],
            descriptor_sets: vec![DescriptorSetInfo {
                name: "S".into(),
                layout_name: "L".into(),
            }],
        }
    }

    #[test]
    fn test_vertex_buffer_round_trip() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut manager = ResourceManager::new(&gpu.physical_device, &gpu.device);
        manager.create_buffers(&[vbo_info()]).unwrap();
        assert!(manager.buffer("vbo").unwrap().is_valid());

        let data: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        manager.set_buffer("vbo", &data).unwrap();

        let resource = manager.buffer_resource_mut("vbo").unwrap();
        resource.map_memory(vk::WHOLE_SIZE, 0).unwrap();
        assert_eq!(resource.read_mapped(1024).unwrap(), data);
        resource.unmap_memory().unwrap();
    }

    #[test]
    fn test_unregistered_names_fail() {
        let Some(gpu) = headless() else {
            return;
        };
        let manager = ResourceManager::new(&gpu.physical_device, &gpu.device);
        assert!(matches!(manager.buffer("vbo"), Err(VulkanError::NotFound { .. })));
        assert!(manager.image("albedo").is_err());
        assert!(manager.image_view("albedo", "color").is_err());
        assert!(manager.sampler("linear").is_err());
        assert!(manager.shader_module("main.vert").is_err());
        assert!(manager.descriptor_layout("L").is_err());
        assert!(manager.descriptor_set("S").is_err());
    }

    #[test]
    fn test_descriptor_scenario_and_update() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut manager = ResourceManager::new(&gpu.physical_device, &gpu.device);
        manager
            .create_resources(&ResourceDescriptor {
                buffers: Some(vec![BufferResourceCreateInfo::new(
                    "ubo",
                    256,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )]),
                descriptors: Some(descriptor_info()),
                ..Default::default()
            })
            .unwrap();
        assert!(manager.descriptor_set("S").unwrap().is_valid());
        assert!(matches!(
            manager.descriptor_layout("missing"),
            Err(VulkanError::NotFound { .. })
        ));

        let ubo = manager.buffer("ubo").unwrap().handle();
        let ubo_write = |set_name: &str| DescriptorUpdateInfo {
            buffer_writes: vec![BufferWriteRequest {
                set_name: set_name.into(),
                binding: 0,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                buffers: vec![vk::DescriptorBufferInfo {
                    buffer: ubo,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                }],
                array_element: 0,
            }],
            ..Default::default()
        };

        // A misspelt set fails alone and does not linger in the next batch
        assert!(matches!(
            manager.update_descriptor_set(&ubo_write("typo")),
            Err(VulkanError::NotFound { .. })
        ));
        assert_eq!(manager.update_descriptor_set(&ubo_write("S")).unwrap(), 1);
    }

    #[test]
    fn test_failed_batch_keeps_earlier_entries() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut manager = ResourceManager::new(&gpu.physical_device, &gpu.device);
        let mut impossible = vbo_info();
        impossible.name = "impossible".into();
        impossible.memory_properties = vk::MemoryPropertyFlags::from_raw(1 << 30);

        assert!(manager.create_buffers(&[vbo_info(), impossible]).is_err());
        assert!(manager.buffer("vbo").is_ok());
        assert!(manager.buffer("impossible").is_err());
        manager.delete_buffer("vbo").unwrap();
        assert!(manager.buffer("vbo").is_err());
    }

    #[test]
    fn test_texture_must_match_image() {
        let format = vk::Format::R8G8B8A8_UNORM;
        let extent = vk::Extent3D {
            width: 2,
            height: 2,
            depth: 1,
        };
        let rgba = TextureData::from_pixels(2, 2, format, vec![0; 16]).unwrap();
        assert!(check_texture_fits(&rgba, format, extent).is_ok());

        let rgb = TextureData::from_pixels(2, 2, vk::Format::R8G8B8_UNORM, vec![0; 12]).unwrap();
        assert!(check_texture_fits(&rgb, format, extent).is_err());

        let larger = TextureData::from_pixels(4, 4, format, vec![0; 64]).unwrap();
        assert!(check_texture_fits(&larger, format, extent).is_err());

        let empty = TextureData::from_pixels(0, 0, format, Vec::new()).unwrap();
        assert!(check_texture_fits(&empty, format, vk::Extent3D { width: 0, height: 0, depth: 1 }).is_err());
    }

    #[test]
    fn test_texture_upload_into_named_image() {
        let Some(gpu) = headless() else {
            return;
        };
        let mut manager = ResourceManager::new(&gpu.physical_device, &gpu.device);
        let format = vk::Format::R8G8B8A8_UNORM;
        manager
            .create_images(&[ImageResourceCreateInfo {
                name: "albedo".into(),
                memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                format,
                dimensions: vk::Extent3D {
                    width: 2,
                    height: 2,
                    depth: 1,
                },
                views: vec![ImageViewCreateInfo {
                    name: "color".into(),
                    format,
                    ..Default::default()
                }],
                ..Default::default()
            }])
            .unwrap();
        manager
            .create_samplers(&[SamplerResourceCreateInfo {
                name: "nearest".into(),
                ..Default::default()
            }])
            .unwrap();

        let texture = TextureData::from_pixels(2, 2, format, vec![128; 16]).unwrap();
        let pool = gpu.command_pool();
        let queue = gpu.queue();
        manager
            .set_image_from_texture(&pool, &queue, "albedo", &texture)
            .unwrap();
        assert!(manager.image_view("albedo", "color").unwrap().is_valid());
        assert!(manager.sampler("nearest").unwrap().is_valid());

        let rgb = TextureData::from_pixels(2, 2, vk::Format::R8G8B8_UNORM, vec![128; 12]).unwrap();
        assert!(matches!(
            manager.set_image_from_texture(&pool, &queue, "albedo", &rgb),
            Err(VulkanError::InvalidOperation { .. })
        ));
        let empty = TextureData::from_pixels(0, 0, format, Vec::new()).unwrap();
        assert!(matches!(
            manager.set_image_from_texture(&pool, &queue, "albedo", &empty),
            Err(VulkanError::InvalidOperation { .. })
        ));

        manager.delete_image("albedo").unwrap();
        manager.delete_sampler("nearest").unwrap();
        assert!(manager.delete_image("albedo").is_err());
    }
}
