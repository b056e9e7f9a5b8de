//! Samplers and their builder

use ash::vk;
use std::rc::Rc;

use super::device::Device;
use super::object::GpuObject;

/// Texture sampler
pub struct Sampler {
    object: GpuObject<Device, vk::Sampler>,
}

impl Sampler {
    /// Native handle
    pub fn handle(&self) -> vk::Sampler {
        self.object.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.object.is_valid()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.object.release_with(|device, handle| unsafe {
            device.raw().destroy_sampler(handle, None);
        });
    }
}

/// Builder for [`Sampler`]
///
/// Defaults: nearest filtering and mipmapping, repeat on every axis, no
/// anisotropy, no comparison, LOD range `[0, 0]`, transparent black border.
#[derive(Debug, Clone, Copy)]
pub struct SamplerBuilder {
    flags: vk::SamplerCreateFlags,
    mag_filter: vk::Filter,
    min_filter: vk::Filter,
    mipmap_mode: vk::SamplerMipmapMode,
    address_mode_u: vk::SamplerAddressMode,
    address_mode_v: vk::SamplerAddressMode,
    address_mode_w: vk::SamplerAddressMode,
    mip_lod_bias: f32,
    anisotropy_enable: bool,
    max_anisotropy: f32,
    compare_enable: bool,
    compare_op: vk::CompareOp,
    min_lod: f32,
    max_lod: f32,
    border_color: vk::BorderColor,
    unnormalized_coordinates: bool,
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self {
            flags: vk::SamplerCreateFlags::empty(),
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_enable: false,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: 0.0,
            border_color: vk::BorderColor::INT_TRANSPARENT_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

impl SamplerBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation flags
    pub fn set_flags(&mut self, flags: vk::SamplerCreateFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Magnification and minification filters
    pub fn set_filters(&mut self, mag: vk::Filter, min: vk::Filter) -> &mut Self {
        self.mag_filter = mag;
        self.min_filter = min;
        self
    }

    /// Filtering between mip levels
    pub fn set_mipmap_mode(&mut self, mode: vk::SamplerMipmapMode) -> &mut Self {
        self.mipmap_mode = mode;
        self
    }

    /// Addressing outside `[0, 1]` per axis
    pub fn set_address_modes(
        &mut self,
        u: vk::SamplerAddressMode,
        v: vk::SamplerAddressMode,
        w: vk::SamplerAddressMode,
    ) -> &mut Self {
        self.address_mode_u = u;
        self.address_mode_v = v;
        self.address_mode_w = w;
        self
    }

    /// Bias added to the computed LOD
    pub fn set_mipmap_lod_bias(&mut self, bias: f32) -> &mut Self {
        self.mip_lod_bias = bias;
        self
    }

    /// Toggle anisotropic filtering
    pub fn enable_anisotropy(&mut self, enable: bool) -> &mut Self {
        self.anisotropy_enable = enable;
        self
    }

    /// Anisotropy clamp, used only when enabled
    pub fn set_max_anisotropy(&mut self, max: f32) -> &mut Self {
        self.max_anisotropy = max;
        self
    }

    /// Toggle depth comparison
    pub fn enable_comparing(&mut self, enable: bool) -> &mut Self {
        self.compare_enable = enable;
        self
    }

    /// Comparison operator, used only when comparing is enabled
    pub fn set_compare_op(&mut self, op: vk::CompareOp) -> &mut Self {
        self.compare_op = op;
        self
    }

    /// Clamp for the computed LOD
    pub fn set_mipmap_lod_range(&mut self, min: f32, max: f32) -> &mut Self {
        self.min_lod = min;
        self.max_lod = max;
        self
    }

    /// Colour returned by clamp-to-border addressing
    pub fn set_border_color(&mut self, color: vk::BorderColor) -> &mut Self {
        self.border_color = color;
        self
    }

    /// Address texels in pixel units instead of `[0, 1]`
    pub fn enable_unnormalized_coordinates(&mut self, enable: bool) -> &mut Self {
        self.unnormalized_coordinates = enable;
        self
    }

    /// Create the sampler on `device`
    pub fn build(&self, device: &Rc<Device>) -> Option<Sampler> {
        let create_info = vk::SamplerCreateInfo::builder()
            .flags(self.flags)
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mip_lod_bias(self.mip_lod_bias)
            .anisotropy_enable(self.anisotropy_enable)
            .max_anisotropy(self.max_anisotropy)
            .compare_enable(self.compare_enable)
            .compare_op(self.compare_op)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
            .border_color(self.border_color)
            .unnormalized_coordinates(self.unnormalized_coordinates);

        match unsafe { device.raw().create_sampler(&create_info, None) } {
            Ok(handle) => Some(Sampler {
                object: GpuObject::new(device, handle),
            }),
            Err(result) => {
                log::error!("Failed to create sampler: {result}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_defaults() {
        let builder = SamplerBuilder::new();
        assert_eq!(builder.mag_filter, vk::Filter::NEAREST);
        assert_eq!(builder.address_mode_w, vk::SamplerAddressMode::REPEAT);
        assert_eq!(builder.border_color, vk::BorderColor::INT_TRANSPARENT_BLACK);
        assert!(!builder.anisotropy_enable);
        assert!((builder.max_anisotropy - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_setters_chain() {
        let mut builder = SamplerBuilder::new();
        builder
            .set_filters(vk::Filter::LINEAR, vk::Filter::LINEAR)
            .enable_anisotropy(true)
            .set_max_anisotropy(8.0)
            .set_mipmap_lod_range(0.0, 4.0);
        assert_eq!(builder.min_filter, vk::Filter::LINEAR);
        assert!(builder.anisotropy_enable);
        assert!((builder.max_lod - 4.0).abs() < f32::EPSILON);
    }
}
