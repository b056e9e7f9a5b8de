//! Named sampler built from grouped settings

use ash::vk;
use std::rc::Rc;

use crate::error::{VulkanError, VulkanResult};
use crate::wrapper::{Device, Sampler, SamplerBuilder};

/// Filtering and anisotropy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerFiltering {
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Filtering between mip levels
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Anisotropic filtering on or off
    pub anisotropy_enable: bool,
    /// Anisotropy clamp
    pub max_anisotropy: f32,
}

impl Default for SamplerFiltering {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
        }
    }
}

/// Addressing outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerAddressing {
    /// U axis
    pub u: vk::SamplerAddressMode,
    /// V axis
    pub v: vk::SamplerAddressMode,
    /// W axis
    pub w: vk::SamplerAddressMode,
    /// Colour for clamp-to-border
    pub border_color: vk::BorderColor,
}

impl Default for SamplerAddressing {
    fn default() -> Self {
        Self {
            u: vk::SamplerAddressMode::REPEAT,
            v: vk::SamplerAddressMode::REPEAT,
            w: vk::SamplerAddressMode::REPEAT,
            border_color: vk::BorderColor::INT_TRANSPARENT_BLACK,
        }
    }
}

/// Level-of-detail control
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerLod {
    /// Bias added to the computed LOD
    pub mip_lod_bias: f32,
    /// Lower LOD clamp
    pub min_lod: f32,
    /// Upper LOD clamp
    pub max_lod: f32,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerComparison {
    /// Comparison on or off
    pub compare_enable: bool,
    /// Comparison operator
    pub compare_op: vk::CompareOp,
}

impl Default for SamplerComparison {
    fn default() -> Self {
        Self {
            compare_enable: false,
            compare_op: vk::CompareOp::ALWAYS,
        }
    }
}

/// What to create for a [`SamplerResource`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerResourceCreateInfo {
    /// Registry key
    pub name: String,
    /// Sampler creation flags
    pub flags: vk::SamplerCreateFlags,
    /// Filtering
    pub filtering: SamplerFiltering,
    /// Addressing
    pub addressing: SamplerAddressing,
    /// LOD range and bias
    pub lod: SamplerLod,
    /// Depth comparison
    pub comparison: SamplerComparison,
    /// Address texels in pixel units
    pub unnormalized_coordinates: bool,
}

impl SamplerResourceCreateInfo {
    fn builder(&self) -> SamplerBuilder {
        let mut builder = SamplerBuilder::new();
        builder
            .set_flags(self.flags)
            .set_filters(self.filtering.mag_filter, self.filtering.min_filter)
            .set_mipmap_mode(self.filtering.mipmap_mode)
            .enable_anisotropy(self.filtering.anisotropy_enable)
            .set_max_anisotropy(self.filtering.max_anisotropy)
            .set_address_modes(self.addressing.u, self.addressing.v, self.addressing.w)
            .set_border_color(self.addressing.border_color)
            .set_mipmap_lod_bias(self.lod.mip_lod_bias)
            .set_mipmap_lod_range(self.lod.min_lod, self.lod.max_lod)
            .enable_comparing(self.comparison.compare_enable)
            .set_compare_op(self.comparison.compare_op)
            .enable_unnormalized_coordinates(self.unnormalized_coordinates);
        builder
    }
}

/// Sampler registered under a name
pub struct SamplerResource {
    name: String,
    sampler: Sampler,
}

impl SamplerResource {
    /// Create the sampler described by `info`
    pub fn create(device: &Rc<Device>, info: &SamplerResourceCreateInfo) -> VulkanResult<Self> {
        let sampler = info
            .builder()
            .build(device)
            .ok_or(VulkanError::BuildFailed { object: "sampler" })?;
        log::debug!("Created sampler '{}'", info.name);
        Ok(Self {
            name: info.name.clone(),
            sampler,
        })
    }

    /// Registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sampler object
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::test_support::headless;

    #[test]
    fn test_defaults_match_sampler_builder() {
        let info = SamplerResourceCreateInfo::default();
        assert_eq!(info.filtering.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.addressing.u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.addressing.border_color, vk::BorderColor::INT_TRANSPARENT_BLACK);
        assert_eq!(info.comparison.compare_op, vk::CompareOp::ALWAYS);
        assert!((info.filtering.max_anisotropy - 1.0).abs() < f32::EPSILON);
        assert!(!info.unnormalized_coordinates);
    }

    #[test]
    fn test_linear_sampler_is_created() {
        let Some(gpu) = headless() else {
            return;
        };
        let info = SamplerResourceCreateInfo {
            name: "linear".into(),
            filtering: SamplerFiltering {
                mag_filter: vk::Filter::LINEAR,
                min_filter: vk::Filter::LINEAR,
                ..Default::default()
            },
            addressing: SamplerAddressing {
                u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                v: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                ..Default::default()
            },
            ..Default::default()
        };
        let resource = SamplerResource::create(&gpu.device, &info).unwrap();
        assert_eq!(resource.name(), "linear");
        assert!(resource.sampler().is_valid());
    }
}
