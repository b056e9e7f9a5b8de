//! Decoded texture pixels ready for upload

use ash::vk;
use std::path::Path;

use crate::error::{VulkanError, VulkanResult};

/// Pixels in host memory with the format they should be uploaded as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    format: vk::Format,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Decode an image file to RGBA8
    pub fn load(path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|e| VulkanError::Texture {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rgba = decoded.to_rgba8();
        log::debug!(
            "Loaded texture {} ({}x{})",
            path.display(),
            rgba.width(),
            rgba.height()
        );
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            format: vk::Format::R8G8B8A8_UNORM,
            pixels: rgba.into_raw(),
        })
    }

    /// Wrap raw pixels of `format`
    ///
    /// Accepts `R8G8B8A8_*` and `R8G8B8_*` formats; the byte count must
    /// match the dimensions exactly.
    pub fn from_pixels(width: u32, height: u32, format: vk::Format, pixels: Vec<u8>) -> VulkanResult<Self> {
        let channels = channel_count(format).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("unsupported texture format {format:?}"),
        })?;
        let expected = u64::from(width) * u64::from(height) * channels;
        if pixels.len() as u64 != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "{width}x{height} {format:?} texture needs {expected} bytes, got {}",
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Width in texels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Tightly packed rows
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Single-layer extent
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        }
    }
}

fn channel_count(format: vk::Format) -> Option<u64> {
    match format {
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => {
            Some(4)
        }
        vk::Format::R8G8B8_UNORM | vk::Format::R8G8B8_SRGB => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pixels_checks_size() {
        let texture = TextureData::from_pixels(2, 2, vk::Format::R8G8B8A8_UNORM, vec![0; 16]).unwrap();
        assert_eq!(texture.extent().depth, 1);
        assert_eq!(texture.pixels().len(), 16);

        assert!(TextureData::from_pixels(2, 2, vk::Format::R8G8B8_UNORM, vec![0; 16]).is_err());
        assert!(TextureData::from_pixels(1, 1, vk::Format::D32_SFLOAT, vec![0; 4]).is_err());
    }

    #[test]
    fn test_load_png_as_rgba() {
        let path = std::env::temp_dir().join(format!("vulkan_framework_texture_{}.png", std::process::id()));
        let source = image::RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8, y as u8, 7]));
        source.save(&path).unwrap();

        let texture = TextureData::load(&path).unwrap();
        assert_eq!((texture.width(), texture.height()), (3, 2));
        assert_eq!(texture.format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(&texture.pixels()[4..8], &[1, 0, 7, 255]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(matches!(
            TextureData::load("does/not/exist.png"),
            Err(VulkanError::Texture { .. })
        ));
    }
}
