//! Error types shared by the wrappers and the resource framework

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by wrapper operations, resource façades and the resource manager
///
/// Builders never produce these directly; they return `None` and leave the
/// decision to the caller. Façades turn such a `None` into [`VulkanError::BuildFailed`].
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A native call returned a failure code
    #[error("{operation} failed: {result}")]
    Api {
        /// Name of the native entry point
        operation: &'static str,
        /// Result code reported by the driver
        result: vk::Result,
    },

    /// A builder could not produce the requested object
    #[error("failed to build {object}")]
    BuildFailed {
        /// Human readable object kind
        object: &'static str,
    },

    /// The parent of an object was destroyed before the object itself
    #[error("parent of {object:?} object is no longer alive")]
    ParentDropped {
        /// Native type of the orphaned object
        object: vk::ObjectType,
    },

    /// No entry is registered under the given name
    #[error("{kind} '{name}' does not exist")]
    NotFound {
        /// Kind of registry that was searched
        kind: &'static str,
        /// Key that missed
        name: String,
    },

    /// No memory type satisfies both the requirement mask and the property flags
    #[error("failed to find suitable memory type (filter {type_filter:#b}, properties {properties:?})")]
    NoSuitableMemoryType {
        /// Bitmask of acceptable memory type indices
        type_filter: u32,
        /// Property flags the memory type must contain
        properties: vk::MemoryPropertyFlags,
    },

    /// The requested image layout transition has no known access and stage masks
    #[error("unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image is in
        old: vk::ImageLayout,
        /// Layout the image should end up in
        new: vk::ImageLayout,
    },

    /// The call is not valid in the object's current state
    #[error("invalid operation: {reason}")]
    InvalidOperation {
        /// What went wrong
        reason: String,
    },

    /// The Vulkan loader library could not be loaded
    #[error("failed to load Vulkan: {0}")]
    Loading(String),

    /// A SPIR-V binary could not be read
    #[error("failed to load shader {path:?}: {reason}")]
    ShaderLoad {
        /// Full path of the binary
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// A texture file could not be decoded
    #[error("failed to load texture {path:?}: {reason}")]
    Texture {
        /// Full path of the texture
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

impl VulkanError {
    /// Shorthand for `map_err` on raw ash results
    pub(crate) fn api(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Api { operation, result }
    }

    pub(crate) fn not_found(kind: &'static str, name: &str) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_names_operation() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            .map_err(VulkanError::api("vkAllocateMemory"))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("vkAllocateMemory failed"));
    }

    #[test]
    fn test_not_found_message() {
        let err = VulkanError::not_found("buffer", "vbo");
        assert_eq!(err.to_string(), "buffer 'vbo' does not exist");
    }
}
