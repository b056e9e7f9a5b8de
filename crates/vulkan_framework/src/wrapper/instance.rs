//! Vulkan instance and its builder
//!
//! The instance is the root of the ownership graph. It has no parent and owns
//! the loader entry, so every other wrapper ultimately hangs off an
//! `Rc<Instance>` held by the application.

use ash::extensions::ext::DebugUtils;
use ash::vk::{self, Handle};
use ash::{Entry, Instance as RawInstance};
use std::ffi::{CStr, CString};
use std::rc::Rc;

/// Owned Vulkan instance
pub struct Instance {
    entry: Entry,
    raw: RawInstance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// The loader entry used to create this instance
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The instance function table
    pub fn raw(&self) -> &RawInstance {
        &self.raw
    }

    /// Native handle
    pub fn handle(&self) -> vk::Instance {
        self.raw.handle()
    }

    /// Whether the native handle is non-null
    pub fn is_valid(&self) -> bool {
        self.handle().as_raw() != 0
    }

    /// Whether a debug-utils messenger routes validation output to `log`
    pub fn has_debug_messenger(&self) -> bool {
        self.debug.is_some()
    }

    /// Resolve an instance-level entry point by name
    pub fn get_proc_addr(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe {
            self.entry
                .get_instance_proc_addr(self.raw.handle(), name.as_ptr())
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

/// Builder for [`Instance`]
///
/// Defaults: application "Default Application" 1.0.0, engine "DefaultEngine"
/// 1.0.0, API version 1.0, no layers, no extensions. Enabling the
/// `VK_EXT_debug_utils` extension also installs a messenger that forwards
/// validation output to the `log` crate.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    application_name: String,
    application_version: u32,
    engine_name: String,
    engine_version: u32,
    api_version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            application_name: "Default Application".to_string(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_name: "DefaultEngine".to_string(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            layers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl InstanceBuilder {
    /// Start from the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Application name reported to the driver
    pub fn set_application_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.application_name = name.into();
        self
    }

    /// Packed application version
    pub fn set_application_version(&mut self, version: u32) -> &mut Self {
        self.application_version = version;
        self
    }

    /// Engine name reported to the driver
    pub fn set_engine_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.engine_name = name.into();
        self
    }

    /// Packed engine version
    pub fn set_engine_version(&mut self, version: u32) -> &mut Self {
        self.engine_version = version;
        self
    }

    /// Highest API version the application uses
    pub fn set_api_version(&mut self, version: u32) -> &mut Self {
        self.api_version = version;
        self
    }

    /// Enable one instance layer
    pub fn add_layer(&mut self, name: impl Into<String>) -> &mut Self {
        self.layers.push(name.into());
        self
    }

    /// Enable several instance layers
    pub fn add_layers<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layers.extend(names.into_iter().map(Into::into));
        self
    }

    /// Enable one instance extension
    pub fn add_extension(&mut self, name: impl Into<String>) -> &mut Self {
        self.extensions.push(name.into());
        self
    }

    /// Enable several instance extensions
    pub fn add_extensions<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions.extend(names.into_iter().map(Into::into));
        self
    }

    /// Layers enabled so far
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Extensions enabled so far
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn wants_debug_messenger(&self) -> bool {
        let debug_name = DebugUtils::name().to_string_lossy();
        self.extensions.iter().any(|ext| *ext == debug_name)
    }

    /// Load the Vulkan library and create the instance
    ///
    /// Returns `None` if the loader is missing, a name contains a NUL byte or
    /// `vkCreateInstance` fails.
    pub fn build(&self) -> Option<Rc<Instance>> {
        let entry = match unsafe { Entry::load() } {
            Ok(entry) => entry,
            Err(e) => {
                log::error!("Failed to load Vulkan library: {e}");
                return None;
            }
        };
        self.build_with_entry(entry)
    }

    /// Create the instance through an already loaded entry
    pub fn build_with_entry(&self, entry: Entry) -> Option<Rc<Instance>> {
        let application_name = to_cstring(&self.application_name)?;
        let engine_name = to_cstring(&self.engine_name)?;
        let layers = self
            .layers
            .iter()
            .map(|name| to_cstring(name))
            .collect::<Option<Vec<_>>>()?;
        let extensions = self
            .extensions
            .iter()
            .map(|name| to_cstring(name))
            .collect::<Option<Vec<_>>>()?;
        let layer_ptrs: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();
        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&application_name)
            .application_version(self.application_version)
            .engine_name(&engine_name)
            .engine_version(self.engine_version)
            .api_version(self.api_version);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let raw = match unsafe { entry.create_instance(&create_info, None) } {
            Ok(raw) => raw,
            Err(result) => {
                log::error!("Failed to create instance: {result}");
                return None;
            }
        };

        let debug = if self.wants_debug_messenger() {
            setup_debug_messenger(&entry, &raw)
        } else {
            None
        };

        log::debug!(
            "Created instance for '{}' with {} layers and {} extensions",
            self.application_name,
            self.layers.len(),
            self.extensions.len()
        );

        Some(Rc::new(Instance { entry, raw, debug }))
    }
}

fn to_cstring(value: &str) -> Option<CString> {
    match CString::new(value) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!("Invalid name {value:?}: {e}");
            None
        }
    }
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &RawInstance,
) -> Option<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = DebugUtils::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    match unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) } {
        Ok(messenger) => Some((debug_utils, messenger)),
        Err(result) => {
            log::warn!("Debug messenger unavailable: {result}");
            None
        }
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = InstanceBuilder::new();
        assert_eq!(builder.application_name, "Default Application");
        assert_eq!(builder.engine_name, "DefaultEngine");
        assert_eq!(builder.api_version, vk::API_VERSION_1_0);
        assert!(builder.layers().is_empty());
        assert!(builder.extensions().is_empty());
    }

    #[test]
    fn test_debug_messenger_follows_extension() {
        let mut builder = InstanceBuilder::new();
        assert!(!builder.wants_debug_messenger());
        builder.add_extensions(["VK_KHR_surface", "VK_EXT_debug_utils"]);
        assert!(builder.wants_debug_messenger());
    }

    #[test]
    fn test_interior_nul_fails_build() {
        let Ok(entry) = (unsafe { Entry::load() }) else {
            eprintln!("Vulkan loader not available, skipping");
            return;
        };
        let mut builder = InstanceBuilder::new();
        builder.set_application_name("bad\0name");
        assert!(builder.build_with_entry(entry).is_none());
    }
}
