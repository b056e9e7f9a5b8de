//! Configuration files and application create settings
//!
//! [`Config`] gives any serde type TOML or RON persistence chosen by file
//! extension. [`ApplicationCreateConfig`] is the record the application loop
//! creates its instance and window from.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Load and save a configuration as `.toml` or `.ron`
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match Format::of(path)? {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load from `path` if it exists, otherwise fall back to the defaults
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values that parse but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Window the application presents to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Client width in pixels
    pub width: u32,
    /// Client height in pixels
    pub height: u32,
    /// Title bar text
    pub title: String,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Multisample count for the color target
    pub sample_count: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan Application".to_string(),
            resizable: false,
            sample_count: 1,
        }
    }
}

/// Everything needed to create the instance and window of an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationCreateConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Requested API version, packed as by `vk::make_api_version`
    pub vulkan_api_version: u32,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Engine name reported to the driver
    pub engine_name: String,
    /// Engine version (major, minor, patch)
    pub engine_version: (u32, u32, u32),
    /// Instance layers to enable
    pub instance_layers: Vec<String>,
    /// Instance extensions to enable on top of the window system's
    pub instance_extensions: Vec<String>,
    /// Pause between loop iterations in milliseconds
    pub render_loop_ms: u64,
    /// Window settings
    pub window: WindowConfig,
}

impl Default for ApplicationCreateConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Application".to_string(),
            vulkan_api_version: ash::vk::make_api_version(0, 1, 0, 0),
            application_version: (1, 0, 0),
            engine_name: "DefaultEngine".to_string(),
            engine_version: (1, 0, 0),
            instance_layers: Vec::new(),
            instance_extensions: Vec::new(),
            render_loop_ms: 8,
            window: WindowConfig::default(),
        }
    }
}

impl Config for ApplicationCreateConfig {}

impl ApplicationCreateConfig {
    /// Defaults with the given application name
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set the API version
    pub fn with_api_version(mut self, major: u32, minor: u32) -> Self {
        self.vulkan_api_version = ash::vk::make_api_version(0, major, minor, 0);
        self
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set engine name and version
    pub fn with_engine(mut self, name: impl Into<String>, version: (u32, u32, u32)) -> Self {
        self.engine_name = name.into();
        self.engine_version = version;
        self
    }

    /// Enable an instance layer
    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.instance_layers.push(layer.into());
        self
    }

    /// Enable an instance extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.instance_extensions.push(extension.into());
        self
    }

    /// Set the pause between loop iterations
    pub fn with_render_loop_ms(mut self, render_loop_ms: u64) -> Self {
        self.render_loop_ms = render_loop_ms;
        self
    }

    /// Set window size and title
    pub fn with_window(mut self, width: u32, height: u32, title: impl Into<String>) -> Self {
        self.window.width = width;
        self.window.height = height;
        self.window.title = title.into();
        self
    }

    /// Set the multisample count
    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.window.sample_count = sample_count;
        self
    }

    /// Check that the values can be used to create an instance and window
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.trim().is_empty() {
            return Err("Application name must not be empty".to_string());
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(format!(
                "Window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            ));
        }
        let samples = self.window.sample_count;
        if !samples.is_power_of_two() || samples > 64 {
            return Err(format!("Sample count must be a power of two up to 64, got {samples}"));
        }
        Ok(())
    }
}
