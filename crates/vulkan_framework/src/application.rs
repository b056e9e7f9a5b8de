//! Application trait and lifecycle management

use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ApplicationCreateConfig, ConfigError};
use crate::error::VulkanError;
use crate::wrapper::{Instance, InstanceBuilder};

/// Application lifecycle trait
///
/// Implement this for a windowed or headless program and hand it to
/// [`VulkanApplication::run`], which owns the instance and drives the loop.
pub trait VulkanApplication {
    /// Instance extensions the window system needs, e.g. the surface extensions
    fn required_instance_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Create devices, swap chain and resources
    ///
    /// Called once after the instance exists.
    fn init(&mut self, instance: &Rc<Instance>, config: &ApplicationCreateConfig) -> Result<(), AppError>;

    /// Advance application state; called before every frame
    fn update(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    /// Record and submit one frame
    fn draw_frame(&mut self) -> Result<(), AppError>;

    /// Whether the loop should stop after the current iteration
    fn should_close(&self) -> bool;

    /// Release everything created in `init`
    ///
    /// Always called, also when `init` or a frame fails.
    fn cleanup(&mut self);

    /// Create the instance from `config` and run the application until it closes
    fn run(&mut self, config: &ApplicationCreateConfig) -> Result<(), AppError>
    where
        Self: Sized,
    {
        config
            .validate()
            .map_err(|reason| AppError::Config(ConfigError::Invalid(reason)))?;

        let mut builder = instance_builder(config);
        builder.add_extensions(self.required_instance_extensions());
        let instance = builder.build().ok_or(AppError::InstanceCreation)?;
        log::info!("Created instance for '{}'", config.application_name);

        run_loop(self, &instance, config)
    }
}

/// Instance builder populated from the application config
pub fn instance_builder(config: &ApplicationCreateConfig) -> InstanceBuilder {
    let pack = |(major, minor, patch): (u32, u32, u32)| ash::vk::make_api_version(0, major, minor, patch);
    let mut builder = InstanceBuilder::new();
    builder
        .set_application_name(config.application_name.clone())
        .set_application_version(pack(config.application_version))
        .set_engine_name(config.engine_name.clone())
        .set_engine_version(pack(config.engine_version))
        .set_api_version(config.vulkan_api_version)
        .add_layers(config.instance_layers.iter().cloned())
        .add_extensions(config.instance_extensions.iter().cloned());
    builder
}

/// Drive `app` on an existing instance: init, then update and draw until it closes
///
/// `cleanup` runs before returning, whether the loop ended normally or on an error.
pub fn run_loop<A: VulkanApplication + ?Sized>(
    app: &mut A,
    instance: &Rc<Instance>,
    config: &ApplicationCreateConfig,
) -> Result<(), AppError> {
    let result = init_and_loop(app, instance, config);
    if let Err(e) = &result {
        log::error!("Application stopped: {e}");
    }
    app.cleanup();
    result
}

fn init_and_loop<A: VulkanApplication + ?Sized>(
    app: &mut A,
    instance: &Rc<Instance>,
    config: &ApplicationCreateConfig,
) -> Result<(), AppError> {
    app.init(instance, config)?;

    let pause = Duration::from_millis(config.render_loop_ms);
    let mut frames: u64 = 0;
    while !app.should_close() {
        app.update()?;
        app.draw_frame()?;
        frames += 1;
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
    log::info!("Render loop finished after {frames} frames");
    Ok(())
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Vulkan error propagated to application level
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The loader or driver refused to create an instance
    #[error("Failed to create Vulkan instance")]
    InstanceCreation,

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Scripted {
        frames_before_close: u32,
        fail_on_frame: Option<u32>,
        fail_init: bool,
        frames: u32,
        updates: u32,
        cleaned_up: bool,
    }

    impl VulkanApplication for Scripted {
        fn init(&mut self, _instance: &Rc<Instance>, _config: &ApplicationCreateConfig) -> Result<(), AppError> {
            if self.fail_init {
                return Err(AppError::Custom("init".into()));
            }
            Ok(())
        }

        fn update(&mut self) -> Result<(), AppError> {
            self.updates += 1;
            Ok(())
        }

        fn draw_frame(&mut self) -> Result<(), AppError> {
            self.frames += 1;
            if self.fail_on_frame == Some(self.frames) {
                return Err(AppError::Custom(format!("frame {}", self.frames)));
            }
            Ok(())
        }

        fn should_close(&self) -> bool {
            self.frames >= self.frames_before_close
        }

        fn cleanup(&mut self) {
            self.cleaned_up = true;
        }
    }

    fn quick_config() -> ApplicationCreateConfig {
        ApplicationCreateConfig::new("loop test").with_render_loop_ms(0)
    }

    fn instance() -> Option<Rc<Instance>> {
        let instance = instance_builder(&quick_config()).build();
        if instance.is_none() {
            eprintln!("Vulkan not available, skipping");
        }
        instance
    }

    #[test]
    fn test_instance_builder_from_config() {
        let config = ApplicationCreateConfig::new("app")
            .with_layer("VK_LAYER_KHRONOS_validation")
            .with_extension("VK_KHR_surface");
        let builder = instance_builder(&config);
        assert_eq!(builder.layers(), ["VK_LAYER_KHRONOS_validation".to_string()]);
        assert_eq!(builder.extensions(), ["VK_KHR_surface".to_string()]);
    }

    #[test]
    fn test_loop_runs_until_close() {
        let Some(instance) = instance() else {
            return;
        };
        let mut app = Scripted {
            frames_before_close: 3,
            ..Default::default()
        };
        run_loop(&mut app, &instance, &quick_config()).unwrap();
        assert_eq!((app.frames, app.updates), (3, 3));
        assert!(app.cleaned_up);
    }

    #[test]
    fn test_failing_frame_still_cleans_up() {
        let Some(instance) = instance() else {
            return;
        };
        let mut app = Scripted {
            frames_before_close: 10,
            fail_on_frame: Some(2),
            ..Default::default()
        };
        let result = run_loop(&mut app, &instance, &quick_config());
        assert!(matches!(result, Err(AppError::Custom(_))));
        assert_eq!(app.frames, 2);
        assert!(app.cleaned_up);
    }

    #[test]
    fn test_failing_init_skips_frames() {
        let Some(instance) = instance() else {
            return;
        };
        let mut app = Scripted {
            frames_before_close: 1,
            fail_init: true,
            ..Default::default()
        };
        assert!(run_loop(&mut app, &instance, &quick_config()).is_err());
        assert_eq!(app.frames, 0);
        assert!(app.cleaned_up);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_instance_creation() {
        let mut app = Scripted::default();
        let config = quick_config().with_window(0, 0, "bad");
        assert!(matches!(
            app.run(&config),
            Err(AppError::Config(ConfigError::Invalid(_)))
        ));
        assert!(!app.cleaned_up);
    }
}
