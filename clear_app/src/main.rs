//! Clear-screen demo application
//!
//! Opens a window, creates a swap chain and clears it to a cycling color
//! every frame. Settings come from `clear_app.toml` when it exists.

mod renderer;
mod window;

use std::rc::Rc;
use vulkan_framework::foundation::logging;
use vulkan_framework::prelude::*;

use renderer::Renderer;
use window::Window;

const CONFIG_PATH: &str = "clear_app.toml";

struct ClearApp {
    renderer: Option<Renderer>,
    window: Window,
}

impl ClearApp {
    fn new(config: &ApplicationCreateConfig) -> Result<Self, AppError> {
        let window = Window::new(&config.window).map_err(|e| AppError::Custom(e.to_string()))?;
        Ok(Self { renderer: None, window })
    }
}

impl VulkanApplication for ClearApp {
    fn required_instance_extensions(&self) -> Vec<String> {
        self.window.required_instance_extensions().unwrap_or_else(|e| {
            log::error!("{e}");
            Vec::new()
        })
    }

    fn init(&mut self, instance: &Rc<Instance>, _config: &ApplicationCreateConfig) -> Result<(), AppError> {
        let surface = self
            .window
            .create_surface(instance)
            .map_err(|e| AppError::Custom(e.to_string()))?;
        let renderer = Renderer::new(instance, surface, self.window.framebuffer_extent())?;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn update(&mut self) -> Result<(), AppError> {
        self.window.poll_events();
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<(), AppError> {
        let extent = self.window.framebuffer_extent();
        let resized = self.window.take_resized();
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| AppError::Custom("draw_frame called before init".to_string()))?;
        renderer.draw_frame(extent, resized)?;
        Ok(())
    }

    fn should_close(&self) -> bool {
        self.window.should_close()
    }

    fn cleanup(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            if let Err(e) = renderer.wait_idle() {
                log::warn!("wait_idle failed during cleanup: {e}");
            }
            log::info!("Presented {} frames", renderer.frame_count());
        }
    }
}

fn main() -> Result<(), AppError> {
    logging::init();

    let config = ApplicationCreateConfig::load_or_default(CONFIG_PATH)?;
    log::info!(
        "Starting '{}' at {}x{}",
        config.application_name,
        config.window.width,
        config.window.height
    );

    let mut app = ClearApp::new(&config)?;
    app.run(&config)
}
