use anyhow::Result;
use winit::window::Window;

use crate::camera::Camera;
use crate::config::RendererConfig;
use crate::vulkan::VulkanRenderer;
use crate::window::WindowHost;

pub struct Renderer {
    vk_renderer: VulkanRenderer,
}

impl Renderer {
    /// Creates every GPU resource and uploads the configured model.
    pub unsafe fn create(window: &Window, config: &RendererConfig) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window, config)?;

        Ok(Self { vk_renderer })
    }

    /// Renders one frame with the camera advanced by the held keys.
    pub unsafe fn render(&mut self, host: &mut dyn WindowHost, camera: &mut Camera) -> Result<()> {
        self.vk_renderer.render(host, camera)
    }

    pub fn notify_resized(&mut self) {
        self.vk_renderer.notify_resized();
    }

    /// Waits for the device to go idle, then releases everything.
    pub unsafe fn destroy(&mut self) {
        self.vk_renderer.destroy();
    }
}
