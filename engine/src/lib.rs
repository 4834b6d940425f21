#![allow(clippy::too_many_arguments)]

use anyhow::Result;
use log::*;

use camera::Camera;
use config::RendererConfig;
use renderer::Renderer;
use window::{Platform, WindowHost};

pub mod camera;
pub mod config;
pub mod model;
pub mod renderer;
pub mod vulkan;
pub mod window;

pub struct Engine {
    platform: Platform,
    renderer: Renderer,
    camera: Camera,
}

impl Engine {
    pub fn new(config: &RendererConfig) -> Result<Engine> {
        let platform = Platform::new(&config.window)?;

        let renderer = unsafe { Renderer::create(platform.window(), config)? };

        Ok(Engine {
            platform,
            renderer,
            camera: Camera::default(),
        })
    }

    /// Polls events and renders until the window is closed, then releases
    /// the renderer even when a frame failed.
    pub fn run(mut self) -> Result<()> {
        let result = self.main_loop();

        unsafe {
            self.renderer.destroy();
        }

        result
    }

    fn main_loop(&mut self) -> Result<()> {
        info!("Entering render loop.");

        loop {
            self.platform.poll_events();
            if self.platform.close_requested() {
                break;
            }

            if self.platform.take_resized() {
                self.renderer.notify_resized();
            }

            unsafe {
                self.renderer.render(&mut self.platform, &mut self.camera)?;
            }
        }

        info!("Close requested, shutting down.");
        Ok(())
    }
}
