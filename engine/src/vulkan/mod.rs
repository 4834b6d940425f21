use anyhow::{anyhow, Result};
use buffer::VulkanBuffer;
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use descriptor::VulkanDescriptor;
use device::VulkanDevice;
use frame::{AcquireOutcome, FrameBackend, FrameScheduler, PresentOutcome};
use framebuffer::VulkanFramebuffer;
use self::image::VulkanImage;
use instance::VulkanInstance;
use log::*;
use pipeline::VulkanPipeline;
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension},
    Entry,
};
use winit::window::Window;

use crate::camera::Camera;
use crate::config::RendererConfig;
use crate::model::{self, ImportTransform, TextureData};
use crate::window::{wait_while_minimized, WindowHost};

pub mod buffer;
pub mod command_buffer;
pub mod constants;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod frame;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;

pub struct VulkanRenderer {
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    scheduler: FrameScheduler,
    cull_back_faces: bool,
    resized: bool,
}

impl VulkanRenderer {
    pub unsafe fn new(window: &Window, config: &RendererConfig) -> Result<VulkanRenderer> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        let mut context = VulkanContext::default();
        let instance = VulkanInstance::new(window, &entry, config.validation, &mut context)?;
        instance.create_surface(window, &mut context)?;
        let device = VulkanDevice::new(&entry, &instance, config.sample_count, &mut context)?;

        let size = window.inner_size();
        VulkanSwapchain::create((size.width, size.height), &instance, &device, &mut context)?;
        VulkanSwapchain::create_image_views(&device, &mut context)?;

        context.depth_format = VulkanImage::depth_format(&instance, &context)?;
        VulkanRenderPass::create(&device, &mut context)?;
        VulkanPipeline::create_descriptor_set_layout(&device, &mut context)?;
        VulkanPipeline::create(&device, &mut context, config.cull_back_faces)?;

        VulkanCommandBuffer::create_command_pool(&device, &mut context)?;
        VulkanImage::create_color_objects(&instance, &device, &mut context)?;
        VulkanImage::create_depth_objects(&instance, &device, &mut context)?;
        VulkanFramebuffer::create(&device, &mut context)?;

        // Assets
        let texture = TextureData::load(&config.texture_path)?;
        VulkanImage::create_texture_image(&instance, &device, &mut context, texture)?;
        VulkanImage::create_texture_sampler(&instance, &device, &mut context)?;

        let transform = ImportTransform {
            offset: config.model.offset,
            scale: config.model.scale,
        };
        let mesh = model::load_model(&config.model.path, transform)?;
        VulkanBuffer::create_mesh_buffers(&instance, &device, &mut context, &mesh)?;

        // Per-image state
        VulkanBuffer::create_uniform_buffers(&instance, &device, &mut context)?;
        VulkanDescriptor::create_descriptor_pool(&device, &mut context)?;
        VulkanDescriptor::create_descriptor_sets(&device, &mut context)?;
        VulkanCommandBuffer::create_command_buffers(&device, &mut context)?;

        frame::create_sync_objects(&device, &mut context)?;

        let scheduler =
            FrameScheduler::new(constants::MAX_FRAMES_IN_FLIGHT, context.swapchain_images.len());

        Ok(VulkanRenderer {
            _entry: entry,
            instance,
            device,
            context,
            scheduler,
            cull_back_faces: config.cull_back_faces,
            resized: false,
        })
    }

    /// Flags the swapchain for recreation after the next present.
    pub fn notify_resized(&mut self) {
        self.resized = true;
    }

    pub unsafe fn render(&mut self, host: &mut dyn WindowHost, camera: &mut Camera) -> Result<()> {
        let mut frame = FrameContext {
            instance: &self.instance,
            device: &self.device,
            context: &mut self.context,
            cull_back_faces: self.cull_back_faces,
            host,
            camera,
        };

        self.scheduler.draw_frame(&mut frame, &mut self.resized)
    }

    /// Waits for the device, then tears down and rebuilds everything sized to
    /// the swapchain. Blocks while the window is minimized, and leaves the
    /// swapchain alone if the window is closed meanwhile.
    unsafe fn recreate_swapchain(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        cull_back_faces: bool,
        host: &mut dyn WindowHost,
    ) -> Result<()> {
        let Some(framebuffer_size) = wait_while_minimized(host) else {
            debug!("Window closed while minimized, skipping swapchain rebuild.");
            return Ok(());
        };

        device.vk_device.device_wait_idle()?;
        VulkanRenderer::destroy_swapchain(device, context);

        VulkanSwapchain::create(framebuffer_size, instance, device, context)?;
        VulkanSwapchain::create_image_views(device, context)?;
        VulkanRenderPass::create(device, context)?;
        VulkanPipeline::create(device, context, cull_back_faces)?;
        VulkanImage::create_color_objects(instance, device, context)?;
        VulkanImage::create_depth_objects(instance, device, context)?;
        VulkanFramebuffer::create(device, context)?;
        VulkanBuffer::create_uniform_buffers(instance, device, context)?;
        VulkanDescriptor::create_descriptor_pool(device, context)?;
        VulkanDescriptor::create_descriptor_sets(device, context)?;
        VulkanCommandBuffer::create_command_buffers(device, context)?;

        Ok(())
    }

    /// Destroys everything sized to the swapchain, in reverse dependency order.
    /// Handles are taken out of the context first, so teardown after a failed
    /// rebuild only destroys what the rebuild created.
    unsafe fn destroy_swapchain(device: &VulkanDevice, context: &mut VulkanContext) {
        let objects = context.take_swapchain_objects();

        VulkanImage::destroy_attachments(device, &objects);
        VulkanFramebuffer::destroy(device, &objects);
        VulkanCommandBuffer::free_command_buffers(device, context, &objects);
        VulkanPipeline::destroy(device, &objects);
        VulkanRenderPass::destroy(device, &objects);
        VulkanSwapchain::destroy(device, &objects);
        VulkanBuffer::destroy_uniform_buffers(device, &objects);
        VulkanDescriptor::destroy(device, &objects);
    }

    pub unsafe fn destroy(&mut self) {
        if let Err(e) = self.device.vk_device.device_wait_idle() {
            warn!("Failed to wait for device idle before teardown: {}", e);
        }

        VulkanRenderer::destroy_swapchain(&self.device, &mut self.context);
        VulkanImage::destroy_texture(&self.device, &mut self.context);
        VulkanPipeline::destroy_descriptor_set_layout(&self.device, &mut self.context);
        VulkanBuffer::destroy_mesh_buffers(&self.device, &mut self.context);
        frame::destroy_sync_objects(&self.device, &mut self.context);
        VulkanCommandBuffer::destroy_command_pool(&self.device, &mut self.context);
        self.device.destroy();
        self.instance.destroy(&mut self.context);

        info!("Destroyed Vulkan renderer.");
    }
}

/// Borrowed renderer state for one call of the frame scheduler.
struct FrameContext<'a> {
    instance: &'a VulkanInstance,
    device: &'a VulkanDevice,
    context: &'a mut VulkanContext,
    cull_back_faces: bool,
    host: &'a mut dyn WindowHost,
    camera: &'a mut Camera,
}

impl FrameBackend for FrameContext<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        unsafe {
            self.device.vk_device.wait_for_fences(
                &[self.context.in_flight_fences[slot]],
                true,
                u64::MAX,
            )?;
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.device.vk_device.acquire_next_image_khr(
                self.context.swapchain,
                u64::MAX,
                self.context.image_available_semaphores[slot],
                vk::Fence::null(),
            )
        };

        // Suboptimal still yields a usable image; present reports it.
        match result {
            Ok((image_index, _)) => Ok(AcquireOutcome::Acquired(image_index as usize)),
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(anyhow!(e)),
        }
    }

    fn update_uniforms(&mut self, image_index: usize) -> Result<()> {
        self.camera.advance(self.host.pressed_keys());

        let extent = self.context.swapchain_extent;
        let ubo = self.camera.uniforms(extent.width, extent.height);

        unsafe { VulkanBuffer::write_uniforms(self.device, self.context, image_index, &ubo) }
    }

    fn submit(&mut self, slot: usize, image_index: usize) -> Result<()> {
        let wait_semaphores = &[self.context.image_available_semaphores[slot]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.context.command_buffers[image_index]];
        let signal_semaphores = &[self.context.render_finished_semaphores[slot]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        unsafe {
            self.device
                .vk_device
                .reset_fences(&[self.context.in_flight_fences[slot]])?;

            self.device.vk_device.queue_submit(
                self.context.graphics_queue,
                &[submit_info],
                self.context.in_flight_fences[slot],
            )?;
        }

        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: usize) -> Result<PresentOutcome> {
        let wait_semaphores = &[self.context.render_finished_semaphores[slot]];
        let swapchains = &[self.context.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = unsafe {
            self.device
                .vk_device
                .queue_present_khr(self.context.present_queue, &present_info)
        };

        let stale = result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);

        if stale {
            Ok(PresentOutcome::Stale)
        } else if let Err(e) = result {
            Err(anyhow!(e))
        } else {
            Ok(PresentOutcome::Presented)
        }
    }

    fn recreate_swapchain(&mut self) -> Result<usize> {
        unsafe {
            VulkanRenderer::recreate_swapchain(
                self.instance,
                self.device,
                self.context,
                self.cull_back_faces,
                self.host,
            )?;
        }

        Ok(self.context.swapchain_images.len())
    }
}
