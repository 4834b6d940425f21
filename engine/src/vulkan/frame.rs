use anyhow::Result;
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::{constants, context::VulkanContext, device::VulkanDevice};

/// Result of asking the swapchain for the next image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(usize),
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal; the swapchain must be rebuilt.
    Stale,
}

/// GPU operations the frame scheduler drives, one call per step.
pub trait FrameBackend {
    /// Blocks until the fence of frame slot `slot` is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn update_uniforms(&mut self, image_index: usize) -> Result<()>;
    /// Resets the slot's fence and submits the image's command buffer.
    fn submit(&mut self, slot: usize, image_index: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: usize) -> Result<PresentOutcome>;
    /// Rebuilds the swapchain and returns its new image count.
    fn recreate_swapchain(&mut self) -> Result<usize>;
}

/// Ring of frames in flight plus the frame slot that last rendered to each
/// swapchain image.
#[derive(Clone, Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    frame: usize,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight,
            frame: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    pub fn current_frame(&self) -> usize {
        self.frame
    }

    pub fn image_owners(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    /// Runs one acquire, update, submit and present cycle. A pending resize
    /// in `resized` is handled after presenting and then cleared.
    pub fn draw_frame<B: FrameBackend>(
        &mut self,
        backend: &mut B,
        resized: &mut bool,
    ) -> Result<()> {
        backend.wait_for_slot(self.frame)?;

        let image_index = match backend.acquire_image(self.frame)? {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire.");
                return self.recreate(backend);
            }
        };

        if let Some(owner) = self.images_in_flight[image_index] {
            if owner != self.frame {
                backend.wait_for_slot(owner)?;
            }
        }
        self.images_in_flight[image_index] = Some(self.frame);

        backend.update_uniforms(image_index)?;
        backend.submit(self.frame, image_index)?;

        let outcome = backend.present(self.frame, image_index)?;
        if outcome == PresentOutcome::Stale || *resized {
            *resized = false;
            self.recreate(backend)?;
        }

        self.frame = (self.frame + 1) % self.frames_in_flight;

        Ok(())
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        let image_count = backend.recreate_swapchain()?;
        // The device is idle after recreation, so no image has an owner.
        self.images_in_flight = vec![None; image_count];
        Ok(())
    }
}

/// Semaphores and signaled fences for every frame slot.
pub unsafe fn create_sync_objects(
    device: &VulkanDevice,
    context: &mut VulkanContext,
) -> Result<()> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

    for _ in 0..constants::MAX_FRAMES_IN_FLIGHT {
        context
            .image_available_semaphores
            .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
        context
            .render_finished_semaphores
            .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
        context
            .in_flight_fences
            .push(device.vk_device.create_fence(&fence_info, None)?);
    }

    Ok(())
}

pub unsafe fn destroy_sync_objects(device: &VulkanDevice, context: &mut VulkanContext) {
    context
        .in_flight_fences
        .drain(..)
        .for_each(|f| device.vk_device.destroy_fence(f, None));
    context
        .render_finished_semaphores
        .drain(..)
        .for_each(|s| device.vk_device.destroy_semaphore(s, None));
    context
        .image_available_semaphores
        .drain(..)
        .for_each(|s| device.vk_device.destroy_semaphore(s, None));
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
