use super::{
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
};
use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

/// Framebuffer attachments in render pass order for one swapchain view.
pub fn framebuffer_attachments(
    samples: vk::SampleCountFlags,
    color: vk::ImageView,
    depth: vk::ImageView,
    swapchain_view: vk::ImageView,
) -> Vec<vk::ImageView> {
    if samples == vk::SampleCountFlags::_1 {
        vec![swapchain_view, depth]
    } else {
        vec![color, depth, swapchain_view]
    }
}

#[derive(Debug)]
pub struct VulkanFramebuffer;

impl VulkanFramebuffer {
    pub unsafe fn create(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        context.framebuffers = context
            .swapchain_image_views
            .iter()
            .map(|i| {
                let attachments = framebuffer_attachments(
                    context.msaa_samples,
                    context.color_image_view,
                    context.depth_image_view,
                    *i,
                );
                let create_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(context.render_pass)
                    .attachments(&attachments)
                    .width(context.swapchain_extent.width)
                    .height(context.swapchain_extent.height)
                    .layers(1);

                device.vk_device.create_framebuffer(&create_info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }

    pub unsafe fn destroy(device: &VulkanDevice, objects: &SwapchainObjects) {
        objects
            .framebuffers
            .iter()
            .for_each(|f| device.vk_device.destroy_framebuffer(*f, None));
    }
}
