use super::{
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
};
use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

/// Clear values for the color and depth attachments, in attachment order.
pub fn clear_values() -> [vk::ClearValue; 2] {
    let color_clear_value = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    };

    let depth_clear_value = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth: 1.0,
            stencil: 0,
        },
    };

    [color_clear_value, depth_clear_value]
}

#[derive(Debug)]
pub struct VulkanCommandBuffer;

impl VulkanCommandBuffer {
    pub unsafe fn create_command_pool(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::empty())
            .queue_family_index(context.queue_families.graphics);

        context.command_pool = device.vk_device.create_command_pool(&info, None)?;

        Ok(())
    }

    /// Records `record` into a throwaway command buffer, submits it to the
    /// graphics queue and waits for the queue to drain.
    pub unsafe fn submit_once<F>(
        device: &VulkanDevice,
        context: &VulkanContext,
        record: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(context.command_pool)
            .command_buffer_count(1);

        let command_buffer = device.vk_device.allocate_command_buffers(&info)?[0];

        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        device
            .vk_device
            .begin_command_buffer(command_buffer, &info)?;

        record(command_buffer);

        device.vk_device.end_command_buffer(command_buffer)?;

        let command_buffers = &[command_buffer];
        let info = vk::SubmitInfo::builder().command_buffers(command_buffers);

        device
            .vk_device
            .queue_submit(context.graphics_queue, &[info], vk::Fence::null())?;
        device.vk_device.queue_wait_idle(context.graphics_queue)?;

        device
            .vk_device
            .free_command_buffers(context.command_pool, command_buffers);

        Ok(())
    }

    /// Pre-records one draw of the mesh per framebuffer.
    pub unsafe fn create_command_buffers(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(context.framebuffers.len() as u32);

        context.command_buffers = device.vk_device.allocate_command_buffers(&allocate_info)?;

        for (i, command_buffer) in context.command_buffers.iter().enumerate() {
            let info = vk::CommandBufferBeginInfo::builder();

            device
                .vk_device
                .begin_command_buffer(*command_buffer, &info)?;

            let render_area = vk::Rect2D::builder()
                .offset(vk::Offset2D::default())
                .extent(context.swapchain_extent);

            let clear_values = clear_values();
            let info = vk::RenderPassBeginInfo::builder()
                .render_pass(context.render_pass)
                .framebuffer(context.framebuffers[i])
                .render_area(render_area)
                .clear_values(&clear_values);

            device.vk_device.cmd_begin_render_pass(
                *command_buffer,
                &info,
                vk::SubpassContents::INLINE,
            );

            device.vk_device.cmd_bind_pipeline(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline,
            );

            device.vk_device.cmd_bind_vertex_buffers(
                *command_buffer,
                0,
                &[context.vertex_buffer],
                &[0],
            );
            device.vk_device.cmd_bind_index_buffer(
                *command_buffer,
                context.index_buffer,
                0,
                vk::IndexType::UINT32,
            );
            device.vk_device.cmd_bind_descriptor_sets(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline_layout,
                0,
                &[context.descriptor_sets[i]],
                &[],
            );

            device
                .vk_device
                .cmd_draw_indexed(*command_buffer, context.index_count, 1, 0, 0, 0);
            device.vk_device.cmd_end_render_pass(*command_buffer);

            device.vk_device.end_command_buffer(*command_buffer)?;
        }

        Ok(())
    }

    pub unsafe fn free_command_buffers(
        device: &VulkanDevice,
        context: &VulkanContext,
        objects: &SwapchainObjects,
    ) {
        if objects.command_buffers.is_empty() {
            return;
        }

        device
            .vk_device
            .free_command_buffers(context.command_pool, &objects.command_buffers);
    }

    pub unsafe fn destroy_command_pool(device: &VulkanDevice, context: &mut VulkanContext) {
        device
            .vk_device
            .destroy_command_pool(context.command_pool, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_to_opaque_black_and_far_depth() {
        let [color, depth] = clear_values();

        unsafe {
            assert_eq!(color.color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 1.0);
            assert_eq!(depth.depth_stencil.stencil, 0);
        }
    }
}
