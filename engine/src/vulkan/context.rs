use std::mem;

use vulkanalia::vk;

use super::device::QueueFamilies;

/// The Vulkan handles and associated properties used by the renderer.
#[derive(Clone, Debug, Default)]
pub struct VulkanContext {
    // Debug
    pub messenger: Option<vk::DebugUtilsMessengerEXT>,
    // Surface
    pub surface: vk::SurfaceKHR,
    // Physical Device / Logical Device
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub msaa_samples: vk::SampleCountFlags,
    // Swapchain
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    // Pipeline
    pub render_pass: vk::RenderPass,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    // Framebuffers
    pub framebuffers: Vec<vk::Framebuffer>,
    // Command Pool
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    // Color / Depth attachments
    pub color_image: vk::Image,
    pub color_image_memory: vk::DeviceMemory,
    pub color_image_view: vk::ImageView,
    pub depth_format: vk::Format,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,
    // Texture
    pub mip_levels: u32,
    pub texture_image: vk::Image,
    pub texture_image_memory: vk::DeviceMemory,
    pub texture_image_view: vk::ImageView,
    pub texture_sampler: vk::Sampler,
    // Model
    pub index_count: u32,
    pub vertex_buffer: vk::Buffer,
    pub vertex_buffer_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_buffer_memory: vk::DeviceMemory,
    // Uniforms
    pub uniform_buffers: Vec<vk::Buffer>,
    pub uniform_buffers_memory: Vec<vk::DeviceMemory>,
    // Descriptors
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    // Sync Objects
    pub image_available_semaphores: Vec<vk::Semaphore>,
    pub render_finished_semaphores: Vec<vk::Semaphore>,
    pub in_flight_fences: Vec<vk::Fence>,
}

/// Handles sized to the swapchain, moved out of a [`VulkanContext`] for
/// teardown.
#[derive(Clone, Debug, Default)]
pub struct SwapchainObjects {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub color_image: vk::Image,
    pub color_image_memory: vk::DeviceMemory,
    pub color_image_view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,
    pub uniform_buffers: Vec<vk::Buffer>,
    pub uniform_buffers_memory: Vec<vk::DeviceMemory>,
    pub descriptor_pool: vk::DescriptorPool,
}

impl VulkanContext {
    /// Moves out every handle sized to the swapchain, leaving null handles
    /// and empty lists behind. A second call yields nothing to destroy.
    pub fn take_swapchain_objects(&mut self) -> SwapchainObjects {
        self.swapchain_images.clear();
        self.descriptor_sets.clear();

        SwapchainObjects {
            swapchain: mem::take(&mut self.swapchain),
            swapchain_image_views: mem::take(&mut self.swapchain_image_views),
            render_pass: mem::take(&mut self.render_pass),
            pipeline_layout: mem::take(&mut self.pipeline_layout),
            pipeline: mem::take(&mut self.pipeline),
            framebuffers: mem::take(&mut self.framebuffers),
            command_buffers: mem::take(&mut self.command_buffers),
            color_image: mem::take(&mut self.color_image),
            color_image_memory: mem::take(&mut self.color_image_memory),
            color_image_view: mem::take(&mut self.color_image_view),
            depth_image: mem::take(&mut self.depth_image),
            depth_image_memory: mem::take(&mut self.depth_image_memory),
            depth_image_view: mem::take(&mut self.depth_image_view),
            uniform_buffers: mem::take(&mut self.uniform_buffers),
            uniform_buffers_memory: mem::take(&mut self.uniform_buffers_memory),
            descriptor_pool: mem::take(&mut self.descriptor_pool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulkanalia::vk::Handle;

    fn live_context() -> VulkanContext {
        VulkanContext {
            swapchain: vk::SwapchainKHR::from_raw(1),
            swapchain_images: vec![vk::Image::from_raw(2), vk::Image::from_raw(3)],
            swapchain_image_views: vec![vk::ImageView::from_raw(4), vk::ImageView::from_raw(5)],
            render_pass: vk::RenderPass::from_raw(6),
            pipeline_layout: vk::PipelineLayout::from_raw(7),
            pipeline: vk::Pipeline::from_raw(8),
            framebuffers: vec![vk::Framebuffer::from_raw(9)],
            command_buffers: vec![vk::CommandBuffer::from_raw(10)],
            color_image: vk::Image::from_raw(11),
            color_image_memory: vk::DeviceMemory::from_raw(12),
            color_image_view: vk::ImageView::from_raw(13),
            depth_image: vk::Image::from_raw(14),
            depth_image_memory: vk::DeviceMemory::from_raw(15),
            depth_image_view: vk::ImageView::from_raw(16),
            uniform_buffers: vec![vk::Buffer::from_raw(17)],
            uniform_buffers_memory: vec![vk::DeviceMemory::from_raw(18)],
            descriptor_pool: vk::DescriptorPool::from_raw(19),
            descriptor_sets: vec![vk::DescriptorSet::from_raw(20)],
            command_pool: vk::CommandPool::from_raw(21),
            ..Default::default()
        }
    }

    #[test]
    fn taking_swapchain_objects_leaves_null_handles() {
        let mut context = live_context();

        let objects = context.take_swapchain_objects();
        assert_eq!(objects.swapchain, vk::SwapchainKHR::from_raw(1));
        assert_eq!(objects.pipeline, vk::Pipeline::from_raw(8));
        assert_eq!(objects.descriptor_pool, vk::DescriptorPool::from_raw(19));
        assert_eq!(objects.framebuffers.len(), 1);

        assert!(context.swapchain.is_null());
        assert!(context.render_pass.is_null());
        assert!(context.pipeline_layout.is_null());
        assert!(context.pipeline.is_null());
        assert!(context.color_image.is_null());
        assert!(context.color_image_memory.is_null());
        assert!(context.color_image_view.is_null());
        assert!(context.depth_image.is_null());
        assert!(context.depth_image_memory.is_null());
        assert!(context.depth_image_view.is_null());
        assert!(context.descriptor_pool.is_null());
        assert!(context.swapchain_images.is_empty());
        assert!(context.swapchain_image_views.is_empty());
        assert!(context.descriptor_sets.is_empty());
        assert!(context.uniform_buffers_memory.is_empty());
    }

    #[test]
    fn second_take_after_failed_rebuild_yields_nothing_live() {
        let mut context = live_context();
        context.take_swapchain_objects();

        // A rebuild that got as far as the swapchain before failing.
        context.swapchain = vk::SwapchainKHR::from_raw(30);

        let objects = context.take_swapchain_objects();
        assert_eq!(objects.swapchain, vk::SwapchainKHR::from_raw(30));
        assert!(objects.pipeline.is_null());
        assert!(objects.render_pass.is_null());
        assert!(objects.descriptor_pool.is_null());
        assert!(objects.color_image.is_null());
        assert!(objects.depth_image_memory.is_null());
        assert!(objects.framebuffers.is_empty());
        assert!(objects.command_buffers.is_empty());

        // Device-wide handles are left alone.
        assert_eq!(context.command_pool, vk::CommandPool::from_raw(21));
    }
}
