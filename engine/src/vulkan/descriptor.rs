use std::mem::size_of;

use anyhow::Result;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::{
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
};
use crate::model::UniformBufferObject;

/// Pool sizes for one uniform buffer and one texture per swapchain image.
pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            type_: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count,
        },
        vk::DescriptorPoolSize {
            type_: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: image_count,
        },
    ]
}

#[derive(Debug)]
pub struct VulkanDescriptor;

impl VulkanDescriptor {
    pub unsafe fn create_descriptor_pool(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let image_count = context.swapchain_images.len() as u32;
        let pool_sizes = pool_sizes(image_count);
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(image_count);

        context.descriptor_pool = device.vk_device.create_descriptor_pool(&info, None)?;

        Ok(())
    }

    /// Allocates one set per swapchain image and points it at that image's
    /// uniform buffer and the shared texture. Sets are never rewritten.
    pub unsafe fn create_descriptor_sets(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let layouts = vec![context.descriptor_set_layout; context.swapchain_images.len()];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(&layouts);

        context.descriptor_sets = device.vk_device.allocate_descriptor_sets(&info)?;

        for (set, buffer) in context.descriptor_sets.iter().zip(&context.uniform_buffers) {
            let info = vk::DescriptorBufferInfo::builder()
                .buffer(*buffer)
                .offset(0)
                .range(size_of::<UniformBufferObject>() as u64);

            let buffer_info = &[info];
            let ubo_write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(buffer_info);

            let info = vk::DescriptorImageInfo::builder()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(context.texture_image_view)
                .sampler(context.texture_sampler);

            let image_info = &[info];
            let sampler_write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(image_info);

            device.vk_device.update_descriptor_sets(
                &[ubo_write, sampler_write],
                &[] as &[vk::CopyDescriptorSet],
            );
        }

        Ok(())
    }

    /// Destroying the pool frees its sets.
    pub unsafe fn destroy(device: &VulkanDevice, objects: &SwapchainObjects) {
        device
            .vk_device
            .destroy_descriptor_pool(objects.descriptor_pool, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_one_of_each_per_image() {
        let sizes = pool_sizes(3);

        assert_eq!(sizes[0].type_, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].type_, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(sizes.iter().all(|s| s.descriptor_count == 3));
    }
}
