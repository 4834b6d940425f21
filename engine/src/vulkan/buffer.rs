use std::mem::size_of;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::{anyhow, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0};

use super::{
    command_buffer::VulkanCommandBuffer,
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
    instance::VulkanInstance,
};
use crate::model::{Mesh, UniformBufferObject, Vertex};

/// Lowest memory type allowed by `type_filter` whose flags include `properties`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory.memory_type_count)
        .find(|i| {
            let suitable = (type_filter & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            suitable && memory_type.property_flags.contains(properties)
        })
        .ok_or_else(|| anyhow!("Failed to find suitable memory type."))
}

#[derive(Debug)]
pub struct VulkanBuffer;

impl VulkanBuffer {
    pub unsafe fn memory_type_index(
        instance: &VulkanInstance,
        context: &VulkanContext,
        properties: vk::MemoryPropertyFlags,
        requirements: vk::MemoryRequirements,
    ) -> Result<u32> {
        let memory = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);
        find_memory_type(&memory, requirements.memory_type_bits, properties)
    }

    pub unsafe fn create_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.vk_device.create_buffer(&buffer_info, None)?;

        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);
        let memory_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(Self::memory_type_index(
                instance,
                context,
                properties,
                requirements,
            )?);

        let buffer_memory = device.vk_device.allocate_memory(&memory_info, None)?;
        device.vk_device.bind_buffer_memory(buffer, buffer_memory, 0)?;

        Ok((buffer, buffer_memory))
    }

    pub unsafe fn copy_buffer(
        device: &VulkanDevice,
        context: &VulkanContext,
        source: vk::Buffer,
        destination: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        let region = vk::BufferCopy::builder().size(size);

        VulkanCommandBuffer::submit_once(device, context, |command_buffer| {
            device
                .vk_device
                .cmd_copy_buffer(command_buffer, source, destination, &[region]);
        })
    }

    /// Copies `data` into a new device-local buffer through a host-visible
    /// staging buffer, which is released before returning.
    pub unsafe fn upload_via_staging<T: Copy>(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let size = (size_of::<T>() * data.len()) as vk::DeviceSize;

        let (staging_buffer, staging_buffer_memory) = Self::create_buffer(
            instance,
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_VISIBLE,
        )?;

        let memory = device.vk_device.map_memory(
            staging_buffer_memory,
            0,
            size,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(data.as_ptr(), memory.cast(), data.len());
        device.vk_device.unmap_memory(staging_buffer_memory);

        let (buffer, buffer_memory) = Self::create_buffer(
            instance,
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        Self::copy_buffer(device, context, staging_buffer, buffer, size)?;

        device.vk_device.destroy_buffer(staging_buffer, None);
        device.vk_device.free_memory(staging_buffer_memory, None);

        Ok((buffer, buffer_memory))
    }

    pub unsafe fn create_vertex_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        vertices: &[Vertex],
    ) -> Result<()> {
        let (vertex_buffer, vertex_buffer_memory) = Self::upload_via_staging(
            instance,
            device,
            context,
            vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        context.vertex_buffer = vertex_buffer;
        context.vertex_buffer_memory = vertex_buffer_memory;

        Ok(())
    }

    pub unsafe fn create_index_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        indices: &[u32],
    ) -> Result<()> {
        let (index_buffer, index_buffer_memory) = Self::upload_via_staging(
            instance,
            device,
            context,
            indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        context.index_buffer = index_buffer;
        context.index_buffer_memory = index_buffer_memory;
        context.index_count = indices.len() as u32;

        Ok(())
    }

    /// Uploads the mesh and records its index count for drawing.
    pub unsafe fn create_mesh_buffers(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        mesh: &Mesh,
    ) -> Result<()> {
        Self::create_vertex_buffer(instance, device, context, &mesh.vertices)?;
        Self::create_index_buffer(instance, device, context, &mesh.indices)?;

        debug!(
            "Uploaded {} vertices and {} indices.",
            mesh.vertices.len(),
            mesh.index_count()
        );

        Ok(())
    }

    /// One host-visible uniform buffer per swapchain image.
    pub unsafe fn create_uniform_buffers(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.uniform_buffers.clear();
        context.uniform_buffers_memory.clear();

        for _ in 0..context.swapchain_images.len() {
            let (uniform_buffer, uniform_buffer_memory) = Self::create_buffer(
                instance,
                device,
                context,
                size_of::<UniformBufferObject>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_VISIBLE,
            )?;

            context.uniform_buffers.push(uniform_buffer);
            context.uniform_buffers_memory.push(uniform_buffer_memory);
        }

        Ok(())
    }

    /// Copies the uniforms into the buffer of one swapchain image.
    pub unsafe fn write_uniforms(
        device: &VulkanDevice,
        context: &VulkanContext,
        image_index: usize,
        ubo: &UniformBufferObject,
    ) -> Result<()> {
        let memory = device.vk_device.map_memory(
            context.uniform_buffers_memory[image_index],
            0,
            size_of::<UniformBufferObject>() as u64,
            vk::MemoryMapFlags::empty(),
        )?;

        memcpy(ubo, memory.cast(), 1);

        device
            .vk_device
            .unmap_memory(context.uniform_buffers_memory[image_index]);

        Ok(())
    }

    pub unsafe fn destroy_uniform_buffers(device: &VulkanDevice, objects: &SwapchainObjects) {
        objects
            .uniform_buffers
            .iter()
            .for_each(|b| device.vk_device.destroy_buffer(*b, None));
        objects
            .uniform_buffers_memory
            .iter()
            .for_each(|m| device.vk_device.free_memory(*m, None));
    }

    pub unsafe fn destroy_mesh_buffers(device: &VulkanDevice, context: &mut VulkanContext) {
        device.vk_device.destroy_buffer(context.index_buffer, None);
        device
            .vk_device
            .free_memory(context.index_buffer_memory, None);
        device.vk_device.destroy_buffer(context.vertex_buffer, None);
        device
            .vk_device
            .free_memory(context.vertex_buffer_memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: *f,
                heap_index: 0,
            };
        }
        properties
    }

    fn host() -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    #[test]
    fn lowest_matching_index_wins() {
        let memory = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            host() | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&memory, 0b111, host()).unwrap(), 1);
        assert_eq!(
            find_memory_type(&memory, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn type_filter_excludes_otherwise_suitable_types() {
        let memory = memory(&[host(), host()]);
        assert_eq!(find_memory_type(&memory, 0b10, host()).unwrap(), 1);
    }

    #[test]
    fn flags_must_be_a_superset() {
        let memory = memory(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert!(find_memory_type(&memory, 0b11, host()).is_err());
    }

    #[test]
    fn nothing_matches_an_empty_filter() {
        let memory = memory(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(find_memory_type(&memory, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }

    #[test]
    fn result_always_satisfies_both_conditions() {
        let memory = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host(),
            host(),
        ]);

        for filter in 0..16u32 {
            if let Ok(index) = find_memory_type(&memory, filter, host()) {
                assert_ne!(filter & (1 << index), 0);
                assert!(memory.memory_types[index as usize]
                    .property_flags
                    .contains(host()));
                assert!((0..index).all(|i| filter & (1 << i) == 0
                    || !memory.memory_types[i as usize].property_flags.contains(host())));
            }
        }
    }
}
