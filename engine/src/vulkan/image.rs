use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use log::*;
use thiserror::Error;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0};

use super::{
    buffer::VulkanBuffer,
    command_buffer::VulkanCommandBuffer,
    constants,
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
    instance::VulkanInstance,
};
use crate::model::TextureData;

/// Setup mistakes that no amount of retrying fixes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unsupported image layout transition {0:?} -> {1:?}.")]
    UnsupportedTransition(vk::ImageLayout, vk::ImageLayout),
    #[error("Texture format {0:?} does not support linear blitting.")]
    LinearBlitUnsupported(vk::Format),
    #[error("Failed to find a supported format among {0:?}.")]
    NoSupportedFormat(Vec<vk::Format>),
}

/// Access masks and pipeline stages of one layout transition barrier.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the layout transitions the renderer performs.
pub fn layout_transition(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionMasks, ConfigurationError> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            })
        }
        (old, new) => Err(ConfigurationError::UnsupportedTransition(old, new)),
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Aspect mask for a barrier into `new_layout` on an image of `format`.
pub fn barrier_aspect(format: vk::Format, new_layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// First candidate whose tiling features include `features`.
pub fn pick_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: F,
) -> Result<vk::Format, ConfigurationError>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|f| {
            let properties = properties(*f);
            match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| ConfigurationError::NoSupportedFormat(candidates.to_vec()))
}

/// Mipmaps are generated with linear blits, which the texture format must
/// support for optimal tiling.
pub fn check_linear_blit(
    format: vk::Format,
    properties: vk::FormatProperties,
) -> Result<(), ConfigurationError> {
    if properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        Ok(())
    } else {
        Err(ConfigurationError::LinearBlitUnsupported(format))
    }
}

/// A separate color target only exists when it is resolved into the
/// swapchain image.
pub fn needs_color_target(samples: vk::SampleCountFlags) -> bool {
    samples != vk::SampleCountFlags::_1
}

/// Destination size of the next mip level, never below one texel.
pub fn next_mip_extent(width: i32, height: i32) -> (i32, i32) {
    ((width / 2).max(1), (height / 2).max(1))
}

#[derive(Debug)]
pub struct VulkanImage;

impl VulkanImage {
    pub unsafe fn create_image(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        width: u32,
        height: u32,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(samples);

        let image = device.vk_device.create_image(&info, None)?;

        let requirements = device.vk_device.get_image_memory_requirements(image);
        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(VulkanBuffer::memory_type_index(
                instance,
                context,
                properties,
                requirements,
            )?);

        let image_memory = device.vk_device.allocate_memory(&info, None)?;
        device.vk_device.bind_image_memory(image, image_memory, 0)?;

        Ok((image, image_memory))
    }

    pub unsafe fn create_image_view(
        device: &VulkanDevice,
        image: vk::Image,
        format: vk::Format,
        aspects: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> Result<vk::ImageView> {
        let subresource_range = vk::ImageSubresourceRange::builder()
            .aspect_mask(aspects)
            .base_mip_level(0)
            .level_count(mip_levels)
            .base_array_layer(0)
            .layer_count(1);

        let components = vk::ComponentMapping::builder()
            .r(vk::ComponentSwizzle::IDENTITY)
            .g(vk::ComponentSwizzle::IDENTITY)
            .b(vk::ComponentSwizzle::IDENTITY)
            .a(vk::ComponentSwizzle::IDENTITY);

        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::_2D)
            .format(format)
            .components(components)
            .subresource_range(subresource_range);

        Ok(device.vk_device.create_image_view(&info, None)?)
    }

    pub unsafe fn transition_image_layout(
        device: &VulkanDevice,
        context: &VulkanContext,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()> {
        let masks = layout_transition(old_layout, new_layout)?;

        let subresource = vk::ImageSubresourceRange::builder()
            .aspect_mask(barrier_aspect(format, new_layout))
            .base_mip_level(0)
            .level_count(mip_levels)
            .base_array_layer(0)
            .layer_count(1);

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource)
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        VulkanCommandBuffer::submit_once(device, context, |command_buffer| {
            device.vk_device.cmd_pipeline_barrier(
                command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[] as &[vk::MemoryBarrier],
                &[] as &[vk::BufferMemoryBarrier],
                &[barrier],
            );
        })
    }

    pub unsafe fn copy_buffer_to_image(
        device: &VulkanDevice,
        context: &VulkanContext,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let subresource = vk::ImageSubresourceLayers::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(subresource)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        VulkanCommandBuffer::submit_once(device, context, |command_buffer| {
            device.vk_device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })
    }

    /// Fills every mip level by repeated half-size blits from the level above,
    /// leaving the whole chain in `SHADER_READ_ONLY_OPTIMAL`.
    pub unsafe fn generate_mipmaps(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        image: vk::Image,
        format: vk::Format,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) -> Result<()> {
        let properties = instance
            .vk_instance
            .get_physical_device_format_properties(context.physical_device, format);
        check_linear_blit(format, properties)?;

        VulkanCommandBuffer::submit_once(device, context, |command_buffer| {
            let subresource = vk::ImageSubresourceRange::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_array_layer(0)
                .layer_count(1)
                .level_count(1);

            let mut barrier = vk::ImageMemoryBarrier::builder()
                .image(image)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(subresource);

            let mut mip_width = width as i32;
            let mut mip_height = height as i32;

            for i in 1..mip_levels {
                // Level i - 1 has been written; make it the blit source.
                barrier.subresource_range.base_mip_level = i - 1;
                barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
                barrier.new_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
                barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
                barrier.dst_access_mask = vk::AccessFlags::TRANSFER_READ;

                device.vk_device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[] as &[vk::MemoryBarrier],
                    &[] as &[vk::BufferMemoryBarrier],
                    &[barrier],
                );

                let (next_width, next_height) = next_mip_extent(mip_width, mip_height);

                let src_subresource = vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(i - 1)
                    .base_array_layer(0)
                    .layer_count(1);

                let dst_subresource = vk::ImageSubresourceLayers::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(i)
                    .base_array_layer(0)
                    .layer_count(1);

                let blit = vk::ImageBlit::builder()
                    .src_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D {
                            x: mip_width,
                            y: mip_height,
                            z: 1,
                        },
                    ])
                    .src_subresource(src_subresource)
                    .dst_offsets([
                        vk::Offset3D { x: 0, y: 0, z: 0 },
                        vk::Offset3D {
                            x: next_width,
                            y: next_height,
                            z: 1,
                        },
                    ])
                    .dst_subresource(dst_subresource);

                device.vk_device.cmd_blit_image(
                    command_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );

                barrier.old_layout = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
                barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
                barrier.src_access_mask = vk::AccessFlags::TRANSFER_READ;
                barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

                device.vk_device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[] as &[vk::MemoryBarrier],
                    &[] as &[vk::BufferMemoryBarrier],
                    &[barrier],
                );

                mip_width = next_width;
                mip_height = next_height;
            }

            // The last level is only ever a blit destination.
            barrier.subresource_range.base_mip_level = mip_levels - 1;
            barrier.old_layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
            barrier.new_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
            barrier.src_access_mask = vk::AccessFlags::TRANSFER_WRITE;
            barrier.dst_access_mask = vk::AccessFlags::SHADER_READ;

            device.vk_device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[] as &[vk::MemoryBarrier],
                &[] as &[vk::BufferMemoryBarrier],
                &[barrier],
            );
        })
    }

    /// Multisampled color target resolved into the swapchain image. Without
    /// multisampling the swapchain image is drawn to directly.
    pub unsafe fn create_color_objects(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        if !needs_color_target(context.msaa_samples) {
            return Ok(());
        }

        let (color_image, color_image_memory) = Self::create_image(
            instance,
            device,
            context,
            context.swapchain_extent.width,
            context.swapchain_extent.height,
            1,
            context.msaa_samples,
            context.swapchain_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        context.color_image = color_image;
        context.color_image_memory = color_image_memory;
        context.color_image_view = Self::create_image_view(
            device,
            color_image,
            context.swapchain_format,
            vk::ImageAspectFlags::COLOR,
            1,
        )?;

        Ok(())
    }

    pub unsafe fn depth_format(
        instance: &VulkanInstance,
        context: &VulkanContext,
    ) -> Result<vk::Format> {
        Ok(pick_supported_format(
            constants::DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| {
                instance
                    .vk_instance
                    .get_physical_device_format_properties(context.physical_device, f)
            },
        )?)
    }

    pub unsafe fn create_depth_objects(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let format = context.depth_format;

        let (depth_image, depth_image_memory) = Self::create_image(
            instance,
            device,
            context,
            context.swapchain_extent.width,
            context.swapchain_extent.height,
            1,
            context.msaa_samples,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        context.depth_image = depth_image;
        context.depth_image_memory = depth_image_memory;
        context.depth_image_view = Self::create_image_view(
            device,
            depth_image,
            format,
            vk::ImageAspectFlags::DEPTH,
            1,
        )?;

        Self::transition_image_layout(
            device,
            context,
            depth_image,
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            1,
        )?;

        Ok(())
    }

    /// Uploads the texture through a staging buffer and builds its mip chain.
    /// The pixel data is released once it has been copied.
    pub unsafe fn create_texture_image(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        texture: TextureData,
    ) -> Result<()> {
        let size = texture.size();
        context.mip_levels = texture.mip_levels();

        let (staging_buffer, staging_buffer_memory) = VulkanBuffer::create_buffer(
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
        memcpy(texture.pixels.as_ptr(), memory.cast(), texture.pixels.len());
        device.vk_device.unmap_memory(staging_buffer_memory);

        let TextureData { width, height, .. } = texture;
        drop(texture);

        let format = vk::Format::R8G8B8A8_SRGB;
        let (texture_image, texture_image_memory) = Self::create_image(
            instance,
            device,
            context,
            width,
            height,
            context.mip_levels,
            vk::SampleCountFlags::_1,
            format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        context.texture_image = texture_image;
        context.texture_image_memory = texture_image_memory;

        Self::transition_image_layout(
            device,
            context,
            texture_image,
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            context.mip_levels,
        )?;

        Self::copy_buffer_to_image(device, context, staging_buffer, texture_image, width, height)?;

        device.vk_device.destroy_buffer(staging_buffer, None);
        device.vk_device.free_memory(staging_buffer_memory, None);

        Self::generate_mipmaps(
            instance,
            device,
            context,
            texture_image,
            format,
            width,
            height,
            context.mip_levels,
        )?;

        context.texture_image_view = Self::create_image_view(
            device,
            texture_image,
            format,
            vk::ImageAspectFlags::COLOR,
            context.mip_levels,
        )?;

        debug!(
            "Uploaded {}x{} texture with {} mip levels.",
            width, height, context.mip_levels
        );

        Ok(())
    }

    pub unsafe fn create_texture_sampler(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let max_anisotropy = instance
            .vk_instance
            .get_physical_device_properties(context.physical_device)
            .limits
            .max_sampler_anisotropy;

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(context.mip_levels as f32)
            .mip_lod_bias(0.0);

        context.texture_sampler = device.vk_device.create_sampler(&info, None)?;

        Ok(())
    }

    /// Destroys the color and depth attachments sized to the swapchain.
    pub unsafe fn destroy_attachments(device: &VulkanDevice, objects: &SwapchainObjects) {
        device
            .vk_device
            .destroy_image_view(objects.color_image_view, None);
        device.vk_device.destroy_image(objects.color_image, None);
        device
            .vk_device
            .free_memory(objects.color_image_memory, None);
        device
            .vk_device
            .destroy_image_view(objects.depth_image_view, None);
        device.vk_device.destroy_image(objects.depth_image, None);
        device
            .vk_device
            .free_memory(objects.depth_image_memory, None);
    }

    pub unsafe fn destroy_texture(device: &VulkanDevice, context: &mut VulkanContext) {
        device
            .vk_device
            .destroy_sampler(context.texture_sampler, None);
        device
            .vk_device
            .destroy_image_view(context.texture_image_view, None);
        device.vk_device.destroy_image(context.texture_image, None);
        device
            .vk_device
            .free_memory(context.texture_image_memory, None);
    }
}
