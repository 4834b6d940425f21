use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{
    constants,
    context::{SwapchainObjects, VulkanContext},
    device::VulkanDevice,
};
use crate::model::Vertex;

/// Reads a compiled SPIR-V blob.
pub fn load_shader(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).with_context(|| format!("Failed to open shader `{}`.", path.display()))
}

pub fn cull_mode(cull_back_faces: bool) -> vk::CullModeFlags {
    if cull_back_faces {
        vk::CullModeFlags::BACK
    } else {
        vk::CullModeFlags::NONE
    }
}

/// Whether per-sample shading is enabled, and its minimum fraction.
pub fn sample_shading(samples: vk::SampleCountFlags) -> (bool, f32) {
    if samples == vk::SampleCountFlags::_1 {
        (false, 1.0)
    } else {
        (true, constants::MIN_SAMPLE_SHADING)
    }
}

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    /// Uniforms for the vertex stage at binding 0, the texture for the
    /// fragment stage at binding 1.
    pub unsafe fn create_descriptor_set_layout(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX);

        let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT);

        let bindings = &[ubo_binding, sampler_binding];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        context.descriptor_set_layout = device
            .vk_device
            .create_descriptor_set_layout(&info, None)?;

        Ok(())
    }

    pub unsafe fn create(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        cull_back_faces: bool,
    ) -> Result<()> {
        let vert = load_shader(constants::VERTEX_SHADER_PATH)?;
        let frag = load_shader(constants::FRAGMENT_SHADER_PATH)?;

        let vertex_shader_module = VulkanPipeline::create_shader_module(device, &vert)?;
        let fragment_shader_module = VulkanPipeline::create_shader_module(device, &frag)?;

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        // vertex input
        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(context.swapchain_extent.width as f32)
            .height(context.swapchain_extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(context.swapchain_extent);

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        // rasterizer
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode(cull_back_faces))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        // multisampling
        let (sample_shading_enable, min_sample_shading) = sample_shading(context.msaa_samples);
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(sample_shading_enable)
            .min_sample_shading(min_sample_shading)
            .rasterization_samples(context.msaa_samples);

        // depth
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        // color blending
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(attachments)
            .blend_constants([0.0, 0.0, 0.0, 0.0]);

        // layout
        let set_layouts = &[context.descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        context.pipeline_layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        let result = device
            .vk_device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None);

        // destroy shader modules
        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        context.pipeline = result?.0[0];

        Ok(())
    }

    unsafe fn create_shader_module(
        device: &VulkanDevice,
        bytecode: &[u8],
    ) -> Result<vk::ShaderModule> {
        let bytecode =
            Bytecode::new(bytecode).map_err(|e| anyhow!("Invalid shader bytecode: {:?}", e))?;
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }

    pub unsafe fn destroy(device: &VulkanDevice, objects: &SwapchainObjects) {
        device.vk_device.destroy_pipeline(objects.pipeline, None);
        device
            .vk_device
            .destroy_pipeline_layout(objects.pipeline_layout, None);
    }

    pub unsafe fn destroy_descriptor_set_layout(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) {
        device
            .vk_device
            .destroy_descriptor_set_layout(context.descriptor_set_layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn culling_follows_configuration() {
        assert_eq!(cull_mode(true), vk::CullModeFlags::BACK);
        assert_eq!(cull_mode(false), vk::CullModeFlags::NONE);
    }

    #[test]
    fn sample_shading_only_when_multisampled() {
        assert_eq!(sample_shading(vk::SampleCountFlags::_1), (false, 1.0));
        assert_eq!(
            sample_shading(vk::SampleCountFlags::_2),
            (true, constants::MIN_SAMPLE_SHADING)
        );
    }

    #[test]
    fn missing_shader_is_fatal() {
        let error = load_shader("shaders/does-not-exist.spv").unwrap_err();
        assert!(error.to_string().contains("does-not-exist.spv"));
    }
}
