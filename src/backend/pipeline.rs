// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Everything fixed-function is static here; only viewport and scissor are
// left dynamic so they are set while recording.

use super::error::{creation, SetupError};
use super::shader::{ShaderBytecode, ShaderModule};
use ash::vk;

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Fixed-function state baked into the pipeline
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub samples: vk::SampleCountFlags,
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for PipelineDescriptor {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend_enable: false,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

/// Render pass, layout and pipeline, destroyed on drop in reverse creation order
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    device: ash::Device,
}

impl GraphicsPipeline {
    /// Assemble the pipeline for `format` from a vertex and a fragment stage
    ///
    /// Every handle starts null and is filled in as it is created; an error
    /// drops `self`, which destroys whatever already exists.
    pub fn new(
        device: &ash::Device,
        format: vk::Format,
        vertex: &ShaderBytecode,
        fragment: &ShaderBytecode,
        descriptor: &PipelineDescriptor,
    ) -> Result<Self, SetupError> {
        check_stages(vertex, fragment)?;

        let mut this = Self {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            device: device.clone(),
        };

        this.layout = create_pipeline_layout(device)?;
        this.render_pass = create_render_pass(device, format)?;

        // Modules only have to live until the pipeline exists
        let vertex = ShaderModule::new(device, vertex)?;
        let fragment = ShaderModule::new(device, fragment)?;

        this.pipeline = create_graphics_pipeline(
            device,
            this.render_pass,
            this.layout,
            &[&vertex, &fragment],
            descriptor,
        )?;

        log::info!("Graphics pipeline created for {:?}", format);
        Ok(this)
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_render_pass(self.render_pass, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// No descriptor sets, no push constants
/// Reject unusable bytecode before any Vulkan object exists
fn check_stages(vertex: &ShaderBytecode, fragment: &ShaderBytecode) -> Result<(), SetupError> {
    vertex.code()?;
    fragment.code()?;
    Ok(())
}

pub fn create_pipeline_layout(device: &ash::Device) -> Result<vk::PipelineLayout, SetupError> {
    let layout_info = vk::PipelineLayoutCreateInfo::default();

    unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(creation("pipeline layout"))
}

/// One subpass, one color attachment that ends up ready for presentation
pub fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, SetupError> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments);

    // Wait for the presentation engine to release the image before writing
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(creation("render pass"))
}

/// Create framebuffers for each swapchain image view
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>, SetupError> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for &image_view in image_views {
        let attachments = [image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(result) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(creation("framebuffer")(result));
            }
        }
    }
    Ok(framebuffers)
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    modules: &[&ShaderModule],
    descriptor: &PipelineDescriptor,
) -> Result<vk::Pipeline, SetupError> {
    let shader_stages: Vec<_> = modules
        .iter()
        .map(|module| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(module.stage.flags())
                .module(module.module)
                .name(ENTRY_POINT)
        })
        .collect();

    // Vertices come from the vertex shader itself
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(descriptor.topology)
        .primitive_restart_enable(descriptor.primitive_restart);

    // Counts only, the values are set per frame
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&descriptor.dynamic_states);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(descriptor.polygon_mode)
        .line_width(1.0)
        .cull_mode(descriptor.cull_mode)
        .front_face(descriptor.front_face)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(descriptor.samples);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(descriptor.color_write_mask)
        .blend_enable(descriptor.blend_enable);

    let color_blend_attachments = [color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    // No depth/stencil state: the render pass has no depth attachment
    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| creation("graphics pipeline")(result))?;

    pipelines
        .into_iter()
        .next()
        .ok_or(SetupError::Creation {
            what: "graphics pipeline",
            result: vk::Result::ERROR_UNKNOWN,
        })
}
