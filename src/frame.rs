// Per-frame clear and present
//
// One command buffer, re-recorded every frame after the previous frame's
// fence has signaled. The render pass clears to a color that cycles over
// time, then the pipeline draws its shader-generated triangle.

use crate::backend::error::{creation, SetupError};
use crate::backend::pipeline::{create_framebuffers, GraphicsPipeline};
use crate::backend::sync::FrameSync;
use crate::backend::{Swapchain, VulkanDevice};
use anyhow::{Context, Result};
use ash::vk;
use std::f64::consts::PI;

/// Three sine waves a third of a period apart, full alpha
pub fn clear_color(seconds: f64) -> [f32; 4] {
    let phase = |offset: f64| (0.5 + 0.5 * (seconds + offset).sin()) as f32;
    [phase(0.0), phase(PI * 2.0 / 3.0), phase(PI * 4.0 / 3.0), 1.0]
}

/// Command recording state and the framebuffers it renders into
pub struct FrameLoop {
    sync: FrameSync,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    framebuffers: Vec<vk::Framebuffer>,
    device: ash::Device,
}

impl FrameLoop {
    pub fn new(
        device: &VulkanDevice,
        swapchain: &Swapchain,
        pipeline: &GraphicsPipeline,
    ) -> Result<Self, SetupError> {
        let sync = FrameSync::new(&device.device, swapchain.images.len())?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(creation("command pool"))?;

        let mut this = Self {
            sync,
            command_pool,
            command_buffer: vk::CommandBuffer::null(),
            framebuffers: Vec::new(),
            device: device.device.clone(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        this.command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .map_err(creation("command buffer"))?
            .into_iter()
            .next()
            .ok_or(SetupError::Creation {
                what: "command buffer",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        this.framebuffers = create_framebuffers(
            &device.device,
            &swapchain.image_views,
            pipeline.render_pass,
            swapchain.extent,
        )?;

        Ok(this)
    }

    /// Clear to `color`, draw, and present
    ///
    /// Returns `false` when the frame was skipped because the swapchain is
    /// out of date.
    pub fn draw(
        &mut self,
        device: &VulkanDevice,
        swapchain: &Swapchain,
        pipeline: &GraphicsPipeline,
        color: [f32; 4],
    ) -> Result<bool> {
        let d = &device.device;
        let fence = self.sync.in_flight_fence;

        unsafe { d.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed to wait for frame fence")?;

        let Some(image_index) = swapchain
            .acquire_next_image(self.sync.image_available)
            .context("Failed to acquire swapchain image")?
        else {
            log::debug!("Swapchain out of date, skipping frame");
            return Ok(false);
        };

        unsafe { d.reset_fences(&[fence]) }.context("Failed to reset frame fence")?;

        self.record(image_index, swapchain.extent, pipeline, color)?;

        let render_finished = self.sync.render_finished[image_index as usize];
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { d.queue_submit(device.graphics_queue, &[submit_info], fence) }
            .context("Failed to submit frame")?;

        swapchain
            .present(device.present_queue, image_index, &signal_semaphores)
            .context("Failed to present frame")?;

        Ok(true)
    }

    fn record(
        &self,
        image_index: u32,
        extent: vk::Extent2D,
        pipeline: &GraphicsPipeline,
        color: [f32; 4],
    ) -> Result<()> {
        let d = &self.device;
        let cmd = self.command_buffer;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(pipeline.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            d.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;

            d.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(cmd, 0, &[render_area]);
            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);

            d.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            // Also frees the command buffer
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_starts_at_midpoint() {
        let [r, g, b, a] = clear_color(0.0);
        assert!((r - 0.5).abs() < 1e-6);
        assert!(g > r && b < r);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn channels_stay_in_range_and_balance() {
        // Three-phase sines sum to zero, so the channels always sum to 1.5
        for step in 0..200 {
            let [r, g, b, a] = clear_color(step as f64 * 0.173);
            for channel in [r, g, b] {
                assert!((0.0..=1.0).contains(&channel));
            }
            assert!((r + g + b - 1.5).abs() < 1e-5);
            assert_eq!(a, 1.0);
        }
    }

    #[test]
    fn repeats_every_two_pi() {
        let now = clear_color(1.25);
        let later = clear_color(1.25 + 2.0 * PI);
        for (x, y) in now.iter().zip(later.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
