// Synchronization primitives
//
// One fence and one acquire semaphore for the single frame we keep in
// flight, plus a render-finished semaphore per swapchain image so the
// presentation engine never waits on a semaphore we are about to re-signal.

use super::error::{creation, SetupError};
use ash::vk;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: Vec<vk::Semaphore>,
    pub in_flight_fence: vk::Fence,
    device: ash::Device,
}

impl FrameSync {
    pub fn new(device: &ash::Device, image_count: usize) -> Result<Self, SetupError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first frame does not wait forever
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let mut this = Self {
            image_available: vk::Semaphore::null(),
            render_finished: Vec::with_capacity(image_count),
            in_flight_fence: vk::Fence::null(),
            device: device.clone(),
        };

        unsafe {
            this.in_flight_fence = device
                .create_fence(&fence_info, None)
                .map_err(creation("fence"))?;
            this.image_available = device
                .create_semaphore(&semaphore_info, None)
                .map_err(creation("semaphore"))?;
            for _ in 0..image_count {
                let semaphore = device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(creation("semaphore"))?;
                this.render_finished.push(semaphore);
            }
        }

        Ok(this)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            for &semaphore in &self.render_finished {
                self.device.destroy_semaphore(semaphore, None);
            }
            self.device.destroy_semaphore(self.image_available, None);
            self.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
