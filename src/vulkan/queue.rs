//! Queue submission.
//!
//! `submit` is synchronous: one fence covers the whole batch, the call
//! blocks until the fence signals, and the command buffers go back to the
//! pool before it returns. Command buffers submitted together execute and
//! complete together; cross-submission ordering is program order of
//! `submit` calls. Once submitted, work is not revocable.

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::errors::{GpuError, Result};
use crate::vulkan::command::CommandBuffer;
use crate::vulkan::device::DeviceShared;
use crate::vulkan::surface::SwapchainSync;

/// The device's single graphics queue.
pub struct Queue {
    pub(crate) shared: Arc<DeviceShared>,
}

impl Queue {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self { shared }
    }

    /// Submits the command buffers in order and blocks until the GPU-side
    /// fence signals. No-op on an empty list.
    ///
    /// Buffers targeting an acquired swapchain frame carry that chain's sync
    /// pair: the batch waits on image-available and signals render-finished
    /// so a following present is ordered correctly.
    pub fn submit(&self, mut command_buffers: Vec<CommandBuffer>) -> Result<()> {
        if command_buffers.is_empty() {
            return Ok(());
        }
        if !self.shared.alive() {
            return Err(GpuError::SubmissionFailed("device has been destroyed".into()));
        }

        let raw_buffers: SmallVec<[vk::CommandBuffer; 4]> =
            command_buffers.iter().map(|cb| cb.cmd).collect();

        let mut syncs: SmallVec<[SwapchainSync; 2]> = SmallVec::new();
        for cb in &command_buffers {
            if let Some(sync) = cb.sync {
                if !syncs.iter().any(|s| s.image_available == sync.image_available) {
                    syncs.push(sync);
                }
            }
        }
        let wait_semaphores: SmallVec<[vk::Semaphore; 2]> =
            syncs.iter().map(|s| s.image_available).collect();
        let wait_stages: SmallVec<[vk::PipelineStageFlags; 2]> = syncs
            .iter()
            .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .collect();
        let signal_semaphores: SmallVec<[vk::Semaphore; 2]> =
            syncs.iter().map(|s| s.render_finished).collect();

        let fence = unsafe {
            self.shared
                .raw
                .create_fence(&vk::FenceCreateInfo::builder(), None)
        }
        .map_err(|e| GpuError::SubmissionFailed(format!("create_fence: {e}")))?;

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&raw_buffers)
            .signal_semaphores(&signal_semaphores);

        let result = unsafe {
            self.shared
                .raw
                .queue_submit(self.shared.queue, &[submit.build()], fence)
                .map_err(|e| GpuError::SubmissionFailed(format!("queue_submit: {e}")))
                .and_then(|()| {
                    self.shared
                        .raw
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| GpuError::SubmissionFailed(format!("wait_for_fences: {e}")))
                })
        };

        unsafe { self.shared.raw.destroy_fence(fence, None) };

        // Submitted or not, the buffers go back to the pool.
        for cb in &mut command_buffers {
            cb.release();
        }

        result
    }
}
