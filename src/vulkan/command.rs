//! Command encoding
//!
//! [`CommandEncoder`] wraps one freshly-allocated command buffer and begins
//! one-time-submit recording on construction. [`RenderPassEncoder`] begins a
//! render pass against the cached pass matching its attachments, owns a
//! transient framebuffer for the duration of the pass, and destroys it on
//! `end()`. `finish()` seals the recording into an immutable
//! [`CommandBuffer`].

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::api::{Color, IndexFormat, Label, LoadOp, StoreOp};
use crate::errors::{GpuError, Result};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::binding::BindGroup;
use crate::vulkan::conv;
use crate::vulkan::device::{next_resource_id, DeviceShared};
use crate::vulkan::pass_cache::{ColorAttachmentKey, RenderPassKey};
use crate::vulkan::pipeline::RenderPipeline;
use crate::vulkan::surface::SwapchainSync;
use crate::vulkan::texture::TextureView;

/// One color attachment of a render pass.
pub struct RenderPassColorAttachment<'a> {
    pub view: &'a TextureView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: Color,
}

/// The depth/stencil attachment of a render pass.
pub struct RenderPassDepthStencilAttachment<'a> {
    pub view: &'a TextureView,
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Describes one render pass to begin.
pub struct RenderPassDescriptor<'a> {
    pub label: Label<'a>,
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Recording,
    Finished,
}

/// A single in-flight recording session. One-shot: `finish()` may be called
/// at most once, and encoding after `finish()` fails.
pub struct CommandEncoder {
    pub(crate) shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) cmd: vk::CommandBuffer,
    state: EncoderState,
    sync: Option<SwapchainSync>,
    handed_off: bool,
}

impl CommandEncoder {
    pub(crate) fn create(shared: Arc<DeviceShared>, label: Label) -> Result<Self> {
        let alloc = vk::CommandBufferAllocateInfo::builder()
            .command_pool(shared.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { shared.raw.allocate_command_buffers(&alloc) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "command buffer",
                reason: e.to_string(),
            }
        })?[0];

        let begin = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(e) = unsafe { shared.raw.begin_command_buffer(cmd, &begin) } {
            unsafe { shared.raw.free_command_buffers(shared.command_pool, &[cmd]) };
            return Err(GpuError::ResourceCreation {
                kind: "command buffer",
                reason: e.to_string(),
            });
        }

        let id = next_resource_id();
        log::debug!("created command encoder {id} ({label:?})");
        Ok(Self {
            shared,
            id,
            cmd,
            state: EncoderState::Recording,
            sync: None,
            handed_off: false,
        })
    }

    /// Begins a render pass over the descriptor's attachments.
    ///
    /// Resolves the cached render pass for the attachments' structural key,
    /// creates a transient framebuffer sized to the first color attachment,
    /// and records begin-render-pass plus full-extent viewport/scissor.
    pub fn begin_render_pass<'enc>(
        &'enc mut self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassEncoder<'enc>> {
        if self.state != EncoderState::Recording {
            return Err(GpuError::EncoderAlreadyFinished);
        }
        let Some(first) = descriptor.color_attachments.first() else {
            return Err(GpuError::Validation(
                "render pass requires at least one color attachment".into(),
            ));
        };

        let key = RenderPassKey {
            colors: descriptor
                .color_attachments
                .iter()
                .map(|a| ColorAttachmentKey {
                    format: a.view.format(),
                    load_op: a.load_op,
                    store_op: a.store_op,
                })
                .collect(),
            depth_stencil: descriptor
                .depth_stencil_attachment
                .as_ref()
                .map(|a| a.view.format()),
        };
        let render_pass = self.shared.pass_cache.lock().obtain(&self.shared.raw, &key)?;

        let extent = vk::Extent2D {
            width: first.view.width(),
            height: first.view.height(),
        };

        let mut attachments: SmallVec<[vk::ImageView; 5]> = descriptor
            .color_attachments
            .iter()
            .map(|a| a.view.raw)
            .collect();
        if let Some(ref depth) = descriptor.depth_stencil_attachment {
            attachments.push(depth.view.raw);
        }

        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { self.shared.raw.create_framebuffer(&framebuffer_info, None) }
            .map_err(|e| GpuError::ResourceCreation {
                kind: "framebuffer",
                reason: e.to_string(),
            })?;

        let mut clear_values: SmallVec<[vk::ClearValue; 5]> = descriptor
            .color_attachments
            .iter()
            .map(|a| vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [
                        a.clear_color.r,
                        a.clear_color.g,
                        a.clear_color.b,
                        a.clear_color.a,
                    ],
                },
            })
            .collect();
        if let Some(ref depth) = descriptor.depth_stencil_attachment {
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: depth.clear_depth,
                    stencil: depth.clear_stencil,
                },
            });
        }

        let begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.shared
                .raw
                .cmd_begin_render_pass(self.cmd, &begin, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.shared.raw.cmd_set_viewport(self.cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.shared.raw.cmd_set_scissor(self.cmd, 0, &[scissor]);
        }

        // A pass targeting an acquired swapchain image carries that chain's
        // sync pair through to queue submission.
        if let Some(sync) = descriptor
            .color_attachments
            .iter()
            .find_map(|a| a.view.swapchain_sync)
        {
            self.sync = Some(sync);
        }

        Ok(RenderPassEncoder {
            encoder: self,
            framebuffer,
            state: PassState::new(key),
        })
    }

    /// Ends recording and returns the immutable command buffer.
    ///
    /// Fails with [`GpuError::EncoderAlreadyFinished`] on a second call.
    pub fn finish(&mut self, label: Label) -> Result<CommandBuffer> {
        if self.state == EncoderState::Finished {
            return Err(GpuError::EncoderAlreadyFinished);
        }
        unsafe { self.shared.raw.end_command_buffer(self.cmd) }
            .map_err(|e| GpuError::SubmissionFailed(format!("end_command_buffer: {e}")))?;
        self.state = EncoderState::Finished;
        self.handed_off = true;
        log::debug!("finished command encoder {} ({label:?})", self.id);
        Ok(CommandBuffer {
            shared: Arc::clone(&self.shared),
            cmd: self.cmd,
            sync: self.sync,
            label: label.map(str::to_owned),
            released: false,
        })
    }
}

impl Drop for CommandEncoder {
    fn drop(&mut self) {
        // Buffer ownership transfers to the CommandBuffer on finish; an
        // unfinished encoder returns it to the pool here.
        if !self.handed_off && self.shared.alive() {
            unsafe {
                self.shared
                    .raw
                    .free_command_buffers(self.shared.command_pool, &[self.cmd]);
            }
        }
    }
}

/// Pure state tracking for a render-pass encoder: every violation is
/// detected here, before any native call.
#[derive(Debug)]
pub(crate) struct PassState {
    key: RenderPassKey,
    pipeline_layout: Option<vk::PipelineLayout>,
    ended: bool,
}

impl PassState {
    pub(crate) fn new(key: RenderPassKey) -> Self {
        Self {
            key,
            pipeline_layout: None,
            ended: false,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.ended {
            Err(GpuError::RenderPassAlreadyEnded)
        } else {
            Ok(())
        }
    }

    pub(crate) fn bind_pipeline(
        &mut self,
        pipeline_key: &RenderPassKey,
        layout: vk::PipelineLayout,
    ) -> Result<()> {
        self.ensure_active()?;
        if *pipeline_key != self.key {
            return Err(GpuError::IncompatibleRenderPass);
        }
        self.pipeline_layout = Some(layout);
        Ok(())
    }

    pub(crate) fn pipeline_layout(&self) -> Result<vk::PipelineLayout> {
        self.ensure_active()?;
        self.pipeline_layout.ok_or(GpuError::NoPipelineBound)
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.ended = true;
        Ok(())
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }
}

/// Active render-pass recording scope.
///
/// Draw state lives here; `end()` closes the pass and destroys the transient
/// framebuffer. Dropping an un-ended pass closes it as a backstop.
pub struct RenderPassEncoder<'enc> {
    encoder: &'enc mut CommandEncoder,
    framebuffer: vk::Framebuffer,
    state: PassState,
}

impl RenderPassEncoder<'_> {
    /// Binds a render pipeline.
    ///
    /// Fails with [`GpuError::IncompatibleRenderPass`] when the pipeline's
    /// render-pass key differs from this pass's key.
    pub fn set_pipeline(&mut self, pipeline: &RenderPipeline) -> Result<()> {
        self.state.bind_pipeline(pipeline.pass_key(), pipeline.layout)?;
        unsafe {
            self.encoder.shared.raw.cmd_bind_pipeline(
                self.encoder.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.raw,
            );
        }
        Ok(())
    }

    /// Binds a vertex buffer to `slot`.
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer, offset: u64) -> Result<()> {
        self.state.ensure_active()?;
        unsafe {
            self.encoder.shared.raw.cmd_bind_vertex_buffers(
                self.encoder.cmd,
                slot,
                &[buffer.raw],
                &[offset],
            );
        }
        Ok(())
    }

    /// Binds the index buffer.
    pub fn set_index_buffer(
        &mut self,
        buffer: &Buffer,
        format: IndexFormat,
        offset: u64,
    ) -> Result<()> {
        self.state.ensure_active()?;
        unsafe {
            self.encoder.shared.raw.cmd_bind_index_buffer(
                self.encoder.cmd,
                buffer.raw,
                offset,
                conv::index_type(format),
            );
        }
        Ok(())
    }

    /// Binds a bind group at `index` against the bound pipeline's layout.
    ///
    /// Fails with [`GpuError::NoPipelineBound`] before any `set_pipeline`.
    pub fn set_bind_group(&mut self, index: u32, bind_group: &BindGroup) -> Result<()> {
        let layout = self.state.pipeline_layout()?;
        unsafe {
            self.encoder.shared.raw.cmd_bind_descriptor_sets(
                self.encoder.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                index,
                &[bind_group.raw],
                &[],
            );
        }
        Ok(())
    }

    /// Records a non-indexed draw.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.state.pipeline_layout()?;
        unsafe {
            self.encoder.shared.raw.cmd_draw(
                self.encoder.cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
        Ok(())
    }

    /// Records an indexed draw.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.state.pipeline_layout()?;
        unsafe {
            self.encoder.shared.raw.cmd_draw_indexed(
                self.encoder.cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    /// Ends the pass and destroys the transient framebuffer.
    ///
    /// Fails with [`GpuError::RenderPassAlreadyEnded`] on a second call.
    pub fn end(&mut self) -> Result<()> {
        self.state.end()?;
        if self.encoder.shared.alive() {
            unsafe {
                self.encoder.shared.raw.cmd_end_render_pass(self.encoder.cmd);
                self.encoder.shared.raw.destroy_framebuffer(self.framebuffer, None);
            }
        }
        self.framebuffer = vk::Framebuffer::null();
        Ok(())
    }
}

impl Drop for RenderPassEncoder<'_> {
    fn drop(&mut self) {
        if !self.state.is_ended() {
            log::warn!("render pass encoder dropped without end(); closing pass");
            let _ = self.end();
        }
    }
}

/// An immutable, finished recording ready for queue submission.
///
/// Freed back to the command pool either by the queue after the fence wait,
/// or on drop when never submitted.
pub struct CommandBuffer {
    pub(crate) shared: Arc<DeviceShared>,
    pub(crate) cmd: vk::CommandBuffer,
    pub(crate) sync: Option<SwapchainSync>,
    label: Option<String>,
    released: bool,
}

impl CommandBuffer {
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns the buffer to the pool. Called by the queue after completion.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.shared.alive() {
            unsafe {
                self.shared
                    .raw
                    .free_command_buffers(self.shared.command_pool, &[self.cmd]);
            }
        }
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TextureFormat;

    fn key(format: TextureFormat) -> RenderPassKey {
        RenderPassKey::from_formats(&[format], LoadOp::Clear, StoreOp::Store, None)
    }

    #[test]
    fn pipeline_with_equal_key_binds() {
        let mut state = PassState::new(key(TextureFormat::Bgra8Unorm));
        assert!(state
            .bind_pipeline(&key(TextureFormat::Bgra8Unorm), vk::PipelineLayout::null())
            .is_ok());
        assert!(state.pipeline_layout().is_ok());
    }

    #[test]
    fn pipeline_with_different_key_is_incompatible() {
        let mut state = PassState::new(key(TextureFormat::Bgra8Unorm));
        assert!(matches!(
            state.bind_pipeline(&key(TextureFormat::Rgba8Unorm), vk::PipelineLayout::null()),
            Err(GpuError::IncompatibleRenderPass)
        ));
    }

    #[test]
    fn draw_state_requires_a_bound_pipeline() {
        let state = PassState::new(key(TextureFormat::Bgra8Unorm));
        assert!(matches!(
            state.pipeline_layout(),
            Err(GpuError::NoPipelineBound)
        ));
    }

    #[test]
    fn operations_after_end_fail() {
        let mut state = PassState::new(key(TextureFormat::Bgra8Unorm));
        state.end().unwrap();
        assert!(matches!(state.end(), Err(GpuError::RenderPassAlreadyEnded)));
        assert!(matches!(
            state.ensure_active(),
            Err(GpuError::RenderPassAlreadyEnded)
        ));
        assert!(matches!(
            state.bind_pipeline(&key(TextureFormat::Bgra8Unorm), vk::PipelineLayout::null()),
            Err(GpuError::RenderPassAlreadyEnded)
        ));
    }
}
