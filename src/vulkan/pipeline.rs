//! Render and compute pipelines.
//!
//! A render pipeline is compatible only with render passes sharing its exact
//! [`RenderPassKey`]; the key is resolved from the descriptor's attachment
//! formats and clear policy, and the cached pass for that key is what the
//! pipeline is created against.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use smallvec::SmallVec;

use crate::api::{
    CullMode, FrontFace, Label, LoadOp, PrimitiveTopology, StoreOp, TextureFormat, VertexBufferLayout,
    VertexStepMode,
};
use crate::errors::{GpuError, Result};
use crate::vulkan::binding::BindGroupLayout;
use crate::vulkan::conv;
use crate::vulkan::device::{next_resource_id, DeviceShared};
use crate::vulkan::pass_cache::RenderPassKey;
use crate::vulkan::shader::ShaderModule;

const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

/// Describes a render pipeline to create.
pub struct RenderPipelineDescriptor<'a> {
    pub label: Label<'a>,
    pub vertex_shader: &'a ShaderModule,
    pub fragment_shader: Option<&'a ShaderModule>,
    pub bind_group_layouts: &'a [&'a BindGroupLayout],
    /// Per-buffer vertex layouts; empty selects a single-buffer
    /// three-float-position default.
    pub vertex_buffers: &'a [VertexBufferLayout<'a>],
    pub color_formats: &'a [TextureFormat],
    pub depth_stencil_format: Option<TextureFormat>,
    /// Clear policy folded into the render-pass key.
    pub color_load_op: LoadOp,
    pub color_store_op: StoreOp,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Standard source-alpha blending; `false` writes color unblended.
    pub alpha_blend: bool,
}

/// Fixed-function + shader-stage configuration for draw calls.
pub struct RenderPipeline {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    pass_key: RenderPassKey,
    destroyed: AtomicBool,
}

impl RenderPipeline {
    pub(crate) fn create(
        shared: Arc<DeviceShared>,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<Self> {
        if descriptor.color_formats.is_empty() {
            return Err(GpuError::Validation(
                "render pipeline requires at least one color format".into(),
            ));
        }

        let pass_key = RenderPassKey::from_formats(
            descriptor.color_formats,
            descriptor.color_load_op,
            descriptor.color_store_op,
            descriptor.depth_stencil_format,
        );
        let render_pass = shared.pass_cache.lock().obtain(&shared.raw, &pass_key)?;

        let layout = create_pipeline_layout(&shared, descriptor.bind_group_layouts)?;

        let mut stages: SmallVec<[vk::PipelineShaderStageCreateInfo; 2]> = SmallVec::new();
        stages.push(
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(descriptor.vertex_shader.raw)
                .name(SHADER_ENTRY_POINT)
                .build(),
        );
        if let Some(fragment) = descriptor.fragment_shader {
            stages.push(
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment.raw)
                    .name(SHADER_ENTRY_POINT)
                    .build(),
            );
        }

        let vertex_input = build_vertex_input(descriptor.vertex_buffers);
        let vertex_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_input.bindings)
            .vertex_attribute_descriptions(&vertex_input.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(conv::topology(descriptor.topology))
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(conv::cull_mode(descriptor.cull_mode))
            .front_face(conv::front_face(descriptor.front_face))
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachment = color_blend_attachment(descriptor.alpha_blend);
        let blend_attachments = vec![blend_attachment; descriptor.color_formats.len()];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(descriptor.depth_stencil_format.is_some())
            .depth_write_enable(descriptor.depth_stencil_format.is_some())
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_state)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let raw = unsafe {
            shared
                .raw
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info.build()], None)
        }
        .map_err(|(_, e)| GpuError::ResourceCreation {
            kind: "render pipeline",
            reason: e.to_string(),
        })?[0];

        let id = next_resource_id();
        shared
            .trackers
            .lock()
            .render_pipelines
            .insert(id, (raw, layout));
        log::debug!(
            "created render pipeline {id} ({:?}, vs '{}')",
            descriptor.label,
            descriptor.vertex_shader.label()
        );
        Ok(Self {
            shared,
            id,
            raw,
            layout,
            pass_key,
            destroyed: AtomicBool::new(false),
        })
    }

    /// The structural render-pass identity this pipeline was created against.
    #[must_use]
    pub fn pass_key(&self) -> &RenderPassKey {
        &self.pass_key
    }

    /// Destroys the pipeline and its layout, removing both from the device
    /// tracking set. Idempotent. The cached render pass stays cached.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            self.shared.trackers.lock().render_pipelines.remove(&self.id);
            unsafe {
                self.shared.raw.destroy_pipeline(self.raw, None);
                self.shared.raw.destroy_pipeline_layout(self.layout, None);
            }
        }
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Describes a compute pipeline to create.
pub struct ComputePipelineDescriptor<'a> {
    pub label: Label<'a>,
    pub shader: &'a ShaderModule,
    pub bind_group_layouts: &'a [&'a BindGroupLayout],
}

/// A compute pipeline: one shader stage plus its layout.
pub struct ComputePipeline {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    destroyed: AtomicBool,
}

impl ComputePipeline {
    pub(crate) fn create(
        shared: Arc<DeviceShared>,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<Self> {
        let layout = create_pipeline_layout(&shared, descriptor.bind_group_layouts)?;

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(descriptor.shader.raw)
            .name(SHADER_ENTRY_POINT)
            .build();

        let info = vk::ComputePipelineCreateInfo::builder().stage(stage).layout(layout);

        let raw = unsafe {
            shared
                .raw
                .create_compute_pipelines(vk::PipelineCache::null(), &[info.build()], None)
        }
        .map_err(|(_, e)| GpuError::ResourceCreation {
            kind: "compute pipeline",
            reason: e.to_string(),
        })?[0];

        let id = next_resource_id();
        shared
            .trackers
            .lock()
            .compute_pipelines
            .insert(id, (raw, layout));
        log::debug!("created compute pipeline {id} ({:?})", descriptor.label);
        Ok(Self {
            shared,
            id,
            raw,
            layout,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Destroys the pipeline and its layout. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            self.shared.trackers.lock().compute_pipelines.remove(&self.id);
            unsafe {
                self.shared.raw.destroy_pipeline(self.raw, None);
                self.shared.raw.destroy_pipeline_layout(self.layout, None);
            }
        }
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn create_pipeline_layout(
    shared: &DeviceShared,
    bind_group_layouts: &[&BindGroupLayout],
) -> Result<vk::PipelineLayout> {
    let set_layouts: Vec<vk::DescriptorSetLayout> =
        bind_group_layouts.iter().map(|l| l.raw).collect();
    let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
    unsafe { shared.raw.create_pipeline_layout(&info, None) }.map_err(|e| {
        GpuError::ResourceCreation {
            kind: "pipeline layout",
            reason: e.to_string(),
        }
    })
}

fn color_blend_attachment(alpha_blend: bool) -> vk::PipelineColorBlendAttachmentState {
    let mut state = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        )
        .blend_enable(alpha_blend);
    if alpha_blend {
        state = state
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD);
    }
    state.build()
}

pub(crate) struct VertexInputData {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Assembles Vulkan vertex input state from per-buffer layouts.
///
/// An empty slice selects the single-buffer default: binding 0, 12-byte
/// stride, one three-float position attribute at location 0.
pub(crate) fn build_vertex_input(layouts: &[VertexBufferLayout]) -> VertexInputData {
    if layouts.is_empty() {
        return VertexInputData {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 12,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: vec![vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            }],
        };
    }

    let mut bindings = Vec::with_capacity(layouts.len());
    let mut attributes = Vec::new();
    for (index, layout) in layouts.iter().enumerate() {
        let binding = index as u32;
        bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride: layout.array_stride as u32,
            input_rate: match layout.step_mode {
                VertexStepMode::Vertex => vk::VertexInputRate::VERTEX,
                VertexStepMode::Instance => vk::VertexInputRate::INSTANCE,
            },
        });
        for attribute in layout.attributes {
            attributes.push(vk::VertexInputAttributeDescription {
                location: attribute.shader_location,
                binding,
                format: conv::vertex_format(attribute.format),
                offset: attribute.offset as u32,
            });
        }
    }
    VertexInputData {
        bindings,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{VertexAttribute, VertexFormat};

    #[test]
    fn empty_layouts_select_single_buffer_default() {
        let input = build_vertex_input(&[]);
        assert_eq!(input.bindings.len(), 1);
        assert_eq!(input.bindings[0].stride, 12);
        assert_eq!(input.attributes.len(), 1);
        assert_eq!(input.attributes[0].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn layouts_map_to_indexed_bindings() {
        let position = [VertexAttribute {
            shader_location: 0,
            offset: 0,
            format: VertexFormat::Float32x3,
        }];
        let uv = [VertexAttribute {
            shader_location: 1,
            offset: 0,
            format: VertexFormat::Float32x2,
        }];
        let layouts = [
            VertexBufferLayout {
                array_stride: 12,
                step_mode: VertexStepMode::Vertex,
                attributes: &position,
            },
            VertexBufferLayout {
                array_stride: 8,
                step_mode: VertexStepMode::Instance,
                attributes: &uv,
            },
        ];
        let input = build_vertex_input(&layouts);
        assert_eq!(input.bindings.len(), 2);
        assert_eq!(input.bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(input.attributes[1].binding, 1);
        assert_eq!(input.attributes[1].format, vk::Format::R32G32_SFLOAT);
    }
}
