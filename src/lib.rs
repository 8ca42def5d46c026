#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod api;
pub mod errors;
pub mod vulkan;

pub use api::{
    BackendKind, BindGroupLayoutEntry, BindingType, BufferDescriptor, BufferUsages, Color,
    CullMode, Extent3d, FilterMode, FrontFace, IndexFormat, InstanceDescriptor, LoadOp,
    PowerPreference, PrimitiveTopology, SamplerDescriptor, ShaderModuleDescriptor, ShaderStages,
    StoreOp, SurfaceConfiguration, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsages, TextureViewDescriptor, VertexAttribute, VertexBufferLayout, VertexFormat,
    VertexStepMode,
};
pub use errors::{GpuError, Result};
pub use vulkan::{
    Adapter, BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindingResource,
    Buffer, CommandBuffer, CommandEncoder, ComputePipeline, ComputePipelineDescriptor, Device,
    Instance, Queue, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPassEncoder, RenderPassKey, RenderPipeline,
    RenderPipelineDescriptor, Sampler, ShaderLibrary, ShaderModule, Surface, SurfaceFrame,
    Texture, TextureView,
};
