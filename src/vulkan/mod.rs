//! Explicit Vulkan backend
//!
//! Realizes the logical API of [`crate::api`] against Vulkan: every logical
//! object wraps a native handle, every native correctness rule (alignment,
//! synchronization, object lifetime, render-pass compatibility) is enforced
//! here. There is no garbage collector to fall back on — owned handles are
//! destroyed exactly once, borrowed handles (swapchain images and their
//! views) are never destroyed by this layer.

mod binding;
mod buffer;
mod command;
mod conv;
mod device;
mod instance;
mod pass_cache;
mod pipeline;
mod queue;
mod shader;
mod surface;
mod texture;

pub use binding::{BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindingResource};
pub use buffer::Buffer;
pub use command::{
    CommandBuffer, CommandEncoder, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPassEncoder,
};
pub use device::Device;
pub use instance::{Adapter, Instance};
pub use pass_cache::{ColorAttachmentKey, RenderPassKey};
pub use pipeline::{
    ComputePipeline, ComputePipelineDescriptor, RenderPipeline, RenderPipelineDescriptor,
};
pub use queue::Queue;
pub use shader::{ShaderLibrary, ShaderModule};
pub use surface::{Surface, SurfaceFrame};
pub use texture::{Sampler, Texture, TextureView};
