//! Logical GPU API
//!
//! Backend-neutral descriptor types, formats, and usage flags. This module is
//! the contract between callers and a backend: every logical object (buffer,
//! texture, pipeline, ...) is described here as plain data, and a backend
//! translates the description into its native objects. The explicit Vulkan
//! backend lives in [`crate::vulkan`]; a host-context (browser) backend plugs
//! into the same descriptors behind [`BackendKind::Browser`] and is provided
//! externally.

mod descriptors;
mod format;
mod usage;

pub use descriptors::{
    AddressMode, BindGroupLayoutEntry, BindingType, BufferDescriptor, Color, Extent3d, FilterMode,
    InstanceDescriptor, Label, LoadOp, PowerPreference, PrimitiveTopology, SamplerDescriptor,
    ShaderModuleDescriptor, StoreOp, SurfaceConfiguration, TextureDescriptor, TextureDimension,
    TextureViewDescriptor, TextureViewDimension, VertexAttribute, VertexBufferLayout,
    VertexStepMode,
};
pub use format::{CullMode, FrontFace, IndexFormat, TextureFormat, VertexFormat};
pub use usage::{BufferUsages, ShaderStages, TextureUsages};

/// Which backend realizes the logical API for a given instance.
///
/// Exactly two implementations exist: the explicit Vulkan backend in this
/// crate, and a browser host-context backend supplied by the embedding
/// environment. The tag is fixed at instance creation; host-dynamic values
/// never cross this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Native explicit-API backend (Vulkan).
    Vulkan,
    /// Browser-style immediate-mode backend (external collaborator).
    Browser,
}
