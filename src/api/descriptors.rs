//! Descriptor structs of the logical API.
//!
//! These are plain data: no handles, no backend types. A backend consumes a
//! descriptor once at creation time; mutating a descriptor afterwards has no
//! effect on the created object.

use crate::api::format::{TextureFormat, VertexFormat};
use crate::api::usage::{BufferUsages, ShaderStages, TextureUsages};

/// Optional debug label attached to a created object.
pub type Label<'a> = Option<&'a str>;

/// Configuration for instance creation.
#[derive(Debug, Clone)]
pub struct InstanceDescriptor<'a> {
    /// Application name reported to the backend.
    pub app_name: &'a str,
    /// Enable the backend validation layer when it is installed.
    pub enable_validation: bool,
}

impl Default for InstanceDescriptor<'_> {
    fn default() -> Self {
        Self {
            app_name: "prism",
            enable_validation: false,
        }
    }
}

/// Adapter selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerPreference {
    /// Prefer a discrete GPU, falling back to whatever is available.
    #[default]
    HighPerformance,
    /// Take the first adapter that works.
    LowPower,
}

/// Describes a [`Buffer`](crate::vulkan::Buffer) to create.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: Label<'a>,
    /// Size in bytes. Must be non-zero and within the backend addressing limit.
    pub size: u64,
    pub usage: BufferUsages,
    /// Reserved for a future persistent-map fast path; the write path maps on
    /// demand either way.
    pub mapped_at_creation: bool,
}

/// Width, height, and depth-or-layer-count of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
}

impl Default for Extent3d {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        }
    }
}

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
}

/// Describes a [`Texture`](crate::vulkan::Texture) to create.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    pub label: Label<'a>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    pub sample_count: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

/// View dimensionality, possibly reinterpreting the texture's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureViewDimension {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

/// Describes a [`TextureView`](crate::vulkan::TextureView) over a texture.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDescriptor<'a> {
    pub label: Label<'a>,
    pub dimension: TextureViewDimension,
    /// Reinterpret the texel format; `None` inherits the texture's format.
    pub format: Option<TextureFormat>,
    pub base_mip_level: u32,
    pub base_array_layer: u32,
}

/// Texel filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Texture coordinate addressing outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Describes a [`Sampler`](crate::vulkan::Sampler). Immutable after creation.
#[derive(Debug, Clone, Default)]
pub struct SamplerDescriptor<'a> {
    pub label: Label<'a>,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}

/// Describes a shader module to create.
///
/// The label doubles as the lookup key for the pre-compiled binary blob: the
/// device's shader library must contain a registered binary (or a
/// `<label>.spv` file under its search path) for this exact label.
#[derive(Debug, Clone)]
pub struct ShaderModuleDescriptor<'a> {
    pub label: &'a str,
}

/// Resource category a binding slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    UniformBuffer,
    StorageBuffer,
    SampledTexture,
    Sampler,
    CombinedImageSampler,
}

/// One slot of a bind-group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    /// Binding index within the group.
    pub binding: u32,
    pub ty: BindingType,
    pub visibility: ShaderStages,
}

/// One vertex attribute within a buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub shader_location: u32,
    pub offset: u64,
    pub format: VertexFormat,
}

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

/// Layout of one vertex buffer bound at draw time.
#[derive(Debug, Clone)]
pub struct VertexBufferLayout<'a> {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: &'a [VertexAttribute],
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// What happens to an attachment's contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Clear to the attachment's clear value.
    #[default]
    Clear,
    /// Keep whatever is already there.
    Load,
}

/// What happens to an attachment's contents when a pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

/// RGBA clear color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Requested configuration of a surface's presentation chain.
///
/// The platform may grant a different format/extent; the granted values
/// become the configuration of record, readable back from the surface.
#[derive(Debug, Clone)]
pub struct SurfaceConfiguration {
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub width: u32,
    pub height: u32,
    /// Present-mode hint. Only `"fifo"` is behaviorally meaningful; other
    /// values are accepted and recorded without changing the protocol.
    pub present_mode: String,
}

impl Default for SurfaceConfiguration {
    fn default() -> Self {
        Self {
            format: TextureFormat::Bgra8Unorm,
            usage: TextureUsages::RENDER_ATTACHMENT,
            width: 0,
            height: 0,
            present_mode: "fifo".to_owned(),
        }
    }
}
