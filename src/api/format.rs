//! Texture, vertex, and index formats supported by the layer.

/// Texel formats understood by every backend.
///
/// The set is deliberately small: two 8-bit-per-channel normalized color
/// formats, one 16-bit-float color format, and one combined depth/stencil
/// format. Anything else is out of scope for this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, normalized. The usual swapchain format.
    Bgra8Unorm,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 24-bit depth + 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Whether this format carries a depth aspect.
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    /// Bytes per texel for the color formats. Depth formats are backend-packed.
    #[must_use]
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Depth24PlusStencil8 => 4,
        }
    }
}

/// Per-attribute vertex data formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    /// Size of one attribute of this format, in bytes.
    #[must_use]
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Index element width for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Winding order that defines the front face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise (default).
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}
