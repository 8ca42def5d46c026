//! Usage flags for buffers, textures, and shader-stage visibility.

use bitflags::bitflags;

bitflags! {
    /// Declares how a buffer may be used after creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const MAP_READ  = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC  = 1 << 2;
        const COPY_DST  = 1 << 3;
        const INDEX     = 1 << 4;
        const VERTEX    = 1 << 5;
        const UNIFORM   = 1 << 6;
        const STORAGE   = 1 << 7;
        const INDIRECT  = 1 << 8;
    }
}

impl BufferUsages {
    /// Whether the buffer must be host-mappable.
    #[must_use]
    pub fn is_mappable(self) -> bool {
        self.intersects(BufferUsages::MAP_READ | BufferUsages::MAP_WRITE)
    }
}

bitflags! {
    /// Declares how a texture may be used after creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u32 {
        const COPY_SRC          = 1 << 0;
        const COPY_DST          = 1 << 1;
        const TEXTURE_BINDING   = 1 << 2;
        const STORAGE_BINDING   = 1 << 3;
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    /// Shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}
