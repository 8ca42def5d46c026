//! Textures, texture views, and samplers.
//!
//! A [`Texture`] either owns its image (created through the device factory)
//! or borrows it from the swapchain. Borrowed textures never destroy the
//! underlying image — `destroy()` is bookkeeping only.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;

use crate::api::{
    Extent3d, SamplerDescriptor, TextureDescriptor, TextureDimension, TextureFormat,
    TextureUsages, TextureViewDescriptor,
};
use crate::errors::{GpuError, Result};
use crate::vulkan::conv;
use crate::vulkan::device::{next_resource_id, DeviceShared};
use crate::vulkan::surface::SwapchainSync;

/// A GPU image plus its backing memory (when owned).
pub struct Texture {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) image: vk::Image,
    memory: vk::DeviceMemory,
    format: TextureFormat,
    size: Extent3d,
    mip_level_count: u32,
    sample_count: u32,
    usage: TextureUsages,
    owns_image: bool,
    destroyed: AtomicBool,
}

impl Texture {
    pub(crate) fn create(shared: Arc<DeviceShared>, descriptor: &TextureDescriptor) -> Result<Self> {
        validate_descriptor(descriptor)?;

        let info = vk::ImageCreateInfo::builder()
            .image_type(conv::image_type(descriptor.dimension))
            .extent(vk::Extent3D {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth: match descriptor.dimension {
                    TextureDimension::D3 => descriptor.size.depth_or_array_layers,
                    _ => 1,
                },
            })
            .mip_levels(descriptor.mip_level_count)
            .array_layers(match descriptor.dimension {
                TextureDimension::D3 => 1,
                _ => descriptor.size.depth_or_array_layers,
            })
            .format(conv::texture_format(descriptor.format))
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(conv::texture_usage(descriptor.usage, descriptor.format))
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { shared.raw.create_image(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "texture",
                reason: e.to_string(),
            }
        })?;

        let requirements = unsafe { shared.raw.get_image_memory_requirements(image) };
        let memory_type = shared
            .find_memory_type(
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .ok_or_else(|| {
                unsafe { shared.raw.destroy_image(image, None) };
                GpuError::ResourceCreation {
                    kind: "texture",
                    reason: "no device-local memory type".into(),
                }
            })?;

        let alloc = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { shared.raw.allocate_memory(&alloc, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { shared.raw.destroy_image(image, None) };
                return Err(GpuError::ResourceCreation {
                    kind: "texture",
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = unsafe { shared.raw.bind_image_memory(image, memory, 0) } {
            unsafe {
                shared.raw.destroy_image(image, None);
                shared.raw.free_memory(memory, None);
            }
            return Err(GpuError::ResourceCreation {
                kind: "texture",
                reason: e.to_string(),
            });
        }

        let id = next_resource_id();
        log::debug!(
            "created texture {id} ({}x{}, {:?})",
            descriptor.size.width,
            descriptor.size.height,
            descriptor.format
        );
        Ok(Self {
            shared,
            id,
            image,
            memory,
            format: descriptor.format,
            size: descriptor.size,
            mip_level_count: descriptor.mip_level_count,
            sample_count: descriptor.sample_count,
            usage: descriptor.usage,
            owns_image: true,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Wraps a swapchain image without taking ownership of it.
    pub(crate) fn borrowed(
        shared: Arc<DeviceShared>,
        image: vk::Image,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            shared,
            id: next_resource_id(),
            image,
            memory: vk::DeviceMemory::null(),
            format,
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            usage: TextureUsages::RENDER_ATTACHMENT,
            owns_image: false,
            destroyed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[must_use]
    pub fn size(&self) -> Extent3d {
        self.size
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.size.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.size.height
    }

    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    #[must_use]
    pub fn usage(&self) -> TextureUsages {
        self.usage
    }

    /// Whether this texture owns (and will destroy) its image.
    #[must_use]
    pub fn owns_image(&self) -> bool {
        self.owns_image
    }

    /// Creates a typed view over this texture.
    pub fn create_view(&self, descriptor: &TextureViewDescriptor) -> Result<TextureView> {
        let format = descriptor.format.unwrap_or(self.format);
        let subresource = vk::ImageSubresourceRange {
            aspect_mask: conv::aspect_mask(format),
            base_mip_level: descriptor.base_mip_level,
            level_count: 1,
            base_array_layer: descriptor.base_array_layer,
            layer_count: 1,
        };
        let info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(conv::image_view_type(descriptor.dimension))
            .format(conv::texture_format(format))
            .components(vk::ComponentMapping::default())
            .subresource_range(subresource);

        let raw = unsafe { self.shared.raw.create_image_view(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "texture view",
                reason: e.to_string(),
            }
        })?;

        Ok(TextureView {
            shared: Arc::clone(&self.shared),
            id: next_resource_id(),
            raw,
            format,
            width: self.size.width,
            height: self.size.height,
            owns_view: true,
            swapchain_sync: None,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Destroys the image and memory when owned; bookkeeping only when
    /// borrowed. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns_image && self.shared.alive() {
            unsafe {
                self.shared.raw.destroy_image(self.image, None);
                self.shared.raw.free_memory(self.memory, None);
            }
            log::debug!("destroyed texture {}", self.id);
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A typed sub-range view of a texture.
pub struct TextureView {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::ImageView,
    format: TextureFormat,
    pub(crate) width: u32,
    pub(crate) height: u32,
    owns_view: bool,
    /// Present synchronization carried by swapchain-borrowed views so the
    /// queue can order its submit against acquire/present.
    pub(crate) swapchain_sync: Option<SwapchainSync>,
    destroyed: AtomicBool,
}

impl TextureView {
    /// Wraps a swapchain image view without taking ownership of it.
    pub(crate) fn borrowed(
        shared: Arc<DeviceShared>,
        raw: vk::ImageView,
        format: TextureFormat,
        width: u32,
        height: u32,
        sync: SwapchainSync,
    ) -> Self {
        Self {
            shared,
            id: next_resource_id(),
            raw,
            format,
            width,
            height,
            owns_view: false,
            swapchain_sync: Some(sync),
            destroyed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Destroys the view when owned. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.owns_view && self.shared.alive() {
            unsafe { self.shared.raw.destroy_image_view(self.raw, None) };
            log::debug!("destroyed texture view {}", self.id);
        }
    }
}

impl Drop for TextureView {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Filtering and addressing configuration. Immutable after creation.
pub struct Sampler {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::Sampler,
    destroyed: AtomicBool,
}

impl Sampler {
    pub(crate) fn create(shared: Arc<DeviceShared>, descriptor: &SamplerDescriptor) -> Result<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(conv::filter(descriptor.mag_filter))
            .min_filter(conv::filter(descriptor.min_filter))
            .mipmap_mode(conv::mipmap_mode(descriptor.mipmap_filter))
            .address_mode_u(conv::address_mode(descriptor.address_mode_u))
            .address_mode_v(conv::address_mode(descriptor.address_mode_v))
            .address_mode_w(conv::address_mode(descriptor.address_mode_w))
            .mip_lod_bias(0.0)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0);

        let raw = unsafe { shared.raw.create_sampler(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "sampler",
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            shared,
            id: next_resource_id(),
            raw,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Destroys the sampler. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            unsafe { self.shared.raw.destroy_sampler(self.raw, None) };
            log::debug!("destroyed sampler {}", self.id);
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn validate_descriptor(descriptor: &TextureDescriptor) -> Result<()> {
    if descriptor.size.width == 0 || descriptor.size.height == 0 {
        return Err(GpuError::Validation(
            "texture extent must be non-zero".into(),
        ));
    }
    if descriptor.mip_level_count == 0 {
        return Err(GpuError::Validation(
            "texture mip level count must be at least 1".into(),
        ));
    }
    if descriptor.sample_count != 1 {
        return Err(GpuError::Validation(
            "multisampled textures are not supported".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TextureUsages;

    fn descriptor() -> TextureDescriptor<'static> {
        TextureDescriptor {
            label: None,
            size: Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING,
        }
    }

    #[test]
    fn zero_extent_is_rejected() {
        let mut desc = descriptor();
        desc.size.width = 0;
        assert!(validate_descriptor(&desc).is_err());
    }

    #[test]
    fn multisampling_is_rejected() {
        let mut desc = descriptor();
        desc.sample_count = 4;
        assert!(validate_descriptor(&desc).is_err());
    }

    #[test]
    fn plain_2d_descriptor_passes() {
        assert!(validate_descriptor(&descriptor()).is_ok());
    }
}
