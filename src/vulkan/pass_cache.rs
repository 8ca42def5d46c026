//! Render Pass Cache
//!
//! Render passes are pure value-keyed cache entries: a [`RenderPassKey`] is
//! the structural identity (ordered color formats + load/store ops, optional
//! depth format), and equal keys always resolve to the identical cached
//! `VkRenderPass` handle. Pipelines never own a render pass — a pipeline
//! created against one key can be bound inside any encoder whose pass
//! resolved to the same key.

use ash::vk;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::api::{LoadOp, StoreOp, TextureFormat};
use crate::errors::{GpuError, Result};
use crate::vulkan::conv;

/// Structural identity of one color attachment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorAttachmentKey {
    pub format: TextureFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Structural identity of a render pass.
///
/// Two render-pass descriptors that normalize to the same key are served by
/// the same cached handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassKey {
    pub colors: SmallVec<[ColorAttachmentKey; 4]>,
    pub depth_stencil: Option<TextureFormat>,
}

impl RenderPassKey {
    /// Key for a pipeline rendering to the given color formats with one
    /// uniform clear policy.
    #[must_use]
    pub fn from_formats(
        color_formats: &[TextureFormat],
        load_op: LoadOp,
        store_op: StoreOp,
        depth_stencil: Option<TextureFormat>,
    ) -> Self {
        Self {
            colors: color_formats
                .iter()
                .map(|&format| ColorAttachmentKey {
                    format,
                    load_op,
                    store_op,
                })
                .collect(),
            depth_stencil,
        }
    }
}

/// Deduplicates render-pass creation by structural key.
#[derive(Default)]
pub(crate) struct RenderPassCache {
    passes: FxHashMap<RenderPassKey, vk::RenderPass>,
}

impl RenderPassCache {
    /// Returns the cached handle for `key`, creating it on first use.
    pub(crate) fn obtain(&mut self, device: &ash::Device, key: &RenderPassKey) -> Result<vk::RenderPass> {
        if let Some(&pass) = self.passes.get(key) {
            return Ok(pass);
        }
        let pass = create_render_pass(device, key)?;
        log::debug!("created render pass for key {key:?}");
        self.passes.insert(key.clone(), pass);
        Ok(pass)
    }

    pub(crate) fn len(&self) -> usize {
        self.passes.len()
    }

    /// Destroys every cached pass. Called during device teardown, after all
    /// pipelines referencing the passes are gone.
    pub(crate) fn clear(&mut self, device: &ash::Device) {
        for (_, pass) in self.passes.drain() {
            unsafe { device.destroy_render_pass(pass, None) };
        }
    }
}

fn create_render_pass(device: &ash::Device, key: &RenderPassKey) -> Result<vk::RenderPass> {
    let mut attachments: Vec<vk::AttachmentDescription> = Vec::with_capacity(key.colors.len() + 1);
    let mut color_refs: Vec<vk::AttachmentReference> = Vec::with_capacity(key.colors.len());

    for color in &key.colors {
        color_refs.push(vk::AttachmentReference {
            attachment: attachments.len() as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(conv::texture_format(color.format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(conv::load_op(color.load_op))
                .store_op(conv::store_op(color.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .build(),
        );
    }

    let depth_ref = key.depth_stencil.map(|format| {
        let reference = vk::AttachmentReference {
            attachment: attachments.len() as u32,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(conv::texture_format(format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        reference
    });

    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(ref depth) = depth_ref {
        subpass = subpass.depth_stencil_attachment(depth);
    }
    let subpasses = [subpass.build()];

    let dependencies = [vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build()];

    let info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&info, None) }.map_err(|e| GpuError::ResourceCreation {
        kind: "render pass",
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_key(formats: &[TextureFormat]) -> RenderPassKey {
        RenderPassKey::from_formats(formats, LoadOp::Clear, StoreOp::Store, None)
    }

    #[test]
    fn equal_descriptors_normalize_to_equal_keys() {
        let a = clear_key(&[TextureFormat::Bgra8Unorm]);
        let b = clear_key(&[TextureFormat::Bgra8Unorm]);
        assert_eq!(a, b);

        let mut hashes = rustc_hash::FxHashMap::default();
        hashes.insert(a, 1u32);
        assert_eq!(hashes.get(&b), Some(&1));
    }

    #[test]
    fn load_op_differences_produce_distinct_keys() {
        let clear = clear_key(&[TextureFormat::Bgra8Unorm]);
        let load = RenderPassKey::from_formats(
            &[TextureFormat::Bgra8Unorm],
            LoadOp::Load,
            StoreOp::Store,
            None,
        );
        assert_ne!(clear, load);
    }

    #[test]
    fn color_order_is_part_of_the_identity() {
        let ab = clear_key(&[TextureFormat::Bgra8Unorm, TextureFormat::Rgba16Float]);
        let ba = clear_key(&[TextureFormat::Rgba16Float, TextureFormat::Bgra8Unorm]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn depth_format_is_part_of_the_identity() {
        let without = clear_key(&[TextureFormat::Bgra8Unorm]);
        let with = RenderPassKey::from_formats(
            &[TextureFormat::Bgra8Unorm],
            LoadOp::Clear,
            StoreOp::Store,
            Some(TextureFormat::Depth24PlusStencil8),
        );
        assert_ne!(without, with);
    }
}
