//! Bind-group layouts and bind groups (descriptor sets).
//!
//! A layout declares the binding contract; a bind group pulls one descriptor
//! set from the device pool and writes one descriptor per entry, matched
//! against the layout entry with the same binding index. Bind groups must be
//! destroyed before their layout (device teardown enforces the order for
//! whatever is left).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;

use crate::api::{BindGroupLayoutEntry, BindingType, Label};
use crate::errors::{GpuError, Result};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::conv;
use crate::vulkan::device::{next_resource_id, DeviceShared};
use crate::vulkan::texture::{Sampler, TextureView};

/// Declares binding slots, resource types, and stage visibility.
pub struct BindGroupLayout {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::DescriptorSetLayout,
    entries: Vec<BindGroupLayoutEntry>,
    destroyed: AtomicBool,
}

impl BindGroupLayout {
    pub(crate) fn create(
        shared: Arc<DeviceShared>,
        label: Label,
        entries: &[BindGroupLayoutEntry],
    ) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(entry.binding)
                    .descriptor_type(conv::descriptor_type(entry.ty))
                    .descriptor_count(1)
                    .stage_flags(conv::shader_stages(entry.visibility))
                    .build()
            })
            .collect();

        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let raw = unsafe { shared.raw.create_descriptor_set_layout(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "bind group layout",
                reason: e.to_string(),
            }
        })?;

        let id = next_resource_id();
        shared.trackers.lock().bind_group_layouts.insert(id, raw);
        log::debug!(
            "created bind group layout {id} ({:?}, {} entries)",
            label,
            entries.len()
        );
        Ok(Self {
            shared,
            id,
            raw,
            entries: entries.to_vec(),
            destroyed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.entries
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Destroys the layout and removes it from the device tracking set.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            self.shared.trackers.lock().bind_group_layouts.remove(&self.id);
            unsafe {
                self.shared.raw.destroy_descriptor_set_layout(self.raw, None);
            }
        }
    }
}

impl Drop for BindGroupLayout {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// One concrete resource bound into a group slot.
pub enum BindingResource<'a> {
    Buffer {
        buffer: &'a Buffer,
        offset: u64,
        /// Bound range in bytes; `None` binds from `offset` to the end.
        size: Option<u64>,
    },
    TextureView(&'a TextureView),
    Sampler(&'a Sampler),
    TextureViewAndSampler(&'a TextureView, &'a Sampler),
}

/// One entry of a bind group, paired to the layout slot with the same
/// binding index.
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

/// Describes a bind group to allocate against a layout.
pub struct BindGroupDescriptor<'a> {
    pub label: Label<'a>,
    pub layout: &'a BindGroupLayout,
    pub entries: &'a [BindGroupEntry<'a>],
}

/// Concrete resource bindings matching a layout, backed by one allocated
/// descriptor set.
pub struct BindGroup {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::DescriptorSet,
    layout_id: u64,
    destroyed: AtomicBool,
}

impl BindGroup {
    pub(crate) fn create(shared: Arc<DeviceShared>, descriptor: &BindGroupDescriptor) -> Result<Self> {
        // Validate entry/layout agreement before touching the pool.
        for entry in descriptor.entries {
            check_entry(
                descriptor.layout.entries(),
                entry.binding,
                resource_kind(&entry.resource),
            )?;
        }

        let label = descriptor.label.unwrap_or("<unlabeled>");
        let set_layouts = [descriptor.layout.raw];
        let alloc = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(shared.descriptor_pool)
            .set_layouts(&set_layouts);

        let raw = unsafe { shared.raw.allocate_descriptor_sets(&alloc) }
            .map_err(|e| match e {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    GpuError::DescriptorPoolExhausted(label.to_owned())
                }
                other => GpuError::ResourceCreation {
                    kind: "bind group",
                    reason: other.to_string(),
                },
            })?[0];

        write_descriptors(&shared, raw, descriptor)?;

        let id = next_resource_id();
        shared.trackers.lock().bind_groups.insert(id, raw);
        log::debug!("created bind group {id} ('{label}')");
        Ok(Self {
            shared,
            id,
            raw,
            layout_id: descriptor.layout.id(),
            destroyed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn layout_id(&self) -> u64 {
        self.layout_id
    }

    /// Returns the descriptor set to the pool and removes the group from the
    /// device tracking set. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            self.shared.trackers.lock().bind_groups.remove(&self.id);
            unsafe {
                let _ = self
                    .shared
                    .raw
                    .free_descriptor_sets(self.shared.descriptor_pool, &[self.raw]);
            }
        }
    }
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Resource category actually supplied by an entry, for mismatch reporting.
pub(crate) fn resource_kind(resource: &BindingResource) -> &'static str {
    match resource {
        BindingResource::Buffer { .. } => "buffer",
        BindingResource::TextureView(_) => "texture view",
        BindingResource::Sampler(_) => "sampler",
        BindingResource::TextureViewAndSampler(..) => "texture view + sampler",
    }
}

fn expected_kind(ty: BindingType) -> &'static str {
    match ty {
        BindingType::UniformBuffer | BindingType::StorageBuffer => "buffer",
        BindingType::SampledTexture => "texture view",
        BindingType::Sampler => "sampler",
        BindingType::CombinedImageSampler => "texture view + sampler",
    }
}

/// Checks that the entry at `binding` exists in the layout and that the
/// supplied resource kind matches the declared type.
pub(crate) fn check_entry(
    layout: &[BindGroupLayoutEntry],
    binding: u32,
    actual: &'static str,
) -> Result<()> {
    let Some(layout_entry) = layout.iter().find(|e| e.binding == binding) else {
        return Err(GpuError::Validation(format!(
            "binding {binding} is not declared by the bind group layout"
        )));
    };
    let expected = expected_kind(layout_entry.ty);
    if expected != actual {
        return Err(GpuError::BindingMismatch {
            binding,
            expected,
            actual,
        });
    }
    Ok(())
}

fn write_descriptors(
    shared: &DeviceShared,
    set: vk::DescriptorSet,
    descriptor: &BindGroupDescriptor,
) -> Result<()> {
    enum InfoSlot {
        Buffer(usize),
        Image(usize),
    }

    let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::with_capacity(descriptor.entries.len());
    let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::with_capacity(descriptor.entries.len());
    let mut planned: Vec<(u32, vk::DescriptorType, InfoSlot)> =
        Vec::with_capacity(descriptor.entries.len());

    for entry in descriptor.entries {
        let layout_entry = descriptor
            .layout
            .entries()
            .iter()
            .find(|e| e.binding == entry.binding)
            .expect("validated above");
        let ty = conv::descriptor_type(layout_entry.ty);

        match &entry.resource {
            BindingResource::Buffer {
                buffer,
                offset,
                size,
            } => {
                buffer_infos.push(vk::DescriptorBufferInfo {
                    buffer: buffer.raw,
                    offset: *offset,
                    range: size.unwrap_or(vk::WHOLE_SIZE),
                });
                planned.push((entry.binding, ty, InfoSlot::Buffer(buffer_infos.len() - 1)));
            }
            BindingResource::TextureView(view) => {
                image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view.raw,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                });
                planned.push((entry.binding, ty, InfoSlot::Image(image_infos.len() - 1)));
            }
            BindingResource::Sampler(sampler) => {
                image_infos.push(vk::DescriptorImageInfo {
                    sampler: sampler.raw,
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                });
                planned.push((entry.binding, ty, InfoSlot::Image(image_infos.len() - 1)));
            }
            BindingResource::TextureViewAndSampler(view, sampler) => {
                image_infos.push(vk::DescriptorImageInfo {
                    sampler: sampler.raw,
                    image_view: view.raw,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                });
                planned.push((entry.binding, ty, InfoSlot::Image(image_infos.len() - 1)));
            }
        }
    }

    let writes: Vec<vk::WriteDescriptorSet> = planned
        .iter()
        .map(|(binding, ty, slot)| {
            let mut write = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(*ty);
            write = match slot {
                InfoSlot::Buffer(i) => write.buffer_info(std::slice::from_ref(&buffer_infos[*i])),
                InfoSlot::Image(i) => write.image_info(std::slice::from_ref(&image_infos[*i])),
            };
            write.build()
        })
        .collect();

    unsafe { shared.raw.update_descriptor_sets(&writes, &[]) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ShaderStages;

    fn layout() -> Vec<BindGroupLayoutEntry> {
        vec![
            BindGroupLayoutEntry {
                binding: 0,
                ty: BindingType::UniformBuffer,
                visibility: ShaderStages::VERTEX,
            },
            BindGroupLayoutEntry {
                binding: 1,
                ty: BindingType::CombinedImageSampler,
                visibility: ShaderStages::FRAGMENT,
            },
            BindGroupLayoutEntry {
                binding: 2,
                ty: BindingType::Sampler,
                visibility: ShaderStages::FRAGMENT,
            },
        ]
    }

    #[test]
    fn matching_kinds_pass() {
        let layout = layout();
        assert!(check_entry(&layout, 0, "buffer").is_ok());
        assert!(check_entry(&layout, 1, "texture view + sampler").is_ok());
        assert!(check_entry(&layout, 2, "sampler").is_ok());
    }

    #[test]
    fn mismatched_kind_reports_binding_and_types() {
        let layout = layout();
        match check_entry(&layout, 0, "sampler") {
            Err(GpuError::BindingMismatch {
                binding,
                expected,
                actual,
            }) => {
                assert_eq!(binding, 0);
                assert_eq!(expected, "buffer");
                assert_eq!(actual, "sampler");
            }
            other => panic!("expected BindingMismatch, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_binding_is_a_validation_error() {
        assert!(matches!(
            check_entry(&layout(), 7, "buffer"),
            Err(GpuError::Validation(_))
        ));
    }

    #[test]
    fn storage_buffers_also_expect_buffer_resources() {
        let layout = [BindGroupLayoutEntry {
            binding: 0,
            ty: BindingType::StorageBuffer,
            visibility: ShaderStages::COMPUTE,
        }];
        assert!(check_entry(&layout, 0, "buffer").is_ok());
        assert!(check_entry(&layout, 0, "texture view").is_err());
    }
}
