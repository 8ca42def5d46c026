//! Device / Resource Factory
//!
//! The [`Device`] is the single authority for creating and destroying every
//! GPU object bound to one logical device. It owns the command pool, the
//! descriptor pool, the render-pass cache, and the per-device tracking sets
//! that let [`Device::destroy`] reclaim everything even if individual call
//! sites forget — children are always torn down before parents
//! (bind groups → layouts → pipelines → cached render passes).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::api::{
    BindGroupLayoutEntry, BufferDescriptor, SamplerDescriptor, ShaderModuleDescriptor,
    TextureDescriptor,
};
use crate::errors::{GpuError, Result};
use crate::vulkan::binding::{BindGroup, BindGroupDescriptor, BindGroupLayout};
use crate::vulkan::buffer::Buffer;
use crate::vulkan::command::CommandEncoder;
use crate::vulkan::pass_cache::RenderPassCache;
use crate::vulkan::pipeline::{
    ComputePipeline, ComputePipelineDescriptor, RenderPipeline, RenderPipelineDescriptor,
};
use crate::vulkan::shader::{ShaderLibrary, ShaderModule};
use crate::vulkan::texture::{Sampler, Texture};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id used as the tracking-set key for every created object.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-device sets of live child objects, keyed by resource id.
///
/// Individual `destroy()` calls remove their entry; whatever is left at
/// device teardown is reclaimed in dependency order.
#[derive(Default)]
pub(crate) struct Trackers {
    pub bind_groups: FxHashMap<u64, vk::DescriptorSet>,
    pub bind_group_layouts: FxHashMap<u64, vk::DescriptorSetLayout>,
    pub render_pipelines: FxHashMap<u64, (vk::Pipeline, vk::PipelineLayout)>,
    pub compute_pipelines: FxHashMap<u64, (vk::Pipeline, vk::PipelineLayout)>,
}

/// Handles and caches shared between the device and its child objects.
pub(crate) struct DeviceShared {
    pub(crate) raw: ash::Device,
    pub(crate) physical: vk::PhysicalDevice,
    pub(crate) queue: vk::Queue,
    pub(crate) queue_family: u32,
    pub(crate) command_pool: vk::CommandPool,
    pub(crate) descriptor_pool: vk::DescriptorPool,
    pub(crate) memory_props: vk::PhysicalDeviceMemoryProperties,
    pub(crate) pass_cache: Mutex<RenderPassCache>,
    pub(crate) trackers: Mutex<Trackers>,
    destroyed: AtomicBool,
}

impl DeviceShared {
    pub(crate) fn new(
        raw: ash::Device,
        physical: vk::PhysicalDevice,
        queue: vk::Queue,
        queue_family: u32,
        command_pool: vk::CommandPool,
        descriptor_pool: vk::DescriptorPool,
        memory_props: vk::PhysicalDeviceMemoryProperties,
    ) -> Self {
        Self {
            raw,
            physical,
            queue,
            queue_family,
            command_pool,
            descriptor_pool,
            memory_props,
            pass_cache: Mutex::new(RenderPassCache::default()),
            trackers: Mutex::new(Trackers::default()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Whether the native device still exists. Child destroy calls become
    /// bookkeeping-only once the device itself has been torn down.
    pub(crate) fn alive(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    /// Finds a memory type index satisfying `type_bits` and `properties`.
    pub(crate) fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..self.memory_props.memory_type_count).find(|&i| {
            type_bits & (1 << i) != 0
                && self.memory_props.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
    }
}

/// Logical GPU connection: the factory for every resource type.
///
/// One `Device` maps to one graphics queue. All calls execute synchronously
/// on the calling thread; concurrent creation/destruction on the same device
/// requires caller-supplied mutual exclusion.
pub struct Device {
    pub(crate) shared: Arc<DeviceShared>,
    shaders: ShaderLibrary,
}

impl Device {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self {
            shared,
            shaders: ShaderLibrary::new(),
        }
    }

    /// The compiled-shader registry consulted by
    /// [`create_shader_module`](Self::create_shader_module).
    pub fn shader_library(&self) -> &ShaderLibrary {
        &self.shaders
    }

    // ========================================================================
    // Resource factories
    // ========================================================================

    /// Creates a buffer backed by freshly allocated device memory.
    pub fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<Buffer> {
        self.ensure_alive()?;
        Buffer::create(Arc::clone(&self.shared), descriptor)
    }

    /// Creates a texture that owns its image and memory.
    pub fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<Texture> {
        self.ensure_alive()?;
        Texture::create(Arc::clone(&self.shared), descriptor)
    }

    /// Creates an immutable sampler.
    pub fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<Sampler> {
        self.ensure_alive()?;
        Sampler::create(Arc::clone(&self.shared), descriptor)
    }

    /// Creates a shader module from the pre-compiled binary registered (or
    /// discoverable on disk) under the descriptor's label.
    pub fn create_shader_module(&self, descriptor: &ShaderModuleDescriptor) -> Result<ShaderModule> {
        self.ensure_alive()?;
        let words = self.shaders.resolve(descriptor.label)?;
        ShaderModule::create(Arc::clone(&self.shared), descriptor.label, &words)
    }

    /// Creates a bind-group layout declaring binding slots, resource types,
    /// and stage visibility.
    pub fn create_bind_group_layout(
        &self,
        label: Option<&str>,
        entries: &[BindGroupLayoutEntry],
    ) -> Result<BindGroupLayout> {
        self.ensure_alive()?;
        BindGroupLayout::create(Arc::clone(&self.shared), label, entries)
    }

    /// Allocates a descriptor set from the device pool and writes one
    /// descriptor per entry, cross-referencing the layout by binding index.
    pub fn create_bind_group(&self, descriptor: &BindGroupDescriptor) -> Result<BindGroup> {
        self.ensure_alive()?;
        BindGroup::create(Arc::clone(&self.shared), descriptor)
    }

    /// Builds a render pipeline against the cached render pass matching the
    /// descriptor's attachment formats and clear policy.
    pub fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipeline> {
        self.ensure_alive()?;
        RenderPipeline::create(Arc::clone(&self.shared), descriptor)
    }

    /// Builds a compute pipeline from one compute shader stage.
    pub fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipeline> {
        self.ensure_alive()?;
        ComputePipeline::create(Arc::clone(&self.shared), descriptor)
    }

    /// Allocates a command buffer and immediately begins one-time-submit
    /// recording. There is no separate "begin" call.
    pub fn create_command_encoder(&self, label: Option<&str>) -> Result<CommandEncoder> {
        self.ensure_alive()?;
        CommandEncoder::create(Arc::clone(&self.shared), label)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Tears down everything this device still tracks, then the device
    /// itself, in strict child-before-parent order:
    /// bind groups → bind-group layouts → pipelines (and their layouts) →
    /// cached render passes → pools → device.
    ///
    /// Idempotent: a second call is a no-op.
    pub fn destroy(&self) -> Result<()> {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let raw = &self.shared.raw;
        unsafe {
            raw.device_wait_idle()?;

            let mut guard = self.shared.trackers.lock();
            let trackers = &mut *guard;

            let sets: Vec<vk::DescriptorSet> = trackers.bind_groups.drain().map(|(_, s)| s).collect();
            if !sets.is_empty() {
                // Sets must go back to the pool before their layouts die.
                let _ = raw.free_descriptor_sets(self.shared.descriptor_pool, &sets);
            }

            for (_, layout) in trackers.bind_group_layouts.drain() {
                raw.destroy_descriptor_set_layout(layout, None);
            }

            for (_, (pipeline, layout)) in trackers
                .render_pipelines
                .drain()
                .chain(trackers.compute_pipelines.drain())
            {
                raw.destroy_pipeline(pipeline, None);
                raw.destroy_pipeline_layout(layout, None);
            }
            drop(guard);

            self.shared.pass_cache.lock().clear(raw);

            raw.destroy_descriptor_pool(self.shared.descriptor_pool, None);
            raw.destroy_command_pool(self.shared.command_pool, None);
            raw.destroy_device(None);
        }
        log::info!("destroyed device");
        Ok(())
    }

    /// Number of render passes currently cached. Useful for cache-identity
    /// assertions in tests.
    #[must_use]
    pub fn cached_render_pass_count(&self) -> usize {
        self.shared.pass_cache.lock().len()
    }

    /// Number of live tracked objects (bind groups + layouts + pipelines).
    #[must_use]
    pub fn tracked_object_count(&self) -> usize {
        let trackers = self.shared.trackers.lock();
        trackers.bind_groups.len()
            + trackers.bind_group_layouts.len()
            + trackers.render_pipelines.len()
            + trackers.compute_pipelines.len()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.alive() {
            Ok(())
        } else {
            Err(GpuError::Validation("device has been destroyed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ids_are_unique_and_increasing() {
        let a = next_resource_id();
        let b = next_resource_id();
        assert!(b > a);
    }
}
