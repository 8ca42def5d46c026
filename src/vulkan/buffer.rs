//! GPU-visible linear memory.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;

use crate::api::{BufferDescriptor, BufferUsages};
use crate::errors::{GpuError, Result};
use crate::vulkan::conv;
use crate::vulkan::device::{next_resource_id, DeviceShared};

/// Largest buffer the layer will address. Descriptors beyond this are
/// rejected before any native call.
pub const MAX_BUFFER_SIZE: u64 = 1 << 31;

/// A linear range of GPU-visible memory with an attached native handle.
///
/// Written through the host map/unmap path; destroyed explicitly (and
/// idempotently) or left for the backing memory to die with the device.
pub struct Buffer {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    usage: BufferUsages,
    destroyed: AtomicBool,
}

impl Buffer {
    pub(crate) fn create(shared: Arc<DeviceShared>, descriptor: &BufferDescriptor) -> Result<Self> {
        validate_descriptor(descriptor)?;

        let info = vk::BufferCreateInfo::builder()
            .size(descriptor.size)
            .usage(conv::buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = unsafe { shared.raw.create_buffer(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "buffer",
                reason: e.to_string(),
            }
        })?;

        let requirements = unsafe { shared.raw.get_buffer_memory_requirements(raw) };
        let memory_type = choose_memory_type(&shared, &requirements, descriptor).ok_or_else(|| {
            unsafe { shared.raw.destroy_buffer(raw, None) };
            GpuError::ResourceCreation {
                kind: "buffer",
                reason: "no suitable memory type".into(),
            }
        })?;

        let alloc = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { shared.raw.allocate_memory(&alloc, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { shared.raw.destroy_buffer(raw, None) };
                return Err(GpuError::ResourceCreation {
                    kind: "buffer",
                    reason: e.to_string(),
                });
            }
        };

        if let Err(e) = unsafe { shared.raw.bind_buffer_memory(raw, memory, 0) } {
            unsafe {
                shared.raw.destroy_buffer(raw, None);
                shared.raw.free_memory(memory, None);
            }
            return Err(GpuError::ResourceCreation {
                kind: "buffer",
                reason: e.to_string(),
            });
        }

        let id = next_resource_id();
        log::debug!(
            "created buffer {id} ({} bytes, {:?})",
            descriptor.size,
            descriptor.usage
        );
        Ok(Self {
            shared,
            id,
            raw,
            memory,
            size: descriptor.size,
            usage: descriptor.usage,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Usage flags the buffer was created with.
    #[must_use]
    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    /// Copies `data` into the buffer at `offset` through a map/unmap cycle.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        unsafe {
            let mapped = self.shared.raw.map_memory(
                self.memory,
                offset,
                data.len() as u64,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            self.shared.raw.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Reads `len` bytes back from the buffer at `offset`.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.check_range(offset, len)?;
        let mut out = vec![0u8; len as usize];
        if len == 0 {
            return Ok(out);
        }
        unsafe {
            let mapped =
                self.shared
                    .raw
                    .map_memory(self.memory, offset, len, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(mapped.cast::<u8>(), out.as_mut_ptr(), len as usize);
            self.shared.raw.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Writes a float slice at a byte offset.
    pub fn write_floats(&self, offset: u64, data: &[f32]) -> Result<()> {
        self.write(offset, bytemuck::cast_slice(data))
    }

    /// Reads `count` floats back from a byte offset, bit-for-bit.
    pub fn read_floats(&self, offset: u64, count: usize) -> Result<Vec<f32>> {
        let bytes = self.read(offset, (count * 4) as u64)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Destroys the buffer and frees its memory. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            unsafe {
                self.shared.raw.destroy_buffer(self.raw, None);
                self.shared.raw.free_memory(self.memory, None);
            }
            log::debug!("destroyed buffer {}", self.id);
        }
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(GpuError::Validation(format!(
                "range {offset}..{offset}+{len} exceeds buffer size {}",
                self.size
            )));
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.destroy();
    }
}

pub(crate) fn validate_descriptor(descriptor: &BufferDescriptor) -> Result<()> {
    if descriptor.size == 0 {
        return Err(GpuError::Validation("buffer size must be non-zero".into()));
    }
    if descriptor.size > MAX_BUFFER_SIZE {
        return Err(GpuError::Validation(format!(
            "buffer size {} exceeds addressing limit {MAX_BUFFER_SIZE}",
            descriptor.size
        )));
    }
    Ok(())
}

fn choose_memory_type(
    shared: &DeviceShared,
    requirements: &vk::MemoryRequirements,
    descriptor: &BufferDescriptor,
) -> Option<u32> {
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    if descriptor.usage.is_mappable() || descriptor.mapped_at_creation {
        return shared.find_memory_type(requirements.memory_type_bits, host);
    }
    // Prefer device-local memory that is still mappable so the map/unmap
    // write path always works; plain host memory is the fallback.
    shared
        .find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host,
        )
        .or_else(|| shared.find_memory_type(requirements.memory_type_bits, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(size: u64) -> BufferDescriptor<'static> {
        BufferDescriptor {
            label: None,
            size,
            usage: BufferUsages::VERTEX,
            mapped_at_creation: false,
        }
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            validate_descriptor(&descriptor(0)),
            Err(GpuError::Validation(_))
        ));
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        assert!(matches!(
            validate_descriptor(&descriptor(MAX_BUFFER_SIZE + 1)),
            Err(GpuError::Validation(_))
        ));
    }

    #[test]
    fn in_range_size_passes_validation() {
        assert!(validate_descriptor(&descriptor(432)).is_ok());
    }
}
