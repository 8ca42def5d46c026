//! Instance and adapter bring-up.
//!
//! The [`Instance`] owns the Vulkan entry points and instance-level dispatch.
//! An [`Adapter`] is one selectable physical device plus the queue family a
//! logical device will be built on; `request_device` turns it into a
//! [`Device`]/[`Queue`] pair with the command and descriptor pools already
//! attached.

use std::ffi::{CStr, CString};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::api::{BackendKind, InstanceDescriptor, PowerPreference};
use crate::errors::{GpuError, Result};
use crate::vulkan::device::{Device, DeviceShared};
use crate::vulkan::queue::Queue;
use crate::vulkan::surface::Surface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Descriptor pool dimensions. Exhaustion surfaces as
/// [`GpuError::DescriptorPoolExhausted`]; there is no automatic growth.
const MAX_DESCRIPTOR_SETS: u32 = 512;
const POOL_UNIFORM_BUFFERS: u32 = 512;
const POOL_COMBINED_IMAGE_SAMPLERS: u32 = 256;
const POOL_SAMPLERS: u32 = 256;
const POOL_SAMPLED_IMAGES: u32 = 256;
const POOL_STORAGE_BUFFERS: u32 = 128;

pub(crate) struct InstanceShared {
    pub(crate) entry: ash::Entry,
    pub(crate) raw: ash::Instance,
    pub(crate) surface_loader: khr::Surface,
    pub(crate) surface_support: bool,
    destroyed: AtomicBool,
}

impl InstanceShared {
    pub(crate) fn alive(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }
}

/// Entry point of the layer: create one per process, then request adapters
/// and surfaces from it.
pub struct Instance {
    shared: Arc<InstanceShared>,
    validation: bool,
}

impl Instance {
    /// Creates a headless instance (no window-system extensions). Surfaces
    /// cannot be created from it; use [`Instance::with_display`] for
    /// presentation.
    pub fn new(descriptor: &InstanceDescriptor) -> Result<Self> {
        Self::create(descriptor, None)
    }

    /// Creates an instance with the window-system extensions required by the
    /// given display.
    pub fn with_display(
        descriptor: &InstanceDescriptor,
        display: &impl HasRawDisplayHandle,
    ) -> Result<Self> {
        Self::create(descriptor, Some(display.raw_display_handle()))
    }

    fn create(
        descriptor: &InstanceDescriptor,
        display: Option<raw_window_handle::RawDisplayHandle>,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::AdapterRequestFailed(format!("failed to load Vulkan: {e}")))?;

        let app_name = CString::new(descriptor.app_name)
            .map_err(|_| GpuError::Validation("app name contains a NUL byte".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"prism")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let extensions = match display {
            Some(display) => ash_window::enumerate_required_extensions(display)
                .map_err(|e| GpuError::AdapterRequestFailed(e.to_string()))?
                .to_vec(),
            None => Vec::new(),
        };

        let mut layers: Vec<*const std::ffi::c_char> = Vec::new();
        let validation = descriptor.enable_validation && validation_layer_available(&entry);
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let raw = unsafe { entry.create_instance(&info, None) }
            .map_err(|e| GpuError::AdapterRequestFailed(format!("create_instance: {e}")))?;

        let surface_loader = khr::Surface::new(&entry, &raw);
        log::info!(
            "created instance ('{}', validation: {validation})",
            descriptor.app_name
        );
        Ok(Self {
            shared: Arc::new(InstanceShared {
                entry,
                raw,
                surface_loader,
                surface_support: display.is_some(),
                destroyed: AtomicBool::new(false),
            }),
            validation,
        })
    }

    /// Which backend this instance realizes.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    /// Whether the validation layer ended up enabled.
    #[must_use]
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    /// Creates a surface bound to the platform window.
    pub fn create_surface(
        &self,
        window: &(impl HasRawWindowHandle + HasRawDisplayHandle),
    ) -> Result<Surface> {
        if !self.shared.surface_support {
            return Err(GpuError::Validation(
                "instance was created without window-system support".into(),
            ));
        }
        let raw = unsafe {
            ash_window::create_surface(
                &self.shared.entry,
                &self.shared.raw,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .map_err(|e| GpuError::ResourceCreation {
            kind: "surface",
            reason: e.to_string(),
        })?;
        log::info!("created surface");
        Ok(Surface::new(Arc::clone(&self.shared), raw))
    }

    /// Selects a physical device and the queue family a device will use.
    ///
    /// `compatible_surface` restricts the choice to families that can also
    /// present to that surface.
    pub fn request_adapter(
        &self,
        power: PowerPreference,
        compatible_surface: Option<&Surface>,
    ) -> Result<Adapter> {
        let physical_devices = unsafe { self.shared.raw.enumerate_physical_devices() }
            .map_err(|e| GpuError::AdapterRequestFailed(e.to_string()))?;
        if physical_devices.is_empty() {
            return Err(GpuError::AdapterRequestFailed(
                "no Vulkan devices available".into(),
            ));
        }

        let mut ordered: Vec<vk::PhysicalDevice> = Vec::with_capacity(physical_devices.len());
        if power == PowerPreference::HighPerformance {
            for &pd in &physical_devices {
                let props = unsafe { self.shared.raw.get_physical_device_properties(pd) };
                if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                    ordered.push(pd);
                }
            }
        }
        for &pd in &physical_devices {
            if !ordered.contains(&pd) {
                ordered.push(pd);
            }
        }

        let chosen = ordered
            .iter()
            .find_map(|&pd| self.find_queue_family(pd, compatible_surface).map(|qf| (pd, qf)))
            // No family supports presentation: fall back to plain graphics.
            .or_else(|| {
                ordered
                    .iter()
                    .find_map(|&pd| self.find_queue_family(pd, None).map(|qf| (pd, qf)))
            });

        let Some((physical, queue_family)) = chosen else {
            return Err(GpuError::AdapterRequestFailed(
                "no queue family with graphics support".into(),
            ));
        };

        let props = unsafe { self.shared.raw.get_physical_device_properties(physical) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        log::info!("selected adapter '{name}' (queue family {queue_family})");
        Ok(Adapter {
            instance: Arc::clone(&self.shared),
            physical,
            queue_family,
            name,
            device_type: props.device_type,
        })
    }

    fn find_queue_family(
        &self,
        physical: vk::PhysicalDevice,
        compatible_surface: Option<&Surface>,
    ) -> Option<u32> {
        let families = unsafe {
            self.shared
                .raw
                .get_physical_device_queue_family_properties(physical)
        };
        families.iter().enumerate().find_map(|(index, family)| {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                return None;
            }
            if let Some(surface) = compatible_surface {
                let supported = unsafe {
                    self.shared.surface_loader.get_physical_device_surface_support(
                        physical,
                        index,
                        surface.raw,
                    )
                }
                .unwrap_or(false);
                if !supported {
                    return None;
                }
            }
            Some(index)
        })
    }

    /// Destroys the instance. All devices and surfaces created from it must
    /// be destroyed first. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe { self.shared.raw.destroy_instance(None) };
        log::info!("destroyed instance");
    }
}

/// One selectable physical GPU before a device is created from it.
pub struct Adapter {
    instance: Arc<InstanceShared>,
    physical: vk::PhysicalDevice,
    queue_family: u32,
    name: String,
    device_type: vk::PhysicalDeviceType,
}

impl Adapter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_discrete(&self) -> bool {
        self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// Creates the logical device and its single graphics queue.
    pub fn request_device(&self) -> Result<(Device, Queue)> {
        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(self.queue_family)
            .queue_priorities(&priorities)
            .build()];

        let mut extensions: Vec<*const std::ffi::c_char> = Vec::new();
        if self.instance.surface_support {
            extensions.push(khr::Swapchain::name().as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::default();
        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let raw = unsafe { self.instance.raw.create_device(self.physical, &info, None) }
            .map_err(|e| GpuError::DeviceCreateFailed(e.to_string()))?;
        let queue = unsafe { raw.get_device_queue(self.queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { raw.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { raw.destroy_device(None) };
                return Err(GpuError::DeviceCreateFailed(format!(
                    "create_command_pool: {e}"
                )));
            }
        };

        let descriptor_pool = match create_descriptor_pool(&raw) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe {
                    raw.destroy_command_pool(command_pool, None);
                    raw.destroy_device(None);
                }
                return Err(e);
            }
        };

        let memory_props = unsafe {
            self.instance
                .raw
                .get_physical_device_memory_properties(self.physical)
        };

        let shared = Arc::new(DeviceShared::new(
            raw,
            self.physical,
            queue,
            self.queue_family,
            command_pool,
            descriptor_pool,
            memory_props,
        ));
        log::info!("created device on '{}'", self.name);
        Ok((Device::new(Arc::clone(&shared)), Queue::new(shared)))
    }
}

fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: POOL_UNIFORM_BUFFERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: POOL_COMBINED_IMAGE_SAMPLERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: POOL_SAMPLERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: POOL_SAMPLED_IMAGES,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: POOL_STORAGE_BUFFERS,
        },
    ];
    let info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .pool_sizes(&sizes)
        .max_sets(MAX_DESCRIPTOR_SETS);
    unsafe { device.create_descriptor_pool(&info, None) }
        .map_err(|e| GpuError::DeviceCreateFailed(format!("create_descriptor_pool: {e}")))
}

fn validation_layer_available(entry: &ash::Entry) -> bool {
    let Ok(layers) = entry.enumerate_instance_layer_properties() else {
        return false;
    };
    layers.iter().any(|layer| {
        (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
    })
}
