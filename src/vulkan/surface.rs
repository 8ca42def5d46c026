//! Surface and swapchain.
//!
//! A [`Surface`] owns the presentation chain bound to one platform window.
//! `configure` (re)builds the chain, `acquire_frame` hands out the next image
//! as a borrowed texture + view, `present` queues it for display. Stale or
//! suboptimal chains are the one auto-recovered condition: the chain is
//! recreated in place and the frame cycle continues without caller
//! intervention.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::extensions::khr;
use ash::vk;

use crate::api::SurfaceConfiguration;
use crate::errors::{GpuError, Result};
use crate::vulkan::conv;
use crate::vulkan::device::{Device, DeviceShared};
use crate::vulkan::instance::InstanceShared;
use crate::vulkan::texture::{Texture, TextureView};

/// Per-chain semaphore pair carried by swapchain-borrowed views so queue
/// submission can order itself against acquire and present.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SwapchainSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

struct SwapchainState {
    loader: khr::Swapchain,
    raw: vk::SwapchainKHR,
    format: crate::api::TextureFormat,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    /// One cached view per chain image; recreated with the chain.
    views: Vec<vk::ImageView>,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
}

/// An acquired, not-yet-presented swapchain image.
///
/// The texture and view are borrowed: releasing the frame (or presenting it)
/// never destroys the underlying image.
pub struct SurfaceFrame {
    texture: Texture,
    view: TextureView,
    image_index: u32,
}

impl SurfaceFrame {
    #[must_use]
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    #[must_use]
    pub fn view(&self) -> &TextureView {
        &self.view
    }

    #[must_use]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }
}

/// Presentation chain bound to a platform window.
pub struct Surface {
    instance: Arc<InstanceShared>,
    pub(crate) raw: vk::SurfaceKHR,
    device: Option<Arc<DeviceShared>>,
    chain: Option<SwapchainState>,
    config: Option<SurfaceConfiguration>,
    frame_count: u64,
    destroyed: AtomicBool,
}

impl Surface {
    pub(crate) fn new(instance: Arc<InstanceShared>, raw: vk::SurfaceKHR) -> Self {
        Self {
            instance,
            raw,
            device: None,
            chain: None,
            config: None,
            frame_count: 0,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Binds (or rebinds) the presentation chain to the window.
    ///
    /// Any existing chain is destroyed first. The format and extent actually
    /// granted by the platform become the configuration of record.
    pub fn configure(&mut self, device: &Device, configuration: &SurfaceConfiguration) -> Result<()> {
        self.device = Some(Arc::clone(&device.shared));
        self.config = Some(configuration.clone());
        self.rebuild_chain()?;
        log::info!(
            "configured surface ({}x{}, {:?})",
            self.config.as_ref().map_or(0, |c| c.width),
            self.config.as_ref().map_or(0, |c| c.height),
            self.config.as_ref().map(|c| c.format)
        );
        Ok(())
    }

    /// The configuration of record, as granted by the platform.
    #[must_use]
    pub fn configuration(&self) -> Option<&SurfaceConfiguration> {
        self.config.as_ref()
    }

    /// Frames acquired since the surface was created.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Acquires the next presentable image as a borrowed texture + view.
    ///
    /// An out-of-date chain is recreated once and the acquire retried; a
    /// second failure surfaces as [`GpuError::FrameAcquisitionFailed`].
    pub fn acquire_frame(&mut self) -> Result<SurfaceFrame> {
        self.ensure_configured()?;

        let mut index = match self.try_acquire() {
            Ok(index) => Some(index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => None,
            Err(e) => return Err(GpuError::FrameAcquisitionFailed(e.to_string())),
        };
        if index.is_none() {
            log::warn!("swapchain out of date on acquire; recreating");
            self.rebuild_chain()?;
            index = Some(
                self.try_acquire()
                    .map_err(|e| GpuError::FrameAcquisitionFailed(e.to_string()))?,
            );
        }
        let image_index = index.expect("acquired above");

        let device = Arc::clone(self.device.as_ref().expect("configured"));
        let chain = self.chain.as_ref().expect("configured");
        let (image, view, format, extent) = (
            chain.images[image_index as usize],
            chain.views[image_index as usize],
            chain.format,
            chain.extent,
        );
        let sync = SwapchainSync {
            image_available: chain.image_available,
            render_finished: chain.render_finished,
        };

        self.frame_count += 1;
        Ok(SurfaceFrame {
            texture: Texture::borrowed(
                Arc::clone(&device),
                image,
                format,
                extent.width,
                extent.height,
            ),
            view: TextureView::borrowed(device, view, format, extent.width, extent.height, sync),
            image_index,
        })
    }

    /// Presents an acquired frame.
    ///
    /// A stale or suboptimal result recreates the chain at the recorded
    /// configuration and still succeeds; the next acquire is sized against
    /// the new chain. Any other error is [`GpuError::PresentFailed`].
    pub fn present(&mut self, frame: SurfaceFrame) -> Result<()> {
        self.ensure_configured()?;
        let device = self.device.as_ref().expect("configured");
        let chain = self.chain.as_ref().expect("configured");

        let wait_semaphores = [chain.render_finished];
        let swapchains = [chain.raw];
        let indices = [frame.image_index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { chain.loader.queue_present(device.queue, &info) };
        drop(frame);

        match result {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain stale on present; recreating");
                self.rebuild_chain()
            }
            Err(e) => Err(GpuError::PresentFailed(e.to_string())),
        }
    }

    /// Recreates the chain at the new extent. The platform-granted extent
    /// and format replace the configuration of record.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_configured()?;
        if let Some(config) = self.config.as_mut() {
            config.width = width;
            config.height = height;
        }
        self.rebuild_chain()
    }

    /// Destroys the chain and the surface. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.destroy_chain();
        if self.instance.alive() {
            unsafe { self.instance.surface_loader.destroy_surface(self.raw, None) };
        }
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.chain.is_some() && self.device.is_some() {
            Ok(())
        } else {
            Err(GpuError::SurfaceNotConfigured)
        }
    }

    fn try_acquire(&self) -> std::result::Result<u32, vk::Result> {
        let chain = self.chain.as_ref().expect("configured");
        // Suboptimal-but-acquired frames are presented as-is; present
        // handles the recreation.
        unsafe {
            chain
                .loader
                .acquire_next_image(chain.raw, u64::MAX, chain.image_available, vk::Fence::null())
        }
        .map(|(index, _suboptimal)| index)
    }

    fn rebuild_chain(&mut self) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or(GpuError::SurfaceNotConfigured)?;
        let config = self.config.clone().ok_or(GpuError::SurfaceNotConfigured)?;

        self.destroy_chain();

        let surface_loader = &self.instance.surface_loader;
        let (capabilities, formats) = unsafe {
            let caps = surface_loader
                .get_physical_device_surface_capabilities(device.physical, self.raw)?;
            let formats =
                surface_loader.get_physical_device_surface_formats(device.physical, self.raw)?;
            (caps, formats)
        };

        let surface_format = choose_surface_format(&formats, &config)?;
        let extent = choose_extent(&capabilities, config.width, config.height);
        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.raw)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let loader = khr::Swapchain::new(&self.instance.raw, &device.raw);
        let raw = unsafe { loader.create_swapchain(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "swapchain",
                reason: e.to_string(),
            }
        })?;

        let images = unsafe { loader.get_swapchain_images(raw) }?;
        let format = conv::texture_format_from_vk(surface_format.format)
            .expect("chosen from the supported set");

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            views.push(unsafe { device.raw.create_image_view(&view_info, None) }?);
        }

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let image_available = unsafe { device.raw.create_semaphore(&semaphore_info, None) }?;
        let render_finished = unsafe { device.raw.create_semaphore(&semaphore_info, None) }?;

        log::info!(
            "created swapchain ({}x{}, {:?}, {} images)",
            extent.width,
            extent.height,
            format,
            images.len()
        );

        self.chain = Some(SwapchainState {
            loader,
            raw,
            format,
            extent,
            images,
            views,
            image_available,
            render_finished,
        });

        // Record what the platform actually granted.
        if let Some(config) = self.config.as_mut() {
            config.format = format;
            config.width = extent.width;
            config.height = extent.height;
        }
        Ok(())
    }

    fn destroy_chain(&mut self) {
        let Some(chain) = self.chain.take() else {
            return;
        };
        let Some(device) = self.device.as_ref() else {
            return;
        };
        if !device.alive() {
            return;
        }
        unsafe {
            let _ = device.raw.device_wait_idle();
            device.raw.destroy_semaphore(chain.image_available, None);
            device.raw.destroy_semaphore(chain.render_finished, None);
            for view in chain.views {
                device.raw.destroy_image_view(view, None);
            }
            // Chain images are owned by the swapchain itself.
            chain.loader.destroy_swapchain(chain.raw, None);
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    config: &SurfaceConfiguration,
) -> Result<vk::SurfaceFormatKHR> {
    let requested = conv::texture_format(config.format);
    let pick = |wanted: vk::Format| {
        formats
            .iter()
            .copied()
            .find(|f| f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
    };
    pick(requested)
        .or_else(|| pick(vk::Format::B8G8R8A8_UNORM))
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|f| conv::texture_format_from_vk(f.format).is_some())
        })
        .ok_or_else(|| GpuError::ResourceCreation {
            kind: "swapchain",
            reason: "no supported surface format".into(),
        })
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: u32, min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current,
                height: current,
            },
            min_image_extent: vk::Extent2D {
                width: min,
                height: min,
            },
            max_image_extent: vk::Extent2D {
                width: max,
                height: max,
            },
            ..Default::default()
        }
    }

    #[test]
    fn platform_dictated_extent_wins() {
        let caps = capabilities(800, 1, 4096);
        let extent = choose_extent(&caps, 100, 100);
        assert_eq!(extent.width, 800);
    }

    #[test]
    fn requested_extent_clamps_to_capabilities() {
        let caps = capabilities(u32::MAX, 64, 1024);
        assert_eq!(choose_extent(&caps, 8, 8).width, 64);
        assert_eq!(choose_extent(&caps, 4096, 4096).height, 1024);
    }

    #[test]
    fn surface_format_prefers_the_request() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let config = SurfaceConfiguration {
            format: crate::api::TextureFormat::Rgba8Unorm,
            ..Default::default()
        };
        let chosen = choose_surface_format(&formats, &config).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn surface_format_falls_back_to_bgra() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let config = SurfaceConfiguration {
            format: crate::api::TextureFormat::Rgba16Float,
            ..Default::default()
        };
        let chosen = choose_surface_format(&formats, &config).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }
}
