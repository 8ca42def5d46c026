//! Device-Dependent Tests
//!
//! Exercises the explicit backend against a live Vulkan implementation:
//! - Buffer byte and float round trips through the map/unmap path
//! - Render-pass cache identity across encoders
//! - One-shot command encoder and render-pass state machine
//! - Idempotent disposal of buffers, bind groups, and the device
//! - Bind-group validation against a real descriptor pool
//! - Clear-pass end-to-end: encode → finish → submit → fence wait
//!
//! Every test skips itself when no Vulkan driver is installed.

use prism::{
    BindGroupLayoutEntry, BindingType, BufferDescriptor, BufferUsages, Color, Extent3d, GpuError,
    InstanceDescriptor, LoadOp, PowerPreference, ShaderModuleDescriptor, ShaderStages, StoreOp,
    TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureViewDescriptor,
};

fn test_context() -> Option<(prism::Instance, prism::Device, prism::Queue)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let instance = prism::Instance::new(&InstanceDescriptor {
        app_name: "prism-tests",
        enable_validation: false,
    })
    .ok()?;
    let adapter = instance
        .request_adapter(PowerPreference::HighPerformance, None)
        .ok()?;
    let (device, queue) = adapter.request_device().ok()?;
    Some((instance, device, queue))
}

macro_rules! require_device {
    () => {
        match test_context() {
            Some(ctx) => ctx,
            None => {
                eprintln!("skipping: no Vulkan driver available");
                return;
            }
        }
    };
}

fn vertex_buffer(device: &prism::Device, size: u64) -> prism::Buffer {
    device
        .create_buffer(&BufferDescriptor {
            label: Some("test vertices"),
            size,
            usage: BufferUsages::VERTEX | BufferUsages::MAP_WRITE | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        })
        .expect("buffer creation")
}

fn render_target(device: &prism::Device) -> prism::Texture {
    device
        .create_texture(&TextureDescriptor {
            label: Some("test target"),
            size: Extent3d {
                width: 64,
                height: 64,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8Unorm,
            usage: TextureUsages::RENDER_ATTACHMENT,
        })
        .expect("texture creation")
}

fn clear_attachment<'a>(
    view: &'a prism::TextureView,
) -> [prism::RenderPassColorAttachment<'a>; 1] {
    [prism::RenderPassColorAttachment {
        view,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
        clear_color: Color::BLACK,
    }]
}

// ============================================================================
// Buffer round trips
// ============================================================================

#[test]
fn buffer_byte_round_trip() {
    let (instance, device, _queue) = require_device!();
    {
        let buffer = vertex_buffer(&device, 256);
        let bytes: Vec<u8> = (0..=255).collect();
        buffer.write(0, &bytes).unwrap();
        assert_eq!(buffer.read(0, 256).unwrap(), bytes);

        buffer.write(16, &[0xAA; 8]).unwrap();
        assert_eq!(buffer.read(16, 8).unwrap(), vec![0xAA; 8]);
        buffer.destroy();
    }
    device.destroy().unwrap();
    instance.destroy();
}

#[test]
fn buffer_float_round_trip_is_bit_exact() {
    let (instance, device, _queue) = require_device!();
    {
        let buffer = vertex_buffer(&device, 36 * 3 * 4);
        let floats: Vec<f32> = (0..36 * 3).map(|i| i as f32 * 0.25 - 7.5).collect();
        buffer.write_floats(0, &floats).unwrap();
        let back = buffer.read_floats(0, floats.len()).unwrap();
        assert_eq!(floats.len(), back.len());
        for (a, b) in floats.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
    device.destroy().unwrap();
    instance.destroy();
}

#[test]
fn out_of_range_buffer_access_is_rejected() {
    let (instance, device, _queue) = require_device!();
    {
        let buffer = vertex_buffer(&device, 64);
        assert!(matches!(
            buffer.write(60, &[0u8; 8]),
            Err(GpuError::Validation(_))
        ));
        assert!(buffer.read(0, 65).is_err());
    }
    device.destroy().unwrap();
    instance.destroy();
}

// ============================================================================
// Render-pass cache identity
// ============================================================================

#[test]
fn equal_attachment_keys_share_one_cached_pass() {
    let (instance, device, _queue) = require_device!();
    {
        let target = render_target(&device);
        let view = target.create_view(&TextureViewDescriptor::default()).unwrap();

        assert_eq!(device.cached_render_pass_count(), 0);
        for _ in 0..3 {
            let mut encoder = device.create_command_encoder(None).unwrap();
            let mut pass = encoder.begin_render_pass(&prism::RenderPassDescriptor {
                label: None,
                color_attachments: &clear_attachment(&view),
                depth_stencil_attachment: None,
            })
            .unwrap();
            pass.end().unwrap();
        }
        assert_eq!(device.cached_render_pass_count(), 1);

        // A different load op is a different structural key.
        let mut encoder = device.create_command_encoder(None).unwrap();
        let mut pass = encoder
            .begin_render_pass(&prism::RenderPassDescriptor {
                label: None,
                color_attachments: &[prism::RenderPassColorAttachment {
                    view: &view,
                    load_op: LoadOp::Load,
                    store_op: StoreOp::Store,
                    clear_color: Color::BLACK,
                }],
                depth_stencil_attachment: None,
            })
            .unwrap();
        pass.end().unwrap();
        assert_eq!(device.cached_render_pass_count(), 2);
    }
    device.destroy().unwrap();
    instance.destroy();
}

// ============================================================================
// Encoder state machine
// ============================================================================

#[test]
fn finish_is_one_shot() {
    let (instance, device, _queue) = require_device!();
    {
        let mut encoder = device.create_command_encoder(Some("one-shot")).unwrap();
        let _buffer = encoder.finish(Some("first")).unwrap();
        assert!(matches!(
            encoder.finish(Some("second")),
            Err(GpuError::EncoderAlreadyFinished)
        ));

        let target = render_target(&device);
        let view = target.create_view(&TextureViewDescriptor::default()).unwrap();
        assert!(matches!(
            encoder.begin_render_pass(&prism::RenderPassDescriptor {
                label: None,
                color_attachments: &clear_attachment(&view),
                depth_stencil_attachment: None,
            }),
            Err(GpuError::EncoderAlreadyFinished)
        ));
    }
    device.destroy().unwrap();
    instance.destroy();
}

#[test]
fn render_pass_operations_fail_after_end() {
    let (instance, device, _queue) = require_device!();
    {
        let target = render_target(&device);
        let view = target.create_view(&TextureViewDescriptor::default()).unwrap();
        let buffer = vertex_buffer(&device, 64);

        let mut encoder = device.create_command_encoder(None).unwrap();
        let mut pass = encoder
            .begin_render_pass(&prism::RenderPassDescriptor {
                label: None,
                color_attachments: &clear_attachment(&view),
                depth_stencil_attachment: None,
            })
            .unwrap();

        pass.end().unwrap();
        assert!(matches!(pass.end(), Err(GpuError::RenderPassAlreadyEnded)));
        assert!(matches!(
            pass.set_vertex_buffer(0, &buffer, 0),
            Err(GpuError::RenderPassAlreadyEnded)
        ));
        assert!(matches!(
            pass.draw(3, 1, 0, 0),
            Err(GpuError::RenderPassAlreadyEnded)
        ));
    }
    device.destroy().unwrap();
    instance.destroy();
}

#[test]
fn draw_requires_a_bound_pipeline() {
    let (instance, device, _queue) = require_device!();
    {
        let target = render_target(&device);
        let view = target.create_view(&TextureViewDescriptor::default()).unwrap();

        let mut encoder = device.create_command_encoder(None).unwrap();
        let mut pass = encoder
            .begin_render_pass(&prism::RenderPassDescriptor {
                label: None,
                color_attachments: &clear_attachment(&view),
                depth_stencil_attachment: None,
            })
            .unwrap();
        assert!(matches!(
            pass.draw(36, 1, 0, 0),
            Err(GpuError::NoPipelineBound)
        ));
        pass.end().unwrap();
    }
    device.destroy().unwrap();
    instance.destroy();
}

// ============================================================================
// Bind groups
// ============================================================================

#[test]
fn bind_group_lifecycle_and_mismatch() {
    let (instance, device, _queue) = require_device!();
    {
        let layout = device
            .create_bind_group_layout(
                Some("globals"),
                &[BindGroupLayoutEntry {
                    binding: 0,
                    ty: BindingType::UniformBuffer,
                    visibility: ShaderStages::VERTEX,
                }],
            )
            .unwrap();
        let uniforms = device
            .create_buffer(&BufferDescriptor {
                label: Some("uniforms"),
                size: 64,
                usage: BufferUsages::UNIFORM | BufferUsages::MAP_WRITE,
                mapped_at_creation: false,
            })
            .unwrap();
        let sampler = device
            .create_sampler(&prism::SamplerDescriptor::default())
            .unwrap();

        // Sampler into a uniform-buffer slot must be rejected up front.
        let mismatch = device.create_bind_group(&prism::BindGroupDescriptor {
            label: Some("bad"),
            layout: &layout,
            entries: &[prism::BindGroupEntry {
                binding: 0,
                resource: prism::BindingResource::Sampler(&sampler),
            }],
        });
        assert!(matches!(mismatch, Err(GpuError::BindingMismatch { binding: 0, .. })));

        let group = device
            .create_bind_group(&prism::BindGroupDescriptor {
                label: Some("globals"),
                layout: &layout,
                entries: &[prism::BindGroupEntry {
                    binding: 0,
                    resource: prism::BindingResource::Buffer {
                        buffer: &uniforms,
                        offset: 0,
                        size: None,
                    },
                }],
            })
            .unwrap();

        assert_eq!(device.tracked_object_count(), 2);
        group.destroy();
        group.destroy();
        layout.destroy();
        assert_eq!(device.tracked_object_count(), 0);
    }
    device.destroy().unwrap();
    instance.destroy();
}

// ============================================================================
// Disposal
// ============================================================================

#[test]
fn disposal_is_idempotent() {
    let (instance, device, _queue) = require_device!();
    let buffer = vertex_buffer(&device, 128);
    buffer.destroy();
    buffer.destroy();

    let target = render_target(&device);
    target.destroy();
    target.destroy();

    assert_eq!(device.tracked_object_count(), 0);
    device.destroy().unwrap();
    // Second teardown of a device with zero tracked objects is a no-op.
    device.destroy().unwrap();
    instance.destroy();
    instance.destroy();
}

#[test]
fn missing_shader_is_a_configuration_error() {
    let (instance, device, _queue) = require_device!();
    {
        let result = device.create_shader_module(&ShaderModuleDescriptor {
            label: "does-not-exist",
        });
        assert!(matches!(
            result,
            Err(GpuError::ShaderResourceNotFound(label)) if label == "does-not-exist"
        ));
    }
    device.destroy().unwrap();
    instance.destroy();
}

// ============================================================================
// End-to-end clear pass
// ============================================================================

#[test]
fn clear_pass_submits_and_completes() {
    let (instance, device, queue) = require_device!();
    {
        let buffer = vertex_buffer(&device, 36 * 3 * 4);
        let vertices: Vec<f32> = (0..36 * 3).map(|i| (i % 3) as f32).collect();
        buffer.write_floats(0, &vertices).unwrap();

        let target = render_target(&device);
        let view = target.create_view(&TextureViewDescriptor::default()).unwrap();

        let mut encoder = device.create_command_encoder(Some("frame")).unwrap();
        {
            let mut pass = encoder
                .begin_render_pass(&prism::RenderPassDescriptor {
                    label: Some("clear"),
                    color_attachments: &clear_attachment(&view),
                    depth_stencil_attachment: None,
                })
                .unwrap();
            pass.set_vertex_buffer(0, &buffer, 0).unwrap();
            pass.end().unwrap();
        }
        let commands = encoder.finish(Some("frame")).unwrap();

        // Blocks until the GPU-side fence signals.
        queue.submit(vec![commands]).unwrap();

        // An empty submission is a no-op.
        queue.submit(Vec::new()).unwrap();
    }
    device.destroy().unwrap();
    instance.destroy();
}
