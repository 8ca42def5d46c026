//! Logical API Tests
//!
//! Tests for:
//! - TextureFormat: depth classification, texel sizes
//! - VertexFormat sizes and IndexFormat variants
//! - BufferUsages / TextureUsages / ShaderStages flag algebra
//! - Descriptor defaults (SurfaceConfiguration, SamplerDescriptor, Color)
//! - RenderPassKey construction from pipeline-style format lists

use prism::vulkan::RenderPassKey;
use prism::{
    BufferUsages, Color, Extent3d, FilterMode, LoadOp, SamplerDescriptor, ShaderStages, StoreOp,
    SurfaceConfiguration, TextureFormat, TextureUsages, VertexFormat,
};

// ============================================================================
// Formats
// ============================================================================

#[test]
fn depth_stencil_is_the_only_depth_format() {
    assert!(TextureFormat::Depth24PlusStencil8.is_depth());
    assert!(!TextureFormat::Rgba8Unorm.is_depth());
    assert!(!TextureFormat::Bgra8Unorm.is_depth());
    assert!(!TextureFormat::Rgba16Float.is_depth());
}

#[test]
fn color_format_texel_sizes() {
    assert_eq!(TextureFormat::Rgba8Unorm.bytes_per_texel(), 4);
    assert_eq!(TextureFormat::Bgra8Unorm.bytes_per_texel(), 4);
    assert_eq!(TextureFormat::Rgba16Float.bytes_per_texel(), 8);
}

#[test]
fn vertex_format_sizes_match_component_counts() {
    assert_eq!(VertexFormat::Float32.size(), 4);
    assert_eq!(VertexFormat::Float32x2.size(), 8);
    assert_eq!(VertexFormat::Float32x3.size(), 12);
    assert_eq!(VertexFormat::Float32x4.size(), 16);
}

// ============================================================================
// Usage flags
// ============================================================================

#[test]
fn mappable_usage_detection() {
    assert!(BufferUsages::MAP_READ.is_mappable());
    assert!((BufferUsages::MAP_WRITE | BufferUsages::VERTEX).is_mappable());
    assert!(!(BufferUsages::VERTEX | BufferUsages::COPY_DST).is_mappable());
}

#[test]
fn usage_flags_are_disjoint_bits() {
    let all = BufferUsages::all();
    assert!(all.contains(BufferUsages::INDIRECT));
    assert_eq!(
        TextureUsages::RENDER_ATTACHMENT & TextureUsages::TEXTURE_BINDING,
        TextureUsages::empty()
    );
    assert!(ShaderStages::all().contains(ShaderStages::COMPUTE));
}

// ============================================================================
// Descriptor defaults
// ============================================================================

#[test]
fn surface_configuration_defaults_to_fifo_bgra() {
    let config = SurfaceConfiguration::default();
    assert_eq!(config.format, TextureFormat::Bgra8Unorm);
    assert_eq!(config.present_mode, "fifo");
    assert!(config.usage.contains(TextureUsages::RENDER_ATTACHMENT));
}

#[test]
fn sampler_descriptor_defaults_to_nearest_clamp() {
    let desc = SamplerDescriptor::default();
    assert_eq!(desc.min_filter, FilterMode::Nearest);
    assert_eq!(desc.address_mode_u, prism::api::AddressMode::ClampToEdge);
}

#[test]
fn color_constants() {
    assert_eq!(Color::BLACK.a, 1.0);
    assert_eq!(Color::TRANSPARENT.a, 0.0);
    assert_eq!(Color::default(), Color::BLACK);
}

#[test]
fn extent_defaults_to_one_by_one() {
    let extent = Extent3d::default();
    assert_eq!((extent.width, extent.height, extent.depth_or_array_layers), (1, 1, 1));
}

// ============================================================================
// Render pass keys
// ============================================================================

#[test]
fn pipeline_key_matches_equivalent_pass_key() {
    let from_pipeline = RenderPassKey::from_formats(
        &[TextureFormat::Bgra8Unorm],
        LoadOp::Clear,
        StoreOp::Store,
        None,
    );
    let from_pass = RenderPassKey::from_formats(
        &[TextureFormat::Bgra8Unorm],
        LoadOp::Clear,
        StoreOp::Store,
        None,
    );
    assert_eq!(from_pipeline, from_pass);
}

#[test]
fn store_policy_differences_split_keys() {
    let store = RenderPassKey::from_formats(
        &[TextureFormat::Rgba16Float],
        LoadOp::Clear,
        StoreOp::Store,
        None,
    );
    let discard = RenderPassKey::from_formats(
        &[TextureFormat::Rgba16Float],
        LoadOp::Clear,
        StoreOp::Discard,
        None,
    );
    assert_ne!(store, discard);
}
