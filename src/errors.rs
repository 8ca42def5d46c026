//! Error Types
//!
//! This module defines the error types used throughout the GPU layer.
//!
//! # Overview
//!
//! The main error type [`GpuError`] covers all failure modes including:
//! - Instance/adapter/device bring-up failures
//! - Resource creation and descriptor-pool exhaustion
//! - Command-encoder and render-pass state-machine violations
//! - Queue submission and swapchain presentation failures
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, GpuError>`.

use thiserror::Error;

/// The main error type for the GPU abstraction layer.
#[derive(Error, Debug)]
pub enum GpuError {
    // ========================================================================
    // Instance / Adapter / Device
    // ========================================================================
    /// No compatible physical device or queue family was found.
    #[error("Failed to request adapter: {0}")]
    AdapterRequestFailed(String),

    /// Logical device creation failed.
    #[error("Failed to create device: {0}")]
    DeviceCreateFailed(String),

    // ========================================================================
    // Resource Creation
    // ========================================================================
    /// The backend reported an allocation or object-creation failure.
    #[error("Failed to create {kind}: {reason}")]
    ResourceCreation {
        /// What was being created (buffer, texture, ...)
        kind: &'static str,
        /// Backend-reported cause
        reason: String,
    },

    /// No compiled shader binary exists for the requested label.
    #[error("No compiled shader resource found for label '{0}'")]
    ShaderResourceNotFound(String),

    /// The descriptor pool has no free sets left.
    #[error("Descriptor pool exhausted while allocating bind group '{0}'")]
    DescriptorPoolExhausted(String),

    /// A bind-group entry's resource does not match its layout entry.
    #[error("Binding {binding} mismatch: layout expects {expected}, got {actual}")]
    BindingMismatch {
        /// Binding index within the group
        binding: u32,
        /// Resource type declared by the layout
        expected: &'static str,
        /// Resource type supplied by the entry
        actual: &'static str,
    },

    /// A descriptor failed validation before any native call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // Command Encoding State Machine
    // ========================================================================
    /// `finish()` was already called on this command encoder.
    #[error("Command encoder already finished")]
    EncoderAlreadyFinished,

    /// The render pass was already ended.
    #[error("Render pass already ended")]
    RenderPassAlreadyEnded,

    /// The pipeline was created against a different render-pass key.
    #[error("Pipeline is incompatible with the active render pass")]
    IncompatibleRenderPass,

    /// A draw or bind-group call requires a bound pipeline.
    #[error("No pipeline bound on the render pass encoder")]
    NoPipelineBound,

    // ========================================================================
    // Queue / Presentation
    // ========================================================================
    /// Fence creation, queue submission, or the fence wait failed.
    #[error("Queue submission failed: {0}")]
    SubmissionFailed(String),

    /// The platform reported an unrecoverable acquire error.
    #[error("Failed to acquire swapchain frame: {0}")]
    FrameAcquisitionFailed(String),

    /// Presentation failed for a reason other than a stale chain.
    #[error("Failed to present swapchain frame: {0}")]
    PresentFailed(String),

    /// The surface has not been configured with a device yet.
    #[error("Surface is not configured")]
    SurfaceNotConfigured,

    // ========================================================================
    // Backend
    // ========================================================================
    /// An unexpected native-call failure code.
    #[error("Vulkan call failed: {0}")]
    Backend(#[from] ash::vk::Result),
}

/// Alias for `Result<T, GpuError>`.
pub type Result<T> = std::result::Result<T, GpuError>;
