//! # Rendering System
//!
//! The frame pipeline and everything it owns.
//!
//! ## Architecture
//!
//! - **Renderer**: the `begin`/`end` state machine and the draw submission API
//! - **Frame Context**: per-frame view state, flags, layers and environment
//! - **Targets / Lights / Draw Lists**: the resources the passes read and write
//! - **Shaders**: built-in programs and user custom shaders
//! - **Passes**: one function per GPU pass, sequenced by the renderer
//! - **Devices**: `glow` for real GPUs, a recorder for headless runs
//!
//! Every GPU call goes through [`api::RenderDevice`].

pub mod api;
pub mod backends;
pub mod camera;
pub mod draw;
pub mod environment;
pub mod frame;
pub mod lights;
pub mod material;
pub mod mesh;
pub mod passes;
pub mod primitives;
pub mod renderer;
pub mod shader;
pub mod state;
pub mod targets;
pub mod textures;

#[cfg(test)]
mod renderer_tests;

use thiserror::Error;

pub use api::ShaderStage;
pub use renderer::Renderer;

/// Errors returned by rendering operations
///
/// Degraded-functionality paths (unsupported uniform types, saturated uniform
/// tables, parameters without a matching uniform) never produce an error.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Built-in programs that fail to compile or targets that cannot be
    /// allocated end up here.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A shader stage failed to compile
    #[error("{stage} shader compilation failed: {log}")]
    ShaderCompilation {
        /// Failing stage
        stage: ShaderStage,
        /// Compiler info log
        log: String,
    },

    /// Program linking failed
    #[error("Program link failed: {0}")]
    ProgramLink(String),

    /// User source could not be merged into the geometry template
    #[error("Shader composition failed: {0}")]
    ShaderComposition(String),

    /// Operation not allowed in the current renderer state
    #[error("Invalid renderer state: {0}")]
    InvalidState(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
