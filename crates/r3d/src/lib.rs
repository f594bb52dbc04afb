//! # r3d
//!
//! A deferred/forward hybrid 3D renderer over OpenGL 3.3.
//!
//! ## Features
//!
//! - **Hybrid Pipeline**: G-buffer for opaque geometry, forward pass for transparency
//! - **Screen-Space Effects**: SSAO, SSIL and SSR feeding the lighting composition
//! - **Shadows**: directional, spot and omni shadow maps with per-light update policies
//! - **Post Chain**: fog, depth of field, bloom, tonemapping and FXAA
//! - **Custom Shaders**: user fragment logic injected into the geometry pass
//! - **Headless Testing**: a recording device runs whole frames without a GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use r3d::prelude::*;
//!
//! fn frame(renderer: &mut Renderer, camera: &Camera, sphere: &Mesh) -> RenderResult<()> {
//!     renderer.begin(camera);
//!     renderer.draw_mesh(sphere, None, &Mat4::identity());
//!     renderer.end()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RendererConfig},
        foundation::{
            bounds::{BoundingBox, Frustum},
            math::{Color, Mat4, Quat, Vec2, Vec3, Vec4},
            time::Timer,
        },
        render::{
            api::{RenderDevice, TextureId},
            backends::{GlowDevice, RecordingDevice},
            camera::{Camera, Projection},
            environment::Environment,
            frame::{Layers, RenderFlags},
            lights::{LightId, LightKind, ShadowUpdateMode},
            material::{BillboardMode, BlendMode, CullMode, Material, TransparencyMode},
            mesh::{Decal, Mesh, MeshData, Model, ParticleSystem, ShadowCastMode},
            renderer::{RenderTexture, Renderer},
            shader::ShaderId,
            RenderError, RenderResult,
        },
    };
}
