//! Shader programs
//!
//! Built-in programs live in a [`ShaderLibrary`] created with the renderer.
//! Custom shaders merge user fragment logic into the geometry template and
//! are owned by a [`ShaderRegistry`] keyed by [`ShaderId`].

pub mod custom;
pub mod library;
pub(crate) mod sources;

use slotmap::{new_key_type, SlotMap};

use crate::render::api::{ProgramId, RenderDevice};
use crate::render::RenderResult;

pub use custom::{CustomShader, CustomUniform, CustomUniformKind};
pub use library::{Program, ShaderLibrary};

new_key_type! {
    /// Handle to a custom shader
    pub struct ShaderId;
}

/// Uniform buffer binding point of the `ViewBlock` block
pub const VIEW_BLOCK_BINDING: u32 = 0;

/// First texture unit handed to custom sampler uniforms
pub const FIRST_CUSTOM_SLOT: u32 = 5;

/// Custom uniforms registered per shader
pub const MAX_CUSTOM_UNIFORMS: usize = 16;

/// Longest custom uniform name kept at registration
pub const MAX_UNIFORM_NAME_LENGTH: usize = 64;

/// Texture units of the geometry template samplers
pub mod slot {
    /// `uTexBoneMatrices`
    pub const BONES: u32 = 0;
    /// `uTexAlbedo`
    pub const ALBEDO: u32 = 1;
    /// `uTexNormal`
    pub const NORMAL: u32 = 2;
    /// `uTexEmission`
    pub const EMISSION: u32 = 3;
    /// `uTexORM`
    pub const ORM: u32 = 4;
}

/// Compile both stages and link them; stage objects never outlive the call
pub(crate) fn compile_program(device: &mut dyn RenderDevice, vertex: &str, fragment: &str) -> RenderResult<ProgramId> {
    use crate::render::api::ShaderStage;

    let vs = device.create_shader(ShaderStage::Vertex, vertex)?;
    let fs = match device.create_shader(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            device.delete_shader(vs);
            return Err(e);
        }
    };

    let program = device.link_program(vs, fs);
    device.delete_shader(vs);
    device.delete_shader(fs);
    program
}

/// Owner of every live custom shader
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    shaders: SlotMap<ShaderId, CustomShader>,
}

impl ShaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a custom shader from user fragment code and register it
    pub fn create(&mut self, device: &mut dyn RenderDevice, code: &str) -> RenderResult<ShaderId> {
        let shader = CustomShader::create(device, code)?;
        let program = shader.program();
        let id = self.shaders.insert(shader);
        log::info!("Custom shader {id:?} created with program {}", program.0);
        Ok(id)
    }

    /// Release a custom shader; returns false when the handle was already dead
    pub fn destroy(&mut self, device: &mut dyn RenderDevice, id: ShaderId) -> bool {
        match self.shaders.remove(id) {
            Some(shader) => {
                shader.destroy(device);
                log::debug!("Custom shader {id:?} destroyed");
                true
            }
            None => {
                log::warn!("Custom shader {id:?} destroyed twice");
                false
            }
        }
    }

    /// Live shader by handle
    pub fn get(&self, id: ShaderId) -> Option<&CustomShader> {
        self.shaders.get(id)
    }

    /// Number of live shaders
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// True when no shader is alive
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    /// Release everything
    pub fn destroy_all(&mut self, device: &mut dyn RenderDevice) {
        for (_, shader) in self.shaders.drain() {
            shader.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::recording::{DeviceCommand, RecordingDevice};

    #[test]
    fn test_compile_failure_releases_the_vertex_stage() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let result = compile_program(&mut device, "void main() {}", "#error broken\nvoid main() {}");
        assert!(result.is_err());

        let created = log.commands().iter().filter(|c| matches!(c, DeviceCommand::CreateShader { .. })).count();
        let deleted = log.commands().iter().filter(|c| matches!(c, DeviceCommand::DeleteShader(_))).count();
        assert_eq!(created, 1);
        assert_eq!(deleted, 1);
    }

    #[test]
    fn test_registry_destroy_is_checked() {
        let mut device = RecordingDevice::new();
        let mut registry = ShaderRegistry::new();
        let id = registry.create(&mut device, "ALBEDO.rgb = vec3(1.0);").unwrap();
        assert_eq!(registry.len(), 1);

        assert!(registry.destroy(&mut device, id));
        assert!(registry.get(id).is_none());
        assert!(!registry.destroy(&mut device, id));
        assert!(registry.is_empty());
    }
}
