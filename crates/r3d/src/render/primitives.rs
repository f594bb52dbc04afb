//! Internal geometry used by screen-space passes, the skybox and decals

use crate::render::api::{
    AttribKind, BufferId, BufferTarget, BufferUsage, PrimitiveMode, RenderDevice, VertexArrayId,
    VertexAttrib,
};
use crate::render::frame::Layers;
use crate::render::mesh::{attrib, Mesh, MeshData, ShadowCastMode};
use crate::render::RenderResult;

/// Full-screen quad drawn as a four-vertex triangle strip
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenQuad {
    vao: VertexArrayId,
    vbo: BufferId,
}

/// Position (xyz) and texcoord (uv) per corner
const QUAD_VERTICES: [f32; 20] = [
    -1.0, 1.0, 0.0, 0.0, 1.0, //
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    1.0, 1.0, 0.0, 1.0, 1.0, //
    1.0, -1.0, 0.0, 1.0, 0.0,
];

impl ScreenQuad {
    /// Upload the quad
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        let vao = device.create_vertex_array()?;
        let vbo = device.create_buffer()?;
        device.bind_vertex_array(Some(vao));
        device.buffer_data(BufferTarget::Array, vbo, bytemuck::cast_slice(&QUAD_VERTICES), BufferUsage::Static);
        let stride = 5 * 4;
        device.vertex_attrib(&VertexAttrib {
            location: attrib::POSITION,
            components: 3,
            kind: AttribKind::Float,
            stride,
            offset: 0,
            divisor: 0,
        });
        device.vertex_attrib(&VertexAttrib {
            location: attrib::TEXCOORD,
            components: 2,
            kind: AttribKind::Float,
            stride,
            offset: 12,
            divisor: 0,
        });
        device.bind_vertex_array(None);
        Ok(Self { vao, vbo })
    }

    /// Bind and draw
    pub fn draw(&self, device: &mut dyn RenderDevice) {
        device.bind_vertex_array(Some(self.vao));
        device.draw_arrays(PrimitiveMode::TriangleStrip, 0, 4);
        device.bind_vertex_array(None);
    }

    /// Release the GPU objects
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        device.delete_buffer(self.vbo);
        device.delete_vertex_array(self.vao);
    }
}

/// Shared internal primitives
#[derive(Debug, Clone, PartialEq)]
pub struct Primitives {
    /// Full-screen quad
    pub quad: ScreenQuad,
    /// Unit cube centered at the origin, bounds ±0.5, never casts shadows
    pub cube: Mesh,
}

impl Primitives {
    /// Upload every primitive
    pub fn new(device: &mut dyn RenderDevice) -> RenderResult<Self> {
        let quad = ScreenQuad::new(device)?;
        let mut cube = Mesh::upload(device, &MeshData::cube(1.0, 1.0, 1.0))?;
        cube.shadow_cast_mode = ShadowCastMode::Disabled;
        cube.layer_mask = Layers::ALL;
        Ok(Self { quad, cube })
    }

    /// Bind and draw the unit cube
    pub fn draw_cube(&self, device: &mut dyn RenderDevice) {
        device.bind_vertex_array(Some(self.cube.vao));
        self.cube.draw(device, 1);
        device.bind_vertex_array(None);
    }

    /// Release the GPU objects
    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        self.quad.destroy(device);
        self.cube.unload(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::{DeviceCommand, RecordingDevice};

    #[test]
    fn test_quad_draws_a_strip() {
        let mut device = RecordingDevice::new();
        let log = device.log();
        let primitives = Primitives::new(&mut device).unwrap();
        log.clear();
        primitives.quad.draw(&mut device);
        assert!(matches!(
            log.draws()[0],
            DeviceCommand::Draw { mode: PrimitiveMode::TriangleStrip, count: 4, .. }
        ));
        assert_eq!(primitives.cube.aabb.max.x, 0.5);
    }
}
