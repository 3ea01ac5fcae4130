use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::{create, draw};
use crate::error::Result;
use crate::gpu::{Backend, Draw, DrawRange, PipelineState, ProgramId, VertexArrayId, VertexLayout};
use crate::renderer::shaders::ShaderLibrary;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DepthUniforms {
    pub(crate) model: [[f32; 4]; 4],
    pub(crate) view_projection: [[f32; 4]; 4],
}

impl DepthUniforms {
    pub(crate) fn new(model: Mat4, view_projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view_projection: view_projection.to_cols_array_2d(),
        }
    }
}

/// Writes depth moments of shadow casters.
pub(crate) struct DepthProgram {
    program: ProgramId,
}

impl DepthProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, DepthUniforms>(backend, shaders, "depth", VertexLayout::Mesh, &[])?;
        Ok(Self { program })
    }

    pub(crate) fn draw(
        &self,
        vertex_array: VertexArrayId,
        range: DrawRange,
        uniforms: &DepthUniforms,
    ) -> Draw {
        draw(self.program, vertex_array, range, PipelineState::OPAQUE, uniforms, Vec::new())
    }
}
