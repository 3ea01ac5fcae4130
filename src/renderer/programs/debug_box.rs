use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::{create, draw};
use crate::error::Result;
use crate::gpu::{Backend, Draw, PipelineState, ProgramId, Topology, VertexLayout};
use crate::renderer::geometry::StaticGeometry;
use crate::renderer::shaders::ShaderLibrary;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct BoxUniforms {
    pub(crate) model_view_projection: [[f32; 4]; 4],
    pub(crate) color: [f32; 4],
}

impl BoxUniforms {
    pub(crate) fn new(model_view_projection: Mat4, color: Vec4) -> Self {
        Self {
            model_view_projection: model_view_projection.to_cols_array_2d(),
            color: color.to_array(),
        }
    }
}

/// Wireframe debug boxes.
pub(crate) struct BoxProgram {
    program: ProgramId,
}

impl BoxProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, BoxUniforms>(backend, shaders, "box", VertexLayout::Position, &[])?;
        Ok(Self { program })
    }

    pub(crate) fn draw(&self, unit_box: &StaticGeometry, uniforms: &BoxUniforms) -> Draw {
        let state = PipelineState::OPAQUE
            .with_topology(Topology::Lines)
            .double_sided();
        draw(
            self.program,
            unit_box.vertex_array,
            unit_box.range,
            state,
            uniforms,
            Vec::new(),
        )
    }
}
