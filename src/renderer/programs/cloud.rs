use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::{create, draw};
use crate::error::Result;
use crate::gpu::{
    Backend, Blend, Draw, DrawRange, PipelineState, ProgramId, Topology, VertexArrayId,
    VertexLayout,
};
use crate::renderer::shaders::ShaderLibrary;
use crate::scene::CloudKind;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CloudUniforms {
    pub(crate) view_projection: [[f32; 4]; 4],
    /// x: emissive scale
    pub(crate) params: [f32; 4],
}

impl CloudUniforms {
    pub(crate) fn new(view_projection: Mat4, emissive: bool) -> Self {
        Self {
            view_projection: view_projection.to_cols_array_2d(),
            params: [if emissive { 4.0 } else { 1.0 }, 0.0, 0.0, 0.0],
        }
    }
}

/// Point and line clouds. Emissive clouds blend additively so they feed
/// bloom; the rest blend by alpha. Neither writes depth.
pub(crate) struct CloudProgram {
    program: ProgramId,
}

impl CloudProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, CloudUniforms>(backend, shaders, "cloud", VertexLayout::Point, &[])?;
        Ok(Self { program })
    }

    pub(crate) fn draw(
        &self,
        kind: CloudKind,
        emissive: bool,
        vertex_array: VertexArrayId,
        range: DrawRange,
        uniforms: &CloudUniforms,
    ) -> Draw {
        let topology = match kind {
            CloudKind::Points => Topology::Points,
            CloudKind::Lines => Topology::Lines,
        };
        let blend = if emissive { Blend::Additive } else { Blend::Alpha };
        let state = PipelineState::OPAQUE
            .with_topology(topology)
            .with_blend(blend)
            .read_only_depth()
            .double_sided();
        draw(self.program, vertex_array, range, state, uniforms, Vec::new())
    }
}
