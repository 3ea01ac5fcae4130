use bytemuck::{Pod, Zeroable};

use super::{create, draw};
use crate::error::Result;
use crate::gpu::{Backend, Draw, PipelineState, ProgramId, TextureDimension, TextureId, VertexLayout};
use crate::renderer::geometry::StaticGeometry;
use crate::renderer::shaders::ShaderLibrary;

/// Luminance above which the scene contributes to bloom.
const BLOOM_THRESHOLD: f32 = 1.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BloomUniforms {
    /// x: threshold, y: strength
    params: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BlurUniforms {
    /// xy: one texel along the blur direction
    direction: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CompositingUniforms {
    /// x: bloom strength, y: exposure
    params: [f32; 4],
}

/// Extracts the bright parts of the scene.
pub(crate) struct BloomProgram {
    program: ProgramId,
}

impl BloomProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, BloomUniforms>(
            backend,
            shaders,
            "bloom",
            VertexLayout::Quad,
            &[TextureDimension::D2],
        )?;
        Ok(Self { program })
    }

    pub(crate) fn draw(&self, quad: &StaticGeometry, scene: TextureId) -> Draw {
        let uniforms = BloomUniforms {
            params: [BLOOM_THRESHOLD, 1.0, 0.0, 0.0],
        };
        draw(
            self.program,
            quad.vertex_array,
            quad.range,
            PipelineState::FULLSCREEN,
            &uniforms,
            vec![scene],
        )
    }
}

/// One direction of a separable gaussian blur.
pub(crate) struct BlurProgram {
    program: ProgramId,
}

impl BlurProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, BlurUniforms>(
            backend,
            shaders,
            "blur",
            VertexLayout::Quad,
            &[TextureDimension::D2],
        )?;
        Ok(Self { program })
    }

    /// `texel` is one texel step in uv space along the blur axis.
    pub(crate) fn draw(&self, quad: &StaticGeometry, input: TextureId, texel: [f32; 2]) -> Draw {
        let uniforms = BlurUniforms {
            direction: [texel[0], texel[1], 0.0, 0.0],
        };
        draw(
            self.program,
            quad.vertex_array,
            quad.range,
            PipelineState::FULLSCREEN,
            &uniforms,
            vec![input],
        )
    }
}

/// Adds blurred bloom onto the scene and tone maps into the screen.
pub(crate) struct CompositingProgram {
    program: ProgramId,
}

impl CompositingProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program = create::<B, CompositingUniforms>(
            backend,
            shaders,
            "compositing",
            VertexLayout::Quad,
            &[TextureDimension::D2, TextureDimension::D2],
        )?;
        Ok(Self { program })
    }

    pub(crate) fn draw(
        &self,
        quad: &StaticGeometry,
        scene: TextureId,
        bloom: TextureId,
        bloom_strength: f32,
    ) -> Draw {
        let uniforms = CompositingUniforms {
            params: [bloom_strength, 1.0, 0.0, 0.0],
        };
        draw(
            self.program,
            quad.vertex_array,
            quad.range,
            PipelineState::FULLSCREEN,
            &uniforms,
            vec![scene, bloom],
        )
    }
}
