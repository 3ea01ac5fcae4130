//! One struct per program. Each owns its backend program id, the `Pod`
//! uniform block laid out exactly as its shaders declare it, and the texture
//! slots it samples.

mod cloud;
mod debug_box;
mod depth;
mod post;
mod standard;

use bytemuck::Pod;

pub(crate) use cloud::{CloudProgram, CloudUniforms};
pub(crate) use debug_box::{BoxProgram, BoxUniforms};
pub(crate) use depth::{DepthProgram, DepthUniforms};
pub(crate) use post::{BloomProgram, BlurProgram, CompositingProgram};
pub(crate) use standard::{StandardProgram, StandardUniforms};
pub use standard::StandardTextures;

use super::shaders::ShaderLibrary;
use crate::error::Result;
use crate::gpu::{
    Backend, Draw, DrawRange, PipelineState, ProgramDesc, ProgramId, TextureDimension, TextureId,
    VertexArrayId, VertexLayout,
};

/// Every program the renderer draws with, built together at construction.
pub(crate) struct Programs {
    pub(crate) standard: StandardProgram,
    pub(crate) depth: DepthProgram,
    pub(crate) cloud: CloudProgram,
    pub(crate) debug_box: BoxProgram,
    pub(crate) bloom: BloomProgram,
    pub(crate) blur: BlurProgram,
    pub(crate) compositing: CompositingProgram,
}

impl Programs {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        Ok(Self {
            standard: StandardProgram::new(backend, shaders)?,
            depth: DepthProgram::new(backend, shaders)?,
            cloud: CloudProgram::new(backend, shaders)?,
            debug_box: BoxProgram::new(backend, shaders)?,
            bloom: BloomProgram::new(backend, shaders)?,
            blur: BlurProgram::new(backend, shaders)?,
            compositing: CompositingProgram::new(backend, shaders)?,
        })
    }
}

/// Compiles the program named `name` with a uniform block of type `U`.
fn create<B: Backend, U: Pod>(
    backend: &mut B,
    shaders: &ShaderLibrary,
    name: &str,
    layout: VertexLayout,
    textures: &[TextureDimension],
) -> Result<ProgramId> {
    let source = shaders.get(name)?;
    backend.create_program(&ProgramDesc {
        name,
        vertex_source: &source.vertex,
        fragment_source: &source.fragment,
        layout,
        textures,
        uniform_size: std::mem::size_of::<U>(),
    })
}

fn draw<U: Pod>(
    program: ProgramId,
    vertex_array: VertexArrayId,
    range: DrawRange,
    state: PipelineState,
    uniforms: &U,
    textures: Vec<TextureId>,
) -> Draw {
    Draw {
        program,
        vertex_array,
        state,
        range,
        uniforms: bytemuck::bytes_of(uniforms).to_vec(),
        textures,
    }
}
