//! Device layer: the [`Backend`] seam, the command stream handed to it and
//! the handle types returned to callers.

pub mod backend;
pub mod command;
pub mod device;
pub mod headless;
pub mod pool;
pub mod resource;
mod slots;

pub use backend::{
    Attachment, Backend, BufferId, BufferKind, FrameBufferDesc, FrameBufferId, PixelFormat,
    ProgramDesc, ProgramId, RenderBufferDesc, RenderBufferFormat, RenderBufferId, TextureDesc,
    TextureDimension, TextureId, TextureUsage, VertexArrayDesc, VertexArrayId, VertexLayout,
    MAX_UNIFORM_BLOCK_SIZE,
};
pub use command::{
    Blend, Clear, Command, Draw, DrawRange, Frame, Pass, PassKind, PassTarget, PipelineState,
    Topology,
};
pub use device::WgpuBackend;
pub use headless::{HeadlessBackend, Image};
pub use pool::{Entry, Pool};
pub use resource::{Mesh, Model, Resource, Texture};
