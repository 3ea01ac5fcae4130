//! Multi-pass renderer over a [`Backend`](crate::gpu::Backend).

pub mod cascades;
mod geometry;
mod loadable;
mod programs;
#[allow(clippy::module_inception)]
mod renderer;
pub mod resources;
pub mod shaders;
mod targets;

pub use cascades::{Cascade, CASCADE_COUNT};
pub use loadable::Loadable;
pub use renderer::{Renderer, RendererStats};
pub use resources::{GpuResources, PoolSizes};
pub use shaders::{ShaderLibrary, ShaderSource};
pub use programs::StandardTextures;
