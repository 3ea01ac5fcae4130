use bitflags::bitflags;

use super::command::Frame;
use crate::asset::{Filter, Wrap};
use crate::error::{RenderError, Result};

macro_rules! raw_ids {
    ($($(#[$meta:meta])* $name:ident => $kind:literal,)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
            pub struct $name(u32);

            impl $name {
                pub const KIND: &'static str = $kind;

                pub const fn from_raw(raw: u32) -> Self {
                    Self(raw)
                }

                pub const fn raw(self) -> u32 {
                    self.0
                }

                pub(crate) fn invalid(self) -> RenderError {
                    RenderError::InvalidHandle {
                        kind: Self::KIND,
                        id: self.0,
                    }
                }
            }
        )*
    };
}

raw_ids! {
    /// Vertex or element buffer owned by a backend.
    BufferId => "buffer",
    TextureId => "texture",
    RenderBufferId => "render buffer",
    FrameBufferId => "frame buffer",
    ProgramId => "program",
    /// Binding of vertex (and optional element) buffers to a vertex layout.
    VertexArrayId => "vertex array",
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Vertex formats understood by the programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// position, normal, tangent, uv, weight
    Mesh,
    /// position, size, color
    Point,
    /// position only
    Position,
    /// 2D position, uv
    Quad,
}

impl VertexLayout {
    pub fn stride(self) -> usize {
        match self {
            VertexLayout::Mesh => 12 * 4,
            VertexLayout::Point => 8 * 4,
            VertexLayout::Position => 3 * 4,
            VertexLayout::Quad => 4 * 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexArrayDesc {
    pub layout: VertexLayout,
    pub vertex_buffer: BufferId,
    /// `u32` indices when present.
    pub index_buffer: Option<BufferId>,
}

/// Storage formats on the GPU side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8,
    Rg8,
    Rgba8,
    Srgba8,
    R16F,
    Rg16F,
    Rgba16F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rg8 | PixelFormat::R16F => 2,
            PixelFormat::Rgba8 | PixelFormat::Srgba8 | PixelFormat::Rg16F => 4,
            PixelFormat::Rgba16F => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layers(self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u8 {
        const SAMPLED = 1 << 0;
        const RENDER_TARGET = 1 << 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: PixelFormat,
    pub wrap: Wrap,
    pub filter: Filter,
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Bytes in one array layer.
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Checks the upload layers against the description. No layers at all
    /// means allocate only.
    pub(crate) fn check_layers(&self, layers: &[&[u8]]) -> Result<()> {
        if layers.is_empty() {
            return Ok(());
        }
        if layers.len() != self.dimension.layers() as usize {
            return Err(RenderError::InvalidData {
                what: "texture upload",
                reason: format!(
                    "'{}' expects {} layers, got {}",
                    self.label,
                    self.dimension.layers(),
                    layers.len()
                ),
            });
        }
        match layers
            .iter()
            .find(|layer| !layer.is_empty() && layer.len() != self.layer_size())
        {
            Some(layer) => Err(RenderError::InvalidData {
                what: "texture upload",
                reason: format!(
                    "'{}' expects {} bytes per layer, got {}",
                    self.label,
                    self.layer_size(),
                    layer.len()
                ),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderBufferFormat {
    Depth,
    Color(PixelFormat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderBufferDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: RenderBufferFormat,
    pub samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// One layer of a texture; cube faces are layers 0..6.
    Texture { texture: TextureId, layer: u32 },
    RenderBuffer(RenderBufferId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferDesc {
    pub label: String,
    pub color: Option<Attachment>,
    pub depth: Option<RenderBufferId>,
}

/// Size and sample count of one resolved attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub depth: bool,
}

/// Checks that the attachments of a frame buffer fit together and returns
/// the frame buffer's extent and sample count.
pub(crate) fn check_complete(
    label: &str,
    color: Option<AttachmentInfo>,
    depth: Option<AttachmentInfo>,
) -> Result<AttachmentInfo> {
    let incomplete = |reason: String| RenderError::IncompleteTarget {
        target: label.to_string(),
        reason,
    };

    if color.is_some_and(|info| info.depth) {
        return Err(incomplete("color attachment has a depth format".into()));
    }
    if depth.is_some_and(|info| !info.depth) {
        return Err(incomplete("depth attachment has a color format".into()));
    }

    match (color, depth) {
        (None, None) => Err(incomplete("no attachments".into())),
        (Some(info), None) | (None, Some(info)) => Ok(info),
        (Some(color), Some(depth)) => {
            if (color.width, color.height) != (depth.width, depth.height) {
                return Err(incomplete(format!(
                    "color is {}x{} but depth is {}x{}",
                    color.width, color.height, depth.width, depth.height
                )));
            }
            if color.samples != depth.samples {
                return Err(incomplete(format!(
                    "color has {} samples but depth has {}",
                    color.samples, depth.samples
                )));
            }
            Ok(AttachmentInfo {
                depth: true,
                ..color
            })
        }
    }
}

/// Everything needed to compile and link one program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub name: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub layout: VertexLayout,
    /// Texture slots in binding order.
    pub textures: &'a [TextureDimension],
    pub uniform_size: usize,
}

/// Largest uniform block a program may declare.
pub const MAX_UNIFORM_BLOCK_SIZE: usize = 2048;

/// The device seam. Implementations own every GPU object and hand out
/// opaque ids; nothing above this trait touches API objects directly.
pub trait Backend {
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId>;
    /// Rewrites the buffer contents, growing the allocation when needed.
    fn update_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId>;
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> Result<TextureId>;
    /// Re-uploads the texture, reallocating when size or format changed.
    fn update_texture(&mut self, texture: TextureId, desc: &TextureDesc, layers: &[&[u8]])
        -> Result<()>;
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<RenderBufferId>;
    fn destroy_render_buffer(&mut self, render_buffer: RenderBufferId);

    /// Fails with [`RenderError::IncompleteTarget`] when the attachments do
    /// not form a complete frame buffer.
    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferId>;
    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferId);

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId>;

    /// Executes every command of the frame in order.
    fn submit(&mut self, frame: &Frame) -> Result<()>;
}
