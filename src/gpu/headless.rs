//! In-memory backend without a GPU.
//!
//! Everything is validated the way a real device would reject it, textures
//! keep their bytes, and every submitted frame is kept for inspection.
//!
//! Passes are shaded flat: the clear color fills the target, then every draw
//! covers the viewport with the first texel of its first bound texture, or
//! opaque white when the program samples nothing. Resolves carry the color
//! of a multisampled render buffer over to the destination.

use half::f16;

use super::backend::{
    check_complete, Attachment, AttachmentInfo, Backend, BufferId, BufferKind, FrameBufferDesc,
    FrameBufferId, PixelFormat, ProgramDesc, ProgramId, RenderBufferDesc, RenderBufferFormat,
    RenderBufferId, TextureDesc, TextureDimension, TextureId, VertexArrayDesc, VertexArrayId,
    VertexLayout, MAX_UNIFORM_BLOCK_SIZE,
};
use super::command::{Command, Draw, Frame, Pass, PassTarget};
use super::slots::Slots;
use crate::error::{RenderError, Result, ShaderStage};

struct HeadlessBuffer {
    kind: BufferKind,
    data: Vec<u8>,
}

struct HeadlessTexture {
    desc: TextureDesc,
    layers: Vec<Vec<u8>>,
}

struct HeadlessRenderBuffer {
    desc: RenderBufferDesc,
    /// Flat color of a color render buffer, once something was written.
    color: Option<[f32; 4]>,
}

struct HeadlessFrameBuffer {
    desc: FrameBufferDesc,
    info: AttachmentInfo,
}

struct HeadlessProgram {
    name: String,
    layout: VertexLayout,
    textures: Vec<TextureDimension>,
    uniform_size: usize,
}

/// RGBA8 contents of the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * 4;
        let mut pixel = [0; 4];
        pixel.copy_from_slice(&self.pixels[start..start + 4]);
        Some(pixel)
    }
}

pub struct HeadlessBackend {
    buffers: Slots<HeadlessBuffer>,
    vertex_arrays: Slots<VertexArrayDesc>,
    textures: Slots<HeadlessTexture>,
    render_buffers: Slots<HeadlessRenderBuffer>,
    frame_buffers: Slots<HeadlessFrameBuffer>,
    programs: Slots<HeadlessProgram>,
    screen: Option<Image>,
    last_frame: Option<Frame>,
    frames_submitted: usize,
    allocations: usize,
    uploads: usize,
    allocation_budget: Option<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            buffers: Slots::new(),
            vertex_arrays: Slots::new(),
            textures: Slots::new(),
            render_buffers: Slots::new(),
            frame_buffers: Slots::new(),
            programs: Slots::new(),
            screen: None,
            last_frame: None,
            frames_submitted: 0,
            allocations: 0,
            uploads: 0,
            allocation_budget: None,
        }
    }

    /// Lets `count` more allocations succeed, then reports out of memory.
    pub fn fail_after(&mut self, count: usize) {
        self.allocation_budget = Some(count);
    }

    pub fn stop_failing(&mut self) {
        self.allocation_budget = None;
    }

    /// Objects created so far, of every kind except programs.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Buffer and texture writes that carried data.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_render_buffers(&self) -> usize {
        self.render_buffers.len()
    }

    pub fn live_frame_buffers(&self) -> usize {
        self.frame_buffers.len()
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer.raw()).map(|buffer| buffer.data.as_slice())
    }

    pub fn texture_layer(&self, texture: TextureId, layer: usize) -> Option<&[u8]> {
        self.textures
            .get(texture.raw())
            .and_then(|texture| texture.layers.get(layer))
            .map(Vec::as_slice)
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(texture.raw()).map(|texture| &texture.desc)
    }

    pub fn program_name(&self, program: ProgramId) -> Option<&str> {
        self.programs
            .get(program.raw())
            .map(|program| program.name.as_str())
    }

    pub fn screen(&self) -> Option<&Image> {
        self.screen.as_ref()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn frames_submitted(&self) -> usize {
        self.frames_submitted
    }

    fn allocate(&mut self, what: &str) -> Result<()> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(RenderError::OutOfMemory(what.to_string()));
            }
            *budget -= 1;
        }
        self.allocations += 1;
        Ok(())
    }

    fn layers_for(desc: &TextureDesc, layers: &[&[u8]]) -> Vec<Vec<u8>> {
        (0..desc.dimension.layers() as usize)
            .map(|index| match layers.get(index) {
                Some(layer) if !layer.is_empty() => layer.to_vec(),
                _ => vec![0; desc.layer_size()],
            })
            .collect()
    }

    fn attachment_info(&self, attachment: Attachment) -> Result<AttachmentInfo> {
        match attachment {
            Attachment::Texture { texture, layer } => {
                let stored = self
                    .textures
                    .get(texture.raw())
                    .ok_or_else(|| texture.invalid())?;
                if layer >= stored.desc.dimension.layers() {
                    return Err(texture.invalid());
                }
                Ok(AttachmentInfo {
                    width: stored.desc.width,
                    height: stored.desc.height,
                    samples: 1,
                    depth: false,
                })
            }
            Attachment::RenderBuffer(render_buffer) => {
                self.render_buffer_info(render_buffer)
            }
        }
    }

    fn render_buffer_info(&self, render_buffer: RenderBufferId) -> Result<AttachmentInfo> {
        let desc = &self
            .render_buffers
            .get(render_buffer.raw())
            .ok_or_else(|| render_buffer.invalid())?
            .desc;
        Ok(AttachmentInfo {
            width: desc.width,
            height: desc.height,
            samples: desc.samples,
            depth: desc.format == RenderBufferFormat::Depth,
        })
    }

    fn check_draw(&self, pass: &Pass, draw: &Draw) -> Result<()> {
        let program = self
            .programs
            .get(draw.program.raw())
            .ok_or_else(|| draw.program.invalid())?;
        let vertex_array = self
            .vertex_arrays
            .get(draw.vertex_array.raw())
            .ok_or_else(|| draw.vertex_array.invalid())?;

        let bad_draw = |reason: String| RenderError::InvalidData {
            what: "draw",
            reason: format!("{} in {}: {reason}", program.name, pass.kind.label()),
        };

        if vertex_array.layout != program.layout {
            return Err(bad_draw(format!(
                "vertex layout {:?} does not match {:?}",
                vertex_array.layout, program.layout
            )));
        }
        if draw.range.indexed && vertex_array.index_buffer.is_none() {
            return Err(bad_draw("indexed draw without element buffer".into()));
        }
        if draw.uniforms.len() != program.uniform_size {
            return Err(bad_draw(format!(
                "{} uniform bytes, program declares {}",
                draw.uniforms.len(),
                program.uniform_size
            )));
        }
        if draw.textures.len() != program.textures.len() {
            return Err(bad_draw(format!(
                "{} textures bound, program declares {}",
                draw.textures.len(),
                program.textures.len()
            )));
        }

        let attached = match pass.target {
            PassTarget::FrameBuffer(frame_buffer) => self
                .frame_buffers
                .get(frame_buffer.raw())
                .and_then(|stored| stored.desc.color),
            PassTarget::Screen => None,
        };
        for (texture, dimension) in draw.textures.iter().zip(&program.textures) {
            let stored = self
                .textures
                .get(texture.raw())
                .ok_or_else(|| texture.invalid())?;
            if stored.desc.dimension != *dimension {
                return Err(bad_draw(format!(
                    "texture {} is {:?}, slot expects {:?}",
                    texture.raw(),
                    stored.desc.dimension,
                    dimension
                )));
            }
            if matches!(attached, Some(Attachment::Texture { texture: target, .. }) if target == *texture)
            {
                return Err(bad_draw(format!(
                    "texture {} is sampled while attached",
                    texture.raw()
                )));
            }
        }
        Ok(())
    }

    fn run_pass(&mut self, pass: &Pass) -> Result<()> {
        for draw in &pass.draws {
            self.check_draw(pass, draw)?;
        }

        let coverage = pass.draws.last().map(|draw| self.draw_color(draw));
        match pass.target {
            PassTarget::Screen => {
                let (width, height) = pass.viewport;
                let screen = self
                    .screen
                    .get_or_insert_with(|| Image::new(width, height));
                if (screen.width, screen.height) != (width, height) {
                    *screen = Image::new(width, height);
                }
                for color in pass.clear.color.into_iter().chain(coverage) {
                    let rgba = encode(PixelFormat::Rgba8, color);
                    for pixel in screen.pixels.chunks_exact_mut(4) {
                        pixel.copy_from_slice(&rgba);
                    }
                }
            }
            PassTarget::FrameBuffer(frame_buffer) => {
                let stored = self
                    .frame_buffers
                    .get(frame_buffer.raw())
                    .ok_or_else(|| frame_buffer.invalid())?;
                if pass.viewport.0 > stored.info.width || pass.viewport.1 > stored.info.height {
                    return Err(RenderError::InvalidData {
                        what: "viewport",
                        reason: format!(
                            "{:?} exceeds '{}' ({}x{})",
                            pass.viewport, stored.desc.label, stored.info.width, stored.info.height
                        ),
                    });
                }
                if pass.clear.depth.is_some() && !stored.info.depth {
                    return Err(RenderError::InvalidData {
                        what: "clear",
                        reason: format!("'{}' has no depth attachment", stored.desc.label),
                    });
                }
                let attachment = stored.desc.color;
                let full = (stored.info.width, stored.info.height);
                if let (Some(color), Some(attachment)) = (pass.clear.color, attachment) {
                    self.paint(attachment, color, full);
                }
                if let (Some(color), Some(attachment)) = (coverage, attachment) {
                    self.paint(attachment, color, pass.viewport);
                }
            }
        }
        Ok(())
    }

    /// Color a draw leaves behind.
    fn draw_color(&self, draw: &Draw) -> [f32; 4] {
        draw.textures
            .first()
            .and_then(|texture| self.textures.get(texture.raw()))
            .and_then(|stored| {
                let layer = stored.layers.first()?;
                decode(stored.desc.format, layer)
            })
            .unwrap_or([1.0; 4])
    }

    /// Fills the top-left `area` of an attachment with `color`.
    fn paint(&mut self, attachment: Attachment, color: [f32; 4], area: (u32, u32)) {
        match attachment {
            Attachment::Texture { texture, layer } => {
                let Some(target) = self.textures.get_mut(texture.raw()) else {
                    return;
                };
                let value = encode(target.desc.format, color);
                let row = target.desc.width as usize * value.len();
                if row == 0 {
                    return;
                }
                let width = area.0.min(target.desc.width) as usize * value.len();
                let height = area.1.min(target.desc.height) as usize;
                if let Some(pixels) = target.layers.get_mut(layer as usize) {
                    for line in pixels.chunks_exact_mut(row).take(height) {
                        for pixel in line[..width].chunks_exact_mut(value.len()) {
                            pixel.copy_from_slice(&value);
                        }
                    }
                }
            }
            Attachment::RenderBuffer(render_buffer) => {
                if let Some(stored) = self.render_buffers.get_mut(render_buffer.raw()) {
                    if matches!(stored.desc.format, RenderBufferFormat::Color(_)) {
                        stored.color = Some(color);
                    }
                }
            }
        }
    }

    fn resolve(&mut self, source: FrameBufferId, destination: FrameBufferId) -> Result<()> {
        let from = self
            .frame_buffers
            .get(source.raw())
            .ok_or_else(|| source.invalid())?;
        let to = self
            .frame_buffers
            .get(destination.raw())
            .ok_or_else(|| destination.invalid())?;
        if from.info.samples <= 1 || to.info.samples != 1 {
            return Err(RenderError::InvalidData {
                what: "resolve",
                reason: format!(
                    "'{}' ({} samples) into '{}' ({} samples)",
                    from.desc.label, from.info.samples, to.desc.label, to.info.samples
                ),
            });
        }
        if (from.info.width, from.info.height) != (to.info.width, to.info.height) {
            return Err(RenderError::InvalidData {
                what: "resolve",
                reason: format!("'{}' and '{}' differ in size", from.desc.label, to.desc.label),
            });
        }
        let color = match from.desc.color {
            Some(Attachment::RenderBuffer(render_buffer)) => self
                .render_buffers
                .get(render_buffer.raw())
                .and_then(|stored| stored.color),
            _ => None,
        };
        let size = (to.info.width, to.info.height);
        if let (Some(color), Some(attachment)) = (color, to.desc.color) {
            self.paint(attachment, color, size);
        }
        Ok(())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// First pixel of `bytes` in `format`, widened to RGBA.
fn decode(format: PixelFormat, bytes: &[u8]) -> Option<[f32; 4]> {
    let unorm = |index: usize| bytes.get(index).map(|value| *value as f32 / 255.0);
    let half = |index: usize| {
        let pair = bytes.get(index * 2..index * 2 + 2)?;
        Some(f16::from_le_bytes([pair[0], pair[1]]).to_f32())
    };
    Some(match format {
        PixelFormat::R8 => [unorm(0)?, 0.0, 0.0, 1.0],
        PixelFormat::Rg8 => [unorm(0)?, unorm(1)?, 0.0, 1.0],
        PixelFormat::Rgba8 | PixelFormat::Srgba8 => [unorm(0)?, unorm(1)?, unorm(2)?, unorm(3)?],
        PixelFormat::R16F => [half(0)?, 0.0, 0.0, 1.0],
        PixelFormat::Rg16F => [half(0)?, half(1)?, 0.0, 1.0],
        PixelFormat::Rgba16F => [half(0)?, half(1)?, half(2)?, half(3)?],
    })
}

/// One pixel of `color` in `format`.
fn encode(format: PixelFormat, color: [f32; 4]) -> Vec<u8> {
    let unorm = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    let half = |value: f32| f16::from_f32(value).to_le_bytes();
    match format {
        PixelFormat::R8 => vec![unorm(color[0])],
        PixelFormat::Rg8 => vec![unorm(color[0]), unorm(color[1])],
        PixelFormat::Rgba8 | PixelFormat::Srgba8 => color.iter().map(|c| unorm(*c)).collect(),
        PixelFormat::R16F => half(color[0]).to_vec(),
        PixelFormat::Rg16F => color[..2].iter().flat_map(|c| half(*c)).collect(),
        PixelFormat::Rgba16F => color.iter().flat_map(|c| half(*c)).collect(),
    }
}

impl Backend for HeadlessBackend {
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId> {
        self.allocate("buffer")?;
        if !data.is_empty() {
            self.uploads += 1;
        }
        let id = self.buffers.insert(HeadlessBuffer {
            kind,
            data: data.to_vec(),
        });
        Ok(BufferId::from_raw(id))
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let stored = self
            .buffers
            .get_mut(buffer.raw())
            .ok_or_else(|| buffer.invalid())?;
        stored.data = data.to_vec();
        self.uploads += 1;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer.raw());
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId> {
        let vertices = self
            .buffers
            .get(desc.vertex_buffer.raw())
            .ok_or_else(|| desc.vertex_buffer.invalid())?;
        if vertices.kind != BufferKind::Vertex {
            return Err(RenderError::InvalidData {
                what: "vertex array",
                reason: "vertex slot holds an element buffer".into(),
            });
        }
        if let Some(index_buffer) = desc.index_buffer {
            let indices = self
                .buffers
                .get(index_buffer.raw())
                .ok_or_else(|| index_buffer.invalid())?;
            if indices.kind != BufferKind::Index {
                return Err(RenderError::InvalidData {
                    what: "vertex array",
                    reason: "element slot holds a vertex buffer".into(),
                });
            }
        }
        self.allocate("vertex array")?;
        Ok(VertexArrayId::from_raw(self.vertex_arrays.insert(*desc)))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(vertex_array.raw());
    }

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> Result<TextureId> {
        desc.check_layers(layers)?;
        self.allocate(&desc.label)?;
        if layers.iter().any(|layer| !layer.is_empty()) {
            self.uploads += 1;
        }
        let id = self.textures.insert(HeadlessTexture {
            desc: desc.clone(),
            layers: Self::layers_for(desc, layers),
        });
        Ok(TextureId::from_raw(id))
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        desc: &TextureDesc,
        layers: &[&[u8]],
    ) -> Result<()> {
        desc.check_layers(layers)?;
        let stored = self
            .textures
            .get_mut(texture.raw())
            .ok_or_else(|| texture.invalid())?;
        stored.desc = desc.clone();
        stored.layers = Self::layers_for(desc, layers);
        self.uploads += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture.raw());
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<RenderBufferId> {
        if desc.width == 0 || desc.height == 0 || desc.samples == 0 {
            return Err(RenderError::InvalidData {
                what: "render buffer",
                reason: format!("'{}' has a zero dimension", desc.label),
            });
        }
        self.allocate(&desc.label)?;
        Ok(RenderBufferId::from_raw(
            self.render_buffers.insert(HeadlessRenderBuffer {
                desc: desc.clone(),
                color: None,
            }),
        ))
    }

    fn destroy_render_buffer(&mut self, render_buffer: RenderBufferId) {
        self.render_buffers.remove(render_buffer.raw());
    }

    fn create_frame_buffer(&mut self, desc: &FrameBufferDesc) -> Result<FrameBufferId> {
        let incomplete = |err: RenderError| match err {
            RenderError::InvalidHandle { kind, id } => RenderError::IncompleteTarget {
                target: desc.label.clone(),
                reason: format!("missing {kind} {id}"),
            },
            other => other,
        };
        let color = desc
            .color
            .map(|attachment| self.attachment_info(attachment))
            .transpose()
            .map_err(incomplete)?;
        let depth = desc
            .depth
            .map(|render_buffer| self.render_buffer_info(render_buffer))
            .transpose()
            .map_err(incomplete)?;
        let info = check_complete(&desc.label, color, depth)?;

        self.allocate(&desc.label)?;
        let id = self.frame_buffers.insert(HeadlessFrameBuffer {
            desc: desc.clone(),
            info,
        });
        Ok(FrameBufferId::from_raw(id))
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferId) {
        self.frame_buffers.remove(frame_buffer.raw());
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId> {
        for (stage, source) in [
            (ShaderStage::Vertex, desc.vertex_source),
            (ShaderStage::Fragment, desc.fragment_source),
        ] {
            if source.trim().is_empty() {
                return Err(RenderError::ShaderCompile {
                    program: desc.name.to_string(),
                    stage,
                    log: "empty shader source".into(),
                });
            }
        }
        if desc.uniform_size > MAX_UNIFORM_BLOCK_SIZE {
            return Err(RenderError::ProgramLink {
                program: desc.name.to_string(),
                log: format!(
                    "uniform block of {} bytes exceeds {}",
                    desc.uniform_size, MAX_UNIFORM_BLOCK_SIZE
                ),
            });
        }
        let id = self.programs.insert(HeadlessProgram {
            name: desc.name.to_string(),
            layout: desc.layout,
            textures: desc.textures.to_vec(),
            uniform_size: desc.uniform_size,
        });
        Ok(ProgramId::from_raw(id))
    }

    fn submit(&mut self, frame: &Frame) -> Result<()> {
        for command in frame.commands() {
            match command {
                Command::Pass(pass) => self.run_pass(pass)?,
                Command::Resolve {
                    source,
                    destination,
                } => self.resolve(*source, *destination)?,
            }
        }
        self.frames_submitted += 1;
        self.last_frame = Some(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Filter, Wrap};
    use crate::gpu::backend::TextureUsage;
    use crate::gpu::command::{Clear, DrawRange, PassKind, PipelineState};

    fn color_texture(backend: &mut HeadlessBackend, size: u32) -> TextureId {
        let desc = TextureDesc {
            label: "color".into(),
            width: size,
            height: size,
            dimension: TextureDimension::D2,
            format: PixelFormat::Rgba8,
            wrap: Wrap::ClampToEdge,
            filter: Filter::Linear,
            usage: TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
        };
        backend.create_texture(&desc, &[]).expect("texture")
    }

    /// A fullscreen quad whose program samples one 2D texture.
    fn textured_quad(backend: &mut HeadlessBackend, texture: TextureId) -> Draw {
        let program = backend
            .create_program(&ProgramDesc {
                name: "copy",
                vertex_source: "fn vs_main() {}",
                fragment_source: "fn fs_main() {}",
                layout: VertexLayout::Quad,
                textures: &[TextureDimension::D2],
                uniform_size: 16,
            })
            .expect("program");
        let vertex_buffer = backend
            .create_buffer(BufferKind::Vertex, &[0; 64])
            .expect("buffer");
        let vertex_array = backend
            .create_vertex_array(&VertexArrayDesc {
                layout: VertexLayout::Quad,
                vertex_buffer,
                index_buffer: None,
            })
            .expect("vertex array");
        Draw {
            program,
            vertex_array,
            state: PipelineState::FULLSCREEN,
            range: DrawRange {
                count: 4,
                indexed: false,
            },
            uniforms: vec![0; 16],
            textures: vec![texture],
        }
    }

    #[test]
    fn clear_fills_attached_texture() {
        let mut backend = HeadlessBackend::new();
        let texture = color_texture(&mut backend, 2);
        let frame_buffer = backend
            .create_frame_buffer(&FrameBufferDesc {
                label: "target".into(),
                color: Some(Attachment::Texture { texture, layer: 0 }),
                depth: None,
            })
            .expect("complete");

        let mut frame = Frame::new();
        frame.push_pass(Pass::new(
            PassKind::Bloom,
            PassTarget::FrameBuffer(frame_buffer),
            (2, 2),
            Clear::color([1.0, 0.0, 0.0, 1.0]),
        ));
        backend.submit(&frame).expect("submit");

        let pixels = backend.texture_layer(texture, 0).expect("layer");
        assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
        assert_eq!(backend.frames_submitted(), 1);
    }

    #[test]
    fn draws_cover_the_screen_with_their_texture() {
        let mut backend = HeadlessBackend::new();
        let texture = color_texture(&mut backend, 2);
        let red = [255, 0, 0, 255].repeat(4);
        let desc = backend.texture_desc(texture).expect("desc").clone();
        backend.update_texture(texture, &desc, &[&red]).expect("update");
        let draw = textured_quad(&mut backend, texture);

        let mut frame = Frame::new();
        let mut pass = Pass::new(PassKind::Compositing, PassTarget::Screen, (4, 4), Clear::color([0.0; 4]));
        pass.draws.push(draw);
        frame.push_pass(pass);
        backend.submit(&frame).expect("submit");

        let screen = backend.screen().expect("screen");
        assert_eq!(screen.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(screen.pixel(3, 3), Some([255, 0, 0, 255]));
    }

    #[test]
    fn resolve_carries_multisampled_color_over() {
        let mut backend = HeadlessBackend::new();
        let color = backend
            .create_render_buffer(&RenderBufferDesc {
                label: "msaa".into(),
                width: 2,
                height: 2,
                format: RenderBufferFormat::Color(PixelFormat::Rgba8),
                samples: 4,
            })
            .expect("render buffer");
        let multisampled = backend
            .create_frame_buffer(&FrameBufferDesc {
                label: "msaa".into(),
                color: Some(Attachment::RenderBuffer(color)),
                depth: None,
            })
            .expect("complete");
        let texture = color_texture(&mut backend, 2);
        let resolved = backend
            .create_frame_buffer(&FrameBufferDesc {
                label: "resolved".into(),
                color: Some(Attachment::Texture { texture, layer: 0 }),
                depth: None,
            })
            .expect("complete");

        let mut frame = Frame::new();
        frame.push_pass(Pass::new(
            PassKind::Scene,
            PassTarget::FrameBuffer(multisampled),
            (2, 2),
            Clear::color([0.0, 1.0, 0.0, 1.0]),
        ));
        frame.push(Command::Resolve {
            source: multisampled,
            destination: resolved,
        });
        backend.submit(&frame).expect("submit");

        let pixels = backend.texture_layer(texture, 0).expect("layer");
        assert_eq!(&pixels[12..16], &[0, 255, 0, 255]);
    }

    #[test]
    fn depth_clear_without_depth_attachment_fails() {
        let mut backend = HeadlessBackend::new();
        let texture = color_texture(&mut backend, 2);
        let frame_buffer = backend
            .create_frame_buffer(&FrameBufferDesc {
                label: "color only".into(),
                color: Some(Attachment::Texture { texture, layer: 0 }),
                depth: None,
            })
            .expect("complete");

        let mut frame = Frame::new();
        frame.push_pass(Pass::new(
            PassKind::Bloom,
            PassTarget::FrameBuffer(frame_buffer),
            (2, 2),
            Clear::all([0.0; 4]),
        ));
        assert!(backend.submit(&frame).is_err());
    }

    #[test]
    fn frame_buffer_with_destroyed_texture_is_incomplete() {
        let mut backend = HeadlessBackend::new();
        let texture = color_texture(&mut backend, 2);
        backend.destroy_texture(texture);
        let result = backend.create_frame_buffer(&FrameBufferDesc {
            label: "dangling".into(),
            color: Some(Attachment::Texture { texture, layer: 0 }),
            depth: None,
        });
        assert!(matches!(result, Err(RenderError::IncompleteTarget { .. })));
    }

    #[test]
    fn empty_shader_fails_to_compile() {
        let mut backend = HeadlessBackend::new();
        let result = backend.create_program(&ProgramDesc {
            name: "broken",
            vertex_source: "fn vs_main() {}",
            fragment_source: "  ",
            layout: VertexLayout::Quad,
            textures: &[],
            uniform_size: 16,
        });
        match result {
            Err(RenderError::ShaderCompile { program, stage, .. }) => {
                assert_eq!(program, "broken");
                assert_eq!(stage, ShaderStage::Fragment);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn allocation_budget_reports_out_of_memory() {
        let mut backend = HeadlessBackend::new();
        backend.fail_after(1);
        assert!(backend.create_buffer(BufferKind::Vertex, &[0; 4]).is_ok());
        assert!(matches!(
            backend.create_buffer(BufferKind::Vertex, &[0; 4]),
            Err(RenderError::OutOfMemory(_))
        ));
        backend.stop_failing();
        assert!(backend.create_buffer(BufferKind::Vertex, &[0; 4]).is_ok());
        assert_eq!(backend.allocations(), 2);
    }

    #[test]
    fn half_float_encoding_round_trips_one() {
        let bytes = encode(PixelFormat::Rgba16F, [1.0, 0.0, 0.5, 1.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(), 1.0);
        assert_eq!(f16::from_le_bytes([bytes[4], bytes[5]]).to_f32(), 0.5);
    }
}
