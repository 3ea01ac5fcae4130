//! GPU copies of CPU resources, keyed by resource id.
//!
//! Meshes occupy the array buffer, element buffer (when indexed) and vertex
//! array pools; clouds the array buffer and vertex array pools; textures the
//! texture pool; texture targets the frame buffer and render buffer pools
//! plus the texture pool for their color texture. Every entry records the
//! stamp of the data it holds so stale entries are re-uploaded.

use std::borrow::Cow;

use half::f16;

use crate::asset::{Format, Mesh, ResourceId, Texture};
use crate::error::Result;
use crate::gpu::{
    Attachment, Backend, BufferId, BufferKind, FrameBufferDesc, FrameBufferId, PixelFormat, Pool,
    RenderBufferDesc, RenderBufferFormat, RenderBufferId, TextureDesc, TextureDimension,
    TextureId, TextureUsage, VertexArrayDesc, VertexArrayId, VertexLayout,
};
use crate::scene::{Cloud, TextureTarget};
use crate::time::Stamp;

/// Number of entries in each pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSizes {
    pub array_buffers: usize,
    pub element_buffers: usize,
    pub vertex_arrays: usize,
    pub textures: usize,
    pub frame_buffers: usize,
    pub render_buffers: usize,
}

impl PoolSizes {
    pub fn total(&self) -> usize {
        self.array_buffers
            + self.element_buffers
            + self.vertex_arrays
            + self.textures
            + self.frame_buffers
            + self.render_buffers
    }
}

/// Objects created by one load, released again if the load fails part way.
#[derive(Default)]
struct Created {
    buffers: Vec<BufferId>,
    vertex_arrays: Vec<VertexArrayId>,
    render_buffers: Vec<RenderBufferId>,
}

impl Created {
    fn rollback<B: Backend>(self, backend: &mut B) {
        for vertex_array in self.vertex_arrays {
            backend.destroy_vertex_array(vertex_array);
        }
        for buffer in self.buffers {
            backend.destroy_buffer(buffer);
        }
        for render_buffer in self.render_buffers {
            backend.destroy_render_buffer(render_buffer);
        }
    }
}

struct Geometry<'a> {
    layout: VertexLayout,
    vertices: &'a [u8],
    indices: &'a [u8],
}

#[derive(Default)]
pub struct GpuResources {
    array_buffers: Pool<BufferId>,
    element_buffers: Pool<BufferId>,
    vertex_arrays: Pool<VertexArrayId>,
    textures: Pool<TextureId>,
    frame_buffers: Pool<FrameBufferId>,
    render_buffers: Pool<RenderBufferId>,
}

impl GpuResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sizes(&self) -> PoolSizes {
        PoolSizes {
            array_buffers: self.array_buffers.len(),
            element_buffers: self.element_buffers.len(),
            vertex_arrays: self.vertex_arrays.len(),
            textures: self.textures.len(),
            frame_buffers: self.frame_buffers.len(),
            render_buffers: self.render_buffers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sizes().total() == 0
    }

    /// Stamp of the mesh or cloud data currently on the GPU.
    pub fn geometry_stamp(&self, id: ResourceId) -> Option<Stamp> {
        self.array_buffers.get(id).map(|entry| entry.modified)
    }

    pub fn vertex_buffer(&self, id: ResourceId) -> Option<BufferId> {
        self.array_buffers.handle(id)
    }

    pub fn element_buffer(&self, id: ResourceId) -> Option<BufferId> {
        self.element_buffers.handle(id)
    }

    pub fn vertex_array(&self, id: ResourceId) -> Option<VertexArrayId> {
        self.vertex_arrays.handle(id)
    }

    pub fn texture(&self, id: ResourceId) -> Option<TextureId> {
        self.textures.handle(id)
    }

    pub fn texture_stamp(&self, id: ResourceId) -> Option<Stamp> {
        self.textures.get(id).map(|entry| entry.modified)
    }

    pub fn frame_buffer(&self, id: ResourceId) -> Option<FrameBufferId> {
        self.frame_buffers.handle(id)
    }

    pub(crate) fn load_mesh<B: Backend>(&mut self, backend: &mut B, mesh: &Mesh) -> Result<()> {
        let geometry = Geometry {
            layout: VertexLayout::Mesh,
            vertices: bytemuck::cast_slice(mesh.vertices()),
            indices: bytemuck::cast_slice(mesh.indices()),
        };
        self.load_geometry(backend, mesh.id(), mesh.modified(), geometry)
    }

    pub(crate) fn load_cloud<B: Backend>(&mut self, backend: &mut B, cloud: &Cloud) -> Result<()> {
        let geometry = Geometry {
            layout: VertexLayout::Point,
            vertices: bytemuck::cast_slice(cloud.points()),
            indices: &[],
        };
        self.load_geometry(backend, cloud.id(), cloud.modified(), geometry)
    }

    fn load_geometry<B: Backend>(
        &mut self,
        backend: &mut B,
        id: ResourceId,
        modified: Stamp,
        geometry: Geometry<'_>,
    ) -> Result<()> {
        if self.array_buffers.is_current(id, modified) {
            return Ok(());
        }

        let indexed = !geometry.indices.is_empty();
        if let Some(vertex_buffer) = self.array_buffers.handle(id) {
            let element_buffer = self.element_buffers.handle(id);
            if element_buffer.is_some() == indexed {
                backend.update_buffer(vertex_buffer, geometry.vertices)?;
                if let Some(element_buffer) = element_buffer {
                    backend.update_buffer(element_buffer, geometry.indices)?;
                    self.element_buffers.insert(id, element_buffer, modified);
                }
                self.array_buffers.insert(id, vertex_buffer, modified);
                if let Some(vertex_array) = self.vertex_arrays.handle(id) {
                    self.vertex_arrays.insert(id, vertex_array, modified);
                }
                log::debug!("Updated geometry {}", id);
                return Ok(());
            }
        }

        // New, or switching between indexed and non-indexed: build a fresh
        // set and only then release the old one.
        let mut created = Created::default();
        let (vertex_buffer, element_buffer, vertex_array) =
            match Self::create_geometry(backend, &geometry, &mut created) {
                Ok(handles) => handles,
                Err(err) => {
                    created.rollback(backend);
                    return Err(err);
                }
            };
        self.unload_geometry(backend, id);
        self.array_buffers.insert(id, vertex_buffer, modified);
        if let Some(element_buffer) = element_buffer {
            self.element_buffers.insert(id, element_buffer, modified);
        }
        self.vertex_arrays.insert(id, vertex_array, modified);
        log::debug!(
            "Uploaded geometry {} ({} vertex bytes, {} index bytes)",
            id,
            geometry.vertices.len(),
            geometry.indices.len()
        );
        Ok(())
    }

    fn create_geometry<B: Backend>(
        backend: &mut B,
        geometry: &Geometry<'_>,
        created: &mut Created,
    ) -> Result<(BufferId, Option<BufferId>, VertexArrayId)> {
        let vertex_buffer = backend.create_buffer(BufferKind::Vertex, geometry.vertices)?;
        created.buffers.push(vertex_buffer);

        let element_buffer = if geometry.indices.is_empty() {
            None
        } else {
            let buffer = backend.create_buffer(BufferKind::Index, geometry.indices)?;
            created.buffers.push(buffer);
            Some(buffer)
        };

        let vertex_array = backend.create_vertex_array(&VertexArrayDesc {
            layout: geometry.layout,
            vertex_buffer,
            index_buffer: element_buffer,
        })?;
        created.vertex_arrays.push(vertex_array);

        Ok((vertex_buffer, element_buffer, vertex_array))
    }

    pub(crate) fn unload_geometry<B: Backend>(&mut self, backend: &mut B, id: ResourceId) {
        if let Some(entry) = self.vertex_arrays.remove(id) {
            backend.destroy_vertex_array(entry.handle);
        }
        if let Some(entry) = self.array_buffers.remove(id) {
            backend.destroy_buffer(entry.handle);
        }
        if let Some(entry) = self.element_buffers.remove(id) {
            backend.destroy_buffer(entry.handle);
        }
    }

    pub(crate) fn load_texture<B: Backend>(&mut self, backend: &mut B, texture: &Texture) -> Result<TextureId> {
        let id = texture.id();
        if let Some(entry) = self.textures.get(id) {
            if entry.modified >= texture.modified() {
                return Ok(entry.handle);
            }
        }

        let desc = texture_desc(texture);
        let converted: Vec<Cow<'_, [u8]>> = texture
            .layers()
            .into_iter()
            .map(|layer| convert_pixels(texture.data().format, layer))
            .collect();
        let layers: Vec<&[u8]> = if converted.iter().all(|layer| layer.is_empty()) {
            Vec::new()
        } else {
            converted.iter().map(|layer| layer.as_ref()).collect()
        };

        let handle = match self.textures.handle(id) {
            Some(handle) => {
                backend.update_texture(handle, &desc, &layers)?;
                log::debug!("Updated texture {}", id);
                handle
            }
            None => {
                let handle = backend.create_texture(&desc, &layers)?;
                log::debug!("Uploaded texture {} ({}x{})", id, desc.width, desc.height);
                handle
            }
        };
        self.textures.insert(id, handle, texture.modified());
        Ok(handle)
    }

    pub(crate) fn unload_texture<B: Backend>(&mut self, backend: &mut B, id: ResourceId) {
        if let Some(entry) = self.textures.remove(id) {
            backend.destroy_texture(entry.handle);
            log::debug!("Unloaded texture {}", id);
        }
    }

    /// Loads the target's color texture and builds its frame buffer.
    pub(crate) fn load_texture_target<B: Backend>(
        &mut self,
        backend: &mut B,
        target: &TextureTarget,
    ) -> Result<TextureId> {
        let texture_existed = self.textures.contains(target.texture().id());
        let texture = self.load_texture(backend, target.texture())?;
        let id = target.id();
        let modified = target.texture().modified();
        if self.frame_buffers.is_current(id, modified) {
            return Ok(texture);
        }

        let (width, height) = target.size();
        let mut created = Created::default();
        let result = Self::create_target(backend, texture, width, height, &mut created);
        match result {
            Ok((frame_buffer, render_buffer)) => {
                self.unload_target_buffers(backend, id);
                self.frame_buffers.insert(id, frame_buffer, modified);
                self.render_buffers.insert(id, render_buffer, modified);
                log::debug!("Created texture target {} ({}x{})", id, width, height);
                Ok(texture)
            }
            Err(err) => {
                created.rollback(backend);
                if !texture_existed {
                    self.unload_texture(backend, target.texture().id());
                }
                Err(err)
            }
        }
    }

    fn create_target<B: Backend>(
        backend: &mut B,
        texture: TextureId,
        width: u32,
        height: u32,
        created: &mut Created,
    ) -> Result<(FrameBufferId, RenderBufferId)> {
        let depth = backend.create_render_buffer(&RenderBufferDesc {
            label: "TextureTargetDepth".into(),
            width,
            height,
            format: RenderBufferFormat::Depth,
            samples: 1,
        })?;
        created.render_buffers.push(depth);
        let frame_buffer = backend.create_frame_buffer(&FrameBufferDesc {
            label: "TextureTarget".into(),
            color: Some(Attachment::Texture { texture, layer: 0 }),
            depth: Some(depth),
        })?;
        Ok((frame_buffer, depth))
    }

    fn unload_target_buffers<B: Backend>(&mut self, backend: &mut B, id: ResourceId) {
        if let Some(entry) = self.frame_buffers.remove(id) {
            backend.destroy_frame_buffer(entry.handle);
        }
        if let Some(entry) = self.render_buffers.remove(id) {
            backend.destroy_render_buffer(entry.handle);
        }
    }

    pub(crate) fn unload_texture_target<B: Backend>(&mut self, backend: &mut B, target: &TextureTarget) {
        self.unload_target_buffers(backend, target.id());
        self.unload_texture(backend, target.texture().id());
    }

    /// Releases everything in every pool.
    pub(crate) fn clear<B: Backend>(&mut self, backend: &mut B) {
        let released = self.sizes().total();
        for (_, entry) in self.frame_buffers.drain() {
            backend.destroy_frame_buffer(entry.handle);
        }
        for (_, entry) in self.render_buffers.drain() {
            backend.destroy_render_buffer(entry.handle);
        }
        for (_, entry) in self.vertex_arrays.drain() {
            backend.destroy_vertex_array(entry.handle);
        }
        for (_, entry) in self.array_buffers.drain() {
            backend.destroy_buffer(entry.handle);
        }
        for (_, entry) in self.element_buffers.drain() {
            backend.destroy_buffer(entry.handle);
        }
        for (_, entry) in self.textures.drain() {
            backend.destroy_texture(entry.handle);
        }
        log::debug!("Cleared {} pool entries", released);
    }
}

fn pixel_format(format: Format) -> PixelFormat {
    match format {
        Format::R8 => PixelFormat::R8,
        Format::Rg8 => PixelFormat::Rg8,
        Format::Rgb8 | Format::Rgba8 => PixelFormat::Rgba8,
        Format::Srgb8 | Format::Srgba8 => PixelFormat::Srgba8,
        Format::R16F => PixelFormat::R16F,
        Format::Rg16F => PixelFormat::Rg16F,
        Format::Rgb16F | Format::Rgba16F | Format::Rgb32F | Format::Rgba32F => PixelFormat::Rgba16F,
    }
}

pub(crate) fn texture_desc(texture: &Texture) -> TextureDesc {
    let data = texture.data();
    let empty = texture.layers().iter().all(|layer| layer.is_empty());
    let mut usage = TextureUsage::SAMPLED;
    if empty {
        usage |= TextureUsage::RENDER_TARGET;
    }
    TextureDesc {
        label: format!("Texture{}", data.id()),
        width: data.width,
        height: data.height,
        dimension: if texture.is_cube() {
            TextureDimension::Cube
        } else {
            TextureDimension::D2
        },
        format: pixel_format(data.format),
        wrap: data.wrap,
        filter: data.filter,
        usage,
    }
}

/// Converts one layer to the layout of [`pixel_format`]: three channel data
/// gains an opaque alpha channel and 32 bit floats are narrowed to halves.
fn convert_pixels(format: Format, pixels: &[u8]) -> Cow<'_, [u8]> {
    if pixels.is_empty() {
        return Cow::Borrowed(pixels);
    }
    match format {
        Format::Rgb8 | Format::Srgb8 => Cow::Owned(
            pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
                .collect(),
        ),
        Format::Rgb16F => {
            let one = f16::ONE.to_le_bytes();
            Cow::Owned(
                pixels
                    .chunks_exact(6)
                    .flat_map(|rgb| {
                        let mut rgba = [0u8; 8];
                        rgba[..6].copy_from_slice(rgb);
                        rgba[6..].copy_from_slice(&one);
                        rgba
                    })
                    .collect(),
            )
        }
        Format::Rgb32F | Format::Rgba32F => {
            let channels = if format == Format::Rgb32F { 3 } else { 4 };
            Cow::Owned(
                pixels
                    .chunks_exact(channels * 4)
                    .flat_map(|pixel| {
                        let mut rgba = [f16::ONE; 4];
                        for (channel, bytes) in pixel.chunks_exact(4).enumerate() {
                            rgba[channel] = f16::from_f32(bytemuck::pod_read_unaligned(bytes));
                        }
                        rgba.into_iter().flat_map(f16::to_le_bytes)
                    })
                    .collect(),
            )
        }
        _ => Cow::Borrowed(pixels),
    }
}
