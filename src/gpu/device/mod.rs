//! [`Backend`] implementation on top of `wgpu`.
//!
//! Programs are pairs of WGSL modules with `vs_main` and `fs_main` entry
//! points. Group 0 binding 0 is the program's uniform block, bound with a
//! dynamic offset into one ring buffer written once per frame. Group 1 holds
//! a texture and a sampler per slot, at bindings `2 * slot` and
//! `2 * slot + 1`. Pipelines are created on first use for each combination
//! of program, fixed-function state and target format.

mod context;
mod pipeline_builder;

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use self::context::GpuContext;
use self::pipeline_builder::PipelineBuilder;
use super::backend::{
    check_complete, Attachment, AttachmentInfo, Backend, BufferId, BufferKind, FrameBufferDesc,
    FrameBufferId, PixelFormat, ProgramDesc, ProgramId, RenderBufferDesc, RenderBufferFormat,
    RenderBufferId, TextureDesc, TextureDimension, TextureId, TextureUsage, VertexArrayDesc,
    VertexArrayId, VertexLayout, MAX_UNIFORM_BLOCK_SIZE,
};
use super::command::{Blend, Command, Draw, Frame, Pass, PassTarget, PipelineState, Topology};
use super::slots::Slots;
use crate::asset::{Filter, Wrap};
use crate::error::{RenderError, Result, ShaderStage};
use crate::settings::RenderSettings;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const UNIFORM_ALIGNMENT: usize = 256;
const INITIAL_UNIFORM_CAPACITY: u64 = 64 * 1024;

static MESH_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
    3 => Float32x2,
    4 => Float32
];
static POINT_ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32,
    2 => Float32x4
];
static POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
static QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2
];

fn vertex_buffer_layout(layout: VertexLayout) -> wgpu::VertexBufferLayout<'static> {
    let attributes: &'static [wgpu::VertexAttribute] = match layout {
        VertexLayout::Mesh => &MESH_ATTRIBUTES,
        VertexLayout::Point => &POINT_ATTRIBUTES,
        VertexLayout::Position => &POSITION_ATTRIBUTES,
        VertexLayout::Quad => &QUAD_ATTRIBUTES,
    };
    wgpu::VertexBufferLayout {
        array_stride: layout.stride() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        PixelFormat::Rg8 => wgpu::TextureFormat::Rg8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Srgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::R16F => wgpu::TextureFormat::R16Float,
        PixelFormat::Rg16F => wgpu::TextureFormat::Rg16Float,
        PixelFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::Repeat => wgpu::AddressMode::Repeat,
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Linear => wgpu::FilterMode::Linear,
        Filter::Closest => wgpu::FilterMode::Nearest,
    }
}

fn blend_state(blend: Blend) -> Option<wgpu::BlendState> {
    match blend {
        Blend::Opaque => None,
        Blend::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        Blend::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

fn topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::Points => wgpu::PrimitiveTopology::PointList,
    }
}

fn clear_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: color[0] as f64,
        g: color[1] as f64,
        b: color[2] as f64,
        a: color[3] as f64,
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

struct GpuBuffer {
    kind: BufferKind,
    buffer: wgpu::Buffer,
}

struct GpuTexture {
    desc: TextureDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    layer_views: Vec<wgpu::TextureView>,
    sampler: wgpu::Sampler,
}

struct GpuRenderBuffer {
    desc: RenderBufferDesc,
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuFrameBuffer {
    desc: FrameBufferDesc,
    info: AttachmentInfo,
    color_format: Option<wgpu::TextureFormat>,
}

struct GpuProgram {
    name: String,
    layout: VertexLayout,
    textures: Vec<TextureDimension>,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u64) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("UniformRing"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("UniformRingBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(MAX_UNIFORM_BLOCK_SIZE as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }
}

/// Color format, depth and sample count of whatever a pass renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TargetSignature {
    color: Option<wgpu::TextureFormat>,
    depth: bool,
    samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    layout: VertexLayout,
    state: PipelineState,
    target: TargetSignature,
}

struct Offscreen {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

pub struct WgpuBackend {
    context: GpuContext,
    buffers: Slots<GpuBuffer>,
    vertex_arrays: Slots<VertexArrayDesc>,
    textures: Slots<GpuTexture>,
    render_buffers: Slots<GpuRenderBuffer>,
    frame_buffers: Slots<GpuFrameBuffer>,
    programs: Slots<GpuProgram>,
    uniform_layout: wgpu::BindGroupLayout,
    uniforms: UniformRing,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    texture_bind_groups: HashMap<(ProgramId, Vec<TextureId>), wgpu::BindGroup>,
    offscreen: Option<Offscreen>,
}

impl WgpuBackend {
    /// Renders the screen into the window's surface.
    pub async fn new(window: Arc<Window>, settings: &RenderSettings) -> Result<Self> {
        let context = GpuContext::new(Some(window), settings).await?;
        Ok(Self::with_context(context))
    }

    /// Renders the screen into an offscreen image.
    pub async fn headless(settings: &RenderSettings) -> Result<Self> {
        let context = GpuContext::new(None, settings).await?;
        Ok(Self::with_context(context))
    }

    fn with_context(context: GpuContext) -> Self {
        let uniform_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("UniformLayout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });
        let uniforms =
            UniformRing::new(&context.device, &uniform_layout, INITIAL_UNIFORM_CAPACITY);

        Self {
            context,
            buffers: Slots::new(),
            vertex_arrays: Slots::new(),
            textures: Slots::new(),
            render_buffers: Slots::new(),
            frame_buffers: Slots::new(),
            programs: Slots::new(),
            uniform_layout,
            uniforms,
            pipelines: HashMap::new(),
            texture_bind_groups: HashMap::new(),
            offscreen: None,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
    }

    fn compile(&self, program: &str, stage: ShaderStage, source: &str) -> Result<wgpu::ShaderModule> {
        let device = &self.context.device;
        let label = format!("{program}.{stage}");
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(error) => Err(RenderError::ShaderCompile {
                program: program.to_string(),
                stage,
                log: error.to_string(),
            }),
            None => Ok(module),
        }
    }

    fn build_texture(&self, desc: &TextureDesc, layers: &[&[u8]]) -> GpuTexture {
        let device = &self.context.device;
        let format = texture_format(desc.format);
        let layer_count = desc.dimension.layers();
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.usage.contains(TextureUsage::RENDER_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: layer_count,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        self.write_layers(&texture, desc, layers);

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            array_layer_count: Some(layer_count),
            ..Default::default()
        });
        let layer_views = (0..layer_count)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("{}Layer{layer}", desc.label)),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&desc.label),
            address_mode_u: address_mode(desc.wrap),
            address_mode_v: address_mode(desc.wrap),
            address_mode_w: address_mode(desc.wrap),
            mag_filter: filter_mode(desc.filter),
            min_filter: filter_mode(desc.filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        GpuTexture {
            desc: desc.clone(),
            texture,
            view,
            layer_views,
            sampler,
        }
    }

    fn write_layers(&self, texture: &wgpu::Texture, desc: &TextureDesc, layers: &[&[u8]]) {
        let bytes_per_row = desc.width * desc.format.bytes_per_pixel() as u32;
        for (layer, data) in layers.iter().enumerate() {
            if data.is_empty() {
                continue;
            }
            self.context.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(desc.height),
                },
                wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn attachment_info(&self, attachment: Attachment) -> Result<(AttachmentInfo, wgpu::TextureFormat)> {
        match attachment {
            Attachment::Texture { texture, layer } => {
                let stored = self
                    .textures
                    .get(texture.raw())
                    .ok_or_else(|| texture.invalid())?;
                if layer >= stored.desc.dimension.layers() {
                    return Err(texture.invalid());
                }
                let info = AttachmentInfo {
                    width: stored.desc.width,
                    height: stored.desc.height,
                    samples: 1,
                    depth: false,
                };
                Ok((info, texture_format(stored.desc.format)))
            }
            Attachment::RenderBuffer(render_buffer) => self.render_buffer_info(render_buffer),
        }
    }

    fn render_buffer_info(
        &self,
        render_buffer: RenderBufferId,
    ) -> Result<(AttachmentInfo, wgpu::TextureFormat)> {
        let stored = self
            .render_buffers
            .get(render_buffer.raw())
            .ok_or_else(|| render_buffer.invalid())?;
        let format = match stored.desc.format {
            RenderBufferFormat::Depth => DEPTH_FORMAT,
            RenderBufferFormat::Color(format) => texture_format(format),
        };
        let info = AttachmentInfo {
            width: stored.desc.width,
            height: stored.desc.height,
            samples: stored.desc.samples,
            depth: stored.desc.format == RenderBufferFormat::Depth,
        };
        Ok((info, format))
    }

    fn color_view(&self, attachment: Attachment) -> Result<&wgpu::TextureView> {
        match attachment {
            Attachment::Texture { texture, layer } => self
                .textures
                .get(texture.raw())
                .and_then(|stored| stored.layer_views.get(layer as usize))
                .ok_or_else(|| texture.invalid()),
            Attachment::RenderBuffer(render_buffer) => self
                .render_buffers
                .get(render_buffer.raw())
                .map(|stored| &stored.view)
                .ok_or_else(|| render_buffer.invalid()),
        }
    }

    fn target_signature(&self, target: PassTarget) -> Result<TargetSignature> {
        match target {
            PassTarget::Screen => Ok(TargetSignature {
                color: Some(self.context.screen_format()),
                depth: false,
                samples: 1,
            }),
            PassTarget::FrameBuffer(frame_buffer) => {
                let stored = self
                    .frame_buffers
                    .get(frame_buffer.raw())
                    .ok_or_else(|| frame_buffer.invalid())?;
                Ok(TargetSignature {
                    color: stored.color_format,
                    depth: stored.info.depth,
                    samples: stored.info.samples,
                })
            }
        }
    }

    fn pipeline_key(&self, draw: &Draw, target: TargetSignature) -> Result<PipelineKey> {
        let vertex_array = self
            .vertex_arrays
            .get(draw.vertex_array.raw())
            .ok_or_else(|| draw.vertex_array.invalid())?;
        Ok(PipelineKey {
            program: draw.program,
            layout: vertex_array.layout,
            state: draw.state,
            target,
        })
    }

    fn ensure_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(key.program.raw())
            .ok_or_else(|| key.program.invalid())?;
        if program.layout != key.layout {
            return Err(RenderError::ProgramLink {
                program: program.name.clone(),
                log: format!(
                    "expects {:?} vertices, vertex array provides {:?}",
                    program.layout, key.layout
                ),
            });
        }

        let device = &self.context.device;
        let mut builder = PipelineBuilder::new(
            device,
            &program.pipeline_layout,
            &program.vertex,
            &program.fragment,
        )
        .with_label(&program.name)
        .with_vertex_buffer(vertex_buffer_layout(key.layout))
        .with_topology(topology(key.state.topology))
        .with_multisample(key.target.samples);
        if let Some(format) = key.target.color {
            builder = builder.with_color_target(format, blend_state(key.state.blend));
        }
        if key.target.depth {
            let compare = if key.state.depth_test {
                wgpu::CompareFunction::LessEqual
            } else {
                wgpu::CompareFunction::Always
            };
            builder = builder.with_depth_stencil(DEPTH_FORMAT, key.state.depth_write, compare);
        }
        if !key.state.cull_back {
            builder = builder.with_no_culling();
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = builder.build();
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ProgramLink {
                program: program.name.clone(),
                log: error.to_string(),
            });
        }
        log::debug!("Created pipeline for {} ({:?})", program.name, key.state);
        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn ensure_texture_bind_group(&mut self, draw: &Draw) -> Result<()> {
        let key = (draw.program, draw.textures.clone());
        if self.texture_bind_groups.contains_key(&key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(draw.program.raw())
            .ok_or_else(|| draw.program.invalid())?;

        let mut entries = Vec::with_capacity(draw.textures.len() * 2);
        for (slot, texture) in draw.textures.iter().enumerate() {
            let stored = self
                .textures
                .get(texture.raw())
                .ok_or_else(|| texture.invalid())?;
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * slot as u32,
                resource: wgpu::BindingResource::TextureView(&stored.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * slot as u32 + 1,
                resource: wgpu::BindingResource::Sampler(&stored.sampler),
            });
        }

        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&program.name),
                layout: &program.texture_layout,
                entries: &entries,
            });
        self.texture_bind_groups.insert(key, bind_group);
        Ok(())
    }

    /// Packs every draw's uniform block into the ring and returns the
    /// per-draw offsets in submission order.
    fn upload_uniforms(&mut self, frame: &Frame) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(frame.draw_count());
        let mut staging: Vec<u8> = Vec::new();
        for pass in frame.passes() {
            for draw in &pass.draws {
                offsets.push(staging.len() as u32);
                staging.extend_from_slice(&draw.uniforms);
                staging.resize(align_up(staging.len(), UNIFORM_ALIGNMENT), 0);
            }
        }

        let required = (staging.len() + MAX_UNIFORM_BLOCK_SIZE) as u64;
        if required > self.uniforms.capacity {
            let capacity = required.next_power_of_two();
            log::debug!("Growing uniform ring to {} bytes", capacity);
            self.uniforms = UniformRing::new(&self.context.device, &self.uniform_layout, capacity);
        }
        if !staging.is_empty() {
            self.context
                .queue
                .write_buffer(&self.uniforms.buffer, 0, &staging);
        }
        offsets
    }

    fn ensure_offscreen(&mut self, size: (u32, u32)) {
        let size = (size.0.max(1), size.1.max(1));
        if self
            .offscreen
            .as_ref()
            .is_some_and(|offscreen| offscreen.size.0 >= size.0 && offscreen.size.1 >= size.1)
        {
            return;
        }
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("OffscreenScreen"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: context::OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.offscreen = Some(Offscreen {
            _texture: texture,
            view,
            size,
        });
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &Pass,
        screen: Option<(&wgpu::TextureView, (u32, u32))>,
        offsets: &[u32],
    ) -> Result<()> {
        let target = self.target_signature(pass.target)?;
        let (color_view, depth_view, extent) = match pass.target {
            PassTarget::Screen => {
                let (view, extent) = screen.ok_or_else(|| {
                    RenderError::Context("screen pass without a screen image".into())
                })?;
                (Some(view), None, extent)
            }
            PassTarget::FrameBuffer(frame_buffer) => {
                let stored = self
                    .frame_buffers
                    .get(frame_buffer.raw())
                    .ok_or_else(|| frame_buffer.invalid())?;
                let color = stored
                    .desc
                    .color
                    .map(|attachment| self.color_view(attachment))
                    .transpose()?;
                let depth = stored
                    .desc
                    .depth
                    .map(|render_buffer| {
                        self.render_buffers
                            .get(render_buffer.raw())
                            .map(|stored| &stored.view)
                            .ok_or_else(|| render_buffer.invalid())
                    })
                    .transpose()?;
                (color, depth, (stored.info.width, stored.info.height))
            }
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
            .map(|view| wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: pass
                        .clear
                        .color
                        .map_or(wgpu::LoadOp::Load, |color| wgpu::LoadOp::Clear(clear_color(color))),
                    store: wgpu::StoreOp::Store,
                },
            })
            .into_iter()
            .map(Some)
            .collect();
        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: pass.clear.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.kind.label()),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let width = pass.viewport.0.clamp(1, extent.0.max(1));
        let height = pass.viewport.1.clamp(1, extent.1.max(1));
        render_pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

        for (draw, offset) in pass.draws.iter().zip(offsets) {
            let key = self.pipeline_key(draw, target)?;
            let pipeline = self.pipelines.get(&key).ok_or_else(|| draw.program.invalid())?;
            let textures = self
                .texture_bind_groups
                .get(&(draw.program, draw.textures.clone()))
                .ok_or_else(|| draw.program.invalid())?;
            let vertex_array = self
                .vertex_arrays
                .get(draw.vertex_array.raw())
                .ok_or_else(|| draw.vertex_array.invalid())?;
            let vertices = self
                .buffers
                .get(vertex_array.vertex_buffer.raw())
                .ok_or_else(|| vertex_array.vertex_buffer.invalid())?;

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.uniforms.bind_group, &[*offset]);
            render_pass.set_bind_group(1, textures, &[]);
            render_pass.set_vertex_buffer(0, vertices.buffer.slice(..));

            if draw.range.indexed {
                let index_buffer = vertex_array.index_buffer.ok_or_else(|| draw.vertex_array.invalid())?;
                let indices = self
                    .buffers
                    .get(index_buffer.raw())
                    .ok_or_else(|| index_buffer.invalid())?;
                render_pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..draw.range.count, 0, 0..1);
            } else {
                render_pass.draw(0..draw.range.count, 0..1);
            }
        }
        Ok(())
    }

    fn encode_resolve(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        source: FrameBufferId,
        destination: FrameBufferId,
    ) -> Result<()> {
        let color_attachment = |frame_buffer: FrameBufferId| {
            self.frame_buffers
                .get(frame_buffer.raw())
                .and_then(|stored| stored.desc.color)
                .ok_or_else(|| frame_buffer.invalid())
        };
        let source_view = self.color_view(color_attachment(source)?)?;
        let destination_view = self.color_view(color_attachment(destination)?)?;

        let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ResolvePass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: source_view,
                depth_slice: None,
                resolve_target: Some(destination_view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> Result<BufferId> {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let buffer = if data.is_empty() {
            self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("EmptyBuffer"),
                size: wgpu::COPY_BUFFER_ALIGNMENT,
                usage,
                mapped_at_creation: false,
            })
        } else {
            self.context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(match kind {
                        BufferKind::Vertex => "VertexBuffer",
                        BufferKind::Index => "IndexBuffer",
                    }),
                    contents: data,
                    usage,
                })
        };
        Ok(BufferId::from_raw(self.buffers.insert(GpuBuffer { kind, buffer })))
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let fits = self
            .buffers
            .get(buffer.raw())
            .ok_or_else(|| buffer.invalid())?
            .buffer
            .size()
            >= data.len() as u64;
        let aligned = data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0;

        if fits && aligned {
            if let Some(stored) = self.buffers.get(buffer.raw()) {
                self.context.queue.write_buffer(&stored.buffer, 0, data);
            }
            return Ok(());
        }

        let Some(kind) = self.buffers.get(buffer.raw()).map(|stored| stored.kind) else {
            return Err(buffer.invalid());
        };
        let replacement = self.create_buffer(kind, data)?;
        if let Some(stored) = self.buffers.remove(replacement.raw()) {
            if let Some(slot) = self.buffers.get_mut(buffer.raw()) {
                *slot = stored;
            }
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(stored) = self.buffers.remove(buffer.raw()) {
            stored.buffer.destroy();
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDesc) -> Result<VertexArrayId> {
        if !self.buffers.contains(desc.vertex_buffer.raw()) {
            return Err(desc.vertex_buffer.invalid());
        }
        if let Some(index_buffer) = desc.index_buffer {
            if !self.buffers.contains(index_buffer.raw()) {
                return Err(index_buffer.invalid());
            }
        }
        Ok(VertexArrayId::from_raw(self.vertex_arrays.insert(*desc)))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(vertex_array.raw());
    }

    fn create_texture(&mut self, desc: &TextureDesc, layers: &[&[u8]]) -> Result<TextureId> {
        desc.check_layers(layers)?;
        let texture = self.build_texture(desc, layers);
        Ok(TextureId::from_raw(self.textures.insert(texture)))
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
            .get(texture.raw())
            .ok_or_else(|| texture.invalid())?;

        if stored.desc == *desc {
            self.write_layers(&stored.texture, desc, layers);
            return Ok(());
        }

        let rebuilt = self.build_texture(desc, layers);
        if let Some(slot) = self.textures.get_mut(texture.raw()) {
            *slot = rebuilt;
        }
        self.texture_bind_groups
            .retain(|(_, textures), _| !textures.contains(&texture));
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture.raw());
        self.texture_bind_groups
            .retain(|(_, textures), _| !textures.contains(&texture));
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<RenderBufferId> {
        let format = match desc.format {
            RenderBufferFormat::Depth => DEPTH_FORMAT,
            RenderBufferFormat::Color(format) => texture_format(format),
        };
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: desc.samples.max(1),
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.render_buffers.insert(GpuRenderBuffer {
            desc: desc.clone(),
            _texture: texture,
            view,
        });
        Ok(RenderBufferId::from_raw(id))
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
        let info = check_complete(
            &desc.label,
            color.map(|(info, _)| info),
            depth.map(|(info, _)| info),
        )?;

        let id = self.frame_buffers.insert(GpuFrameBuffer {
            desc: desc.clone(),
            info,
            color_format: color.map(|(_, format)| format),
        });
        Ok(FrameBufferId::from_raw(id))
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferId) {
        self.frame_buffers.remove(frame_buffer.raw());
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId> {
        if desc.uniform_size > MAX_UNIFORM_BLOCK_SIZE {
            return Err(RenderError::ProgramLink {
                program: desc.name.to_string(),
                log: format!(
                    "uniform block of {} bytes exceeds {}",
                    desc.uniform_size, MAX_UNIFORM_BLOCK_SIZE
                ),
            });
        }

        let vertex = self.compile(desc.name, ShaderStage::Vertex, desc.vertex_source)?;
        let fragment = self.compile(desc.name, ShaderStage::Fragment, desc.fragment_source)?;

        let device = &self.context.device;
        let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .textures
            .iter()
            .enumerate()
            .flat_map(|(slot, dimension)| {
                let view_dimension = match dimension {
                    TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                    TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                };
                [
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * slot as u32,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2 * slot as u32 + 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ]
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.name),
            bind_group_layouts: &[&self.uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let id = ProgramId::from_raw(self.programs.insert(GpuProgram {
            name: desc.name.to_string(),
            layout: desc.layout,
            textures: desc.textures.to_vec(),
            vertex,
            fragment,
            texture_layout,
            pipeline_layout,
        }));

        // Link against a representative target so interface mismatches
        // between the stages fail here rather than mid-frame.
        let probe = PipelineKey {
            program: id,
            layout: desc.layout,
            state: PipelineState::OPAQUE,
            target: TargetSignature {
                color: Some(wgpu::TextureFormat::Rgba16Float),
                depth: true,
                samples: 1,
            },
        };
        if let Err(err) = self.ensure_pipeline(probe) {
            self.programs.remove(id.raw());
            return Err(err);
        }
        log::info!("Created program '{}'", desc.name);
        Ok(id)
    }

    fn submit(&mut self, frame: &Frame) -> Result<()> {
        let mut screen_size: Option<(u32, u32)> = None;
        for pass in frame.passes() {
            let target = self.target_signature(pass.target)?;
            for draw in &pass.draws {
                let program = self
                    .programs
                    .get(draw.program.raw())
                    .ok_or_else(|| draw.program.invalid())?;
                if program.textures.len() != draw.textures.len() {
                    return Err(RenderError::InvalidData {
                        what: "draw",
                        reason: format!(
                            "{} binds {} textures, program declares {}",
                            program.name,
                            draw.textures.len(),
                            program.textures.len()
                        ),
                    });
                }
                let key = self.pipeline_key(draw, target)?;
                self.ensure_pipeline(key)?;
                self.ensure_texture_bind_group(draw)?;
            }
            if pass.target == PassTarget::Screen {
                let (width, height) = screen_size.unwrap_or((1, 1));
                screen_size = Some((width.max(pass.viewport.0), height.max(pass.viewport.1)));
            }
        }

        let offsets = self.upload_uniforms(frame);

        let surface_texture = match (&self.context.surface, screen_size) {
            (Some(state), Some(_)) => match state.surface.get_current_texture() {
                Ok(texture) => Some(texture),
                Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    self.context.reconfigure();
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            },
            _ => None,
        };
        if let (None, Some(size)) = (&surface_texture, screen_size) {
            self.ensure_offscreen(size);
        }
        let surface_view = surface_texture.as_ref().map(|texture| {
            let size = texture.texture.size();
            (
                texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                (size.width, size.height),
            )
        });
        let screen = match &surface_view {
            Some((view, size)) => Some((view, *size)),
            None => self
                .offscreen
                .as_ref()
                .map(|offscreen| (&offscreen.view, offscreen.size)),
        };

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("FrameEncoder"),
                });

        let mut first_draw = 0;
        for command in frame.commands() {
            match command {
                Command::Pass(pass) => {
                    self.encode_pass(&mut encoder, pass, screen, &offsets[first_draw..])?;
                    first_draw += pass.draws.len();
                }
                Command::Resolve {
                    source,
                    destination,
                } => self.encode_resolve(&mut encoder, *source, *destination)?,
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        if let Some(texture) = surface_texture {
            texture.present();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_strides_match_attribute_sizes() {
        for layout in [
            VertexLayout::Mesh,
            VertexLayout::Point,
            VertexLayout::Position,
            VertexLayout::Quad,
        ] {
            let buffer = vertex_buffer_layout(layout);
            let last = buffer
                .attributes
                .iter()
                .max_by_key(|attribute| attribute.offset)
                .expect("attributes");
            assert_eq!(last.offset + last.format.size(), buffer.array_stride);
        }
    }

    #[test]
    fn mesh_stride_matches_vertex_struct() {
        assert_eq!(
            VertexLayout::Mesh.stride(),
            std::mem::size_of::<crate::asset::Vertex>()
        );
        assert_eq!(
            VertexLayout::Point.stride(),
            std::mem::size_of::<crate::scene::Point>()
        );
    }

    #[test]
    fn uniform_offsets_are_aligned() {
        assert_eq!(align_up(0, UNIFORM_ALIGNMENT), 0);
        assert_eq!(align_up(1, UNIFORM_ALIGNMENT), 256);
        assert_eq!(align_up(256, UNIFORM_ALIGNMENT), 256);
        assert_eq!(align_up(1300, UNIFORM_ALIGNMENT), 1536);
    }
}
