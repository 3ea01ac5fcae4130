//! Render targets, all created up front when the renderer is built.

use crate::asset::{Filter, Wrap};
use crate::error::Result;
use crate::gpu::{
    Attachment, Backend, FrameBufferDesc, FrameBufferId, PassTarget, PixelFormat,
    RenderBufferDesc, RenderBufferFormat, RenderBufferId, TextureDesc, TextureDimension,
    TextureId, TextureUsage,
};
use crate::renderer::cascades::CASCADE_COUNT;
use crate::scene::{MAX_ENVIRONMENT_LIGHTS, MAX_SPOT_LIGHTS};
use crate::settings::RenderSettings;

/// Color format of every offscreen target.
pub(crate) const TARGET_FORMAT: PixelFormat = PixelFormat::Rgba16F;

fn target_texture(label: &str, width: u32, height: u32, dimension: TextureDimension) -> TextureDesc {
    TextureDesc {
        label: label.to_string(),
        width,
        height,
        dimension,
        format: TARGET_FORMAT,
        wrap: Wrap::ClampToEdge,
        filter: Filter::Linear,
        usage: TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
    }
}

fn depth_buffer(label: &str, width: u32, height: u32, samples: u32) -> RenderBufferDesc {
    RenderBufferDesc {
        label: format!("{label}Depth"),
        width,
        height,
        format: RenderBufferFormat::Depth,
        samples,
    }
}

/// A color texture that later passes sample, with an optional depth buffer.
///
/// Used for the resolved scene (standard target), the bloom ping-pong pair,
/// shadow maps and their blur buffers.
pub(crate) struct RenderTarget {
    pub(crate) frame_buffer: FrameBufferId,
    pub(crate) texture: TextureId,
    depth: Option<RenderBufferId>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl RenderTarget {
    pub(crate) fn new<B: Backend>(
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        with_depth: bool,
    ) -> Result<Self> {
        let texture =
            backend.create_texture(&target_texture(label, width, height, TextureDimension::D2), &[])?;
        let depth = if with_depth {
            Some(backend.create_render_buffer(&depth_buffer(label, width, height, 1))?)
        } else {
            None
        };
        let frame_buffer = backend.create_frame_buffer(&FrameBufferDesc {
            label: label.to_string(),
            color: Some(Attachment::Texture { texture, layer: 0 }),
            depth,
        })?;
        log::info!("Created render target '{}' ({}x{})", label, width, height);
        Ok(Self {
            frame_buffer,
            texture,
            depth,
            width,
            height,
        })
    }

    pub(crate) fn target(&self) -> PassTarget {
        PassTarget::FrameBuffer(self.frame_buffer)
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// One texel in uv space.
    pub(crate) fn texel(&self) -> [f32; 2] {
        [1.0 / self.width.max(1) as f32, 1.0 / self.height.max(1) as f32]
    }

    fn destroy<B: Backend>(&self, backend: &mut B) {
        backend.destroy_frame_buffer(self.frame_buffer);
        if let Some(depth) = self.depth {
            backend.destroy_render_buffer(depth);
        }
        backend.destroy_texture(self.texture);
    }
}

/// Multisampled color and depth that the scene is drawn into and then
/// resolved from.
pub(crate) struct BlitTarget {
    pub(crate) frame_buffer: FrameBufferId,
    color: RenderBufferId,
    depth: RenderBufferId,
}

impl BlitTarget {
    pub(crate) fn new<B: Backend>(backend: &mut B, width: u32, height: u32, samples: u32) -> Result<Self> {
        let label = "BlitTarget";
        let color = backend.create_render_buffer(&RenderBufferDesc {
            label: format!("{label}Color"),
            width,
            height,
            format: RenderBufferFormat::Color(TARGET_FORMAT),
            samples,
        })?;
        let depth = backend.create_render_buffer(&depth_buffer(label, width, height, samples))?;
        let frame_buffer = backend.create_frame_buffer(&FrameBufferDesc {
            label: label.to_string(),
            color: Some(Attachment::RenderBuffer(color)),
            depth: Some(depth),
        })?;
        log::info!("Created render target '{}' ({}x{}, {} samples)", label, width, height, samples);
        Ok(Self {
            frame_buffer,
            color,
            depth,
        })
    }

    fn destroy<B: Backend>(&self, backend: &mut B) {
        backend.destroy_frame_buffer(self.frame_buffer);
        backend.destroy_render_buffer(self.color);
        backend.destroy_render_buffer(self.depth);
    }
}

/// Cube texture with one frame buffer per face, sharing a depth buffer.
pub(crate) struct EnvironmentMapTarget {
    pub(crate) texture: TextureId,
    faces: Vec<FrameBufferId>,
    depth: RenderBufferId,
    pub(crate) size: u32,
}

impl EnvironmentMapTarget {
    pub(crate) fn new<B: Backend>(backend: &mut B, label: &str, size: u32) -> Result<Self> {
        let texture =
            backend.create_texture(&target_texture(label, size, size, TextureDimension::Cube), &[])?;
        let depth = backend.create_render_buffer(&depth_buffer(label, size, size, 1))?;
        let faces = (0..TextureDimension::Cube.layers())
            .map(|layer| {
                backend.create_frame_buffer(&FrameBufferDesc {
                    label: format!("{label}Face{layer}"),
                    color: Some(Attachment::Texture { texture, layer }),
                    depth: Some(depth),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        log::info!("Created environment target '{}' ({}x{} per face)", label, size, size);
        Ok(Self {
            texture,
            faces,
            depth,
            size,
        })
    }

    pub(crate) fn face(&self, face: usize) -> Option<PassTarget> {
        self.faces.get(face).copied().map(PassTarget::FrameBuffer)
    }

    fn destroy<B: Backend>(&self, backend: &mut B) {
        for face in &self.faces {
            backend.destroy_frame_buffer(*face);
        }
        backend.destroy_render_buffer(self.depth);
        backend.destroy_texture(self.texture);
    }
}

/// Shadow maps of one kind plus the buffer their blur ping-pongs through.
pub(crate) struct ShadowMaps {
    pub(crate) maps: Vec<RenderTarget>,
    pub(crate) blur: RenderTarget,
}

impl ShadowMaps {
    fn new<B: Backend>(backend: &mut B, label: &str, count: usize, size: u32) -> Result<Self> {
        let maps = (0..count)
            .map(|index| RenderTarget::new(backend, &format!("{label}{index}"), size, size, true))
            .collect::<Result<Vec<_>>>()?;
        let blur = RenderTarget::new(backend, &format!("{label}Blur"), size, size, false)?;
        Ok(Self { maps, blur })
    }

    fn destroy<B: Backend>(&self, backend: &mut B) {
        for map in &self.maps {
            map.destroy(backend);
        }
        self.blur.destroy(backend);
    }
}

pub(crate) struct Targets {
    pub(crate) standard: RenderTarget,
    pub(crate) blit: Option<BlitTarget>,
    pub(crate) post: [RenderTarget; 2],
    pub(crate) cascades: ShadowMaps,
    pub(crate) spots: ShadowMaps,
    pub(crate) environments: Vec<EnvironmentMapTarget>,
}

impl Targets {
    pub(crate) fn new<B: Backend>(backend: &mut B, settings: &RenderSettings) -> Result<Self> {
        let resolution = settings.resolution;
        let post = settings.post_resolution();

        let standard = RenderTarget::new(backend, "StandardTarget", resolution.width, resolution.height, true)?;
        let blit = if settings.sample_count > 1 {
            Some(BlitTarget::new(
                backend,
                resolution.width,
                resolution.height,
                settings.sample_count,
            )?)
        } else {
            None
        };
        let post = [
            RenderTarget::new(backend, "PostTarget0", post.width, post.height, false)?,
            RenderTarget::new(backend, "PostTarget1", post.width, post.height, false)?,
        ];
        let cascades = ShadowMaps::new(backend, "CascadeShadowMap", CASCADE_COUNT, settings.cascade_map_size)?;
        let spots = ShadowMaps::new(backend, "SpotShadowMap", MAX_SPOT_LIGHTS, settings.shadow_map_size)?;
        let environments = (0..MAX_ENVIRONMENT_LIGHTS)
            .map(|index| {
                EnvironmentMapTarget::new(
                    backend,
                    &format!("EnvironmentMap{index}"),
                    settings.environment_map_size,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            standard,
            blit,
            post,
            cascades,
            spots,
            environments,
        })
    }

    /// Where the scene pass draws: the multisampled target when there is one.
    pub(crate) fn scene_target(&self) -> PassTarget {
        match &self.blit {
            Some(blit) => PassTarget::FrameBuffer(blit.frame_buffer),
            None => self.standard.target(),
        }
    }

    pub(crate) fn destroy<B: Backend>(&self, backend: &mut B) {
        self.standard.destroy(backend);
        if let Some(blit) = &self.blit {
            blit.destroy(backend);
        }
        for post in &self.post {
            post.destroy(backend);
        }
        self.cascades.destroy(backend);
        self.spots.destroy(backend);
        for environment in &self.environments {
            environment.destroy(backend);
        }
    }
}
