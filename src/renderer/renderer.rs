use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::asset::{Filter, Material, Mesh, Model, Texture, Wrap};
use crate::error::Result;
use crate::gpu::{
    Backend, Clear, Command, Draw, DrawRange, Frame, Pass, PassKind, PassTarget, PipelineState,
    PixelFormat, TextureDesc, TextureDimension, TextureId, TextureUsage, VertexArrayId,
};
use crate::renderer::cascades::{cascades, Cascade, CASCADE_COUNT};
use crate::renderer::geometry::StaticGeometry;
use crate::renderer::loadable::Loadable;
use crate::renderer::programs::{
    BoxUniforms, CloudUniforms, DepthUniforms, Programs, StandardProgram, StandardTextures,
    StandardUniforms,
};
use crate::renderer::resources::GpuResources;
use crate::renderer::shaders::ShaderLibrary;
use crate::renderer::targets::{RenderTarget, ShadowMaps, Targets};
use crate::scene::{CloudKind, Scene, MAX_ENVIRONMENT_LIGHTS, MAX_SPOT_LIGHTS};
use crate::settings::{RenderSettings, Resolution};

/// Shadow maps are cleared to the largest depth so unrendered texels read as lit.
const SHADOW_CLEAR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

const DEBUG_BOX_COLOR: Vec4 = Vec4::new(1.0, 0.8, 0.2, 1.0);

/// Counters for the last rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frame: u64,
    pub passes: usize,
    pub draw_calls: usize,
    pub shadow_draw_calls: usize,
    /// Models left out of the scene pass because their data is not on the GPU.
    pub models_skipped: usize,
}

/// Textures bound when nothing better is available.
struct DefaultTextures {
    white: TextureId,
    black: TextureId,
    black_cube: TextureId,
}

impl DefaultTextures {
    fn new<B: Backend>(backend: &mut B) -> Result<Self> {
        let desc = |label: &str, dimension| TextureDesc {
            label: label.to_string(),
            width: 1,
            height: 1,
            dimension,
            format: PixelFormat::Rgba8,
            wrap: Wrap::Repeat,
            filter: Filter::Closest,
            usage: TextureUsage::SAMPLED,
        };
        let white: &[u8] = &[255; 4];
        let black: &[u8] = &[0, 0, 0, 255];
        Ok(Self {
            white: backend.create_texture(&desc("DefaultWhite", TextureDimension::D2), &[white])?,
            black: backend.create_texture(&desc("DefaultBlack", TextureDimension::D2), &[black])?,
            black_cube: backend
                .create_texture(&desc("DefaultBlackCube", TextureDimension::Cube), &[black; 6])?,
        })
    }

    fn destroy<B: Backend>(&self, backend: &mut B) {
        backend.destroy_texture(self.white);
        backend.destroy_texture(self.black);
        backend.destroy_texture(self.black_cube);
    }
}

/// Light-dependent textures of the standard program.
#[derive(Clone, Copy)]
struct Lighting {
    environment: [TextureId; MAX_ENVIRONMENT_LIGHTS],
    spot_shadows: [TextureId; MAX_SPOT_LIGHTS],
    cascade_shadows: [TextureId; CASCADE_COUNT],
}

/// Everything a pass drawing models with the standard program needs.
struct ModelPass {
    view_projection: Mat4,
    uniforms: StandardUniforms,
    lighting: Lighting,
    /// Texture attached to the pass target, replaced by black when sampled.
    attached: Option<TextureId>,
}

/// Draw lists of one model pass.
#[derive(Default)]
struct ModelDraws {
    opaque: Vec<Draw>,
    transparent: Vec<Draw>,
    skipped: usize,
}

/// Owns the backend, every pooled GPU copy of scene data, the programs and
/// the render targets, and records one [`Frame`] per call to [`Renderer::render`].
pub struct Renderer<B: Backend> {
    backend: B,
    settings: RenderSettings,
    resources: GpuResources,
    programs: Programs,
    targets: Targets,
    defaults: DefaultTextures,
    quad: StaticGeometry,
    unit_box: StaticGeometry,
    frame_index: u64,
    stats: RendererStats,
}

impl<B: Backend> Renderer<B> {
    /// Compiles every program and creates every render target. Any failure
    /// here is fatal.
    pub fn new(mut backend: B, settings: &RenderSettings, shaders: &ShaderLibrary) -> Result<Self> {
        let settings = settings.clone().validate();
        let programs = Programs::new(&mut backend, shaders)?;
        let targets = Targets::new(&mut backend, &settings)?;
        let defaults = DefaultTextures::new(&mut backend)?;
        let quad = StaticGeometry::fullscreen_quad(&mut backend)?;
        let unit_box = StaticGeometry::unit_box(&mut backend)?;
        log::info!(
            "Renderer ready at {}x{}, {} samples",
            settings.resolution.width,
            settings.resolution.height,
            settings.sample_count
        );
        Ok(Self {
            backend,
            settings,
            resources: GpuResources::new(),
            programs,
            targets,
            defaults,
            quad,
            unit_box,
            frame_index: 0,
            stats: RendererStats::default(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn resources(&self) -> &GpuResources {
        &self.resources
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn last_frame_stats(&self) -> RendererStats {
        self.stats
    }

    /// Default white texture, bound wherever a material has no texture of
    /// its own for a slot that multiplies.
    pub fn default_white(&self) -> TextureId {
        self.defaults.white
    }

    pub fn default_black(&self) -> TextureId {
        self.defaults.black
    }

    /// Uploads `item` if it is new or stale and returns its handle.
    pub fn load<T: Loadable>(&mut self, item: &T) -> Result<T::Handle> {
        item.load(&mut self.resources, &mut self.backend)
    }

    /// Staleness-checked refresh for data that changes between frames.
    pub fn load_or_update<T: Loadable>(&mut self, item: &T) -> Result<()> {
        item.load(&mut self.resources, &mut self.backend).map(|_| ())
    }

    pub fn unload<T: Loadable>(&mut self, item: &T) {
        item.unload(&mut self.resources, &mut self.backend);
    }

    /// Releases every pooled object. Targets, programs and default textures
    /// stay.
    pub fn clear_buffers(&mut self) {
        self.resources.clear(&mut self.backend);
    }

    /// Releases everything the renderer created and hands the backend back.
    pub fn into_backend(mut self) -> B {
        self.resources.clear(&mut self.backend);
        self.targets.destroy(&mut self.backend);
        self.defaults.destroy(&mut self.backend);
        self.quad.destroy(&mut self.backend);
        self.unit_box.destroy(&mut self.backend);
        self.backend
    }

    /// Renders `scenes` in order and presents the composited result at
    /// `resolution`.
    pub fn render(
        &mut self,
        scenes: &[Scene],
        clear_color: [f32; 4],
        resolution: impl Into<Resolution>,
    ) -> Result<()> {
        let resolution = resolution.into();
        self.refresh(scenes);

        let mut frame = Frame::new();
        let mut models_skipped = 0;
        self.record_texture_targets(&mut frame, scenes, clear_color);
        for (index, scene) in scenes.iter().enumerate() {
            let cascades = self.record_cascaded_shadow_maps(&mut frame, scene);
            self.record_shadow_maps(&mut frame, scene);
            self.record_environment(&mut frame, scene, clear_color);
            let clear = if index == 0 {
                Clear::all(clear_color)
            } else {
                Clear::depth()
            };
            models_skipped += self.record_scene(&mut frame, scene, cascades.as_ref(), clear);
        }
        if let Some(blit) = &self.targets.blit {
            frame.push(Command::Resolve {
                source: blit.frame_buffer,
                destination: self.targets.standard.frame_buffer,
            });
        }
        self.record_post_processing(&mut frame, clear_color, resolution);

        self.backend.submit(&frame)?;

        self.stats = RendererStats {
            frame: self.frame_index,
            passes: frame.passes().count(),
            draw_calls: frame.draw_count(),
            shadow_draw_calls: frame
                .passes()
                .filter(|pass| pass.kind.is_shadow())
                .map(|pass| pass.draws.len())
                .sum(),
            models_skipped,
        };
        self.frame_index += 1;
        Ok(())
    }

    /// Brings every resource the scenes reference up to date. Failures are
    /// logged; the affected models are skipped when drawing.
    fn refresh(&mut self, scenes: &[Scene]) {
        for scene in scenes {
            for target in &scene.texture_targets {
                if let Err(err) = self.load_or_update(target) {
                    log::warn!("Texture target {} unavailable: {}", target.id(), err);
                }
            }
            for model in scene.models.iter().chain(scene.sky.as_ref()) {
                self.refresh_model(model);
            }
            for cloud in &scene.clouds {
                if let Err(err) = self.load_or_update(cloud) {
                    log::warn!("Skipping cloud {}: {}", cloud.id(), err);
                }
            }
        }
    }

    fn refresh_model(&mut self, model: &Model) {
        if let Some(mesh) = &model.mesh {
            if let Err(err) = self.load_or_update(mesh.as_ref()) {
                log::warn!("Skipping model '{}': {}", model.name, err);
            }
        }
        for texture in model.material.textures() {
            if let Err(err) = self.load_or_update(texture.as_ref()) {
                log::warn!("Texture {} of model '{}' unavailable: {}", texture.id(), model.name, err);
            }
        }
        for child in &model.models {
            self.refresh_model(child);
        }
    }

    fn mesh_range(&self, mesh: &Mesh) -> Option<(VertexArrayId, DrawRange)> {
        let vertex_array = self.resources.vertex_array(mesh.id())?;
        let indexed = !mesh.indices().is_empty();
        if indexed != self.resources.element_buffer(mesh.id()).is_some() {
            return None;
        }
        let count = if indexed {
            mesh.indices().len()
        } else {
            mesh.vertices().len()
        };
        (count > 0).then_some((
            vertex_array,
            DrawRange {
                count: count as u32,
                indexed,
            },
        ))
    }

    fn white_lighting(&self) -> Lighting {
        Lighting {
            environment: [self.defaults.black_cube; MAX_ENVIRONMENT_LIGHTS],
            spot_shadows: [self.defaults.white; MAX_SPOT_LIGHTS],
            cascade_shadows: [self.defaults.white; CASCADE_COUNT],
        }
    }

    /// Texture for one material slot. A texture that is not loaded falls
    /// back to `fallback`.
    fn slot(
        &self,
        texture: Option<&Arc<Texture>>,
        fallback: TextureId,
        attached: Option<TextureId>,
    ) -> TextureId {
        let id = match texture {
            Some(texture) => self.resources.texture(texture.id()).unwrap_or_else(|| {
                log::warn!("Texture {} is not loaded, drawing with a default", texture.id());
                fallback
            }),
            None => fallback,
        };
        if attached == Some(id) {
            self.defaults.black
        } else {
            id
        }
    }

    fn material_textures(&self, material: &Material, pass: &ModelPass) -> StandardTextures {
        let white = self.defaults.white;
        let black = self.defaults.black;
        StandardTextures {
            albedo: self.slot(material.albedo.texture.as_ref(), white, pass.attached),
            normal: self.slot(material.normal.as_ref(), black, pass.attached),
            metallic: self.slot(material.metallic.texture.as_ref(), white, pass.attached),
            roughness: self.slot(material.roughness.texture.as_ref(), white, pass.attached),
            emission: self.slot(material.emission.texture.as_ref(), black, pass.attached),
            ambient_occlusion: self.slot(material.ambient_occlusion.texture.as_ref(), white, pass.attached),
            environment: pass.lighting.environment,
            spot_shadows: pass.lighting.spot_shadows,
            cascade_shadows: pass.lighting.cascade_shadows,
        }
    }

    fn draw_model(&self, model: &Model, world: Mat4, state: PipelineState, pass: &ModelPass) -> Option<Draw> {
        let mesh = model.mesh.as_ref()?;
        let (vertex_array, range) = self.mesh_range(mesh)?;
        let textures = self.material_textures(&model.material, pass);
        let uniforms = pass.uniforms.for_model(world, &model.material);
        Some(
            self.programs
                .standard
                .draw(vertex_array, range, state, &uniforms, &textures),
        )
    }

    fn draw_models(&self, models: &[Model], pass: &ModelPass) -> ModelDraws {
        let mut draws = ModelDraws::default();
        for root in models {
            root.visit(Mat4::IDENTITY, &mut |model, world| {
                if model.mesh.is_none() {
                    return;
                }
                let state = StandardProgram::state(&model.material);
                match self.draw_model(model, world, state, pass) {
                    Some(draw) if model.material.is_transparent() => draws.transparent.push(draw),
                    Some(draw) => draws.opaque.push(draw),
                    None => draws.skipped += 1,
                }
            });
        }
        draws
    }

    /// The sky follows `eye` and never writes depth.
    fn draw_sky(&self, sky: &Model, eye: Vec3, pass: &ModelPass, draws: &mut Vec<Draw>) {
        let state = PipelineState::OPAQUE.read_only_depth().double_sided();
        sky.visit(Mat4::from_translation(eye), &mut |model, world| {
            if let Some(draw) = self.draw_model(model, world, state, pass) {
                draws.push(draw);
            }
        });
    }

    /// Draws every model of `scene` with the standard program, sky first
    /// and transparent models last.
    fn scene_draws(&self, scene: &Scene, eye: Vec3, pass: &ModelPass) -> (Vec<Draw>, usize) {
        let mut draws = Vec::new();
        if let Some(sky) = &scene.sky {
            self.draw_sky(sky, eye, pass, &mut draws);
        }
        let models = self.draw_models(&scene.models, pass);
        draws.extend(models.opaque);
        draws.extend(models.transparent);
        (draws, models.skipped)
    }

    fn depth_draws(&self, models: &[Model], view_projection: Mat4) -> Vec<Draw> {
        let mut draws = Vec::new();
        for root in models {
            root.visit(Mat4::IDENTITY, &mut |model, world| {
                let Some((vertex_array, range)) = model.mesh.as_deref().and_then(|mesh| self.mesh_range(mesh))
                else {
                    return;
                };
                let uniforms = DepthUniforms::new(world, view_projection);
                draws.push(self.programs.depth.draw(vertex_array, range, &uniforms));
            });
        }
        draws
    }

    fn record_texture_targets(&self, frame: &mut Frame, scenes: &[Scene], clear_color: [f32; 4]) {
        for scene in scenes {
            for target in &scene.texture_targets {
                let (Some(frame_buffer), Some(texture)) = (
                    self.resources.frame_buffer(target.id()),
                    self.resources.texture(target.texture().id()),
                ) else {
                    continue;
                };
                let camera = &target.camera;
                let mut uniforms =
                    StandardUniforms::new(camera.view_projection(), camera.position(), &scene.fog);
                if let Some(light) = &scene.directional_light {
                    uniforms.set_directional_light(light, None);
                }
                uniforms.set_spot_lights(scene.active_spot_lights());
                let pass = ModelPass {
                    view_projection: camera.view_projection(),
                    uniforms,
                    lighting: self.white_lighting(),
                    attached: Some(texture),
                };
                let mut render_pass = Pass::new(
                    PassKind::TextureTarget,
                    PassTarget::FrameBuffer(frame_buffer),
                    target.size(),
                    Clear::all(clear_color),
                );
                render_pass.draws = self.scene_draws(scene, camera.position(), &pass).0;
                frame.push_pass(render_pass);
            }
        }
    }

    fn record_cascaded_shadow_maps(
        &self,
        frame: &mut Frame,
        scene: &Scene,
    ) -> Option<[Cascade; CASCADE_COUNT]> {
        let light = scene.directional_light.as_ref().filter(|light| light.casts_shadows)?;
        let cascades = cascades(
            &scene.camera,
            light.direction,
            self.settings.cascade_split_lambda,
            self.settings.cascade_map_size,
        );
        let shadows = &self.targets.cascades;
        for (index, (cascade, map)) in cascades.iter().zip(&shadows.maps).enumerate() {
            let mut pass = Pass::new(
                PassKind::CascadedShadowMap { cascade: index },
                map.target(),
                map.size(),
                Clear::all(SHADOW_CLEAR),
            );
            pass.draws = self.depth_draws(&scene.models, cascade.view_projection);
            frame.push_pass(pass);
            self.blur_shadow_map(frame, shadows, map);
        }
        Some(cascades)
    }

    fn record_shadow_maps(&self, frame: &mut Frame, scene: &Scene) {
        let shadows = &self.targets.spots;
        for (index, (light, map)) in scene.active_spot_lights().iter().zip(&shadows.maps).enumerate() {
            let mut pass = Pass::new(
                PassKind::ShadowMap { light: index },
                map.target(),
                map.size(),
                Clear::all(SHADOW_CLEAR),
            );
            pass.draws = self.depth_draws(&scene.models, light.camera().view_projection());
            frame.push_pass(pass);
            self.blur_shadow_map(frame, shadows, map);
        }
    }

    fn blur_shadow_map(&self, frame: &mut Frame, shadows: &ShadowMaps, map: &RenderTarget) {
        if self.settings.shadow_blur {
            self.blur(frame, PassKind::ShadowBlur, map.texture, map, &shadows.blur, 1);
        }
    }

    /// Renders the next cube faces of every environment light, cycling
    /// through all six over consecutive frames.
    fn record_environment(&self, frame: &mut Frame, scene: &Scene, clear_color: [f32; 4]) {
        let faces_per_frame = self.settings.environment_faces_per_frame.clamp(1, 6) as u64;
        let first_face = (self.frame_index * faces_per_frame % 6) as usize;
        for (index, (light, target)) in scene
            .active_environment_lights()
            .iter()
            .zip(&self.targets.environments)
            .enumerate()
        {
            for step in 0..faces_per_frame as usize {
                let face = (first_face + step) % 6;
                let Some(face_target) = target.face(face) else {
                    continue;
                };
                let view_projection = light.face_view_projection(face);
                let mut uniforms = StandardUniforms::new(view_projection, light.position, &scene.fog);
                if let Some(directional) = &scene.directional_light {
                    uniforms.set_directional_light(directional, None);
                }
                let pass = ModelPass {
                    view_projection,
                    uniforms,
                    lighting: self.white_lighting(),
                    attached: None,
                };
                let mut render_pass = Pass::new(
                    PassKind::Environment { light: index, face },
                    face_target,
                    (target.size, target.size),
                    Clear::all(clear_color),
                );
                render_pass.draws = self.scene_draws(scene, light.position, &pass).0;
                frame.push_pass(render_pass);
            }
        }
    }

    /// Main color pass. Returns the number of models that were skipped.
    fn record_scene(
        &self,
        frame: &mut Frame,
        scene: &Scene,
        cascades: Option<&[Cascade; CASCADE_COUNT]>,
        clear: Clear,
    ) -> usize {
        let camera = &scene.camera;
        let view_projection = camera.view_projection();

        let mut lighting = self.white_lighting();
        let spots = scene.active_spot_lights();
        for (slot, map) in lighting.spot_shadows.iter_mut().zip(&self.targets.spots.maps).take(spots.len()) {
            *slot = map.texture;
        }
        let environments = scene.active_environment_lights();
        for (slot, target) in lighting
            .environment
            .iter_mut()
            .zip(&self.targets.environments)
            .take(environments.len())
        {
            *slot = target.texture;
        }
        if cascades.is_some() {
            for (slot, map) in lighting.cascade_shadows.iter_mut().zip(&self.targets.cascades.maps) {
                *slot = map.texture;
            }
        }

        let mut uniforms = StandardUniforms::new(view_projection, camera.position(), &scene.fog);
        if let Some(light) = &scene.directional_light {
            uniforms.set_directional_light(light, cascades);
        }
        uniforms.set_spot_lights(spots);
        uniforms.set_environment_lights(environments);
        let pass = ModelPass {
            view_projection,
            uniforms,
            lighting,
            attached: None,
        };

        let (width, height) = self.targets.standard.size();
        let mut render_pass = Pass::new(PassKind::Scene, self.targets.scene_target(), (width, height), clear);
        let (mut draws, skipped) = self.scene_draws(scene, camera.position(), &pass);

        for debug_box in &scene.boxes {
            let uniforms = BoxUniforms::new(pass.view_projection * debug_box.model_matrix(), DEBUG_BOX_COLOR);
            draws.push(self.programs.debug_box.draw(&self.unit_box, &uniforms));
        }

        for cloud in &scene.clouds {
            let Some(vertex_array) = self.resources.vertex_array(cloud.id()) else {
                continue;
            };
            let mut count = cloud.points().len();
            if cloud.kind() == CloudKind::Lines {
                count -= count % 2;
            }
            if count == 0 {
                continue;
            }
            let range = DrawRange {
                count: count as u32,
                indexed: false,
            };
            let uniforms = CloudUniforms::new(view_projection, cloud.emissive);
            draws.push(
                self.programs
                    .cloud
                    .draw(cloud.kind(), cloud.emissive, vertex_array, range, &uniforms),
            );
        }

        if skipped > 0 {
            log::warn!("Skipped {} models with data missing on the GPU", skipped);
        }
        render_pass.draws = draws;
        frame.push_pass(render_pass);
        skipped
    }

    /// Separable blur ping-ponging between `output` and `buffer`. Each
    /// iteration blurs horizontally into `buffer` and vertically back into
    /// `output`. Returns the texture holding the result.
    fn blur(
        &self,
        frame: &mut Frame,
        kind: PassKind,
        source: TextureId,
        output: &RenderTarget,
        buffer: &RenderTarget,
        iterations: u32,
    ) -> TextureId {
        let mut current = source;
        for _ in 0..iterations {
            let [texel_x, _] = output.texel();
            let mut horizontal = Pass::new(kind, buffer.target(), buffer.size(), Clear::NONE);
            horizontal.draws.push(self.programs.blur.draw(&self.quad, current, [texel_x, 0.0]));
            frame.push_pass(horizontal);

            let [_, texel_y] = buffer.texel();
            let mut vertical = Pass::new(kind, output.target(), output.size(), Clear::NONE);
            vertical.draws.push(self.programs.blur.draw(&self.quad, buffer.texture, [0.0, texel_y]));
            frame.push_pass(vertical);

            current = output.texture;
        }
        current
    }

    fn record_post_processing(&self, frame: &mut Frame, clear_color: [f32; 4], resolution: Resolution) {
        let [first, second] = &self.targets.post;
        let scene_texture = self.targets.standard.texture;

        let mut bloom = Pass::new(PassKind::Bloom, first.target(), first.size(), Clear::NONE);
        bloom.draws.push(self.programs.bloom.draw(&self.quad, scene_texture));
        frame.push_pass(bloom);

        let bloom_texture = self.blur(
            frame,
            PassKind::Blur,
            first.texture,
            first,
            second,
            self.settings.blur_iterations,
        );

        let mut compositing = Pass::new(
            PassKind::Compositing,
            PassTarget::Screen,
            (resolution.width.max(1), resolution.height.max(1)),
            Clear::color(clear_color),
        );
        compositing.draws.push(self.programs.compositing.draw(
            &self.quad,
            scene_texture,
            bloom_texture,
            self.settings.bloom_strength,
        ));
        frame.push_pass(compositing);
    }
}
