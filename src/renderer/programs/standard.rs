use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::{create, draw};
use crate::asset::Material;
use crate::error::Result;
use crate::gpu::{
    Backend, Blend, Draw, DrawRange, PipelineState, ProgramId, TextureDimension, TextureId,
    VertexArrayId, VertexLayout,
};
use crate::renderer::cascades::{Cascade, CASCADE_COUNT};
use crate::renderer::shaders::ShaderLibrary;
use crate::scene::{
    DirectionalLight, EnvironmentLight, Fog, SpotLight, MAX_ENVIRONMENT_LIGHTS, MAX_SPOT_LIGHTS,
};

const SLOTS: [TextureDimension; 16] = [
    TextureDimension::D2, // albedo
    TextureDimension::D2, // normal
    TextureDimension::D2, // metallic
    TextureDimension::D2, // roughness
    TextureDimension::D2, // emission
    TextureDimension::D2, // ambient occlusion
    TextureDimension::Cube,
    TextureDimension::Cube,
    TextureDimension::D2, // spot shadows
    TextureDimension::D2,
    TextureDimension::D2,
    TextureDimension::D2,
    TextureDimension::D2, // cascades
    TextureDimension::D2,
    TextureDimension::D2,
    TextureDimension::D2,
];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct StandardUniforms {
    model: [[f32; 4]; 4],
    view_projection: [[f32; 4]; 4],
    normal_matrix: [[f32; 4]; 4],
    camera_position: [f32; 4],
    /// rgb, alpha
    albedo: [f32; 4],
    emission: [f32; 4],
    /// roughness, metallic, ambient occlusion, transmission
    material: [f32; 4],
    fog_color_near: [f32; 4],
    fog_color_far: [f32; 4],
    /// min, max, attenuation
    fog_range: [f32; 4],
    /// xyz, w = 1 when shadowed
    light_direction: [f32; 4],
    /// rgb * strength, w = 1 when lit
    light_color: [f32; 4],
    cascade_view_projection: [[[f32; 4]; 4]; CASCADE_COUNT],
    cascade_splits: [f32; 4],
    spot_view_projection: [[[f32; 4]; 4]; MAX_SPOT_LIGHTS],
    /// xyz, cone angle
    spot_position: [[f32; 4]; MAX_SPOT_LIGHTS],
    /// xyz, edge blend
    spot_direction: [[f32; 4]; MAX_SPOT_LIGHTS],
    spot_color: [[f32; 4]; MAX_SPOT_LIGHTS],
    /// xyz, strength
    environment_position: [[f32; 4]; MAX_ENVIRONMENT_LIGHTS],
    /// xyz, falloff
    environment_extent: [[f32; 4]; MAX_ENVIRONMENT_LIGHTS],
    /// spot lights, environment lights
    counts: [u32; 4],
}

impl StandardUniforms {
    pub(crate) fn new(view_projection: Mat4, camera_position: Vec3, fog: &Fog) -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.view_projection = view_projection.to_cols_array_2d();
        uniforms.camera_position = camera_position.extend(1.0).to_array();
        uniforms.fog_color_near = fog.color_near.extend(1.0).to_array();
        uniforms.fog_color_far = fog.color_far.extend(1.0).to_array();
        uniforms.fog_range = [fog.min, fog.max, fog.attenuation_factor, 0.0];
        uniforms
    }

    /// Cascades are only sampled when `cascades` is given.
    pub(crate) fn set_directional_light(
        &mut self,
        light: &DirectionalLight,
        cascades: Option<&[Cascade; CASCADE_COUNT]>,
    ) {
        let shadowed = if cascades.is_some() { 1.0 } else { 0.0 };
        self.light_direction = light.direction.extend(shadowed).to_array();
        self.light_color = (light.color * light.strength).extend(1.0).to_array();
        if let Some(cascades) = cascades {
            for (index, cascade) in cascades.iter().enumerate() {
                self.cascade_view_projection[index] = cascade.view_projection.to_cols_array_2d();
                self.cascade_splits[index] = cascade.far;
            }
        }
    }

    pub(crate) fn set_spot_lights(&mut self, lights: &[SpotLight]) {
        let lights = &lights[..lights.len().min(MAX_SPOT_LIGHTS)];
        for (index, light) in lights.iter().enumerate() {
            self.spot_view_projection[index] = light.camera().view_projection().to_cols_array_2d();
            self.spot_position[index] = light.position.extend(light.angle).to_array();
            self.spot_direction[index] = light.direction().extend(light.blend).to_array();
            self.spot_color[index] = (light.color * light.strength).extend(1.0).to_array();
        }
        self.counts[0] = lights.len() as u32;
    }

    pub(crate) fn set_environment_lights(&mut self, lights: &[EnvironmentLight]) {
        let lights = &lights[..lights.len().min(MAX_ENVIRONMENT_LIGHTS)];
        for (index, light) in lights.iter().enumerate() {
            self.environment_position[index] = light.position.extend(light.strength).to_array();
            self.environment_extent[index] = light.extent.extend(light.falloff).to_array();
        }
        self.counts[1] = lights.len() as u32;
    }

    /// Per-model copy of the pass uniforms.
    pub(crate) fn for_model(&self, transform: Mat4, material: &Material) -> Self {
        let mut uniforms = *self;
        uniforms.model = transform.to_cols_array_2d();
        uniforms.normal_matrix = transform.inverse().transpose().to_cols_array_2d();
        uniforms.albedo = material.albedo.value.extend(material.alpha).to_array();
        uniforms.emission = material.emission.value.extend(1.0).to_array();
        uniforms.material = [
            material.roughness.value,
            material.metallic.value,
            material.ambient_occlusion.value,
            material.transmission,
        ];
        uniforms
    }
}

/// Texture per slot of the standard program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardTextures {
    pub albedo: TextureId,
    pub normal: TextureId,
    pub metallic: TextureId,
    pub roughness: TextureId,
    pub emission: TextureId,
    pub ambient_occlusion: TextureId,
    pub environment: [TextureId; MAX_ENVIRONMENT_LIGHTS],
    pub spot_shadows: [TextureId; MAX_SPOT_LIGHTS],
    pub cascade_shadows: [TextureId; CASCADE_COUNT],
}

impl StandardTextures {
    /// Slot of the albedo texture in a standard draw's texture list.
    pub const ALBEDO_SLOT: usize = 0;

    fn to_vec(self) -> Vec<TextureId> {
        let mut textures = vec![
            self.albedo,
            self.normal,
            self.metallic,
            self.roughness,
            self.emission,
            self.ambient_occlusion,
        ];
        textures.extend(self.environment);
        textures.extend(self.spot_shadows);
        textures.extend(self.cascade_shadows);
        textures
    }
}

/// Lit, shadowed and textured models.
pub(crate) struct StandardProgram {
    program: ProgramId,
}

impl StandardProgram {
    pub(crate) fn new<B: Backend>(backend: &mut B, shaders: &ShaderLibrary) -> Result<Self> {
        let program =
            create::<B, StandardUniforms>(backend, shaders, "standard", VertexLayout::Mesh, &SLOTS)?;
        Ok(Self { program })
    }

    pub(crate) fn draw(
        &self,
        vertex_array: VertexArrayId,
        range: DrawRange,
        state: PipelineState,
        uniforms: &StandardUniforms,
        textures: &StandardTextures,
    ) -> Draw {
        draw(self.program, vertex_array, range, state, uniforms, textures.to_vec())
    }

    /// State for a model with `material`.
    pub(crate) fn state(material: &Material) -> PipelineState {
        if material.is_transparent() {
            PipelineState::OPAQUE
                .with_blend(Blend::Alpha)
                .read_only_depth()
        } else {
            PipelineState::OPAQUE
        }
    }
}
