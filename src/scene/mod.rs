pub mod camera;
pub mod cloud;
pub mod light;
pub mod target;

use glam::{Mat4, Vec3};

pub use camera::Camera;
pub use cloud::{Cloud, CloudKind, Point};
pub use light::{
    DirectionalLight, EnvironmentLight, SpotLight, MAX_ENVIRONMENT_LIGHTS, MAX_SPOT_LIGHTS,
};
pub use target::TextureTarget;

use crate::asset::Model;

#[derive(Clone, Copy, Debug)]
pub struct Fog {
    pub color_near: Vec3,
    pub color_far: Vec3,
    pub attenuation_factor: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            color_near: Vec3::ONE,
            color_far: Vec3::ONE,
            attenuation_factor: 0.0,
            min: 0.0,
            max: 1.0,
        }
    }
}

/// Wireframe box, `extent` wide in local space.
#[derive(Clone, Copy, Debug)]
pub struct DebugBox {
    pub transform: Mat4,
    pub extent: Vec3,
}

impl DebugBox {
    pub fn new(transform: Mat4, extent: Vec3) -> Self {
        Self { transform, extent }
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform * Mat4::from_scale(self.extent)
    }
}

/// Everything one call to `Renderer::render` draws for a camera. Read-only
/// to the renderer.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub models: Vec<Model>,
    pub sky: Option<Model>,
    pub camera: Camera,
    pub directional_light: Option<DirectionalLight>,
    pub spot_lights: Vec<SpotLight>,
    pub environment_lights: Vec<EnvironmentLight>,
    pub fog: Fog,
    pub clouds: Vec<Cloud>,
    pub boxes: Vec<DebugBox>,
    pub texture_targets: Vec<TextureTarget>,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            ..Self::default()
        }
    }

    /// Spot lights that are rendered, in order.
    pub fn active_spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights[..self.spot_lights.len().min(MAX_SPOT_LIGHTS)]
    }

    pub fn active_environment_lights(&self) -> &[EnvironmentLight] {
        &self.environment_lights[..self.environment_lights.len().min(MAX_ENVIRONMENT_LIGHTS)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_lights_beyond_limit_are_ignored() {
        let mut scene = Scene::default();
        scene.spot_lights = vec![SpotLight::new(Vec3::Y, Vec3::ZERO, 1.0, Vec3::ONE, 1.0); 6];
        assert_eq!(scene.active_spot_lights().len(), MAX_SPOT_LIGHTS);
    }

    #[test]
    fn debug_box_scales_by_extent() {
        let debug_box = DebugBox::new(Mat4::from_translation(Vec3::X), Vec3::splat(2.0));
        let corner = debug_box.model_matrix().transform_point3(Vec3::splat(0.5));
        assert!(corner.abs_diff_eq(Vec3::new(2.0, 1.0, 1.0), 1e-6));
    }
}
