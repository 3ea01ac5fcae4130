use std::sync::Arc;

use glam::Vec3;

use super::Texture;

/// A material property: a constant factor and an optional texture that the
/// factor modulates.
#[derive(Debug, Clone)]
pub struct Channel<T> {
    pub value: T,
    pub texture: Option<Arc<Texture>>,
}

impl<T> Channel<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: Arc<Texture>) -> Self {
        self.texture = Some(texture);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub albedo: Channel<Vec3>,
    pub roughness: Channel<f32>,
    pub metallic: Channel<f32>,
    pub emission: Channel<Vec3>,
    pub ambient_occlusion: Channel<f32>,
    pub normal: Option<Arc<Texture>>,
    pub alpha: f32,
    pub index_of_refraction: f32,
    pub transmission: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Channel::new(Vec3::ONE),
            roughness: Channel::new(1.0),
            metallic: Channel::new(0.0),
            emission: Channel::new(Vec3::ZERO),
            ambient_occlusion: Channel::new(1.0),
            normal: None,
            alpha: 1.0,
            index_of_refraction: 1.5,
            transmission: 0.0,
        }
    }
}

impl Material {
    pub fn from_albedo(albedo: Vec3) -> Self {
        Self {
            albedo: Channel::new(albedo),
            ..Self::default()
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha < 1.0 || self.transmission > 0.0
    }

    /// Every texture the material samples.
    pub fn textures(&self) -> impl Iterator<Item = &Arc<Texture>> {
        [
            self.albedo.texture.as_ref(),
            self.roughness.texture.as_ref(),
            self.metallic.texture.as_ref(),
            self.emission.texture.as_ref(),
            self.ambient_occlusion.texture.as_ref(),
            self.normal.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Texture2D;

    #[test]
    fn default_material_samples_nothing() {
        assert_eq!(Material::default().textures().count(), 0);
        assert!(!Material::default().is_transparent());
    }

    #[test]
    fn textures_lists_every_bound_map() {
        let texture = Arc::new(Texture::from(Texture2D::from_color([255; 4])));
        let mut material = Material::from_albedo(Vec3::X);
        material.albedo = material.albedo.with_texture(texture.clone());
        material.normal = Some(texture);
        assert_eq!(material.textures().count(), 2);
    }
}
