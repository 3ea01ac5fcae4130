use glam::{Mat4, Vec3};

use super::camera::{stable_up, Camera};

/// At most this many spot lights cast shadows and light a scene.
pub const MAX_SPOT_LIGHTS: usize = 4;
/// At most this many environment lights are rendered per scene.
pub const MAX_ENVIRONMENT_LIGHTS: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub strength: f32,
    pub casts_shadows: bool,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, strength: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            strength,
            casts_shadows: true,
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -1.0, -0.4), Vec3::ONE, 1.0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SpotLight {
    pub position: Vec3,
    pub center: Vec3,
    /// Full cone angle in radians.
    pub angle: f32,
    pub color: Vec3,
    pub strength: f32,
    pub near: f32,
    pub far: f32,
    /// Fraction of the cone over which the edge fades out.
    pub blend: f32,
}

impl SpotLight {
    pub fn new(position: Vec3, center: Vec3, angle: f32, color: Vec3, strength: f32) -> Self {
        Self {
            position,
            center,
            angle,
            color,
            strength,
            near: 0.1,
            far: 10.0,
            blend: 0.15,
        }
    }

    pub fn direction(&self) -> Vec3 {
        (self.center - self.position).normalize_or_zero()
    }

    pub fn camera(&self) -> Camera {
        Camera::new(self.position, self.center, self.angle, 1.0, self.near, self.far)
    }
}

/// A box-shaped region lit by a cube map captured from `position`.
#[derive(Clone, Copy, Debug)]
pub struct EnvironmentLight {
    pub position: Vec3,
    pub extent: Vec3,
    pub strength: f32,
    pub falloff: f32,
    pub near: f32,
    pub far: f32,
}

impl EnvironmentLight {
    pub fn new(position: Vec3, extent: Vec3, strength: f32) -> Self {
        Self {
            position,
            extent,
            strength,
            falloff: 0.1,
            near: 0.1,
            far: 100.0,
        }
    }

    /// View-projection for one cube face in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn face_view_projection(&self, face: usize) -> Mat4 {
        let (forward, up) = match face % 6 {
            0 => (Vec3::X, Vec3::NEG_Y),
            1 => (Vec3::NEG_X, Vec3::NEG_Y),
            2 => (Vec3::Y, Vec3::Z),
            3 => (Vec3::NEG_Y, Vec3::NEG_Z),
            4 => (Vec3::Z, Vec3::NEG_Y),
            _ => (Vec3::NEG_Z, Vec3::NEG_Y),
        };
        let view = Mat4::look_at_rh(self.position, self.position + forward, up);
        let projection =
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, self.near, self.far);
        projection * view
    }
}

impl Default for EnvironmentLight {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::splat(10.0), 1.0)
    }
}

/// Light view for a directional light looking at `center` from `distance`
/// away.
pub(crate) fn directional_view(direction: Vec3, center: Vec3, distance: f32) -> Mat4 {
    let direction = direction.normalize_or_zero();
    Mat4::look_at_rh(center - direction * distance, center, stable_up(direction))
}
