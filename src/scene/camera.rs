use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            eye,
            target,
            up: stable_up(target - eye),
            fov_y_radians,
            aspect,
            near,
            far,
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn position(&self) -> Vec3 {
        self.eye
    }

    pub fn direction(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// World-space corners of the frustum slice between two view distances,
    /// near plane first.
    pub fn frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let slice = Mat4::perspective_rh(self.fov_y_radians, self.aspect, near, far) * self.view();
        let inverse = slice.inverse();
        let mut corners = [Vec3::ZERO; 8];
        let mut index = 0;
        for z in [0.0, 1.0] {
            for y in [-1.0, 1.0] {
                for x in [-1.0, 1.0] {
                    corners[index] = inverse.project_point3(Vec3::new(x, y, z));
                    index += 1;
                }
            }
        }
        corners
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_radians: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// An up vector that is never parallel to `direction`.
pub(crate) fn stable_up(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_projection_is_invertible() {
        let camera = Camera::default();
        let vp = camera.view_projection();
        let id = vp * vp.inverse();
        assert!(id.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn frustum_corners_sit_at_requested_distances() {
        let camera = Camera::default();
        let corners = camera.frustum_corners(1.0, 10.0);
        let forward = camera.direction();
        for corner in &corners[..4] {
            assert!(((*corner - camera.eye).dot(forward) - 1.0).abs() < 1e-3);
        }
        for corner in &corners[4..] {
            assert!(((*corner - camera.eye).dot(forward) - 10.0).abs() < 1e-2);
        }
    }

    #[test]
    fn looking_straight_down_picks_another_up() {
        let camera = Camera::new(Vec3::Y * 5.0, Vec3::ZERO, 1.0, 1.0, 0.1, 10.0);
        assert_eq!(camera.up, Vec3::Z);
        assert!(camera.view().is_finite());
    }
}
