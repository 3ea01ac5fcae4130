use glam::{Mat4, Vec3, Vec4};

use crate::scene::light::directional_view;
use crate::scene::Camera;

pub const CASCADE_COUNT: usize = 4;

/// One slice of the camera frustum and the light transform covering it.
#[derive(Clone, Copy, Debug)]
pub struct Cascade {
    pub view_projection: Mat4,
    pub near: f32,
    pub far: f32,
}

/// Split distances between `near` and `far`, blending a logarithmic
/// distribution (`lambda = 1`) with a uniform one (`lambda = 0`). The first
/// entry is `near`, the last is `far`.
pub fn split_distances(near: f32, far: f32, lambda: f32) -> [f32; CASCADE_COUNT + 1] {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut splits = [0.0; CASCADE_COUNT + 1];
    for (index, split) in splits.iter_mut().enumerate() {
        let fraction = index as f32 / CASCADE_COUNT as f32;
        let logarithmic = near * (far / near).powf(fraction);
        let uniform = near + (far - near) * fraction;
        *split = lambda * logarithmic + (1.0 - lambda) * uniform;
    }
    splits[0] = near;
    splits[CASCADE_COUNT] = far;
    splits
}

/// Fits an orthographic light transform around each frustum slice.
///
/// Each slice is enclosed in a bounding sphere so the projection keeps its
/// size while the camera turns, and the projection is snapped to whole
/// shadow-map texels so edges do not shimmer while it moves.
pub fn cascades(
    camera: &Camera,
    light_direction: Vec3,
    lambda: f32,
    map_size: u32,
) -> [Cascade; CASCADE_COUNT] {
    let splits = split_distances(camera.near, camera.far, lambda);
    std::array::from_fn(|index| {
        let (near, far) = (splits[index], splits[index + 1]);
        Cascade {
            view_projection: fit_slice(camera, light_direction, near, far, map_size),
            near,
            far,
        }
    })
}

fn fit_slice(camera: &Camera, light_direction: Vec3, near: f32, far: f32, map_size: u32) -> Mat4 {
    let corners = camera.frustum_corners(near, far);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0f32, f32::max);
    let radius = (radius * 16.0).ceil() / 16.0;

    // Casters up to one radius toward the light stay inside the volume.
    let distance = radius * 2.0;
    let view = directional_view(light_direction, center, distance);
    let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, distance + radius);

    let view_projection = projection * view;
    let half_size = map_size.max(1) as f32 * 0.5;
    let origin = view_projection * Vec4::W * half_size;
    let offset = (origin.round() - origin) / half_size;

    let mut snapped = projection;
    snapped.w_axis.x += offset.x;
    snapped.w_axis.y += offset.y;
    snapped * view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(
            Vec3::new(0.0, 2.0, 8.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn splits_partition_near_to_far() {
        let splits = split_distances(0.1, 100.0, 0.5);
        assert_eq!(splits[0], 0.1);
        assert_eq!(splits[CASCADE_COUNT], 100.0);
        for pair in splits.windows(2) {
            assert!(pair[0] < pair[1], "splits not increasing: {splits:?}");
        }
    }

    #[test]
    fn zero_lambda_is_uniform() {
        let splits = split_distances(1.0, 101.0, 0.0);
        for (index, split) in splits.iter().enumerate() {
            assert!((split - (1.0 + index as f32 * 25.0)).abs() < 1e-4);
        }
    }

    #[test]
    fn cascades_are_contiguous() {
        let cascades = cascades(&camera(), Vec3::new(-0.3, -1.0, -0.4), 0.5, 1024);
        assert_eq!(cascades[0].near, 0.1);
        assert_eq!(cascades[CASCADE_COUNT - 1].far, 100.0);
        for pair in cascades.windows(2) {
            assert_eq!(pair[0].far, pair[1].near);
        }
    }

    #[test]
    fn slice_corners_fit_inside_light_volume() {
        let camera = camera();
        let direction = Vec3::new(-0.3, -1.0, -0.4);
        for cascade in cascades(&camera, direction, 0.5, 1024) {
            for corner in camera.frustum_corners(cascade.near, cascade.far) {
                let ndc = cascade.view_projection.project_point3(corner);
                assert!(ndc.x.abs() <= 1.0 + 3e-3 && ndc.y.abs() <= 1.0 + 3e-3, "{ndc:?}");
                assert!((-1e-3..=1.0 + 1e-3).contains(&ndc.z), "{ndc:?}");
            }
        }
    }

    #[test]
    fn snapped_origin_lands_on_texel_grid() {
        let map_size = 1024;
        let cascade = cascades(&camera(), Vec3::new(0.2, -1.0, 0.1), 0.5, map_size)[1];
        let origin = cascade.view_projection * Vec4::W * (map_size as f32 * 0.5);
        assert!((origin.x - origin.x.round()).abs() < 1e-2);
        assert!((origin.y - origin.y.round()).abs() < 1e-2);
    }
}
