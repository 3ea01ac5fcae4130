use glam::{Mat4, Vec3};
use lumen::renderer::cascades::{cascades, split_distances};
use lumen::renderer::CASCADE_COUNT;
use lumen::scene::Camera;

const EPSILON: f32 = 1e-3;

fn camera_looking_at(target: Vec3) -> Camera {
    Camera::new(Vec3::new(0.0, 1.5, 0.0), target, 50f32.to_radians(), 1.5, 0.5, 80.0)
}

/// World-space width of a light volume along its x axis.
fn volume_width(view_projection: Mat4) -> f32 {
    let inverse = view_projection.inverse();
    let left = inverse.project_point3(Vec3::new(-1.0, 0.0, 0.5));
    let right = inverse.project_point3(Vec3::new(1.0, 0.0, 0.5));
    left.distance(right)
}

#[test]
fn logarithmic_splits_grow_geometrically() {
    let splits = split_distances(1.0, 1000.0, 1.0);
    for pair in splits.windows(2) {
        assert!((pair[1] / pair[0] - 1000f32.powf(0.25)).abs() < EPSILON);
    }
}

#[test]
fn split_lambda_is_clamped() {
    assert_eq!(split_distances(0.5, 80.0, 3.0), split_distances(0.5, 80.0, 1.0));
    assert_eq!(split_distances(0.5, 80.0, -1.0), split_distances(0.5, 80.0, 0.0));
}

#[test]
fn volumes_keep_their_size_while_the_camera_turns() {
    let light = Vec3::new(0.3, -1.0, 0.2);
    let ahead = cascades(&camera_looking_at(Vec3::new(0.0, 1.5, -10.0)), light, 0.6, 512);
    let aside = cascades(&camera_looking_at(Vec3::new(7.0, 1.5, -7.0)), light, 0.6, 512);

    for index in 0..CASCADE_COUNT {
        let a = volume_width(ahead[index].view_projection);
        let b = volume_width(aside[index].view_projection);
        assert!((a - b).abs() < EPSILON * a.max(1.0), "cascade {index}: {a} vs {b}");
    }
}

#[test]
fn farther_cascades_cover_more_ground() {
    let camera = camera_looking_at(Vec3::new(0.0, 1.5, -10.0));
    let set = cascades(&camera, Vec3::NEG_Y + Vec3::X * 0.1, 0.5, 512);
    for pair in set.windows(2) {
        assert!(volume_width(pair[0].view_projection) < volume_width(pair[1].view_projection));
    }
}

#[test]
fn camera_position_projects_inside_first_cascade() {
    let camera = camera_looking_at(Vec3::new(3.0, 0.0, -10.0));
    let first = cascades(&camera, Vec3::new(-0.2, -1.0, 0.4), 0.5, 512)[0];
    let ahead = camera.position() + camera.direction() * (first.near + first.far) * 0.5;
    let ndc = first.view_projection.project_point3(ahead);
    assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "{ndc:?}");
    assert!((0.0..=1.0).contains(&ndc.z), "{ndc:?}");
}
