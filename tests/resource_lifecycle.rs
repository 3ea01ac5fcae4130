use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use lumen::asset::{Filter, Format, Material, Mesh, Model, Texture, Texture2D, Vertex, Wrap};
use lumen::gpu::{HeadlessBackend, PixelFormat};
use lumen::scene::{Camera, Cloud, CloudKind, Point, TextureTarget};
use lumen::{RenderSettings, Renderer, Resolution, ShaderLibrary};

fn settings() -> RenderSettings {
    RenderSettings {
        resolution: Resolution::new(128, 128),
        shadow_map_size: 64,
        cascade_map_size: 64,
        environment_map_size: 16,
        ..RenderSettings::default()
    }
}

fn renderer() -> Renderer<HeadlessBackend> {
    Renderer::new(HeadlessBackend::new(), &settings(), &ShaderLibrary::builtin()).expect("renderer")
}

fn triangle() -> Mesh {
    Mesh::new(
        vec![
            Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
            Vertex::new(Vec3::X, Vec3::Z, Vec2::X),
            Vertex::new(Vec3::Y, Vec3::Z, Vec2::Y),
        ],
        vec![0, 1, 2],
    )
}

fn checker() -> Texture {
    let pixels = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];
    Texture2D::new(2, 2, Format::Rgb8, pixels, Wrap::Repeat, Filter::Closest)
        .expect("texture")
        .into()
}

#[test]
fn loading_twice_allocates_once() {
    let mut renderer = renderer();
    let mesh = triangle();

    let before = renderer.backend().allocations();
    let first = renderer.load(&mesh).expect("first load");
    let after_first = renderer.backend().allocations();
    let stamp = renderer.resources().geometry_stamp(mesh.id());

    let second = renderer.load(&mesh).expect("second load");
    assert_eq!(after_first - before, 3);
    assert_eq!(renderer.backend().allocations(), after_first);
    assert_eq!(renderer.resources().sizes().vertex_arrays, 1);
    assert_eq!(renderer.resources().geometry_stamp(mesh.id()), stamp);
    assert_eq!(first, second);
}

#[test]
fn stale_mesh_is_uploaded_once() {
    let mut renderer = renderer();
    let mut mesh = triangle();
    renderer.load(&mesh).expect("load");
    let uploads = renderer.backend().uploads();
    let allocations = renderer.backend().allocations();

    mesh.modify(|vertices| vertices[0].position = [0.0, 0.0, 1.0]);
    renderer.load_or_update(&mesh).expect("update");
    assert!(renderer.backend().uploads() > uploads);
    assert_eq!(renderer.backend().allocations(), allocations);
    assert_eq!(renderer.resources().geometry_stamp(mesh.id()), Some(mesh.modified()));

    let buffer = renderer.resources().vertex_buffer(mesh.id()).expect("vertex buffer");
    let data = renderer.backend().buffer_data(buffer).expect("data");
    assert_eq!(&data[..12], bytemuck::cast_slice::<f32, u8>(&[0.0, 0.0, 1.0]));

    let uploads = renderer.backend().uploads();
    renderer.load_or_update(&mesh).expect("no-op");
    assert_eq!(renderer.backend().uploads(), uploads);
}

#[test]
fn stale_texture_is_rewritten_in_place() {
    let mut renderer = renderer();
    let mut texture = Texture2D::from_color([10, 20, 30, 255]);
    let handle = renderer.load(&Texture::from(texture.clone())).expect("load");
    assert!(handle.resource.valid());

    texture.set_pixels(vec![40, 50, 60, 255]).expect("pixels");
    let texture = Texture::from(texture);
    renderer.load_or_update(&texture).expect("update");

    let id = renderer.resources().texture(texture.id()).expect("pooled");
    assert_eq!(renderer.backend().texture_layer(id, 0), Some(&[40u8, 50, 60, 255][..]));
    assert_eq!(renderer.resources().texture_stamp(texture.id()), Some(texture.modified()));
    assert_eq!(renderer.resources().sizes().textures, 1);
}

#[test]
fn rgb_textures_are_expanded_to_rgba() {
    let mut renderer = renderer();
    let texture = checker();
    renderer.load(&texture).expect("load");

    let id = renderer.resources().texture(texture.id()).expect("pooled");
    let desc = renderer.backend().texture_desc(id).expect("desc");
    assert_eq!(desc.format, PixelFormat::Rgba8);
    let layer = renderer.backend().texture_layer(id, 0).expect("layer");
    assert_eq!(&layer[..8], &[255, 0, 0, 255, 0, 255, 0, 255]);
}

#[test]
fn unloading_unknown_resources_does_nothing() {
    let mut renderer = renderer();
    let sizes = renderer.resources().sizes();
    renderer.unload(&triangle());
    renderer.unload(&checker());
    assert_eq!(renderer.resources().sizes(), sizes);
    assert!(renderer.resources().is_empty());
}

#[test]
fn unload_removes_only_its_entries() {
    let mut renderer = renderer();
    let kept = triangle();
    let removed = triangle();
    renderer.load(&kept).expect("load");
    renderer.load(&removed).expect("load");

    renderer.unload(&removed);
    assert!(renderer.resources().vertex_array(removed.id()).is_none());
    assert!(renderer.resources().element_buffer(removed.id()).is_none());
    assert!(renderer.resources().vertex_array(kept.id()).is_some());
    assert_eq!(renderer.resources().sizes().array_buffers, 1);
}

#[test]
fn clear_buffers_on_empty_renderer() {
    let mut renderer = renderer();
    renderer.clear_buffers();
    assert!(renderer.resources().is_empty());
}

#[test]
fn clear_buffers_empties_every_pool() {
    let mut renderer = renderer();
    let static_buffers = renderer.backend().live_buffers();
    let static_textures = renderer.backend().live_textures();

    let mut material = Material::default();
    material.albedo = material.albedo.with_texture(Arc::new(checker()));
    let model = Model::new("model", Arc::new(triangle()), material);
    renderer.load(&model).expect("model");
    let cloud = Cloud::new(
        CloudKind::Points,
        vec![Point::new(Vec3::ZERO, Vec4::ONE, 1.0); 4],
    );
    renderer.load(&cloud).expect("cloud");
    let target = TextureTarget::new(32, 32, Camera::default()).expect("target");
    renderer.load(&target).expect("texture target");

    let sizes = renderer.resources().sizes();
    assert_eq!(sizes.textures, 2);
    assert_eq!(sizes.frame_buffers, 1);
    assert_eq!(sizes.render_buffers, 1);
    assert_eq!(sizes.vertex_arrays, 2);

    renderer.clear_buffers();
    assert!(renderer.resources().is_empty());
    assert_eq!(renderer.backend().live_buffers(), static_buffers);
    assert_eq!(renderer.backend().live_textures(), static_textures);
}

#[test]
fn failed_mesh_load_leaves_no_entry() {
    let mut renderer = renderer();
    let live = renderer.backend().live_buffers();
    let mesh = triangle();

    // The vertex buffer fits, the element buffer does not.
    renderer.backend_mut().fail_after(1);
    assert!(renderer.load(&mesh).is_err());
    assert!(renderer.resources().is_empty());
    assert_eq!(renderer.backend().live_buffers(), live);

    renderer.backend_mut().stop_failing();
    renderer.load(&mesh).expect("load after recovery");
    assert_eq!(renderer.resources().sizes().vertex_arrays, 1);
}

#[test]
fn failed_texture_target_load_releases_its_texture() {
    let mut renderer = renderer();
    let target = TextureTarget::new(16, 16, Camera::default()).expect("target");

    // The color texture fits, the depth buffer does not.
    renderer.backend_mut().fail_after(1);
    assert!(renderer.load(&target).is_err());
    assert!(renderer.resources().is_empty());
}

#[test]
fn failed_update_keeps_previous_entry() {
    let mut renderer = renderer();
    let mut mesh = Mesh::new(triangle().vertices().to_vec(), Vec::new());
    renderer.load(&mesh).expect("load");
    let vertex_array = renderer.resources().vertex_array(mesh.id());
    let stamp = renderer.resources().geometry_stamp(mesh.id());

    // Becoming indexed needs a fresh set of objects.
    mesh.set_indices(vec![0, 1, 2]);
    renderer.backend_mut().fail_after(0);
    assert!(renderer.load_or_update(&mesh).is_err());
    assert_eq!(renderer.resources().vertex_array(mesh.id()), vertex_array);
    assert_eq!(renderer.resources().geometry_stamp(mesh.id()), stamp);
}

#[test]
fn into_backend_releases_everything() {
    let mut renderer = renderer();
    renderer.load(&triangle()).expect("load");
    let backend = renderer.into_backend();
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_vertex_arrays(), 0);
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_render_buffers(), 0);
    assert_eq!(backend.live_frame_buffers(), 0);
}
