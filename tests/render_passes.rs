use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use lumen::asset::{Material, Mesh, Model, Texture, Texture2D, Vertex};
use lumen::gpu::{Command, Frame, HeadlessBackend, PassKind, PassTarget};
use lumen::renderer::StandardTextures;
use lumen::scene::{
    Camera, Cloud, CloudKind, DebugBox, DirectionalLight, EnvironmentLight, Point, Scene, SpotLight,
    TextureTarget,
};
use lumen::{RenderSettings, Renderer, Resolution, ShaderLibrary};

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

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

/// Two triangles facing the camera.
fn quad_model(material: Material) -> Model {
    let vertices = vec![
        Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, Vec2::new(0.0, 1.0)),
        Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, Vec2::new(0.0, 0.0)),
    ];
    let mesh = Mesh::new(vertices, vec![0, 1, 2, 2, 3, 0]);
    Model::new("quad", Arc::new(mesh), material)
}

fn lit_scene() -> Scene {
    let camera = Camera::new(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, 60f32.to_radians(), 1.0, 0.1, 50.0);
    let mut scene = Scene::new(camera);
    scene.models.push(quad_model(Material::from_albedo(Vec3::new(0.8, 0.4, 0.2))));
    scene.directional_light = Some(DirectionalLight::default());
    scene
}

fn last_frame(renderer: &Renderer<HeadlessBackend>) -> &Frame {
    renderer.backend().last_frame().expect("a submitted frame")
}

fn kinds(frame: &Frame) -> Vec<PassKind> {
    frame.passes().map(|pass| pass.kind).collect()
}

fn scene_pass_index(kinds: &[PassKind]) -> usize {
    kinds
        .iter()
        .position(|kind| *kind == PassKind::Scene)
        .expect("a scene pass")
}

#[test]
fn four_cascades_precede_the_scene_pass() {
    let mut renderer = renderer();
    renderer.render(&[lit_scene()], BLACK, (128, 128)).expect("render");

    let kinds = kinds(last_frame(&renderer));
    let scene = scene_pass_index(&kinds);
    let cascades: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| matches!(kind, PassKind::CascadedShadowMap { .. }))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(cascades.len(), 4);
    assert!(cascades.iter().all(|index| *index < scene));
    for (order, index) in cascades.iter().enumerate() {
        assert_eq!(kinds[*index], PassKind::CascadedShadowMap { cascade: order });
    }
}

#[test]
fn light_without_shadows_skips_cascades() {
    let mut renderer = renderer();
    let mut scene = lit_scene();
    if let Some(light) = scene.directional_light.as_mut() {
        light.casts_shadows = false;
    }
    renderer.render(&[scene], BLACK, (128, 128)).expect("render");
    assert!(!kinds(last_frame(&renderer))
        .iter()
        .any(|kind| matches!(kind, PassKind::CascadedShadowMap { .. })));
}

#[test]
fn model_without_albedo_samples_default_white() {
    let mut renderer = renderer();
    renderer.render(&[lit_scene()], BLACK, (128, 128)).expect("render");

    let frame = last_frame(&renderer);
    let scene = frame
        .passes()
        .find(|pass| pass.kind == PassKind::Scene)
        .expect("scene pass");
    assert_eq!(scene.draws.len(), 1);
    let draw = &scene.draws[0];
    assert_eq!(renderer.backend().program_name(draw.program), Some("standard"));
    assert_eq!(draw.textures[StandardTextures::ALBEDO_SLOT], renderer.default_white());
}

#[test]
fn albedo_texture_is_bound_when_present() {
    let mut renderer = renderer();
    let texture = Arc::new(Texture::from(Texture2D::from_color([0, 128, 255, 255])));
    let mut material = Material::default();
    material.albedo = material.albedo.with_texture(texture.clone());
    let mut scene = lit_scene();
    scene.models = vec![quad_model(material)];

    renderer.render(&[scene], BLACK, (128, 128)).expect("render");
    let expected = renderer.resources().texture(texture.id()).expect("uploaded during render");
    let frame = last_frame(&renderer);
    let scene = frame
        .passes()
        .find(|pass| pass.kind == PassKind::Scene)
        .expect("scene pass");
    assert_eq!(scene.draws[0].textures[StandardTextures::ALBEDO_SLOT], expected);
}

#[test]
fn end_to_end_render_fills_the_screen() {
    let mut renderer = renderer();
    renderer.render(&[lit_scene()], [0.0; 4], (128, 128)).expect("render");

    let screen = renderer.backend().screen().expect("screen image");
    assert_eq!((screen.width, screen.height), (128, 128));
    assert_eq!(screen.pixels.len(), 128 * 128 * 4);
    // The white albedo default travels through resolve, bloom and compositing.
    assert!(screen.pixels.iter().any(|byte| *byte != 0));
    assert_eq!(screen.pixel(64, 64), Some([255, 255, 255, 255]));

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.frame, 0);
    assert_eq!(stats.shadow_draw_calls, 4);
    assert_eq!(stats.models_skipped, 0);
    assert_eq!(stats.passes, last_frame(&renderer).passes().count());
}

#[test]
fn post_processing_ends_on_the_screen() {
    let mut renderer = renderer();
    renderer.render(&[lit_scene()], BLACK, (96, 64)).expect("render");

    let frame = last_frame(&renderer);
    let kinds = kinds(frame);
    let scene = scene_pass_index(&kinds);
    let bloom = kinds
        .iter()
        .position(|kind| *kind == PassKind::Bloom)
        .expect("bloom pass");
    let blurs = kinds.iter().filter(|kind| **kind == PassKind::Blur).count();
    assert!(scene < bloom);
    assert_eq!(blurs, 2 * settings().blur_iterations as usize);

    let last = frame.passes().last().expect("passes");
    assert_eq!(last.kind, PassKind::Compositing);
    assert_eq!(last.target, PassTarget::Screen);
    assert_eq!(last.viewport, (96, 64));

    // The multisampled scene is resolved before bloom reads it.
    let resolve = frame
        .commands()
        .iter()
        .position(|command| matches!(command, Command::Resolve { .. }))
        .expect("resolve");
    let bloom_command = frame
        .commands()
        .iter()
        .position(|command| matches!(command, Command::Pass(pass) if pass.kind == PassKind::Bloom))
        .expect("bloom command");
    assert!(resolve < bloom_command);
}

#[test]
fn empty_scene_renders_empty_shadow_passes() {
    let mut renderer = renderer();
    let mut scene = lit_scene();
    scene.models.clear();
    renderer.render(&[scene], BLACK, (128, 128)).expect("render");

    let frame = last_frame(&renderer);
    let shadows: Vec<_> = frame
        .passes()
        .filter(|pass| pass.kind.is_shadow())
        .collect();
    assert_eq!(shadows.len(), 4);
    assert!(shadows.iter().all(|pass| pass.draws.is_empty()));
}

#[test]
fn spot_lights_are_capped_and_rendered_before_the_scene() {
    let mut renderer = renderer();
    let mut scene = lit_scene();
    scene.spot_lights =
        vec![SpotLight::new(Vec3::new(0.0, 3.0, 3.0), Vec3::ZERO, 0.6, Vec3::ONE, 2.0); 6];
    renderer.render(&[scene], BLACK, (128, 128)).expect("render");

    let kinds = kinds(last_frame(&renderer));
    let scene = scene_pass_index(&kinds);
    let spots: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| matches!(kind, PassKind::ShadowMap { .. }))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(spots.len(), 4);
    assert!(spots.iter().all(|index| *index < scene));
}

#[test]
fn environment_faces_cycle_across_frames() {
    let mut renderer = renderer();
    let mut scene = lit_scene();
    scene.environment_lights.push(EnvironmentLight::default());

    let mut faces = Vec::new();
    for _ in 0..7 {
        renderer.render(std::slice::from_ref(&scene), BLACK, (128, 128)).expect("render");
        let rendered: Vec<usize> = last_frame(&renderer)
            .passes()
            .filter_map(|pass| match pass.kind {
                PassKind::Environment { light: 0, face } => Some(face),
                _ => None,
            })
            .collect();
        assert_eq!(rendered.len(), 1);
        faces.push(rendered[0]);
    }
    assert_eq!(faces, vec![0, 1, 2, 3, 4, 5, 0]);
}

#[test]
fn later_scenes_keep_the_color_of_earlier_ones() {
    let mut renderer = renderer();
    renderer
        .render(&[lit_scene(), lit_scene()], BLACK, (128, 128))
        .expect("render");

    let clears: Vec<_> = last_frame(&renderer)
        .passes()
        .filter(|pass| pass.kind == PassKind::Scene)
        .map(|pass| pass.clear)
        .collect();
    assert_eq!(clears.len(), 2);
    assert_eq!(clears[0].color, Some(BLACK));
    assert_eq!(clears[1].color, None);
    assert_eq!(clears[1].depth, Some(1.0));
}

#[test]
fn texture_targets_render_first_and_never_sample_themselves() {
    let mut renderer = renderer();
    let camera = Camera::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, 1.0, 1.0, 0.1, 20.0);
    let target = TextureTarget::new(32, 32, camera).expect("target");
    let mut material = Material::default();
    material.albedo = material.albedo.with_texture(target.texture().clone());
    let mut scene = lit_scene();
    scene.models = vec![quad_model(material)];
    scene.texture_targets.push(target.clone());

    renderer.render(&[scene], BLACK, (128, 128)).expect("render");
    let target_texture = renderer
        .resources()
        .texture(target.texture().id())
        .expect("target texture");

    let frame = last_frame(&renderer);
    let first = frame.passes().next().expect("passes");
    assert_eq!(first.kind, PassKind::TextureTarget);
    assert_eq!(first.viewport, (32, 32));
    assert_eq!(
        first.draws[0].textures[StandardTextures::ALBEDO_SLOT],
        renderer.default_black()
    );

    let scene = frame
        .passes()
        .find(|pass| pass.kind == PassKind::Scene)
        .expect("scene pass");
    assert_eq!(scene.draws[0].textures[StandardTextures::ALBEDO_SLOT], target_texture);
}

#[test]
fn missing_texture_falls_back_to_default() {
    let mut renderer = renderer();
    let texture = Arc::new(Texture::from(Texture2D::from_color([0, 128, 255, 255])));
    let mut material = Material::default();
    material.albedo = material.albedo.with_texture(texture.clone());
    let mut scene = lit_scene();
    scene.models = vec![quad_model(material)];

    // Vertex buffer, element buffer and vertex array fit; the texture does not.
    renderer.backend_mut().fail_after(3);
    renderer.render(&[scene], BLACK, (128, 128)).expect("render");

    assert!(renderer.resources().texture(texture.id()).is_none());
    let frame = last_frame(&renderer);
    let pass = frame
        .passes()
        .find(|pass| pass.kind == PassKind::Scene)
        .expect("scene pass");
    assert_eq!(pass.draws.len(), 1);
    assert_eq!(pass.draws[0].textures[StandardTextures::ALBEDO_SLOT], renderer.default_white());
    assert_eq!(renderer.last_frame_stats().models_skipped, 0);
}

#[test]
fn models_without_a_mesh_on_the_gpu_are_skipped() {
    let mut renderer = renderer();
    // Nothing fits, so the mesh never reaches the GPU.
    renderer.backend_mut().fail_after(0);
    renderer.render(&[lit_scene()], BLACK, (128, 128)).expect("render");

    let stats = renderer.last_frame_stats();
    assert_eq!(stats.models_skipped, 1);
    assert_eq!(stats.shadow_draw_calls, 0);
}

#[test]
fn boxes_and_clouds_draw_after_models() {
    let mut renderer = renderer();
    let mut scene = lit_scene();
    scene.boxes.push(DebugBox::new(Mat4::IDENTITY, Vec3::ONE));
    scene.clouds.push(Cloud::new(
        CloudKind::Lines,
        vec![Point::new(Vec3::ZERO, Vec4::ONE, 1.0); 5],
    ));
    renderer.render(&[scene], BLACK, (128, 128)).expect("render");

    let frame = last_frame(&renderer);
    let pass = frame
        .passes()
        .find(|pass| pass.kind == PassKind::Scene)
        .expect("scene pass");
    let programs: Vec<_> = pass
        .draws
        .iter()
        .map(|draw| renderer.backend().program_name(draw.program).unwrap_or(""))
        .collect();
    assert_eq!(programs, vec!["standard", "box", "cloud"]);
    // Odd point counts drop the unpaired point.
    assert_eq!(pass.draws[2].range.count, 4);
}

#[test]
fn zero_scenes_still_present_a_frame() {
    let mut renderer = renderer();
    renderer.render(&[], BLACK, (128, 128)).expect("render");
    assert!(!kinds(last_frame(&renderer)).contains(&PassKind::Scene));
    assert!(renderer.backend().screen().is_some());
}
