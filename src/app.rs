//! Small viewer: one window, a lit demo scene, rendered every redraw.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::asset::{Material, Mesh, Model};
use crate::error::{RenderError, Result};
use crate::gpu::WgpuBackend;
use crate::renderer::{Renderer, ShaderLibrary};
use crate::scene::{Camera, Cloud, CloudKind, DebugBox, DirectionalLight, Point, Scene};
use crate::settings::{RenderSettings, Resolution};

const CLEAR_COLOR: [f32; 4] = [0.05, 0.06, 0.08, 1.0];

/// A floor, two tiles and a spark cloud under one directional light.
pub fn demo_scene(aspect: f32) -> Scene {
    let quad = Arc::new(Mesh::quad());
    let floor = Model::new("floor", quad.clone(), Material::from_albedo(Vec3::splat(0.8)))
        .with_transform(
            Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2) * Mat4::from_scale(Vec3::splat(10.0)),
        );
    let tiles = Model::group("tiles")
        .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)))
        .with_child(
            Model::new("red", quad.clone(), Material::from_albedo(Vec3::new(0.9, 0.2, 0.2)))
                .with_transform(Mat4::from_translation(Vec3::new(-0.75, 0.0, 0.0))),
        )
        .with_child(
            Model::new("blue", quad, Material::from_albedo(Vec3::new(0.2, 0.3, 0.9)))
                .with_transform(Mat4::from_translation(Vec3::new(0.75, 0.0, 0.0))),
        );

    let camera = Camera::new(
        Vec3::new(0.0, 2.0, 4.0),
        Vec3::new(0.0, 0.5, 0.0),
        60f32.to_radians(),
        aspect,
        0.1,
        50.0,
    );
    let mut scene = Scene::new(camera);
    scene.models = vec![floor, tiles];
    scene.directional_light = Some(DirectionalLight::new(
        Vec3::new(-0.4, -1.0, -0.3),
        Vec3::ONE,
        3.0,
    ));
    scene.clouds.push(Cloud::new(
        CloudKind::Points,
        (0..64)
            .map(|index| {
                let angle = index as f32 * 0.3;
                Point::new(
                    Vec3::new(angle.cos() * 1.5, 1.0 + index as f32 * 0.02, angle.sin() * 1.5),
                    Vec4::new(1.0, 0.7, 0.3, 1.0),
                    2.0,
                )
            })
            .collect(),
    ));
    scene
        .boxes
        .push(DebugBox::new(Mat4::from_translation(Vec3::new(0.0, 0.5, 0.0)), Vec3::new(2.5, 1.0, 0.2)));
    scene
}

pub struct App {
    settings: RenderSettings,
    shaders: ShaderLibrary,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuBackend>>,
    scene: Scene,
    error: Option<RenderError>,
}

impl App {
    pub fn new(settings: RenderSettings, shaders: ShaderLibrary) -> Self {
        let scene = demo_scene(settings.resolution.aspect());
        Self {
            settings,
            shaders,
            window: None,
            renderer: None,
            scene,
            error: None,
        }
    }

    /// The error that ended the event loop, if any.
    pub fn take_error(&mut self) -> Option<RenderError> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        log::error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let resolution = self.settings.resolution;
        let attributes = Window::default_attributes()
            .with_title("lumen viewer")
            .with_inner_size(winit::dpi::PhysicalSize::new(resolution.width, resolution.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| RenderError::Context(err.to_string()))?,
        );
        let backend = pollster::block_on(WgpuBackend::new(window.clone(), &self.settings))?;
        let renderer = Renderer::new(backend, &self.settings, &self.shaders)?;
        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (&self.window, self.renderer.as_mut()) else {
            return Ok(());
        };
        let size = window.inner_size();
        let resolution = Resolution::new(size.width.max(1), size.height.max(1));
        self.scene.camera.aspect = resolution.aspect();
        match renderer.render(std::slice::from_ref(&self.scene), CLEAR_COLOR, resolution) {
            Ok(()) => {}
            Err(RenderError::Surface(err)) => log::warn!("Dropped frame: {err}"),
            Err(err) => return Err(err),
        }
        window.request_redraw();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|window| window.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.backend_mut().resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }
            _ => {}
        }
    }
}
