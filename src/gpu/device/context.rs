use std::sync::Arc;

use winit::window::Window;

use crate::error::{RenderError, Result};
use crate::settings::RenderSettings;

/// Color format of the offscreen screen image when no window is attached.
pub(crate) const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) struct SurfaceState {
    pub(crate) surface: wgpu::Surface<'static>,
    pub(crate) config: wgpu::SurfaceConfiguration,
}

pub(crate) struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) surface: Option<SurfaceState>,
}

impl GpuContext {
    /// With a window the screen is its surface; without one the backend
    /// renders the screen offscreen.
    pub(crate) async fn new(window: Option<Arc<Window>>, settings: &RenderSettings) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match &window {
            Some(window) => Some(
                instance
                    .create_surface(window.clone())
                    .map_err(|err| RenderError::Context(format!("surface: {err}")))?,
            ),
            None => None,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::Context(format!("adapter: {err}")))?;

        log::info!("Using adapter: {:?}", adapter.get_info());
        log::info!("Using backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| RenderError::Context(format!("device: {err}")))?;

        let surface = match (surface, window) {
            (Some(surface), Some(window)) => {
                let size = window.inner_size();
                let caps = surface.get_capabilities(&adapter);

                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| !f.is_srgb())
                    .or_else(|| caps.formats.first().copied())
                    .ok_or_else(|| RenderError::Context("surface has no formats".into()))?;

                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: size.width.max(1),
                    height: size.height.max(1),
                    present_mode: settings.present_mode(&caps.present_modes),
                    alpha_mode: caps
                        .alpha_modes
                        .first()
                        .copied()
                        .unwrap_or(wgpu::CompositeAlphaMode::Auto),
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&device, &config);
                log::info!("Surface configured: {:?} {}x{}", format, config.width, config.height);
                Some(SurfaceState { surface, config })
            }
            _ => None,
        };

        Ok(Self {
            device,
            queue,
            surface,
        })
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = self.surface.as_mut() {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }

    pub(crate) fn screen_format(&self) -> wgpu::TextureFormat {
        self.surface
            .as_ref()
            .map_or(OFFSCREEN_FORMAT, |state| state.config.format)
    }

    pub(crate) fn reconfigure(&self) {
        if let Some(state) = self.surface.as_ref() {
            state.surface.configure(&self.device, &state.config);
        }
    }
}
