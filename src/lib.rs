pub mod app;
pub mod asset;
pub mod error;
pub mod gpu;
pub mod io;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod time;

pub use error::{RenderError, Result};
pub use renderer::{Loadable, Renderer, RendererStats, ShaderLibrary};
pub use settings::{RenderSettings, Resolution};

/// Installs `env_logger` with an `info` default that `RUST_LOG` overrides.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
