use lumen::app::App;
use lumen::{RenderError, RenderSettings, Result, ShaderLibrary};
use winit::event_loop::EventLoop;

fn main() -> Result<()> {
    lumen::init_logging();

    let settings = RenderSettings::load();
    let shaders = match std::env::args().nth(1) {
        Some(dir) => ShaderLibrary::from_dir(dir)?,
        None => ShaderLibrary::builtin(),
    };

    let event_loop = EventLoop::new().map_err(|err| RenderError::Context(err.to_string()))?;
    let mut app = App::new(settings, shaders);
    let result = event_loop.run_app(&mut app);
    if let Err(err) = result {
        log::error!("Event loop error: {}", err);
        return Err(RenderError::Context(err.to_string()));
    }

    log::info!("Viewer shutdown complete");
    match app.take_error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
