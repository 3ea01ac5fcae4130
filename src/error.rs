//! Error types shared by the asset, GPU and renderer layers.
//!
//! Construction-time failures (context, shader compilation, incomplete
//! render targets) are fatal and surface from [`crate::renderer::Renderer::new`].
//! Per-frame problems with a single model are logged and skipped instead.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Shader stage a compile error was reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    /// The graphics context (adapter, device or surface) could not be created.
    #[error("Failed to create graphics context: {0}")]
    Context(String),

    #[error("Failed to compile {stage} shader of program '{program}': {log}")]
    ShaderCompile {
        program: String,
        stage: ShaderStage,
        log: String,
    },

    #[error("Failed to link program '{program}': {log}")]
    ProgramLink { program: String, log: String },

    #[error("No shader source registered for program '{0}'")]
    MissingShader(String),

    /// A frame buffer was built from attachments that do not fit together.
    #[error("Render target '{target}' is incomplete: {reason}")]
    IncompleteTarget { target: String, reason: String },

    #[error("Out of GPU memory while allocating {0}")]
    OutOfMemory(String),

    /// A command referenced a backend object that does not exist.
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid {what}: {reason}")]
    InvalidData { what: &'static str, reason: String },
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
