use super::backend::{FrameBufferId, ProgramId, TextureId, VertexArrayId};

/// What a pass is for. Backends use it for labels; tests use it to check
/// pass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    TextureTarget,
    CascadedShadowMap { cascade: usize },
    ShadowMap { light: usize },
    ShadowBlur,
    Environment { light: usize, face: usize },
    Scene,
    Bloom,
    Blur,
    Compositing,
}

impl PassKind {
    pub fn label(self) -> &'static str {
        match self {
            PassKind::TextureTarget => "TextureTargetPass",
            PassKind::CascadedShadowMap { .. } => "CascadedShadowPass",
            PassKind::ShadowMap { .. } => "ShadowPass",
            PassKind::ShadowBlur => "ShadowBlurPass",
            PassKind::Environment { .. } => "EnvironmentPass",
            PassKind::Scene => "ScenePass",
            PassKind::Bloom => "BloomPass",
            PassKind::Blur => "BlurPass",
            PassKind::Compositing => "CompositingPass",
        }
    }

    pub fn is_shadow(self) -> bool {
        matches!(
            self,
            PassKind::CascadedShadowMap { .. } | PassKind::ShadowMap { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassTarget {
    FrameBuffer(FrameBufferId),
    /// The presentable output: a window surface or an offscreen image.
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clear {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
}

impl Clear {
    pub const NONE: Clear = Clear {
        color: None,
        depth: None,
    };

    pub fn all(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }

    pub fn color(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: None,
        }
    }

    pub fn depth() -> Self {
        Self {
            color: None,
            depth: Some(1.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Lines,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Opaque,
    Alpha,
    Additive,
}

/// Fixed-function state of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub topology: Topology,
    pub blend: Blend,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_back: bool,
}

impl PipelineState {
    pub const OPAQUE: PipelineState = PipelineState {
        topology: Topology::Triangles,
        blend: Blend::Opaque,
        depth_test: true,
        depth_write: true,
        cull_back: true,
    };

    /// Full-screen quads in post-processing.
    pub const FULLSCREEN: PipelineState = PipelineState {
        topology: Topology::Triangles,
        blend: Blend::Opaque,
        depth_test: false,
        depth_write: false,
        cull_back: false,
    };

    pub fn with_blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn read_only_depth(mut self) -> Self {
        self.depth_write = false;
        self
    }

    pub fn double_sided(mut self) -> Self {
        self.cull_back = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    pub count: u32,
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub state: PipelineState,
    pub range: DrawRange,
    /// Uniform block bytes, laid out as the program declares them.
    pub uniforms: Vec<u8>,
    /// One texture per program slot, in slot order.
    pub textures: Vec<TextureId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub kind: PassKind,
    pub target: PassTarget,
    pub viewport: (u32, u32),
    pub clear: Clear,
    pub draws: Vec<Draw>,
}

impl Pass {
    pub fn new(kind: PassKind, target: PassTarget, viewport: (u32, u32), clear: Clear) -> Self {
        Self {
            kind,
            target,
            viewport,
            clear,
            draws: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pass(Pass),
    /// Resolves a multisampled color attachment into a single-sampled one.
    Resolve {
        source: FrameBufferId,
        destination: FrameBufferId,
    },
}

/// Commands recorded for one call to `Renderer::render`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    commands: Vec<Command>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn push_pass(&mut self, pass: Pass) {
        self.commands.push(Command::Pass(pass));
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.commands.iter().filter_map(|command| match command {
            Command::Pass(pass) => Some(pass),
            Command::Resolve { .. } => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.passes().map(|pass| pass.draws.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_skip_resolves() {
        let mut frame = Frame::new();
        frame.push_pass(Pass::new(
            PassKind::Scene,
            PassTarget::Screen,
            (4, 4),
            Clear::all([0.0; 4]),
        ));
        frame.push(Command::Resolve {
            source: FrameBufferId::from_raw(0),
            destination: FrameBufferId::from_raw(1),
        });
        assert_eq!(frame.commands().len(), 2);
        assert_eq!(frame.passes().count(), 1);
        assert_eq!(frame.draw_count(), 0);
    }
}
