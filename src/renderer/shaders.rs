use std::collections::HashMap;
use std::path::Path;

use crate::error::{RenderError, Result};
use crate::io;

const VERTEX_SUFFIX: &str = ".vert.wgsl";
const FRAGMENT_SUFFIX: &str = ".frag.wgsl";

/// Vertex and fragment source of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

/// Shader sources by program name.
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    sources: HashMap<String, ShaderSource>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sources shipped under `assets/shaders`, compiled into the binary.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        macro_rules! builtin {
            ($($name:literal),* $(,)?) => {
                $(
                    library.insert(
                        $name,
                        include_str!(concat!("../../assets/shaders/", $name, ".vert.wgsl")),
                        include_str!(concat!("../../assets/shaders/", $name, ".frag.wgsl")),
                    );
                )*
            };
        }
        builtin!("standard", "depth", "cloud", "box", "bloom", "blur", "compositing");
        library
    }

    /// Reads every `<name>.vert.wgsl` / `<name>.frag.wgsl` pair in `dir`.
    /// Stages without a partner are skipped with a warning.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| RenderError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut library = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|source| RenderError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(VERTEX_SUFFIX) else {
                continue;
            };

            let fragment_path = dir.join(format!("{name}{FRAGMENT_SUFFIX}"));
            if !fragment_path.is_file() {
                log::warn!("Skipping shader '{}': no fragment stage", name);
                continue;
            }
            let vertex = io::load_text(&path)?;
            let fragment = io::load_text(&fragment_path)?;
            library.insert(name, vertex, fragment);
        }

        log::info!("Loaded {} shader programs from {:?}", library.len(), dir);
        Ok(library)
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) {
        self.sources.insert(
            name.into(),
            ShaderSource {
                vertex: vertex.into(),
                fragment: fragment.into(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Result<&ShaderSource> {
        self.sources
            .get(name)
            .ok_or_else(|| RenderError::MissingShader(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_reported_by_name() {
        let library = ShaderLibrary::new();
        match library.get("standard") {
            Err(RenderError::MissingShader(name)) => assert_eq!(name, "standard"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builtin_has_every_program() {
        let library = ShaderLibrary::builtin();
        for name in ["standard", "depth", "cloud", "box", "bloom", "blur", "compositing"] {
            let source = library.get(name).expect("builtin shader");
            assert!(source.vertex.contains("vs_main"), "{name}");
            assert!(source.fragment.contains("fs_main"), "{name}");
        }
    }

    #[test]
    fn from_dir_pairs_stages() {
        let dir = std::env::temp_dir().join(format!("lumen-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        std::fs::write(dir.join("flat.vert.wgsl"), "fn vs_main() {}").expect("write");
        std::fs::write(dir.join("flat.frag.wgsl"), "fn fs_main() {}").expect("write");
        std::fs::write(dir.join("lonely.vert.wgsl"), "fn vs_main() {}").expect("write");

        let library = ShaderLibrary::from_dir(&dir).expect("library");
        assert!(library.contains("flat"));
        assert!(!library.contains("lonely"));
        assert_eq!(library.get("flat").expect("flat").fragment, "fn fs_main() {}");

        std::fs::remove_dir_all(&dir).ok();
    }
}
