pub mod cache;
pub mod id;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod model;
pub mod texture;

use std::path::Path;
use std::sync::Arc;

pub use cache::AssetCache;
pub use id::ResourceId;
pub use loader::{BackgroundLoader, LoadedTexture};
pub use material::{Channel, Material};
pub use mesh::{Mesh, Vertex};
pub use model::Model;
pub use texture::{Filter, Format, Texture, Texture2D, TextureCube, TextureData, Wrap};

use crate::error::Result;

pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub textures: AssetCache<Texture>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            textures: AssetCache::new(),
        }
    }

    pub fn texture(&mut self, path: impl AsRef<Path>, color_data: bool) -> Result<Arc<Texture>> {
        self.textures.get_or_load(path, |path| {
            Texture2D::from_path(path, color_data).map(Texture::from)
        })
    }

    /// Registers a texture finished by the [`BackgroundLoader`].
    pub fn insert_loaded(&mut self, loaded: LoadedTexture) -> Result<Arc<Texture>> {
        let texture = loaded.result?;
        Ok(self.textures.insert(loaded.path, texture))
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
