use std::sync::Arc;

use super::Camera;
use crate::asset::{Format, ResourceId, Texture, Texture2D};
use crate::error::Result;

/// Render-to-texture: the scene is drawn from `camera` into `texture`, which
/// materials may then sample like any other texture.
#[derive(Clone, Debug)]
pub struct TextureTarget {
    id: ResourceId,
    pub camera: Camera,
    texture: Arc<Texture>,
}

impl TextureTarget {
    pub fn new(width: u32, height: u32, camera: Camera) -> Result<Self> {
        let texture = Texture2D::empty(width, height, Format::Rgba16F)?;
        Ok(Self {
            id: ResourceId::next(),
            camera,
            texture: Arc::new(texture.into()),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        let data = self.texture.data();
        (data.width, data.height)
    }
}
