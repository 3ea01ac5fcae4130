use glam::Mat4;

use crate::asset::ResourceId;

/// Identity plus validity of something uploaded to the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resource {
    id: u32,
    valid: bool,
}

impl Resource {
    /// Id carried by default-constructed, invalid handles.
    pub const INVALID_ID: u32 = u32::MAX;

    pub fn new(id: ResourceId) -> Self {
        Self {
            id: id.value(),
            valid: true,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn valid(&self) -> bool {
        self.valid
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            id: Self::INVALID_ID,
            valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mesh {
    pub resource: Resource,
    pub vertex_count: u32,
    pub index_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Texture {
    pub resource: Resource,
    pub width: u32,
    pub height: u32,
}

/// Handles for a loaded model hierarchy. Textures are listed in material
/// order: albedo, roughness, metallic, emission, ambient occlusion, normal.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub resource: Resource,
    pub mesh: Option<Mesh>,
    pub textures: Vec<Texture>,
    pub transform: Mat4,
    pub models: Vec<Model>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handle_is_invalid() {
        let handle = Resource::default();
        assert!(!handle.valid());
        assert_eq!(handle.id(), Resource::INVALID_ID);
        assert!(!Mesh::default().resource.valid());
    }

    #[test]
    fn new_handle_is_valid() {
        let id = ResourceId::next();
        let handle = Resource::new(id);
        assert!(handle.valid());
        assert_eq!(handle.id(), id.value());
    }
}
