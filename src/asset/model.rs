use std::sync::Arc;

use glam::Mat4;

use super::{Material, Mesh, ResourceId};

/// A node in a model hierarchy. Children are owned; meshes are shared.
#[derive(Debug, Clone)]
pub struct Model {
    id: ResourceId,
    pub name: String,
    pub mesh: Option<Arc<Mesh>>,
    pub material: Material,
    pub transform: Mat4,
    pub models: Vec<Model>,
}

impl Model {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, material: Material) -> Self {
        Self {
            id: ResourceId::next(),
            name: name.into(),
            mesh: Some(mesh),
            material,
            transform: Mat4::IDENTITY,
            models: Vec::new(),
        }
    }

    /// A transform-only node that groups children.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::next(),
            name: name.into(),
            mesh: None,
            material: Material::default(),
            transform: Mat4::IDENTITY,
            models: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: Model) -> Self {
        self.models.push(child);
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Calls `visit` for this model and every descendant with its world
    /// transform.
    pub fn visit(&self, parent: Mat4, visit: &mut impl FnMut(&Model, Mat4)) {
        let world = parent * self.transform;
        visit(self, world);
        for child in &self.models {
            child.visit(world, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn visit_composes_transforms() {
        let child = Model::new("child", Arc::new(Mesh::quad()), Material::default())
            .with_transform(Mat4::from_translation(Vec3::Y));
        let root = Model::group("root")
            .with_transform(Mat4::from_translation(Vec3::X))
            .with_child(child);

        let mut seen = Vec::new();
        root.visit(Mat4::IDENTITY, &mut |model, world| {
            seen.push((model.name.clone(), world.transform_point3(Vec3::ZERO)));
        });

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "root");
        assert!(seen[0].1.abs_diff_eq(Vec3::X, 1e-6));
        assert!(seen[1].1.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }
}
