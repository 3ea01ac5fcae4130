use crate::asset::{Mesh, Model, ResourceId, Texture};
use crate::error::Result;
use crate::gpu::{self, Backend, Resource};
use crate::renderer::resources::GpuResources;
use crate::scene::{Cloud, TextureTarget};

/// CPU resources that can be uploaded into the renderer's pools.
///
/// Loading is staleness checked: an entry holding data at least as new as
/// the resource is left alone, so calling `load` every frame only uploads
/// what changed.
pub trait Loadable {
    type Handle;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<Self::Handle>;

    /// Releases the GPU copy. Does nothing when it was never loaded.
    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B);
}

impl Loadable for Mesh {
    type Handle = gpu::Mesh;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<gpu::Mesh> {
        resources.load_mesh(backend, self)?;
        Ok(gpu::Mesh {
            resource: Resource::new(self.id()),
            vertex_count: self.vertices().len() as u32,
            index_count: self.indices().len() as u32,
        })
    }

    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) {
        resources.unload_geometry(backend, self.id());
    }
}

impl Loadable for Texture {
    type Handle = gpu::Texture;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<gpu::Texture> {
        resources.load_texture(backend, self)?;
        let data = self.data();
        Ok(gpu::Texture {
            resource: Resource::new(self.id()),
            width: data.width,
            height: data.height,
        })
    }

    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) {
        resources.unload_texture(backend, self.id());
    }
}

impl Loadable for Cloud {
    type Handle = Resource;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<Resource> {
        resources.load_cloud(backend, self)?;
        Ok(Resource::new(self.id()))
    }

    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) {
        resources.unload_geometry(backend, self.id());
    }
}

impl Loadable for TextureTarget {
    /// The color texture the target renders into.
    type Handle = gpu::Texture;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<gpu::Texture> {
        resources.load_texture_target(backend, self)?;
        let (width, height) = self.size();
        Ok(gpu::Texture {
            resource: Resource::new(self.texture().id()),
            width,
            height,
        })
    }

    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) {
        resources.unload_texture_target(backend, self);
    }
}

/// Ids first uploaded by a model load, unloaded again if the load fails.
#[derive(Default)]
struct Fresh {
    meshes: Vec<ResourceId>,
    textures: Vec<ResourceId>,
}

impl Fresh {
    fn rollback<B: Backend>(self, resources: &mut GpuResources, backend: &mut B) {
        for id in self.meshes {
            resources.unload_geometry(backend, id);
        }
        for id in self.textures {
            resources.unload_texture(backend, id);
        }
    }
}

fn load_model<B: Backend>(
    model: &Model,
    resources: &mut GpuResources,
    backend: &mut B,
    fresh: &mut Fresh,
) -> Result<gpu::Model> {
    let mesh = match &model.mesh {
        Some(mesh) => {
            if resources.vertex_array(mesh.id()).is_none() {
                fresh.meshes.push(mesh.id());
            }
            Some(mesh.load(resources, backend)?)
        }
        None => None,
    };

    let mut textures = Vec::new();
    for texture in model.material.textures() {
        if resources.texture(texture.id()).is_none() {
            fresh.textures.push(texture.id());
        }
        textures.push(texture.load(resources, backend)?);
    }

    let models = model
        .models
        .iter()
        .map(|child| load_model(child, resources, backend, fresh))
        .collect::<Result<Vec<_>>>()?;

    Ok(gpu::Model {
        resource: Resource::new(model.id()),
        mesh,
        textures,
        transform: model.transform,
        models,
    })
}

/// A model loads its mesh, material textures and children as one unit:
/// either everything is uploaded or nothing new stays behind.
impl Loadable for Model {
    type Handle = gpu::Model;

    fn load<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) -> Result<gpu::Model> {
        let mut fresh = Fresh::default();
        match load_model(self, resources, backend, &mut fresh) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                log::warn!("Loading model '{}' failed, rolling back: {}", self.name, err);
                fresh.rollback(resources, backend);
                Err(err)
            }
        }
    }

    /// Meshes and textures shared with other models are released as well.
    fn unload<B: Backend>(&self, resources: &mut GpuResources, backend: &mut B) {
        if let Some(mesh) = &self.mesh {
            mesh.unload(resources, backend);
        }
        for texture in self.material.textures() {
            texture.unload(resources, backend);
        }
        for child in &self.models {
            child.unload(resources, backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Material, Texture2D};
    use crate::gpu::HeadlessBackend;
    use std::sync::Arc;

    fn textured_model() -> Model {
        let texture = Arc::new(Texture::from(Texture2D::from_color([200, 100, 50, 255])));
        let mut material = Material::default();
        material.albedo = material.albedo.with_texture(texture);
        Model::new("quad", Arc::new(Mesh::quad()), material)
    }

    #[test]
    fn model_handle_mirrors_hierarchy() {
        let mut backend = HeadlessBackend::new();
        let mut resources = GpuResources::new();
        let model = Model::group("root").with_child(textured_model());

        let handle = model.load(&mut resources, &mut backend).expect("load");
        assert!(handle.mesh.is_none());
        assert_eq!(handle.models.len(), 1);
        let child = &handle.models[0];
        assert_eq!(child.mesh.map(|mesh| mesh.index_count), Some(6));
        assert_eq!(child.textures.len(), 1);
        assert!(child.textures[0].resource.valid());
    }

    #[test]
    fn failed_model_load_leaves_nothing_behind() {
        let mut backend = HeadlessBackend::new();
        let mut resources = GpuResources::new();
        let model = textured_model();

        // Vertex buffer, element buffer and vertex array fit; the texture does not.
        backend.fail_after(3);
        assert!(model.load(&mut resources, &mut backend).is_err());
        assert!(resources.is_empty());
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_vertex_arrays(), 0);
    }

    #[test]
    fn unload_releases_every_pool_entry() {
        let mut backend = HeadlessBackend::new();
        let mut resources = GpuResources::new();
        let model = textured_model();
        model.load(&mut resources, &mut backend).expect("load");
        assert!(!resources.is_empty());

        model.unload(&mut resources, &mut backend);
        assert!(resources.is_empty());
        assert_eq!(backend.live_textures(), 0);
    }
}
