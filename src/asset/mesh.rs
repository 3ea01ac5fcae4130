use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use super::ResourceId;
use crate::error::{RenderError, Result};
use crate::time::Stamp;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [f32; 2],
    pub weight: f32,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: [0.0; 3],
            uv: uv.to_array(),
            weight: 0.0,
        }
    }

    fn lerp(&self, other: &Vertex, amount: f32) -> Vertex {
        let mix3 = |a: [f32; 3], b: [f32; 3]| Vec3::from(a).lerp(Vec3::from(b), amount).to_array();
        Vertex {
            position: mix3(self.position, other.position),
            normal: mix3(self.normal, other.normal),
            tangent: mix3(self.tangent, other.tangent),
            uv: Vec2::from(self.uv).lerp(Vec2::from(other.uv), amount).to_array(),
            weight: self.weight + (other.weight - self.weight) * amount,
        }
    }
}

/// Indexed triangle geometry. Every mutation takes a fresh [`Stamp`] so the
/// renderer re-uploads it on the next load.
///
/// Clones keep the identity, so copy-on-write edits through `Arc::make_mut`
/// update the same GPU entry. Use [`Mesh::duplicate`] for an independent copy.
#[derive(Debug, Clone)]
pub struct Mesh {
    id: ResourceId,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    modified: Stamp,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            id: ResourceId::next(),
            vertices,
            indices,
            modified: Stamp::now(),
        }
    }

    /// Unit quad in the XY plane facing +Z, as two triangles.
    pub fn quad() -> Self {
        let normal = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), normal, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), normal, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), normal, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, Vec2::new(0.0, 0.0)),
        ];
        let mut mesh = Self::new(vertices, vec![0, 1, 2, 2, 3, 0]);
        mesh.calculate_tangents();
        mesh
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn duplicate(&self) -> Self {
        Self::new(self.vertices.clone(), self.indices.clone())
    }

    pub fn modified(&self) -> Stamp {
        self.modified
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn set_vertices(&mut self, vertices: Vec<Vertex>) {
        self.vertices = vertices;
        self.touch();
    }

    pub fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = indices;
        self.touch();
    }

    /// Edit vertices in place.
    pub fn modify(&mut self, edit: impl FnOnce(&mut [Vertex])) {
        edit(&mut self.vertices);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.modified = Stamp::now();
    }

    /// Blend two keyframes into this mesh. All three must share a vertex count.
    pub fn mix(&mut self, from: &Mesh, to: &Mesh, amount: f32) -> Result<()> {
        if from.vertices.len() != to.vertices.len() || from.vertices.len() != self.vertices.len() {
            return Err(RenderError::InvalidData {
                what: "keyframe",
                reason: format!(
                    "vertex counts differ ({}, {}, {})",
                    self.vertices.len(),
                    from.vertices.len(),
                    to.vertices.len()
                ),
            });
        }

        let amount = amount.clamp(0.0, 1.0);
        for ((out, a), b) in self.vertices.iter_mut().zip(&from.vertices).zip(&to.vertices) {
            *out = a.lerp(b, amount);
        }
        self.touch();
        Ok(())
    }

    /// Per-triangle tangents from positions and uvs, accumulated per vertex.
    pub fn calculate_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        for triangle in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (Some(v0), Some(v1), Some(v2)) = (
                self.vertices.get(i0),
                self.vertices.get(i1),
                self.vertices.get(i2),
            ) else {
                continue;
            };

            let edge1 = Vec3::from(v1.position) - Vec3::from(v0.position);
            let edge2 = Vec3::from(v2.position) - Vec3::from(v0.position);
            let duv1 = Vec2::from(v1.uv) - Vec2::from(v0.uv);
            let duv2 = Vec2::from(v2.uv) - Vec2::from(v0.uv);

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) / det;
            for index in [i0, i1, i2] {
                tangents[index] += tangent;
            }
        }

        for (vertex, tangent) in self.vertices.iter_mut().zip(tangents) {
            vertex.tangent = tangent.normalize_or_zero().to_array();
        }
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_two_triangles() {
        let quad = Mesh::quad();
        assert_eq!(quad.vertices().len(), 4);
        assert_eq!(quad.indices().len(), 6);
    }

    #[test]
    fn quad_tangents_follow_u_axis() {
        let quad = Mesh::quad();
        for vertex in quad.vertices() {
            assert!(Vec3::from(vertex.tangent).abs_diff_eq(Vec3::X, 1e-5));
        }
    }

    #[test]
    fn mutation_refreshes_stamp() {
        let mut mesh = Mesh::quad();
        let before = mesh.modified();
        mesh.modify(|vertices| vertices[0].position[2] = 1.0);
        assert!(mesh.modified() > before);
    }

    #[test]
    fn duplicate_gets_new_identity() {
        let mesh = Mesh::quad();
        let copy = mesh.duplicate();
        assert_ne!(mesh.id(), copy.id());
        assert_eq!(mesh.vertices(), copy.vertices());
        assert_eq!(mesh.clone().id(), mesh.id());
    }

    #[test]
    fn mix_interpolates_positions() {
        let from = Mesh::quad();
        let mut to = Mesh::quad();
        to.modify(|vertices| {
            for vertex in vertices {
                vertex.position[2] = 2.0;
            }
        });
        let mut mixed = Mesh::quad();
        mixed.mix(&from, &to, 0.25).expect("matching keyframes");
        for vertex in mixed.vertices() {
            assert!((vertex.position[2] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn mix_rejects_mismatched_keyframes() {
        let from = Mesh::quad();
        let to = Mesh::new(vec![Vertex::zeroed()], vec![]);
        let mut mixed = Mesh::quad();
        assert!(mixed.mix(&from, &to, 0.5).is_err());
    }
}
