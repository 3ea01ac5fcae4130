use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu::{
    Backend, BufferId, BufferKind, DrawRange, VertexArrayDesc, VertexArrayId, VertexLayout,
};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

/// Two triangles covering clip space.
pub(crate) const FULLSCREEN_QUAD: [QuadVertex; 6] = [
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
];

/// Corners of the unit box centered on the origin.
pub(crate) const BOX_CORNERS: [[f32; 3]; 8] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, -0.5],
    [-0.5, -0.5, 0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, 0.5],
    [-0.5, 0.5, 0.5],
];

/// Line list over [`BOX_CORNERS`]: bottom ring, top ring, verticals.
pub(crate) const BOX_EDGES: [u32; 24] = [
    0, 1, 1, 2, 2, 3, 3, 0, //
    4, 5, 5, 6, 6, 7, 7, 4, //
    0, 4, 1, 5, 2, 6, 3, 7,
];

/// Geometry uploaded once at construction and owned by the renderer.
pub(crate) struct StaticGeometry {
    pub(crate) vertex_array: VertexArrayId,
    pub(crate) range: DrawRange,
    buffers: Vec<BufferId>,
}

impl StaticGeometry {
    pub(crate) fn fullscreen_quad<B: Backend>(backend: &mut B) -> Result<Self> {
        let vertices = backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&FULLSCREEN_QUAD))?;
        let vertex_array = backend.create_vertex_array(&VertexArrayDesc {
            layout: VertexLayout::Quad,
            vertex_buffer: vertices,
            index_buffer: None,
        })?;
        Ok(Self {
            vertex_array,
            range: DrawRange {
                count: FULLSCREEN_QUAD.len() as u32,
                indexed: false,
            },
            buffers: vec![vertices],
        })
    }

    pub(crate) fn unit_box<B: Backend>(backend: &mut B) -> Result<Self> {
        let vertices = backend.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&BOX_CORNERS))?;
        let indices = backend.create_buffer(BufferKind::Index, bytemuck::cast_slice(&BOX_EDGES))?;
        let vertex_array = backend.create_vertex_array(&VertexArrayDesc {
            layout: VertexLayout::Position,
            vertex_buffer: vertices,
            index_buffer: Some(indices),
        })?;
        Ok(Self {
            vertex_array,
            range: DrawRange {
                count: BOX_EDGES.len() as u32,
                indexed: true,
            },
            buffers: vec![vertices, indices],
        })
    }

    pub(crate) fn destroy<B: Backend>(&self, backend: &mut B) {
        backend.destroy_vertex_array(self.vertex_array);
        for buffer in &self.buffers {
            backend.destroy_buffer(*buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_edges_are_twelve_unit_lines() {
        assert_eq!(BOX_EDGES.len(), 24);
        for edge in BOX_EDGES.chunks_exact(2) {
            let a = BOX_CORNERS[edge[0] as usize];
            let b = BOX_CORNERS[edge[1] as usize];
            let length: f32 = a.iter().zip(b).map(|(a, b)| (a - b).abs()).sum();
            assert!((length - 1.0).abs() < 1e-6, "edge {edge:?} is not axis aligned");
        }
    }

    #[test]
    fn quad_vertices_match_layout_stride() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), VertexLayout::Quad.stride());
    }
}
