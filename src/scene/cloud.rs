use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::asset::ResourceId;
use crate::time::Stamp;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Point {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

impl Point {
    pub fn new(position: Vec3, color: Vec4, size: f32) -> Self {
        Self {
            position: position.to_array(),
            size,
            color: color.to_array(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloudKind {
    Points,
    /// Consecutive pairs of points form segments.
    Lines,
}

/// Particles or line segments drawn after the opaque scene.
#[derive(Clone, Debug)]
pub struct Cloud {
    id: ResourceId,
    kind: CloudKind,
    points: Vec<Point>,
    /// Emissive clouds blend additively, others with alpha.
    pub emissive: bool,
    modified: Stamp,
}

impl Cloud {
    pub fn new(kind: CloudKind, points: Vec<Point>) -> Self {
        Self {
            id: ResourceId::next(),
            kind,
            points,
            emissive: true,
            modified: Stamp::now(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn kind(&self) -> CloudKind {
        self.kind
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn modified(&self) -> Stamp {
        self.modified
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
        self.modified = Stamp::now();
    }

    pub fn modify(&mut self, edit: impl FnOnce(&mut Vec<Point>)) {
        edit(&mut self.points);
        self.modified = Stamp::now();
    }
}
