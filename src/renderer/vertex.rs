//! Vertex types for slot meshes

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::sim::grid::Color;

/// Vertex with position and color, laid out for direct upload
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(x: f32, y: f32, z: f32, color: [f32; 4]) -> Self {
        Self {
            position: [x, y, z],
            color,
        }
    }

    pub fn at(position: Vec3, color: Color) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
        }
    }
}

/// Raw bytes of a vertex slice
pub fn as_bytes(vertices: &[Vertex]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}

/// Colors for elements that carry no palette color of their own
pub mod colors {
    pub const HINT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
    pub const STAMP_FRAME: [f32; 4] = [0.7, 0.7, 0.8, 1.0];
    pub const STAMP_INVULNERABLE: [f32; 4] = [0.4, 0.7, 1.0, 1.0];
    pub const STAMP_MULTIPLIER: [f32; 4] = [0.9, 0.85, 0.3, 1.0];
    pub const BACKGROUND: [f32; 4] = [0.02, 0.02, 0.05, 1.0];
}
