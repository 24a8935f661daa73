//! Mesh generation for face grids, pieces and stamps
//!
//! Meshes are built in face space: the face lies in the XY plane over
//! [-1, 1]² facing +Z. `face_transform` places face space on a cube side.

use glam::{Mat4, Vec2, Vec3};
use std::f32::consts::FRAC_PI_2;

use super::vertex::Vertex;
use crate::consts::CUBE_RADIUS;
use crate::sim::cube::{BACK, BOTTOM, FRONT, LEFT, RIGHT, TOP};
use crate::sim::grid::{Color, FaceGrid, PieceTemplate};

/// Fraction of a slot cell covered by the slot itself
const SLOT_FILL: f32 = 0.9;

/// Two triangles covering `min..max`
pub fn rect(min: Vec2, max: Vec2, color: Color) -> [Vertex; 6] {
    let a = Vertex::at(Vec3::new(min.x, min.y, 0.0), color);
    let b = Vertex::at(Vec3::new(max.x, min.y, 0.0), color);
    let c = Vertex::at(Vec3::new(max.x, max.y, 0.0), color);
    let d = Vertex::at(Vec3::new(min.x, max.y, 0.0), color);
    [a, b, c, c, d, a]
}

/// Center of slot `index` in a `dimen × dimen` grid (row-major, row 0 on top)
pub fn slot_center(dimen: usize, index: usize) -> Vec2 {
    let cell = 2.0 / dimen as f32;
    let col = (index % dimen) as f32;
    let row = (index / dimen) as f32;
    Vec2::new(-1.0 + cell * (col + 0.5), 1.0 - cell * (row + 0.5))
}

fn slot_quad(dimen: usize, index: usize, scale: f32, color: Color) -> [Vertex; 6] {
    let half = Vec2::splat(SLOT_FILL * scale / dimen as f32);
    let center = slot_center(dimen, index);
    rect(center - half, center + half, color)
}

/// Every visible slot of a face, sized by its slot animation
pub fn face_mesh(face: &FaceGrid) -> Vec<Vertex> {
    let mut vertices = Vec::with_capacity(face.slot_count() * 6);
    for (i, slot) in face.slots.iter().enumerate() {
        if slot.invisible || slot.scale <= 0.0 {
            continue;
        }
        vertices.extend(slot_quad(face.dimen, i, slot.scale, slot.color));
    }
    vertices
}

/// Filled slots of a template in one color
pub fn template_mesh(template: &PieceTemplate, color: Color, slot_scale: f32, alpha: f32) -> Vec<Vertex> {
    let color = color.with_w(color.w * alpha);
    let mut vertices = Vec::with_capacity(template.fill.len() * 6);
    for (i, _) in template.fill.iter().enumerate().filter(|(_, filled)| **filled) {
        vertices.extend(slot_quad(template.dimen, i, slot_scale, color));
    }
    vertices
}

/// Square outline around the face area
pub fn frame(thickness: f32, color: Color) -> Vec<Vertex> {
    let outer = 1.0 + thickness;
    let mut vertices = Vec::with_capacity(24);
    vertices.extend(rect(Vec2::new(-outer, 1.0), Vec2::new(outer, outer), color));
    vertices.extend(rect(Vec2::new(-outer, -outer), Vec2::new(outer, -1.0), color));
    vertices.extend(rect(Vec2::new(-outer, -1.0), Vec2::new(-1.0, 1.0), color));
    vertices.extend(rect(Vec2::new(1.0, -1.0), Vec2::new(outer, 1.0), color));
    vertices
}

/// Outward unit normal of a face position
pub fn face_normal(pos: usize) -> Vec3 {
    match pos {
        FRONT => Vec3::Z,
        RIGHT => Vec3::X,
        TOP => Vec3::Y,
        BACK => Vec3::NEG_Z,
        LEFT => Vec3::NEG_X,
        BOTTOM => Vec3::NEG_Y,
        _ => {
            log::warn!("Unknown face position {pos}");
            Vec3::Z
        }
    }
}

/// Face space to model space for a face position, `offset` beyond the unit cube
pub fn face_transform(pos: usize, offset: f32) -> Mat4 {
    let rotation = match pos {
        RIGHT => Mat4::from_rotation_y(FRAC_PI_2),
        LEFT => Mat4::from_rotation_y(-FRAC_PI_2),
        TOP => Mat4::from_rotation_x(-FRAC_PI_2),
        BOTTOM => Mat4::from_rotation_x(FRAC_PI_2),
        BACK => Mat4::from_rotation_y(std::f32::consts::PI),
        _ => Mat4::IDENTITY,
    };
    Mat4::from_translation(face_normal(pos) * (CUBE_RADIUS + offset)) * rotation
}
