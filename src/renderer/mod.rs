//! Abstract rendering contract
//!
//! The core owns no graphics resources. Every frame, `draw_scene` rebuilds
//! drawables from simulation state and hands them to a `Renderer`, so a
//! backend may drop all of its handles at any time (context loss, resize)
//! without the simulation noticing.

pub mod shapes;
pub mod vertex;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::consts::CUBE_RADIUS;
use crate::sim::cube::{Cube, back_face, front_face};
use crate::sim::grid::{Color, PieceTemplate};
use crate::sim::piece::Stage;
use crate::sim::powerup::PowerUpKind;
use crate::sim::state::GameState;

pub use vertex::Vertex;

/// How a drawable combines with what is already drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendState {
    Opaque,
    Alpha,
    /// Glows and flashes
    Additive,
}

/// Backend the scene walk issues draws to
pub trait Renderer {
    type Drawable;

    fn create_drawable(&mut self, vertices: &[Vertex]) -> Self::Drawable;
    fn set_transform(&mut self, drawable: &mut Self::Drawable, transform: Mat4);
    fn set_blend_state(&mut self, blend: BlendState);
    fn draw(&mut self, drawable: &Self::Drawable);
}

/// Cube model matrix (scale, spin and translation)
pub fn cube_transform(cube: &Cube) -> Mat4 {
    let rot = cube.rotation;
    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        rot.x.to_radians(),
        rot.y.to_radians(),
        rot.z.to_radians(),
    );
    Mat4::from_scale_rotation_translation(Vec3::splat(cube.scale), rotation, cube.translation)
}

fn submit<R: Renderer>(renderer: &mut R, vertices: &[Vertex], transform: Mat4) -> usize {
    if vertices.is_empty() {
        return 0;
    }
    let mut drawable = renderer.create_drawable(vertices);
    renderer.set_transform(&mut drawable, transform);
    renderer.draw(&drawable);
    1
}

fn tinted(template: &PieceTemplate, color: Color, alpha: f32) -> Vec<Vertex> {
    shapes::template_mesh(template, color, 1.0, alpha)
}

/// Issue every draw for one frame. Returns the number of draw calls.
pub fn draw_scene<R: Renderer>(renderer: &mut R, state: &GameState) -> usize {
    let mut draws = 0;
    let cube = &state.cube;

    if cube.is_visible() {
        renderer.set_blend_state(BlendState::Opaque);
        let model = cube_transform(cube);
        for (pos, face) in cube.faces.iter().enumerate() {
            if !face.visible {
                continue;
            }
            let transform = model * shapes::face_transform(pos, face.flee);
            draws += submit(renderer, &shapes::face_mesh(face), transform);
        }
    }

    renderer.set_blend_state(BlendState::Alpha);
    for piece in state.launcher.pieces().chain(state.launcher.obsolete_pieces()) {
        let pos = front_face(piece.orient);
        let mesh = match piece.stage {
            Stage::Idle => continue,
            Stage::Hint => {
                if piece.hint_cancelled {
                    continue;
                }
                tinted(&piece.hint, Color::from(vertex::colors::HINT), piece.glow)
            }
            Stage::Falling | Stage::Obsolete => {
                shapes::template_mesh(piece.current_template(), piece.color, piece.slot_scale, piece.alpha)
            }
        };
        let dist = if piece.stage == Stage::Hint { 0.0 } else { piece.total_dist() };
        draws += submit(renderer, &mesh, shapes::face_transform(pos, dist));
    }

    for rejection in state.launcher.rejections() {
        let template = &rejection.template;
        let mesh = tinted(template, template.fill_color, rejection.alpha);
        let transform = shapes::face_transform(front_face(template.orient), rejection.offset);
        draws += submit(renderer, &mesh, transform);
    }

    for slot in state.stamps.slots().iter().filter(|s| s.is_visible()) {
        let pos = back_face(slot.axis);
        let transform = shapes::face_transform(pos, slot.distance() - CUBE_RADIUS);
        let color = match slot.power_up {
            Some(PowerUpKind::Invulnerable) => vertex::colors::STAMP_INVULNERABLE,
            Some(PowerUpKind::Multiplier) => vertex::colors::STAMP_MULTIPLIER,
            None => vertex::colors::STAMP_FRAME,
        };
        let color = Color::from(color);
        draws += submit(renderer, &shapes::frame(0.1, color.with_w(slot.opacity)), transform);

        if slot.overlay.visible
            && let Some(template) = state.stamps.overlay_template(slot.axis)
        {
            let overlay = &slot.overlay;
            let alpha = overlay.alpha * slot.opacity;
            let mesh = shapes::template_mesh(&template, template.fill_color, overlay.slot_scale, alpha);
            draws += submit(renderer, &mesh, transform);
        }
    }

    if state.launcher.global_glow() > 0.0 {
        renderer.set_blend_state(BlendState::Additive);
        for axis in state.launcher.directions() {
            let Some(color) = state.launcher.axis_color(*axis) else {
                continue;
            };
            let glow = color.with_w(state.launcher.global_glow());
            draws += submit(
                renderer,
                &shapes::frame(0.05, glow),
                shapes::face_transform(front_face(*axis), 0.0),
            );
        }
    }

    draws
}
