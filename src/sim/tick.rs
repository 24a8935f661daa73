//! Fixed timestep simulation tick
//!
//! Applies one tick of player input, advances the game, and flushes queued
//! sounds to the audio sink.

use crate::audio::AudioSink;
use crate::sim::cube::{Cube, RotateDir};
use crate::sim::grid::Axis;
use crate::sim::piece::Stage;
use crate::sim::state::{Game, GamePhase};

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Quarter turn of the cube
    pub rotate: Option<(Axis, RotateDir)>,
    /// Tap a piece on an axis, or `Some(None)` for the first eligible piece
    pub accelerate: Option<Option<Axis>>,
    /// Push the cube into a stamp
    pub stamp: Option<Axis>,
    /// Pause toggle
    pub pause: bool,
    /// Demo mode - the game plays itself
    pub autoplay: bool,
}

const TURNS: [(Axis, RotateDir); 6] = [
    (Axis::X, RotateDir::Cw),
    (Axis::X, RotateDir::Ccw),
    (Axis::Y, RotateDir::Cw),
    (Axis::Y, RotateDir::Ccw),
    (Axis::Z, RotateDir::Cw),
    (Axis::Z, RotateDir::Ccw),
];

/// Advance the game by one fixed timestep of `dt` seconds
pub fn tick<S: AudioSink>(game: &mut Game, input: &TickInput, dt: f32, audio: &mut S) {
    if input.pause && !game.phase().is_over() {
        game.paused = !game.paused;
        log::info!("Game {}", if game.paused { "paused" } else { "resumed" });
    }
    if game.paused || matches!(game.phase(), GamePhase::Won | GamePhase::Lost) {
        return;
    }

    let mut input = input.clone();
    if input.autoplay {
        input = autoplay(game);
    }

    if let Some((axis, dir)) = input.rotate {
        game.rotate(axis, dir);
    }
    if let Some(axis) = input.accelerate {
        game.accelerate(axis);
    }
    if let Some(axis) = input.stamp {
        game.stamp(axis);
    }

    game.advance(dt * 1000.0);

    for effect in game.state.take_sounds() {
        audio.play(effect, false);
    }
}

/// Pick a move: stamp a matching stamp, tap a piece over its face, or turn
/// the cube so the nearest piece's face comes around
pub fn autoplay(game: &Game) -> TickInput {
    let mut input = TickInput::default();
    let state = &game.state;
    if state.phase != GamePhase::Playing {
        return input;
    }
    let cube = &state.cube;

    input.stamp = Axis::ALL.into_iter().find(|&axis| {
        state.stamps.is_stampable(axis)
            && match state.stamps.overlay_template(axis) {
                Some(template) => cube.back(axis).map_index == template.map_index,
                None => state.stamps.is_visible(axis) && cube.back(axis).is_filled(false),
            }
    });
    if input.stamp.is_some() {
        return input;
    }

    let Some(piece) = state
        .launcher
        .pieces()
        .filter(|p| matches!(p.stage, Stage::Hint | Stage::Falling))
        .min_by(|a, b| a.total_dist().total_cmp(&b.total_dist()))
    else {
        return input;
    };

    // 2 = lands on an unfinished matching face, 1 = matching but full
    let fit = |cube: &Cube| {
        let face = cube.front(piece.orient);
        if !piece.collision_templates().iter().any(|t| t.map_index == face.map_index) {
            0
        } else if face.is_filled(false) {
            1
        } else {
            2
        }
    };

    let current = fit(cube);
    if current == 2 || !cube.can_rotate(&game.anims) {
        if current == 2 && piece.stage == Stage::Falling && !piece.is_tapped() {
            input.accelerate = Some(Some(piece.orient));
        }
        return input;
    }

    // Best single turn, else the first turn of the best two-turn plan
    let mut best = (current, None);
    for (axis, dir) in TURNS {
        let mut turned = cube.clone();
        turned.apply_rotation_permutation(axis, dir);
        let one = fit(&turned);
        if one == 2 {
            input.rotate = Some((axis, dir));
            return input;
        }
        let two = TURNS
            .iter()
            .map(|&(a2, d2)| {
                let mut again = turned.clone();
                again.apply_rotation_permutation(a2, d2);
                fit(&again)
            })
            .max()
            .unwrap_or(0);
        if one.max(two) > best.0 {
            best = (one.max(two), Some((axis, dir)));
        }
    }

    match best {
        (_, Some(turn)) => input.rotate = Some(turn),
        (score, None) if score > 0 && piece.stage == Stage::Falling && !piece.is_tapped() => {
            input.accelerate = Some(Some(piece.orient));
        }
        _ => {}
    }
    input
}
