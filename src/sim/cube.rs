//! Cube/grid state model
//!
//! Six face grids pinned to fixed positions. A quarter turn relabels the four
//! faces around the turning axis and rotates the slot matrices of the two
//! faces on it, so a face's map index always travels with its content.
//!
//! The visual turn is a parametric animation; the permutation itself is
//! applied exactly once, when the animated angle crosses 45°.

use glam::Vec3;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::{Deserialize, Serialize};

use crate::audio::SoundEffect;
use crate::consts::*;
use crate::level::{GridLock, LevelConfig, StampStyle};
use crate::sim::anim::{AnimHandle, AnimItem, Scheduler};
use crate::sim::grid::{Axis, Color, FaceGrid, FaceId, FillState, PieceTemplate, BLACK};
use crate::sim::state::AnimTag;

/// Face positions
pub const FRONT: usize = 0;
pub const RIGHT: usize = 1;
pub const TOP: usize = 2;
pub const BACK: usize = 3;
pub const LEFT: usize = 4;
pub const BOTTOM: usize = 5;
pub const FACE_COUNT: usize = 6;

const ROTATE_TABLE: [f32; 11] = [0.0, 0.35, 0.6, 0.8, 0.95, 1.05, 1.12, 1.15, 1.15, 1.1, 1.0];
const STAMP_PUSH_TABLE: [f32; 8] = [0.0, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0];
const HIT_TABLE: [f32; 11] = [0.0, 0.6, 0.9, 1.0, 0.9, 0.8, 0.6, 0.4, 0.2, 0.1, 0.0];
const JIGGLE_TABLE: [f32; 9] = [0.0, -0.7, -1.0, -0.7, 0.0, 0.7, 1.0, 0.7, 0.0];
const INTRO_SCALE_TABLE: [f32; 10] = [0.0, 0.35, 0.65, 1.0, 1.15, 1.2, 1.25, 1.2, 1.12, 1.0];
const EXIT_SCALE_TABLE: [f32; 10] = [1.0, 1.12, 1.2, 1.25, 1.2, 1.15, 1.0, 0.65, 0.35, 0.0];
const FLEE_TABLE: [f32; 6] = [0.0, 0.05, 0.1, 0.2, 0.4, 1.0];
const WIN_SPIN_TABLE: [f32; 35] = [
    -10.0, -18.0, -23.0, -25.0, -20.0, -12.0, -2.0, 8.0, 20.0, 38.0, 54.0, 67.0, 78.0, 88.0, 97.0,
    104.0, 109.0, 115.0, 119.0, 123.0, 127.0, 131.0, 134.0, 137.0, 139.0, 141.0, 143.0, 144.0,
    145.0, 146.0, 147.0, 148.0, 149.0, 150.0, 151.0,
];
const WIN_LIFT_TABLE: [f32; 22] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.08, -0.13, -0.15, -0.12,
    -0.04, 0.1, 0.3, 0.6, 1.0,
];

/// Intro/exit spin per axis (degrees)
const SPIN_DEGREES: [f32; 3] = [20.0, 150.0, 15.0];
/// Jiggle amplitude after a hit (degrees)
const JIGGLE_DEGREES: f32 = 5.0;

/// Rotation direction about an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotateDir {
    Ccw,
    Cw,
}

impl RotateDir {
    /// +1 for counter-clockwise, -1 for clockwise
    pub fn sign(self) -> f32 {
        match self {
            RotateDir::Ccw => 1.0,
            RotateDir::Cw => -1.0,
        }
    }

    pub fn reverse(self) -> Self {
        match self {
            RotateDir::Ccw => RotateDir::Cw,
            RotateDir::Cw => RotateDir::Ccw,
        }
    }
}

/// Position of the face looking toward the launcher on `axis`
pub fn front_face(axis: Axis) -> usize {
    match axis {
        Axis::Z => FRONT,
        Axis::X => RIGHT,
        Axis::Y => TOP,
    }
}

/// Position of the face looking toward the stamp on `axis`
pub fn back_face(axis: Axis) -> usize {
    match axis {
        Axis::Z => BACK,
        Axis::X => LEFT,
        Axis::Y => BOTTOM,
    }
}

fn position_orient(pos: usize) -> Axis {
    match pos {
        FRONT | BACK => Axis::Z,
        RIGHT | LEFT => Axis::X,
        _ => Axis::Y,
    }
}

/// Animations owned by the cube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeAnim {
    /// Quarter turn, intro/exit spin or win spin on one axis
    Spin(Axis),
    /// Hit bump, stamp return or win lift
    Translate(Axis),
    StampPush(Axis),
    Scale { intro: bool },
    Jiggle(Axis),
    JiggleScale,
    ExitDelay,
    Win,
    Lose,
    SlotShrink(FaceId),
    SlotGrow(FaceId),
    Flee(FaceId),
}

/// Notifications for the game flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeEvent {
    IntroComplete,
    ExitComplete,
    /// The pushed face touched the stamp on this axis
    StampComplete(Axis),
    GameOver { won: bool },
}

/// Face eligibility for candidate selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Reserved slots count as filled
    pub include_reserved: bool,
    pub allow_empty: bool,
    pub allow_filled: bool,
    pub allow_partial: bool,
}

impl CandidateFilter {
    pub fn accepts(&self, state: FillState) -> bool {
        match state {
            FillState::Empty => self.allow_empty,
            FillState::Partial => self.allow_partial,
            FillState::Filled => self.allow_filled,
        }
    }
}

/// A quarter turn in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub axis: Axis,
    pub dir: RotateDir,
    /// Face permutation already performed
    pub applied: bool,
}

/// Outcome of a falling piece striking the cube
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionResult {
    /// Counted as a hit (real match or absorbed by invulnerability)
    pub was_hit: bool,
    /// Map indices actually matched
    pub was_real_hit: bool,
    /// This collision completed the face
    pub side_complete: bool,
    /// At least one slot changed
    pub piece_filled: bool,
    /// Other pieces targeting `map_index` may now be obsolete
    pub need_obsolete_check: bool,
    /// Map index of the piece that was tested
    pub map_index: i32,
    pub map_index_hit: i32,
    pub orient_hit: Axis,
    pub color_hit: Color,
    /// Template to show bouncing off after a miss
    pub rejected: Option<PieceTemplate>,
    pub sound: SoundEffect,
}

impl CollisionResult {
    /// Hit only because invulnerability absorbed a miss
    pub fn is_soft_hit(&self) -> bool {
        self.was_hit && !self.was_real_hit
    }
}

/// Outcome of the cube being pushed into a stamp
#[derive(Debug, Clone, PartialEq)]
pub struct StampResult {
    pub was_hit: bool,
    pub was_real_hit: bool,
    pub side_complete: bool,
    pub need_obsolete_check: bool,
    pub map_index: i32,
    /// Snapshot of the face an empty stamp found filled
    pub hit_template: Option<PieceTemplate>,
    pub sound: SoundEffect,
}

impl StampResult {
    pub fn is_soft_hit(&self) -> bool {
        self.was_hit && !self.was_real_hit
    }
}

/// The game cube
#[derive(Debug, Clone)]
pub struct Cube {
    pub faces: [FaceGrid; FACE_COUNT],
    /// Degrees per axis
    pub rotation: Vec3,
    pub translation: Vec3,
    pub scale: f32,
    pub active_rotation: Option<Rotation>,
    rot_time: u32,
    rot_anims: [AnimHandle; 3],
    trans_anims: [AnimHandle; 3],
    jiggle_anims: [AnimHandle; 3],
    jiggle_scale_anim: AnimHandle,
    scale_anim: AnimHandle,
    stamp_anim: AnimHandle,
    stamp_axis: Option<Axis>,
    exit_delay: AnimHandle,
    win_anim: AnimHandle,
    lose_anim: AnimHandle,
    /// Face reused while grid locking is on
    last_chosen: Option<FaceId>,
    next_unique_id: u32,
    next_face_id: u32,
}

impl Default for Cube {
    fn default() -> Self {
        Self::new()
    }
}

impl Cube {
    /// Blank 2×2 cube, invisible until its intro runs
    pub fn new() -> Self {
        let faces = std::array::from_fn(|pos| {
            FaceGrid::new(FaceId(pos as u32 + 1), 2, pos as i32, position_orient(pos), BLACK, BLACK)
        });
        Self {
            faces,
            rotation: Vec3::ZERO,
            translation: Vec3::ZERO,
            scale: 0.0,
            active_rotation: None,
            rot_time: 500,
            rot_anims: [AnimHandle::NONE; 3],
            trans_anims: [AnimHandle::NONE; 3],
            jiggle_anims: [AnimHandle::NONE; 3],
            jiggle_scale_anim: AnimHandle::NONE,
            scale_anim: AnimHandle::NONE,
            stamp_anim: AnimHandle::NONE,
            stamp_axis: None,
            exit_delay: AnimHandle::NONE,
            win_anim: AnimHandle::NONE,
            lose_anim: AnimHandle::NONE,
            last_chosen: None,
            next_unique_id: 1,
            next_face_id: FACE_COUNT as u32 + 1,
        }
    }

    /// Rebuild the six faces for a level. `num_colors` distinct palette
    /// indices are drawn at random; face k takes index k mod `num_colors`.
    pub fn init_grids<R: Rng>(&mut self, anims: &mut Scheduler<AnimTag>, rng: &mut R, level: &LevelConfig) {
        for face in &mut self.faces {
            anims.clear(&mut face.shrink_anim);
            anims.clear(&mut face.grow_anim);
            anims.clear(&mut face.flee_anim);
        }

        let num_colors = level.num_colors.clamp(1, FACE_COUNT);
        let mut pool: Vec<usize> = (0..FACE_COUNT).collect();
        pool.shuffle(rng);
        pool.truncate(num_colors);

        let first_id = self.next_face_id;
        self.faces = std::array::from_fn(|pos| {
            let index = pool[pos % num_colors];
            let mut face = FaceGrid::new(
                FaceId(first_id + pos as u32),
                level.grid_level,
                index as i32,
                position_orient(pos),
                level.dim_colors[index],
                level.max_colors[index],
            );
            face.refresh_colors();
            face
        });
        self.next_face_id += FACE_COUNT as u32;

        self.last_chosen = None;
        self.rot_time = level.rot_time;
        self.rotation = Vec3::ZERO;
        self.translation = Vec3::ZERO;
        self.active_rotation = None;
        log::info!(
            "Cube grids initialized: {}x{} with {} colors",
            level.grid_level,
            level.grid_level,
            num_colors
        );
    }

    pub fn face(&self, pos: usize) -> &FaceGrid {
        &self.faces[pos]
    }

    /// Face currently facing the launcher on `axis`
    pub fn front(&self, axis: Axis) -> &FaceGrid {
        &self.faces[front_face(axis)]
    }

    /// Face currently facing the stamp on `axis`
    pub fn back(&self, axis: Axis) -> &FaceGrid {
        &self.faces[back_face(axis)]
    }

    pub fn face_position(&self, id: FaceId) -> Option<usize> {
        self.faces.iter().position(|f| f.id == id)
    }

    fn face_mut(&mut self, id: FaceId) -> Option<&mut FaceGrid> {
        self.faces.iter_mut().find(|f| f.id == id)
    }

    pub fn filled_face_count(&self) -> usize {
        self.faces.iter().filter(|f| f.is_filled(false)).count()
    }

    pub fn is_filled(&self) -> bool {
        self.filled_face_count() == FACE_COUNT
    }

    /// Every face carrying `map_index` is filled
    pub fn is_index_filled(&self, map_index: i32) -> bool {
        self.faces
            .iter()
            .filter(|f| f.map_index == map_index)
            .all(|f| f.is_filled(false))
    }

    pub fn is_visible(&self) -> bool {
        self.scale > 0.0
    }

    pub fn is_stationary(&self) -> bool {
        self.rotation == Vec3::ZERO && self.translation == Vec3::ZERO
    }

    pub fn is_game_over_animating(&self, anims: &Scheduler<AnimTag>) -> bool {
        anims.is_active(self.win_anim) || anims.is_active(self.lose_anim)
    }

    fn is_busy(&self, anims: &Scheduler<AnimTag>) -> bool {
        anims.is_active(self.stamp_anim)
            || !self.active_rotation.is_none_or(|r| r.applied)
            || self.is_game_over_animating(anims)
            || anims.is_active(self.scale_anim)
            || anims.is_active(self.exit_delay)
    }

    /// A new turn may start once the previous one has applied its permutation
    pub fn can_rotate(&self, anims: &Scheduler<AnimTag>) -> bool {
        !self.is_busy(anims)
    }

    pub fn can_stamp(&self, anims: &Scheduler<AnimTag>) -> bool {
        !self.is_busy(anims)
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Begin a quarter turn. The permutation is applied by the animation when
    /// the angle crosses 45°. Returns `false` when the cube is busy.
    pub fn start_rotate(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis, dir: RotateDir) -> bool {
        if !self.can_rotate(anims) {
            return false;
        }
        log::info!("Rotate invoked, axis={}, dir={:?}", axis.as_str(), dir);

        // A finished-but-still-settling turn is dropped
        for handle in &mut self.rot_anims {
            anims.clear(handle);
        }
        self.rotation = Vec3::ZERO;

        let item = AnimItem::parametric(
            AnimTag::Cube(CubeAnim::Spin(axis)),
            0.0,
            90.0 * dir.sign(),
            self.rot_time,
            &ROTATE_TABLE,
        );
        self.rot_anims[axis.index()] = anims.register(item);
        self.active_rotation = Some(Rotation {
            axis,
            dir,
            applied: false,
        });
        true
    }

    /// Relabel faces for one quarter turn. Not idempotent.
    pub fn apply_rotation_permutation(&mut self, axis: Axis, dir: RotateDir) {
        match (axis, dir) {
            (Axis::X, RotateDir::Ccw) => {
                self.faces[BOTTOM].invert_slots();
                self.faces[BACK].invert_slots();
                self.cycle_faces([FRONT, BOTTOM, BACK, TOP]);
                self.faces[LEFT].shuffle_slots(false);
                self.faces[RIGHT].shuffle_slots(true);
            }
            (Axis::X, RotateDir::Cw) => {
                self.faces[TOP].invert_slots();
                self.faces[BACK].invert_slots();
                self.cycle_faces([FRONT, TOP, BACK, BOTTOM]);
                self.faces[LEFT].shuffle_slots(true);
                self.faces[RIGHT].shuffle_slots(false);
            }
            (Axis::Y, RotateDir::Ccw) => {
                self.cycle_faces([FRONT, RIGHT, BACK, LEFT]);
                self.faces[TOP].shuffle_slots(true);
                self.faces[BOTTOM].shuffle_slots(false);
            }
            (Axis::Y, RotateDir::Cw) => {
                self.cycle_faces([FRONT, LEFT, BACK, RIGHT]);
                self.faces[TOP].shuffle_slots(false);
                self.faces[BOTTOM].shuffle_slots(true);
            }
            (Axis::Z, RotateDir::Ccw) => {
                for pos in [BOTTOM, TOP, LEFT, RIGHT] {
                    self.faces[pos].shuffle_slots(true);
                }
                self.cycle_faces([RIGHT, TOP, LEFT, BOTTOM]);
                self.faces[FRONT].shuffle_slots(true);
                self.faces[BACK].shuffle_slots(false);
            }
            (Axis::Z, RotateDir::Cw) => {
                for pos in [BOTTOM, TOP, LEFT, RIGHT] {
                    self.faces[pos].shuffle_slots(false);
                }
                self.cycle_faces([RIGHT, BOTTOM, LEFT, TOP]);
                self.faces[FRONT].shuffle_slots(false);
                self.faces[BACK].shuffle_slots(true);
            }
        }

        for (pos, face) in self.faces.iter_mut().enumerate() {
            face.orient = position_orient(pos);
        }
    }

    /// Content of a moves to b, b to c, c to d and d to a
    fn cycle_faces(&mut self, [a, b, c, d]: [usize; 4]) {
        self.faces.swap(c, d);
        self.faces.swap(b, c);
        self.faces.swap(a, b);
    }

    // ------------------------------------------------------------------
    // Candidates
    // ------------------------------------------------------------------

    fn eligible(&self, filter: CandidateFilter) -> Vec<usize> {
        (0..FACE_COUNT)
            .filter(|&pos| filter.accepts(self.faces[pos].fill_state(filter.include_reserved)))
            .collect()
    }

    /// Template for a single falling piece: the inverse of a face's fill with
    /// some slots randomly dropped. When `include_reserved` is set the piece
    /// gets a unique id and claims its slots.
    pub fn falling_candidate<R: Rng>(
        &mut self,
        rng: &mut R,
        level: &LevelConfig,
        allow_empty: bool,
        include_reserved: bool,
    ) -> Option<PieceTemplate> {
        let locked = level.grid_lock != GridLock::None;
        let mut chosen = if locked {
            self.last_chosen.and_then(|id| self.face_position(id))
        } else {
            None
        };

        if let Some(pos) = chosen {
            if self.faces[pos].is_filled(true) {
                if level.grid_lock == GridLock::Wait && !self.faces[pos].is_filled(false) {
                    return None;
                }
                chosen = None;
            }
        }

        let pos = match chosen {
            Some(pos) => pos,
            None => {
                let candidates = self.eligible(CandidateFilter {
                    include_reserved,
                    allow_empty,
                    allow_filled: false,
                    allow_partial: true,
                });
                *candidates.choose(rng)?
            }
        };

        let mut template = PieceTemplate::from_face(&self.faces[pos], include_reserved);
        template.invert();
        template.randomize(rng, level.falling_hole_limit);

        if include_reserved {
            template.unique_id = self.next_unique_id;
            self.next_unique_id += 1;
            self.faces[pos].reserve_slots(&template);
        }

        if level.rand_falling_pieces {
            for _ in 0..rng.random_range(0..4) {
                template.rotate_cw();
            }
        }

        if locked {
            self.last_chosen = Some(self.faces[pos].id);
        }
        Some(template)
    }

    /// Snapshot of a random eligible face
    pub fn grid_candidate<R: Rng>(&self, rng: &mut R, filter: CandidateFilter) -> Option<PieceTemplate> {
        let pos = *self.eligible(filter).choose(rng)?;
        Some(PieceTemplate::from_face(&self.faces[pos], false))
    }

    /// Inverse-fill snapshot of the face at `pos` if it passes `filter`
    pub fn candidate_template(&self, pos: usize, filter: CandidateFilter) -> Option<PieceTemplate> {
        let face = self.faces.get(pos)?;
        if !filter.accepts(face.fill_state(filter.include_reserved)) {
            return None;
        }
        let mut template = PieceTemplate::from_face(face, filter.include_reserved);
        template.invert();
        Some(template)
    }

    /// Snapshots of every eligible face
    pub fn candidates_list(&self, filter: CandidateFilter) -> Vec<PieceTemplate> {
        self.eligible(filter)
            .into_iter()
            .map(|pos| PieceTemplate::from_face(&self.faces[pos], false))
            .collect()
    }

    /// Faces a normal burst may target (empty when a burst is not possible)
    pub fn burst_candidates(&self, level: &LevelConfig, allow_empty: bool) -> Vec<PieceTemplate> {
        let unlocked = level.grid_lock == GridLock::None;
        if !unlocked && level.grid_level == 1 {
            return Vec::new();
        }
        let list = self.candidates_list(CandidateFilter {
            include_reserved: false,
            allow_empty,
            allow_filled: false,
            allow_partial: unlocked,
        });
        if unlocked && list.len() < 3 {
            return Vec::new();
        }
        list
    }

    /// Faces a cycling burst may target (empty when fewer than 3)
    pub fn evil_burst_candidates(&self) -> Vec<PieceTemplate> {
        let list = self.candidates_list(CandidateFilter {
            include_reserved: false,
            allow_empty: true,
            allow_filled: false,
            allow_partial: true,
        });
        if list.len() < 3 { Vec::new() } else { list }
    }

    // ------------------------------------------------------------------
    // Collisions
    // ------------------------------------------------------------------

    /// Resolve a falling piece striking the face on its axis. Blending pieces
    /// pass several templates (same orientation); the one matching the struck
    /// face is used. Returns `None` for an empty piece list.
    pub fn collide(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        pieces: &[PieceTemplate],
        invulnerable: bool,
    ) -> Option<CollisionResult> {
        let Some(first) = pieces.first() else {
            debug_assert!(false, "collision with no piece templates");
            log::warn!("Ignoring collision with no piece templates");
            return None;
        };

        for piece in pieces.iter().filter(|p| p.unique_id > 0) {
            for face in self.faces.iter_mut().filter(|f| f.map_index == piece.map_index) {
                face.clear_reserved(Some(piece.unique_id));
            }
        }

        let pos = front_face(first.orient);
        let face_index = self.faces[pos].map_index;
        let sample = pieces
            .iter()
            .find(|p| p.map_index == face_index)
            .unwrap_or(first)
            .clone();

        let was_real_hit = sample.map_index == face_index;
        let was_hit = was_real_hit || invulnerable;
        let changed = if was_real_hit || !invulnerable {
            collide_face(anims, &mut self.faces[pos], Some(&sample), was_hit)
        } else {
            false
        };

        let mut result = CollisionResult {
            was_hit,
            was_real_hit,
            side_complete: false,
            piece_filled: false,
            need_obsolete_check: false,
            map_index: sample.map_index,
            map_index_hit: face_index,
            orient_hit: self.faces[pos].orient,
            color_hit: self.faces[pos].fill_color,
            rejected: None,
            sound: SoundEffect::Error,
        };

        let (filled, need_obsolete_check) = self.settle_face(pos, sample.map_index, was_hit);
        result.need_obsolete_check = need_obsolete_check;
        if was_hit {
            result.piece_filled = changed;
            if changed && filled {
                result.side_complete = true;
                result.sound = SoundEffect::fill(self.filled_face_count());
            } else {
                result.sound = if changed { SoundEffect::Match } else { SoundEffect::Same };
            }
        } else {
            result.rejected = Some(sample.clone());
        }

        self.start_hit_animation(anims, was_hit, sample.orient);

        log::info!(
            "Collision on {} face: {}",
            sample.orient.as_str(),
            if was_hit { "hit" } else { "miss" }
        );
        Some(result)
    }

    /// Resolve the face on `axis`'s back side meeting its stamp. An empty
    /// stamp counts as a hit when the face is already filled, and empties it.
    pub fn stamp(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        axis: Axis,
        template: Option<&PieceTemplate>,
        invulnerable: bool,
        style: StampStyle,
    ) -> StampResult {
        let pos = back_face(axis);
        let face_index = self.faces[pos].map_index;

        let result = match template {
            Some(template) => {
                let was_real_hit = face_index == template.map_index;
                let was_hit = was_real_hit || invulnerable;
                let changed = if was_real_hit || !invulnerable {
                    collide_face(anims, &mut self.faces[pos], Some(template), was_hit)
                } else {
                    false
                };

                let (filled, need_obsolete_check) = self.settle_face(pos, template.map_index, was_hit);
                let mut side_complete = false;
                let sound = if !was_hit {
                    SoundEffect::Error
                } else if filled && (changed || style == StampStyle::BonusRandom) {
                    side_complete = true;
                    SoundEffect::fill(self.filled_face_count())
                } else if changed {
                    SoundEffect::Match
                } else {
                    SoundEffect::Same
                };

                StampResult {
                    was_hit,
                    was_real_hit,
                    side_complete,
                    need_obsolete_check,
                    map_index: template.map_index,
                    hit_template: None,
                    sound,
                }
            }
            None => {
                let was_hit = self.faces[pos].is_filled(false);
                let hit_template = was_hit.then(|| PieceTemplate::from_face(&self.faces[pos], false));
                collide_face(anims, &mut self.faces[pos], None, false);
                StampResult {
                    was_hit,
                    was_real_hit: was_hit,
                    side_complete: false,
                    need_obsolete_check: false,
                    map_index: face_index,
                    hit_template,
                    sound: if was_hit { SoundEffect::Match } else { SoundEffect::Same },
                }
            }
        };

        log::info!(
            "Stamp on {} axis: {}",
            axis.as_str(),
            if result.was_hit { "hit" } else { "miss" }
        );
        result
    }

    /// Drop the slot claims of pieces that will never land
    pub fn release_reservations(&mut self, owners: &[u32]) {
        for &owner in owners.iter().filter(|id| **id > 0) {
            for face in &mut self.faces {
                face.clear_reserved(Some(owner));
            }
        }
    }

    /// Bookkeeping after a piece or stamp lands on `pos`. A filled face
    /// drops every reservation. Returns whether the face is filled and
    /// whether pieces for `map_index` may now be obsolete.
    fn settle_face(&mut self, pos: usize, map_index: i32, was_hit: bool) -> (bool, bool) {
        let filled = self.faces[pos].is_filled(false);
        if was_hit && filled {
            self.faces[pos].clear_reserved(None);
        }
        (filled, was_hit && filled && self.is_index_filled(map_index))
    }

    // ------------------------------------------------------------------
    // Cube animations
    // ------------------------------------------------------------------

    /// Push the back face on `axis` into its stamp. Completion is reported as
    /// [`CubeEvent::StampComplete`].
    pub fn start_stamp(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis) -> bool {
        if !self.can_stamp(anims) {
            return false;
        }
        log::info!("Stamp invoked, axis={}", axis.as_str());

        let stamp_dist = if axis == Axis::Y { STAMP_DIST_Y } else { STAMP_DIST };
        let dist = stamp_dist - (CUBE_RADIUS + STAMP_GAP);
        anims.clear(&mut self.trans_anims[axis.index()]);
        self.stamp_anim = anims.register(AnimItem::parametric(
            AnimTag::Cube(CubeAnim::StampPush(axis)),
            0.0,
            -dist,
            self.rot_time / 2,
            &STAMP_PUSH_TABLE,
        ));
        self.stamp_axis = Some(axis);
        true
    }

    fn start_hit_animation(&mut self, anims: &mut Scheduler<AnimTag>, is_hit: bool, orient: Axis) {
        let duration = if is_hit { CUBE_HIT_MS } else { CUBE_MISS_MS };

        // The stamp push owns the translation on its axis
        let pushing = anims.is_active(self.stamp_anim) && self.stamp_axis == Some(orient);
        if !pushing {
            let depth = -0.1 * if is_hit { 1.3 } else { 3.0 };
            let handle = &mut self.trans_anims[orient.index()];
            anims.clear(handle);
            *handle = anims.register(AnimItem::parametric(
                AnimTag::Cube(CubeAnim::Translate(orient)),
                0.0,
                depth,
                duration,
                &HIT_TABLE,
            ));
        }

        if is_hit {
            let jiggle_axis = if orient == Axis::Y { Axis::X } else { Axis::Y };
            let handle = &mut self.jiggle_anims[jiggle_axis.index()];
            anims.clear(handle);
            *handle = anims.register(
                AnimItem::parametric(
                    AnimTag::Cube(CubeAnim::Jiggle(jiggle_axis)),
                    0.0,
                    JIGGLE_DEGREES,
                    CUBE_HIT_MS,
                    &JIGGLE_TABLE,
                )
                .cycled(3),
            );

            anims.clear(&mut self.jiggle_scale_anim);
            self.jiggle_scale_anim =
                anims.register(AnimItem::linear(AnimTag::Cube(CubeAnim::JiggleScale), 1.0, 0.0, CUBE_HIT_MS));
        }
    }

    fn start_spins(&mut self, anims: &mut Scheduler<AnimTag>, entering: bool) {
        for axis in Axis::ALL {
            let i = axis.index();
            let (start, end) = if entering {
                (SPIN_DEGREES[i], 0.0)
            } else {
                (0.0, SPIN_DEGREES[i])
            };
            anims.clear(&mut self.rot_anims[i]);
            self.rot_anims[i] = anims.register(AnimItem::linear(
                AnimTag::Cube(CubeAnim::Spin(axis)),
                start,
                end,
                INTRO_ANIM_MS,
            ));
        }
    }

    /// Spin and grow into view. Returns the length in ms.
    pub fn start_intro(&mut self, anims: &mut Scheduler<AnimTag>) -> u32 {
        self.active_rotation = None;
        self.start_spins(anims, true);
        anims.clear(&mut self.scale_anim);
        self.scale_anim = anims.register(AnimItem::parametric(
            AnimTag::Cube(CubeAnim::Scale { intro: true }),
            0.0,
            1.0,
            INTRO_ANIM_MS,
            &INTRO_SCALE_TABLE,
        ));
        INTRO_ANIM_MS
    }

    fn start_real_exit(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.start_spins(anims, false);
        anims.clear(&mut self.scale_anim);
        self.scale_anim = anims.register(AnimItem::parametric(
            AnimTag::Cube(CubeAnim::Scale { intro: false }),
            0.0,
            1.0,
            INTRO_ANIM_MS,
            &EXIT_SCALE_TABLE,
        ));
    }

    /// Spin and shrink out of view after the hit bump settles
    pub fn start_exit(&mut self, anims: &mut Scheduler<AnimTag>) -> u32 {
        self.exit_delay = anims.register(AnimItem::timer(AnimTag::Cube(CubeAnim::ExitDelay), CUBE_HIT_MS, false));
        INTRO_ANIM_MS
    }

    pub fn start_win(&mut self, anims: &mut Scheduler<AnimTag>) -> u32 {
        self.win_anim = anims.register(AnimItem::timer(AnimTag::Cube(CubeAnim::Win), WIN_ANIM_MS, false));

        let y = Axis::Y.index();
        anims.clear(&mut self.rot_anims[y]);
        self.rot_anims[y] = anims.register(AnimItem::parametric(
            AnimTag::Cube(CubeAnim::Spin(Axis::Y)),
            0.0,
            10.0,
            WIN_ANIM_MS,
            &WIN_SPIN_TABLE,
        ));
        anims.clear(&mut self.trans_anims[y]);
        self.trans_anims[y] = anims.register(AnimItem::parametric(
            AnimTag::Cube(CubeAnim::Translate(Axis::Y)),
            0.0,
            3.0 * FALL_START_POS,
            WIN_ANIM_MS,
            &WIN_LIFT_TABLE,
        ));

        anims.clear(&mut self.trans_anims[Axis::X.index()]);
        anims.clear(&mut self.trans_anims[Axis::Z.index()]);
        WIN_ANIM_MS
    }

    /// The three visible faces fly off, the rest vanish, then the cube exits
    pub fn start_lose(&mut self, anims: &mut Scheduler<AnimTag>) -> u32 {
        self.lose_anim = anims.register(AnimItem::timer(AnimTag::Cube(CubeAnim::Lose), LOSE_ANIM_MS, false));

        for pos in [FRONT, RIGHT, TOP] {
            let face = &mut self.faces[pos];
            anims.clear(&mut face.flee_anim);
            face.flee_anim = anims.register(AnimItem::parametric(
                AnimTag::Cube(CubeAnim::Flee(face.id)),
                0.0,
                FALL_START_POS,
                INTRO_ANIM_MS,
                &FLEE_TABLE,
            ));
        }
        for pos in [BACK, LEFT, BOTTOM] {
            self.faces[pos].set_visible(false);
        }

        self.exit_delay = anims.register(AnimItem::timer(
            AnimTag::Cube(CubeAnim::ExitDelay),
            LOSE_ANIM_MS - INTRO_ANIM_MS,
            false,
        ));
        LOSE_ANIM_MS
    }

    // ------------------------------------------------------------------
    // Animation dispatch
    // ------------------------------------------------------------------

    pub fn on_frame(&mut self, id: AnimHandle, anim: CubeAnim, value: f32) -> bool {
        match anim {
            CubeAnim::Spin(axis) => {
                let i = axis.index();
                if self.rot_anims[i] != id {
                    return false;
                }
                self.rotation[i] = value;
                if let Some(mut rot) = self.active_rotation {
                    if rot.axis == axis && self.rotation[i].abs() >= 45.0 {
                        self.rotation[i] -= rot.dir.sign() * 90.0;
                        if !rot.applied {
                            rot.applied = true;
                            self.active_rotation = Some(rot);
                            self.apply_rotation_permutation(rot.axis, rot.dir);
                        }
                    }
                }
            }
            CubeAnim::Translate(axis) => {
                if self.trans_anims[axis.index()] != id {
                    return false;
                }
                self.translation[axis.index()] = value;
            }
            CubeAnim::StampPush(axis) => self.translation[axis.index()] = value,
            CubeAnim::Scale { .. } => self.scale = value,
            CubeAnim::Jiggle(axis) => {
                if self.jiggle_anims[axis.index()] != id {
                    return false;
                }
                if self.active_rotation.is_none() {
                    self.rotation[axis.index()] = value;
                }
            }
            CubeAnim::JiggleScale => {
                if self.active_rotation.is_none() {
                    self.rotation *= value;
                }
            }
            CubeAnim::SlotShrink(face) | CubeAnim::SlotGrow(face) => {
                if let Some(face) = self.face_mut(face) {
                    face.scale_animating(value);
                }
            }
            CubeAnim::Flee(face) => {
                if let Some(face) = self.face_mut(face) {
                    face.flee = value;
                }
            }
            CubeAnim::ExitDelay | CubeAnim::Win | CubeAnim::Lose => {}
        }
        true
    }

    pub fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, anim: CubeAnim) -> Option<CubeEvent> {
        match anim {
            CubeAnim::Spin(axis) => {
                if self.rot_anims[axis.index()] == id {
                    self.rot_anims[axis.index()] = AnimHandle::NONE;
                    self.active_rotation = None;
                }
            }
            CubeAnim::Translate(axis) => {
                if self.trans_anims[axis.index()] == id {
                    self.trans_anims[axis.index()] = AnimHandle::NONE;
                }
            }
            CubeAnim::StampPush(axis) => {
                self.stamp_anim = AnimHandle::NONE;
                self.stamp_axis = None;
                let i = axis.index();
                anims.clear(&mut self.trans_anims[i]);
                self.trans_anims[i] = anims.register(AnimItem::linear(
                    AnimTag::Cube(CubeAnim::Translate(axis)),
                    self.translation[i],
                    0.0,
                    self.rot_time / 2,
                ));
                return Some(CubeEvent::StampComplete(axis));
            }
            CubeAnim::Scale { intro } => {
                self.scale_anim = AnimHandle::NONE;
                if !anims.is_active(self.lose_anim) {
                    return Some(if intro {
                        CubeEvent::IntroComplete
                    } else {
                        CubeEvent::ExitComplete
                    });
                }
            }
            CubeAnim::ExitDelay => {
                self.exit_delay = AnimHandle::NONE;
                self.start_real_exit(anims);
            }
            CubeAnim::Win => {
                self.win_anim = AnimHandle::NONE;
                self.scale = 0.0;
                return Some(CubeEvent::GameOver { won: true });
            }
            CubeAnim::Lose => {
                self.lose_anim = AnimHandle::NONE;
                return Some(CubeEvent::GameOver { won: false });
            }
            CubeAnim::Jiggle(axis) => self.jiggle_anims[axis.index()] = AnimHandle::NONE,
            CubeAnim::JiggleScale => self.jiggle_scale_anim = AnimHandle::NONE,
            CubeAnim::SlotShrink(face_id) => {
                if let Some(face) = self.face_mut(face_id) {
                    face.shrink_anim = AnimHandle::NONE;
                    face.refresh_colors();
                    face.grow_anim = anims.register(AnimItem::linear(
                        AnimTag::Cube(CubeAnim::SlotGrow(face_id)),
                        0.0,
                        1.0,
                        SLOT_ANIM_MS,
                    ));
                }
            }
            CubeAnim::SlotGrow(face_id) => {
                if let Some(face) = self.face_mut(face_id) {
                    face.grow_anim = AnimHandle::NONE;
                    face.clear_animating();
                }
            }
            CubeAnim::Flee(face_id) => {
                if let Some(face) = self.face_mut(face_id) {
                    face.flee_anim = AnimHandle::NONE;
                    face.set_visible(false);
                }
            }
        }
        None
    }
}

/// Stop a face's slot animation, settling colors if a shrink was cut short
fn cancel_slot_anim(anims: &mut Scheduler<AnimTag>, face: &mut FaceGrid) {
    if anims.is_active(face.shrink_anim) {
        anims.clear(&mut face.shrink_anim);
        face.refresh_colors();
    }
    anims.clear(&mut face.grow_anim);
    face.clear_animating();
}

/// Apply a fill to a face and shrink the changed slots
fn collide_face(
    anims: &mut Scheduler<AnimTag>,
    face: &mut FaceGrid,
    piece: Option<&PieceTemplate>,
    is_hit: bool,
) -> bool {
    cancel_slot_anim(anims, face);
    let changed = face.apply_fill(piece, is_hit);
    if changed {
        face.shrink_anim = anims.register(AnimItem::linear(
            AnimTag::Cube(CubeAnim::SlotShrink(face.id)),
            1.0,
            0.0,
            SLOT_ANIM_MS,
        ));
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::anim::AnimTarget;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    /// Routes cube animations and records cube events
    struct Harness {
        cube: Cube,
        events: Vec<CubeEvent>,
    }

    impl AnimTarget<AnimTag> for Harness {
        fn on_frame(&mut self, _anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag, value: f32) -> bool {
            match tag {
                AnimTag::Cube(anim) => self.cube.on_frame(id, *anim, value),
                _ => true,
            }
        }

        fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag) {
            if let AnimTag::Cube(anim) = tag {
                if let Some(event) = self.cube.on_complete(anims, id, *anim) {
                    self.events.push(event);
                }
            }
        }
    }

    fn level(dimen: usize, colors: usize) -> LevelConfig {
        LevelConfig {
            grid_level: dimen,
            num_colors: colors,
            ..Default::default()
        }
    }

    fn cube(dimen: usize) -> (Cube, Scheduler<AnimTag>) {
        let mut anims = Scheduler::new();
        let mut cube = Cube::new();
        let mut rng = Pcg32::seed_from_u64(11);
        cube.init_grids(&mut anims, &mut rng, &level(dimen, 6));
        (cube, anims)
    }

    /// Per position: map index, orientation and slot fill
    fn layout(cube: &Cube) -> Vec<(i32, Axis, Vec<bool>)> {
        cube.faces
            .iter()
            .map(|f| (f.map_index, f.orient, f.slots.iter().map(|s| s.filled).collect()))
            .collect()
    }

    fn run(harness: &mut Harness, anims: &mut Scheduler<AnimTag>, ms: u32) {
        for _ in 0..ms / 10 {
            anims.advance(10.0, harness);
        }
    }

    fn axis_strategy() -> impl Strategy<Value = Axis> {
        prop_oneof![Just(Axis::X), Just(Axis::Y), Just(Axis::Z)]
    }

    fn dir_strategy() -> impl Strategy<Value = RotateDir> {
        prop_oneof![Just(RotateDir::Ccw), Just(RotateDir::Cw)]
    }

    fn seeded_fill(cube: &mut Cube, bits: &[bool]) {
        for (k, face) in cube.faces.iter_mut().enumerate() {
            for (i, slot) in face.slots.iter_mut().enumerate() {
                slot.filled = bits[(k * 9 + i) % bits.len()];
            }
        }
    }

    proptest! {
        #[test]
        fn test_rotation_inverse_restores_layout(
            dimen in 1usize..=3,
            axis in axis_strategy(),
            dir in dir_strategy(),
            bits in proptest::collection::vec(any::<bool>(), 54),
        ) {
            let (mut cube, _) = cube(dimen);
            seeded_fill(&mut cube, &bits);
            let before = layout(&cube);
            cube.apply_rotation_permutation(axis, dir);
            cube.apply_rotation_permutation(axis, dir.reverse());
            prop_assert_eq!(layout(&cube), before);
        }

        #[test]
        fn test_rotation_has_order_four(
            dimen in 1usize..=3,
            axis in axis_strategy(),
            dir in dir_strategy(),
            bits in proptest::collection::vec(any::<bool>(), 54),
        ) {
            let (mut cube, _) = cube(dimen);
            seeded_fill(&mut cube, &bits);
            let before = layout(&cube);
            for _ in 0..4 {
                cube.apply_rotation_permutation(axis, dir);
            }
            prop_assert_eq!(layout(&cube), before);
        }
    }

    #[test]
    fn test_map_index_travels_with_content() {
        let (mut cube, _) = cube(2);
        let ids: Vec<FaceId> = cube.faces.iter().map(|f| f.id).collect();
        let front = cube.faces[FRONT].map_index;

        cube.apply_rotation_permutation(Axis::Y, RotateDir::Ccw);
        assert_eq!(cube.faces[RIGHT].id, ids[FRONT]);
        assert_eq!(cube.faces[RIGHT].map_index, front);
        assert_eq!(cube.faces[RIGHT].orient, Axis::X);
        assert_eq!(cube.faces[FRONT].id, ids[LEFT]);
        // Faces on the axis stay put
        assert_eq!(cube.faces[TOP].id, ids[TOP]);
        assert_eq!(cube.faces[BOTTOM].id, ids[BOTTOM]);
    }

    #[test]
    fn test_three_by_three_top_turn_moves_corners_and_edges() {
        let (mut cube, _) = cube(3);
        cube.faces[TOP].slots[0].filled = true;
        cube.faces[TOP].slots[1].filled = true;
        cube.apply_rotation_permutation(Axis::Y, RotateDir::Cw);
        // Counter-clockwise slot cycles: 0 -> 2 and 1 -> 5
        let filled: Vec<usize> = (0..9).filter(|&i| cube.faces[TOP].slots[i].filled).collect();
        assert_eq!(filled, vec![2, 5]);
    }

    #[test]
    fn test_rotation_applies_permutation_once_at_midpoint() {
        let (cube, mut anims) = cube(2);
        let mut h = Harness { cube, events: Vec::new() };
        let ids: Vec<FaceId> = h.cube.faces.iter().map(|f| f.id).collect();

        assert!(h.cube.start_rotate(&mut anims, Axis::Y, RotateDir::Ccw));
        assert!(!h.cube.can_rotate(&anims));
        run(&mut h, &mut anims, 50);
        assert_eq!(h.cube.faces[FRONT].id, ids[FRONT]);

        run(&mut h, &mut anims, 600);
        assert_eq!(h.cube.faces[RIGHT].id, ids[FRONT]);
        assert_eq!(h.cube.faces[FRONT].id, ids[LEFT]);
        assert!(h.cube.active_rotation.is_none());
        assert!(h.cube.rotation.y.abs() < 1e-3);
        assert!(h.cube.can_rotate(&anims));
    }

    #[test]
    fn test_second_rotation_allowed_after_permutation() {
        let (cube, mut anims) = cube(2);
        let mut h = Harness { cube, events: Vec::new() };
        assert!(h.cube.start_rotate(&mut anims, Axis::X, RotateDir::Cw));
        assert!(!h.cube.start_rotate(&mut anims, Axis::Z, RotateDir::Cw));
        // Past the 45° crossing
        run(&mut h, &mut anims, 300);
        assert!(h.cube.active_rotation.is_some_and(|r| r.applied));
        assert!(h.cube.start_rotate(&mut anims, Axis::Z, RotateDir::Cw));
    }

    fn full_piece(cube: &Cube, axis: Axis) -> PieceTemplate {
        let mut t = PieceTemplate::from_face(cube.front(axis), false);
        t.set_all(true);
        t
    }

    #[test]
    fn test_matching_collision_fills_face() {
        let (mut cube, mut anims) = cube(2);
        let piece = full_piece(&cube, Axis::Z);
        let result = cube.collide(&mut anims, &[piece.clone()], false).unwrap();
        assert!(result.was_hit && result.was_real_hit);
        assert!(result.side_complete);
        assert_eq!(result.sound, SoundEffect::Fill(1));
        assert!(cube.faces[FRONT].is_filled(false));

        // Same piece again changes nothing
        let again = cube.collide(&mut anims, &[piece], false).unwrap();
        assert!(again.was_hit);
        assert!(!again.side_complete);
        assert_eq!(again.sound, SoundEffect::Same);
    }

    #[test]
    fn test_miss_knocks_out_slots() {
        let (mut cube, mut anims) = cube(2);
        cube.faces[FRONT].slots.iter_mut().for_each(|s| s.filled = true);
        let mut piece = full_piece(&cube, Axis::Z);
        piece.map_index = (cube.faces[FRONT].map_index + 1) % 6;
        piece.fill = vec![true, false, false, false];

        let result = cube.collide(&mut anims, &[piece.clone()], false).unwrap();
        assert!(!result.was_hit);
        assert_eq!(result.sound, SoundEffect::Error);
        assert_eq!(result.rejected, Some(piece));
        assert!(!cube.faces[FRONT].slots[0].filled);
        assert_eq!(cube.faces[FRONT].filled_count(), 3);
    }

    #[test]
    fn test_invulnerable_miss_is_soft_hit() {
        let (mut cube, mut anims) = cube(2);
        cube.faces[FRONT].slots.iter_mut().for_each(|s| s.filled = true);
        let mut piece = full_piece(&cube, Axis::Z);
        piece.map_index = (cube.faces[FRONT].map_index + 1) % 6;

        let result = cube.collide(&mut anims, &[piece], true).unwrap();
        assert!(result.is_soft_hit());
        assert_eq!(cube.faces[FRONT].filled_count(), 4);
        assert!(result.rejected.is_none());
    }

    #[test]
    fn test_blending_collision_uses_matching_template() {
        let (mut cube, mut anims) = cube(2);
        let right = cube.faces[FRONT].map_index;
        let mut wrong = full_piece(&cube, Axis::Z);
        wrong.map_index = (right + 1) % 6;
        let good = full_piece(&cube, Axis::Z);
        let result = cube.collide(&mut anims, &[wrong, good], false).unwrap();
        assert!(result.was_real_hit);
        assert_eq!(result.map_index, right);
    }

    #[test]
    fn test_collision_releases_reservation() {
        let (mut cube, mut anims) = cube(2);
        let mut rng = Pcg32::seed_from_u64(3);
        let lvl = level(2, 6);
        let piece = cube.falling_candidate(&mut rng, &lvl, true, true).unwrap();
        assert_eq!(piece.unique_id, 1);
        let reserved: usize = cube
            .faces
            .iter()
            .map(|f| f.slots.iter().filter(|s| s.reserved_by == Some(1)).count())
            .sum();
        assert!(reserved > 0);

        cube.collide(&mut anims, &[piece], false);
        assert!(cube.faces.iter().all(|f| f.slots.iter().all(|s| s.reserved_by.is_none())));
    }

    #[test]
    fn test_completing_stamp_releases_reservations() {
        let (mut cube, mut anims) = cube(2);
        let pos = back_face(Axis::Z);
        let mut pending = PieceTemplate::from_face(&cube.faces[pos], false);
        pending.unique_id = 7;
        pending.fill = vec![true, true, false, false];
        cube.faces[pos].reserve_slots(&pending);

        let mut template = PieceTemplate::from_face(&cube.faces[pos], false);
        template.set_all(true);
        let result = cube.stamp(&mut anims, Axis::Z, Some(&template), false, StampStyle::CompletesFace);
        assert!(result.side_complete);
        assert!(cube.faces[pos].slots.iter().all(|s| s.reserved_by.is_none()));

        // A reserved but unfinished face keeps its claims
        let other = back_face(Axis::X);
        pending.map_index = cube.faces[other].map_index;
        cube.faces[other].reserve_slots(&pending);
        let mut partial = PieceTemplate::from_face(&cube.faces[other], false);
        partial.fill = vec![false, false, true, false];
        let result = cube.stamp(&mut anims, Axis::X, Some(&partial), false, StampStyle::CompletesFace);
        assert!(!result.side_complete);
        assert_eq!(cube.faces[other].slots.iter().filter(|s| s.reserved_by == Some(7)).count(), 2);
    }

    #[test]
    fn test_need_obsolete_check_when_index_complete() {
        let mut anims = Scheduler::new();
        let mut cube = Cube::new();
        let mut rng = Pcg32::seed_from_u64(1);
        cube.init_grids(&mut anims, &mut rng, &level(1, 1));
        // One color: every face shares the map index
        for pos in [RIGHT, TOP, BACK, LEFT, BOTTOM] {
            cube.faces[pos].slots[0].filled = true;
        }
        let piece = full_piece(&cube, Axis::Z);
        let result = cube.collide(&mut anims, &[piece], false).unwrap();
        assert!(result.need_obsolete_check);
        assert!(cube.is_filled());
        assert_eq!(result.sound, SoundEffect::Fill(6));
    }

    #[test]
    fn test_grid_lock_wait_blocks_until_filled() {
        let (mut cube, _) = cube(1);
        let mut rng = Pcg32::seed_from_u64(9);
        let lvl = LevelConfig {
            grid_lock: GridLock::Wait,
            ..level(1, 6)
        };
        let first = cube.falling_candidate(&mut rng, &lvl, true, true).unwrap();
        // The 1x1 face is now fully reserved but not filled
        assert!(cube.falling_candidate(&mut rng, &lvl, true, true).is_none());

        let pos = cube
            .faces
            .iter()
            .position(|f| f.slots[0].reserved_by == Some(first.unique_id))
            .unwrap();
        cube.faces[pos].slots[0].filled = true;
        assert!(cube.falling_candidate(&mut rng, &lvl, true, true).is_some());
    }

    #[test]
    fn test_candidate_filters() {
        let (mut cube, _) = cube(2);
        cube.faces[FRONT].slots.iter_mut().for_each(|s| s.filled = true);
        cube.faces[RIGHT].slots[0].filled = true;

        let partial_only = CandidateFilter {
            include_reserved: false,
            allow_empty: false,
            allow_filled: false,
            allow_partial: true,
        };
        assert_eq!(cube.candidates_list(partial_only).len(), 1);
        assert!(cube.candidate_template(FRONT, partial_only).is_none());
        let t = cube.candidate_template(RIGHT, partial_only).unwrap();
        assert_eq!(t.fill, vec![false, true, true, true]);
        assert_eq!(cube.evil_burst_candidates().len(), 5);
    }

    #[test]
    fn test_empty_stamp_hits_filled_face_and_clears_it() {
        let (mut cube, mut anims) = cube(2);
        let pos = back_face(Axis::X);
        cube.faces[pos].slots.iter_mut().for_each(|s| s.filled = true);
        let result = cube.stamp(&mut anims, Axis::X, None, false, StampStyle::BonusAlways);
        assert!(result.was_hit && result.was_real_hit);
        assert!(result.hit_template.is_some());
        assert!(cube.faces[pos].is_empty(false));

        let again = cube.stamp(&mut anims, Axis::X, None, false, StampStyle::BonusAlways);
        assert!(!again.was_hit);
        assert_eq!(again.sound, SoundEffect::Same);
    }

    #[test]
    fn test_bonus_stamp_on_filled_face_completes_side() {
        let (mut cube, mut anims) = cube(2);
        let pos = back_face(Axis::Y);
        cube.faces[pos].slots.iter_mut().for_each(|s| s.filled = true);
        let mut template = PieceTemplate::from_face(&cube.faces[pos], false);
        template.set_all(true);
        let result = cube.stamp(&mut anims, Axis::Y, Some(&template), false, StampStyle::BonusRandom);
        assert!(result.side_complete);
        let result = cube.stamp(&mut anims, Axis::Y, Some(&template), false, StampStyle::CompletesFace);
        assert!(!result.side_complete);
    }

    #[test]
    fn test_slot_shrink_then_grow() {
        let (mut cube, mut anims) = cube(2);
        let piece = full_piece(&cube, Axis::Z);
        cube.collide(&mut anims, &[piece], false);
        let mut h = Harness { cube, events: Vec::new() };
        let fill = h.cube.faces[FRONT].fill_color;
        assert_ne!(h.cube.faces[FRONT].slots[0].color, fill);

        run(&mut h, &mut anims, 260);
        assert_eq!(h.cube.faces[FRONT].slots[0].color, fill);
        assert!(h.cube.faces[FRONT].slots[0].animating);
        run(&mut h, &mut anims, 260);
        assert!(!h.cube.faces[FRONT].slots[0].animating);
        assert_eq!(h.cube.faces[FRONT].slots[0].scale, 1.0);
    }

    #[test]
    fn test_intro_then_exit_events() {
        let (cube, mut anims) = cube(2);
        let mut h = Harness { cube, events: Vec::new() };
        h.cube.start_intro(&mut anims);
        assert!(!h.cube.can_rotate(&anims));
        run(&mut h, &mut anims, 800);
        assert_eq!(h.events, vec![CubeEvent::IntroComplete]);
        assert!((h.cube.scale - 1.0).abs() < 1e-4);
        assert!(h.cube.can_rotate(&anims));

        h.cube.start_exit(&mut anims);
        run(&mut h, &mut anims, 1200);
        assert_eq!(h.events, vec![CubeEvent::IntroComplete, CubeEvent::ExitComplete]);
        assert!(h.cube.scale.abs() < 1e-4);
    }

    #[test]
    fn test_stamp_push_reports_completion() {
        let (cube, mut anims) = cube(2);
        let mut h = Harness { cube, events: Vec::new() };
        assert!(h.cube.start_stamp(&mut anims, Axis::Z));
        assert!(!h.cube.can_stamp(&anims));
        run(&mut h, &mut anims, 260);
        assert_eq!(h.events, vec![CubeEvent::StampComplete(Axis::Z)]);
        assert!(h.cube.translation.z < -3.0);
        run(&mut h, &mut anims, 260);
        assert!(h.cube.translation.z.abs() < 1e-4);
    }

    #[test]
    fn test_lose_sequence() {
        let (cube, mut anims) = cube(2);
        let mut h = Harness { cube, events: Vec::new() };
        h.cube.scale = 1.0;
        h.cube.start_lose(&mut anims);
        assert!(!h.cube.faces[BACK].visible);
        assert!(h.cube.is_game_over_animating(&anims));
        run(&mut h, &mut anims, 2100);
        assert_eq!(h.events.first(), Some(&CubeEvent::GameOver { won: false }));
        assert!(!h.cube.faces[FRONT].visible);
    }
}
