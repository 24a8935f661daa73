//! Piece launcher
//!
//! Owns every piece in flight. A piece waits out its idle delay, pulses a
//! hint at its landing face, then falls toward the cube. Arrivals are queued
//! and drained by the game state, which resolves them against the cube.
//!
//! Pieces live in a map keyed by [`PieceId`]; the stage lists keep the order
//! in which pieces entered each stage.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::consts::*;
use crate::level::{AxisLock, EvilStyle, GridLock, LaunchAxisStyle, LevelConfig};
use crate::sim::anim::{AnimHandle, AnimItem, Scheduler};
use crate::sim::grid::{Axis, Color, PieceTemplate, BLACK, WHITE};
use crate::sim::piece::{Arrival, CyclePhase, LaunchedPiece, PieceId, PieceKind, Rejection, Stage};
use crate::sim::state::AnimTag;

const TAP_TABLE: [f32; 9] = [0.0, 0.01, 0.02, 0.03, 0.06, 0.12, 0.25, 0.5, 1.0];
const SWAP_IN_TABLE: [f32; 11] = [0.0, 0.35, 0.6, 0.8, 0.95, 1.05, 1.12, 1.15, 1.15, 1.1, 1.0];
const SWAP_OUT_TABLE: [f32; 11] = [1.0, 1.1, 1.15, 1.15, 1.12, 1.05, 0.95, 0.8, 0.6, 0.35, 0.0];
const BOUNCE_TABLE: [f32; 9] = [0.0, 0.5, 0.75, 0.88, 0.94, 0.97, 0.98, 0.99, 1.0];
/// Hole limit for the pieces of a cycling burst
const EVIL_BURST_HOLE_LIMIT: usize = 2;

/// Animations owned by the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherAnim {
    /// Idle timer, hint glow or fall, depending on the piece's stage
    Stage(PieceId),
    Tap(PieceId),
    Cycle(PieceId),
    Blend(PieceId),
    /// Obsolete shrink-out
    Fade(PieceId),
    RejectFade(PieceId),
    RejectBounce(PieceId),
    /// Shared pulse of the hints under falling pieces
    GlobalGlow,
}

/// Burst in progress; blocks further launches until every piece lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurstMode {
    #[default]
    None,
    Normal,
    Evil,
}

#[derive(Debug, Clone, Default)]
pub struct Launcher {
    pieces: BTreeMap<PieceId, LaunchedPiece>,
    idle: Vec<PieceId>,
    hint: Vec<PieceId>,
    falling: Vec<PieceId>,
    obsolete: BTreeMap<PieceId, LaunchedPiece>,
    rejections: BTreeMap<PieceId, Rejection>,
    arrivals: Vec<Arrival>,
    /// Reservation owners of pieces dropped before arriving
    released: Vec<u32>,
    directions: Vec<Axis>,
    idle_time: u32,
    glow_time: u32,
    glow_count: u32,
    last_axis: usize,
    last_index: i32,
    burst: BurstMode,
    global_glow: f32,
    global_glow_anim: AnimHandle,
    next_id: u32,
}

impl Launcher {
    pub fn new() -> Self {
        Self {
            directions: Axis::LAUNCH_ORDER.to_vec(),
            last_index: -1,
            next_id: 1,
            ..Default::default()
        }
    }

    /// Start the shared hint pulse
    pub fn start(&mut self, anims: &mut Scheduler<AnimTag>) {
        if !anims.is_active(self.global_glow_anim) {
            self.global_glow_anim = anims.register(AnimItem::linear_infinite(
                AnimTag::Launcher(LauncherAnim::GlobalGlow),
                0.0,
                1.0,
                GLOBAL_GLOW_MS,
            ));
        }
    }

    /// Pick this level's launch directions and timings
    pub fn new_level<R: Rng>(&mut self, rng: &mut R, level: &LevelConfig) {
        self.directions = Axis::LAUNCH_ORDER.to_vec();
        for _ in level.direction_count()..Axis::LAUNCH_ORDER.len() {
            let i = rng.random_range(0..self.directions.len());
            self.directions.remove(i);
        }
        self.idle_time = level.idle_time;
        self.glow_time = level.glow_time;
        self.glow_count = level.glow_count;
        log::debug!(
            "Launch directions: {:?}",
            self.directions.iter().map(|a| a.as_str()).collect::<Vec<_>>()
        );
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn directions(&self) -> &[Axis] {
        &self.directions
    }

    pub fn burst_mode(&self) -> BurstMode {
        self.burst
    }

    /// No piece idle, hinting or falling
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.pieces.len()
    }

    /// Pieces idle, hinting or falling, in launch order
    pub fn pieces(&self) -> impl Iterator<Item = &LaunchedPiece> {
        self.pieces.values()
    }

    pub fn piece(&self, id: PieceId) -> Option<&LaunchedPiece> {
        self.pieces.get(&id).or_else(|| self.obsolete.get(&id))
    }

    pub fn obsolete_pieces(&self) -> impl Iterator<Item = &LaunchedPiece> {
        self.obsolete.values()
    }

    pub fn rejections(&self) -> impl Iterator<Item = &Rejection> {
        self.rejections.values()
    }

    pub fn global_glow(&self) -> f32 {
        self.global_glow
    }

    /// Reservation owners of discarded and obsolete pieces since the last call
    pub fn drain_released(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.released)
    }

    /// Take the pieces that reached the cube since the last call
    pub fn drain_arrivals(&mut self) -> Vec<Arrival> {
        std::mem::take(&mut self.arrivals)
    }

    /// Color of the next piece arriving on `axis` (launch indicator)
    pub fn axis_color(&self, axis: Axis) -> Option<Color> {
        let first = |list: &[PieceId]| {
            list.iter()
                .filter_map(|id| self.pieces.get(id))
                .find(|p| p.orient == axis && !p.is_tapped())
                .map(|p| p.color)
        };
        first(&self.falling).or_else(|| first(&self.hint))
    }

    fn lock_count(&self) -> usize {
        self.pieces.values().filter(|p| p.can_lock()).count()
    }

    pub fn can_launch(&self, level: &LevelConfig) -> bool {
        if self.burst != BurstMode::None {
            return false;
        }
        if !level.axis_lock_active() {
            return true;
        }
        let lock_count = self.lock_count();
        if (level.evil_axis_lock == AxisLock::All || level.wild_axis_lock == AxisLock::All) && lock_count > 0 {
            return false;
        }
        lock_count < level.direction_count()
    }

    /// Launch directions not blocked by an in-flight locking piece
    pub fn unlocked_axes(&self, level: &LevelConfig) -> Vec<Axis> {
        if !level.axis_lock_active() {
            return self.directions.clone();
        }
        self.directions
            .iter()
            .copied()
            .filter(|axis| !self.pieces.values().any(|p| p.can_lock() && p.orient == *axis))
            .collect()
    }

    fn random_axis<R: Rng>(&self, rng: &mut R, level: &LevelConfig) -> Option<Axis> {
        self.unlocked_axes(level).choose(rng).copied()
    }

    /// Axis for a single piece per the level's launch style
    pub fn pick_axis<R: Rng>(&mut self, rng: &mut R, level: &LevelConfig, template: &PieceTemplate) -> Option<Axis> {
        let axes = self.unlocked_axes(level);
        if axes.is_empty() {
            return None;
        }
        match level.launch_axis_style {
            LaunchAxisStyle::Random => axes.choose(rng).copied(),
            LaunchAxisStyle::Sequential => {
                self.last_axis = (self.last_axis + 1) % axes.len();
                Some(axes[self.last_axis])
            }
            LaunchAxisStyle::ByColor => {
                if template.map_index != self.last_index {
                    self.last_axis += 1;
                    self.last_index = template.map_index;
                }
                self.last_axis %= axes.len();
                Some(axes[self.last_axis])
            }
        }
    }

    // ------------------------------------------------------------------
    // Launching
    // ------------------------------------------------------------------

    fn alloc_id(&mut self) -> PieceId {
        let id = PieceId(self.next_id);
        self.next_id += 1;
        id
    }

    fn spawn(&mut self, anims: &mut Scheduler<AnimTag>, mut piece: LaunchedPiece, idle: u32) -> PieceId {
        let id = piece.id;
        piece.stage_anim = anims.register(AnimItem::timer(AnimTag::Launcher(LauncherAnim::Stage(id)), idle, false));
        log::info!(
            "Launching {} piece on {} axis (index {})",
            piece.kind_name(),
            piece.orient.as_str(),
            piece.map_index()
        );
        self.idle.push(id);
        self.pieces.insert(id, piece);
        id
    }

    /// Launch a single piece on `axis` after `idle` ms
    pub fn launch_at(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        level: &LevelConfig,
        template: PieceTemplate,
        axis: Axis,
        idle: u32,
        is_burst: bool,
    ) -> PieceId {
        let id = self.alloc_id();
        let piece = LaunchedPiece::simple(id, template, axis, is_burst, level);
        self.spawn(anims, piece, idle)
    }

    /// Launch a single piece on an axis chosen by the level's style
    pub fn launch_simple<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        template: PieceTemplate,
    ) -> bool {
        let Some(axis) = self.pick_axis(rng, level, &template) else {
            log::warn!("No unlocked launch axis");
            return false;
        };
        self.launch_at(anims, level, template, axis, self.idle_time, false);
        true
    }

    /// Launch a piece cycling through `templates` (face snapshots)
    pub fn launch_cycling<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        mut templates: Vec<PieceTemplate>,
    ) -> bool {
        if templates.len() < 2 {
            return false;
        }
        let Some(orient) = self.random_axis(rng, level) else {
            return false;
        };
        for template in &mut templates {
            template.orient = orient;
            template.invert();
            match level.evil_style {
                EvilStyle::ColorOnly => template.set_all(true),
                EvilStyle::Randomized => template.randomize(rng, level.falling_hole_limit),
                EvilStyle::Complete => {}
            }
        }
        let hint = PieceTemplate::placeholder(orient, templates[0].dimen, BLACK);
        let id = PieceId(self.next_id);
        let Some(piece) = LaunchedPiece::cycling(id, templates, hint, false, level, rng) else {
            return false;
        };
        self.next_id += 1;
        self.spawn(anims, piece, self.idle_time);
        true
    }

    /// Launch a piece blending through `templates`; it matches any of them
    pub fn launch_blending<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        mut templates: Vec<PieceTemplate>,
    ) -> bool {
        if templates.len() < 2 {
            return false;
        }
        let Some(orient) = self.random_axis(rng, level) else {
            return false;
        };
        templates[0].set_all(true);
        templates[0].randomize(rng, level.falling_hole_limit);
        let shape = templates[0].clone();
        for template in &mut templates {
            template.orient = orient;
            template.copy_fill(&shape);
        }
        let mut hint = PieceTemplate::placeholder(orient, shape.dimen, WHITE);
        hint.copy_fill(&shape);

        let id = PieceId(self.next_id);
        let Some(piece) = LaunchedPiece::blending(id, templates, hint, level) else {
            return false;
        };
        self.next_id += 1;
        self.spawn(anims, piece, self.idle_time);
        true
    }

    /// Idle delay before the first piece of a burst, so it lands after the
    /// pieces already in flight
    fn burst_idle_base(&self, level: &LevelConfig) -> u32 {
        if !self.hint.is_empty() {
            self.glow_time / 2
        } else if !self.falling.is_empty() {
            level.fall_time / 2
        } else {
            0
        }
    }

    /// One piece per axis. Under grid lock the three pieces split one face
    /// between them.
    pub fn launch_burst<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        candidates: &[PieceTemplate],
    ) -> bool {
        let idle_base = self.burst_idle_base(level);
        let stagger = |i: usize| idle_base + i as u32 * BURST_STAGGER_MS;

        if level.grid_lock != GridLock::None {
            let Some(chosen) = candidates.choose(rng) else {
                return false;
            };
            let owners: Vec<u8> = (0..chosen.fill.len())
                .map(|i| if i < 3 { i as u8 + 1 } else { rng.random_range(1..=3) })
                .collect();
            for (i, axis) in Axis::ALL.into_iter().enumerate() {
                let mut template = chosen.clone();
                template.assign_from(&owners, i as u8 + 1);
                self.launch_at(anims, level, template, axis, stagger(i), true);
            }
        } else if candidates.len() >= 3 {
            for (i, axis) in Axis::ALL.into_iter().enumerate() {
                let mut template = candidates[i].clone();
                template.invert();
                template.randomize(rng, level.falling_hole_limit);
                self.launch_at(anims, level, template, axis, stagger(i), true);
            }
        } else {
            return false;
        }

        self.burst = BurstMode::Normal;
        log::info!("Burst launched");
        true
    }

    /// One two-color cycling piece per axis
    pub fn launch_evil_burst<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        candidates: &[PieceTemplate],
    ) -> bool {
        if candidates.len() < 3 {
            return false;
        }
        let idle_base = self.burst_idle_base(level);

        for (i, axis) in Axis::ALL.into_iter().enumerate() {
            let picks = rand::seq::index::sample(rng, candidates.len(), 2);
            let templates: Vec<PieceTemplate> = picks
                .iter()
                .map(|k| {
                    let mut template = candidates[k].clone();
                    template.orient = axis;
                    template.invert();
                    template.randomize(rng, EVIL_BURST_HOLE_LIMIT);
                    template
                })
                .collect();
            let hint = PieceTemplate::placeholder(axis, templates[0].dimen, BLACK);
            let id = PieceId(self.next_id);
            if let Some(piece) = LaunchedPiece::cycling(id, templates, hint, true, level, rng) {
                self.next_id += 1;
                self.spawn(anims, piece, idle_base + i as u32 * BURST_STAGGER_MS);
            }
        }

        self.burst = BurstMode::Evil;
        log::info!("Cycling burst launched");
        true
    }

    /// Show a missed piece bouncing off the cube
    pub fn add_rejection(&mut self, anims: &mut Scheduler<AnimTag>, template: PieceTemplate) {
        let id = self.alloc_id();
        let fade_anim = anims.register(AnimItem::linear(
            AnimTag::Launcher(LauncherAnim::RejectFade(id)),
            0.0,
            1.0,
            FADE_ANIM_MS,
        ));
        let bounce_anim = anims.register(AnimItem::parametric(
            AnimTag::Launcher(LauncherAnim::RejectBounce(id)),
            0.0,
            0.5,
            FADE_ANIM_MS,
            &BOUNCE_TABLE,
        ));
        self.rejections.insert(
            id,
            Rejection {
                id,
                template,
                alpha: 1.0,
                offset: 0.0,
                fade_anim,
                bounce_anim,
            },
        );
    }

    // ------------------------------------------------------------------
    // Player and game flow actions
    // ------------------------------------------------------------------

    /// Speed up the first untapped falling piece (on `axis` when given), or
    /// failing that skip the hint of the first untapped hinting piece
    pub fn accelerate(&mut self, anims: &mut Scheduler<AnimTag>, axis: Option<Axis>) -> bool {
        let eligible = |p: &LaunchedPiece| !p.is_tapped() && axis.is_none_or(|a| p.orient == a);
        let pick = |list: &[PieceId]| {
            list.iter()
                .copied()
                .find(|id| self.pieces.get(id).is_some_and(|p| eligible(p)))
        };
        let Some(id) = pick(&self.falling).or_else(|| pick(&self.hint)) else {
            return false;
        };
        let Some(piece) = self.pieces.get_mut(&id) else {
            return false;
        };

        if piece.stage == Stage::Hint {
            piece.hint_cancelled = true;
        }
        stop_cycle(anims, piece);
        piece.tap_anim = anims.register(AnimItem::parametric(
            AnimTag::Launcher(LauncherAnim::Tap(id)),
            0.0,
            1.0,
            TAP_ANIM_MS,
            &TAP_TABLE,
        ));
        log::debug!("Tapped {} piece on {} axis", piece.kind_name(), piece.orient.as_str());
        true
    }

    /// Drop pieces targeting a completed face. Waiting pieces vanish; falling
    /// ones shrink out. Returns the number of pieces affected.
    pub fn obsolete(&mut self, anims: &mut Scheduler<AnimTag>, map_index: i32) -> usize {
        let matching = |list: &[PieceId], pieces: &BTreeMap<PieceId, LaunchedPiece>| -> Vec<PieceId> {
            list.iter()
                .copied()
                .filter(|id| pieces.get(id).is_some_and(|p| p.is_obsolete_for(map_index)))
                .collect()
        };
        let waiting: Vec<PieceId> = matching(&self.idle, &self.pieces)
            .into_iter()
            .chain(matching(&self.hint, &self.pieces))
            .collect();
        let falling = matching(&self.falling, &self.pieces);

        for &id in &waiting {
            self.discard(anims, id);
        }
        for &id in &falling {
            self.start_obsolete(anims, id);
        }
        let count = waiting.len() + falling.len();
        if count > 0 {
            log::info!("{count} piece(s) obsolete for index {map_index}");
        }
        count
    }

    /// Remove every waiting piece and shrink out every falling one
    pub fn clear_all(&mut self, anims: &mut Scheduler<AnimTag>) {
        let waiting: Vec<PieceId> = self.idle.iter().chain(&self.hint).copied().collect();
        for id in waiting {
            self.discard(anims, id);
        }
        for id in self.falling.clone() {
            self.start_obsolete(anims, id);
        }
        self.burst = BurstMode::None;
    }

    fn unlist(&mut self, id: PieceId) {
        self.idle.retain(|p| *p != id);
        self.hint.retain(|p| *p != id);
        self.falling.retain(|p| *p != id);
    }

    fn discard(&mut self, anims: &mut Scheduler<AnimTag>, id: PieceId) {
        self.unlist(id);
        if let Some(mut piece) = self.pieces.remove(&id) {
            release(anims, &mut piece);
            self.released.extend(piece.reservation_owners());
        }
    }

    fn start_obsolete(&mut self, anims: &mut Scheduler<AnimTag>, id: PieceId) {
        self.unlist(id);
        let Some(mut piece) = self.pieces.remove(&id) else {
            return;
        };
        release(anims, &mut piece);
        self.released.extend(piece.reservation_owners());
        piece.stage = Stage::Obsolete;
        piece.fade_anim = anims.register(AnimItem::linear(
            AnimTag::Launcher(LauncherAnim::Fade(id)),
            1.0,
            0.0,
            FADE_ANIM_MS,
        ));
        self.obsolete.insert(id, piece);
    }

    // ------------------------------------------------------------------
    // Stage transitions
    // ------------------------------------------------------------------

    fn enter_hint(&mut self, anims: &mut Scheduler<AnimTag>, id: PieceId) {
        let Some(piece) = self.pieces.get_mut(&id) else {
            return;
        };
        piece.stage = Stage::Hint;
        piece.glow = 0.0;
        piece.stage_anim = anims.register(AnimItem::linear(
            AnimTag::Launcher(LauncherAnim::Stage(id)),
            0.0,
            1.0,
            self.glow_time,
        ));
        self.idle.retain(|p| *p != id);
        self.hint.push(id);
    }

    fn enter_fall(&mut self, anims: &mut Scheduler<AnimTag>, id: PieceId) {
        let Some(piece) = self.pieces.get_mut(&id) else {
            return;
        };
        piece.stage = Stage::Falling;
        piece.base_dist = FALL_START_POS;
        piece.stage_anim = anims.register(AnimItem::linear(
            AnimTag::Launcher(LauncherAnim::Stage(id)),
            FALL_START_POS,
            0.0,
            piece.fall_time,
        ));

        if matches!(piece.kind, PieceKind::Cycling { .. }) {
            piece.hint = piece.current_template().clone();
            if !piece.is_tapped() {
                piece.slot_scale = 0.0;
                schedule_cycle(anims, piece, CyclePhase::Intro);
            }
        } else if let PieceKind::Blending {
            templates,
            period,
            blend_anim,
        } = &mut piece.kind
        {
            let count = templates.len() as u32;
            *blend_anim = anims.register(AnimItem::linear_infinite(
                AnimTag::Launcher(LauncherAnim::Blend(id)),
                0.0,
                count as f32,
                count * *period,
            ));
        }

        self.hint.retain(|p| *p != id);
        self.falling.push(id);
    }

    fn arrive(&mut self, anims: &mut Scheduler<AnimTag>, id: PieceId) {
        self.unlist(id);
        let Some(mut piece) = self.pieces.remove(&id) else {
            return;
        };
        release(anims, &mut piece);
        log::debug!("Piece {} arrived on {} axis", id.0, piece.orient.as_str());
        self.arrivals.push(Arrival {
            piece: id,
            orient: piece.orient,
            templates: piece.collision_templates(),
            tap_bonus: piece.accel,
            score_multiplier: piece.score_multiplier,
        });

        if self.burst != BurstMode::None && self.pieces.is_empty() {
            self.burst = BurstMode::None;
            log::debug!("Burst finished");
        }
    }

    // ------------------------------------------------------------------
    // Animation dispatch
    // ------------------------------------------------------------------

    pub fn on_frame(&mut self, anims: &mut Scheduler<AnimTag>, _id: AnimHandle, anim: LauncherAnim, value: f32) -> bool {
        match anim {
            LauncherAnim::Stage(pid) => {
                let Some(piece) = self.pieces.get_mut(&pid) else {
                    return false;
                };
                let stage = piece.stage;
                match stage {
                    Stage::Hint if piece.hint_cancelled => {
                        self.enter_fall(anims, pid);
                        false
                    }
                    Stage::Hint => {
                        let mut v = (self.glow_count as f32 * value).fract();
                        piece.glow_growing = v < 0.5;
                        if !piece.glow_growing {
                            v = 1.0 - v;
                        }
                        piece.glow = v * 2.0;
                        true
                    }
                    Stage::Falling => {
                        piece.base_dist = value;
                        if piece.total_dist() <= 0.0 {
                            self.arrive(anims, pid);
                            return false;
                        }
                        true
                    }
                    Stage::Idle | Stage::Obsolete => true,
                }
            }
            LauncherAnim::Tap(pid) => match self.pieces.get_mut(&pid) {
                Some(piece) => {
                    piece.accel = value;
                    true
                }
                None => false,
            },
            LauncherAnim::Cycle(pid) => match self.pieces.get_mut(&pid) {
                Some(piece) => {
                    if let PieceKind::Cycling { phase, .. } = piece.kind {
                        if phase != CyclePhase::Hold {
                            piece.slot_scale = value;
                        }
                    }
                    true
                }
                None => false,
            },
            LauncherAnim::Blend(pid) => {
                let piece = self.pieces.get_mut(&pid).or_else(|| self.obsolete.get_mut(&pid));
                match piece {
                    Some(piece) => {
                        piece.blend_color(value);
                        true
                    }
                    None => false,
                }
            }
            LauncherAnim::Fade(pid) => match self.obsolete.get_mut(&pid) {
                Some(piece) => {
                    piece.alpha = value;
                    true
                }
                None => false,
            },
            LauncherAnim::RejectFade(rid) => match self.rejections.get_mut(&rid) {
                Some(rejection) => {
                    rejection.alpha = 1.0 - value;
                    true
                }
                None => false,
            },
            LauncherAnim::RejectBounce(rid) => match self.rejections.get_mut(&rid) {
                Some(rejection) => {
                    rejection.offset = value;
                    true
                }
                None => false,
            },
            LauncherAnim::GlobalGlow => {
                let v = 1.0 - value.fract();
                self.global_glow = v;
                for id in &self.falling {
                    if let Some(piece) = self.pieces.get_mut(id) {
                        piece.glow = v;
                        piece.glow_growing = false;
                    }
                }
                true
            }
        }
    }

    pub fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, _id: AnimHandle, anim: LauncherAnim) {
        match anim {
            LauncherAnim::Stage(pid) => {
                let Some(stage) = self.pieces.get(&pid).map(|p| p.stage) else {
                    return;
                };
                match stage {
                    Stage::Idle => self.enter_hint(anims, pid),
                    Stage::Hint => self.enter_fall(anims, pid),
                    Stage::Falling => self.arrive(anims, pid),
                    Stage::Obsolete => {}
                }
            }
            LauncherAnim::Tap(pid) => {
                if let Some(piece) = self.pieces.get_mut(&pid) {
                    piece.tap_anim = AnimHandle::NONE;
                }
            }
            LauncherAnim::Cycle(pid) => {
                let Some(piece) = self.pieces.get_mut(&pid) else {
                    return;
                };
                let PieceKind::Cycling { phase, .. } = piece.kind else {
                    return;
                };
                match phase {
                    CyclePhase::Intro => schedule_cycle(anims, piece, CyclePhase::Hold),
                    CyclePhase::Hold => schedule_cycle(anims, piece, CyclePhase::Exit),
                    CyclePhase::Exit => {
                        piece.advance_cycle();
                        schedule_cycle(anims, piece, CyclePhase::Intro);
                    }
                }
            }
            LauncherAnim::Fade(pid) => {
                if let Some(mut piece) = self.obsolete.remove(&pid) {
                    release(anims, &mut piece);
                }
            }
            LauncherAnim::RejectFade(rid) => {
                if let Some(mut rejection) = self.rejections.remove(&rid) {
                    anims.clear(&mut rejection.bounce_anim);
                }
            }
            LauncherAnim::RejectBounce(rid) => {
                if let Some(rejection) = self.rejections.get_mut(&rid) {
                    rejection.bounce_anim = AnimHandle::NONE;
                }
            }
            LauncherAnim::Blend(_) | LauncherAnim::GlobalGlow => {}
        }
    }
}

/// Start the next phase of a cycling piece's color change
fn schedule_cycle(anims: &mut Scheduler<AnimTag>, piece: &mut LaunchedPiece, next: CyclePhase) {
    let id = piece.id;
    let PieceKind::Cycling {
        phase,
        period,
        cycle_anim,
        ..
    } = &mut piece.kind
    else {
        return;
    };
    let tag = AnimTag::Launcher(LauncherAnim::Cycle(id));
    let item = match next {
        CyclePhase::Intro => AnimItem::parametric(tag, 0.0, 1.0, CYCLE_SWAP_MS, &SWAP_IN_TABLE),
        CyclePhase::Hold => AnimItem::timer(tag, *period, false),
        CyclePhase::Exit => AnimItem::parametric(tag, 0.0, 1.0, CYCLE_SWAP_MS, &SWAP_OUT_TABLE),
    };
    *phase = next;
    *cycle_anim = anims.register(item);
}

/// Freeze a cycling piece on its current color
fn stop_cycle(anims: &mut Scheduler<AnimTag>, piece: &mut LaunchedPiece) {
    if let PieceKind::Cycling { cycle_anim, .. } = &mut piece.kind {
        anims.clear(cycle_anim);
        piece.slot_scale = 1.0;
    }
}

/// Cancel every animation a piece owns
fn release(anims: &mut Scheduler<AnimTag>, piece: &mut LaunchedPiece) {
    anims.clear(&mut piece.stage_anim);
    anims.clear(&mut piece.tap_anim);
    anims.clear(&mut piece.fade_anim);
    match &mut piece.kind {
        PieceKind::Cycling { cycle_anim, .. } => anims.clear(cycle_anim),
        PieceKind::Blending { blend_anim, .. } => anims.clear(blend_anim),
        PieceKind::Simple { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::anim::AnimTarget;
    use glam::Vec4;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[derive(Default)]
    struct Harness {
        launcher: Launcher,
        arrivals: Vec<Arrival>,
    }

    impl AnimTarget<AnimTag> for Harness {
        fn on_frame(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag, value: f32) -> bool {
            match tag {
                AnimTag::Launcher(anim) => self.launcher.on_frame(anims, id, *anim, value),
                _ => true,
            }
        }

        fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag) {
            if let AnimTag::Launcher(anim) = tag {
                self.launcher.on_complete(anims, id, *anim);
            }
        }
    }

    fn setup(level: &LevelConfig) -> (Harness, Scheduler<AnimTag>, Pcg32) {
        let mut rng = Pcg32::seed_from_u64(11);
        let mut anims = Scheduler::new();
        let mut launcher = Launcher::new();
        launcher.new_level(&mut rng, level);
        launcher.start(&mut anims);
        (
            Harness {
                launcher,
                arrivals: Vec::new(),
            },
            anims,
            rng,
        )
    }

    fn run(harness: &mut Harness, anims: &mut Scheduler<AnimTag>, ms: u32) {
        for _ in 0..ms / 10 {
            anims.advance(10.0, harness);
            let arrived = harness.launcher.drain_arrivals();
            harness.arrivals.extend(arrived);
        }
    }

    fn timed_level() -> LevelConfig {
        LevelConfig {
            idle_time: 100,
            glow_time: 200,
            fall_time: 500,
            glow_count: 2,
            ..Default::default()
        }
    }

    fn template(map_index: i32, color: Color) -> PieceTemplate {
        let mut t = PieceTemplate::placeholder(Axis::Z, 2, color);
        t.map_index = map_index;
        t
    }

    #[test]
    fn test_piece_moves_through_stages_and_arrives_once() {
        let level = timed_level();
        let (mut h, mut anims, mut rng) = setup(&level);
        assert!(h.launcher.launch_simple(&mut anims, &mut rng, &level, template(4, WHITE)));
        let id = h.launcher.pieces().next().unwrap().id;

        run(&mut h, &mut anims, 50);
        assert_eq!(h.launcher.piece(id).unwrap().stage, Stage::Idle);
        run(&mut h, &mut anims, 150);
        assert_eq!(h.launcher.piece(id).unwrap().stage, Stage::Hint);
        run(&mut h, &mut anims, 200);
        assert_eq!(h.launcher.piece(id).unwrap().stage, Stage::Falling);
        run(&mut h, &mut anims, 380);
        assert!(h.arrivals.is_empty());

        run(&mut h, &mut anims, 500);
        assert_eq!(h.arrivals.len(), 1);
        assert_eq!(h.arrivals[0].templates[0].map_index, 4);
        assert_eq!(h.arrivals[0].tap_bonus, 0.0);
        assert!(h.launcher.is_empty());
        // Only the shared glow pulse remains
        assert_eq!(anims.len(), 1);
    }

    #[test]
    fn test_tap_speeds_up_arrival() {
        let level = LevelConfig {
            fall_time: 5000,
            ..timed_level()
        };
        let (mut h, mut anims, _rng) = setup(&level);
        let axis = h.launcher.directions()[0];
        h.launcher.launch_at(&mut anims, &level, template(1, WHITE), axis, 0, false);
        run(&mut h, &mut anims, 400);
        assert!(h.launcher.accelerate(&mut anims, Some(axis)));
        // Already tapped pieces are skipped
        assert!(!h.launcher.accelerate(&mut anims, Some(axis)));

        run(&mut h, &mut anims, 700);
        assert_eq!(h.arrivals.len(), 1);
        assert!(h.arrivals[0].tap_bonus > 0.0);
    }

    #[test]
    fn test_tap_during_hint_skips_glow() {
        let level = LevelConfig {
            glow_time: 5000,
            ..timed_level()
        };
        let (mut h, mut anims, _rng) = setup(&level);
        h.launcher.launch_at(&mut anims, &level, template(1, WHITE), Axis::X, 0, false);
        run(&mut h, &mut anims, 50);
        let id = h.launcher.pieces().next().unwrap().id;
        assert_eq!(h.launcher.piece(id).unwrap().stage, Stage::Hint);

        assert!(h.launcher.accelerate(&mut anims, None));
        run(&mut h, &mut anims, 20);
        let piece = h.launcher.piece(id).unwrap();
        assert_eq!(piece.stage, Stage::Falling);
        assert!(piece.hint_cancelled);
    }

    #[test]
    fn test_obsolete_waits_for_fade() {
        let level = timed_level();
        let (mut h, mut anims, _rng) = setup(&level);
        h.launcher.launch_at(&mut anims, &level, template(3, WHITE), Axis::X, 0, false);
        h.launcher.launch_at(&mut anims, &level, template(3, WHITE), Axis::Y, 10_000, false);
        h.launcher.launch_at(&mut anims, &level, template(5, WHITE), Axis::Z, 10_000, false);
        run(&mut h, &mut anims, 300);

        assert_eq!(h.launcher.obsolete(&mut anims, 3), 2);
        assert_eq!(h.launcher.in_flight(), 1);
        assert_eq!(h.launcher.obsolete_pieces().count(), 1);

        run(&mut h, &mut anims, 250);
        let fading = h.launcher.obsolete_pieces().next().unwrap();
        assert!(fading.alpha > 0.0 && fading.alpha < 1.0);
        run(&mut h, &mut anims, 300);
        assert_eq!(h.launcher.obsolete_pieces().count(), 0);
        assert!(h.arrivals.is_empty());
    }

    #[test]
    fn test_dropped_pieces_report_reservation_owners() {
        let level = timed_level();
        let (mut h, mut anims, _rng) = setup(&level);
        for (map_index, owner, axis, delay) in [(3, 4, Axis::X, 0), (3, 9, Axis::Y, 10_000), (5, 6, Axis::Z, 0)] {
            let mut t = template(map_index, WHITE);
            t.unique_id = owner;
            h.launcher.launch_at(&mut anims, &level, t, axis, delay, false);
        }
        run(&mut h, &mut anims, 300);

        assert_eq!(h.launcher.obsolete(&mut anims, 3), 2);
        let mut released = h.launcher.drain_released();
        released.sort_unstable();
        assert_eq!(released, vec![4, 9]);
        assert!(h.launcher.drain_released().is_empty());

        h.launcher.clear_all(&mut anims);
        assert_eq!(h.launcher.drain_released(), vec![6]);
    }

    #[test]
    fn test_cycling_needs_two_candidates() {
        let level = timed_level();
        let (mut h, mut anims, mut rng) = setup(&level);
        let before = anims.len();
        assert!(!h.launcher.launch_cycling(&mut anims, &mut rng, &level, vec![template(0, WHITE)]));
        assert!(h.launcher.is_empty());
        assert_eq!(anims.len(), before);
    }

    #[test]
    fn test_cycling_piece_changes_target_while_falling() {
        let level = LevelConfig {
            evil_period: 300,
            ..timed_level()
        };
        let (mut h, mut anims, mut rng) = setup(&level);
        let colors = [Vec4::X, Vec4::Y, Vec4::Z];
        let templates: Vec<PieceTemplate> = (0..3).map(|i| template(i, colors[i as usize])).collect();
        assert!(h.launcher.launch_cycling(&mut anims, &mut rng, &level, templates));
        let id = h.launcher.pieces().next().unwrap().id;
        let first = h.launcher.piece(id).unwrap().map_index();
        // Color-only pieces cover the whole face
        assert_eq!(h.launcher.piece(id).unwrap().current_template().filled_count(), 4);

        run(&mut h, &mut anims, 1000);
        let piece = h.launcher.piece(id).unwrap();
        assert_eq!(piece.stage, Stage::Falling);
        assert_eq!(piece.map_index(), first);
        assert_eq!(piece.hint.map_index, first);

        run(&mut h, &mut anims, 1000);
        let piece = h.launcher.piece(id).unwrap();
        assert_ne!(piece.map_index(), first);
        assert_eq!(piece.hint.map_index, piece.map_index());
        assert_eq!(piece.color, piece.current_template().fill_color);
    }

    #[test]
    fn test_axis_lock_blocks_launches() {
        let level = LevelConfig {
            evil_axis_lock: AxisLock::Single,
            directions: 2,
            ..timed_level()
        };
        let (mut h, mut anims, mut rng) = setup(&level);
        assert_eq!(h.launcher.directions().len(), 2);
        assert!(h.launcher.can_launch(&level));

        let templates = vec![template(0, WHITE), template(1, BLACK)];
        assert!(h.launcher.launch_cycling(&mut anims, &mut rng, &level, templates.clone()));
        assert!(h.launcher.can_launch(&level));
        let locked = h.launcher.pieces().next().unwrap().orient;
        assert_eq!(h.launcher.unlocked_axes(&level).len(), 1);
        assert!(!h.launcher.unlocked_axes(&level).contains(&locked));

        assert!(h.launcher.launch_cycling(&mut anims, &mut rng, &level, templates));
        assert!(!h.launcher.can_launch(&level));
        assert!(h.launcher.unlocked_axes(&level).is_empty());
        assert!(!h.launcher.launch_simple(&mut anims, &mut rng, &level, template(2, WHITE)));

        let all = LevelConfig {
            wild_axis_lock: AxisLock::All,
            ..level
        };
        assert!(!h.launcher.can_launch(&all));
    }

    #[test]
    fn test_sequential_axis_style_rotates() {
        let level = LevelConfig {
            launch_axis_style: LaunchAxisStyle::Sequential,
            ..timed_level()
        };
        let (mut h, _anims, mut rng) = setup(&level);
        let t = template(0, WHITE);
        let picks: Vec<Axis> = (0..4)
            .filter_map(|_| h.launcher.pick_axis(&mut rng, &level, &t))
            .collect();
        let dirs = h.launcher.directions().to_vec();
        assert_eq!(picks, vec![dirs[1], dirs[2], dirs[0], dirs[1]]);
    }

    #[test]
    fn test_by_color_axis_style_follows_index() {
        let level = LevelConfig {
            launch_axis_style: LaunchAxisStyle::ByColor,
            ..timed_level()
        };
        let (mut h, _anims, mut rng) = setup(&level);
        let a = h.launcher.pick_axis(&mut rng, &level, &template(2, WHITE));
        let b = h.launcher.pick_axis(&mut rng, &level, &template(2, WHITE));
        let c = h.launcher.pick_axis(&mut rng, &level, &template(4, WHITE));
        assert_eq!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn test_burst_blocks_until_all_land() {
        let level = timed_level();
        let (mut h, mut anims, mut rng) = setup(&level);
        let candidates: Vec<PieceTemplate> = (0..4).map(|i| template(i, WHITE)).collect();
        assert!(h.launcher.launch_burst(&mut anims, &mut rng, &level, &candidates));
        assert_eq!(h.launcher.burst_mode(), BurstMode::Normal);
        assert_eq!(h.launcher.in_flight(), 3);
        assert!(!h.launcher.can_launch(&level));
        let orients: Vec<Axis> = h.launcher.pieces().map(|p| p.orient).collect();
        assert_eq!(orients, Axis::ALL.to_vec());

        run(&mut h, &mut anims, 1000);
        assert_eq!(h.arrivals.len(), 3);
        assert_eq!(h.launcher.burst_mode(), BurstMode::None);
        assert!(h.launcher.can_launch(&level));
    }

    #[test]
    fn test_grid_lock_burst_partitions_one_face() {
        let level = LevelConfig {
            grid_lock: GridLock::Wait,
            ..timed_level()
        };
        let (mut h, mut anims, mut rng) = setup(&level);
        let candidates = vec![template(2, WHITE)];
        assert!(h.launcher.launch_burst(&mut anims, &mut rng, &level, &candidates));

        let mut covered = vec![0; 4];
        for piece in h.launcher.pieces() {
            assert_eq!(piece.map_index(), 2);
            for (i, f) in piece.current_template().fill.iter().enumerate() {
                if *f {
                    covered[i] += 1;
                }
            }
        }
        assert_eq!(covered, vec![1; 4]);
    }

    #[test]
    fn test_evil_burst_launches_cycling_pieces() {
        let level = timed_level();
        let (mut h, mut anims, mut rng) = setup(&level);
        let candidates: Vec<PieceTemplate> = (0..3).map(|i| template(i, WHITE)).collect();
        assert!(h.launcher.launch_evil_burst(&mut anims, &mut rng, &level, &candidates));
        assert_eq!(h.launcher.burst_mode(), BurstMode::Evil);
        assert_eq!(h.launcher.in_flight(), 3);
        assert!(h.launcher.pieces().all(|p| p.is_burst && p.can_lock()));
        assert!(!h.launcher.launch_evil_burst(&mut anims, &mut rng, &level, &candidates[..2]));
    }

    #[test]
    fn test_blending_piece_matches_every_template() {
        let level = LevelConfig {
            wild_fall_time: 500,
            ..timed_level()
        };
        let (mut h, mut anims, mut rng) = setup(&level);
        let templates = vec![template(0, Vec4::X), template(1, Vec4::Y)];
        assert!(h.launcher.launch_blending(&mut anims, &mut rng, &level, templates));
        let piece = h.launcher.pieces().next().unwrap();
        let fills: Vec<Vec<bool>> = piece.collision_templates().iter().map(|t| t.fill.clone()).collect();
        assert_eq!(fills[0], fills[1]);
        assert_eq!(piece.hint.fill, fills[0]);
        assert!(!piece.is_obsolete_for(0));

        run(&mut h, &mut anims, 1000);
        assert_eq!(h.arrivals.len(), 1);
        assert_eq!(h.arrivals[0].templates.len(), 2);
    }

    #[test]
    fn test_rejection_fades_out() {
        let level = timed_level();
        let (mut h, mut anims, _rng) = setup(&level);
        h.launcher.add_rejection(&mut anims, template(1, WHITE));
        run(&mut h, &mut anims, 250);
        let rejection = h.launcher.rejections().next().unwrap();
        assert!(rejection.alpha < 1.0 && rejection.offset > 0.0);
        run(&mut h, &mut anims, 300);
        assert_eq!(h.launcher.rejections().count(), 0);
        assert_eq!(anims.len(), 1);
    }

    #[test]
    fn test_clear_all_empties_launcher() {
        let level = timed_level();
        let (mut h, mut anims, mut rng) = setup(&level);
        let candidates: Vec<PieceTemplate> = (0..3).map(|i| template(i, WHITE)).collect();
        h.launcher.launch_burst(&mut anims, &mut rng, &level, &candidates);
        run(&mut h, &mut anims, 350);
        h.launcher.clear_all(&mut anims);
        assert!(h.launcher.is_empty());
        assert_eq!(h.launcher.burst_mode(), BurstMode::None);
        run(&mut h, &mut anims, 600);
        assert_eq!(h.launcher.obsolete_pieces().count(), 0);
        assert!(h.arrivals.is_empty());
    }
}
