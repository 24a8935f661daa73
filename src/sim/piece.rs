//! Launched pieces
//!
//! A piece is a sum type over its kind with the lifecycle fields shared in
//! [`LaunchedPiece`]. Kind-specific behavior (fall time, scoring, locking,
//! obsolescence, collision templates) is dispatched by matching on the kind.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::consts::{FALL_START_POS, TAP_DISTANCE_SCALE};
use crate::level::LevelConfig;
use crate::sim::anim::AnimHandle;
use crate::sim::grid::{Axis, Color, PieceTemplate};

/// Stable identity of a launched piece or rejection
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PieceId(pub u32);

/// Lifecycle stage; strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Waiting out the idle delay
    Idle,
    /// Pulsing placeholder at the landing face
    Hint,
    Falling,
    /// Shrinking out after its target face was completed
    Obsolete,
}

/// Where a cycling piece is in its color change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Growing in with the current color
    Intro,
    /// Holding the current color
    Hold,
    /// Shrinking out before the next color
    Exit,
}

/// Kind-specific state
#[derive(Debug, Clone)]
pub enum PieceKind {
    /// Targets one face
    Simple { template: PieceTemplate },
    /// Cycles through several targets while falling; whichever is showing
    /// at arrival counts
    Cycling {
        templates: Vec<PieceTemplate>,
        /// Shuffled visiting order into `templates`
        order: Vec<usize>,
        /// Number of entries of `order` actually visited
        cycle_len: usize,
        current: usize,
        phase: CyclePhase,
        /// Hold time per color (ms)
        period: u32,
        cycle_anim: AnimHandle,
    },
    /// Blends through several targets; matches any of them
    Blending {
        templates: Vec<PieceTemplate>,
        /// Time per color (ms)
        period: u32,
        blend_anim: AnimHandle,
    },
}

/// A piece in flight
#[derive(Debug, Clone)]
pub struct LaunchedPiece {
    pub id: PieceId,
    pub kind: PieceKind,
    pub orient: Axis,
    pub stage: Stage,
    pub is_burst: bool,
    /// What the hint glow shows at the landing face
    pub hint: PieceTemplate,
    /// Hint glow strength (0-1)
    pub glow: f32,
    pub glow_growing: bool,
    /// Hint was skipped by a tap
    pub hint_cancelled: bool,
    /// Untapped distance to the face (0 = landed)
    pub base_dist: f32,
    /// Tap acceleration (0 = untapped)
    pub accel: f32,
    /// Fall duration (ms)
    pub fall_time: u32,
    /// Slot size while a cycling piece changes color
    pub slot_scale: f32,
    pub alpha: f32,
    pub color: Color,
    pub score_multiplier: f32,
    pub(crate) stage_anim: AnimHandle,
    pub(crate) tap_anim: AnimHandle,
    pub(crate) fade_anim: AnimHandle,
}

impl LaunchedPiece {
    fn new(id: PieceId, kind: PieceKind, orient: Axis, hint: PieceTemplate, fall_time: u32, is_burst: bool) -> Self {
        let mut piece = Self {
            id,
            kind,
            orient,
            stage: Stage::Idle,
            is_burst,
            hint,
            glow: 0.0,
            glow_growing: true,
            hint_cancelled: false,
            base_dist: FALL_START_POS,
            accel: 0.0,
            fall_time,
            slot_scale: 1.0,
            alpha: 1.0,
            color: Color::ONE,
            score_multiplier: 1.0,
            stage_anim: AnimHandle::NONE,
            tap_anim: AnimHandle::NONE,
            fade_anim: AnimHandle::NONE,
        };
        piece.color = piece.current_template().fill_color;
        piece
    }

    pub fn simple(id: PieceId, mut template: PieceTemplate, orient: Axis, is_burst: bool, level: &LevelConfig) -> Self {
        template.orient = orient;
        let hint = template.clone();
        let fall_time = level.simple_fall_time(is_burst);
        Self::new(id, PieceKind::Simple { template }, orient, hint, fall_time, is_burst)
    }

    /// Cycling piece over at least two templates; `None` otherwise
    pub fn cycling<R: Rng>(
        id: PieceId,
        templates: Vec<PieceTemplate>,
        hint: PieceTemplate,
        is_burst: bool,
        level: &LevelConfig,
        rng: &mut R,
    ) -> Option<Self> {
        if templates.len() < 2 {
            return None;
        }
        let orient = hint.orient;
        let count = templates.len();
        let cycle_len = if level.evil_max_colors >= 2 && level.evil_max_colors < count {
            level.evil_max_colors
        } else {
            count
        };
        let mut order: Vec<usize> = (0..count).collect();
        order.shuffle(rng);

        let kind = PieceKind::Cycling {
            templates,
            order,
            cycle_len,
            current: 0,
            phase: CyclePhase::Intro,
            period: level.evil_period(),
            cycle_anim: AnimHandle::NONE,
        };
        let fall_time = level.evil_fall_time(is_burst);
        let mut piece = Self::new(id, kind, orient, hint, fall_time, is_burst);
        piece.score_multiplier = level.score.evil_multiplier;
        Some(piece)
    }

    /// Blending piece over at least two templates; `None` otherwise
    pub fn blending(id: PieceId, templates: Vec<PieceTemplate>, hint: PieceTemplate, level: &LevelConfig) -> Option<Self> {
        if templates.len() < 2 {
            return None;
        }
        let orient = hint.orient;
        let kind = PieceKind::Blending {
            templates,
            period: level.wild_period(),
            blend_anim: AnimHandle::NONE,
        };
        Some(Self::new(id, kind, orient, hint, level.wild_fall_time(), false))
    }

    /// Template currently showing
    pub fn current_template(&self) -> &PieceTemplate {
        match &self.kind {
            PieceKind::Simple { template } => template,
            PieceKind::Cycling {
                templates,
                order,
                current,
                ..
            } => &templates[order[*current]],
            PieceKind::Blending { templates, .. } => &templates[0],
        }
    }

    /// Templates tested against the struck face
    pub fn collision_templates(&self) -> Vec<PieceTemplate> {
        match &self.kind {
            PieceKind::Blending { templates, .. } => templates.clone(),
            _ => vec![self.current_template().clone()],
        }
    }

    /// Reservation owners held by any of the piece's templates
    pub fn reservation_owners(&self) -> Vec<u32> {
        let templates: &[PieceTemplate] = match &self.kind {
            PieceKind::Simple { template } => std::slice::from_ref(template),
            PieceKind::Cycling { templates, .. } | PieceKind::Blending { templates, .. } => templates,
        };
        let mut owners: Vec<u32> = templates.iter().map(|t| t.unique_id).filter(|id| *id > 0).collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }

    pub fn map_index(&self) -> i32 {
        self.current_template().map_index
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            PieceKind::Simple { .. } => "simple",
            PieceKind::Cycling { .. } => "cycling",
            PieceKind::Blending { .. } => "blending",
        }
    }

    /// Counts against the level's axis-lock quota
    pub fn can_lock(&self) -> bool {
        !matches!(self.kind, PieceKind::Simple { .. })
    }

    /// Invalidated by the completion of `map_index`. Only simple pieces
    /// ever become obsolete.
    pub fn is_obsolete_for(&self, map_index: i32) -> bool {
        match &self.kind {
            PieceKind::Simple { template } => template.map_index == map_index,
            _ => false,
        }
    }

    pub fn is_tapped(&self) -> bool {
        self.accel > 0.0 || self.tap_anim.is_some()
    }

    /// Remaining distance after tap acceleration
    pub fn total_dist(&self) -> f32 {
        (self.base_dist - TAP_DISTANCE_SCALE * self.accel).max(0.0)
    }

    /// Move a cycling piece to its next color. Returns the new template.
    pub(crate) fn advance_cycle(&mut self) -> Option<&PieceTemplate> {
        let PieceKind::Cycling {
            templates,
            order,
            cycle_len,
            current,
            ..
        } = &mut self.kind
        else {
            return None;
        };
        *current = (*current + 1) % *cycle_len;
        let template = &templates[order[*current]];
        self.hint = template.clone();
        self.color = template.fill_color;
        Some(template)
    }

    /// Interpolate a blending piece's color; `value` counts colors and wraps
    pub(crate) fn blend_color(&mut self, value: f32) {
        let PieceKind::Blending { templates, .. } = &self.kind else {
            return;
        };
        let count = templates.len();
        let value = value.max(0.0) % count as f32;
        let curr = (value.floor() as usize).min(count - 1);
        let next = (curr + 1) % count;
        let t = value - curr as f32;
        self.color = templates[curr].fill_color.lerp(templates[next].fill_color, t);
    }
}

/// A missed piece bouncing off the cube while fading out
#[derive(Debug, Clone)]
pub struct Rejection {
    pub id: PieceId,
    pub template: PieceTemplate,
    pub alpha: f32,
    pub offset: f32,
    pub(crate) fade_anim: AnimHandle,
    pub(crate) bounce_anim: AnimHandle,
}

/// A piece reaching the cube
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub piece: PieceId,
    pub orient: Axis,
    pub templates: Vec<PieceTemplate>,
    /// Tap acceleration at impact (0-1)
    pub tap_bonus: f32,
    pub score_multiplier: f32,
}
