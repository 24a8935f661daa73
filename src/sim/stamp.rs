//! Stamps
//!
//! One stamp per axis, facing the back face of that axis. A stamp fades in,
//! grows its overlay grid, then lives for the level's stamp duration. Multi
//! template stamps swap overlays while they live. Stamping the cube into it,
//! or running out of time, hides it again.
//!
//! Under `BonusAlways` the stamps carry no overlay and stay up for the whole
//! level; a hit flashes the face content it knocked out.

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::consts::*;
use crate::level::{LevelConfig, StampStyle};
use crate::sim::anim::{AnimHandle, AnimItem, Scheduler};
use crate::sim::grid::{Axis, PieceTemplate};
use crate::sim::powerup::PowerUpKind;
use crate::sim::state::AnimTag;

const GRID_IN_TABLE: [f32; 11] = [0.0, 0.35, 0.6, 0.8, 0.95, 1.05, 1.12, 1.15, 1.15, 1.1, 1.0];
const GRID_OUT_TABLE: [f32; 11] = [1.0, 1.1, 1.15, 1.15, 1.12, 1.05, 0.95, 0.8, 0.6, 0.35, 0.0];
const RECOIL_TABLE: [f32; 4] = [0.0, 0.6, 0.9, 1.0];
const BOUNCE_TABLE: [f32; 11] = [0.0, 0.6, 0.9, 1.0, 0.9, 0.8, 0.6, 0.4, 0.2, 0.1, 0.0];
const FLASH_TABLE: [f32; 7] = [1.0, 1.0, 1.0, 0.9, 0.7, 0.4, 0.0];

/// Animations owned by a stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampAnim {
    /// Stamp opacity in or out
    Fade,
    /// Overlay grid intro or outro
    Grid,
    /// Lifetime of a shown stamp
    Life,
    /// Hold time of one overlay of a cycling stamp
    Cycle,
    /// Push back after a stamp, or a bounce for persistent stamps
    Recoil,
    /// Knocked-out face content fading off a persistent stamp
    Flash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampEvent {
    /// A stamp ran out of time before it was used
    Expired {
        axis: Axis,
        power_up: Option<PowerUpKind>,
    },
}

/// Overlay grid shown on a stamp
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub templates: Vec<PieceTemplate>,
    pub current: usize,
    pub visible: bool,
    pub slot_scale: f32,
    pub alpha: f32,
}

impl Overlay {
    pub fn template(&self) -> Option<&PieceTemplate> {
        self.templates.get(self.current)
    }

    fn set(&mut self, templates: Vec<PieceTemplate>) {
        self.visible = !templates.is_empty();
        self.templates = templates;
        self.current = 0;
        self.slot_scale = 0.0;
        self.alpha = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct StampSlot {
    pub axis: Axis,
    pub opacity: f32,
    /// Distance pushed away from the cube
    pub recoil: f32,
    pub overlay: Overlay,
    pub power_up: Option<PowerUpKind>,
    living: bool,
    grid_intro: bool,
    fade_anim: AnimHandle,
    grid_anim: AnimHandle,
    life_anim: AnimHandle,
    cycle_anim: AnimHandle,
    recoil_anim: AnimHandle,
    flash_anim: AnimHandle,
}

impl StampSlot {
    fn new(axis: Axis) -> Self {
        Self {
            axis,
            opacity: 0.0,
            recoil: 0.0,
            overlay: Overlay::default(),
            power_up: None,
            living: false,
            grid_intro: false,
            fade_anim: AnimHandle::NONE,
            grid_anim: AnimHandle::NONE,
            life_anim: AnimHandle::NONE,
            cycle_anim: AnimHandle::NONE,
            recoil_anim: AnimHandle::NONE,
            flash_anim: AnimHandle::NONE,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }

    /// Fully shown and not recoiling
    pub fn is_stampable(&self) -> bool {
        self.opacity >= 1.0 && self.recoil_anim.is_none()
    }

    /// Map index of the shown overlay
    pub fn map_index(&self) -> Option<i32> {
        if self.is_visible() && self.overlay.visible {
            self.overlay.template().map(|t| t.map_index)
        } else {
            None
        }
    }

    /// Distance from the cube center
    pub fn distance(&self) -> f32 {
        let base = if self.axis == Axis::Y { STAMP_DIST_Y } else { STAMP_DIST };
        base + self.recoil
    }

    fn tag(&self, anim: StampAnim) -> AnimTag {
        AnimTag::Stamp(self.axis, anim)
    }

    fn show(&mut self, anims: &mut Scheduler<AnimTag>, templates: Vec<PieceTemplate>, power_up: Option<PowerUpKind>) {
        self.cancel_all(anims);
        self.overlay.set(templates);
        self.power_up = power_up;
        self.recoil = 0.0;
        self.fade_anim = anims.register(AnimItem::linear(self.tag(StampAnim::Fade), self.opacity, 1.0, STAMP_FADE_MS));
    }

    fn hide(&mut self, anims: &mut Scheduler<AnimTag>, slot_anim: bool) {
        self.living = false;
        anims.clear(&mut self.life_anim);
        anims.clear(&mut self.cycle_anim);
        anims.clear(&mut self.grid_anim);
        anims.clear(&mut self.fade_anim);

        if slot_anim && self.overlay.visible && self.overlay.slot_scale > 0.0 {
            self.start_grid(anims, false);
        } else if self.opacity > 0.0 {
            self.start_fade_out(anims);
        }
    }

    fn start_fade_out(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.fade_anim = anims.register(AnimItem::linear(self.tag(StampAnim::Fade), self.opacity, 0.0, STAMP_FADE_MS));
    }

    fn start_grid(&mut self, anims: &mut Scheduler<AnimTag>, intro: bool) {
        let table: &[f32] = if intro { &GRID_IN_TABLE } else { &GRID_OUT_TABLE };
        self.grid_intro = intro;
        anims.clear(&mut self.grid_anim);
        self.grid_anim = anims.register(AnimItem::parametric(self.tag(StampAnim::Grid), 0.0, 1.0, STAMP_FADE_MS, table));
    }

    fn collide(&mut self, anims: &mut Scheduler<AnimTag>, was_hit: bool, hit_template: Option<PieceTemplate>, style: StampStyle) {
        anims.clear(&mut self.recoil_anim);
        if style != StampStyle::BonusAlways {
            if was_hit {
                self.overlay.visible = false;
            }
            self.hide(anims, false);
            self.recoil_anim = anims.register(AnimItem::parametric(
                self.tag(StampAnim::Recoil),
                self.recoil,
                self.recoil + STAMP_RECOIL_DIST,
                STAMP_RECOIL_MS,
                &RECOIL_TABLE,
            ));
            return;
        }

        self.recoil_anim = anims.register(AnimItem::parametric(
            self.tag(StampAnim::Recoil),
            self.recoil,
            self.recoil + STAMP_RECOIL_DIST / 2.0,
            STAMP_FADE_MS,
            &BOUNCE_TABLE,
        ));
        if let Some(mut template) = hit_template {
            template.orient = self.axis;
            anims.clear(&mut self.flash_anim);
            self.overlay.set(vec![template]);
            self.overlay.slot_scale = 1.0;
            self.overlay.alpha = 1.0;
            self.flash_anim = anims.register(AnimItem::parametric(
                self.tag(StampAnim::Flash),
                0.0,
                1.0,
                STAMP_FADE_MS,
                &FLASH_TABLE,
            ));
        }
    }

    fn cancel_all(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.living = false;
        for handle in [
            &mut self.fade_anim,
            &mut self.grid_anim,
            &mut self.life_anim,
            &mut self.cycle_anim,
            &mut self.recoil_anim,
            &mut self.flash_anim,
        ] {
            anims.clear(handle);
        }
    }
}

/// The three stamps plus this level's stamp settings
#[derive(Debug, Clone)]
pub struct Stamps {
    slots: [StampSlot; 3],
    enabled: &'static [Axis],
    style: StampStyle,
    duration: u32,
    cycle: u32,
}

impl Default for Stamps {
    fn default() -> Self {
        Self::new()
    }
}

impl Stamps {
    pub fn new() -> Self {
        Self {
            slots: Axis::ALL.map(StampSlot::new),
            enabled: &[],
            style: StampStyle::default(),
            duration: 0,
            cycle: 0,
        }
    }

    pub fn new_level(&mut self, anims: &mut Scheduler<AnimTag>, level: &LevelConfig) {
        self.enabled = level.stamp_axes();
        self.style = level.stamp_style;
        self.duration = level.stamp_duration;
        self.cycle = level.stamp_cycle;

        let persistent = self.style == StampStyle::BonusAlways;
        for slot in &mut self.slots {
            let enabled = self.enabled.contains(&slot.axis);
            if persistent && enabled {
                if !slot.is_visible() {
                    slot.show(anims, Vec::new(), None);
                }
            } else if slot.is_visible() {
                slot.power_up = None;
                slot.hide(anims, false);
            }
        }
        if persistent {
            log::info!("Persistent stamps shown on {} axes", self.enabled.len());
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn slots(&self) -> &[StampSlot] {
        &self.slots
    }

    pub fn slot(&self, axis: Axis) -> &StampSlot {
        &self.slots[axis.index()]
    }

    fn slot_mut(&mut self, axis: Axis) -> &mut StampSlot {
        &mut self.slots[axis.index()]
    }

    pub fn style(&self) -> StampStyle {
        self.style
    }

    /// Some enabled stamp is hidden
    pub fn is_available(&self) -> bool {
        self.enabled.iter().any(|&axis| !self.slot(axis).is_visible())
    }

    pub fn is_visible(&self, axis: Axis) -> bool {
        self.slot(axis).is_visible()
    }

    pub fn is_stampable(&self, axis: Axis) -> bool {
        self.slot(axis).is_stampable()
    }

    pub fn is_map_index_used(&self, map_index: i32) -> bool {
        self.slots.iter().any(|s| s.map_index() == Some(map_index))
    }

    /// Random hidden stamp among the enabled ones
    pub fn random_available<R: Rng>(&self, rng: &mut R) -> Option<Axis> {
        let open: Vec<Axis> = self
            .enabled
            .iter()
            .copied()
            .filter(|&axis| !self.slot(axis).is_visible())
            .collect();
        open.choose(rng).copied()
    }

    /// Overlay as it lines up with the back face it will meet
    pub fn overlay_template(&self, axis: Axis) -> Option<PieceTemplate> {
        let slot = self.slot(axis);
        if !slot.overlay.visible {
            return None;
        }
        let mut template = slot.overlay.template()?.clone();
        template.orient = axis;
        template.mirror_for(axis);
        Some(template)
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Show a single overlay on a random hidden stamp
    pub fn start<R: Rng>(&mut self, anims: &mut Scheduler<AnimTag>, rng: &mut R, template: PieceTemplate) -> Option<Axis> {
        let axis = self.random_available(rng)?;
        log::info!("Stamp shown on {} axis, map index {}", axis.as_str(), template.map_index);
        self.slot_mut(axis).show(anims, vec![template], None);
        Some(axis)
    }

    /// Show a cycling overlay carrying a random power-up for this level
    pub fn start_cycling<R: Rng>(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        rng: &mut R,
        level: &LevelConfig,
        templates: Vec<PieceTemplate>,
    ) -> Option<Axis> {
        if templates.len() < 2 {
            return None;
        }
        let axis = self.random_available(rng)?;
        let power_up = PowerUpKind::options(level).choose(rng).copied();
        log::info!(
            "Cycling stamp shown on {} axis, {} overlays, power-up {:?}",
            axis.as_str(),
            templates.len(),
            power_up
        );
        self.slot_mut(axis).show(anims, templates, power_up);
        Some(axis)
    }

    /// Play the stamp's collision response and hand over its power-up on a hit
    pub fn resolve(
        &mut self,
        anims: &mut Scheduler<AnimTag>,
        axis: Axis,
        was_hit: bool,
        hit_template: Option<PieceTemplate>,
    ) -> Option<PowerUpKind> {
        let style = self.style;
        let slot = self.slot_mut(axis);
        slot.collide(anims, was_hit, hit_template, style);
        if was_hit {
            slot.power_up.take()
        } else {
            slot.power_up = None;
            None
        }
    }

    /// Hide stamps completing a face that was just filled
    pub fn obsolete(&mut self, anims: &mut Scheduler<AnimTag>, map_index: i32) -> usize {
        if self.style != StampStyle::CompletesFace {
            return 0;
        }
        let mut count = 0;
        for slot in &mut self.slots {
            if slot.map_index() == Some(map_index) {
                slot.hide(anims, true);
                count += 1;
            }
        }
        count
    }

    pub fn clear_all(&mut self, anims: &mut Scheduler<AnimTag>) {
        for slot in &mut self.slots {
            slot.power_up = None;
            slot.hide(anims, true);
        }
    }

    // ------------------------------------------------------------------
    // Animation callbacks
    // ------------------------------------------------------------------

    pub fn on_frame(&mut self, axis: Axis, anim: StampAnim, value: f32) -> bool {
        let slot = self.slot_mut(axis);
        match anim {
            StampAnim::Fade => {
                slot.opacity = value;
                slot.overlay.alpha = value;
            }
            StampAnim::Grid => slot.overlay.slot_scale = value,
            StampAnim::Recoil => slot.recoil = value,
            StampAnim::Flash => slot.overlay.alpha = value,
            StampAnim::Life | StampAnim::Cycle => {}
        }
        true
    }

    pub fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis, anim: StampAnim) -> Option<StampEvent> {
        let (duration, cycle) = (self.duration, self.cycle);
        let slot = self.slot_mut(axis);
        match anim {
            StampAnim::Fade => {
                slot.fade_anim = AnimHandle::NONE;
                if slot.opacity > 0.0 {
                    if slot.overlay.visible {
                        slot.start_grid(anims, true);
                    }
                } else {
                    slot.recoil = 0.0;
                    log::debug!("Stamp on {} axis hidden", axis.as_str());
                }
            }
            StampAnim::Grid => {
                slot.grid_anim = AnimHandle::NONE;
                let intro = slot.grid_intro;
                if !slot.living {
                    if !intro {
                        slot.start_fade_out(anims);
                        return None;
                    }
                    slot.living = true;
                    if duration > 0 {
                        slot.life_anim = anims.register(AnimItem::timer(slot.tag(StampAnim::Life), duration, false));
                    }
                }
                let count = slot.overlay.templates.len();
                if count > 1 {
                    if !intro {
                        slot.overlay.current = (slot.overlay.current + 1) % count;
                        slot.start_grid(anims, true);
                    } else if cycle > 0 {
                        slot.cycle_anim = anims.register(AnimItem::timer(slot.tag(StampAnim::Cycle), cycle, false));
                    } else {
                        slot.start_grid(anims, false);
                    }
                }
            }
            StampAnim::Cycle => {
                slot.cycle_anim = AnimHandle::NONE;
                slot.start_grid(anims, false);
            }
            StampAnim::Life => {
                slot.life_anim = AnimHandle::NONE;
                if slot.is_visible() {
                    let power_up = slot.power_up.take();
                    log::info!("Stamp on {} axis expired", axis.as_str());
                    slot.hide(anims, true);
                    return Some(StampEvent::Expired { axis, power_up });
                }
            }
            StampAnim::Recoil => slot.recoil_anim = AnimHandle::NONE,
            StampAnim::Flash => {
                slot.flash_anim = AnimHandle::NONE;
                slot.overlay.visible = false;
            }
        }
        None
    }
}
