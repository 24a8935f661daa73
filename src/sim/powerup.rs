//! Active power-up
//!
//! At most one power-up runs at a time. Stamps carry the kind; a stamp hit
//! hands it over here, where its timer and free misses are tracked.

use serde::{Deserialize, Serialize};

use crate::level::LevelConfig;
use crate::sim::anim::{AnimHandle, AnimItem, Scheduler};
use crate::sim::state::AnimTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerUpKind {
    /// Misses become soft hits
    Invulnerable,
    /// Scores are multiplied
    Multiplier,
}

impl PowerUpKind {
    /// Kinds a level can award
    pub fn options(level: &LevelConfig) -> Vec<PowerUpKind> {
        let mut options = Vec::new();
        if level.power_up_inv_dur > 0 || level.power_up_inv_max > 0 {
            options.push(PowerUpKind::Invulnerable);
        }
        if level.score.is_scored() && level.power_up_mult_dur > 0 {
            options.push(PowerUpKind::Multiplier);
        }
        options
    }
}

#[derive(Debug, Clone, Default)]
pub struct PowerUp {
    kind: Option<PowerUpKind>,
    /// 1.0 when started, decays with the timer
    strength: f32,
    free_misses: u32,
    max_misses: u32,
    multiplier: i32,
    timer: AnimHandle,
}

impl PowerUp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> Option<PowerUpKind> {
        self.kind
    }

    pub fn is_invulnerable(&self) -> bool {
        self.kind == Some(PowerUpKind::Invulnerable)
    }

    pub fn strength(&self) -> f32 {
        if self.kind.is_some() { self.strength } else { 0.0 }
    }

    pub fn free_misses(&self) -> u32 {
        self.free_misses
    }

    /// Multiplier applied to power-up aware scores
    pub fn score_multiplier(&self) -> i32 {
        if self.kind == Some(PowerUpKind::Multiplier) {
            self.multiplier.max(1)
        } else {
            1
        }
    }

    /// Start `kind` with this level's duration and miss allowance. A kind the
    /// level gives neither is dropped and `false` returned.
    pub fn activate(&mut self, anims: &mut Scheduler<AnimTag>, kind: PowerUpKind, level: &LevelConfig) -> bool {
        self.clear(anims);

        let duration = match kind {
            PowerUpKind::Multiplier => {
                self.multiplier = level.power_up_mult;
                level.power_up_mult_dur
            }
            PowerUpKind::Invulnerable => {
                self.free_misses = level.power_up_inv_max;
                self.max_misses = level.power_up_inv_max;
                level.power_up_inv_dur
            }
        };

        if duration == 0 && self.free_misses == 0 {
            return false;
        }

        self.kind = Some(kind);
        self.strength = 1.0;
        if duration > 0 {
            self.timer = anims.register(AnimItem::linear(AnimTag::PowerUp, 1.0, 0.0, duration));
        }
        log::info!(
            "Power-up {:?} started ({} ms, {} free misses)",
            kind,
            duration,
            self.free_misses
        );
        true
    }

    /// Spend one free miss
    pub fn apply_miss(&mut self, anims: &mut Scheduler<AnimTag>) {
        if self.free_misses == 0 {
            return;
        }
        self.free_misses -= 1;
        if self.free_misses == 0 {
            log::debug!("Power-up used its last free miss");
            self.clear(anims);
        } else if !anims.is_active(self.timer) {
            let span = self.max_misses.saturating_sub(1).max(1) as f32;
            self.strength = self.free_misses.saturating_sub(1) as f32 / span;
        }
    }

    pub fn clear(&mut self, anims: &mut Scheduler<AnimTag>) {
        anims.clear(&mut self.timer);
        self.kind = None;
        self.strength = 0.0;
        self.free_misses = 0;
        self.max_misses = 0;
    }

    pub fn on_frame(&mut self, value: f32) -> bool {
        self.strength = value;
        true
    }

    pub fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.timer = AnimHandle::NONE;
        if self.free_misses == 0 {
            log::debug!("Power-up expired");
            self.clear(anims);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::ScoreConfig;
    use crate::sim::anim::AnimTarget;

    struct Harness(PowerUp);

    impl AnimTarget<AnimTag> for Harness {
        fn on_frame(&mut self, _anims: &mut Scheduler<AnimTag>, _id: AnimHandle, _tag: &AnimTag, value: f32) -> bool {
            self.0.on_frame(value)
        }

        fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, _id: AnimHandle, _tag: &AnimTag) {
            self.0.on_complete(anims);
        }
    }

    fn scored() -> ScoreConfig {
        ScoreConfig {
            piece_match: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_options_follow_level() {
        let level = LevelConfig {
            power_up_inv_dur: 0,
            power_up_inv_max: 0,
            score: ScoreConfig::default(),
            ..Default::default()
        };
        assert!(PowerUpKind::options(&level).is_empty());

        let level = LevelConfig {
            power_up_inv_max: 2,
            power_up_mult_dur: 1000,
            score: scored(),
            ..Default::default()
        };
        assert_eq!(
            PowerUpKind::options(&level),
            vec![PowerUpKind::Invulnerable, PowerUpKind::Multiplier]
        );
    }

    #[test]
    fn test_multiplier_expires_with_timer() {
        let level = LevelConfig {
            power_up_mult: 3,
            power_up_mult_dur: 200,
            score: scored(),
            ..Default::default()
        };
        let mut anims = Scheduler::new();
        let mut power = Harness(PowerUp::new());

        assert!(power.0.activate(&mut anims, PowerUpKind::Multiplier, &level));
        assert_eq!(power.0.score_multiplier(), 3);

        anims.advance(100.0, &mut power);
        assert!((power.0.strength() - 0.5).abs() < 1e-4);
        assert_eq!(power.0.score_multiplier(), 3);

        anims.advance(150.0, &mut power);
        assert_eq!(power.0.kind(), None);
        assert_eq!(power.0.score_multiplier(), 1);
        assert!(anims.is_empty());
    }

    #[test]
    fn test_free_misses_without_timer() {
        let level = LevelConfig {
            power_up_inv_dur: 0,
            power_up_inv_max: 3,
            ..Default::default()
        };
        let mut anims = Scheduler::new();
        let mut power = PowerUp::new();

        assert!(power.activate(&mut anims, PowerUpKind::Invulnerable, &level));
        assert!(power.is_invulnerable());
        assert!(anims.is_empty());

        power.apply_miss(&mut anims);
        assert_eq!(power.free_misses(), 2);
        assert!((power.strength() - 0.5).abs() < 1e-4);

        power.apply_miss(&mut anims);
        assert!(power.strength().abs() < 1e-4);
        assert!(power.is_invulnerable());

        power.apply_miss(&mut anims);
        assert!(!power.is_invulnerable());
    }

    #[test]
    fn test_timer_end_keeps_remaining_misses() {
        let level = LevelConfig {
            power_up_inv_dur: 100,
            power_up_inv_max: 2,
            ..Default::default()
        };
        let mut anims = Scheduler::new();
        let mut power = Harness(PowerUp::new());

        power.0.activate(&mut anims, PowerUpKind::Invulnerable, &level);
        anims.advance(150.0, &mut power);
        assert!(power.0.is_invulnerable());
        assert_eq!(power.0.free_misses(), 2);
    }

    #[test]
    fn test_unavailable_kind_is_dropped() {
        let level = LevelConfig {
            power_up_mult_dur: 0,
            ..Default::default()
        };
        let mut anims = Scheduler::new();
        let mut power = PowerUp::new();
        assert!(!power.activate(&mut anims, PowerUpKind::Multiplier, &level));
        assert_eq!(power.kind(), None);
    }
}
