//! Score keeping
//!
//! Consumes collision and stamp outcomes. Owns the game clock used for
//! time limits and stamp chains; the clock is paused between levels.

use serde::{Deserialize, Serialize};

use crate::level::{LevelConfig, Script, ScoreConfig};
use crate::sim::anim::{AnimHandle, AnimItem, Scheduler};
use crate::sim::grid::Axis;
use crate::sim::state::AnimTag;

const DISPLAY_TABLE: [f32; 10] = [0.0, 0.17, 0.34, 0.5, 0.64, 0.77, 0.87, 0.94, 0.98, 1.0];
const DISPLAY_ANIM_MS: u32 = 1000;
const POPUP_GOOD_MS: u32 = 1000;
const POPUP_BAD_MS: u32 = 2000;
const POPUP_BAD_TABLE: [f32; 10] = [0.0, 0.01, 0.02, 0.04, 0.06, 0.1, 0.2, 0.35, 0.6, 1.0];

/// Animations owned by the score keeper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreAnim {
    /// Shown score catching up with the real score
    Display,
    Popup(u32),
}

/// Floating score change near the face or stamp that caused it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Popup {
    pub id: u32,
    pub good: bool,
    pub is_stamp: bool,
    pub axis: Axis,
    pub points: i32,
    /// Size scalar, grows with stamp chains
    pub scalar: f32,
    /// 0..1 over the popup's life
    pub progress: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ScoreKeeper {
    config: ScoreConfig,
    scored: bool,
    score: i32,
    shown: f32,
    shown_anim: AnimHandle,
    popups: Vec<Popup>,
    next_popup: u32,

    clock_ms: f64,
    paused: bool,
    game_start_ms: Option<f64>,
    level_start_ms: f64,
    game_time_limit_ms: f64,
    level_time_limit_ms: f64,
    game_miss_limit: u32,
    level_miss_limit: u32,

    game_misses: u32,
    level_misses: u32,
    stamp_hits: u32,
    stamp_misses: u32,
    last_stamp_match_ms: Option<f64>,
    stamp_chain: u32,
}

impl ScoreKeeper {
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Default::default()
        }
    }

    /// Reset everything for a new game of `script`
    pub fn new_game(&mut self, anims: &mut Scheduler<AnimTag>, script: &Script) {
        self.clear_anims(anims);
        *self = Self::new();
        self.game_time_limit_ms = f64::from(script.time_limit) * 1000.0;
        self.game_miss_limit = script.miss_count;
        log::info!(
            "Scoring for script '{}' starts, miss limit {}, time limit {} s",
            script.name,
            script.miss_count,
            script.time_limit
        );
    }

    /// Reset level counters and pause the clock until play starts
    pub fn new_level(&mut self, level: &LevelConfig) {
        self.config = level.score.clone();
        self.scored = self.config.is_scored();
        self.level_misses = 0;
        self.stamp_misses = 0;
        self.level_start_ms = self.clock_ms;
        if self.game_start_ms.is_none() {
            self.game_start_ms = Some(self.clock_ms);
        }
        self.level_time_limit_ms = f64::from(level.time_limit) * 1000.0;
        self.level_miss_limit = level.miss_count;
        self.paused = true;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Advance the game clock
    pub fn advance_clock(&mut self, elapsed_ms: f32) {
        if !self.paused {
            self.clock_ms += f64::from(elapsed_ms);
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_scored(&self) -> bool {
        self.scored
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    /// Score as currently displayed
    pub fn shown_score(&self) -> i32 {
        self.shown as i32
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn game_misses(&self) -> u32 {
        self.game_misses
    }

    pub fn level_misses(&self) -> u32 {
        self.level_misses
    }

    pub fn stamp_hits(&self) -> u32 {
        self.stamp_hits
    }

    pub fn stamp_misses(&self) -> u32 {
        self.stamp_misses
    }

    /// Misses counted against the active limit, and that limit (0 = none)
    pub fn miss_status(&self) -> (u32, u32) {
        if self.game_miss_limit > 0 {
            (self.game_misses, self.game_miss_limit)
        } else {
            (self.level_misses, self.level_miss_limit)
        }
    }

    pub fn misses_exhausted(&self) -> bool {
        let (misses, limit) = self.miss_status();
        let over = limit > 0 && misses >= limit;
        if over {
            log::info!("Miss count reached the limit ({}), game is over", limit);
        }
        over
    }

    pub fn time_exhausted(&self) -> bool {
        match self.time_limit() {
            Some((start, limit)) => self.clock_ms - start > limit,
            None => false,
        }
    }

    /// Milliseconds left under the active time limit
    pub fn remaining_ms(&self) -> Option<u32> {
        self.time_limit()
            .map(|(start, limit)| (limit - (self.clock_ms - start)).max(0.0) as u32)
    }

    fn time_limit(&self) -> Option<(f64, f64)> {
        if self.game_time_limit_ms > 0.0 {
            Some((self.game_start_ms.unwrap_or(0.0), self.game_time_limit_ms))
        } else if self.level_time_limit_ms > 0.0 {
            Some((self.level_start_ms, self.level_time_limit_ms))
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Outcomes
    // ------------------------------------------------------------------

    /// A falling piece matched
    pub fn piece_match(&mut self, anims: &mut Scheduler<AnimTag>, multiplier: f32) {
        if self.scored {
            let points = (self.config.piece_match as f32 * multiplier) as i32;
            self.add(anims, points);
        }
    }

    /// A face was completed
    pub fn side_complete(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis, multiplier: f32, power: i32) {
        if self.scored {
            let points = (self.config.side_complete as f32 * multiplier) as i32 * power;
            self.add(anims, points);
            self.popup(anims, true, false, axis, points, 1.0);
        }
    }

    /// A stamp matched; successive matches inside the chain time multiply
    pub fn stamp_match(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis, power: i32) {
        self.stamp_hits += 1;
        if !self.scored {
            return;
        }

        if self.config.stamp_chain_time > 0 {
            let chain = f64::from(self.config.stamp_chain_time);
            match self.last_stamp_match_ms {
                Some(last) if self.clock_ms < last + chain => self.stamp_chain += 1,
                _ => self.stamp_chain = 1,
            }
            self.last_stamp_match_ms = Some(self.clock_ms);
        } else {
            self.stamp_chain = 1;
        }

        let steps = self.stamp_chain.saturating_sub(1) as i32;
        let chained = self.config.stamp_match as f32 * self.config.stamp_chain_multiplier.powi(steps);
        let points = chained as i32 * power;
        self.add(anims, points);
        self.popup(anims, true, true, axis, points, 1.1f32.powi(steps));
    }

    /// Tap bonus for a matching piece; always followed by a match score
    pub fn tap_complete(&mut self, scale: f32, multiplier: f32) {
        if self.scored {
            self.score += (self.config.tap_max as f32 * scale * multiplier) as i32;
        }
    }

    pub fn piece_miss(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis) {
        if self.scored {
            let penalty = self.config.piece_miss;
            self.add(anims, -penalty);
            self.popup(anims, false, false, axis, penalty, 1.0);
        }
        self.game_misses += 1;
        self.level_misses += 1;
    }

    pub fn stamp_miss(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis) {
        if self.scored {
            let penalty = self.config.stamp_miss;
            self.add(anims, -penalty);
            self.popup(anims, false, true, axis, penalty, 1.0);
        }
        self.game_misses += 1;
        self.level_misses += 1;
        self.stamp_misses += 1;
    }

    pub fn stamp_expired(&mut self) {
        self.stamp_misses += 1;
    }

    fn add(&mut self, anims: &mut Scheduler<AnimTag>, points: i32) {
        if points == 0 {
            return;
        }
        self.score = (self.score + points).max(0);
        anims.clear(&mut self.shown_anim);
        self.shown_anim = anims.register(AnimItem::parametric(
            AnimTag::Score(ScoreAnim::Display),
            self.shown,
            self.score as f32,
            DISPLAY_ANIM_MS,
            &DISPLAY_TABLE,
        ));
        log::info!("Score is now {}", self.score);
    }

    fn popup(&mut self, anims: &mut Scheduler<AnimTag>, good: bool, is_stamp: bool, axis: Axis, points: i32, scalar: f32) {
        self.next_popup += 1;
        let id = self.next_popup;
        let tag = AnimTag::Score(ScoreAnim::Popup(id));
        anims.register(if good {
            AnimItem::linear(tag, 0.0, 1.0, POPUP_GOOD_MS)
        } else {
            AnimItem::parametric(tag, 0.0, 1.0, POPUP_BAD_MS, &POPUP_BAD_TABLE)
        });
        self.popups.push(Popup {
            id,
            good,
            is_stamp,
            axis,
            points,
            scalar,
            progress: 0.0,
        });
    }

    fn clear_anims(&mut self, anims: &mut Scheduler<AnimTag>) {
        anims.clear(&mut self.shown_anim);
        self.popups.clear();
    }

    pub fn on_frame(&mut self, anim: ScoreAnim, value: f32) -> bool {
        match anim {
            ScoreAnim::Display => {
                self.shown = value;
                true
            }
            ScoreAnim::Popup(id) => match self.popups.iter_mut().find(|p| p.id == id) {
                Some(popup) => {
                    popup.progress = value;
                    true
                }
                None => false,
            },
        }
    }

    pub fn on_complete(&mut self, anim: ScoreAnim) {
        match anim {
            ScoreAnim::Display => {
                self.shown_anim = AnimHandle::NONE;
                self.shown = self.score as f32;
            }
            ScoreAnim::Popup(id) => self.popups.retain(|p| p.id != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::anim::AnimTarget;

    struct Harness(ScoreKeeper);

    impl AnimTarget<AnimTag> for Harness {
        fn on_frame(&mut self, _anims: &mut Scheduler<AnimTag>, _id: AnimHandle, tag: &AnimTag, value: f32) -> bool {
            match tag {
                AnimTag::Score(anim) => self.0.on_frame(*anim, value),
                _ => true,
            }
        }

        fn on_complete(&mut self, _anims: &mut Scheduler<AnimTag>, _id: AnimHandle, tag: &AnimTag) {
            if let AnimTag::Score(anim) = tag {
                self.0.on_complete(*anim);
            }
        }
    }

    fn scored_level() -> LevelConfig {
        LevelConfig {
            score: ScoreConfig {
                piece_match: 100,
                side_complete: 500,
                stamp_match: 1000,
                tap_max: 100,
                piece_miss: 300,
                stamp_miss: 200,
                evil_multiplier: 3.0,
                stamp_chain_multiplier: 2.0,
                stamp_chain_time: 2000,
            },
            ..Default::default()
        }
    }

    fn keeper(level: &LevelConfig) -> (Harness, Scheduler<AnimTag>) {
        let mut keeper = ScoreKeeper::new();
        keeper.new_level(level);
        keeper.resume();
        (Harness(keeper), Scheduler::new())
    }

    #[test]
    fn test_unscored_level_counts_misses_only() {
        let (mut h, mut anims) = keeper(&LevelConfig::default());
        h.0.piece_match(&mut anims, 1.0);
        h.0.piece_miss(&mut anims, Axis::Z);
        assert_eq!(h.0.score(), 0);
        assert_eq!(h.0.level_misses(), 1);
        assert!(anims.is_empty());
    }

    #[test]
    fn test_score_never_negative() {
        let (mut h, mut anims) = keeper(&scored_level());
        h.0.piece_match(&mut anims, 1.0);
        h.0.piece_miss(&mut anims, Axis::X);
        assert_eq!(h.0.score(), 0);
        assert_eq!(h.0.game_misses(), 1);
    }

    #[test]
    fn test_shown_score_catches_up() {
        let (mut h, mut anims) = keeper(&scored_level());
        h.0.side_complete(&mut anims, Axis::Y, 1.0, 2);
        assert_eq!(h.0.score(), 1000);
        assert_eq!(h.0.shown_score(), 0);
        assert_eq!(h.0.popups().len(), 1);

        for _ in 0..110 {
            anims.advance(10.0, &mut h);
        }
        assert_eq!(h.0.shown_score(), 1000);
        assert!(h.0.popups().is_empty());
    }

    #[test]
    fn test_stamp_chain_multiplies_within_chain_time() {
        let (mut h, mut anims) = keeper(&scored_level());
        h.0.stamp_match(&mut anims, Axis::X, 1);
        assert_eq!(h.0.score(), 1000);

        h.0.advance_clock(500.0);
        h.0.stamp_match(&mut anims, Axis::Y, 1);
        assert_eq!(h.0.score(), 3000);

        h.0.advance_clock(2500.0);
        h.0.stamp_match(&mut anims, Axis::Z, 1);
        assert_eq!(h.0.score(), 4000);
        assert_eq!(h.0.stamp_hits(), 3);
    }

    #[test]
    fn test_tap_bonus_scales() {
        let (mut h, _anims) = keeper(&scored_level());
        h.0.tap_complete(0.5, 3.0);
        assert_eq!(h.0.score(), 150);
    }

    #[test]
    fn test_level_miss_limit() {
        let level = LevelConfig {
            miss_count: 2,
            ..Default::default()
        };
        let (mut h, mut anims) = keeper(&level);
        h.0.piece_miss(&mut anims, Axis::Z);
        assert!(!h.0.misses_exhausted());
        h.0.stamp_miss(&mut anims, Axis::Y);
        assert!(h.0.misses_exhausted());
        assert_eq!(h.0.stamp_misses(), 1);

        h.0.new_level(&level);
        assert!(!h.0.misses_exhausted());
        assert_eq!(h.0.game_misses(), 2);
    }

    #[test]
    fn test_script_miss_limit_spans_levels() {
        let script = Script {
            miss_count: 2,
            ..Script::demo()
        };
        let mut anims = Scheduler::new();
        let mut keeper = ScoreKeeper::new();
        keeper.new_game(&mut anims, &script);
        keeper.new_level(&LevelConfig::default());
        keeper.piece_miss(&mut anims, Axis::X);
        keeper.new_level(&LevelConfig::default());
        keeper.piece_miss(&mut anims, Axis::X);
        assert!(keeper.misses_exhausted());
    }

    #[test]
    fn test_time_limit_uses_paused_clock() {
        let level = LevelConfig {
            time_limit: 1,
            ..Default::default()
        };
        let mut keeper = ScoreKeeper::new();
        keeper.new_level(&level);
        keeper.advance_clock(5000.0);
        assert_eq!(keeper.remaining_ms(), Some(1000));

        keeper.resume();
        keeper.advance_clock(600.0);
        assert_eq!(keeper.remaining_ms(), Some(400));
        assert!(!keeper.time_exhausted());
        keeper.advance_clock(500.0);
        assert!(keeper.time_exhausted());
        assert_eq!(keeper.remaining_ms(), Some(0));
    }

    #[test]
    fn test_no_time_limit() {
        let keeper = ScoreKeeper::new();
        assert_eq!(keeper.remaining_ms(), None);
        assert!(!keeper.time_exhausted());
    }
}
