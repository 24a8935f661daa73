//! Game state and flow
//!
//! [`GameState`] owns every subsystem and routes scheduler callbacks to them
//! by [`AnimTag`]. The scheduler itself lives beside it in [`Game`], so a
//! callback can mutate the state while registering new animations.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::audio::SoundEffect;
use crate::level::{LevelConfig, Script, StampStyle};
use crate::sim::anim::{AnimHandle, AnimItem, AnimTarget, Scheduler};
use crate::sim::cube::{CandidateFilter, Cube, CubeAnim, CubeEvent, RotateDir};
use crate::sim::grid::{Axis, Color};
use crate::sim::launcher::{Launcher, LauncherAnim};
use crate::sim::piece::Arrival;
use crate::sim::powerup::{PowerUp, PowerUpKind};
use crate::sim::score::{ScoreAnim, ScoreKeeper};
use crate::sim::stamp::{StampAnim, StampEvent, Stamps};

/// Routing tag carried by every scheduled animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimTag {
    Cube(CubeAnim),
    Launcher(LauncherAnim),
    Stamp(Axis, StampAnim),
    PowerUp,
    Score(ScoreAnim),
    Game(GameTimer),
}

/// Game flow timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameTimer {
    /// Repeating launch attempt
    Launch,
    /// Repeating stamp attempt
    Stamp,
    /// Pause after the launcher drains before launching again
    Reset,
}

/// Current phase of the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Cube spinning into view
    Intro,
    /// Active gameplay
    Playing,
    /// Cube filled, spinning out before the next level
    LevelExit,
    Winning,
    Losing,
    Won,
    Lost,
}

impl GamePhase {
    pub fn is_over(&self) -> bool {
        matches!(self, GamePhase::Winning | GamePhase::Losing | GamePhase::Won | GamePhase::Lost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeSource {
    Piece,
    Stamp,
}

/// Result of a piece or stamp meeting the cube
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub source: OutcomeSource,
    pub was_hit: bool,
    pub side_complete: bool,
    pub map_index: i32,
    pub orient: Axis,
    pub color: Color,
    pub sound: SoundEffect,
}

/// Notifications for whoever drives the game
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    LevelStarted(usize),
    LevelComplete(usize),
    Outcome(Outcome),
    StampExpired(Axis),
    PowerUpStarted(PowerUpKind),
    GameOver { won: bool },
}

/// Complete game state apart from the scheduler
#[derive(Debug, Clone)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub phase: GamePhase,
    pub cube: Cube,
    pub launcher: Launcher,
    pub stamps: Stamps,
    pub power_up: PowerUp,
    pub score: ScoreKeeper,
    rng: Pcg32,
    script: Script,
    level_index: usize,
    level: LevelConfig,
    launch_timer: AnimHandle,
    stamp_timer: AnimHandle,
    reset_timer: AnimHandle,
    sounds: Vec<SoundEffect>,
    events: Vec<GameEvent>,
}

impl GameState {
    /// Create a game for a validated script
    pub fn new(script: Script, seed: u64) -> Self {
        let level = script.level(0).cloned().unwrap_or_default();
        Self {
            seed,
            phase: GamePhase::Intro,
            cube: Cube::new(),
            launcher: Launcher::new(),
            stamps: Stamps::new(),
            power_up: PowerUp::new(),
            score: ScoreKeeper::new(),
            rng: Pcg32::seed_from_u64(seed),
            script,
            level_index: 0,
            level,
            launch_timer: AnimHandle::NONE,
            stamp_timer: AnimHandle::NONE,
            reset_timer: AnimHandle::NONE,
            sounds: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn level(&self) -> &LevelConfig {
        &self.level
    }

    pub fn level_index(&self) -> usize {
        self.level_index
    }

    /// Sounds queued since the last call
    pub fn take_sounds(&mut self) -> Vec<SoundEffect> {
        std::mem::take(&mut self.sounds)
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn play(&mut self, effect: SoundEffect) {
        self.sounds.push(effect);
    }

    /// Percent roll; a zero probability never consumes randomness
    fn roll(&mut self, percent: u32) -> bool {
        percent > 0 && self.rng.random_range(0..100) < percent
    }

    // ------------------------------------------------------------------
    // Flow
    // ------------------------------------------------------------------

    /// Begin the game at the first level
    pub fn start(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.score.new_game(anims, &self.script);
        self.launcher.start(anims);
        self.level_index = 0;
        self.start_level(anims);
    }

    fn start_level(&mut self, anims: &mut Scheduler<AnimTag>) {
        let Some(level) = self.script.level(self.level_index).cloned() else {
            debug_assert!(false, "level {} out of range", self.level_index);
            log::warn!("Level {} does not exist", self.level_index);
            return;
        };
        self.level = level;

        self.launcher.new_level(&mut self.rng, &self.level);
        self.stamps.new_level(anims, &self.level);
        self.score.new_level(&self.level);
        self.power_up.clear(anims);
        self.cube.init_grids(anims, &mut self.rng, &self.level);
        self.cube.start_intro(anims);

        self.phase = GamePhase::Intro;
        self.play(SoundEffect::Start);
        self.events.push(GameEvent::LevelStarted(self.level_index));
        log::info!("Level {} started", self.level_index + 1);
    }

    fn on_cube_event(&mut self, anims: &mut Scheduler<AnimTag>, event: CubeEvent) {
        match event {
            CubeEvent::IntroComplete => {
                if self.phase != GamePhase::Intro || self.cube.is_filled() {
                    return;
                }
                self.phase = GamePhase::Playing;
                self.score.resume();
                self.start_launcher(anims);
                if self.level.stamp_timer_enabled() {
                    anims.clear(&mut self.stamp_timer);
                    self.stamp_timer = anims.register(AnimItem::timer(
                        AnimTag::Game(GameTimer::Stamp),
                        self.level.stamp_period,
                        true,
                    ));
                }
            }
            CubeEvent::ExitComplete => {
                if self.phase == GamePhase::LevelExit {
                    self.level_index += 1;
                    self.start_level(anims);
                }
            }
            CubeEvent::StampComplete(axis) => self.on_stamp_complete(anims, axis),
            CubeEvent::GameOver { won } => {
                self.phase = if won { GamePhase::Won } else { GamePhase::Lost };
                self.events.push(GameEvent::GameOver { won });
                log::info!("Game over: {}", if won { "won" } else { "lost" });
            }
        }
    }

    fn start_launcher(&mut self, anims: &mut Scheduler<AnimTag>) {
        anims.clear(&mut self.launch_timer);
        self.do_launch(anims);
        self.launch_timer = anims.register(AnimItem::timer(
            AnimTag::Game(GameTimer::Launch),
            self.level.launch_period().max(1),
            true,
        ));
    }

    /// Try each piece kind in priority order; a simple piece is the fallback
    fn do_launch(&mut self, anims: &mut Scheduler<AnimTag>) {
        if !self.launcher.can_launch(&self.level) {
            return;
        }
        let cycling_filter = CandidateFilter {
            include_reserved: false,
            allow_empty: true,
            allow_filled: false,
            allow_partial: true,
        };

        let mut launched = false;
        if self.roll(self.level.evil_probability) {
            let list = self.cube.candidates_list(cycling_filter);
            launched = self.launcher.launch_cycling(anims, &mut self.rng, &self.level, list);
        }
        if !launched && self.roll(self.level.wild_probability) {
            let list = self.cube.candidates_list(cycling_filter);
            launched = self.launcher.launch_blending(anims, &mut self.rng, &self.level, list);
        }
        if !launched && self.roll(self.level.burst_probability) {
            let list = self.cube.burst_candidates(&self.level, true);
            launched = self.launcher.launch_burst(anims, &mut self.rng, &self.level, &list);
        }
        if !launched && self.roll(self.level.evil_burst_probability) {
            let list = self.cube.evil_burst_candidates();
            launched = self.launcher.launch_evil_burst(anims, &mut self.rng, &self.level, &list);
        }
        if launched {
            return;
        }

        let Some(template) = self.cube.falling_candidate(&mut self.rng, &self.level, true, true) else {
            log::debug!("No face available for a falling piece");
            return;
        };
        let owner = template.unique_id;
        if !self.launcher.launch_simple(anims, &mut self.rng, &self.level, template) {
            self.cube.release_reservations(&[owner]);
        }
    }

    fn do_stamp(&mut self, anims: &mut Scheduler<AnimTag>) {
        if !self.stamps.is_available() || !self.roll(self.level.stamp_probability) {
            return;
        }
        let style = self.level.stamp_style;

        if !style.is_power_up() {
            let filter = CandidateFilter {
                include_reserved: false,
                allow_empty: false,
                allow_filled: style == StampStyle::BonusRandom,
                allow_partial: style == StampStyle::CompletesFace,
            };
            let Some(mut template) = self.cube.grid_candidate(&mut self.rng, filter) else {
                return;
            };
            if self.stamps.is_map_index_used(template.map_index) {
                return;
            }
            if style == StampStyle::CompletesFace {
                template.invert();
            }
            self.stamps.start(anims, &mut self.rng, template);
            return;
        }

        let filter = CandidateFilter {
            include_reserved: true,
            allow_empty: style == StampStyle::PowerUpFilledColor,
            allow_filled: matches!(style, StampStyle::PowerUpColor | StampStyle::PowerUpFilledColor),
            allow_partial: matches!(style, StampStyle::PowerUpFace | StampStyle::PowerUpFilledColor),
        };
        let mut templates = self.cube.candidates_list(filter);
        for template in &mut templates {
            match style {
                StampStyle::PowerUpFace => template.invert(),
                StampStyle::PowerUpFilledColor => template.set_all(true),
                _ => {}
            }
        }
        self.stamps.start_cycling(anims, &mut self.rng, &self.level, templates);
    }

    // ------------------------------------------------------------------
    // Player actions
    // ------------------------------------------------------------------

    pub fn rotate(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis, dir: RotateDir) -> bool {
        if self.phase != GamePhase::Playing || !self.cube.start_rotate(anims, axis, dir) {
            return false;
        }
        self.play(SoundEffect::Rotate);
        true
    }

    /// Speed up a falling piece, on `axis` or the first one eligible
    pub fn accelerate(&mut self, anims: &mut Scheduler<AnimTag>, axis: Option<Axis>) -> bool {
        if self.phase != GamePhase::Playing || !self.launcher.accelerate(anims, axis) {
            return false;
        }
        self.play(SoundEffect::Tap);
        true
    }

    /// Push the cube into the stamp on `axis`
    pub fn stamp(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis) -> bool {
        if self.phase != GamePhase::Playing
            || !self.cube.can_stamp(anims)
            || !self.stamps.is_stampable(axis)
            || !self.cube.start_stamp(anims, axis)
        {
            return false;
        }
        self.play(SoundEffect::Stamp);
        true
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    fn on_stamp_complete(&mut self, anims: &mut Scheduler<AnimTag>, axis: Axis) {
        let style = self.level.stamp_style;
        let template = self.stamps.overlay_template(axis);
        let result = self
            .cube
            .stamp(anims, axis, template.as_ref(), self.power_up.is_invulnerable(), style);
        let mut sound = result.sound;
        let power = self.power_up.score_multiplier();

        match &template {
            Some(template) if result.was_hit => {
                if let Some(over) = self.handle_hit(anims, result.need_obsolete_check, template.map_index) {
                    sound = over;
                }
                if result.side_complete || style == StampStyle::BonusRandom {
                    self.score.stamp_match(anims, axis, power);
                }
            }
            Some(_) => {
                self.score.stamp_miss(anims, axis);
                if let Some(over) = self.handle_miss(anims) {
                    sound = over;
                }
            }
            None if result.was_hit => self.score.stamp_match(anims, axis, power),
            None => {}
        }

        self.power_up.clear(anims);
        if let Some(kind) = self
            .stamps
            .resolve(anims, axis, result.was_real_hit, result.hit_template.clone())
        {
            if self.power_up.activate(anims, kind, &self.level) {
                self.events.push(GameEvent::PowerUpStarted(kind));
            }
        }

        self.play(sound);
        self.events.push(GameEvent::Outcome(Outcome {
            source: OutcomeSource::Stamp,
            was_hit: result.was_hit,
            side_complete: result.side_complete,
            map_index: result.map_index,
            orient: axis,
            color: self.cube.back(axis).fill_color,
            sound,
        }));
    }

    fn process_arrivals(&mut self, anims: &mut Scheduler<AnimTag>) {
        for arrival in self.launcher.drain_arrivals() {
            if self.phase != GamePhase::Playing {
                break;
            }
            self.on_piece_arrived(anims, arrival);
        }
    }

    fn on_piece_arrived(&mut self, anims: &mut Scheduler<AnimTag>, arrival: Arrival) {
        let Some(result) = self
            .cube
            .collide(anims, &arrival.templates, self.power_up.is_invulnerable())
        else {
            return;
        };
        let mut sound = result.sound;

        if result.was_hit {
            if let Some(over) = self.handle_hit(anims, result.need_obsolete_check, result.map_index_hit) {
                sound = over;
            }
            self.score.tap_complete(arrival.tap_bonus, arrival.score_multiplier);
            if result.side_complete {
                let power = self.power_up.score_multiplier();
                self.score
                    .side_complete(anims, result.orient_hit, arrival.score_multiplier, power);
            } else if result.piece_filled {
                self.score.piece_match(anims, arrival.score_multiplier);
            }
            if result.is_soft_hit() {
                self.power_up.apply_miss(anims);
            }
        } else {
            self.score.piece_miss(anims, result.orient_hit);
            if let Some(over) = self.handle_miss(anims) {
                sound = over;
            }
            if let Some(rejected) = result.rejected.clone() {
                self.launcher.add_rejection(anims, rejected);
            }
        }

        self.play(sound);
        self.events.push(GameEvent::Outcome(Outcome {
            source: OutcomeSource::Piece,
            was_hit: result.was_hit,
            side_complete: result.side_complete,
            map_index: result.map_index,
            orient: result.orient_hit,
            color: result.color_hit,
            sound,
        }));
        self.check_launcher_reset(anims);
    }

    /// A hit may finish the level or the game, or obsolete pieces and stamps
    fn handle_hit(&mut self, anims: &mut Scheduler<AnimTag>, need_obsolete: bool, map_index: i32) -> Option<SoundEffect> {
        if self.cube.is_filled() {
            self.score.pause();
            self.clear_game_elements(anims);
            if self.script.is_last_level(self.level_index) {
                self.cube.start_win(anims);
                self.phase = GamePhase::Winning;
                log::info!("Final cube filled");
                return Some(SoundEffect::Win);
            }
            self.cube.start_exit(anims);
            self.phase = GamePhase::LevelExit;
            self.events.push(GameEvent::LevelComplete(self.level_index));
            log::info!("Level {} complete", self.level_index + 1);
        } else if need_obsolete {
            let pieces = self.launcher.obsolete(anims, map_index);
            let stamps = self.stamps.obsolete(anims, map_index);
            self.cube.release_reservations(&self.launcher.drain_released());
            log::debug!("Map index {} filled: {} pieces, {} stamps obsolete", map_index, pieces, stamps);
        }
        None
    }

    fn handle_miss(&mut self, anims: &mut Scheduler<AnimTag>) -> Option<SoundEffect> {
        if self.score.misses_exhausted() {
            self.lose(anims);
            return Some(SoundEffect::Death);
        }
        None
    }

    fn lose(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.score.pause();
        self.clear_game_elements(anims);
        self.cube.start_lose(anims);
        self.phase = GamePhase::Losing;
    }

    /// Lose when the active time limit runs out
    pub fn check_time(&mut self, anims: &mut Scheduler<AnimTag>) {
        if self.phase == GamePhase::Playing && self.score.time_exhausted() {
            log::info!("Time limit reached, game is over");
            self.lose(anims);
            self.play(SoundEffect::Death);
        }
    }

    fn clear_game_elements(&mut self, anims: &mut Scheduler<AnimTag>) {
        self.launcher.clear_all(anims);
        self.stamps.clear_all(anims);
        self.cube.release_reservations(&self.launcher.drain_released());
        anims.clear(&mut self.launch_timer);
        anims.clear(&mut self.stamp_timer);
        anims.clear(&mut self.reset_timer);
    }

    /// Rest for the level's reset time once every piece has landed
    fn check_launcher_reset(&mut self, anims: &mut Scheduler<AnimTag>) {
        if self.phase == GamePhase::Playing
            && self.launcher.is_empty()
            && anims.is_active(self.launch_timer)
            && self.level.reset_time > 0
        {
            anims.clear(&mut self.launch_timer);
            self.reset_timer = anims.register(AnimItem::timer(
                AnimTag::Game(GameTimer::Reset),
                self.level.reset_time,
                false,
            ));
            log::debug!("Launcher drained, resting {} ms", self.level.reset_time);
        }
    }
}

impl AnimTarget<AnimTag> for GameState {
    fn on_frame(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag, value: f32) -> bool {
        match *tag {
            AnimTag::Cube(anim) => self.cube.on_frame(id, anim, value),
            AnimTag::Launcher(anim) => {
                let keep = self.launcher.on_frame(anims, id, anim, value);
                self.process_arrivals(anims);
                keep
            }
            AnimTag::Stamp(axis, anim) => self.stamps.on_frame(axis, anim, value),
            AnimTag::PowerUp => self.power_up.on_frame(value),
            AnimTag::Score(anim) => self.score.on_frame(anim, value),
            AnimTag::Game(timer) => {
                if self.phase != GamePhase::Playing {
                    return false;
                }
                match timer {
                    GameTimer::Launch => self.do_launch(anims),
                    GameTimer::Stamp => self.do_stamp(anims),
                    GameTimer::Reset => {}
                }
                true
            }
        }
    }

    fn on_complete(&mut self, anims: &mut Scheduler<AnimTag>, id: AnimHandle, tag: &AnimTag) {
        match *tag {
            AnimTag::Cube(anim) => {
                if let Some(event) = self.cube.on_complete(anims, id, anim) {
                    self.on_cube_event(anims, event);
                }
            }
            AnimTag::Launcher(anim) => {
                self.launcher.on_complete(anims, id, anim);
                self.process_arrivals(anims);
            }
            AnimTag::Stamp(axis, anim) => {
                if let Some(StampEvent::Expired { axis, power_up }) = self.stamps.on_complete(anims, axis, anim) {
                    if power_up.is_none() {
                        self.score.stamp_expired();
                    }
                    self.events.push(GameEvent::StampExpired(axis));
                }
            }
            AnimTag::PowerUp => self.power_up.on_complete(anims),
            AnimTag::Score(anim) => self.score.on_complete(anim),
            AnimTag::Game(GameTimer::Reset) => {
                self.reset_timer = AnimHandle::NONE;
                if self.phase == GamePhase::Playing {
                    self.start_launcher(anims);
                }
            }
            AnimTag::Game(_) => {}
        }
    }
}

/// A game plus the scheduler driving it
#[derive(Debug, Clone)]
pub struct Game {
    pub state: GameState,
    pub anims: Scheduler<AnimTag>,
    /// Frozen by the player; `advance` is not called while set
    pub paused: bool,
}

impl Game {
    pub fn new(script: Script, seed: u64) -> Self {
        Self {
            state: GameState::new(script, seed),
            anims: Scheduler::new(),
            paused: false,
        }
    }

    pub fn start(&mut self) {
        self.state.start(&mut self.anims);
    }

    /// Advance the game clock and every animation by `elapsed_ms`
    pub fn advance(&mut self, elapsed_ms: f32) {
        self.state.score.advance_clock(elapsed_ms);
        self.anims.advance(elapsed_ms, &mut self.state);
        self.state.check_time(&mut self.anims);
    }

    pub fn rotate(&mut self, axis: Axis, dir: RotateDir) -> bool {
        self.state.rotate(&mut self.anims, axis, dir)
    }

    pub fn accelerate(&mut self, axis: Option<Axis>) -> bool {
        self.state.accelerate(&mut self.anims, axis)
    }

    pub fn stamp(&mut self, axis: Axis) -> bool {
        self.state.stamp(&mut self.anims, axis)
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }
}
