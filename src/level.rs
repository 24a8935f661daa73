//! Level and script configuration
//!
//! Read-only to the simulation. Everything is validated once when a script is
//! loaded; the core assumes the ranges checked here.
//!
//! Durations are in milliseconds unless noted.

use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::grid::{is_valid_dimension, Axis, Color};

/// Fall time used when a level leaves the relevant field at 0
pub const DEFAULT_FALL_TIME: u32 = 5000;
/// Cycling period used when a level leaves it at 0
pub const DEFAULT_CYCLE_PERIOD: u32 = 2000;

/// Errors raised while loading or validating a script
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("level {level}: grid dimension {value} is not 1, 2 or 3")]
    InvalidDimension { level: usize, value: usize },
    #[error("level {level}: color count {value} is not in 1..=6")]
    InvalidColorCount { level: usize, value: usize },
    #[error("level {level}: {field} = {value} is not a percentage")]
    InvalidProbability {
        level: usize,
        field: &'static str,
        value: u32,
    },
    #[error("script has no levels")]
    NoLevels,
}

/// Falling pieces locked to one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridLock {
    #[default]
    None,
    /// Pause launching until the locked face is actually filled
    Wait,
    /// Move to a new face as soon as the locked one is fully claimed
    NoWait,
}

/// How launch axes are picked for single pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LaunchAxisStyle {
    #[default]
    Random,
    Sequential,
    /// Sequential, advancing only when the target map index changes
    ByColor,
}

/// Fill style of cycling pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvilStyle {
    /// Whole grid filled, only the color matters
    #[default]
    ColorOnly,
    /// Complements the unfilled slots of each candidate face
    Complete,
    Randomized,
}

/// How many axes an in-flight cycling or blending piece blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisLock {
    #[default]
    None,
    Single,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StampStyle {
    /// Shows a complete face, bonus points only
    #[default]
    BonusRandom,
    /// Always visible, chained for bonuses
    BonusAlways,
    /// Complements an incomplete face
    CompletesFace,
    /// Cycles through filled cube colors and awards a power-up
    PowerUpColor,
    /// Cycles through all cube colors and awards a power-up
    PowerUpFilledColor,
    /// Cycles through all cube faces and awards a power-up
    PowerUpFace,
}

impl StampStyle {
    pub fn is_power_up(&self) -> bool {
        matches!(
            self,
            StampStyle::PowerUpColor | StampStyle::PowerUpFilledColor | StampStyle::PowerUpFace
        )
    }
}

/// Point values for a level
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub piece_match: i32,
    pub side_complete: i32,
    pub stamp_match: i32,
    pub tap_max: i32,
    pub piece_miss: i32,
    pub stamp_miss: i32,
    pub evil_multiplier: f32,
    pub stamp_chain_multiplier: f32,
    pub stamp_chain_time: u32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            piece_match: 0,
            side_complete: 0,
            stamp_match: 0,
            tap_max: 0,
            piece_miss: 0,
            stamp_miss: 0,
            evil_multiplier: 1.0,
            stamp_chain_multiplier: 1.0,
            stamp_chain_time: 0,
        }
    }
}

impl ScoreConfig {
    /// Scoring is on when anything awards points
    pub fn is_scored(&self) -> bool {
        self.piece_match > 0 || self.side_complete > 0 || self.stamp_match > 0 || self.tap_max > 0
    }
}

/// One level of a script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    // === Timing / grid ===
    pub rot_time: u32,
    pub fall_time: u32,
    pub glow_time: u32,
    pub idle_time: u32,
    /// Delay before relaunching once the pipeline drains (0 = never pause)
    pub reset_time: u32,
    pub num_colors: usize,
    /// Face grid dimension
    pub grid_level: usize,
    /// Launch directions (0 or >3 means all three)
    pub directions: usize,
    pub glow_count: u32,
    pub falling_pieces: u32,
    /// Maximum filled slots per piece (0 = no limit)
    pub falling_hole_limit: usize,
    pub rand_falling_pieces: bool,
    pub miss_count: u32,
    /// Seconds
    pub time_limit: u32,
    pub grid_lock: GridLock,
    pub launch_axis_style: LaunchAxisStyle,

    // === Cycling pieces ===
    pub evil_probability: u32,
    pub evil_fall_time: u32,
    pub evil_period: u32,
    pub evil_max_colors: usize,
    pub evil_style: EvilStyle,
    pub evil_axis_lock: AxisLock,

    // === Blending pieces ===
    pub wild_probability: u32,
    pub wild_fall_time: u32,
    pub wild_period: u32,
    pub wild_axis_lock: AxisLock,

    // === Bursts ===
    pub burst_probability: u32,
    pub burst_fall_time: u32,
    pub evil_burst_probability: u32,
    pub evil_burst_fall_time: u32,

    // === Stamps ===
    pub stamp_count: usize,
    pub stamp_period: u32,
    pub stamp_probability: u32,
    pub stamp_duration: u32,
    pub stamp_cycle: u32,
    pub stamp_style: StampStyle,

    // === Power-ups ===
    pub power_up_mult: i32,
    pub power_up_mult_dur: u32,
    pub power_up_inv_dur: u32,
    pub power_up_inv_max: u32,

    // === Palette (empty / fill color per map index) ===
    pub dim_colors: [Color; 6],
    pub max_colors: [Color; 6],

    pub score: ScoreConfig,
}

const DIM_PALETTE: [Color; 6] = [
    Vec4::new(0.65, 0.50, 0.00, 1.0),
    Vec4::new(0.50, 0.00, 0.50, 1.0),
    Vec4::new(0.50, 0.00, 0.00, 1.0),
    Vec4::new(0.00, 0.00, 0.50, 1.0),
    Vec4::new(0.50, 0.50, 0.50, 1.0),
    Vec4::new(0.00, 0.50, 0.25, 1.0),
];

const MAX_PALETTE: [Color; 6] = [
    Vec4::new(1.00, 0.80, 0.00, 1.0),
    Vec4::new(1.00, 0.00, 1.00, 1.0),
    Vec4::new(1.00, 0.00, 0.00, 1.0),
    Vec4::new(0.00, 0.00, 1.00, 1.0),
    Vec4::new(1.00, 1.00, 1.00, 1.0),
    Vec4::new(0.00, 1.00, 0.50, 1.0),
];

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            rot_time: 500,
            fall_time: 0,
            glow_time: 0,
            idle_time: 0,
            reset_time: 0,
            num_colors: 6,
            grid_level: 2,
            directions: 3,
            glow_count: 0,
            falling_pieces: 1,
            falling_hole_limit: 0,
            rand_falling_pieces: true,
            miss_count: 0,
            time_limit: 0,
            grid_lock: GridLock::None,
            launch_axis_style: LaunchAxisStyle::Random,

            evil_probability: 0,
            evil_fall_time: 0,
            evil_period: 0,
            evil_max_colors: 0,
            evil_style: EvilStyle::ColorOnly,
            evil_axis_lock: AxisLock::None,

            wild_probability: 0,
            wild_fall_time: 0,
            wild_period: 0,
            wild_axis_lock: AxisLock::None,

            burst_probability: 0,
            burst_fall_time: 0,
            evil_burst_probability: 0,
            evil_burst_fall_time: 0,

            stamp_count: 0,
            stamp_period: 0,
            stamp_probability: 0,
            stamp_duration: 0,
            stamp_cycle: 0,
            stamp_style: StampStyle::BonusRandom,

            power_up_mult: 3,
            power_up_mult_dur: 10000,
            power_up_inv_dur: 0,
            power_up_inv_max: 0,

            dim_colors: DIM_PALETTE,
            max_colors: MAX_PALETTE,

            score: ScoreConfig::default(),
        }
    }
}

impl LevelConfig {
    /// Check ranges the simulation relies on
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if !is_valid_dimension(self.grid_level) {
            return Err(ConfigError::InvalidDimension {
                level: index,
                value: self.grid_level,
            });
        }
        if !(1..=6).contains(&self.num_colors) {
            return Err(ConfigError::InvalidColorCount {
                level: index,
                value: self.num_colors,
            });
        }
        let probabilities = [
            ("evil_probability", self.evil_probability),
            ("wild_probability", self.wild_probability),
            ("burst_probability", self.burst_probability),
            ("evil_burst_probability", self.evil_burst_probability),
            ("stamp_probability", self.stamp_probability),
        ];
        for (field, value) in probabilities {
            if value > 100 {
                return Err(ConfigError::InvalidProbability {
                    level: index,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Number of launch directions in use
    pub fn direction_count(&self) -> usize {
        if self.directions == 0 || self.directions > 3 {
            3
        } else {
            self.directions
        }
    }

    pub fn axis_lock_active(&self) -> bool {
        self.evil_axis_lock != AxisLock::None || self.wild_axis_lock != AxisLock::None
    }

    /// Period of the repeating launch timer
    pub fn launch_period(&self) -> u32 {
        (self.idle_time + self.glow_time + self.fall_time) / self.falling_pieces.max(1)
    }

    pub fn simple_fall_time(&self, burst: bool) -> u32 {
        if burst && self.burst_fall_time > 0 {
            self.burst_fall_time
        } else if self.fall_time > 0 {
            self.fall_time
        } else {
            DEFAULT_FALL_TIME
        }
    }

    pub fn evil_fall_time(&self, burst: bool) -> u32 {
        if burst && self.evil_burst_fall_time > 0 {
            self.evil_burst_fall_time
        } else if self.evil_fall_time > 0 {
            self.evil_fall_time
        } else {
            DEFAULT_FALL_TIME
        }
    }

    pub fn wild_fall_time(&self) -> u32 {
        if self.wild_fall_time > 0 {
            self.wild_fall_time
        } else {
            DEFAULT_FALL_TIME
        }
    }

    pub fn evil_period(&self) -> u32 {
        if self.evil_period > 0 {
            self.evil_period
        } else {
            DEFAULT_CYCLE_PERIOD
        }
    }

    pub fn wild_period(&self) -> u32 {
        if self.wild_period > 0 {
            self.wild_period
        } else {
            DEFAULT_CYCLE_PERIOD
        }
    }

    /// Stamp axes enabled by `stamp_count` (1 = Y, 2 = X and Z, 3 = all)
    pub fn stamp_axes(&self) -> &'static [Axis] {
        match self.stamp_count {
            1 => &[Axis::Y],
            2 => &[Axis::X, Axis::Z],
            3 => &Axis::ALL,
            _ => &[],
        }
    }

    pub fn stamp_timer_enabled(&self) -> bool {
        self.stamp_period > 0 && self.stamp_probability > 0
    }
}

/// An ordered set of levels plus script-wide limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub name: String,
    /// Misses allowed across the whole game (0 = per-level limit applies)
    pub miss_count: u32,
    /// Seconds for the whole game (0 = none)
    pub time_limit: u32,
    pub levels: Vec<LevelConfig>,
}

impl Default for Script {
    fn default() -> Self {
        Self::demo()
    }
}

impl Script {
    /// Parse and validate a script from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let script: Script = serde_json::from_str(text)?;
        script.validate()?;
        Ok(script)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.is_empty() {
            return Err(ConfigError::NoLevels);
        }
        for (i, level) in self.levels.iter().enumerate() {
            level.validate(i)?;
        }
        Ok(())
    }

    pub fn level(&self, index: usize) -> Option<&LevelConfig> {
        self.levels.get(index)
    }

    pub fn is_last_level(&self, index: usize) -> bool {
        index + 1 >= self.levels.len()
    }

    /// Built-in two level script used by the demo runner
    pub fn demo() -> Self {
        let score = ScoreConfig {
            piece_match: 100,
            side_complete: 500,
            stamp_match: 1000,
            tap_max: 100,
            piece_miss: 1000,
            stamp_miss: 1000,
            evil_multiplier: 3.0,
            stamp_chain_multiplier: 2.0,
            stamp_chain_time: 2000,
        };
        let warmup = LevelConfig {
            fall_time: 4000,
            glow_time: 4000,
            num_colors: 2,
            grid_level: 1,
            glow_count: 1,
            falling_pieces: 2,
            miss_count: 3,
            stamp_count: 2,
            stamp_period: 4000,
            stamp_probability: 100,
            stamp_duration: 5000,
            stamp_cycle: 1000,
            score: score.clone(),
            ..Default::default()
        };
        let mixed = LevelConfig {
            fall_time: 5000,
            glow_time: 2000,
            idle_time: 500,
            num_colors: 4,
            grid_level: 2,
            glow_count: 2,
            falling_pieces: 3,
            miss_count: 5,
            evil_probability: 15,
            evil_fall_time: 8000,
            evil_style: EvilStyle::Randomized,
            evil_axis_lock: AxisLock::Single,
            wild_probability: 10,
            wild_fall_time: 7000,
            wild_period: 250,
            burst_probability: 10,
            burst_fall_time: 6000,
            stamp_count: 3,
            stamp_period: 4000,
            stamp_probability: 50,
            stamp_duration: 5000,
            stamp_cycle: 1000,
            stamp_style: StampStyle::PowerUpColor,
            power_up_inv_dur: 8000,
            power_up_inv_max: 2,
            score,
            ..Default::default()
        };
        Self {
            name: "demo".to_string(),
            miss_count: 0,
            time_limit: 300,
            levels: vec![warmup, mixed],
        }
    }
}
