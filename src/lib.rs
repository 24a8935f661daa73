//! Cubefall - a rotating cube puzzle game core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (animation scheduler, cube, launcher, stamps)
//! - `level`: Data-driven level scripts
//! - `audio`: Sound effect contract
//! - `renderer`: Abstract draw contract and per-frame scene walk
//! - `persistence`: Key/value storage contract

pub mod audio;
pub mod highscores;
pub mod level;
pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use audio::{AudioSink, SoundEffect};
pub use highscores::HighScores;
pub use level::{ConfigError, LevelConfig, Script};
pub use settings::Settings;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Cube intro/exit length (ms)
    pub const INTRO_ANIM_MS: u32 = 750;
    pub const WIN_ANIM_MS: u32 = 3000;
    pub const LOSE_ANIM_MS: u32 = 2000;
    /// Cube bump after a hit or miss (ms)
    pub const CUBE_HIT_MS: u32 = 360;
    pub const CUBE_MISS_MS: u32 = 480;
    /// Slot shrink and grow after a collision (ms, each)
    pub const SLOT_ANIM_MS: u32 = 250;

    /// Half the cube's edge length
    pub const CUBE_RADIUS: f32 = 1.0;
    /// Distance from a face at which pieces start falling
    pub const FALL_START_POS: f32 = 4.0;
    /// Distance from the center to the X/Z stamps and the Y stamp
    pub const STAMP_DIST: f32 = 5.0;
    pub const STAMP_DIST_Y: f32 = 2.8;
    /// Gap kept between a stamp and the face pushed into it
    pub const STAMP_GAP: f32 = 0.1;

    /// Piece glow pulse period while falling (ms)
    pub const GLOBAL_GLOW_MS: u32 = 500;
    /// Tap acceleration curve length (ms)
    pub const TAP_ANIM_MS: u32 = 650;
    /// Each unit of tap acceleration removes this much remaining fall distance
    pub const TAP_DISTANCE_SCALE: f32 = 4.0;
    /// Obsolete shrink-out and rejection fade (ms)
    pub const FADE_ANIM_MS: u32 = 500;
    /// Cycling piece color change in/out (ms)
    pub const CYCLE_SWAP_MS: u32 = 500;
    /// Stagger between the pieces of a burst (ms)
    pub const BURST_STAGGER_MS: u32 = 100;

    /// Stamp opacity fade and overlay intro/outro (ms)
    pub const STAMP_FADE_MS: u32 = 500;
    /// Stamp recoil after a collision (ms)
    pub const STAMP_RECOIL_MS: u32 = 250;
    pub const STAMP_RECOIL_DIST: f32 = 2.0;
}
