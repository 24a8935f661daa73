//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Animations advance only through the scheduler
//! - No rendering or platform dependencies

pub mod anim;
pub mod cube;
pub mod grid;
pub mod launcher;
pub mod piece;
pub mod powerup;
pub mod score;
pub mod stamp;
pub mod state;
pub mod tick;

pub use anim::{AnimHandle, AnimItem, AnimTarget, Scheduler};
pub use cube::{Cube, RotateDir};
pub use grid::{Axis, FaceGrid, PieceTemplate};
pub use launcher::Launcher;
pub use piece::{LaunchedPiece, PieceKind, Stage};
pub use powerup::{PowerUp, PowerUpKind};
pub use score::ScoreKeeper;
pub use stamp::Stamps;
pub use state::{AnimTag, Game, GameEvent, GamePhase, GameState, Outcome};
pub use tick::{TickInput, autoplay, tick};
