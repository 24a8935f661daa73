//! Cubefall headless runner
//!
//! Plays a script on autoplay with a fixed-timestep accumulator, walks the
//! render contract every frame and records the result in the high score
//! table.
//!
//! Usage: `cubefall [script.json]` (the built-in demo script without one).
//! `RUST_LOG=info` shows the game flow.

use std::time::{SystemTime, UNIX_EPOCH};

use glam::Mat4;

use cubefall::audio::{AudioManager, RecordingSink};
use cubefall::consts::{MAX_SUBSTEPS, SIM_DT};
use cubefall::highscores::{HighScoreEntry, HighScores};
use cubefall::level::{ConfigError, Script};
use cubefall::persistence::FileStore;
use cubefall::renderer::{BlendState, Renderer, Vertex, draw_scene};
use cubefall::settings::Settings;
use cubefall::sim::{Game, GameEvent, GamePhase, TickInput, tick};

/// Frame length of the simulated display (60 Hz)
const FRAME_DT: f32 = 1.0 / 60.0;
/// Give up on a game that runs longer than this (s)
const MAX_GAME_SECONDS: f32 = 900.0;
const STORE_PATH: &str = "cubefall-store.json";

/// Counts what a real backend would upload and draw
#[derive(Default)]
struct HeadlessRenderer {
    vertices: usize,
    draws: usize,
}

impl Renderer for HeadlessRenderer {
    type Drawable = usize;

    fn create_drawable(&mut self, vertices: &[Vertex]) -> usize {
        self.vertices += vertices.len();
        vertices.len()
    }

    fn set_transform(&mut self, _drawable: &mut usize, _transform: Mat4) {}

    fn set_blend_state(&mut self, _blend: BlendState) {}

    fn draw(&mut self, _drawable: &usize) {
        self.draws += 1;
    }
}

fn load_script(path: Option<&str>) -> Result<Script, ConfigError> {
    match path {
        Some(path) => {
            log::info!("Loading script {path}");
            Script::load(path)
        }
        None => Ok(Script::demo()),
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();

    let mut store = match FileStore::open(STORE_PATH) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("cannot open {STORE_PATH}: {e}");
            std::process::exit(1);
        }
    };
    let mut settings = Settings::load(&store);

    let arg = std::env::args().nth(1);
    let script = match load_script(arg.as_deref()) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("invalid script: {e}");
            std::process::exit(1);
        }
    };
    let seed = settings.seed.unwrap_or_else(time_seed);
    log::info!("Cubefall starting '{}' with seed {seed}", script.name);

    let mut audio = AudioManager::new(RecordingSink::default());
    settings.apply_audio(&mut audio);

    let mut game = Game::new(script, seed);
    game.start();

    let input = TickInput {
        autoplay: true,
        ..Default::default()
    };
    let mut renderer = HeadlessRenderer::default();
    let mut accumulator = 0.0;
    let mut elapsed = 0.0;
    let mut levels_cleared = 0;

    while !matches!(game.phase(), GamePhase::Won | GamePhase::Lost) && elapsed < MAX_GAME_SECONDS {
        accumulator += FRAME_DT;
        elapsed += FRAME_DT;

        let mut substeps = 0;
        while accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            tick(&mut game, &input, SIM_DT, &mut audio);
            accumulator -= SIM_DT;
            substeps += 1;
        }

        for event in game.state.drain_events() {
            match event {
                GameEvent::LevelComplete(_) => levels_cleared += 1,
                GameEvent::GameOver { won } => log::info!("Game over ({})", if won { "won" } else { "lost" }),
                other => log::debug!("{other:?}"),
            }
        }

        draw_scene(&mut renderer, &game.state);
    }

    let score = game.state.score.score();
    println!(
        "{} after {:.1}s: score {}, {} levels, {} misses, {} sounds, {} draws",
        match game.phase() {
            GamePhase::Won => "Won",
            GamePhase::Lost => "Lost",
            _ => "Stopped",
        },
        elapsed,
        score,
        levels_cleared,
        game.state.score.game_misses(),
        audio.sink().played.len(),
        renderer.draws,
    );

    let name = game.state.script().name.clone();
    let mut scores = HighScores::load(&store, &name);
    let entry = HighScoreEntry {
        score,
        levels: levels_cleared,
        misses: game.state.score.game_misses(),
        time_ms: (elapsed * 1000.0) as u64,
    };
    if let Some(rank) = scores.add(entry) {
        println!("New high score, rank {rank}");
        if let Err(e) = scores.save(&mut store, &name) {
            log::warn!("Could not save high scores: {e}");
        }
    }

    settings.last_script = Some(name);
    if let Err(e) = settings.save(&mut store) {
        log::warn!("Could not save settings: {e}");
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The core is driven by the host page on the web
}
