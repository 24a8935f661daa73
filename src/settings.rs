//! Player preferences
//!
//! Persisted separately from high scores through the key/value store.

use serde::{Deserialize, Serialize};

use crate::audio::{AudioManager, AudioSink};
use crate::persistence::{KeyValueStore, StoreError, load_json, save_json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    pub muted: bool,

    // === Game ===
    /// Script played last, picked again on the next start
    pub last_script: Option<String>,
    /// Fixed RNG seed for reproducible games (None = time based)
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
            last_script: None,
            seed: None,
        }
    }
}

impl Settings {
    const STORAGE_KEY: &'static str = "settings";

    /// Push the audio preferences into a manager
    pub fn apply_audio<S: AudioSink>(&self, audio: &mut AudioManager<S>) {
        audio.set_master_volume(self.master_volume);
        audio.set_sfx_volume(self.sfx_volume);
        audio.set_muted(self.muted);
    }

    pub fn load(store: &impl KeyValueStore) -> Self {
        match load_json(store, Self::STORAGE_KEY) {
            Some(settings) => {
                log::info!("Loaded settings");
                settings
            }
            None => {
                log::info!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut impl KeyValueStore) -> Result<(), StoreError> {
        save_json(store, Self::STORAGE_KEY, self)?;
        log::info!("Settings saved");
        Ok(())
    }
}
